// ── Throughput derivation ──
//
// Turns monotonically increasing byte counters into smoothed per-second
// rates. State is kept per key (usually an interface name) and the rx and
// tx directions are smoothed independently.
//
// Smoothing uses a fixed alpha on every sample regardless of how much time
// passed since the previous one. Irregular poll intervals therefore over-
// or under-smooth; this is a known limitation, not an oversight.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio::time::Instant;

/// Receive and transmit rates in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rates {
    pub rx: f64,
    pub tx: f64,
}

#[derive(Debug, Clone, Copy)]
struct CounterSample {
    rx_bytes: u64,
    tx_bytes: u64,
    at: Instant,
    smoothed: Option<Rates>,
}

#[derive(Debug)]
pub struct RateCalculator {
    alpha: f64,
    samples: HashMap<String, CounterSample>,
}

impl RateCalculator {
    /// `alpha` is the weight of the newest raw rate, clamped to `(0, 1]`.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: clamp_alpha(alpha),
            samples: HashMap::new(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = clamp_alpha(alpha);
    }

    /// Feed a counter snapshot for `key` and return the smoothed rates.
    ///
    /// The first snapshot of a key yields zero. A counter that went
    /// backwards (device reboot) or a non-positive time delta yields a raw
    /// rate of zero for that step.
    pub fn update(&mut self, key: &str, rx_bytes: u64, tx_bytes: u64, at: Instant) -> Rates {
        let Some(prev) = self.samples.get_mut(key) else {
            self.samples.insert(
                key.to_owned(),
                CounterSample {
                    rx_bytes,
                    tx_bytes,
                    at,
                    smoothed: None,
                },
            );
            return Rates::default();
        };

        let dt = at.saturating_duration_since(prev.at).as_secs_f64();
        let raw = Rates {
            rx: raw_rate(prev.rx_bytes, rx_bytes, dt),
            tx: raw_rate(prev.tx_bytes, tx_bytes, dt),
        };

        let last = prev.smoothed.unwrap_or(raw);
        let smoothed = Rates {
            rx: self.alpha.mul_add(raw.rx, (1.0 - self.alpha) * last.rx),
            tx: self.alpha.mul_add(raw.tx, (1.0 - self.alpha) * last.tx),
        };

        *prev = CounterSample {
            rx_bytes,
            tx_bytes,
            at,
            smoothed: Some(smoothed),
        };
        smoothed
    }

    /// Last smoothed rates for `key`, if it has been seen at least twice.
    pub fn rates(&self, key: &str) -> Option<Rates> {
        self.samples.get(key).and_then(|s| s.smoothed)
    }

    /// Drop state for keys not in `keys` (interfaces that disappeared).
    pub fn retain<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        let keep: HashSet<&str> = keys.into_iter().collect();
        self.samples.retain(|k, _| keep.contains(k.as_str()));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

fn clamp_alpha(alpha: f64) -> f64 {
    if alpha.is_finite() && alpha > 0.0 {
        alpha.min(1.0)
    } else {
        crate::config::DEFAULT_EMA_ALPHA
    }
}

#[allow(clippy::cast_precision_loss)]
fn raw_rate(prev: u64, now: u64, dt: f64) -> f64 {
    if dt <= 0.0 || now < prev {
        return 0.0;
    }
    (now - prev) as f64 / dt
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn first_sample_yields_zero() {
        let mut calc = RateCalculator::new(0.4);
        let rates = calc.update("ether1", 1_000_000, 2_000_000, Instant::now());
        assert_eq!(rates, Rates::default());
        assert_eq!(calc.rates("ether1"), None);
    }

    #[test]
    fn second_sample_seeds_smoothing_with_raw_rate() {
        let mut calc = RateCalculator::new(0.4);
        let t0 = Instant::now();
        calc.update("ether1", 0, 0, t0);
        let rates = calc.update("ether1", 1000, 500, t0 + Duration::from_secs(1));
        assert!((rates.rx - 1000.0).abs() < EPS);
        assert!((rates.tx - 500.0).abs() < EPS);
    }

    #[test]
    fn constant_rate_converges() {
        let mut calc = RateCalculator::new(0.4);
        let t0 = Instant::now();
        // Start from a step so smoothing has something to converge from.
        calc.update("wan", 0, 0, t0);
        calc.update("wan", 0, 0, t0 + Duration::from_secs(1));

        let mut rates = Rates::default();
        for i in 2..=12u64 {
            rates = calc.update("wan", i * 5000, i * 100, t0 + Duration::from_secs(i));
        }
        // 0.6^10 ~ 0.006 of the initial error remains.
        assert!((rates.rx - 5000.0).abs() < 5000.0 * 0.01, "rx = {}", rates.rx);
        assert!((rates.tx - 100.0).abs() < 100.0 * 0.01, "tx = {}", rates.tx);
    }

    #[test]
    fn counter_reset_is_not_negative() {
        let mut calc = RateCalculator::new(1.0);
        let t0 = Instant::now();
        calc.update("ether1", 10_000, 10_000, t0);
        let rates = calc.update("ether1", 10, 20_000, t0 + Duration::from_secs(1));
        assert!(rates.rx.abs() < EPS);
        assert!((rates.tx - 10_000.0).abs() < EPS);
    }

    #[test]
    fn duplicate_timestamp_yields_zero_raw_rate() {
        let mut calc = RateCalculator::new(1.0);
        let t0 = Instant::now();
        calc.update("ether1", 0, 0, t0);
        let rates = calc.update("ether1", 5000, 5000, t0);
        assert_eq!(rates, Rates::default());
    }

    #[test]
    fn keys_are_independent() {
        let mut calc = RateCalculator::new(0.4);
        let t0 = Instant::now();
        calc.update("ether1", 0, 0, t0);
        calc.update("ether1", 8000, 0, t0 + Duration::from_secs(1));

        let fresh = calc.update("ether2", 999_999, 999_999, t0 + Duration::from_secs(1));
        assert_eq!(fresh, Rates::default());
        assert!((calc.rates("ether1").map_or(0.0, |r| r.rx) - 8000.0).abs() < EPS);
    }

    #[test]
    fn retain_prunes_missing_keys() {
        let mut calc = RateCalculator::new(0.4);
        let t0 = Instant::now();
        calc.update("a", 0, 0, t0);
        calc.update("b", 0, 0, t0);
        calc.retain(["b"]);
        assert_eq!(calc.len(), 1);

        // "a" starts over from scratch.
        let rates = calc.update("a", 100, 100, t0 + Duration::from_secs(1));
        assert_eq!(rates, Rates::default());
    }

    #[test]
    fn invalid_alpha_falls_back_to_default() {
        assert!((RateCalculator::new(-1.0).alpha() - 0.4).abs() < EPS);
        assert!((RateCalculator::new(f64::NAN).alpha() - 0.4).abs() < EPS);
        assert!((RateCalculator::new(7.0).alpha() - 1.0).abs() < EPS);
    }
}
