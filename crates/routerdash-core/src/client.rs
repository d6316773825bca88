// ── DeviceClient facade ──
//
// The one type other subsystems talk to. Every read first makes sure a
// session is live, then either serves from the response cache or goes
// through the command queue. Interface counters always bypass the cache
// because rates are derived from consecutive raw samples.

use std::sync::Arc;

use arc_swap::ArcSwap;
use routerdash_api::{Params, Row};
use strum::IntoEnumIterator;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::debug;

use crate::cache::{CacheStats, ResponseCache};
use crate::config::DeviceConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, IDENTITY_COMMAND};
use crate::convert;
use crate::error::CoreError;
use crate::model::{
    ArpEntry, DeviceStatus, DhcpLease, FirewallRule, FirewallTable, Health, Interface, LogEntry,
    Route,
};
use crate::queue::CommandQueue;
use crate::rate::RateCalculator;
use crate::session::{Connector, RouterOsConnector};

mod keys {
    pub const STATUS: &str = "status";
    pub const IDENTITY: &str = "identity";
    pub const ROUTES: &str = "routes";
    pub const ARP: &str = "arp";
    pub const FIREWALL: &str = "firewall";
    pub const DHCP: &str = "dhcp-leases";
}

/// Entry point for callers.
///
/// Cheaply cloneable via `Arc<ClientInner>`; clones share the session,
/// queue, cache and rate state.
#[derive(Clone)]
pub struct DeviceClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<ArcSwap<DeviceConfig>>,
    connection: ConnectionManager,
    cache: Arc<ResponseCache>,
    rates: Mutex<RateCalculator>,
}

impl DeviceClient {
    /// Create a client that talks the RouterOS API over TCP. Does not
    /// connect; the first operation (or [`connect`](Self::connect)) does.
    pub fn new(config: DeviceConfig) -> Result<Self, CoreError> {
        Self::with_connector(config, Arc::new(RouterOsConnector))
    }

    /// Create a client with a custom session factory.
    pub fn with_connector(
        config: DeviceConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let rates = RateCalculator::new(config.ema_alpha);
        let config = Arc::new(ArcSwap::from_pointee(config));
        let cache = Arc::new(ResponseCache::new());
        let connection = ConnectionManager::new(Arc::clone(&config), connector, Arc::clone(&cache));

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                connection,
                cache,
                rates: Mutex::new(rates),
            }),
        })
    }

    pub fn config(&self) -> Arc<DeviceConfig> {
        self.inner.config.load_full()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn queue(&self) -> &CommandQueue {
        self.inner.connection.queue()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch_state()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.connection.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner.connection.connect().await
    }

    pub async fn disconnect(&self, reason: Option<&str>) {
        self.inner
            .connection
            .disconnect(reason.unwrap_or("requested by caller"))
            .await;
    }

    /// Apply new settings: tear down, reset caches and backoff, reconnect.
    pub async fn refresh_connection(&self, config: DeviceConfig) -> Result<(), CoreError> {
        let alpha = config.ema_alpha;
        self.inner.connection.refresh_connection(config).await?;
        let mut rates = self.inner.rates.lock().await;
        rates.set_alpha(alpha);
        rates.clear();
        Ok(())
    }

    /// Stop background tasks for good.
    pub async fn shutdown(&self) {
        self.inner.connection.shutdown().await;
    }

    /// Connection summary. Never connects; fetches the identity only if a
    /// session is already live and it is not known yet.
    pub async fn get_health(&self) -> Health {
        let connection = &self.inner.connection;
        let mut info = connection.info().await;
        if info.identity.is_none() && connection.is_connected() {
            match self.identity().await {
                Ok(identity) => info.identity = Some(identity),
                Err(e) => debug!(error = %e, "identity lookup for health failed"),
            }
        }

        let state = connection.state();
        Health {
            connected: connection.is_connected(),
            needs_intervention: state == ConnectionState::ReconnectExhausted,
            state: state.to_string(),
            connected_since: info.connected_since,
            last_error: info.last_error,
            identity: info.identity,
            reconnect_attempts: connection.reconnect_attempts(),
            cache: self.inner.cache.stats(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Run any command through the queue. Never cached.
    pub async fn execute(
        &self,
        command: &str,
        params: Option<Params>,
    ) -> Result<Vec<Row>, CoreError> {
        self.connect().await?;
        self.inner
            .connection
            .queue()
            .execute(command, params.unwrap_or_default())
            .await
    }

    async fn print(&self, command: &str) -> Result<Vec<Row>, CoreError> {
        self.execute(command, None).await
    }

    /// Device identity name, cached for `identity_ttl`.
    pub async fn identity(&self) -> Result<String, CoreError> {
        self.connect().await?;
        let ttl = self.config().identity_ttl;
        let identity = self
            .inner
            .cache
            .get_or_fetch(keys::IDENTITY, ttl, || async {
                let rows = self.print(IDENTITY_COMMAND).await?;
                Ok::<_, CoreError>(convert::identity(&rows).unwrap_or_default())
            })
            .await?;
        self.inner.connection.set_identity(identity.clone()).await;
        Ok(identity)
    }

    /// System resources plus identity, cached for `status_ttl`.
    pub async fn get_status(&self) -> Result<DeviceStatus, CoreError> {
        self.connect().await?;
        let ttl = self.config().status_ttl;
        self.inner
            .cache
            .get_or_fetch(keys::STATUS, ttl, || async {
                let rows = self.print("/system/resource/print").await?;
                let resource = rows.first().ok_or_else(|| CoreError::CommandFailed {
                    command: "/system/resource/print".into(),
                    category: None,
                    message: "device returned no resource row".into(),
                })?;
                let identity = self.identity().await?;
                Ok::<_, CoreError>(convert::device_status(resource, identity))
            })
            .await
    }

    /// All interfaces with smoothed rx/tx rates. Never cached.
    pub async fn get_interfaces(&self) -> Result<Vec<Interface>, CoreError> {
        let rows = self.print("/interface/print").await?;
        let now = tokio::time::Instant::now();

        let mut rates = self.inner.rates.lock().await;
        let interfaces: Vec<Interface> = rows
            .iter()
            .map(|row| {
                let (name, rx, tx) = convert::interface_counters(row);
                let smoothed = rates.update(&name, rx, tx, now);
                convert::interface(row, smoothed)
            })
            .collect();
        rates.retain(interfaces.iter().map(|i| i.name.as_str()));
        Ok(interfaces)
    }

    pub async fn get_routes(&self) -> Result<Vec<Route>, CoreError> {
        self.cached_table(keys::ROUTES, "/ip/route/print").await
    }

    pub async fn get_arp_table(&self) -> Result<Vec<ArpEntry>, CoreError> {
        self.cached_table(keys::ARP, "/ip/arp/print").await
    }

    pub async fn get_dhcp_leases(&self) -> Result<Vec<DhcpLease>, CoreError> {
        self.cached_table(keys::DHCP, "/ip/dhcp-server/lease/print").await
    }

    /// Filter, NAT and mangle rules, in that order.
    pub async fn get_firewall_rules(&self) -> Result<Vec<FirewallRule>, CoreError> {
        self.connect().await?;
        let ttl = self.config().default_ttl;
        self.inner
            .cache
            .get_or_fetch(keys::FIREWALL, ttl, || async {
                let mut rules = Vec::new();
                for table in FirewallTable::iter() {
                    let rows = self.print(table.print_command()).await?;
                    rules.extend(rows.iter().map(|row| convert::firewall_rule(table, row)));
                }
                Ok::<_, CoreError>(rules)
            })
            .await
    }

    /// The newest `limit` log lines, oldest first. Never cached.
    pub async fn get_logs(&self, limit: usize) -> Result<Vec<LogEntry>, CoreError> {
        let rows = self.print("/log/print").await?;
        let skip = rows.len().saturating_sub(limit);
        Ok(rows.iter().skip(skip).map(LogEntry::from).collect())
    }

    async fn cached_table<T>(&self, key: &str, command: &str) -> Result<Vec<T>, CoreError>
    where
        T: for<'a> From<&'a Row> + Clone + Send + Sync + 'static,
    {
        self.connect().await?;
        let ttl = self.config().default_ttl;
        self.inner
            .cache
            .get_or_fetch(key, ttl, || async {
                let rows = self.print(command).await?;
                Ok::<_, CoreError>(rows.iter().map(T::from).collect())
            })
            .await
    }
}
