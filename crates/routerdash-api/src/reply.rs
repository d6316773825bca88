// Request and reply sentences
//
// Requests are a command word followed by `=key=value` attributes,
// `?query` words and API attributes such as `.tag`. Replies start with a
// status word (`!re`, `!done`, `!trap`, `!fatal`, `!empty`) and carry
// their data as `=key=value` attributes.

use indexmap::IndexMap;

use crate::codec::Sentence;
use crate::error::Error;

/// One data row returned by the device, attribute order preserved.
pub type Row = IndexMap<String, String>;

/// Parameters attached to a request.
///
/// Keys starting with `?` are sent as query words; every other key,
/// `.proplist` and `.id` included, becomes a `=key=value` attribute.
pub type Params = IndexMap<String, String>;

// ── Request ──────────────────────────────────────────────────────────

/// Build the sentence for `command` with `params`, tagged with `tag`.
pub fn request_sentence(command: &str, params: &Params, tag: &str) -> Sentence {
    let mut sentence = Sentence::new();
    sentence.push(command);
    for (key, value) in params {
        if key.starts_with('?') {
            sentence.push(format!("{key}={value}"));
        } else {
            sentence.push(format!("={key}={value}"));
        }
    }
    sentence.push(format!(".tag={tag}"));
    sentence
}

// ── Reply ────────────────────────────────────────────────────────────

/// Reply status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// One data row.
    Re,
    /// End of the reply stream for a request.
    Done,
    /// The request failed; a `Done` still follows.
    Trap,
    /// The device is closing the session.
    Fatal,
    /// The request matched nothing.
    Empty,
}

impl ReplyKind {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "!re" => Some(Self::Re),
            "!done" => Some(Self::Done),
            "!trap" => Some(Self::Trap),
            "!fatal" => Some(Self::Fatal),
            "!empty" => Some(Self::Empty),
            _ => None,
        }
    }
}

/// A decoded reply sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    /// Tag echoed from the request, if any.
    pub tag: Option<String>,
    pub attributes: Row,
    /// Bare words that are neither attributes nor API words. `!fatal`
    /// carries its reason this way.
    pub message: Option<String>,
}

impl Reply {
    /// Decode a sentence received from the device.
    pub fn parse(sentence: Sentence) -> Result<Self, Error> {
        let mut words = sentence.into_words().into_iter();
        let status = words
            .next()
            .ok_or_else(|| Error::Protocol("empty reply sentence".into()))?;
        let kind = ReplyKind::parse(&status)
            .ok_or_else(|| Error::Protocol(format!("unexpected reply word '{status}'")))?;

        let mut reply = Self {
            kind,
            tag: None,
            attributes: Row::new(),
            message: None,
        };

        for word in words {
            if let Some(attr) = word.strip_prefix('=') {
                // `=key=value`; the value itself may contain '='.
                let (key, value) = attr.split_once('=').unwrap_or((attr, ""));
                reply.attributes.insert(key.to_owned(), value.to_owned());
            } else if let Some(tag) = word.strip_prefix(".tag=") {
                reply.tag = Some(tag.to_owned());
            } else {
                reply.message = Some(word);
            }
        }

        Ok(reply)
    }

    /// `true` for replies after which no more sentences arrive for the tag.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ReplyKind::Done | ReplyKind::Fatal)
    }

    /// Human-readable failure text for `!trap` / `!fatal` replies.
    pub fn failure_message(&self) -> String {
        self.attributes
            .get("message")
            .cloned()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown error".into())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
