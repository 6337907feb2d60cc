mod signer;

pub use signer::{sign, verify};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The wire token for a [`Metric`]'s kind, also used as the `type` JSON field
/// and the `{kind}` path segment on the plain-text routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Gauge,
    Counter,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Gauge => "gauge",
            Kind::Counter => "counter",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(Kind::Gauge),
            "counter" => Ok(Kind::Counter),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("metric type not implemented: {0}")]
pub struct UnknownKind(pub String);

/// The sole domain entity: a named, typed, optionally signed sample.
///
/// Exactly one of `value`/`delta` is populated, matching `kind`. In transport
/// `delta` is an increment; once applied to a store it denotes the
/// accumulated total for that id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub hash: String,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: Kind::Gauge,
            delta: None,
            value: Some(value),
            hash: String::new(),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: Kind::Counter,
            delta: Some(delta),
            value: None,
            hash: String::new(),
        }
    }

    /// Sets `hash` from the canonical string, or leaves it empty when `key`
    /// is empty (signing disabled).
    pub fn sign(&mut self, key: &str) {
        if let Some(hash) = sign(self, key) {
            self.hash = hash;
        }
    }

    /// Verifies the carried hash against the canonical string. An empty key
    /// disables verification unconditionally.
    pub fn is_hash_valid(&self, key: &str) -> bool {
        verify(self, key)
    }
}

/// Raw wire shape for a JSON-encoded metric: `type` stays a plain string
/// instead of deserializing straight into [`Kind`]. The strict `Kind` enum
/// would fail the whole `Json<_>` extraction on an unrecognized kind token,
/// producing axum's blanket 400 rejection before a handler ever runs; routes
/// that must answer 501 for an unknown kind (matching the original's
/// `default:` case) decode into this shape first and convert explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricWire {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub delta: Option<i64>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub hash: String,
}

impl MetricWire {
    pub fn into_metric(self) -> Result<Metric, UnknownKind> {
        Ok(Metric {
            id: self.id,
            kind: self.kind.parse()?,
            delta: self.delta,
            value: self.value,
            hash: self.hash,
        })
    }
}

impl fmt::Display for Metric {
    /// The plain-text rendering used by `GET /value/{kind}/{id}`: `%g` for
    /// gauges, decimal for counters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Gauge => write!(f, "{}", format_g(self.value.unwrap_or_default())),
            Kind::Counter => write!(f, "{}", self.delta.unwrap_or_default()),
        }
    }
}

/// Approximates Go's `%g`: shortest round-trippable decimal, no trailing
/// zeros, no forced decimal point for whole numbers.
fn format_g(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let mut s = format!("{}", value);
        if !s.contains(['e', 'E']) {
            while s.contains('.') && s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    }
}
