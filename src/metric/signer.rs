use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{Kind, Metric};

type HmacSha256 = Hmac<Sha256>;

/// Builds the canonical string HMAC'd for `metric`, matching the Go
/// original's `fmt.Sprintf("%s:%s:%f", ...)` / `"%s:%s:%d"` formats exactly
/// (six fractional digits, dot decimal, for gauges).
fn canonical_string(metric: &Metric) -> String {
    match metric.kind {
        Kind::Gauge => format!(
            "{}:gauge:{:.6}",
            metric.id,
            metric.value.unwrap_or_default()
        ),
        Kind::Counter => format!(
            "{}:counter:{}",
            metric.id,
            metric.delta.unwrap_or_default()
        ),
    }
}

/// Returns `hex(HMAC-SHA256(key, canonical))`, or `None` if `key` is empty
/// (signing disabled — callers should leave `hash` untouched).
pub fn sign(metric: &Metric, key: &str) -> Option<String> {
    if key.is_empty() {
        return None;
    }

    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(canonical_string(metric).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Recomputes the canonical string from the post-decode record and compares
/// it to the transmitted hash in constant time. An empty key disables
/// verification unconditionally, matching the hash's own "signing is a
/// no-op" rule.
pub fn verify(metric: &Metric, key: &str) -> bool {
    if key.is_empty() {
        return true;
    }

    let Ok(expected) = hex::decode(&metric.hash) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(canonical_string(metric).as_bytes());
    mac.verify_slice(&expected).is_ok()
}
