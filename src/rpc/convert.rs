use crate::metric::{Kind, Metric};

use super::proto;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("gauge metric is missing its value field")]
    MissingValue,
    #[error("counter metric is missing its delta field")]
    MissingDelta,
}

pub fn from_proto(m: proto::Metric) -> Result<Metric, ConvertError> {
    match proto::Kind::try_from(m.r#type).unwrap_or(proto::Kind::Gauge) {
        proto::Kind::Gauge => {
            // The wire carries `value` as float32; the store works in
            // float64, so it's widened here on the way in.
            let value = m.value.ok_or(ConvertError::MissingValue)?;
            Ok(Metric {
                id: m.id,
                kind: Kind::Gauge,
                delta: None,
                value: Some(value as f64),
                hash: m.hash,
            })
        }
        proto::Kind::Counter => {
            let delta = m.delta.ok_or(ConvertError::MissingDelta)?;
            Ok(Metric {
                id: m.id,
                kind: Kind::Counter,
                delta: Some(delta),
                value: None,
                hash: m.hash,
            })
        }
    }
}

pub fn to_proto(m: &Metric) -> proto::Metric {
    let kind = match m.kind {
        Kind::Gauge => proto::Kind::Gauge,
        Kind::Counter => proto::Kind::Counter,
    };

    proto::Metric {
        id: m.id.clone(),
        r#type: kind as i32,
        delta: m.delta,
        value: m.value.map(|v| v as f32),
        hash: m.hash.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_round_trips() {
        let metric = Metric::gauge("Alloc", 42.5);
        let proto = to_proto(&metric);
        let back = from_proto(proto).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn counter_round_trips() {
        let metric = Metric::counter("PollCount", 7);
        let proto = to_proto(&metric);
        let back = from_proto(proto).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn gauge_without_value_is_rejected() {
        let proto = proto::Metric {
            id: "Alloc".to_string(),
            r#type: proto::Kind::Gauge as i32,
            delta: None,
            value: None,
            hash: String::new(),
        };
        assert!(matches!(from_proto(proto), Err(ConvertError::MissingValue)));
    }
}
