use askama::Template;

use crate::metric::{Kind, Metric};

/// Renders the metric index page served from `GET /`, grouped into a
/// `Gauges` section and a `Counters` section, each sorted by id.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub gauges: Vec<IndexRow>,
    pub counters: Vec<IndexRow>,
}

pub struct IndexRow {
    pub id: String,
    pub value: String,
}

impl IndexTemplate {
    pub fn from_metrics(mut metrics: Vec<Metric>) -> Self {
        metrics.sort_by(|a, b| a.id.cmp(&b.id));

        let mut gauges = Vec::new();
        let mut counters = Vec::new();

        for metric in metrics {
            let row = IndexRow {
                id: metric.id.clone(),
                value: metric.to_string(),
            };
            match metric.kind {
                Kind::Gauge => gauges.push(row),
                Kind::Counter => counters.push(row),
            }
        }

        Self { gauges, counters }
    }
}
