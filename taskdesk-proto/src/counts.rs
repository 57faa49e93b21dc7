//! Per-status task counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::Task;

/// Locations a counts object may be nested under, in lookup order.
const COUNT_POINTERS: [&str; 4] = ["/data/counts", "/data", "/counts", ""];

/// Key holding the overall total in a counts object.
const TOTAL_KEY: &str = "total";

/// Number of tasks per status, plus the overall total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    /// Total number of tasks.
    pub total: u64,
    /// Count per status value.
    pub by_status: BTreeMap<String, u64>,
}

impl TaskCounts {
    /// Reads counters out of a response body.
    ///
    /// Accepts a flat object (`{"total": 4, "pending": 3, ...}`) directly or
    /// nested under `data`, `data.counts` or `counts`. Non-numeric members
    /// are ignored. When no total is reported it is the sum of the statuses.
    /// Unrecognized bodies produce empty counters.
    #[must_use]
    pub fn from_value(body: &Value) -> Self {
        let Some(object) = COUNT_POINTERS
            .iter()
            .filter_map(|pointer| body.pointer(pointer).and_then(Value::as_object))
            .find(|object| has_counter(object))
        else {
            return Self::default();
        };

        let by_status: BTreeMap<String, u64> = object
            .iter()
            .filter(|(key, _)| key.as_str() != TOTAL_KEY)
            .filter_map(|(key, value)| value.as_u64().map(|n| (key.clone(), n)))
            .collect();
        let total = object
            .get(TOTAL_KEY)
            .and_then(Value::as_u64)
            .unwrap_or_else(|| by_status.values().sum());

        Self { total, by_status }
    }

    /// Tallies a list of tasks by status.
    #[must_use]
    pub fn tally(tasks: &[Task]) -> Self {
        let mut by_status = BTreeMap::new();
        for task in tasks {
            *by_status.entry(task.status.to_string()).or_insert(0) += 1;
        }
        Self {
            total: tasks.len() as u64,
            by_status,
        }
    }

    /// Count for a single status, zero if absent.
    #[must_use]
    pub fn get(&self, status: &str) -> u64 {
        self.by_status.get(status).copied().unwrap_or(0)
    }
}

fn has_counter(object: &Map<String, Value>) -> bool {
    object.values().any(Value::is_u64)
}
