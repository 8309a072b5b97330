//! Records produced by cluster scraping and by the admission exchange.
use serde::{Deserialize, Serialize};

/// Resource usage of the cluster nodes at one point in time, one JSON line of `cluster_usage`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterUsage {
    /// Unix time in microseconds, set by the scrapper.
    pub timestamp: i64,
    pub cpu: Vec<String>,
    pub cpu_percentage: Vec<f64>,
    pub memory: Vec<String>,
    pub memory_percentage: Vec<f64>,
    pub pods: Vec<i64>,
    pub master_cpu_percentage: f64,
    pub master_memory_percentage: f64,
}

/// Autoscaler and activator statistics of the platform, one CSV row of `kn_stats`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnStats {
    /// Unix time in microseconds, set by the scrapper.
    pub timestamp: i64,
    pub desired_pods: i64,
    pub unready_pods: i64,
    pub pending_pods: i64,
    pub requested_pods: i64,
    pub running_pods: i64,
    pub activator_queue: f64,
    pub activator_request_count: i64,
    pub autoscaler_stable_queue: f64,
    pub autoscaler_panic_queue: f64,
    pub scheduling_p99: f64,
    pub scheduling_p50: f64,
    pub e2e_placement_p99: f64,
    pub e2e_placement_p50: f64,
}

/// Placement request sent to an external admission scheduler before an invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSchedRequest {
    pub invocation_id: String,
    pub function: String,
    pub batch_size: i64,
    pub iterations: i64,
    pub deadline: i64,
    pub prev_replica: Vec<i32>,
}

/// Placement decision for a [`JobSchedRequest`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSchedReply {
    pub invocation_id: String,
    pub replica: Vec<i32>,
}
