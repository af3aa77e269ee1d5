//! Metric counters through the `metrics` facade.

/// Where a class lookup was satisfied.
pub fn record_cache_hit(source: &'static str) {
    metrics::counter!("detbox_cache_hits_total", "source" => source).increment(1);
}

pub fn record_class_rewritten(modified: bool) {
    metrics::counter!(
        "detbox_classes_rewritten_total",
        "modified" => if modified { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_load_failure(kind: &'static str) {
    metrics::counter!("detbox_load_failures_total", "kind" => kind).increment(1);
}

/// Count an invocation and its total cost.
pub fn record_invocation(outcome: &'static str, total_cost: u64) {
    metrics::counter!("detbox_invocations_total", "outcome" => outcome).increment(1);
    metrics::histogram!("detbox_invocation_cost", "outcome" => outcome).record(total_cost as f64);
}
