//! Publish container snapshots through the `metrics` facade
//!
//! The dispatch hot path only touches the in-process atomic cells; callers
//! that want Prometheus visibility invoke this bridge periodically (or once
//! per unit of work) to mirror the accumulated state.

use metrics::Label;

use crate::metrics::{MetricName, MetricsContainer, MetricsContainerRegistry};

fn facade_labels(name: &MetricName) -> Vec<Label> {
    name.labels
        .iter()
        .map(|(key, value)| Label::new(key.clone(), value.clone()))
        .collect()
}

/// Mirror one container's counters and distributions to the facade.
pub fn publish_container(container: &MetricsContainer) {
    for (name, value) in container.counter_snapshots() {
        let labels = facade_labels(&name);
        metrics::counter!(name.name.clone(), labels).absolute(value);
    }
    for (name, snapshot) in container.distribution_snapshots() {
        let labels = facade_labels(&name);
        metrics::counter!(format!("{}_count", name.name), labels.clone())
            .absolute(snapshot.count);
        metrics::counter!(format!("{}_sum", name.name), labels.clone()).absolute(snapshot.sum);
        metrics::gauge!(format!("{}_min", name.name), labels.clone()).set(snapshot.min as f64);
        metrics::gauge!(format!("{}_max", name.name), labels).set(snapshot.max as f64);
    }
}

/// Mirror every stage container plus the unbound container.
pub fn publish_registry(registry: &MetricsContainerRegistry) {
    publish_container(&registry.unbound_container());
    for stage_id in registry.stage_ids() {
        publish_container(&registry.container(&stage_id));
    }
}
