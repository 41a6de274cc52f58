//! Well-known metric names and label keys

use crate::metrics::MetricName;

/// Elements delivered on a channel, counted once per window.
pub const ELEMENT_COUNT: &str = "worker_elements_total";

/// Sampled encoded element sizes on a channel.
pub const SAMPLED_BYTE_SIZE: &str = "worker_sampled_element_bytes";

/// Wall-clock milliseconds spent inside a stage's processing function.
pub const PROCESS_MILLIS: &str = "worker_stage_process_millis";

/// Label key for the channel identifier.
pub const CHANNEL_LABEL: &str = "channel";

/// Label key for the stage identifier.
pub const STAGE_LABEL: &str = "stage";

/// Element-count metric for `channel_id`.
pub fn element_count(channel_id: &str) -> MetricName {
    MetricName::named(
        ELEMENT_COUNT,
        [(CHANNEL_LABEL.to_string(), channel_id.to_string())],
    )
}

/// Sampled byte-size metric for `channel_id`.
pub fn sampled_byte_size(channel_id: &str) -> MetricName {
    MetricName::named(
        SAMPLED_BYTE_SIZE,
        [(CHANNEL_LABEL.to_string(), channel_id.to_string())],
    )
}

/// Processing-time metric for `stage_id`.
pub fn process_millis(stage_id: &str) -> MetricName {
    MetricName::named(
        PROCESS_MILLIS,
        [(STAGE_LABEL.to_string(), stage_id.to_string())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_carry_labels() {
        let name = element_count("c1");
        assert_eq!(name.name, ELEMENT_COUNT);
        assert_eq!(name.labels[CHANNEL_LABEL], "c1");

        let name = process_millis("stage-a");
        assert_eq!(name.labels[STAGE_LABEL], "stage-a");
    }
}
