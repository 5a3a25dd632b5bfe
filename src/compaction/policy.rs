//! Compaction trigger

use crate::config::Config;

/// Whether the on-disk footprint justifies a compaction pass
///
/// Requires `total_disk_used` to have reached the configured low-water mark,
/// and then either no live data at all or an amplification
/// (`total_disk_used / actual_data_size`) above the configured ratio.
pub fn should_compact(total_disk_used: u64, actual_data_size: u64, config: &Config) -> bool {
    if total_disk_used < config.compaction_min_disk_usage {
        return false;
    }

    actual_data_size == 0
        || total_disk_used as f64 / actual_data_size as f64 > config.compaction_ratio
}
