/// Windowed per-version counters for real-time alerting
pub mod window_aggregator;

pub use window_aggregator::{VersionMetricSnapshot, VersionMetricStats, WindowedAggregator};
