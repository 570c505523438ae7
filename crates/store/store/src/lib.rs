pub mod error;
pub mod statistics;
pub mod store;

pub use error::StoreError;
pub use statistics::{
    CategoryCount, ClassificationStatistics, DashboardSnapshot, MetricAggregate, MetricsSummary,
    ProcessingStatistics,
};
pub use store::{PatternObservation, ProcessingOutcome, TriageStore};
