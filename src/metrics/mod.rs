pub mod growth;
pub mod notifications;
pub mod ranking;
pub mod source;
pub mod trend;
pub mod types;

pub use source::{CollectionUnion, MetricSource, RankingSource};
pub use trend::PeriodUnit;
pub use types::*;
