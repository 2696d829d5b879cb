pub mod metric;
pub mod period;
