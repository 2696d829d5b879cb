use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::metrics::types::{MetricResult, RankingEntry};
use crate::query::metric::{Collection, MetricQuery};

/// One counting/summing query against a collection of records.
///
/// Implementations are read-only. An empty collection yields
/// `MetricResult::empty()`, never an error; an unreachable store yields
/// `Error::SourceUnavailable` and a bad field reference `Error::InvalidQuery`.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult>;
}

/// A source of ranking candidates, e.g. influencers with follower counts.
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    async fn entries(&self) -> Result<Vec<RankingEntry>>;
}

#[async_trait]
impl<T: MetricSource + ?Sized> MetricSource for Arc<T> {
    async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult> {
        (**self).evaluate(query).await
    }
}

#[async_trait]
impl<T: RankingSource + ?Sized> RankingSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn entries(&self) -> Result<Vec<RankingEntry>> {
        (**self).entries().await
    }
}

/// Evaluates the same query over several collections and adds the results.
/// The incoming query's collection is ignored.
pub struct CollectionUnion<S> {
    inner: S,
    collections: Vec<Collection>,
}

impl<S: MetricSource> CollectionUnion<S> {
    pub fn new(inner: S, collections: &[Collection]) -> Self {
        Self {
            inner,
            collections: collections.to_vec(),
        }
    }
}

#[async_trait]
impl<S: MetricSource> MetricSource for CollectionUnion<S> {
    async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult> {
        let mut total = MetricResult::empty();
        for c in &self.collections {
            let r = self.inner.evaluate(&query.on(*c)).await?;
            total.value += r.value;
            total.empty &= r.empty;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct PerCollection(HashMap<Collection, MetricResult>);

    #[async_trait]
    impl MetricSource for PerCollection {
        async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult> {
            Ok(self.0.get(&query.collection).copied().unwrap_or_else(MetricResult::empty))
        }
    }

    #[tokio::test]
    async fn test_union_sums_collections() {
        let mut m = HashMap::new();
        m.insert(Collection::Brands, MetricResult::of(2.0));
        m.insert(Collection::Customers, MetricResult::of(5.0));
        let union = CollectionUnion::new(PerCollection(m), &Collection::USERS);

        let r = union
            .evaluate(&MetricQuery::count(Collection::Brands))
            .await
            .unwrap();
        assert_eq!(r.value, 7.0);
        assert!(!r.empty);
    }

    #[tokio::test]
    async fn test_union_of_empty_collections_is_empty() {
        let union = CollectionUnion::new(PerCollection(HashMap::new()), &Collection::USERS);
        let r = union
            .evaluate(&MetricQuery::count(Collection::Brands))
            .await
            .unwrap();
        assert_eq!(r, MetricResult::empty());
    }
}
