use std::cmp::Ordering;

use crate::error::Result;
use crate::metrics::source::RankingSource;
use crate::metrics::types::RankingEntry;

/// Produce a top-`limit` list from the first source in the chain that has
/// any entries.
///
/// `primary` is consulted first, then each of `fallbacks` in order. Results
/// from different tiers are never merged. All sources empty is a normal
/// outcome and yields an empty list. A `limit` of zero or less returns an
/// empty list without touching any source.
pub async fn rank(
    primary: &dyn RankingSource,
    fallbacks: &[&dyn RankingSource],
    limit: i64,
) -> Result<Vec<RankingEntry>> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    for source in std::iter::once(primary).chain(fallbacks.iter().copied()) {
        let mut entries = source.entries().await?;
        if entries.is_empty() {
            log::debug!("ranking source '{}' is empty", source.name());
            continue;
        }
        log::debug!(
            "ranking from '{}' ({} candidates)",
            source.name(),
            entries.len()
        );
        sort_entries(&mut entries);
        entries.truncate(limit as usize);
        return Ok(entries);
    }

    Ok(Vec::new())
}

/// Descending by primary metric, ties by ascending subject id.
pub fn sort_entries(entries: &mut [RankingEntry]) {
    entries.sort_by(compare_entries);
}

fn compare_entries(a: &RankingEntry, b: &RankingEntry) -> Ordering {
    b.primary_metric
        .total_cmp(&a.primary_metric)
        .then_with(|| a.subject_id.cmp(&b.subject_id))
}
