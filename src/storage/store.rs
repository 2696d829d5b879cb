use async_trait::async_trait;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::date_util::date_key;
use crate::error::{Error, Result};
use crate::metrics::source::{MetricSource, RankingSource};
use crate::metrics::types::{MetricResult, RankingEntry};
use crate::query::metric::{Collection, DateRange, Filter, FilterValue, MetricQuery, Reduction};
use crate::storage::Database;

/// Where a ranked subject's display name comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayName {
    /// A field on the ranked collection itself.
    Own(&'static str),
    /// A field on a related collection, matched by `key` against the subject id.
    Joined {
        collection: Collection,
        key: &'static str,
        field: &'static str,
    },
}

/// "Top subjects by metric": rows of `collection` grouped by `subject_field`.
#[derive(Debug, Clone)]
pub struct TopKQuery {
    pub label: String,
    pub collection: Collection,
    pub subject_field: &'static str,
    pub display: DisplayName,
    pub metric: Reduction,
    pub secondary: Vec<(&'static str, Reduction)>,
    pub filters: Vec<Filter>,
}

impl TopKQuery {
    /// Brands by completed payment volume.
    pub fn brands_by_revenue() -> Self {
        Self {
            label: "brands-by-revenue".into(),
            collection: Collection::Payments,
            subject_field: "brand_id",
            display: DisplayName::Joined {
                collection: Collection::Brands,
                key: "brand_id",
                field: "name",
            },
            metric: Reduction::sum("amount"),
            secondary: vec![
                ("campaigns", Reduction::distinct("campaign_id")),
                ("payments", Reduction::Count),
            ],
            filters: vec![status_filter("completed")],
        }
    }

    /// Brands by number of campaigns launched.
    pub fn brands_by_campaigns() -> Self {
        Self {
            label: "brands-by-campaigns".into(),
            collection: Collection::Campaigns,
            subject_field: "brand_id",
            display: DisplayName::Joined {
                collection: Collection::Brands,
                key: "brand_id",
                field: "name",
            },
            metric: Reduction::Count,
            secondary: vec![("budget", Reduction::sum("budget"))],
            filters: Vec::new(),
        }
    }

    /// Influencers by the largest follower count seen in analytics snapshots.
    pub fn influencers_by_tracked_followers() -> Self {
        Self {
            label: "influencers-by-tracked-followers".into(),
            collection: Collection::InfluencerAnalytics,
            subject_field: "influencer_id",
            display: DisplayName::Joined {
                collection: Collection::Influencers,
                key: "influencer_id",
                field: "name",
            },
            metric: Reduction::max("followers"),
            secondary: vec![("engagement_rate", Reduction::avg("engagement_rate"))],
            filters: Vec::new(),
        }
    }

    /// Influencers by the follower count on their profile record.
    pub fn influencers_by_profile_followers() -> Self {
        Self {
            label: "influencers-by-profile-followers".into(),
            collection: Collection::Influencers,
            subject_field: "influencer_id",
            display: DisplayName::Own("name"),
            metric: Reduction::max("followers"),
            secondary: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Campaigns by completed payment volume.
    pub fn campaigns_by_spend() -> Self {
        Self {
            label: "campaigns-by-spend".into(),
            collection: Collection::Payments,
            subject_field: "campaign_id",
            display: DisplayName::Joined {
                collection: Collection::Campaigns,
                key: "campaign_id",
                field: "name",
            },
            metric: Reduction::sum("amount"),
            secondary: vec![("payments", Reduction::Count)],
            filters: vec![status_filter("completed")],
        }
    }

    /// Campaigns by planned budget.
    pub fn campaigns_by_budget() -> Self {
        Self {
            label: "campaigns-by-budget".into(),
            collection: Collection::Campaigns,
            subject_field: "campaign_id",
            display: DisplayName::Own("name"),
            metric: Reduction::max("budget"),
            secondary: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.collection.check_field(self.subject_field)?;
        match &self.display {
            DisplayName::Own(field) => self.collection.check_field(field)?,
            DisplayName::Joined {
                collection,
                key,
                field,
            } => {
                collection.check_field(key)?;
                collection.check_field(field)?;
            }
        }
        self.metric.validate(self.collection)?;
        for (_, r) in &self.secondary {
            r.validate(self.collection)?;
        }
        for f in &self.filters {
            self.collection.check_field(&f.field)?;
        }
        Ok(())
    }

    fn to_sql(&self) -> (String, Vec<Value>) {
        let subject = self.subject_field;
        let (display_expr, join) = match &self.display {
            DisplayName::Own(field) => (format!("t.{field}"), String::new()),
            DisplayName::Joined {
                collection,
                key,
                field,
            } => (
                format!("j.{field}"),
                format!(" LEFT JOIN {} j ON j.{key} = t.{subject}", collection.table()),
            ),
        };
        let mut columns = vec![
            format!("t.{subject}"),
            format!("MAX({display_expr})"),
            reduction_sql(&self.metric, "t."),
        ];
        columns.extend(self.secondary.iter().map(|(_, r)| reduction_sql(r, "t.")));

        let (clause, values) = where_clause(&self.filters, None, "t.");
        let sql = format!(
            "SELECT {} FROM {} t{join} WHERE t.{subject} IS NOT NULL{clause} \
             GROUP BY t.{subject} ORDER BY 3 DESC, 1 ASC",
            columns.join(", "),
            self.collection.table(),
        );
        (sql, values)
    }
}

/// `MetricSource` and top-K queries over the SQLite collections.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn top_k(&self, query: &TopKQuery) -> Result<Vec<RankingEntry>> {
        query.validate()?;
        let (sql, values) = query.to_sql();
        let names: Vec<&'static str> = query.secondary.iter().map(|(n, _)| *n).collect();

        self.db
            .read(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                    let subject_id: String = row.get(0)?;
                    let display: Option<String> = row.get(1)?;
                    let metric: Option<f64> = row.get(2)?;
                    let mut entry = RankingEntry::new(
                        &subject_id,
                        display.as_deref().unwrap_or(&subject_id),
                        metric.unwrap_or(0.0),
                    );
                    for (i, name) in names.iter().enumerate() {
                        let v: Option<f64> = row.get(3 + i)?;
                        entry = entry.with_secondary(name, v.unwrap_or(0.0));
                    }
                    Ok(entry)
                })?;
                rows.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            })
            .await
            .map_err(|e| Error::SourceUnavailable(e.to_string()))
    }
}

#[async_trait]
impl MetricSource for SqliteStore {
    async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult> {
        query.validate()?;
        let (clause, values) = where_clause(&query.filters, query.range.as_ref(), "");
        let sql = format!(
            "SELECT COUNT(*), {} FROM {} WHERE 1=1{clause}",
            reduction_sql(&query.reduction, ""),
            query.collection.table(),
        );

        let (rows, value): (i64, Option<f64>) = self
            .db
            .read(move |conn| {
                conn.query_row(&sql, params_from_iter(values.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
            })
            .await
            .map_err(|e| Error::SourceUnavailable(e.to_string()))?;

        if rows == 0 {
            Ok(MetricResult::empty())
        } else {
            Ok(MetricResult::of(value.unwrap_or(0.0)))
        }
    }
}

/// A `TopKQuery` bound to a store.
#[derive(Clone)]
pub struct StoreRanking {
    store: SqliteStore,
    query: TopKQuery,
}

impl StoreRanking {
    pub fn new(store: SqliteStore, query: TopKQuery) -> Self {
        Self { store, query }
    }
}

#[async_trait]
impl RankingSource for StoreRanking {
    fn name(&self) -> &str {
        &self.query.label
    }

    async fn entries(&self) -> Result<Vec<RankingEntry>> {
        self.store.top_k(&self.query).await
    }
}

// Field names below have been checked against the collection whitelist.

fn reduction_sql(r: &Reduction, alias: &str) -> String {
    match r {
        Reduction::Count => "COUNT(*)".to_string(),
        Reduction::Sum(f) => format!("COALESCE(SUM({alias}{f}), 0)"),
        Reduction::Avg(f) => format!("AVG({alias}{f})"),
        Reduction::Max(f) => format!("MAX({alias}{f})"),
        Reduction::Distinct(f) => format!("COUNT(DISTINCT {alias}{f})"),
    }
}

fn where_clause(filters: &[Filter], range: Option<&DateRange>, alias: &str) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut values = Vec::new();
    for f in filters {
        sql.push_str(&format!(" AND {alias}{} = ?", f.field));
        values.push(match &f.value {
            FilterValue::Text(s) => Value::Text(s.clone()),
            FilterValue::Integer(n) => Value::Integer(*n),
        });
    }
    if let Some(r) = range {
        sql.push_str(&format!(
            " AND {alias}created_date_key >= ? AND {alias}created_date_key < ?"
        ));
        values.push(Value::Text(date_key(r.start)));
        values.push(Value::Text(date_key(r.end)));
    }
    (sql, values)
}

fn status_filter(status: &str) -> Filter {
    Filter {
        field: "status".into(),
        value: status.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::*;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment(id: &str, brand: &str, campaign: &str, amount: f64, status: &str, at: &str) -> PaymentRecord {
        PaymentRecord {
            payment_id: id.into(),
            brand_id: Some(brand.into()),
            campaign_id: Some(campaign.into()),
            influencer_id: None,
            amount,
            status: status.into(),
            created_at: at.into(),
        }
    }

    async fn seeded_store() -> SqliteStore {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                for (id, name) in [("b1", "Acme"), ("b2", "Globex"), ("b3", "Initech")] {
                    upsert_brand(
                        conn,
                        &BrandRecord {
                            brand_id: id.into(),
                            name: name.into(),
                            industry: None,
                            status: "active".into(),
                            created_at: "2025-01-10T00:00:00Z".into(),
                        },
                    )?;
                }
                upsert_payment(conn, &payment("p1", "b1", "c1", 100.0, "completed", "2025-01-15T00:00:00Z"))?;
                upsert_payment(conn, &payment("p2", "b1", "c2", 50.0, "completed", "2025-02-15T00:00:00Z"))?;
                upsert_payment(conn, &payment("p3", "b2", "c3", 400.0, "completed", "2025-02-20T00:00:00Z"))?;
                upsert_payment(conn, &payment("p4", "b3", "c4", 999.0, "pending", "2025-02-21T00:00:00Z"))?;
                upsert_payment(conn, &payment("p5", "ghost", "c5", 150.0, "completed", "2025-02-22T00:00:00Z"))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        SqliteStore::new(db)
    }

    #[tokio::test]
    async fn test_empty_collection_is_flagged() {
        let store = SqliteStore::new(Database::open_memory().await.unwrap());
        for q in [
            MetricQuery::count(Collection::Brands),
            MetricQuery::sum(Collection::Payments, "amount"),
            MetricQuery::avg(Collection::Payments, "amount"),
        ] {
            let r = store.evaluate(&q).await.unwrap();
            assert_eq!(r, MetricResult::empty());
        }
    }

    #[tokio::test]
    async fn test_count_sum_avg_distinct() {
        let store = seeded_store().await;

        let count = store.evaluate(&MetricQuery::count(Collection::Brands)).await.unwrap();
        assert_eq!(count, MetricResult::of(3.0));

        let completed = MetricQuery::sum(Collection::Payments, "amount").status("completed");
        assert_eq!(store.evaluate(&completed).await.unwrap().value, 700.0);

        let avg = MetricQuery::avg(Collection::Payments, "amount").status("completed");
        assert_eq!(store.evaluate(&avg).await.unwrap().value, 175.0);

        let brands = MetricQuery::distinct(Collection::Payments, "brand_id").status("completed");
        assert_eq!(store.evaluate(&brands).await.unwrap().value, 3.0);
    }

    #[tokio::test]
    async fn test_date_range_is_half_open() {
        let store = seeded_store().await;
        let feb = DateRange::new(ymd(2025, 2, 1), ymd(2025, 3, 1));
        let q = MetricQuery::sum(Collection::Payments, "amount")
            .status("completed")
            .within(feb);
        assert_eq!(store.evaluate(&q).await.unwrap().value, 600.0);

        let to_feb_20 = DateRange::new(ymd(2025, 2, 1), ymd(2025, 2, 20));
        let q = MetricQuery::count(Collection::Payments).within(to_feb_20);
        assert_eq!(store.evaluate(&q).await.unwrap().value, 1.0);
    }

    #[tokio::test]
    async fn test_zero_value_is_not_empty() {
        let store = seeded_store().await;
        let q = MetricQuery::count(Collection::Payments).status("refunded");
        assert!(store.evaluate(&q).await.unwrap().empty);

        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| upsert_payment(conn, &payment("z", "b1", "c1", 0.0, "completed", "2025-01-01")))
            .await
            .unwrap();
        let r = SqliteStore::new(db)
            .evaluate(&MetricQuery::sum(Collection::Payments, "amount"))
            .await
            .unwrap();
        assert_eq!(r, MetricResult::of(0.0));
    }

    #[tokio::test]
    async fn test_unknown_field_is_invalid_query() {
        let store = seeded_store().await;
        let q = MetricQuery::count(Collection::Payments).filter("currency", "usd");
        let err = store.evaluate(&q).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_brands_by_revenue() {
        let store = seeded_store().await;
        let entries = store.top_k(&TopKQuery::brands_by_revenue()).await.unwrap();

        let ids: Vec<&str> = entries.iter().map(|e| e.subject_id.as_str()).collect();
        // b1 and ghost tie at 150 and fall back to id order.
        assert_eq!(ids, vec!["b2", "b1", "ghost"]);
        assert_eq!(entries[0].display_name, "Globex");
        assert_eq!(entries[0].primary_metric, 400.0);
        assert_eq!(entries[1].secondary_metrics["campaigns"], 2.0);
        assert_eq!(entries[1].secondary_metrics["payments"], 2.0);
        // No brand record: the id stands in for the name.
        assert_eq!(entries[2].display_name, "ghost");
    }

    #[tokio::test]
    async fn test_influencer_rankings() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                for (id, name, followers) in [("i1", "Ivy", 5_000), ("i2", "Max", 12_000)] {
                    upsert_influencer(
                        conn,
                        &InfluencerRecord {
                            influencer_id: id.into(),
                            name: name.into(),
                            category: None,
                            followers,
                            status: "active".into(),
                            created_at: "2025-01-01T00:00:00Z".into(),
                        },
                    )?;
                }
                for (followers, at) in [(20_000, "2025-01-01"), (25_000, "2025-02-01")] {
                    insert_influencer_snapshot(
                        conn,
                        &InfluencerSnapshot {
                            influencer_id: "i1".into(),
                            followers,
                            engagement_rate: 4.0,
                            created_at: at.into(),
                        },
                    )?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        let store = SqliteStore::new(db);

        let tracked = store
            .top_k(&TopKQuery::influencers_by_tracked_followers())
            .await
            .unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].display_name, "Ivy");
        assert_eq!(tracked[0].primary_metric, 25_000.0);
        assert_eq!(tracked[0].secondary_metrics["engagement_rate"], 4.0);

        let profile = store
            .top_k(&TopKQuery::influencers_by_profile_followers())
            .await
            .unwrap();
        let ids: Vec<&str> = profile.iter().map(|e| e.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["i2", "i1"]);
    }

    #[tokio::test]
    async fn test_store_ranking_name() {
        let store = seeded_store().await;
        let ranking = StoreRanking::new(store, TopKQuery::campaigns_by_spend());
        assert_eq!(ranking.name(), "campaigns-by-spend");
        let entries = ranking.entries().await.unwrap();
        assert_eq!(entries[0].subject_id, "c3");
        // Campaign rows are absent, so names fall back to ids.
        assert_eq!(entries[0].display_name, "c3");
    }

    #[test]
    fn test_builtin_queries_validate() {
        for q in [
            TopKQuery::brands_by_revenue(),
            TopKQuery::brands_by_campaigns(),
            TopKQuery::influencers_by_tracked_followers(),
            TopKQuery::influencers_by_profile_followers(),
            TopKQuery::campaigns_by_spend(),
            TopKQuery::campaigns_by_budget(),
        ] {
            assert!(q.validate().is_ok(), "{} failed validation", q.label);
        }
    }
}
