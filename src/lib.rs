pub mod clock;
pub mod config;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod query;
pub mod report;
pub mod storage;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ReportOptions;
pub use error::{Error, Result};
pub use metrics::{GrowthMetric, MetricResult, Notification, RankingEntry, TrendSeries};
pub use query::metric::{Collection, MetricQuery};
pub use query::period::Period;
pub use report::{Diagnostic, Report, ReportAssembler, ReportRequest, Section, Sources};
pub use storage::repository::{Dataset, ImportSummary};
pub use storage::{Database, SqliteStore};

use metrics::source::{CollectionUnion, MetricSource};
use storage::repository;

/// What `MarketPulse::growth` measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthSubject {
    /// Completed payment volume.
    Revenue,
    /// New brands, influencers and customers.
    Users,
    /// New campaigns.
    Campaigns,
}

impl FromStr for GrowthSubject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "revenue" => Ok(Self::Revenue),
            "users" => Ok(Self::Users),
            "campaigns" => Ok(Self::Campaigns),
            other => Err(Error::InvalidArgument(format!(
                "unknown growth metric: {other} (expected revenue, users or campaigns)"
            ))),
        }
    }
}

impl fmt::Display for GrowthSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Revenue => "revenue",
            Self::Users => "users",
            Self::Campaigns => "campaigns",
        })
    }
}

/// Main entry point: a marketplace database plus the clock reports are
/// anchored to.
pub struct MarketPulse {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl MarketPulse {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    /// Build the assembler using the stored `report.*` options.
    pub async fn assembler(&self) -> Result<ReportAssembler> {
        let options = ReportOptions::load(&self.db).await?;
        let sources = Sources::from_store(SqliteStore::new(self.db.clone()));
        Ok(ReportAssembler::new(sources, self.clock.clone(), options))
    }

    /// Assemble a report. Section failures are absorbed into the report;
    /// only setup errors (unreadable options) are returned.
    pub async fn report(&self, request: &ReportRequest) -> Result<Report> {
        Ok(self.assembler().await?.assemble(request).await)
    }

    pub async fn report_with_diagnostics(
        &self,
        request: &ReportRequest,
    ) -> Result<(Report, Vec<Diagnostic>)> {
        Ok(self
            .assembler()
            .await?
            .assemble_with_diagnostics(request)
            .await)
    }

    /// Growth of `subject` over `period` against the period before it.
    pub async fn growth(&self, subject: GrowthSubject, period: &Period) -> Result<GrowthMetric> {
        let store = SqliteStore::new(self.db.clone());
        match subject {
            GrowthSubject::Revenue => {
                let q = MetricQuery::sum(Collection::Payments, "amount").status("completed");
                report::branches::compare(&store, &q, period).await
            }
            GrowthSubject::Users => {
                let users = CollectionUnion::new(store, &Collection::USERS);
                report::branches::compare(&users, &MetricQuery::count(Collection::Brands), period)
                    .await
            }
            GrowthSubject::Campaigns => {
                let q = MetricQuery::count(Collection::Campaigns);
                report::branches::compare(&store, &q, period).await
            }
        }
    }

    /// Evaluate a single metric query against the store.
    pub async fn metric(&self, query: &MetricQuery) -> Result<MetricResult> {
        SqliteStore::new(self.db.clone()).evaluate(query).await
    }

    // ── Data commands ──────────────────────────────────────────────

    pub async fn import(&self, data: Dataset) -> Result<ImportSummary> {
        let summary = self
            .db
            .writer()
            .call(move |conn| repository::import_dataset(conn, &data))
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        log::info!("imported {} records", summary.total());
        Ok(summary)
    }

    /// Parse a JSON dataset (one array per collection) and import it.
    pub async fn import_json(&self, text: &str) -> Result<ImportSummary> {
        let data: Dataset = serde_json::from_str(text)?;
        self.import(data).await
    }

    pub async fn status(&self) -> Result<Vec<(Collection, i64)>> {
        self.db
            .read(|conn| repository::collection_counts(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .read({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a config value. `report.*` keys are validated first so a bad
    /// value cannot break later reports.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        if key.starts_with("report.") {
            ReportOptions::from_pairs(&[(key.to_string(), value.to_string())])?;
        }
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .read(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
