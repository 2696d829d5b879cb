pub mod branches;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::config::ReportOptions;
use crate::error::{Error, Result};
use crate::metrics::ranking;
use crate::metrics::source::{MetricSource, RankingSource};
use crate::metrics::types::{GrowthMetric, Notification, RankingEntry};
use crate::storage::{SqliteStore, StoreRanking, TopKQuery};

use branches::{BranchContext, SectionData};

/// An independently computed part of the dashboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Stats,
    Revenue,
    Growth,
    TopBrands,
    TopInfluencers,
    TopCampaigns,
    RevenueTrend,
    UserTrend,
    CampaignTrend,
    CampaignStatus,
    Notifications,
}

impl Section {
    pub const ALL: [Section; 11] = [
        Section::Stats,
        Section::Revenue,
        Section::Growth,
        Section::TopBrands,
        Section::TopInfluencers,
        Section::TopCampaigns,
        Section::RevenueTrend,
        Section::UserTrend,
        Section::CampaignTrend,
        Section::CampaignStatus,
        Section::Notifications,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Section::Stats => "stats",
            Section::Revenue => "revenue",
            Section::Growth => "growth",
            Section::TopBrands => "top-brands",
            Section::TopInfluencers => "top-influencers",
            Section::TopCampaigns => "top-campaigns",
            Section::RevenueTrend => "revenue-trend",
            Section::UserTrend => "user-trend",
            Section::CampaignTrend => "campaign-trend",
            Section::CampaignStatus => "campaign-status",
            Section::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Section {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase().replace('_', "-");
        Section::ALL
            .into_iter()
            .find(|sec| sec.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown report section: {s}")))
    }
}

/// Which sections to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    sections: BTreeSet<Section>,
}

impl Default for ReportRequest {
    fn default() -> Self {
        Self::all()
    }
}

impl ReportRequest {
    pub fn all() -> Self {
        Self {
            sections: Section::ALL.into_iter().collect(),
        }
    }

    pub fn only(sections: impl IntoIterator<Item = Section>) -> Self {
        Self {
            sections: sections.into_iter().collect(),
        }
    }

    /// Parse a comma-separated list such as `stats,top-brands`.
    pub fn parse(list: &str) -> Result<Self> {
        let sections = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Section::from_str)
            .collect::<Result<BTreeSet<_>>>()?;
        if sections.is_empty() {
            return Err(Error::InvalidArgument("no report sections requested".into()));
        }
        Ok(Self { sections })
    }

    pub fn sections(&self) -> impl Iterator<Item = Section> + '_ {
        self.sections.iter().copied()
    }

    pub fn contains(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }
}

// ── Report shape ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCard {
    pub key: String,
    pub label: String,
    pub value: f64,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total_revenue: f64,
    pub pending_amount: f64,
    pub average_payment: f64,
    pub completed_payments: u64,
    pub paying_brands: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GrowthSummary {
    pub revenue: GrowthMetric,
    pub users: GrowthMetric,
    pub campaigns: GrowthMetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Doughnut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub title: String,
    pub chart_id: String,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rankings {
    pub top_brands: Vec<RankingEntry>,
    pub top_influencers: Vec<RankingEntry>,
    pub top_campaigns: Vec<RankingEntry>,
}

/// The assembled dashboard. Every field is always populated; sections that
/// were not requested, or whose branch failed, carry their default value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub sections: Vec<Section>,
    pub stats: Vec<StatCard>,
    pub revenue: RevenueSummary,
    pub growth: GrowthSummary,
    pub charts: Vec<ChartSeries>,
    pub rankings: Rankings,
    pub notifications: Vec<Notification>,
}

impl Report {
    fn apply(&mut self, section: Section, data: SectionData) {
        match data {
            SectionData::Stats(cards) => self.stats = cards,
            SectionData::Revenue(r) => self.revenue = r,
            SectionData::Growth(g) => self.growth = g,
            SectionData::Ranking(list) => match section {
                Section::TopInfluencers => self.rankings.top_influencers = list,
                Section::TopCampaigns => self.rankings.top_campaigns = list,
                _ => self.rankings.top_brands = list,
            },
            SectionData::Chart(chart) => self.charts.push(chart),
            SectionData::Notifications(list) => self.notifications = list,
        }
    }

    /// Look up a chart by its `chart_id`.
    pub fn chart(&self, chart_id: &str) -> Option<&ChartSeries> {
        self.charts.iter().find(|c| c.chart_id == chart_id)
    }
}

// ── Sources ────────────────────────────────────────────────────────

/// A primary ranking source and the fallbacks tried, in order, when it is
/// empty.
#[derive(Clone)]
pub struct RankingChain {
    pub primary: Arc<dyn RankingSource>,
    pub fallbacks: Vec<Arc<dyn RankingSource>>,
}

impl RankingChain {
    pub fn new(primary: Arc<dyn RankingSource>) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
        }
    }

    pub fn or_else(mut self, fallback: Arc<dyn RankingSource>) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub async fn rank(&self, limit: i64) -> Result<Vec<RankingEntry>> {
        let fallbacks: Vec<&dyn RankingSource> = self.fallbacks.iter().map(|s| s.as_ref()).collect();
        ranking::rank(self.primary.as_ref(), &fallbacks, limit).await
    }
}

/// Everything the assembler reads from.
#[derive(Clone)]
pub struct Sources {
    pub metrics: Arc<dyn MetricSource>,
    pub top_brands: RankingChain,
    pub top_influencers: RankingChain,
    pub top_campaigns: RankingChain,
}

impl Sources {
    /// The standard wiring over a SQLite store.
    pub fn from_store(store: SqliteStore) -> Self {
        let ranked = |q: TopKQuery| -> Arc<dyn RankingSource> {
            Arc::new(StoreRanking::new(store.clone(), q))
        };
        Self {
            top_brands: RankingChain::new(ranked(TopKQuery::brands_by_revenue()))
                .or_else(ranked(TopKQuery::brands_by_campaigns())),
            top_influencers: RankingChain::new(ranked(TopKQuery::influencers_by_tracked_followers()))
                .or_else(ranked(TopKQuery::influencers_by_profile_followers())),
            top_campaigns: RankingChain::new(ranked(TopKQuery::campaigns_by_spend()))
                .or_else(ranked(TopKQuery::campaigns_by_budget())),
            metrics: Arc::new(store),
        }
    }
}

// ── Diagnostics ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// The branch returned an error.
    Failed,
    /// The branch or the whole report ran out of time.
    TimedOut,
    /// The branch task died without reporting back.
    Aborted,
    /// The branch finished, but with some inputs replaced by zero.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub section: Section,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Append-only log shared by concurrently running branches.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Arc<Mutex<Vec<Diagnostic>>>);

impl Diagnostics {
    pub fn record(&self, diagnostic: Diagnostic) {
        if let Ok(mut log) = self.0.lock() {
            log.push(diagnostic);
        }
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

/// What came back from one branch.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchOutcome<T> {
    Success(T),
    Defaulted(Diagnostic),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    FanningOut,
    Collecting,
    Assembled,
}

fn advance(state: &mut AssemblyState, next: AssemblyState) {
    log::debug!("report assembly {state:?} -> {next:?}");
    *state = next;
}

// ── Assembler ──────────────────────────────────────────────────────

/// Fans out one task per requested section and joins them into a `Report`.
///
/// A failing, slow or panicking section never fails the report: it is
/// replaced by its default value and a `Diagnostic` is recorded.
#[derive(Clone)]
pub struct ReportAssembler {
    sources: Arc<Sources>,
    clock: Arc<dyn Clock>,
    options: ReportOptions,
}

impl ReportAssembler {
    pub fn new(sources: Sources, clock: Arc<dyn Clock>, options: ReportOptions) -> Self {
        Self {
            sources: Arc::new(sources),
            clock,
            options,
        }
    }

    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    pub async fn assemble(&self, request: &ReportRequest) -> Report {
        self.assemble_with_diagnostics(request).await.0
    }

    pub async fn assemble_with_diagnostics(
        &self,
        request: &ReportRequest,
    ) -> (Report, Vec<Diagnostic>) {
        let mut state = AssemblyState::Idle;
        let now = self.clock.now();
        let ctx = Arc::new(BranchContext {
            sources: self.sources.clone(),
            options: self.options.clone(),
            now,
            diagnostics: Diagnostics::default(),
        });

        advance(&mut state, AssemblyState::FanningOut);
        let mut tasks = JoinSet::new();
        for section in request.sections() {
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let outcome = run_branch(section, &ctx).await;
                (section, outcome)
            });
        }

        advance(&mut state, AssemblyState::Collecting);
        let deadline = Instant::now() + self.options.report_timeout;
        let mut outcomes: BTreeMap<Section, BranchOutcome<SectionData>> = BTreeMap::new();
        let mut deadline_hit = false;
        loop {
            let next = tokio::time::timeout_at(deadline, tasks.join_next()).await;
            match next {
                Ok(Some(Ok((section, outcome)))) => {
                    outcomes.insert(section, outcome);
                }
                Ok(Some(Err(e))) => {
                    log::error!("report branch task ended abnormally: {e}");
                }
                Ok(None) => break,
                Err(_) => {
                    log::warn!(
                        "report deadline of {} ms reached with {} section(s) outstanding",
                        self.options.report_timeout.as_millis(),
                        tasks.len()
                    );
                    tasks.abort_all();
                    deadline_hit = true;
                    break;
                }
            }
        }
        drop(tasks);

        let mut report = Report {
            generated_at: now,
            as_of: ctx.today(),
            sections: request.sections().collect(),
            stats: Vec::new(),
            revenue: RevenueSummary::default(),
            growth: GrowthSummary::default(),
            charts: Vec::new(),
            rankings: Rankings::default(),
            notifications: Vec::new(),
        };
        for section in [Section::Stats, Section::Notifications] {
            report.apply(section, branches::default_for(section, &ctx));
        }

        for section in request.sections() {
            let outcome = outcomes.remove(&section).unwrap_or_else(|| {
                let diagnostic = if deadline_hit {
                    Diagnostic {
                        section,
                        kind: DiagnosticKind::TimedOut,
                        message: "report deadline reached".into(),
                    }
                } else {
                    Diagnostic {
                        section,
                        kind: DiagnosticKind::Aborted,
                        message: "branch task did not complete".into(),
                    }
                };
                ctx.diagnostics.record(diagnostic.clone());
                BranchOutcome::Defaulted(diagnostic)
            });

            let data = match outcome {
                BranchOutcome::Success(data) => data,
                BranchOutcome::Defaulted(d) => {
                    log::warn!("section {section} defaulted ({:?}): {}", d.kind, d.message);
                    branches::default_for(section, &ctx)
                }
            };
            report.apply(section, data);
        }

        advance(&mut state, AssemblyState::Assembled);
        (report, ctx.diagnostics.snapshot())
    }
}

async fn run_branch(section: Section, ctx: &BranchContext) -> BranchOutcome<SectionData> {
    let limit = ctx.options.branch_timeout;
    let result = match tokio::time::timeout(limit, branches::run(section, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{section} exceeded {} ms",
            limit.as_millis()
        ))),
    };

    match result {
        Ok(data) => BranchOutcome::Success(data),
        Err(e) => {
            if e.is_unavailable() {
                log::warn!("section {section} unavailable: {e}");
            } else {
                log::error!("section {section} failed: {e}");
            }
            let diagnostic = Diagnostic {
                section,
                kind: match &e {
                    Error::Timeout(_) => DiagnosticKind::TimedOut,
                    _ => DiagnosticKind::Failed,
                },
                message: e.to_string(),
            };
            ctx.diagnostics.record(diagnostic.clone());
            BranchOutcome::Defaulted(diagnostic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::metrics::types::{MetricResult, NotificationType, Priority};
    use crate::query::metric::MetricQuery;
    use crate::storage::Database;
    use async_trait::async_trait;
    use std::time::Duration;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()))
    }

    async fn seeded_store() -> SqliteStore {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO brands (brand_id, name, created_at, created_date_key) VALUES
                        ('b1', 'Acme', '2025-01-10', '2025-01-10');
                     INSERT INTO campaigns (campaign_id, brand_id, name, status, budget, created_at, created_date_key) VALUES
                        ('c1', 'b1', 'Spring', 'active', 500, '2025-02-01', '2025-02-01');
                     INSERT INTO collaborations (collaboration_id, campaign_id, status, created_at, created_date_key) VALUES
                        ('k1', 'c1', 'pending', '2025-02-02', '2025-02-02'),
                        ('k2', 'c1', 'pending', '2025-02-03', '2025-02-03'),
                        ('k3', 'c1', 'approved', '2025-02-04', '2025-02-04');
                     INSERT INTO payments (payment_id, brand_id, amount, status, created_at, created_date_key) VALUES
                        ('p1', 'b1', 250, 'pending', '2025-02-05', '2025-02-05');",
                )
            })
            .await
            .unwrap();
        SqliteStore::new(db)
    }

    struct BrokenRanking;

    #[async_trait]
    impl RankingSource for BrokenRanking {
        fn name(&self) -> &str {
            "broken"
        }

        async fn entries(&self) -> Result<Vec<RankingEntry>> {
            Err(Error::SourceUnavailable("connection reset".into()))
        }
    }

    struct OneBrand;

    #[async_trait]
    impl RankingSource for OneBrand {
        fn name(&self) -> &str {
            "one-brand"
        }

        async fn entries(&self) -> Result<Vec<RankingEntry>> {
            Ok(vec![RankingEntry::new("b1", "Acme", 250.0)])
        }
    }

    struct SlowMetrics;

    #[async_trait]
    impl MetricSource for SlowMetrics {
        async fn evaluate(&self, _query: &MetricQuery) -> Result<MetricResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(MetricResult::of(1.0))
        }
    }

    struct FailingMetrics;

    #[async_trait]
    impl MetricSource for FailingMetrics {
        async fn evaluate(&self, query: &MetricQuery) -> Result<MetricResult> {
            Err(Error::SourceUnavailable(format!("{} offline", query.collection.table())))
        }
    }

    #[test]
    fn test_section_names_round_trip() {
        for s in Section::ALL {
            assert_eq!(s.name().parse::<Section>().unwrap(), s);
        }
        assert_eq!("top_brands".parse::<Section>().unwrap(), Section::TopBrands);
        assert!("kpis".parse::<Section>().is_err());
    }

    #[test]
    fn test_request_parse() {
        let r = ReportRequest::parse("notifications, stats").unwrap();
        let got: Vec<Section> = r.sections().collect();
        assert_eq!(got, vec![Section::Stats, Section::Notifications]);
        assert!(ReportRequest::parse(" , ").is_err());
    }

    #[tokio::test]
    async fn test_pending_work_scenario() {
        let assembler = ReportAssembler::new(
            Sources::from_store(seeded_store().await),
            clock(),
            ReportOptions::default(),
        );
        let request = ReportRequest::only([Section::Notifications, Section::TopBrands]);
        let (report, diagnostics) = assembler.assemble_with_diagnostics(&request).await;

        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(report.notifications.len(), 2);
        assert_eq!(report.notifications[0].priority, Priority::High);
        assert_eq!(report.notifications[0].kind, NotificationType::Collaboration);
        assert_eq!(
            report.notifications[0].message,
            "2 collaboration requests are pending approval"
        );
        assert_eq!(report.notifications[1].priority, Priority::Medium);
        assert_eq!(report.notifications[1].message, "1 payment requires verification");
        // Brand b1 has a campaign, so the fallback tier ranks it.
        assert_eq!(report.rankings.top_brands.len(), 1);
        assert_eq!(report.rankings.top_brands[0].display_name, "Acme");
    }

    #[tokio::test]
    async fn test_pending_work_on_empty_marketplace() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO collaborations (collaboration_id, campaign_id, status, created_at, created_date_key) VALUES
                        ('k1', 'c9', 'pending', '2025-03-01', '2025-03-01'),
                        ('k2', 'c9', 'pending', '2025-03-02', '2025-03-02');
                     INSERT INTO payments (payment_id, brand_id, amount, status, created_at, created_date_key) VALUES
                        ('p1', 'b9', 80, 'pending', '2025-03-03', '2025-03-03');",
                )
            })
            .await
            .unwrap();
        let assembler = ReportAssembler::new(
            Sources::from_store(SqliteStore::new(db)),
            clock(),
            ReportOptions::default(),
        );

        let request = ReportRequest::only([Section::Notifications, Section::TopBrands]);
        let (report, diagnostics) = assembler.assemble_with_diagnostics(&request).await;

        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(report.notifications.len(), 2);
        assert_eq!(report.notifications[0].priority, Priority::High);
        assert_eq!(
            report.notifications[0].message,
            "2 collaboration requests are pending approval"
        );
        assert_eq!(report.notifications[1].priority, Priority::Medium);
        assert_eq!(report.notifications[1].message, "1 payment requires verification");
        assert!(report.rankings.top_brands.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_windows_do_not_panic() {
        let options = ReportOptions {
            trend_months: 4_000_000,
            new_user_days: i64::MAX,
            ..ReportOptions::default()
        };
        let assembler = ReportAssembler::new(
            Sources::from_store(seeded_store().await),
            clock(),
            options,
        );

        let request = ReportRequest::only([Section::RevenueTrend, Section::Notifications]);
        let (report, diagnostics) = assembler.assemble_with_diagnostics(&request).await;

        assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
        assert_eq!(diagnostics[0].section, Section::RevenueTrend);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Failed);
        assert!(report.chart("revenueChart").unwrap().values.is_empty());

        // Brand b1 counts as a new user in an unbounded window.
        assert_eq!(report.notifications.len(), 3);
        assert_eq!(
            report.notifications[2].message,
            format!("1 new user joined in the last {} days", i64::MAX)
        );
    }

    #[tokio::test]
    async fn test_stats_not_stalled_by_busy_reader() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path().join("pulse.db")).await.unwrap();

        let held = db.clone();
        let slow = tokio::spawn(async move {
            held.read(|_conn| {
                std::thread::sleep(Duration::from_millis(1500));
                Ok::<(), rusqlite::Error>(())
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let options = ReportOptions {
            branch_timeout: Duration::from_millis(500),
            ..ReportOptions::default()
        };
        let assembler = ReportAssembler::new(
            Sources::from_store(SqliteStore::new(db)),
            clock(),
            options,
        );
        let (report, diagnostics) = assembler
            .assemble_with_diagnostics(&ReportRequest::only([Section::Stats]))
            .await;

        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(report.stats.len(), 6);

        slow.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_ranking_does_not_affect_other_sections() {
        let mut sources = Sources::from_store(seeded_store().await);
        sources.top_influencers = RankingChain::new(Arc::new(BrokenRanking));
        let assembler = ReportAssembler::new(sources, clock(), ReportOptions::default());

        let (report, diagnostics) = assembler
            .assemble_with_diagnostics(&ReportRequest::all())
            .await;

        assert!(report.rankings.top_influencers.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].section, Section::TopInfluencers);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Failed);

        let total_campaigns = report.stats.iter().find(|c| c.key == "total_campaigns").unwrap();
        assert_eq!(total_campaigns.value, 1.0);
        assert_eq!(report.charts.len(), 4);
        assert_eq!(report.revenue.pending_amount, 250.0);
    }

    #[tokio::test]
    async fn test_slow_branch_is_defaulted() {
        let mut sources = Sources::from_store(seeded_store().await);
        sources.metrics = Arc::new(SlowMetrics);
        let options = ReportOptions {
            branch_timeout: Duration::from_millis(100),
            ..ReportOptions::default()
        };
        let assembler = ReportAssembler::new(sources, clock(), options);

        let request = ReportRequest::only([Section::Revenue, Section::RevenueTrend]);
        let (report, diagnostics) = assembler.assemble_with_diagnostics(&request).await;

        assert_eq!(report.revenue, RevenueSummary::default());
        let chart = report.chart("revenueChart").unwrap();
        assert_eq!(chart.values, vec![0.0; 6]);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::TimedOut));
    }

    #[tokio::test]
    async fn test_report_deadline_defaults_outstanding_sections() {
        let mut sources = Sources::from_store(seeded_store().await);
        sources.metrics = Arc::new(SlowMetrics);
        sources.top_brands = RankingChain::new(Arc::new(OneBrand));
        let options = ReportOptions {
            branch_timeout: Duration::from_secs(120),
            report_timeout: Duration::from_millis(200),
            ..ReportOptions::default()
        };
        let assembler = ReportAssembler::new(sources, clock(), options);

        let request = ReportRequest::only([Section::Stats, Section::TopBrands]);
        let (report, diagnostics) = assembler.assemble_with_diagnostics(&request).await;

        assert!(report.stats.iter().all(|c| c.value == 0.0));
        assert_eq!(report.rankings.top_brands.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].section, Section::Stats);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::TimedOut);
    }

    #[tokio::test]
    async fn test_notifications_fail_open_to_caught_up() {
        let mut sources = Sources::from_store(seeded_store().await);
        sources.metrics = Arc::new(FailingMetrics);
        let assembler = ReportAssembler::new(sources, clock(), ReportOptions::default());

        let request = ReportRequest::only([Section::Notifications]);
        let (report, diagnostics) = assembler.assemble_with_diagnostics(&request).await;

        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].id, "all-caught-up");
        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::Degraded));
    }

    #[tokio::test]
    async fn test_assembly_is_repeatable_with_fixed_clock() {
        let assembler = ReportAssembler::new(
            Sources::from_store(seeded_store().await),
            clock(),
            ReportOptions::default(),
        );
        let a = assembler.assemble(&ReportRequest::all()).await;
        let b = assembler.assemble(&ReportRequest::all()).await;
        assert_eq!(a, b);
        assert_eq!(a.as_of, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
    }

    #[tokio::test]
    async fn test_unrequested_sections_keep_defaults() {
        let assembler = ReportAssembler::new(
            Sources::from_store(seeded_store().await),
            clock(),
            ReportOptions::default(),
        );
        let report = assembler
            .assemble(&ReportRequest::only([Section::Revenue]))
            .await;
        assert_eq!(report.sections, vec![Section::Revenue]);
        assert!(report.charts.is_empty());
        assert_eq!(report.stats.len(), 6);
        assert_eq!(report.notifications[0].id, "all-caught-up");
        assert_eq!(report.growth, GrowthSummary::default());
    }
}
