//! One async function per report section, plus the value each section
//! falls back to when its branch fails.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::config::ReportOptions;
use crate::error::Result;
use crate::metrics::growth;
use crate::metrics::notifications;
use crate::metrics::source::{CollectionUnion, MetricSource};
use crate::metrics::trend::{self, PeriodUnit};
use crate::metrics::types::{GrowthMetric, MetricResult, Notification, RankingEntry};
use crate::query::metric::{Collection, DateRange, MetricQuery};
use crate::query::period::Period;
use crate::report::{
    ChartSeries, ChartType, Diagnostic, DiagnosticKind, Diagnostics, GrowthSummary,
    RevenueSummary, Section, Sources, StatCard,
};

/// Campaign statuses shown on the status breakdown chart.
const CAMPAIGN_STATUSES: [(&str, &str); 4] = [
    ("active", "Active"),
    ("pending", "Pending"),
    ("completed", "Completed"),
    ("cancelled", "Cancelled"),
];

/// key, label, color, description
const STAT_CARDS: [(&str, &str, &str, &str); 6] = [
    ("total_brands", "Total Brands", "blue", "Registered brand accounts"),
    ("total_influencers", "Total Influencers", "purple", "Registered influencer accounts"),
    ("total_campaigns", "Total Campaigns", "green", "Campaigns created on the platform"),
    ("active_campaigns", "Active Campaigns", "orange", "Campaigns currently running"),
    ("total_customers", "Total Customers", "teal", "Customer accounts"),
    ("total_revenue", "Total Revenue", "indigo", "Completed payment volume"),
];

/// A finished section's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    Stats(Vec<StatCard>),
    Revenue(RevenueSummary),
    Growth(GrowthSummary),
    Ranking(Vec<RankingEntry>),
    Chart(ChartSeries),
    Notifications(Vec<Notification>),
}

/// Everything a branch needs, shared read-only across branches.
pub struct BranchContext {
    pub sources: Arc<Sources>,
    pub options: ReportOptions,
    pub now: DateTime<Utc>,
    pub diagnostics: Diagnostics,
}

impl BranchContext {
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    fn metrics(&self) -> &dyn MetricSource {
        self.sources.metrics.as_ref()
    }

    fn users(&self) -> CollectionUnion<Arc<dyn MetricSource>> {
        CollectionUnion::new(self.sources.metrics.clone(), &Collection::USERS)
    }
}

pub async fn run(section: Section, ctx: &BranchContext) -> Result<SectionData> {
    match section {
        Section::Stats => stats(ctx).await.map(SectionData::Stats),
        Section::Revenue => revenue(ctx).await.map(SectionData::Revenue),
        Section::Growth => growth_summary(ctx).await.map(SectionData::Growth),
        Section::TopBrands => ctx
            .sources
            .top_brands
            .rank(ctx.options.ranking_limit)
            .await
            .map(SectionData::Ranking),
        Section::TopInfluencers => ctx
            .sources
            .top_influencers
            .rank(ctx.options.ranking_limit)
            .await
            .map(SectionData::Ranking),
        Section::TopCampaigns => ctx
            .sources
            .top_campaigns
            .rank(ctx.options.ranking_limit)
            .await
            .map(SectionData::Ranking),
        Section::RevenueTrend | Section::UserTrend | Section::CampaignTrend => {
            trend_chart(section, ctx).await.map(SectionData::Chart)
        }
        Section::CampaignStatus => campaign_status(ctx).await.map(SectionData::Chart),
        Section::Notifications => Ok(SectionData::Notifications(notification_list(ctx).await)),
    }
}

/// The value a section takes when its branch fails, times out, or was not run.
pub fn default_for(section: Section, ctx: &BranchContext) -> SectionData {
    match section {
        Section::Stats => SectionData::Stats(stat_cards([0.0; 6])),
        Section::Revenue => SectionData::Revenue(RevenueSummary::default()),
        Section::Growth => SectionData::Growth(GrowthSummary::default()),
        Section::TopBrands | Section::TopInfluencers | Section::TopCampaigns => {
            SectionData::Ranking(Vec::new())
        }
        Section::RevenueTrend | Section::UserTrend | Section::CampaignTrend => {
            let series = trend::zeroed(ctx.options.trend_months, PeriodUnit::Month, ctx.today());
            SectionData::Chart(chart_for(section, series.labels, series.values))
        }
        Section::CampaignStatus => SectionData::Chart(chart_for(
            section,
            CAMPAIGN_STATUSES.iter().map(|(_, l)| l.to_string()).collect(),
            vec![0.0; CAMPAIGN_STATUSES.len()],
        )),
        Section::Notifications => {
            SectionData::Notifications(vec![notifications::caught_up(ctx.now)])
        }
    }
}

// ── Sections ───────────────────────────────────────────────────────

async fn stats(ctx: &BranchContext) -> Result<Vec<StatCard>> {
    let m = ctx.metrics();
    let brands = MetricQuery::count(Collection::Brands);
    let influencers = MetricQuery::count(Collection::Influencers);
    let campaigns = MetricQuery::count(Collection::Campaigns);
    let active = MetricQuery::count(Collection::Campaigns).status("active");
    let customers = MetricQuery::count(Collection::Customers);
    let revenue = completed_revenue();

    let (brands, influencers, campaigns, active, customers, revenue) = tokio::try_join!(
        m.evaluate(&brands),
        m.evaluate(&influencers),
        m.evaluate(&campaigns),
        m.evaluate(&active),
        m.evaluate(&customers),
        m.evaluate(&revenue),
    )?;

    Ok(stat_cards([
        brands.value,
        influencers.value,
        campaigns.value,
        active.value,
        customers.value,
        revenue.value,
    ]))
}

async fn revenue(ctx: &BranchContext) -> Result<RevenueSummary> {
    let m = ctx.metrics();
    let total = completed_revenue();
    let pending = MetricQuery::sum(Collection::Payments, "amount").status("pending");
    let average = MetricQuery::avg(Collection::Payments, "amount").status("completed");
    let completed = MetricQuery::count(Collection::Payments).status("completed");
    let brands = MetricQuery::distinct(Collection::Payments, "brand_id").status("completed");

    let (total, pending, average, completed, brands) = tokio::try_join!(
        m.evaluate(&total),
        m.evaluate(&pending),
        m.evaluate(&average),
        m.evaluate(&completed),
        m.evaluate(&brands),
    )?;

    Ok(RevenueSummary {
        total_revenue: total.value,
        pending_amount: pending.value,
        average_payment: average.value,
        completed_payments: completed.count(),
        paying_brands: brands.count(),
    })
}

/// Current month against the previous month.
async fn growth_summary(ctx: &BranchContext) -> Result<GrowthSummary> {
    let today = ctx.today();
    let current = Period::Month(today.year(), today.month() as u8);
    let revenue_q = completed_revenue();
    let users_q = MetricQuery::count(Collection::Brands);
    let campaigns_q = MetricQuery::count(Collection::Campaigns);
    let users = ctx.users();

    let revenue = compare(ctx.metrics(), &revenue_q, &current);
    let users = compare(&users, &users_q, &current);
    let campaigns = compare(ctx.metrics(), &campaigns_q, &current);

    let (revenue, users, campaigns) = tokio::try_join!(revenue, users, campaigns)?;
    Ok(GrowthSummary {
        revenue,
        users,
        campaigns,
    })
}

/// Growth of `query` over `period` against the period before it.
pub async fn compare(
    source: &dyn MetricSource,
    query: &MetricQuery,
    period: &Period,
) -> Result<GrowthMetric> {
    let current = query.clone().within(period.window());
    let previous = query.clone().within(period.previous().window());
    let (current, previous) = tokio::try_join!(source.evaluate(&current), source.evaluate(&previous))?;
    Ok(growth::compute(current.value, previous.value))
}

async fn trend_chart(section: Section, ctx: &BranchContext) -> Result<ChartSeries> {
    let months = ctx.options.trend_months;
    let today = ctx.today();
    let series = match section {
        Section::UserTrend => {
            let users = ctx.users();
            let q = MetricQuery::count(Collection::Brands);
            trend::bucketize(&users, &q, months, PeriodUnit::Month, today).await?
        }
        Section::CampaignTrend => {
            let q = MetricQuery::count(Collection::Campaigns);
            trend::bucketize(ctx.metrics(), &q, months, PeriodUnit::Month, today).await?
        }
        _ => {
            let q = completed_revenue();
            trend::bucketize(ctx.metrics(), &q, months, PeriodUnit::Month, today).await?
        }
    };
    Ok(chart_for(section, series.labels, series.values))
}

async fn campaign_status(ctx: &BranchContext) -> Result<ChartSeries> {
    let mut values = Vec::with_capacity(CAMPAIGN_STATUSES.len());
    for (status, _) in CAMPAIGN_STATUSES {
        let q = MetricQuery::count(Collection::Campaigns).status(status);
        values.push(ctx.metrics().evaluate(&q).await?.value);
    }
    let labels = CAMPAIGN_STATUSES.iter().map(|(_, l)| l.to_string()).collect();
    Ok(chart_for(Section::CampaignStatus, labels, values))
}

/// Never fails: a count that cannot be read is treated as zero.
async fn notification_list(ctx: &BranchContext) -> Vec<Notification> {
    let m = ctx.metrics();
    let collabs = MetricQuery::count(Collection::Collaborations).status("pending");
    let payments = MetricQuery::count(Collection::Payments).status("pending");
    let today = ctx.today();
    let back = Days::new(ctx.options.new_user_days.max(0) as u64);
    let window = DateRange::new(
        today.checked_sub_days(back).unwrap_or(NaiveDate::MIN),
        today.succ_opt().unwrap_or(NaiveDate::MAX),
    );
    let signups = MetricQuery::count(Collection::Brands).within(window);
    let users = ctx.users();

    let (collabs, payments, signups) = tokio::join!(
        m.evaluate(&collabs),
        m.evaluate(&payments),
        users.evaluate(&signups),
    );

    let pending_collabs = fail_open(ctx, "pending collaborations", collabs);
    let pending_payments = fail_open(ctx, "pending payments", payments);
    let new_users = fail_open(ctx, "new users", signups);
    notifications::generate(
        pending_collabs,
        pending_payments,
        new_users,
        ctx.options.new_user_days,
        ctx.now,
    )
}

fn fail_open(ctx: &BranchContext, what: &str, result: Result<MetricResult>) -> u64 {
    match result {
        Ok(r) => r.count(),
        Err(e) => {
            log::warn!("notification count '{what}' unavailable, using 0: {e}");
            ctx.diagnostics.record(Diagnostic {
                section: Section::Notifications,
                kind: DiagnosticKind::Degraded,
                message: format!("{what}: {e}"),
            });
            0
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn completed_revenue() -> MetricQuery {
    MetricQuery::sum(Collection::Payments, "amount").status("completed")
}

fn stat_cards(values: [f64; 6]) -> Vec<StatCard> {
    STAT_CARDS
        .iter()
        .zip(values)
        .map(|((key, label, color, description), value)| StatCard {
            key: key.to_string(),
            label: label.to_string(),
            value,
            color: color.to_string(),
            description: description.to_string(),
        })
        .collect()
}

fn chart_for(section: Section, labels: Vec<String>, values: Vec<f64>) -> ChartSeries {
    let (title, chart_id, chart_type) = match section {
        Section::UserTrend => ("User Growth", "userChart", ChartType::Line),
        Section::CampaignTrend => ("Campaigns Launched", "campaignChart", ChartType::Bar),
        Section::CampaignStatus => ("Campaign Status", "campaignStatusChart", ChartType::Doughnut),
        _ => ("Monthly Revenue", "revenueChart", ChartType::Line),
    };
    ChartSeries {
        title: title.to_string(),
        chart_id: chart_id.to_string(),
        chart_type,
        labels,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, SqliteStore};
    use chrono::TimeZone;

    fn ctx_for(db: Database) -> BranchContext {
        let store = SqliteStore::new(db);
        BranchContext {
            sources: Arc::new(Sources::from_store(store)),
            options: ReportOptions::default(),
            now: Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap(),
            diagnostics: Diagnostics::default(),
        }
    }

    #[tokio::test]
    async fn test_stats_on_empty_store_are_zero() {
        let ctx = ctx_for(Database::open_memory().await.unwrap());
        let data = run(Section::Stats, &ctx).await.unwrap();
        assert_eq!(data, default_for(Section::Stats, &ctx));
    }

    #[tokio::test]
    async fn test_growth_month_over_month() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO payments (payment_id, amount, status, created_at, created_date_key) VALUES
                        ('p1', 100, 'completed', '2025-02-03', '2025-02-03'),
                        ('p2', 150, 'completed', '2025-03-02', '2025-03-02'),
                        ('p3', 900, 'pending',   '2025-03-04', '2025-03-04');
                     INSERT INTO brands (brand_id, name, created_at, created_date_key) VALUES
                        ('b1', 'Acme', '2025-03-01', '2025-03-01');
                     INSERT INTO customers (customer_id, name, created_at, created_date_key) VALUES
                        ('c1', 'Cal', '2025-03-09', '2025-03-09');",
                )
            })
            .await
            .unwrap();
        let ctx = ctx_for(db);

        let SectionData::Growth(g) = run(Section::Growth, &ctx).await.unwrap() else {
            panic!("expected growth data");
        };
        assert_eq!(g.revenue.current_value, 150.0);
        assert_eq!(g.revenue.previous_value, 100.0);
        assert_eq!(g.revenue.percent_change, 50.0);
        assert_eq!(g.users.current_value, 2.0);
        assert_eq!(g.users.percent_change, 0.0);
    }

    #[tokio::test]
    async fn test_default_trend_has_configured_length() {
        let ctx = ctx_for(Database::open_memory().await.unwrap());
        let SectionData::Chart(chart) = default_for(Section::RevenueTrend, &ctx) else {
            panic!("expected chart");
        };
        assert_eq!(chart.labels.len(), 6);
        assert_eq!(chart.values, vec![0.0; 6]);
        assert_eq!(chart.labels.last().map(String::as_str), Some("Mar"));
    }

    #[tokio::test]
    async fn test_campaign_status_counts() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO campaigns (campaign_id, name, status, created_at, created_date_key) VALUES
                        ('c1', 'Spring', 'active', '2025-01-01', '2025-01-01'),
                        ('c2', 'Summer', 'active', '2025-01-02', '2025-01-02'),
                        ('c3', 'Fall', 'cancelled', '2025-01-03', '2025-01-03');",
                )
            })
            .await
            .unwrap();
        let ctx = ctx_for(db);
        let SectionData::Chart(chart) = run(Section::CampaignStatus, &ctx).await.unwrap() else {
            panic!("expected chart");
        };
        assert_eq!(chart.labels, vec!["Active", "Pending", "Completed", "Cancelled"]);
        assert_eq!(chart.values, vec![2.0, 0.0, 0.0, 1.0]);
        assert_eq!(chart.chart_type, ChartType::Doughnut);
    }

    #[tokio::test]
    async fn test_ranking_chain_falls_back_to_profiles() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO influencers (influencer_id, name, followers, created_at, created_date_key) VALUES
                        ('i1', 'Ivy', 300, '2025-01-01', '2025-01-01'),
                        ('i2', 'Max', 900, '2025-01-01', '2025-01-01');",
                )
            })
            .await
            .unwrap();
        let ctx = ctx_for(db);
        let SectionData::Ranking(list) = run(Section::TopInfluencers, &ctx).await.unwrap() else {
            panic!("expected ranking");
        };
        let names: Vec<&str> = list.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["Max", "Ivy"]);
    }
}
