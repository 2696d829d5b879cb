use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::date_util::date_key;
use crate::error::Error;
use crate::query::metric::Collection;

// ── Records ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRecord {
    pub brand_id: String,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluencerRecord {
    pub influencer_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub followers: i64,
    #[serde(default = "default_active")]
    pub status: String,
    pub created_at: String,
}

/// A point-in-time analytics snapshot for an influencer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluencerSnapshot {
    pub influencer_id: String,
    pub followers: i64,
    #[serde(default)]
    pub engagement_rate: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub campaign_id: String,
    #[serde(default)]
    pub brand_id: Option<String>,
    pub name: String,
    #[serde(default = "default_pending")]
    pub status: String,
    #[serde(default)]
    pub budget: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationRecord {
    pub collaboration_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub influencer_id: Option<String>,
    #[serde(default = "default_pending")]
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: String,
    #[serde(default)]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub influencer_id: Option<String>,
    pub amount: f64,
    #[serde(default = "default_pending")]
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: String,
}

fn default_active() -> String {
    "active".to_string()
}

fn default_pending() -> String {
    "pending".to_string()
}

/// A bulk-loadable snapshot of every collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub brands: Vec<BrandRecord>,
    #[serde(default)]
    pub influencers: Vec<InfluencerRecord>,
    #[serde(default)]
    pub influencer_analytics: Vec<InfluencerSnapshot>,
    #[serde(default)]
    pub campaigns: Vec<CampaignRecord>,
    #[serde(default)]
    pub collaborations: Vec<CollaborationRecord>,
    #[serde(default)]
    pub payments: Vec<PaymentRecord>,
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
}

/// Rows written per collection by an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub brands: usize,
    pub influencers: usize,
    pub influencer_analytics: usize,
    pub campaigns: usize,
    pub collaborations: usize,
    pub payments: usize,
    pub customers: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.brands
            + self.influencers
            + self.influencer_analytics
            + self.campaigns
            + self.collaborations
            + self.payments
            + self.customers
    }
}

// ── Inserts ────────────────────────────────────────────────────────

pub fn upsert_brand(conn: &Connection, b: &BrandRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO brands (brand_id, name, industry, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(brand_id) DO UPDATE SET
            name=excluded.name, industry=excluded.industry, status=excluded.status,
            created_at=excluded.created_at, created_date_key=excluded.created_date_key",
        params![
            b.brand_id,
            b.name,
            b.industry,
            b.status,
            b.created_at,
            date_key_from_iso(&b.created_at)?
        ],
    )?;
    Ok(())
}

pub fn upsert_influencer(conn: &Connection, i: &InfluencerRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO influencers (influencer_id, name, category, followers, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(influencer_id) DO UPDATE SET
            name=excluded.name, category=excluded.category, followers=excluded.followers,
            status=excluded.status, created_at=excluded.created_at,
            created_date_key=excluded.created_date_key",
        params![
            i.influencer_id,
            i.name,
            i.category,
            i.followers,
            i.status,
            i.created_at,
            date_key_from_iso(&i.created_at)?
        ],
    )?;
    Ok(())
}

pub fn insert_influencer_snapshot(
    conn: &Connection,
    s: &InfluencerSnapshot,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO influencer_analytics (influencer_id, followers, engagement_rate, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            s.influencer_id,
            s.followers,
            s.engagement_rate,
            s.created_at,
            date_key_from_iso(&s.created_at)?
        ],
    )?;
    Ok(())
}

pub fn upsert_campaign(conn: &Connection, c: &CampaignRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO campaigns (campaign_id, brand_id, name, status, budget, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(campaign_id) DO UPDATE SET
            brand_id=excluded.brand_id, name=excluded.name, status=excluded.status,
            budget=excluded.budget, created_at=excluded.created_at,
            created_date_key=excluded.created_date_key",
        params![
            c.campaign_id,
            c.brand_id,
            c.name,
            c.status,
            c.budget,
            c.created_at,
            date_key_from_iso(&c.created_at)?
        ],
    )?;
    Ok(())
}

pub fn upsert_collaboration(
    conn: &Connection,
    c: &CollaborationRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO collaborations (collaboration_id, campaign_id, influencer_id, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(collaboration_id) DO UPDATE SET
            campaign_id=excluded.campaign_id, influencer_id=excluded.influencer_id,
            status=excluded.status, created_at=excluded.created_at,
            created_date_key=excluded.created_date_key",
        params![
            c.collaboration_id,
            c.campaign_id,
            c.influencer_id,
            c.status,
            c.created_at,
            date_key_from_iso(&c.created_at)?
        ],
    )?;
    Ok(())
}

pub fn upsert_payment(conn: &Connection, p: &PaymentRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO payments (payment_id, brand_id, campaign_id, influencer_id, amount, status, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(payment_id) DO UPDATE SET
            brand_id=excluded.brand_id, campaign_id=excluded.campaign_id,
            influencer_id=excluded.influencer_id, amount=excluded.amount,
            status=excluded.status, created_at=excluded.created_at,
            created_date_key=excluded.created_date_key",
        params![
            p.payment_id,
            p.brand_id,
            p.campaign_id,
            p.influencer_id,
            p.amount,
            p.status,
            p.created_at,
            date_key_from_iso(&p.created_at)?
        ],
    )?;
    Ok(())
}

pub fn upsert_customer(conn: &Connection, c: &CustomerRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO customers (customer_id, name, email, created_at, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(customer_id) DO UPDATE SET
            name=excluded.name, email=excluded.email, created_at=excluded.created_at,
            created_date_key=excluded.created_date_key",
        params![
            c.customer_id,
            c.name,
            c.email,
            c.created_at,
            date_key_from_iso(&c.created_at)?
        ],
    )?;
    Ok(())
}

/// Load a dataset in one transaction.
pub fn import_dataset(
    conn: &mut Connection,
    data: &Dataset,
) -> Result<ImportSummary, rusqlite::Error> {
    let tx = conn.transaction()?;
    for b in &data.brands {
        upsert_brand(&tx, b)?;
    }
    for i in &data.influencers {
        upsert_influencer(&tx, i)?;
    }
    for s in &data.influencer_analytics {
        insert_influencer_snapshot(&tx, s)?;
    }
    for c in &data.campaigns {
        upsert_campaign(&tx, c)?;
    }
    for c in &data.collaborations {
        upsert_collaboration(&tx, c)?;
    }
    for p in &data.payments {
        upsert_payment(&tx, p)?;
    }
    for c in &data.customers {
        upsert_customer(&tx, c)?;
    }
    tx.commit()?;

    Ok(ImportSummary {
        brands: data.brands.len(),
        influencers: data.influencers.len(),
        influencer_analytics: data.influencer_analytics.len(),
        campaigns: data.campaigns.len(),
        collaborations: data.collaborations.len(),
        payments: data.payments.len(),
        customers: data.customers.len(),
    })
}

// ── Status ─────────────────────────────────────────────────────────

/// Row count for every collection, in `Collection::ALL` order.
pub fn collection_counts(conn: &Connection) -> Result<Vec<(Collection, i64)>, rusqlite::Error> {
    Collection::ALL
        .iter()
        .map(|c| {
            let sql = format!("SELECT COUNT(*) FROM {}", c.table());
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok((*c, n))
        })
        .collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Helpers ────────────────────────────────────────────────────────

/// `created_date_key` for an RFC 3339 timestamp, a naive `YYYY-MM-DD[T ]HH:MM:SS`
/// timestamp or a bare `YYYY-MM-DD` date.
fn date_key_from_iso(iso: &str) -> Result<String, rusqlite::Error> {
    let s = iso.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map(date_key)
        .map_err(|_| {
            rusqlite::Error::ToSqlConversionFailure(Box::new(Error::InvalidArgument(format!(
                "invalid created_at timestamp: {iso:?}"
            ))))
        })
}
