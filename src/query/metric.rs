use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};

/// A domain record collection the engine can aggregate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Brands,
    Influencers,
    InfluencerAnalytics,
    Campaigns,
    Collaborations,
    Payments,
    Customers,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Brands,
        Collection::Influencers,
        Collection::InfluencerAnalytics,
        Collection::Campaigns,
        Collection::Collaborations,
        Collection::Payments,
        Collection::Customers,
    ];

    /// Collections whose rows are people signing up to the marketplace.
    pub const USERS: [Collection; 3] = [
        Collection::Brands,
        Collection::Influencers,
        Collection::Customers,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Collection::Brands => "brands",
            Collection::Influencers => "influencers",
            Collection::InfluencerAnalytics => "influencer_analytics",
            Collection::Campaigns => "campaigns",
            Collection::Collaborations => "collaborations",
            Collection::Payments => "payments",
            Collection::Customers => "customers",
        }
    }

    /// Every field a query may reference.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Collection::Brands => &["brand_id", "name", "industry", "status", "created_date_key"],
            Collection::Influencers => &[
                "influencer_id",
                "name",
                "category",
                "followers",
                "status",
                "created_date_key",
            ],
            Collection::InfluencerAnalytics => &[
                "influencer_id",
                "followers",
                "engagement_rate",
                "created_date_key",
            ],
            Collection::Campaigns => &[
                "campaign_id",
                "brand_id",
                "name",
                "status",
                "budget",
                "created_date_key",
            ],
            Collection::Collaborations => &[
                "collaboration_id",
                "campaign_id",
                "influencer_id",
                "status",
                "created_date_key",
            ],
            Collection::Payments => &[
                "payment_id",
                "brand_id",
                "campaign_id",
                "influencer_id",
                "amount",
                "status",
                "created_date_key",
            ],
            Collection::Customers => &["customer_id", "name", "email", "created_date_key"],
        }
    }

    /// Fields that can be summed, averaged or maximised.
    pub fn numeric_fields(&self) -> &'static [&'static str] {
        match self {
            Collection::Influencers => &["followers"],
            Collection::InfluencerAnalytics => &["followers", "engagement_rate"],
            Collection::Campaigns => &["budget"],
            Collection::Payments => &["amount"],
            _ => &[],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    pub(crate) fn check_field(&self, field: &str) -> Result<()> {
        if self.has_field(field) {
            Ok(())
        } else {
            Err(Error::InvalidQuery(format!(
                "unknown field '{field}' on {}",
                self.table()
            )))
        }
    }

    pub(crate) fn check_numeric(&self, field: &str) -> Result<()> {
        self.check_field(field)?;
        if self.numeric_fields().contains(&field) {
            Ok(())
        } else {
            Err(Error::InvalidQuery(format!(
                "field '{field}' on {} is not numeric",
                self.table()
            )))
        }
    }
}

/// How matched rows collapse into one number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    Count,
    Sum(String),
    Avg(String),
    Max(String),
    /// Number of distinct values of the field.
    Distinct(String),
}

impl Reduction {
    pub fn sum(field: &str) -> Self {
        Reduction::Sum(field.to_string())
    }

    pub fn avg(field: &str) -> Self {
        Reduction::Avg(field.to_string())
    }

    pub fn max(field: &str) -> Self {
        Reduction::Max(field.to_string())
    }

    pub fn distinct(field: &str) -> Self {
        Reduction::Distinct(field.to_string())
    }

    pub(crate) fn validate(&self, collection: Collection) -> Result<()> {
        match self {
            Reduction::Count => Ok(()),
            Reduction::Sum(f) | Reduction::Avg(f) | Reduction::Max(f) => collection.check_numeric(f),
            Reduction::Distinct(f) => collection.check_field(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Integer(n)
    }
}

/// Equality predicate on one field, e.g. `status = "completed"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: FilterValue,
}

/// Half-open date window `[start, end)` applied to a record's creation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

/// What to count/sum/average, over which collection, restricted how.
/// Built fresh for every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub collection: Collection,
    pub reduction: Reduction,
    pub filters: Vec<Filter>,
    pub range: Option<DateRange>,
}

impl MetricQuery {
    pub fn count(collection: Collection) -> Self {
        Self {
            collection,
            reduction: Reduction::Count,
            filters: Vec::new(),
            range: None,
        }
    }

    pub fn sum(collection: Collection, field: &str) -> Self {
        Self::count(collection).reduce(Reduction::sum(field))
    }

    pub fn avg(collection: Collection, field: &str) -> Self {
        Self::count(collection).reduce(Reduction::avg(field))
    }

    pub fn distinct(collection: Collection, field: &str) -> Self {
        Self::count(collection).reduce(Reduction::distinct(field))
    }

    pub fn reduce(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn filter(mut self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn status(self, status: &str) -> Self {
        self.filter("status", status)
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    /// The same query aimed at another collection. Used to union signups
    /// across the user collections.
    pub fn on(&self, collection: Collection) -> Self {
        Self {
            collection,
            ..self.clone()
        }
    }

    /// Reject references to fields the collection does not have.
    pub fn validate(&self) -> Result<()> {
        self.reduction.validate(self.collection)?;
        for f in &self.filters {
            self.collection.check_field(&f.field)?;
        }
        if let Some(r) = &self.range {
            if r.end < r.start {
                return Err(Error::InvalidQuery(format!(
                    "date range ends ({}) before it starts ({})",
                    r.end, r.start
                )));
            }
        }
        Ok(())
    }
}
