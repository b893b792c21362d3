//! Canonical row model for a Substack export
//!
//! These types are what every engine component consumes. The normalizer is
//! the only code that knows about raw export column names.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Subscription status at the time of export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
}

/// One row of the email list, enriched by the optional details file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Lower-cased, trimmed email address (the join key everywhere)
    pub email: String,
    pub created_at: NaiveDateTime,
    pub plan: Option<String>,
    /// Free subscription source or referrer, when the export carries one
    pub source: Option<String>,
    pub active_subscription: bool,
    pub first_payment_at: Option<NaiveDateTime>,
    pub expiry: Option<NaiveDateTime>,
    pub status: SubscriberStatus,
    pub unsubscribed_at: Option<NaiveDateTime>,
    pub details: Option<SubscriberDetails>,
}

impl Subscriber {
    /// Ever converted to a paid plan
    pub fn is_paid(&self) -> bool {
        self.first_payment_at.is_some()
            || self
                .details
                .as_ref()
                .and_then(|d| d.subscriber_type.as_deref())
                .map(|t| t.to_ascii_lowercase().contains("subscriber"))
                .unwrap_or(false)
    }

    /// Signed up strictly before `cutoff`
    pub fn exists_before(&self, cutoff: NaiveDateTime) -> bool {
        self.created_at < cutoff
    }

    /// Unsubscribed strictly before `cutoff`.
    ///
    /// Undated unsubscribes are placed at `dataset_as_of`.
    pub fn unsubscribed_before(&self, cutoff: NaiveDateTime, dataset_as_of: NaiveDateTime) -> bool {
        match (self.status, self.unsubscribed_at) {
            (_, Some(at)) => at < cutoff,
            (SubscriberStatus::Unsubscribed, None) => dataset_as_of < cutoff,
            (SubscriberStatus::Active, None) => false,
        }
    }

    /// Country from the details file, when present
    pub fn country(&self) -> Option<&str> {
        self.details.as_ref().and_then(|d| d.country.as_deref())
    }
}

/// Per-subscriber engagement counters from `subscriber_details.csv`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriberDetails {
    pub country: Option<String>,
    pub region: Option<String>,
    pub subscriber_type: Option<String>,
    pub source_free: Option<String>,
    pub emails_received_6mo: Option<u64>,
    pub emails_opened_6mo: Option<u64>,
    pub emails_opened_30d: Option<u64>,
    pub total_emails_opened: Option<u64>,
    pub links_clicked: Option<u64>,
    pub post_views: Option<u64>,
    pub post_views_30d: Option<u64>,
    pub comments: Option<u64>,
    pub comments_30d: Option<u64>,
    pub shares: Option<u64>,
    pub shares_30d: Option<u64>,
    pub last_email_open: Option<NaiveDateTime>,
    pub cancel_date: Option<NaiveDateTime>,
    pub revenue: Option<f64>,
}

/// Who a post was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Everyone,
    OnlyPaid,
    OnlyFree,
    Other,
}

impl Audience {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "everyone" | "free" | "all" => Audience::Everyone,
            "only_paid" | "paid" | "paid_only" => Audience::OnlyPaid,
            "only_free" | "free_only" => Audience::OnlyFree,
            _ => Audience::Other,
        }
    }
}

/// A published post from `posts.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: u64,
    pub title: String,
    pub post_date: Option<NaiveDateTime>,
    pub email_sent_at: Option<NaiveDateTime>,
    pub audience: Audience,
    pub post_type: Option<String>,
}

impl Post {
    /// Best timestamp for ordering posts
    pub fn published_at(&self) -> Option<NaiveDateTime> {
        self.email_sent_at.or(self.post_date)
    }
}

/// One post delivered to one subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub post_id: u64,
    pub email: String,
    pub delivered_at: NaiveDateTime,
    /// First recorded open, if any
    pub opened_at: Option<NaiveDateTime>,
    pub clicked: bool,
}

impl DeliveryEvent {
    /// Opened strictly before `cutoff`
    pub fn opened_before(&self, cutoff: NaiveDateTime) -> bool {
        self.opened_at.map(|at| at < cutoff).unwrap_or(false)
    }
}

/// Result that depends on an optional input file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "availability", rename_all = "snake_case")]
pub enum Availability<T> {
    Available { data: T },
    Unavailable { reason: String },
}

impl<T> Availability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Availability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Availability::Available { data } => Some(data),
            Availability::Unavailable { .. } => None,
        }
    }
}
