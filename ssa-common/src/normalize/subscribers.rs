//! Email list (`email_list*.csv`) normalization

use std::collections::HashMap;

use tracing::debug;

use super::columns::{ColumnMap, FieldSpec};
use super::reader::CsvTable;
use super::values::{normalize_email, parse_bool};
use super::FileReport;
use crate::model::{Subscriber, SubscriberStatus};
use crate::time::parse_timestamp;
use crate::Result;

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("email", &["email", "email_address", "subscriber_email"]),
    FieldSpec::required(
        "created_at",
        &["created_at", "subscription_date", "subscribed_at", "start_date", "created"],
    ),
    FieldSpec::optional("plan", &["plan", "subscription_plan", "stripe_plan"]),
    FieldSpec::optional("active_subscription", &["active_subscription", "is_active"]),
    FieldSpec::optional(
        "first_payment_at",
        &["first_payment_at", "first_paid_date", "paid_upgrade_date"],
    ),
    FieldSpec::optional("expiry", &["expiry", "expiration_date", "expires_at"]),
    FieldSpec::optional("email_disabled", &["email_disabled", "unsubscribed", "is_unsubscribed"]),
    FieldSpec::optional(
        "unsubscribed_at",
        &["unsubscribed_at", "unsubscribe_date", "email_disabled_at"],
    ),
    FieldSpec::optional(
        "source",
        &["source", "subscription_source", "subscription_source_free", "referrer"],
    ),
];

/// Build subscribers from the email list.
///
/// Rows without a usable email or signup date are skipped. Duplicate emails
/// keep the earliest signup.
pub fn normalize_subscribers(table: &CsvTable) -> Result<(Vec<Subscriber>, FileReport)> {
    let columns = ColumnMap::resolve(&table.file, &table.headers, FIELDS)?;
    let mut report = FileReport::new(&table.file, table.records.len() + table.malformed);
    report.rows_skipped = table.malformed;

    let mut by_email: HashMap<String, Subscriber> = HashMap::new();
    for record in &table.records {
        let email = columns.get(record, "email").and_then(normalize_email);
        let created_at = columns.get(record, "created_at").and_then(parse_timestamp);
        let (Some(email), Some(created_at)) = (email, created_at) else {
            report.rows_skipped += 1;
            continue;
        };

        let unsubscribed_at = columns.get(record, "unsubscribed_at").and_then(parse_timestamp);
        let disabled = columns
            .get(record, "email_disabled")
            .and_then(parse_bool)
            .unwrap_or(false);
        let status = if disabled || unsubscribed_at.is_some() {
            SubscriberStatus::Unsubscribed
        } else {
            SubscriberStatus::Active
        };

        let subscriber = Subscriber {
            email: email.clone(),
            created_at,
            plan: columns.get(record, "plan").map(str::to_string),
            source: columns.get(record, "source").map(str::to_string),
            active_subscription: columns
                .get(record, "active_subscription")
                .and_then(parse_bool)
                .unwrap_or(false),
            first_payment_at: columns.get(record, "first_payment_at").and_then(parse_timestamp),
            expiry: columns.get(record, "expiry").and_then(parse_timestamp),
            status,
            unsubscribed_at,
            details: None,
        };

        match by_email.get(&email) {
            Some(existing) if existing.created_at <= subscriber.created_at => {
                debug!("{}: duplicate subscriber {} ignored", table.file, email);
            }
            _ => {
                by_email.insert(email, subscriber);
            }
        }
    }

    let mut subscribers: Vec<Subscriber> = by_email.into_values().collect();
    subscribers.sort_by(|a, b| a.email.cmp(&b.email));
    report.rows_loaded = subscribers.len();
    Ok((subscribers, report))
}
