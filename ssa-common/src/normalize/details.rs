//! Optional `subscriber_details.csv` normalization
//!
//! The details export uses human-readable headers ("Emails opened (6mo)",
//! "State/Province"); every field here is optional except the email key.

use std::collections::HashMap;

use super::columns::{ColumnMap, FieldSpec};
use super::reader::CsvTable;
use super::values::{normalize_country, normalize_email, parse_count, parse_money};
use super::FileReport;
use crate::model::SubscriberDetails;
use crate::time::parse_timestamp;
use crate::Result;

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("email", &["email", "email_address"]),
    FieldSpec::optional("country", &["country"]),
    FieldSpec::optional("region", &["state_province", "state", "region", "province"]),
    FieldSpec::optional("subscriber_type", &["type", "subscriber_type"]),
    FieldSpec::optional(
        "source_free",
        &["subscription_source_free", "source_free", "subscription_source"],
    ),
    FieldSpec::optional("emails_received_6mo", &["emails_received_6mo"]),
    FieldSpec::optional("emails_opened_6mo", &["emails_opened_6mo"]),
    FieldSpec::optional("emails_opened_30d", &["emails_opened_30d"]),
    FieldSpec::optional("total_emails_opened", &["num_emails_opened", "total_emails_opened", "emails_opened"]),
    FieldSpec::optional("links_clicked", &["links_clicked"]),
    FieldSpec::optional("post_views", &["post_views"]),
    FieldSpec::optional("post_views_30d", &["post_views_30d"]),
    FieldSpec::optional("comments", &["comments"]),
    FieldSpec::optional("comments_30d", &["comments_30d"]),
    FieldSpec::optional("shares", &["shares"]),
    FieldSpec::optional("shares_30d", &["shares_30d"]),
    FieldSpec::optional("last_email_open", &["last_email_open", "last_opened_at"]),
    FieldSpec::optional("cancel_date", &["cancel_date"]),
    FieldSpec::optional("revenue", &["revenue"]),
];

/// Parse details rows keyed by normalized email
pub fn normalize_details(
    table: &CsvTable,
) -> Result<(HashMap<String, SubscriberDetails>, FileReport)> {
    let columns = ColumnMap::resolve(&table.file, &table.headers, FIELDS)?;
    let mut report = FileReport::new(&table.file, table.records.len() + table.malformed);
    report.rows_skipped = table.malformed;

    let mut details = HashMap::new();
    for record in &table.records {
        let Some(email) = columns.get(record, "email").and_then(normalize_email) else {
            report.rows_skipped += 1;
            continue;
        };

        let count = |field: &str| columns.get(record, field).and_then(parse_count);
        let row = SubscriberDetails {
            country: columns.get(record, "country").and_then(normalize_country),
            region: columns.get(record, "region").map(str::to_string),
            subscriber_type: columns.get(record, "subscriber_type").map(str::to_string),
            source_free: columns.get(record, "source_free").map(str::to_string),
            emails_received_6mo: count("emails_received_6mo"),
            emails_opened_6mo: count("emails_opened_6mo"),
            emails_opened_30d: count("emails_opened_30d"),
            total_emails_opened: count("total_emails_opened"),
            links_clicked: count("links_clicked"),
            post_views: count("post_views"),
            post_views_30d: count("post_views_30d"),
            comments: count("comments"),
            comments_30d: count("comments_30d"),
            shares: count("shares"),
            shares_30d: count("shares_30d"),
            last_email_open: columns.get(record, "last_email_open").and_then(parse_timestamp),
            cancel_date: columns.get(record, "cancel_date").and_then(parse_timestamp),
            revenue: columns.get(record, "revenue").and_then(parse_money),
        };
        details.insert(email, row);
    }
    report.rows_loaded = details.len();
    Ok((details, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::reader::read_table;

    #[test]
    fn test_human_readable_headers() {
        let csv = "Email,Country,State/Province,Type,Subscription source (free),Emails received (6mo),\
                   Emails opened (6mo),num_emails_opened,Post views,Comments,Shares,Last email open,Revenue\n\
                   A@x.com, us ,CA,Free,substack-app,\"1,024\",12,40,7,1,0,2024-05-01T00:00:00.000Z,$0\n";
        let table = read_table("subscriber_details.csv", csv.as_bytes()).unwrap();
        let (details, report) = normalize_details(&table).unwrap();

        assert_eq!(report.rows_skipped, 0);
        let d = &details["a@x.com"];
        assert_eq!(d.country.as_deref(), Some("US"));
        assert_eq!(d.region.as_deref(), Some("CA"));
        assert_eq!(d.source_free.as_deref(), Some("substack-app"));
        assert_eq!(d.emails_received_6mo, Some(1024));
        assert_eq!(d.total_emails_opened, Some(40));
        assert_eq!(d.comments, Some(1));
        assert_eq!(d.shares_30d, None);
        assert_eq!(d.revenue, Some(0.0));
        assert!(d.last_email_open.is_some());
    }

    #[test]
    fn test_missing_email_column_fails() {
        let table = read_table("subscriber_details.csv", b"Country,Type\nUS,Free\n").unwrap();
        assert!(normalize_details(&table).is_err());
    }
}
