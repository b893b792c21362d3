//! `posts.csv` normalization

use std::collections::BTreeMap;

use super::columns::{ColumnMap, FieldSpec};
use super::reader::CsvTable;
use super::values::{parse_bool, parse_post_id};
use super::FileReport;
use crate::model::{Audience, Post};
use crate::time::parse_timestamp;
use crate::Result;

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("post_id", &["post_id", "id"]),
    FieldSpec::optional("title", &["title"]),
    FieldSpec::optional("post_date", &["post_date", "published_at", "date"]),
    FieldSpec::optional("email_sent_at", &["email_sent_at", "sent_at"]),
    FieldSpec::optional("is_published", &["is_published", "published"]),
    FieldSpec::optional("audience", &["audience"]),
    FieldSpec::optional("type", &["type", "post_type"]),
];

/// Build the published posts, ordered by publish time then id.
///
/// Unpublished posts are dropped silently; rows with an unusable id are
/// counted as skipped.
pub fn normalize_posts(table: &CsvTable) -> Result<(Vec<Post>, FileReport)> {
    let columns = ColumnMap::resolve(&table.file, &table.headers, FIELDS)?;
    let mut report = FileReport::new(&table.file, table.records.len() + table.malformed);
    report.rows_skipped = table.malformed;

    let mut posts: BTreeMap<u64, Post> = BTreeMap::new();
    for record in &table.records {
        let Some(post_id) = columns.get(record, "post_id").and_then(parse_post_id) else {
            report.rows_skipped += 1;
            continue;
        };
        let published = columns
            .get(record, "is_published")
            .and_then(parse_bool)
            .unwrap_or(true);
        if !published {
            continue;
        }

        posts.insert(
            post_id,
            Post {
                post_id,
                title: columns
                    .get(record, "title")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Post {}", post_id)),
                post_date: columns.get(record, "post_date").and_then(parse_timestamp),
                email_sent_at: columns.get(record, "email_sent_at").and_then(parse_timestamp),
                audience: columns
                    .get(record, "audience")
                    .map(Audience::parse)
                    .unwrap_or(Audience::Everyone),
                post_type: columns.get(record, "type").map(str::to_string),
            },
        );
    }

    let mut posts: Vec<Post> = posts.into_values().collect();
    posts.sort_by_key(|p| (p.published_at(), p.post_id));
    report.rows_loaded = posts.len();
    Ok((posts, report))
}
