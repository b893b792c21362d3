//! Column alias resolution
//!
//! Substack has renamed export columns across versions ("created_at" vs
//! "Start date", "num_emails_opened" vs "Emails opened"). Each canonical field
//! lists every spelling seen; headers are compared after dropping everything
//! but ASCII alphanumerics and lower-casing.

use csv::StringRecord;
use std::collections::HashMap;

use crate::{Error, Result};

/// One canonical field and the header spellings that map onto it
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            aliases,
            required: false,
        }
    }
}

/// Reduce a header cell to its comparable form
///
/// ```
/// use ssa_common::normalize::columns::canonical_header;
///
/// assert_eq!(canonical_header("Emails opened (6mo)"), "emailsopened6mo");
/// assert_eq!(canonical_header(" created_at "), "createdat");
/// assert_eq!(canonical_header("State/Province"), "stateprovince");
/// ```
pub fn canonical_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Header positions of the canonical fields present in one file
#[derive(Debug, Clone)]
pub struct ColumnMap {
    indices: HashMap<&'static str, usize>,
}

impl ColumnMap {
    /// Match `headers` against `fields`.
    ///
    /// Fails with `UnsupportedExportVersion` when nothing matches and with
    /// `MissingRequiredColumn` when a required field has no matching header.
    pub fn resolve(file: &str, headers: &StringRecord, fields: &[FieldSpec]) -> Result<Self> {
        let canonical: Vec<String> = headers.iter().map(canonical_header).collect();
        let mut indices = HashMap::new();

        for field in fields {
            let position = field.aliases.iter().find_map(|alias| {
                let wanted = canonical_header(alias);
                canonical.iter().position(|h| *h == wanted)
            });
            if let Some(idx) = position {
                indices.insert(field.name, idx);
            }
        }

        if indices.is_empty() {
            return Err(Error::UnsupportedExportVersion {
                file: file.to_string(),
            });
        }

        if let Some(missing) = fields
            .iter()
            .find(|f| f.required && !indices.contains_key(f.name))
        {
            return Err(Error::MissingRequiredColumn {
                file: file.to_string(),
                column: missing.name.to_string(),
            });
        }

        Ok(Self { indices })
    }

    pub fn has(&self, field: &str) -> bool {
        self.indices.contains_key(field)
    }

    /// Trimmed, non-empty cell value for `field`
    pub fn get<'r>(&self, record: &'r StringRecord, field: &str) -> Option<&'r str> {
        self.indices
            .get(field)
            .and_then(|&idx| record.get(idx))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::required("email", &["email", "email_address"]),
        FieldSpec::required("created_at", &["created_at", "Start date"]),
        FieldSpec::optional("plan", &["plan"]),
    ];

    #[test]
    fn test_resolves_alternate_spellings() {
        let headers = StringRecord::from(vec!["Email Address", "Start Date", "other"]);
        let map = ColumnMap::resolve("email_list.csv", &headers, FIELDS).unwrap();
        assert!(map.has("email"));
        assert!(map.has("created_at"));
        assert!(!map.has("plan"));

        let row = StringRecord::from(vec![" a@b.co ", "2024-01-01", "x"]);
        assert_eq!(map.get(&row, "email"), Some("a@b.co"));
        assert_eq!(map.get(&row, "plan"), None);
    }

    #[test]
    fn test_missing_required_column_is_named() {
        let headers = StringRecord::from(vec!["email", "plan"]);
        let err = ColumnMap::resolve("email_list.csv", &headers, FIELDS).unwrap_err();
        assert_eq!(
            err,
            Error::MissingRequiredColumn {
                file: "email_list.csv".to_string(),
                column: "created_at".to_string()
            }
        );
    }

    #[test]
    fn test_unrecognized_header_is_unsupported_version() {
        let headers = StringRecord::from(vec!["foo", "bar"]);
        let err = ColumnMap::resolve("posts.csv", &headers, FIELDS).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExportVersion { .. }));
    }

    #[test]
    fn test_short_rows_yield_none() {
        let headers = StringRecord::from(vec!["email", "created_at", "plan"]);
        let map = ColumnMap::resolve("f.csv", &headers, FIELDS).unwrap();
        let row = StringRecord::from(vec!["a@b.co"]);
        assert_eq!(map.get(&row, "created_at"), None);
    }
}
