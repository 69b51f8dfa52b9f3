//! SOQL query construction
//!
//! Extraction issues a single query shape: every described field of a
//! datatype, optionally restricted to records modified after a watermark
//! and by a caller supplied condition, ordered by modification stamp so
//! that consumers can resume from the last record they saw.

use chrono::{DateTime, Utc};
use core_kernel::temporal::to_soql_literal;

/// Field carrying the CRM's last modification stamp
pub const SYSTEM_MODSTAMP: &str = "SystemModstamp";

/// Field carrying the CRM's soft deletion flag
pub const IS_DELETED: &str = "IsDeleted";

/// A structured SOQL query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoqlQuery {
    /// Datatype queried
    pub object: String,
    /// Selected fields, in describe order
    pub fields: Vec<String>,
    /// Only records modified strictly after this instant
    pub modified_after: Option<DateTime<Utc>>,
    /// Raw SOQL condition supplied by the caller
    pub condition: Option<String>,
    /// Whether soft deleted records are returned as well
    pub include_deleted: bool,
}

impl SoqlQuery {
    /// Creates a query selecting `fields` from `object`, deleted rows included
    pub fn new<I, S>(object: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object: object.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            modified_after: None,
            condition: None,
            include_deleted: true,
        }
    }

    /// Restricts the query to records modified after `since`
    ///
    /// The filter has second precision. `since` is truncated to the whole
    /// second, so records modified earlier within that same second are
    /// returned again rather than skipped.
    pub fn modified_after(mut self, since: DateTime<Utc>) -> Self {
        self.modified_after = Some(since);
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        let condition = condition.into();
        if !condition.trim().is_empty() {
            self.condition = Some(condition);
        }
        self
    }

    /// Renders the query as SOQL text
    pub fn to_soql(&self) -> String {
        let mut soql = format!("SELECT {} FROM {}", self.fields.join(", "), self.object);

        let mut predicates = Vec::new();
        if let Some(since) = &self.modified_after {
            predicates.push(format!("{} > {}", SYSTEM_MODSTAMP, to_soql_literal(since)));
        }
        if let Some(condition) = &self.condition {
            predicates.push(format!("({})", condition));
        }
        if !predicates.is_empty() {
            soql.push_str(" WHERE ");
            soql.push_str(&predicates.join(" AND "));
        }

        soql.push_str(" ORDER BY ");
        soql.push_str(SYSTEM_MODSTAMP);
        soql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_full_extraction_query() {
        let query = SoqlQuery::new("Account", ["Id", "Name", "SystemModstamp"]);
        assert_eq!(
            query.to_soql(),
            "SELECT Id, Name, SystemModstamp FROM Account ORDER BY SystemModstamp"
        );
        assert!(query.include_deleted);
    }

    #[test]
    fn test_incremental_query_with_condition() {
        let since = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
        let query = SoqlQuery::new("Account", ["Id"])
            .modified_after(since)
            .condition("Name = 'Acme' OR Name = 'Globex'");

        assert_eq!(
            query.to_soql(),
            "SELECT Id FROM Account WHERE SystemModstamp > 2023-01-01T10:00:00Z \
             AND (Name = 'Acme' OR Name = 'Globex') ORDER BY SystemModstamp"
        );
    }

    #[test]
    fn test_sub_second_since_is_truncated_to_an_inclusive_bound() {
        let since = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        let query = SoqlQuery::new("Account", ["Id"]).modified_after(since);

        assert_eq!(query.modified_after, Some(since));
        assert_eq!(
            query.to_soql(),
            "SELECT Id FROM Account WHERE SystemModstamp > 2023-01-01T10:00:00Z \
             ORDER BY SystemModstamp"
        );
    }

    #[test]
    fn test_blank_condition_is_ignored() {
        let query = SoqlQuery::new("Account", ["Id"]).condition("   ");
        assert_eq!(query.condition, None);
    }
}
