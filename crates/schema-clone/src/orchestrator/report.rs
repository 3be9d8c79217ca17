//! Plans and results of a clone pass.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::TableIdentity;
use crate::error::Result;

/// One table of a clone pass and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTable {
    /// Table as it exists at the source.
    pub source: TableIdentity,
    /// Table as it will exist at the target.
    pub target: TableIdentity,
    /// Left alone when it already exists at the target.
    pub shared: bool,
}

/// Outcome of Validate, ExpandTables and the read-only schema check.
#[derive(Debug, Clone, Serialize)]
pub struct ClonePlan {
    /// Tables in dependencies-first order.
    pub tables: Vec<PlannedTable>,
    /// Target schemas that do not exist yet and will be created.
    pub schemas_to_create: Vec<String>,
    /// Source and target share a connection.
    pub same_connection: bool,
}

impl ClonePlan {
    /// Source tables in the order they are created.
    pub fn copy_order(&self) -> Vec<TableIdentity> {
        self.tables.iter().map(|t| t.source.clone()).collect()
    }

    /// Target tables in the order they are dropped. Shared tables are never dropped.
    pub fn drop_order(&self) -> Vec<TableIdentity> {
        self.tables
            .iter()
            .rev()
            .filter(|t| !t.shared)
            .map(|t| t.target.clone())
            .collect()
    }

    /// Tables that may be skipped as shared.
    pub fn shared_tables(&self) -> Vec<TableIdentity> {
        self.tables
            .iter()
            .filter(|t| t.shared)
            .map(|t| t.source.clone())
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// What happened to a table during the copy phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Copied,
    SkippedShared,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub source: String,
    pub target: String,
    pub status: TableStatus,
    /// Rows inserted at the target.
    pub rows: usize,
}

/// Result of a completed clone pass.
#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the pass started.
    pub started_at: DateTime<Utc>,

    /// When the pass completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Schemas created at the target.
    pub schemas_created: Vec<String>,

    /// Tables dropped at the target, in drop order.
    pub tables_dropped: Vec<String>,

    /// Per-table copy outcome, in copy order.
    pub tables: Vec<TableOutcome>,

    /// Total rows inserted.
    pub rows_copied: usize,
}

impl CloneReport {
    pub fn tables_copied(&self) -> usize {
        self.count(TableStatus::Copied)
    }

    pub fn tables_skipped(&self) -> usize {
        self.count(TableStatus::SkippedShared)
    }

    fn count(&self, status: TableStatus) -> usize {
        self.tables.iter().filter(|t| t.status == status).count()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(schema: &str, name: &str, shared: bool) -> PlannedTable {
        PlannedTable {
            source: TableIdentity::new(schema, name),
            target: TableIdentity::new(if shared { schema } else { "archive" }, name),
            shared,
        }
    }

    #[test]
    fn test_plan_orders() {
        let plan = ClonePlan {
            tables: vec![
                planned("ref", "Categories", true),
                planned("dbo", "Orders", false),
                planned("dbo", "OrderLines", false),
            ],
            schemas_to_create: vec!["archive".into()],
            same_connection: true,
        };

        assert_eq!(
            plan.copy_order(),
            vec![
                TableIdentity::new("ref", "Categories"),
                TableIdentity::new("dbo", "Orders"),
                TableIdentity::new("dbo", "OrderLines"),
            ]
        );
        assert_eq!(
            plan.drop_order(),
            vec![
                TableIdentity::new("archive", "OrderLines"),
                TableIdentity::new("archive", "Orders"),
            ]
        );
        assert_eq!(plan.shared_tables(), vec![TableIdentity::new("ref", "Categories")]);
        assert!(plan.to_json().unwrap().contains("\"schemas_to_create\""));
    }

    #[test]
    fn test_report_counts_and_json() {
        let now = Utc::now();
        let report = CloneReport {
            run_id: "run".into(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            schemas_created: vec![],
            tables_dropped: vec![],
            tables: vec![
                TableOutcome {
                    source: "ref.Categories".into(),
                    target: "ref.Categories".into(),
                    status: TableStatus::SkippedShared,
                    rows: 0,
                },
                TableOutcome {
                    source: "dbo.Orders".into(),
                    target: "archive.Orders".into(),
                    status: TableStatus::Copied,
                    rows: 3,
                },
            ],
            rows_copied: 3,
        };

        assert_eq!(report.tables_copied(), 1);
        assert_eq!(report.tables_skipped(), 1);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"skipped_shared\""));
        assert!(json.contains("\"rows_copied\": 3"));
    }
}
