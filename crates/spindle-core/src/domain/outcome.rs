//! Execution outcomes crossing the worker/dispatcher boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row: column name → cell value, in column order.
pub type Row = serde_json::Map<String, Value>;

/// What a statement produced.
///
/// Query mode yields the ordered rows; mutate mode yields the summary
/// (`last_insert_id` is the store's `last_insert_rowid()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecOutcome {
    Rows(Vec<Row>),
    Mutation {
        last_insert_id: i64,
        rows_changed: u64,
    },
}

impl ExecOutcome {
    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            ExecOutcome::Rows(rows) => Some(rows),
            ExecOutcome::Mutation { .. } => None,
        }
    }

    pub fn as_mutation(&self) -> Option<(i64, u64)> {
        match self {
            ExecOutcome::Rows(_) => None,
            ExecOutcome::Mutation {
                last_insert_id,
                rows_changed,
            } => Some((*last_insert_id, *rows_changed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        let mutation = ExecOutcome::Mutation {
            last_insert_id: 7,
            rows_changed: 1,
        };
        assert_eq!(mutation.as_mutation(), Some((7, 1)));
        assert!(mutation.into_rows().is_none());

        let rows = ExecOutcome::Rows(vec![Row::new()]);
        assert!(rows.as_mutation().is_none());
        assert_eq!(rows.into_rows().unwrap().len(), 1);
    }

    #[test]
    fn outcome_round_trips_through_json() {
        let outcome = ExecOutcome::Mutation {
            last_insert_id: 42,
            rows_changed: 3,
        };
        let serialized = serde_json::to_string(&outcome).unwrap();
        let deserialized: ExecOutcome = serde_json::from_str(&serialized).unwrap();
        assert_eq!(outcome, deserialized);
    }
}
