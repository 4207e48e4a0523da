//! T-SQL fragment builder for staging-table writes.
//!
//! Everything here is pure string assembly over [`ColumnDescriptor`]s and
//! caller-supplied column names. Identifiers are inserted as given; this is
//! the one place to change if they ever need quoting.
//!
//! Fragment order always follows the descriptor order, except the key
//! predicate, which follows the caller's primary key order.

use std::collections::HashSet;

use crate::schema::ColumnDescriptor;

/// Declared type name that receives a `(precision,scale)` suffix.
const DECIMAL_TYPE: &str = "decimal";

/// Render one staging-table column definition.
///
/// `[<name>] <type>[(<len>|max)][(<precision>,<scale>)] NOT NULL|NULL`
pub fn staging_column_clause(column: &ColumnDescriptor) -> String {
    let mut clause = format!("[{}] {}", column.name, column.sql_type);

    if let Some(max_length) = column.max_length {
        if max_length == -1 {
            clause.push_str("(max)");
        } else {
            clause.push_str(&format!("({})", max_length));
        }
    }

    if column.sql_type == DECIMAL_TYPE {
        if let Some(precision) = column.numeric_precision {
            let scale = column.numeric_scale.unwrap_or(0);
            clause.push_str(&format!("({},{})", precision, scale));
        }
    }

    clause.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
    clause
}

/// `target.<col>=source.<col>`
fn assignment(column: &str) -> String {
    format!("target.{0}=source.{0}", column)
}

/// Fragments for a bulk UPDATE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateClauses {
    pub create_table: Vec<String>,
    pub assignments: Vec<String>,
}

/// Fragments for a bulk UPSERT (MERGE).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertClauses {
    pub create_table: Vec<String>,
    pub matches: Vec<String>,
    pub assignments: Vec<String>,
    pub insert_columns: Vec<String>,
    pub insert_values: Vec<String>,
}

/// Fragments for a bulk DELETE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteClauses {
    pub create_table: Vec<String>,
}

/// Clause set of one write, by operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseSet {
    Update(UpdateClauses),
    Upsert(UpsertClauses),
    Delete(DeleteClauses),
}

impl ClauseSet {
    /// Staging-table column definitions.
    pub fn create_table_clauses(&self) -> &[String] {
        match self {
            ClauseSet::Update(c) => &c.create_table,
            ClauseSet::Upsert(c) => &c.create_table,
            ClauseSet::Delete(c) => &c.create_table,
        }
    }
}

/// Build UPDATE fragments.
///
/// Primary keys never get an assignment. A non-empty `fields_to_update`
/// further restricts assignments to the listed columns.
pub fn update_clauses(
    columns: &[ColumnDescriptor],
    primary_keys: &[&str],
    fields_to_update: &[&str],
) -> UpdateClauses {
    let pks: HashSet<&str> = primary_keys.iter().copied().collect();
    let only: HashSet<&str> = fields_to_update.iter().copied().collect();

    let mut clauses = UpdateClauses::default();
    for column in columns {
        clauses.create_table.push(staging_column_clause(column));

        let name = column.name.as_str();
        if pks.contains(name) {
            continue;
        }
        if !only.is_empty() && !only.contains(name) {
            continue;
        }
        clauses.assignments.push(assignment(name));
    }
    clauses
}

/// Build UPSERT fragments.
///
/// Match-set columns form the join and are never assigned; primary keys are
/// never assigned either. Every column is inserted unless it is a primary
/// key and `insert_primary_keys` is false.
pub fn upsert_clauses(
    columns: &[ColumnDescriptor],
    primary_keys: &[&str],
    fields_to_match: &[&str],
    insert_primary_keys: bool,
) -> UpsertClauses {
    let pks: HashSet<&str> = primary_keys.iter().copied().collect();
    let matched: HashSet<&str> = fields_to_match.iter().copied().collect();

    let mut clauses = UpsertClauses::default();
    for column in columns {
        clauses.create_table.push(staging_column_clause(column));

        let name = column.name.as_str();
        let is_pk = pks.contains(name);
        let is_match = matched.contains(name);

        if is_match {
            clauses.matches.push(assignment(name));
        }
        if !is_pk && !is_match {
            clauses.assignments.push(assignment(name));
        }
        if !is_pk || insert_primary_keys {
            clauses.insert_columns.push(name.to_string());
            clauses.insert_values.push(format!("source.{}", name));
        }
    }
    clauses
}

/// Build DELETE fragments (staging DDL only).
pub fn delete_clauses(columns: &[ColumnDescriptor]) -> DeleteClauses {
    DeleteClauses {
        create_table: columns.iter().map(staging_column_clause).collect(),
    }
}

/// `target.<pk> = source.<pk>` for each key, joined with `AND`.
pub fn key_predicate(primary_keys: &[&str]) -> String {
    primary_keys
        .iter()
        .map(|pk| format!("target.{0} = source.{0}", pk))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `CREATE TABLE <staging> (<columns>)`
pub fn create_staging_sql(staging: &str, create_table: &[String]) -> String {
    format!("CREATE TABLE {} ({})", staging, create_table.join(","))
}

/// UPDATE joined on the staging table by primary key.
pub fn update_sql(
    table: &str,
    staging: &str,
    clauses: &UpdateClauses,
    primary_keys: &[&str],
) -> String {
    format!(
        "UPDATE target SET {} FROM {} target INNER JOIN {} source ON {}",
        clauses.assignments.join(","),
        table,
        staging,
        key_predicate(primary_keys)
    )
}

/// MERGE from the staging table on the match clauses.
///
/// The `WHEN MATCHED` branch is left out when nothing is assignable.
pub fn merge_sql(table: &str, staging: &str, clauses: &UpsertClauses) -> String {
    let matched = if clauses.assignments.is_empty() {
        String::new()
    } else {
        format!("WHEN MATCHED THEN UPDATE SET {} ", clauses.assignments.join(","))
    };

    format!(
        "MERGE INTO {} AS target USING {} AS source ON {} {}\
         WHEN NOT MATCHED THEN INSERT ({}) VALUES ({});",
        table,
        staging,
        clauses.matches.join(" AND "),
        matched,
        clauses.insert_columns.join(","),
        clauses.insert_values.join(",")
    )
}

/// DELETE joined on the staging table by primary key.
pub fn delete_sql(table: &str, staging: &str, primary_keys: &[&str]) -> String {
    format!(
        "DELETE target FROM {} target INNER JOIN {} source ON {}",
        table,
        staging,
        key_predicate(primary_keys)
    )
}
