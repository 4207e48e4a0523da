//! Record layouts and projection of records into a [`TabularBuffer`].
//!
//! A record type describes its own columns through [`Record::fields`]; there
//! is no reflection. The layout is asked for on every projection and never
//! cached.
//!
//! ```rust
//! use mssql_bulk::record::{FieldDescriptor, Record};
//! use mssql_bulk::value::{SqlValue, ToSqlValue};
//!
//! struct Student {
//!     id: i32,
//!     name: String,
//!     score: Option<f64>,
//! }
//!
//! impl Record for Student {
//!     fn fields() -> Vec<FieldDescriptor> {
//!         vec![
//!             FieldDescriptor::of::<i32>("StudentId"),
//!             FieldDescriptor::of::<String>("StudentName"),
//!             FieldDescriptor::of::<Option<f64>>("TestScore"),
//!         ]
//!     }
//!
//!     fn values(&self) -> Vec<SqlValue> {
//!         vec![
//!             self.id.to_sql_value(),
//!             self.name.to_sql_value(),
//!             self.score.to_sql_value(),
//!         ]
//!     }
//! }
//! ```

use crate::buffer::{BufferColumn, TabularBuffer};
use crate::error::{BulkError, Result};
use crate::value::{SqlNullType, SqlValue, ToSqlValue};

/// One field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column name the field maps to.
    pub name: String,
    /// Column type, with any `Option` wrapper removed.
    pub sql_type: SqlNullType,
    /// True for `Option<T>` fields.
    pub nullable: bool,
    /// Computed field; skipped by the write path.
    pub derived: bool,
}

impl FieldDescriptor {
    /// Describe a field of Rust type `T`.
    pub fn of<T: ToSqlValue>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: T::sql_type(),
            nullable: T::nullable(),
            derived: false,
        }
    }

    /// Mark the field as computed.
    #[must_use]
    pub fn derived(mut self) -> Self {
        self.derived = true;
        self
    }

    /// Default write-path filter: stored fields only.
    pub fn is_stored(&self) -> bool {
        !self.derived
    }
}

/// A typed record that can be written in bulk.
pub trait Record {
    /// Ordered field layout of the record type.
    fn fields() -> Vec<FieldDescriptor>
    where
        Self: Sized;

    /// Field values, in the order of [`fields`](Self::fields).
    fn values(&self) -> Vec<SqlValue>;
}

/// Project records into a buffer, keeping only fields accepted by `filter`.
///
/// Columns follow field order. Absent optional values become typed NULLs.
pub fn project<T, F>(records: &[T], filter: F) -> Result<TabularBuffer>
where
    T: Record,
    F: Fn(&FieldDescriptor) -> bool,
{
    let fields = T::fields();
    let selected: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| filter(f))
        .map(|(i, _)| i)
        .collect();

    let columns = selected
        .iter()
        .map(|&i| {
            let f = &fields[i];
            BufferColumn::new(f.name.clone(), f.sql_type, f.nullable)
        })
        .collect();

    let mut buffer = TabularBuffer::new(columns);
    for (row_idx, record) in records.iter().enumerate() {
        let mut values = record.values();
        if values.len() != fields.len() {
            return Err(BulkError::Projection(format!(
                "record {} yielded {} values for {} declared fields",
                row_idx,
                values.len(),
                fields.len()
            )));
        }

        let row = selected
            .iter()
            .map(|&i| std::mem::replace(&mut values[i], SqlValue::Null(fields[i].sql_type)))
            .collect();
        buffer.push_row(row)?;
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[derive(Clone, Copy)]
    enum Grade {
        Pass = 1,
        Fail = 2,
    }

    impl ToSqlValue for Grade {
        fn sql_type() -> SqlNullType {
            SqlNullType::I32
        }

        fn to_sql_value(&self) -> SqlValue {
            SqlValue::I32(*self as i32)
        }
    }

    struct Exam {
        id: i64,
        score: Option<Decimal>,
        grade: Grade,
        retake: Option<Grade>,
    }

    impl Exam {
        fn label(&self) -> String {
            format!("exam-{}", self.id)
        }
    }

    impl Record for Exam {
        fn fields() -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::of::<i64>("ExamId"),
                FieldDescriptor::of::<Option<Decimal>>("Score"),
                FieldDescriptor::of::<Grade>("Grade"),
                FieldDescriptor::of::<Option<Grade>>("Retake"),
                FieldDescriptor::of::<String>("Label").derived(),
            ]
        }

        fn values(&self) -> Vec<SqlValue> {
            vec![
                self.id.to_sql_value(),
                self.score.to_sql_value(),
                self.grade.to_sql_value(),
                self.retake.to_sql_value(),
                self.label().to_sql_value(),
            ]
        }
    }

    fn exams() -> Vec<Exam> {
        vec![
            Exam {
                id: 1,
                score: Some(Decimal::new(875, 1)),
                grade: Grade::Pass,
                retake: None,
            },
            Exam {
                id: 2,
                score: None,
                grade: Grade::Fail,
                retake: Some(Grade::Pass),
            },
        ]
    }

    #[test]
    fn test_projection_skips_derived_fields() {
        let buffer = project(&exams(), FieldDescriptor::is_stored).unwrap();
        let names: Vec<_> = buffer.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ExamId", "Score", "Grade", "Retake"]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_projection_unwraps_optional_types() {
        let buffer = project(&exams(), |_| true).unwrap();
        let score = &buffer.columns()[1];
        assert_eq!(score.sql_type, SqlNullType::Decimal);
        assert!(score.nullable);
        assert!(!buffer.columns()[0].nullable);
        assert_eq!(buffer.columns()[3].sql_type, SqlNullType::I32);
    }

    #[test]
    fn test_round_trip_recovers_values_and_null_markers() {
        let buffer = project(&exams(), FieldDescriptor::is_stored).unwrap();

        let scores: Vec<_> = buffer.column_values("Score").unwrap().cloned().collect();
        assert_eq!(
            scores,
            vec![
                SqlValue::Decimal(Decimal::new(875, 1)),
                SqlValue::Null(SqlNullType::Decimal)
            ]
        );

        let retakes: Vec<_> = buffer.column_values("Retake").unwrap().cloned().collect();
        assert_eq!(
            retakes,
            vec![SqlValue::Null(SqlNullType::I32), SqlValue::I32(1)]
        );

        let grades: Vec<_> = buffer.column_values("Grade").unwrap().cloned().collect();
        assert_eq!(grades, vec![SqlValue::I32(1), SqlValue::I32(2)]);
    }

    #[test]
    fn test_empty_record_set_keeps_columns() {
        let buffer = project::<Exam, _>(&[], FieldDescriptor::is_stored).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.columns().len(), 4);
    }

    struct Broken;

    impl Record for Broken {
        fn fields() -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::of::<i32>("A"),
                FieldDescriptor::of::<i32>("B"),
            ]
        }

        fn values(&self) -> Vec<SqlValue> {
            vec![SqlValue::I32(1)]
        }
    }

    #[test]
    fn test_value_count_mismatch_is_projection_error() {
        let err = project(&[Broken], |_| true).unwrap_err();
        assert!(matches!(err, BulkError::Projection(_)));
    }
}
