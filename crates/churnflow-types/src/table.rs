//! In-memory tabular data model.
//!
//! `Table` is the unit of data exchanged between pipeline steps and the
//! object store: an ordered list of column names plus row-major cells.
//! Carries a minimal CSV codec (header row, comma-separated, no quoting --
//! the churn dataset needs none) and the column-level transforms the data
//! engineering flow uses: projection, vertical concat, null-row dropping,
//! and one-hot encoding of categorical columns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Number(f64),
    Text(String),
    Null,
}

impl Cell {
    /// Numeric view of the cell, if it is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Render the cell the way the CSV codec writes it.
    ///
    /// Whole numbers print without a trailing `.0` so a round-trip
    /// through CSV is textually stable for integer-valued columns.
    pub fn render(&self) -> String {
        match self {
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Cell::Text(s) => s.clone(),
            Cell::Null => String::new(),
        }
    }

    fn parse(field: &str) -> Cell {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            Cell::Null
        } else if let Ok(n) = trimmed.parse::<f64>() {
            Cell::Number(n)
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Cell::Number(n) => json!(n),
            Cell::Text(s) => json!(s),
            Cell::Null => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// An ordered set of named columns with row-major storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Borrow a row by index.
    pub fn row(&self, idx: usize) -> Option<&[Cell]> {
        self.rows.get(idx).map(|r| r.as_slice())
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Append a row; its arity must match the column count.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::ColumnCountMismatch {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// All cells of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Cell>, TableError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// One column as f64 values; errors on the first non-numeric cell.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, TableError> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                r[idx].as_number().ok_or(TableError::NonNumericCell {
                    column: name.to_string(),
                    row,
                })
            })
            .collect()
    }

    /// All cells as a numeric matrix; errors on the first non-numeric cell.
    pub fn numeric_matrix(&self) -> Result<Vec<Vec<f64>>, TableError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                r.iter()
                    .enumerate()
                    .map(|(col, cell)| {
                        cell.as_number().ok_or(TableError::NonNumericCell {
                            column: self.columns[col].clone(),
                            row,
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Project to the named columns, in the requested order.
    pub fn select(&self, names: &[&str]) -> Result<Table, TableError> {
        let indices: Vec<usize> = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<_, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Ok(Table {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows,
        })
    }

    /// Drop the named columns, keeping the rest in order.
    pub fn drop_columns(&self, names: &[&str]) -> Result<Table, TableError> {
        for n in names {
            self.column_index(n)?;
        }
        let keep: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !names.contains(&c.as_str()))
            .map(|c| c.as_str())
            .collect();
        self.select(&keep)
    }

    /// Concatenate another table's rows below this one's.
    ///
    /// Column names and order must match exactly.
    pub fn vstack(&self, other: &Table) -> Result<Table, TableError> {
        if self.columns != other.columns {
            return Err(TableError::ColumnMismatch {
                left: self.columns.clone(),
                right: other.columns.clone(),
            });
        }
        let mut rows = self.rows.clone();
        rows.extend(other.rows.iter().cloned());
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Append a new column; the cell count must equal the row count.
    pub fn append_column(&mut self, name: impl Into<String>, cells: Vec<Cell>) -> Result<(), TableError> {
        if cells.len() != self.rows.len() {
            return Err(TableError::ColumnLengthMismatch {
                expected: self.rows.len(),
                found: cells.len(),
            });
        }
        self.columns.push(name.into());
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row.push(cell);
        }
        Ok(())
    }

    /// Keep only rows with no `Null` cells.
    pub fn drop_null_rows(&self) -> Table {
        let rows = self
            .rows
            .iter()
            .filter(|r| !r.iter().any(|c| matches!(c, Cell::Null)))
            .cloned()
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Keep only rows satisfying the predicate.
    pub fn filter_rows<F: FnMut(&[Cell]) -> bool>(&self, mut pred: F) -> Table {
        let rows = self
            .rows
            .iter()
            .filter(|r| pred(r.as_slice()))
            .cloned()
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Replace each named categorical column with one indicator column per
    /// distinct value, named `<column>_<value>`.
    ///
    /// Indicator columns are appended after the remaining columns, one
    /// source column at a time, with values in sorted order so the output
    /// schema does not depend on row order. A `Null` cell yields all-zero
    /// indicators for that row.
    pub fn one_hot_encode(&self, columns: &[&str]) -> Result<Table, TableError> {
        let mut result = self.drop_columns(columns)?;
        for &col in columns {
            let idx = self.column_index(col)?;
            let values: BTreeSet<String> = self
                .rows
                .iter()
                .filter(|r| !matches!(r[idx], Cell::Null))
                .map(|r| r[idx].render())
                .collect();
            for value in &values {
                let cells = self
                    .rows
                    .iter()
                    .map(|r| {
                        if !matches!(r[idx], Cell::Null) && &r[idx].render() == value {
                            Cell::Number(1.0)
                        } else {
                            Cell::Number(0.0)
                        }
                    })
                    .collect();
                result.append_column(format!("{col}_{value}"), cells)?;
            }
        }
        Ok(result)
    }

    /// One row as a JSON object keyed by column name.
    pub fn row_to_json(&self, idx: usize) -> Option<Value> {
        self.rows.get(idx).map(|row| {
            let mut map = Map::new();
            for (col, cell) in self.columns.iter().zip(row) {
                map.insert(col.clone(), cell.to_json());
            }
            Value::Object(map)
        })
    }

    // -----------------------------------------------------------------------
    // CSV codec
    // -----------------------------------------------------------------------

    /// Parse a table from CSV text with a header row.
    ///
    /// Numeric fields become `Cell::Number`, empty fields `Cell::Null`,
    /// everything else `Cell::Text`. Quoting is not supported.
    pub fn from_csv(text: &str) -> Result<Table, TableError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().ok_or(TableError::Empty)?;
        let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();

        let mut table = Table::new(columns);
        for line in lines {
            let row: Vec<Cell> = line.split(',').map(Cell::parse).collect();
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Serialize the table to CSV text with a header row.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join(","));
        out.push('\n');
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(Cell::render).collect();
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// TableError
// ---------------------------------------------------------------------------

/// Errors from table construction and transforms.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// CSV input had no header row.
    #[error("table input is empty")]
    Empty,

    /// A row's arity did not match the column count.
    #[error("row has {found} cells, expected {expected}")]
    ColumnCountMismatch { expected: usize, found: usize },

    /// A referenced column does not exist.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// Two tables being stacked disagree on columns.
    #[error("column mismatch: {left:?} vs {right:?}")]
    ColumnMismatch { left: Vec<String>, right: Vec<String> },

    /// A new column's length did not match the row count.
    #[error("column has {found} cells, expected {expected}")]
    ColumnLengthMismatch { expected: usize, found: usize },

    /// A numeric view hit a non-numeric cell.
    #[error("non-numeric cell in column '{column}', row {row}")]
    NonNumericCell { column: String, row: usize },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_csv() -> &'static str {
        "CustomerID,Age,Gender,Churn\n1,30,Male,1\n2,41,Female,0\n3,,Female,1\n"
    }

    #[test]
    fn csv_parse_basic() {
        let t = Table::from_csv(sample_csv()).unwrap();
        assert_eq!(t.columns(), &["CustomerID", "Age", "Gender", "Churn"]);
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.row(0).unwrap()[1], Cell::Number(30.0));
        assert_eq!(t.row(0).unwrap()[2], Cell::Text("Male".into()));
        assert_eq!(t.row(2).unwrap()[1], Cell::Null);
    }

    #[test]
    fn csv_roundtrip_preserves_shape() {
        let t = Table::from_csv(sample_csv()).unwrap();
        let back = Table::from_csv(&t.to_csv()).unwrap();
        assert_eq!(back.columns(), t.columns());
        assert_eq!(back.row_count(), t.row_count());
        assert_eq!(back, t);
    }

    #[test]
    fn csv_empty_input_rejected() {
        assert!(matches!(Table::from_csv(""), Err(TableError::Empty)));
        assert!(matches!(Table::from_csv("  \n \n"), Err(TableError::Empty)));
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(Cell::Number(30.0).render(), "30");
        assert_eq!(Cell::Number(30.5).render(), "30.5");
        assert_eq!(Cell::Null.render(), "");
    }

    #[test]
    fn push_row_arity_checked() {
        let mut t = Table::new(vec!["a".into(), "b".into()]);
        assert!(t.push_row(vec![Cell::Number(1.0)]).is_err());
        assert!(t.push_row(vec![Cell::Number(1.0), Cell::Number(2.0)]).is_ok());
    }

    #[test]
    fn select_projects_and_reorders() {
        let t = Table::from_csv(sample_csv()).unwrap();
        let s = t.select(&["Churn", "Age"]).unwrap();
        assert_eq!(s.columns(), &["Churn", "Age"]);
        assert_eq!(s.row(0).unwrap()[0], Cell::Number(1.0));
        assert_eq!(s.row(0).unwrap()[1], Cell::Number(30.0));
    }

    #[test]
    fn select_unknown_column_errors() {
        let t = Table::from_csv(sample_csv()).unwrap();
        assert!(matches!(
            t.select(&["Nope"]),
            Err(TableError::UnknownColumn(_))
        ));
    }

    #[test]
    fn vstack_requires_matching_columns() {
        let a = Table::from_csv("x,y\n1,2\n").unwrap();
        let b = Table::from_csv("x,y\n3,4\n").unwrap();
        let c = Table::from_csv("y,x\n3,4\n").unwrap();

        let stacked = a.vstack(&b).unwrap();
        assert_eq!(stacked.row_count(), 2);
        assert!(matches!(a.vstack(&c), Err(TableError::ColumnMismatch { .. })));
    }

    #[test]
    fn drop_null_rows_keeps_complete_rows() {
        let t = Table::from_csv(sample_csv()).unwrap();
        let clean = t.drop_null_rows();
        assert_eq!(clean.row_count(), 2);
        assert_eq!(t.row_count(), 3); // original untouched
    }

    #[test]
    fn append_column_length_checked() {
        let mut t = Table::from_csv("x\n1\n2\n").unwrap();
        assert!(t.append_column("y", vec![Cell::Number(0.0)]).is_err());
        t.append_column("y", vec![Cell::Number(0.0), Cell::Number(1.0)])
            .unwrap();
        assert_eq!(t.columns(), &["x", "y"]);
        assert_eq!(t.row(1).unwrap()[1], Cell::Number(1.0));
    }

    #[test]
    fn one_hot_encode_sorted_values() {
        let t = Table::from_csv("id,Gender\n1,Male\n2,Female\n3,Male\n").unwrap();
        let encoded = t.one_hot_encode(&["Gender"]).unwrap();
        assert_eq!(encoded.columns(), &["id", "Gender_Female", "Gender_Male"]);
        assert_eq!(encoded.row(0).unwrap()[1], Cell::Number(0.0));
        assert_eq!(encoded.row(0).unwrap()[2], Cell::Number(1.0));
        assert_eq!(encoded.row(1).unwrap()[1], Cell::Number(1.0));
    }

    #[test]
    fn one_hot_encode_null_yields_all_zero() {
        let t = Table::from_csv("id,Gender\n1,Male\n2,\n").unwrap();
        let encoded = t.one_hot_encode(&["Gender"]).unwrap();
        assert_eq!(encoded.columns(), &["id", "Gender_Male"]);
        assert_eq!(encoded.row(1).unwrap()[1], Cell::Number(0.0));
    }

    #[test]
    fn numeric_matrix_rejects_text() {
        let t = Table::from_csv(sample_csv()).unwrap();
        let err = t.numeric_matrix().unwrap_err();
        assert!(matches!(err, TableError::NonNumericCell { .. }));

        let nums = t.select(&["Age", "Churn"]).unwrap().drop_null_rows();
        let m = nums.numeric_matrix().unwrap();
        assert_eq!(m, vec![vec![30.0, 1.0], vec![41.0, 0.0]]);
    }

    #[test]
    fn filter_rows_by_cell_value() {
        let t = Table::from_csv(sample_csv()).unwrap();
        let idx = t.column_index("Gender").unwrap();
        let females = t.filter_rows(|r| r[idx] == Cell::Text("Female".into()));
        assert_eq!(females.row_count(), 2);
    }

    #[test]
    fn row_to_json_maps_columns() {
        let t = Table::from_csv("Age,Prediction\n30,churned\n").unwrap();
        let row = t.row_to_json(0).unwrap();
        assert_eq!(row["Age"], serde_json::json!(30.0));
        assert_eq!(row["Prediction"], serde_json::json!("churned"));
        assert!(t.row_to_json(5).is_none());
    }
}
