//! Capability seam between the reconciliation core and whatever engine owns
//! the geometry and attribute tables.
//!
//! The core never touches vertices itself. Endpoint coordinates and lengths
//! are derived by the backend through [`FieldExpr`], so swapping the storage
//! engine never touches the network logic.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryBackend, MemoryTable, Rect};
pub use sqlite::SqliteBackend;

use crate::error::{Result, SfrError};

/// Kilometers per foot of plane-projected length.
pub const FT_TO_KM: f64 = 0.0003048;

/// One cell of a scanned row.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i64),
    Real(f64),
    Text(String),
    Null,
}

impl Field {
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Field::Int(v) => Ok(*v),
            Field::Real(v) => Ok(*v as i64),
            _ => Err(SfrError::FieldType {
                expected: "integer",
            }),
        }
    }

    pub fn as_real(&self) -> Result<f64> {
        match self {
            Field::Int(v) => Ok(*v as f64),
            Field::Real(v) => Ok(*v),
            _ => Err(SfrError::FieldType { expected: "number" }),
        }
    }

    pub fn as_text(&self) -> Result<&str> {
        match self {
            Field::Text(v) => Ok(v),
            _ => Err(SfrError::FieldType { expected: "text" }),
        }
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Int(v)
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Real(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Text(v.to_string())
    }
}

/// A scanned row, cells in the order the fields were requested.
pub type Row = Vec<Field>;

/// Column types understood by `add_field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Double,
    Text,
}

/// Geometry-derived expressions for `compute_field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldExpr {
    /// X of the digitized start vertex.
    StartX,
    /// Y of the digitized start vertex.
    StartY,
    /// X of the last vertex.
    EndX,
    /// Y of the last vertex.
    EndY,
    /// Polyline length in kilometers (projection is in feet).
    LengthKm,
}

/// Table and geometry operations the core needs from a GIS engine.
///
/// Scans are finite, in source order, and make no restartability promise:
/// treat every returned sequence as one pass over a snapshot of the table.
pub trait GisBackend {
    /// Read `fields` of every row of `source`.
    fn scan_table(&self, source: &str, fields: &[&str]) -> Result<Vec<Row>>;

    /// Read `fields` of the rows of `source` whose `key_field` equals `key`.
    fn scan_table_filtered(
        &self,
        source: &str,
        fields: &[&str],
        key_field: &str,
        key: i64,
    ) -> Result<Vec<Row>>;

    /// Join `left` to `right` on `left_key` = `right_key` and materialize the
    /// view as `dest`, replacing any previous `dest`. The result is scannable
    /// with the left table's columns plus the right table's remaining ones.
    fn join_tables(
        &mut self,
        left: &str,
        left_key: &str,
        right: &str,
        right_key: &str,
        dest: &str,
    ) -> Result<()>;

    /// Copy `source` (rows and geometry) to `dest`, replacing it.
    fn copy_features(&mut self, source: &str, dest: &str) -> Result<()>;

    /// Drop `name` if present; absent is not an error.
    fn delete_if_exists(&mut self, name: &str) -> Result<()>;

    /// Add a column to `source`. Adding a column that already exists is a
    /// no-op so working tables can be re-staged.
    fn add_field(&mut self, source: &str, field: &str, ty: FieldType) -> Result<()>;

    /// Evaluate `expr` against each feature's geometry and store the result
    /// in `field`, which must already exist.
    fn compute_field(&mut self, source: &str, field: &str, expr: FieldExpr) -> Result<()>;

    /// Single pass over `source`. For each row, `apply` sees the `key_field`
    /// value and returns replacement values for `fields`, or `None` to leave
    /// the row alone. Returns the number of rows rewritten.
    fn update_rows(
        &mut self,
        source: &str,
        key_field: &str,
        fields: &[&str],
        apply: &mut dyn FnMut(i64) -> Option<Vec<Field>>,
    ) -> Result<usize>;

    /// Select from `source` the features crossing the outline of `domain`
    /// and materialize them as `dest`, replacing it.
    fn select_crossing(&mut self, source: &str, domain: &str, dest: &str) -> Result<()>;
}
