//! In-memory backend: tables of named columns with optional polyline
//! geometry, domain outlines as plane rectangles.
//!
//! Backs the test suite and small self-contained runs. Coordinates are plane
//! feet, matching the projected hydrography the shapefile workflow uses.

use std::collections::HashMap;

use crate::error::{Result, SfrError};

use super::{FT_TO_KM, Field, FieldExpr, FieldType, GisBackend, Row};

/// A feature geometry: polyline vertices in plane feet.
pub type Polyline = Vec<(f64, f64)>;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// One polyline per row, or empty when the table carries no geometry.
    pub geoms: Vec<Polyline>,
}

impl MemoryTable {
    pub fn new(columns: &[&str]) -> Self {
        MemoryTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            geoms: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn push_feature(&mut self, row: Row, geom: Polyline) {
        self.rows.push(row);
        self.geoms.push(geom);
    }

    fn column_index(&self, table: &str, field: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == field)
            .ok_or_else(|| SfrError::UnknownField {
                table: table.to_string(),
                field: field.to_string(),
            })
    }
}

/// Axis-aligned model-domain outline.
#[derive(Debug, Clone, Copy)]
pub struct Rect {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Rect {
    fn contains(&self, (x, y): (f64, f64)) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: HashMap<String, MemoryTable>,
    domains: HashMap<String, Rect>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&mut self, name: &str, table: MemoryTable) {
        self.tables.insert(name.to_string(), table);
    }

    pub fn insert_domain(&mut self, name: &str, outline: Rect) {
        self.domains.insert(name.to_string(), outline);
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(name)
    }

    fn table_ref(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| SfrError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SfrError::UnknownTable(name.to_string()))
    }
}

fn evaluate(expr: FieldExpr, geom: &Polyline) -> Result<f64> {
    let first = geom
        .first()
        .ok_or_else(|| SfrError::Backend("feature has an empty polyline".to_string()))?;
    let last = geom
        .last()
        .ok_or_else(|| SfrError::Backend("feature has an empty polyline".to_string()))?;
    Ok(match expr {
        FieldExpr::StartX => first.0,
        FieldExpr::StartY => first.1,
        FieldExpr::EndX => last.0,
        FieldExpr::EndY => last.1,
        FieldExpr::LengthKm => {
            geom.windows(2)
                .map(|w| ((w[1].0 - w[0].0).powi(2) + (w[1].1 - w[0].1).powi(2)).sqrt())
                .sum::<f64>()
                * FT_TO_KM
        }
    })
}

impl GisBackend for MemoryBackend {
    fn scan_table(&self, source: &str, fields: &[&str]) -> Result<Vec<Row>> {
        let table = self.table_ref(source)?;
        let indices = fields
            .iter()
            .map(|f| table.column_index(source, f))
            .collect::<Result<Vec<_>>>()?;
        Ok(table
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect())
    }

    fn scan_table_filtered(
        &self,
        source: &str,
        fields: &[&str],
        key_field: &str,
        key: i64,
    ) -> Result<Vec<Row>> {
        let table = self.table_ref(source)?;
        let key_index = table.column_index(source, key_field)?;
        let indices = fields
            .iter()
            .map(|f| table.column_index(source, f))
            .collect::<Result<Vec<_>>>()?;
        let mut out = Vec::new();
        for row in &table.rows {
            if row[key_index].as_int()? == key {
                out.push(indices.iter().map(|&i| row[i].clone()).collect());
            }
        }
        Ok(out)
    }

    fn join_tables(
        &mut self,
        left: &str,
        left_key: &str,
        right: &str,
        right_key: &str,
        dest: &str,
    ) -> Result<()> {
        let left_table = self.table_ref(left)?.clone();
        let right_table = self.table_ref(right)?;
        let left_key_index = left_table.column_index(left, left_key)?;
        let right_key_index = right_table.column_index(right, right_key)?;

        // Right-side columns keep their names unless the left table already
        // has them, matching unqualified join output.
        let carried: Vec<usize> = (0..right_table.columns.len())
            .filter(|&i| !left_table.columns.contains(&right_table.columns[i]))
            .collect();

        let mut joined = MemoryTable::default();
        joined.columns = left_table.columns.clone();
        joined
            .columns
            .extend(carried.iter().map(|&i| right_table.columns[i].clone()));

        for (row_index, row) in left_table.rows.iter().enumerate() {
            let key = row[left_key_index].as_int()?;
            for right_row in &right_table.rows {
                if right_row[right_key_index].as_int()? == key {
                    let mut out = row.clone();
                    out.extend(carried.iter().map(|&i| right_row[i].clone()));
                    if let Some(geom) = left_table.geoms.get(row_index) {
                        joined.geoms.push(geom.clone());
                    }
                    joined.rows.push(out);
                }
            }
        }

        self.tables.insert(dest.to_string(), joined);
        Ok(())
    }

    fn copy_features(&mut self, source: &str, dest: &str) -> Result<()> {
        let copied = self.table_ref(source)?.clone();
        self.tables.insert(dest.to_string(), copied);
        Ok(())
    }

    fn delete_if_exists(&mut self, name: &str) -> Result<()> {
        self.tables.remove(name);
        Ok(())
    }

    fn add_field(&mut self, source: &str, field: &str, _ty: FieldType) -> Result<()> {
        let table = self.table_mut(source)?;
        if table.columns.iter().any(|c| c == field) {
            return Ok(());
        }
        table.columns.push(field.to_string());
        for row in &mut table.rows {
            row.push(Field::Null);
        }
        Ok(())
    }

    fn compute_field(&mut self, source: &str, field: &str, expr: FieldExpr) -> Result<()> {
        let table = self.table_mut(source)?;
        if table.geoms.len() != table.rows.len() {
            return Err(SfrError::Backend(format!(
                "table '{source}' carries no geometry"
            )));
        }
        let index = table.column_index(source, field)?;
        for row_index in 0..table.rows.len() {
            let value = evaluate(expr, &table.geoms[row_index])?;
            table.rows[row_index][index] = Field::Real(value);
        }
        Ok(())
    }

    fn update_rows(
        &mut self,
        source: &str,
        key_field: &str,
        fields: &[&str],
        apply: &mut dyn FnMut(i64) -> Option<Vec<Field>>,
    ) -> Result<usize> {
        let table = self.table_mut(source)?;
        let key_index = table.column_index(source, key_field)?;
        let indices = fields
            .iter()
            .map(|f| table.column_index(source, f))
            .collect::<Result<Vec<_>>>()?;
        let mut updated = 0;
        for row in &mut table.rows {
            let key = row[key_index].as_int()?;
            if let Some(values) = apply(key) {
                for (&i, value) in indices.iter().zip(values) {
                    row[i] = value;
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn select_crossing(&mut self, source: &str, domain: &str, dest: &str) -> Result<()> {
        let outline = *self
            .domains
            .get(domain)
            .ok_or_else(|| SfrError::UnknownTable(domain.to_string()))?;
        let table = self.table_ref(source)?;
        if table.geoms.len() != table.rows.len() {
            return Err(SfrError::Backend(format!(
                "table '{source}' carries no geometry"
            )));
        }

        let mut selected = MemoryTable::new(&[]);
        selected.columns = table.columns.clone();
        for (row, geom) in table.rows.iter().zip(&table.geoms) {
            if crosses(&outline, geom) {
                selected.push_feature(row.clone(), geom.clone());
            }
        }
        self.tables.insert(dest.to_string(), selected);
        Ok(())
    }
}

// A polyline crosses the outline when its vertices do not all sit on the
// same side of it. Features that cross and return between vertices are
// missed; the vertex test is enough for clipped hydrography.
fn crosses(outline: &Rect, geom: &Polyline) -> bool {
    let mut vertices = geom.iter().map(|&p| outline.contains(p));
    match vertices.next() {
        Some(first) => vertices.any(|inside| inside != first),
        None => false,
    }
}
