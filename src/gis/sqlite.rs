//! SQLite attribute-table backend.
//!
//! Hydrofabric exports land in a single database; every source named in the
//! settings document is a table in it. Geometry rides along as a `geom` text
//! column of `x y, x y, ...` vertex pairs in plane feet, and the model-domain
//! outline is a one-row table with `XMIN, YMIN, XMAX, YMAX` columns.

use std::path::Path;

use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};

use crate::error::{Result, SfrError};

use super::{FT_TO_KM, Field, FieldExpr, FieldType, GisBackend, Row};

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(SqliteBackend { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(SqliteBackend { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info('{table}')"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if names.is_empty() {
            return Err(SfrError::UnknownTable(table.to_string()));
        }
        Ok(names)
    }

    // (rowid, vertices) for every feature of `source`.
    fn feature_geoms(&self, source: &str) -> Result<Vec<(i64, Vec<(f64, f64)>)>> {
        if !self.column_names(source)?.iter().any(|c| c == "geom") {
            return Err(SfrError::Backend(format!(
                "table '{source}' carries no geometry"
            )));
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT rowid, geom FROM '{source}'"))?;
        let raw = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter()
            .map(|(rowid, text)| Ok((rowid, parse_geom(&text)?)))
            .collect()
    }
}

fn parse_geom(text: &str) -> Result<Vec<(f64, f64)>> {
    text.split(',')
        .map(|pair| {
            let mut coords = pair.split_whitespace().map(str::parse::<f64>);
            match (coords.next(), coords.next()) {
                (Some(Ok(x)), Some(Ok(y))) => Ok((x, y)),
                _ => Err(SfrError::Backend(format!("malformed geometry '{text}'"))),
            }
        })
        .collect()
}

fn evaluate(expr: FieldExpr, geom: &[(f64, f64)]) -> Result<f64> {
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

fn field_from_sql(value: ValueRef<'_>) -> Field {
    match value {
        ValueRef::Null => Field::Null,
        ValueRef::Integer(v) => Field::Int(v),
        ValueRef::Real(v) => Field::Real(v),
        ValueRef::Text(v) => Field::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(_) => Field::Null,
    }
}

impl From<Field> for SqlValue {
    fn from(field: Field) -> Self {
        match field {
            Field::Int(v) => SqlValue::Integer(v),
            Field::Real(v) => SqlValue::Real(v),
            Field::Text(v) => SqlValue::Text(v),
            Field::Null => SqlValue::Null,
        }
    }
}

impl GisBackend for SqliteBackend {
    fn scan_table(&self, source: &str, fields: &[&str]) -> Result<Vec<Row>> {
        let select = fields
            .iter()
            .map(|f| format!("\"{f}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {select} FROM '{source}'"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((0..fields.len())
                    .map(|i| row.get_ref(i).map(field_from_sql))
                    .collect::<rusqlite::Result<Row>>()?)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn scan_table_filtered(
        &self,
        source: &str,
        fields: &[&str],
        key_field: &str,
        key: i64,
    ) -> Result<Vec<Row>> {
        let select = fields
            .iter()
            .map(|f| format!("\"{f}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {select} FROM '{source}' WHERE \"{key_field}\" = ?1"
        ))?;
        let rows = stmt
            .query_map([key], |row| {
                Ok((0..fields.len())
                    .map(|i| row.get_ref(i).map(field_from_sql))
                    .collect::<rusqlite::Result<Row>>()?)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn join_tables(
        &mut self,
        left: &str,
        left_key: &str,
        right: &str,
        right_key: &str,
        dest: &str,
    ) -> Result<()> {
        let left_columns = self.column_names(left)?;
        let right_columns = self.column_names(right)?;
        let mut select = vec!["l.*".to_string()];
        select.extend(
            right_columns
                .iter()
                .filter(|c| !left_columns.contains(c))
                .map(|c| format!("r.\"{c}\"")),
        );
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS '{dest}'"), [])?;
        self.conn.execute(
            &format!(
                "CREATE TABLE '{dest}' AS SELECT {} FROM '{left}' l \
                 JOIN '{right}' r ON l.\"{left_key}\" = r.\"{right_key}\"",
                select.join(", ")
            ),
            [],
        )?;
        Ok(())
    }

    fn copy_features(&mut self, source: &str, dest: &str) -> Result<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS '{dest}'"), [])?;
        self.conn.execute(
            &format!("CREATE TABLE '{dest}' AS SELECT * FROM '{source}'"),
            [],
        )?;
        Ok(())
    }

    fn delete_if_exists(&mut self, name: &str) -> Result<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS '{name}'"), [])?;
        Ok(())
    }

    fn add_field(&mut self, source: &str, field: &str, ty: FieldType) -> Result<()> {
        if self.column_names(source)?.iter().any(|c| c == field) {
            return Ok(());
        }
        let sql_type = match ty {
            FieldType::Int => "INTEGER",
            FieldType::Double => "REAL",
            FieldType::Text => "TEXT",
        };
        self.conn.execute(
            &format!("ALTER TABLE '{source}' ADD COLUMN \"{field}\" {sql_type}"),
            [],
        )?;
        Ok(())
    }

    fn compute_field(&mut self, source: &str, field: &str, expr: FieldExpr) -> Result<()> {
        let features = self.feature_geoms(source)?;
        let mut stmt = self.conn.prepare(&format!(
            "UPDATE '{source}' SET \"{field}\" = ?1 WHERE rowid = ?2"
        ))?;
        for (rowid, geom) in features {
            let value = evaluate(expr, &geom)?;
            stmt.execute(rusqlite::params![value, rowid])?;
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
        let keys = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT rowid, \"{key_field}\" FROM '{source}'"
            ))?;
            stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let assignments = fields
            .iter()
            .enumerate()
            .map(|(i, f)| format!("\"{f}\" = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "UPDATE '{source}' SET {assignments} WHERE rowid = ?{}",
            fields.len() + 1
        ))?;

        let mut updated = 0;
        for (rowid, key) in keys {
            if let Some(values) = apply(key) {
                let mut params: Vec<SqlValue> = values.into_iter().map(SqlValue::from).collect();
                params.push(SqlValue::Integer(rowid));
                stmt.execute(rusqlite::params_from_iter(params))?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn select_crossing(&mut self, source: &str, domain: &str, dest: &str) -> Result<()> {
        let outline = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT XMIN, YMIN, XMAX, YMAX FROM '{domain}'"
            ))?;
            stmt.query_row([], |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
        };
        let contains = |(x, y): (f64, f64)| {
            x >= outline.0 && x <= outline.2 && y >= outline.1 && y <= outline.3
        };

        let mut selected = Vec::new();
        for (rowid, geom) in self.feature_geoms(source)? {
            let mut vertices = geom.iter().map(|&p| contains(p));
            let straddles = match vertices.next() {
                Some(first) => vertices.any(|inside| inside != first),
                None => false,
            };
            if straddles {
                selected.push(rowid);
            }
        }

        self.conn
            .execute(&format!("DROP TABLE IF EXISTS '{dest}'"), [])?;
        self.conn.execute(
            &format!("CREATE TABLE '{dest}' AS SELECT * FROM '{source}' WHERE 0"),
            [],
        )?;
        let mut insert = self.conn.prepare(&format!(
            "INSERT INTO '{dest}' SELECT * FROM '{source}' WHERE rowid = ?1"
        ))?;
        for rowid in selected {
            insert.execute([rowid])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_streams() -> SqliteBackend {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .connection()
            .execute_batch(
                "CREATE TABLE streams (COMID INTEGER, LENGTHKM REAL, geom TEXT);
                 INSERT INTO streams VALUES (1, 0.0, '0 0, 3000 4000');
                 INSERT INTO streams VALUES (2, 0.0, '100 100, 200 100');",
            )
            .unwrap();
        backend
    }

    #[test]
    fn scan_and_filtered_scan() {
        let backend = backend_with_streams();
        let rows = backend.scan_table("streams", &["COMID", "LENGTHKM"]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Field::Int(1));

        let rows = backend
            .scan_table_filtered("streams", &["COMID"], "COMID", 2)
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn add_and_compute_fields() {
        let mut backend = backend_with_streams();
        backend.add_field("streams", "LENKM", FieldType::Double).unwrap();
        // re-adding is a no-op
        backend.add_field("streams", "LENKM", FieldType::Double).unwrap();
        backend
            .compute_field("streams", "LENKM", FieldExpr::LengthKm)
            .unwrap();
        let rows = backend.scan_table("streams", &["LENKM"]).unwrap();
        assert!((rows[0][0].as_real().unwrap() - 5000.0 * FT_TO_KM).abs() < 1e-12);
    }

    #[test]
    fn update_rows_rewrites_matching_keys_only() {
        let mut backend = backend_with_streams();
        let updated = backend
            .update_rows("streams", "COMID", &["LENGTHKM"], &mut |comid| {
                (comid == 2).then(|| vec![Field::Real(7.5)])
            })
            .unwrap();
        assert_eq!(updated, 1);
        let rows = backend.scan_table("streams", &["LENGTHKM"]).unwrap();
        assert_eq!(rows[0][0].as_real().unwrap(), 0.0);
        assert_eq!(rows[1][0].as_real().unwrap(), 7.5);
    }

    #[test]
    fn join_and_copy() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .connection()
            .execute_batch(
                "CREATE TABLE cells (FID INTEGER, COMID INTEGER);
                 INSERT INTO cells VALUES (10, 1);
                 INSERT INTO cells VALUES (11, 2);
                 CREATE TABLE rivers (OLDFID INTEGER, ELEVAVE REAL);
                 INSERT INTO rivers VALUES (10, 321.5);",
            )
            .unwrap();
        backend
            .join_tables("cells", "FID", "rivers", "OLDFID", "joined")
            .unwrap();
        let rows = backend.scan_table("joined", &["COMID", "ELEVAVE"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1].as_real().unwrap(), 321.5);

        backend.copy_features("joined", "joined_copy").unwrap();
        assert_eq!(backend.scan_table("joined_copy", &["COMID"]).unwrap().len(), 1);
    }

    #[test]
    fn select_crossing_against_rect_domain() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .connection()
            .execute_batch(
                "CREATE TABLE streams (COMID INTEGER, geom TEXT);
                 INSERT INTO streams VALUES (1, '-50 10, 50 10');
                 INSERT INTO streams VALUES (2, '10 10, 20 20');
                 CREATE TABLE domain (XMIN REAL, YMIN REAL, XMAX REAL, YMAX REAL);
                 INSERT INTO domain VALUES (0, 0, 100, 100);",
            )
            .unwrap();
        backend.select_crossing("streams", "domain", "crossing").unwrap();
        let rows = backend.scan_table("crossing", &["COMID"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Field::Int(1));
    }
}
