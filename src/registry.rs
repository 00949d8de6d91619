//! Authoritative in-memory graph of hydrography reaches.
//!
//! Built in three passes over the backend tables, in order: geometry and
//! smoothed elevations from the reach/cell intersect table, refined
//! elevations through the rivers-table join, then routing edges from the
//! flow table. A registry value existing at all proves the first pass ran;
//! the later passes take `&mut self` and check their own preconditions.

use std::collections::HashMap;

use log::{info, warn};

use crate::config::SfrConfig;
use crate::error::{Result, SfrError};
use crate::gis::GisBackend;

/// Conversion applied to smoothed elevations at ingestion; the source tables
/// carry meters, everything downstream works in feet.
pub const METERS_TO_FEET: f64 = 3.2808;

/// One hydrography reach and everything known about it.
#[derive(Debug, Clone)]
pub struct ReachRecord {
    pub comid: i64,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    /// Feet.
    pub max_smoothed_elev: f64,
    /// Feet.
    pub min_smoothed_elev: f64,
    /// Refined value from the rivers table; `None` until the elevation pass runs.
    pub elevation: Option<f64>,
    pub length_ft: f64,
    /// Owning grid cell.
    pub cell_num: i64,
    /// Upstream neighbors. Duplicate edges in the flow table stay duplicated.
    pub from_comids: Vec<i64>,
    /// Downstream neighbors, same convention.
    pub to_comids: Vec<i64>,
}

#[derive(Debug, Default)]
pub struct ReachRegistry {
    reaches: HashMap<i64, ReachRecord>,
    dropped_edges: u64,
    unknown_neighbor_refs: u64,
}

impl ReachRegistry {
    /// First pass: one record per row of the reach/cell intersect table.
    pub fn populate(backend: &impl GisBackend, cfg: &SfrConfig) -> Result<Self> {
        const FIELDS: [&str; 9] = [
            "COMID",
            "X_start",
            "Y_start",
            "X_end",
            "Y_end",
            "MAXELEVSMO",
            "MINELEVSMO",
            "LengthFt",
            "node",
        ];
        let mut reaches = HashMap::new();
        for row in backend.scan_table(&cfg.intersect, &FIELDS)? {
            let comid = row[0].as_int()?;
            reaches.insert(
                comid,
                ReachRecord {
                    comid,
                    start_x: row[1].as_real()?,
                    start_y: row[2].as_real()?,
                    end_x: row[3].as_real()?,
                    end_y: row[4].as_real()?,
                    max_smoothed_elev: row[5].as_real()? * METERS_TO_FEET,
                    min_smoothed_elev: row[6].as_real()? * METERS_TO_FEET,
                    elevation: None,
                    length_ft: row[7].as_real()?,
                    cell_num: row[8].as_int()?,
                    from_comids: Vec::new(),
                    to_comids: Vec::new(),
                },
            );
        }
        info!(
            "registry populated with {} reaches from {}",
            reaches.len(),
            cfg.intersect
        );
        Ok(ReachRegistry {
            reaches,
            dropped_edges: 0,
            unknown_neighbor_refs: 0,
        })
    }

    /// Second pass: join the intersect table to the rivers table and
    /// overwrite each reach's refined elevation. Every joined row must name
    /// a reach the first pass created.
    pub fn populate_elevations(
        &mut self,
        backend: &mut impl GisBackend,
        cfg: &SfrConfig,
    ) -> Result<()> {
        backend.delete_if_exists(&cfg.elev)?;
        info!(
            "joining {} to {}; saving as {}",
            cfg.rivers_table, cfg.intersect, cfg.elev
        );
        backend.join_tables(&cfg.intersect, "FID", &cfg.rivers_table, "OLDFID", &cfg.elev)?;

        for row in backend.scan_table(&cfg.elev, &["COMID", "ELEVAVE"])? {
            let comid = row[0].as_int()?;
            let elevation = row[1].as_real()?;
            match self.reaches.get_mut(&comid) {
                Some(reach) => reach.elevation = Some(elevation),
                None => return Err(SfrError::MissingReach { comid }),
            }
        }
        Ok(())
    }

    /// Third pass: append routing edges from the flow table. Each side of a
    /// `(from, to)` pair is applied independently when that reach is known.
    /// Pairs touching no known reach are counted in `dropped_edges`, not
    /// stored; a half-known pair still appends the unknown neighbor id and
    /// counts it in `unknown_neighbor_refs`.
    pub fn populate_routing(&mut self, backend: &impl GisBackend, cfg: &SfrConfig) -> Result<()> {
        info!("reading routing information from {}", cfg.flow);
        for row in backend.scan_table(&cfg.flow, &["FROMCOMID", "TOCOMID"])? {
            let from = row[0].as_int()?;
            let to = row[1].as_int()?;
            let from_known = self.reaches.contains_key(&from);
            let to_known = self.reaches.contains_key(&to);
            if let Some(reach) = self.reaches.get_mut(&from) {
                reach.to_comids.push(to);
                if !to_known {
                    self.unknown_neighbor_refs += 1;
                }
            }
            if let Some(reach) = self.reaches.get_mut(&to) {
                reach.from_comids.push(from);
                if !from_known {
                    self.unknown_neighbor_refs += 1;
                }
            }
            if !from_known && !to_known {
                self.dropped_edges += 1;
            }
        }
        if self.dropped_edges > 0 {
            warn!(
                "{} routing edges referenced no known reach and were dropped",
                self.dropped_edges
            );
        }
        if self.unknown_neighbor_refs > 0 {
            warn!(
                "{} routing references point at reaches outside the registry",
                self.unknown_neighbor_refs
            );
        }
        Ok(())
    }

    pub fn get(&self, comid: i64) -> Option<&ReachRecord> {
        self.reaches.get(&comid)
    }

    pub fn len(&self) -> usize {
        self.reaches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reaches.is_empty()
    }

    /// Routing pairs whose endpoints were both unknown to the registry.
    pub fn dropped_edges(&self) -> u64 {
        self.dropped_edges
    }

    /// Stored neighbor ids that name a reach the registry never saw.
    pub fn unknown_neighbor_refs(&self) -> u64 {
        self.unknown_neighbor_refs
    }
}
