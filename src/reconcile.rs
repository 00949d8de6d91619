//! Boundary-crossing resolution.
//!
//! Pairs each reach crossing the model-domain outline with its clipped
//! counterpart, classifies flow direction from which endpoint survived the
//! clip, interpolates corrected elevations, and rewrites the working
//! hydrography table in a single pass.

use std::collections::BTreeMap;

use indicatif::ProgressBar;
use log::{info, warn};

use crate::boundary::{BoundaryFix, FlowDirection, compute_fix};
use crate::config::SfrConfig;
use crate::error::{Result, SfrError};
use crate::gis::{Field, FieldExpr, FieldType, GisBackend};

/// Reserved comid meaning "outside the modeled domain" in routing outputs.
pub const OUTSIDE_DOMAIN: i64 = 99999;

/// Working table holding the unclipped reaches that cross the domain outline.
pub const BOUNDARY_TABLE: &str = "boundary_streams";
/// Working copy of the clipped flowlines with endpoint and length fields.
pub const CLIPPED_TABLE: &str = "clipped_streams";

const ENDPOINT_FIELDS: [(&str, FieldExpr); 5] = [
    ("STARTX", FieldExpr::StartX),
    ("STARTY", FieldExpr::StartY),
    ("ENDX", FieldExpr::EndX),
    ("ENDY", FieldExpr::EndY),
    ("LENKM", FieldExpr::LengthKm),
];

/// Everything the boundary pass found, keyed for reproducible output order.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Corrections by comid.
    pub fixes: BTreeMap<i64, BoundaryFix>,
    /// Reaches where neither endpoint matched within tolerance.
    pub manual: Vec<i64>,
    /// Reaches skipped because the unclipped length was zero.
    pub degenerate: Vec<i64>,
}

impl ReconcileOutcome {
    pub fn needs_manual_fix(&self) -> bool {
        !self.manual.is_empty()
    }
}

/// Stage the two working tables the resolution scan reads: the crossing
/// selection out of the unclipped hydrography, and a fresh copy of the
/// clipped flowlines, both with endpoint and length fields computed.
pub fn prepare_boundary_tables(backend: &mut impl GisBackend, cfg: &SfrConfig) -> Result<()> {
    info!("selecting streams that cross the model domain outline");
    backend.delete_if_exists(BOUNDARY_TABLE)?;
    backend.select_crossing(&cfg.flowlines_unclipped, &cfg.mf_domain, BOUNDARY_TABLE)?;

    backend.delete_if_exists(CLIPPED_TABLE)?;
    backend.copy_features(&cfg.flowlines, CLIPPED_TABLE)?;

    info!("adding and calculating endpoint and length fields");
    for table in [BOUNDARY_TABLE, CLIPPED_TABLE] {
        for (field, _) in ENDPOINT_FIELDS {
            backend.add_field(table, field, FieldType::Double)?;
        }
        for (field, expr) in ENDPOINT_FIELDS {
            backend.compute_field(table, field, expr)?;
        }
    }
    Ok(())
}

/// Resolve every boundary-crossing reach and rewrite the corrected
/// hydrography table `cfg.nhd`.
///
/// Classification compares each unclipped endpoint against its clipped
/// counterpart with a per-axis `|dx| < eps` test. The start endpoints are
/// checked first, so a reach whose ends both sit within tolerance is
/// classified `Out`; that precedence is deliberate and kept for
/// compatibility. A reach matching at neither end is recorded for manual
/// intervention and left untouched.
pub fn reconcile_boundaries(
    backend: &mut impl GisBackend,
    cfg: &SfrConfig,
    progress: Option<&ProgressBar>,
) -> Result<ReconcileOutcome> {
    info!("fixing routing for streams that cross the domain outline");
    let eps = cfg.eps;
    let mut outcome = ReconcileOutcome::default();

    let crossings = backend.scan_table(
        BOUNDARY_TABLE,
        &["COMID", "STARTX", "STARTY", "ENDX", "ENDY", "LENKM"],
    )?;
    if let Some(pb) = progress {
        pb.set_length(crossings.len() as u64);
    }

    for row in crossings {
        let comid = row[0].as_int()?;
        let start_x = row[1].as_real()?;
        let start_y = row[2].as_real()?;
        let end_x = row[3].as_real()?;
        let end_y = row[4].as_real()?;
        let unclipped_length_km = row[5].as_real()?;

        let clipped = backend.scan_table_filtered(
            CLIPPED_TABLE,
            &[
                "STARTX",
                "STARTY",
                "ENDX",
                "ENDY",
                "LENKM",
                "MAXELEVSMO",
                "MINELEVSMO",
            ],
            "COMID",
            comid,
        )?;
        let clip = clipped
            .first()
            .ok_or(SfrError::UnmatchedReach { comid })?;
        let clipped_start = (clip[0].as_real()?, clip[1].as_real()?);
        let clipped_end = (clip[2].as_real()?, clip[3].as_real()?);
        let clipped_length_km = clip[4].as_real()?;
        // The clipped copy's elevation attributes still describe the whole
        // unclipped reach; only its geometry was cut.
        let max_elev = clip[5].as_real()?;
        let min_elev = clip[6].as_real()?;

        let direction = if (start_x - clipped_start.0).abs() < eps
            && (start_y - clipped_start.1).abs() < eps
        {
            Some(FlowDirection::Out)
        } else if (end_x - clipped_end.0).abs() < eps && (end_y - clipped_end.1).abs() < eps {
            Some(FlowDirection::In)
        } else {
            None
        };

        match direction {
            Some(direction) => match compute_fix(
                comid,
                direction,
                clipped_start,
                clipped_end,
                max_elev,
                min_elev,
                clipped_length_km,
                unclipped_length_km,
            ) {
                Ok(fix) => {
                    outcome.fixes.insert(comid, fix);
                }
                Err(SfrError::DegenerateGeometry { .. }) => {
                    warn!("reach {comid} has zero unclipped length; skipping its boundary fix");
                    outcome.degenerate.push(comid);
                }
                Err(other) => return Err(other),
            },
            None => {
                warn!("both ends are cut off for comid {comid}; needs manual attention");
                outcome.manual.push(comid);
            }
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }

    // Fresh copy of the hydrography with every staged correction applied in
    // one pass; unresolved reaches keep their source attributes.
    info!("creating corrected hydrography table {}", cfg.nhd);
    backend.delete_if_exists(&cfg.nhd)?;
    backend.copy_features(&cfg.flowlines, &cfg.nhd)?;
    let fixes = &outcome.fixes;
    let rewritten = backend.update_rows(
        &cfg.nhd,
        "COMID",
        &["LENGTHKM", "MAXELEVSMO", "MINELEVSMO"],
        &mut |comid| {
            fixes.get(&comid).map(|fix| {
                vec![
                    Field::Real(fix.new_length),
                    Field::Real(fix.new_max_elev),
                    Field::Real(fix.new_min_elev),
                ]
            })
        },
    )?;
    info!("rewrote {rewritten} reaches in {}", cfg.nhd);

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gis::{MemoryBackend, MemoryTable};
    use std::collections::HashMap;

    fn test_config(eps: f64) -> SfrConfig {
        let mut settings: HashMap<String, String> = [
            "mf_grid",
            "mf_domain",
            "mf_dis",
            "dem",
            "intersect",
            "rivers_table",
            "plusflow_vaa",
            "elevslope",
            "flowlines_unclipped",
            "gis_workspace",
            "flow",
            "ftab",
            "flowlines",
            "elev",
            "cells",
            "nhd",
            "out",
            "mat1",
            "mat2",
            "width",
            "mult",
        ]
        .iter()
        .map(|k| (k.to_string(), k.to_string()))
        .collect();
        settings.insert("compute_zonal".to_string(), "false".to_string());
        settings.insert("reach_cutoff".to_string(), "0.0".to_string());
        settings.insert("eps".to_string(), eps.to_string());
        SfrConfig::from_settings(&settings).unwrap()
    }

    fn boundary_row(comid: i64, start: (f64, f64), end: (f64, f64), len_km: f64) -> Vec<Field> {
        vec![
            Field::Int(comid),
            Field::Real(start.0),
            Field::Real(start.1),
            Field::Real(end.0),
            Field::Real(end.1),
            Field::Real(len_km),
        ]
    }

    fn clipped_row(
        comid: i64,
        start: (f64, f64),
        end: (f64, f64),
        len_km: f64,
        max_elev: f64,
        min_elev: f64,
    ) -> Vec<Field> {
        vec![
            Field::Int(comid),
            Field::Real(start.0),
            Field::Real(start.1),
            Field::Real(end.0),
            Field::Real(end.1),
            Field::Real(len_km),
            Field::Real(max_elev),
            Field::Real(min_elev),
        ]
    }

    fn backend_with_working_tables(
        boundary: Vec<Vec<Field>>,
        clipped: Vec<Vec<Field>>,
        flowline_comids: &[i64],
    ) -> MemoryBackend {
        let mut backend = MemoryBackend::new();
        let mut boundary_table = MemoryTable::new(&[
            "COMID", "STARTX", "STARTY", "ENDX", "ENDY", "LENKM",
        ]);
        for row in boundary {
            boundary_table.push_row(row);
        }
        backend.insert_table(BOUNDARY_TABLE, boundary_table);

        let mut clipped_table = MemoryTable::new(&[
            "COMID", "STARTX", "STARTY", "ENDX", "ENDY", "LENKM", "MAXELEVSMO", "MINELEVSMO",
        ]);
        for row in clipped {
            clipped_table.push_row(row);
        }
        backend.insert_table(CLIPPED_TABLE, clipped_table);

        let mut flowlines = MemoryTable::new(&["COMID", "LENGTHKM", "MAXELEVSMO", "MINELEVSMO"]);
        for &comid in flowline_comids {
            flowlines.push_row(vec![
                Field::Int(comid),
                Field::Real(99.0),
                Field::Real(1000.0),
                Field::Real(900.0),
            ]);
        }
        backend.insert_table("flowlines", flowlines);
        backend
    }

    #[test]
    fn start_match_wins_when_both_ends_match() {
        // identical geometry: both endpoint pairs are within any tolerance
        let mut backend = backend_with_working_tables(
            vec![boundary_row(1, (0.0, 0.0), (5.0, 0.0), 10.0)],
            vec![clipped_row(1, (0.0, 0.0), (5.0, 0.0), 10.0, 80.0, 20.0)],
            &[1],
        );
        let outcome =
            reconcile_boundaries(&mut backend, &test_config(0.01), None).unwrap();
        assert_eq!(outcome.fixes[&1].direction, FlowDirection::Out);
        assert!(outcome.manual.is_empty());
    }

    #[test]
    fn end_match_classifies_inflow() {
        let mut backend = backend_with_working_tables(
            vec![boundary_row(2, (-100.0, 0.0), (5.0, 0.0), 8.0)],
            vec![clipped_row(2, (1.0, 0.0), (5.0, 0.0), 4.0, 90.0, 60.0)],
            &[2],
        );
        let outcome =
            reconcile_boundaries(&mut backend, &test_config(0.01), None).unwrap();
        let fix = &outcome.fixes[&2];
        assert_eq!(fix.direction, FlowDirection::In);
        assert_eq!(fix.new_min_elev, 60.0);
        assert_eq!(fix.new_max_elev, 75.0);
    }

    #[test]
    fn no_match_is_recorded_for_manual_intervention() {
        let mut backend = backend_with_working_tables(
            vec![
                boundary_row(1, (0.0, 0.0), (5.0, 0.0), 10.0),
                boundary_row(3, (100.0, 100.0), (200.0, 200.0), 10.0),
            ],
            vec![
                clipped_row(1, (0.0, 0.0), (4.0, 0.0), 6.0, 100.0, 40.0),
                clipped_row(3, (150.0, 150.0), (250.0, 250.0), 5.0, 50.0, 10.0),
            ],
            &[1, 3],
        );
        let outcome =
            reconcile_boundaries(&mut backend, &test_config(0.01), None).unwrap();
        assert_eq!(outcome.manual, vec![3]);
        assert!(!outcome.fixes.contains_key(&3));
        assert_eq!(outcome.fixes[&1].new_min_elev, 64.0);
    }

    #[test]
    fn degenerate_reach_is_skipped_not_fatal() {
        let mut backend = backend_with_working_tables(
            vec![
                boundary_row(1, (0.0, 0.0), (5.0, 0.0), 0.0),
                boundary_row(2, (0.0, 10.0), (5.0, 10.0), 10.0),
            ],
            vec![
                clipped_row(1, (0.0, 0.0), (5.0, 0.0), 0.0, 80.0, 20.0),
                clipped_row(2, (0.0, 10.0), (4.0, 10.0), 5.0, 80.0, 20.0),
            ],
            &[1, 2],
        );
        let outcome =
            reconcile_boundaries(&mut backend, &test_config(0.01), None).unwrap();
        assert_eq!(outcome.degenerate, vec![1]);
        assert!(outcome.fixes.contains_key(&2));
    }

    #[test]
    fn missing_clipped_counterpart_is_fatal() {
        let mut backend = backend_with_working_tables(
            vec![boundary_row(7, (0.0, 0.0), (5.0, 0.0), 10.0)],
            vec![],
            &[7],
        );
        match reconcile_boundaries(&mut backend, &test_config(0.01), None) {
            Err(SfrError::UnmatchedReach { comid }) => assert_eq!(comid, 7),
            other => panic!("expected UnmatchedReach, got {other:?}"),
        }
    }

    #[test]
    fn resolved_reaches_are_rewritten_in_the_output_table() {
        let mut backend = backend_with_working_tables(
            vec![
                boundary_row(1, (0.0, 0.0), (5.0, 0.0), 10.0),
                boundary_row(3, (100.0, 100.0), (200.0, 200.0), 10.0),
            ],
            vec![
                clipped_row(1, (0.0, 0.0), (4.0, 0.0), 6.0, 100.0, 40.0),
                clipped_row(3, (150.0, 150.0), (250.0, 250.0), 5.0, 50.0, 10.0),
            ],
            &[1, 3],
        );
        let cfg = test_config(0.01);
        reconcile_boundaries(&mut backend, &cfg, None).unwrap();

        let rows = backend
            .scan_table(&cfg.nhd, &["COMID", "LENGTHKM", "MAXELEVSMO", "MINELEVSMO"])
            .unwrap();
        let resolved = &rows[0];
        assert_eq!(resolved[0].as_int().unwrap(), 1);
        assert_eq!(resolved[1].as_real().unwrap(), 6.0);
        assert_eq!(resolved[2].as_real().unwrap(), 100.0);
        assert_eq!(resolved[3].as_real().unwrap(), 64.0);
        // the manual-intervention reach keeps its source attributes
        let untouched = &rows[1];
        assert_eq!(untouched[0].as_int().unwrap(), 3);
        assert_eq!(untouched[1].as_real().unwrap(), 99.0);
    }
}
