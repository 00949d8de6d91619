//! Elevation and length correction for reaches cut by the model-domain
//! boundary. Pure arithmetic; geometry stays behind the backend seam.

use crate::error::{Result, SfrError};

/// Which way flow crosses the domain boundary at a clipped reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// Flow enters the domain from outside; the upstream portion was clipped off.
    In,
    /// Flow exits the domain; the downstream portion was clipped off.
    Out,
}

/// Corrected attributes for one boundary-crossing reach.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFix {
    pub comid: i64,
    pub direction: FlowDirection,
    pub new_start_x: f64,
    pub new_start_y: f64,
    pub new_end_x: f64,
    pub new_end_y: f64,
    /// Clipped length, km; never exceeds the unclipped length.
    pub new_length: f64,
    /// Elevation drop across the whole unclipped reach.
    pub slope: f64,
    pub new_max_elev: f64,
    pub new_min_elev: f64,
}

/// Interpolate corrected elevations for a clipped reach.
///
/// The elevation drop is spread linearly over the unclipped length, so the
/// surviving fraction keeps a proportional share of it: an `Out` reach keeps
/// its upstream (max) elevation and loses drop from the bottom, an `In`
/// reach keeps its downstream (min) elevation and loses drop from the top.
/// Results round to the nearest whole elevation unit, ties away from zero
/// (`f64::round`).
#[allow(clippy::too_many_arguments)]
pub fn compute_fix(
    comid: i64,
    direction: FlowDirection,
    clipped_start: (f64, f64),
    clipped_end: (f64, f64),
    unclipped_max_elev: f64,
    unclipped_min_elev: f64,
    clipped_length_km: f64,
    unclipped_length_km: f64,
) -> Result<BoundaryFix> {
    if unclipped_length_km == 0.0 {
        return Err(SfrError::DegenerateGeometry { comid });
    }
    let slope = unclipped_max_elev - unclipped_min_elev;
    let (new_max_elev, new_min_elev) = match direction {
        FlowDirection::Out => (
            unclipped_max_elev.round(),
            (unclipped_max_elev - slope * clipped_length_km / unclipped_length_km).round(),
        ),
        FlowDirection::In => {
            let clipped_off_length = unclipped_length_km - clipped_length_km;
            (
                (unclipped_max_elev - slope * clipped_off_length / unclipped_length_km).round(),
                unclipped_min_elev.round(),
            )
        }
    };
    Ok(BoundaryFix {
        comid,
        direction,
        new_start_x: clipped_start.0,
        new_start_y: clipped_start.1,
        new_end_x: clipped_end.0,
        new_end_y: clipped_end.1,
        new_length: clipped_length_km,
        slope,
        new_max_elev,
        new_min_elev,
    })
}
