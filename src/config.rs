//! Input settings for an SFR package build.
//!
//! Loaded from a JSON document of key -> text pairs. Every value is text in
//! the document; typed settings are converted here so the rest of the crate
//! never parses strings.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, SfrError};

/// Endpoint-matching tolerance used when the document does not carry a
/// usable `eps` value.
pub const DEFAULT_EPS: f64 = 1.0000001e-2;

/// All settings for one build run.
#[derive(Debug, Clone)]
pub struct SfrConfig {
    pub compute_zonal: bool,
    pub reach_cutoff: f64,
    pub mf_grid: String,
    pub mf_domain: String,
    pub mf_dis: String,
    pub dem: String,
    pub intersect: String,
    pub rivers_table: String,
    pub plusflow_vaa: String,
    pub elevslope: String,
    pub flowlines_unclipped: String,
    pub gis_workspace: String,
    pub flow: String,
    pub ftab: String,
    pub flowlines: String,
    pub elev: String,
    pub cells: String,
    pub nhd: String,
    pub out: String,
    pub mat1: String,
    pub mat2: String,
    pub width: String,
    pub mult: String,
    /// Per-axis tolerance for matching reach endpoints at the domain boundary.
    pub eps: f64,
}

impl SfrConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| SfrError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: HashMap<String, String> =
            serde_json::from_str(&contents).map_err(|source| SfrError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_settings(&settings)
    }

    /// Validate a bag of key -> text settings into typed form.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        let reach_cutoff_text = required(settings, "reach_cutoff")?;
        let reach_cutoff =
            reach_cutoff_text
                .parse::<f64>()
                .map_err(|_| SfrError::InvalidSetting {
                    key: "reach_cutoff",
                    value: reach_cutoff_text.clone(),
                })?;

        // Any failure to obtain a float here, absent key included, falls back
        // to the default tolerance.
        let eps = settings
            .get("eps")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_EPS);

        Ok(SfrConfig {
            compute_zonal: parse_flag(&required(settings, "compute_zonal")?),
            reach_cutoff,
            mf_grid: required(settings, "mf_grid")?,
            mf_domain: required(settings, "mf_domain")?,
            mf_dis: required(settings, "mf_dis")?,
            dem: required(settings, "dem")?,
            intersect: required(settings, "intersect")?,
            rivers_table: required(settings, "rivers_table")?,
            plusflow_vaa: required(settings, "plusflow_vaa")?,
            elevslope: required(settings, "elevslope")?,
            flowlines_unclipped: required(settings, "flowlines_unclipped")?,
            gis_workspace: required(settings, "gis_workspace")?,
            flow: required(settings, "flow")?,
            ftab: required(settings, "ftab")?,
            flowlines: required(settings, "flowlines")?,
            elev: required(settings, "elev")?,
            cells: required(settings, "cells")?,
            nhd: required(settings, "nhd")?,
            out: required(settings, "out")?,
            mat1: required(settings, "mat1")?,
            mat2: required(settings, "mat2")?,
            width: required(settings, "width")?,
            mult: required(settings, "mult")?,
            eps,
        })
    }
}

fn required(settings: &HashMap<String, String>, key: &'static str) -> Result<String> {
    settings
        .get(key)
        .cloned()
        .ok_or(SfrError::MissingSetting { key })
}

// "true" in any casing is true, anything else is false.
fn parse_flag(text: &str) -> bool {
    text.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRING_KEYS: [&str; 21] = [
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
    ];

    fn full_settings() -> HashMap<String, String> {
        let mut settings: HashMap<String, String> = STRING_KEYS
            .iter()
            .map(|k| (k.to_string(), format!("{k}.dat")))
            .collect();
        settings.insert("compute_zonal".to_string(), "True".to_string());
        settings.insert("reach_cutoff".to_string(), "1.0".to_string());
        settings
    }

    #[test]
    fn full_document_parses() {
        let cfg = SfrConfig::from_settings(&full_settings()).unwrap();
        assert!(cfg.compute_zonal);
        assert_eq!(cfg.reach_cutoff, 1.0);
        assert_eq!(cfg.flowlines, "flowlines.dat");
        assert_eq!(cfg.eps, DEFAULT_EPS);
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let mut settings = full_settings();
        settings.remove("flowlines");
        match SfrConfig::from_settings(&settings) {
            Err(SfrError::MissingSetting { key }) => assert_eq!(key, "flowlines"),
            other => panic!("expected MissingSetting, got {other:?}"),
        }
    }

    #[test]
    fn bad_reach_cutoff_is_rejected() {
        let mut settings = full_settings();
        settings.insert("reach_cutoff".to_string(), "ten".to_string());
        assert!(matches!(
            SfrConfig::from_settings(&settings),
            Err(SfrError::InvalidSetting {
                key: "reach_cutoff",
                ..
            })
        ));
    }

    #[test]
    fn compute_zonal_is_case_insensitive() {
        for (text, expected) in [("TRUE", true), ("true", true), ("False", false), ("1", false)] {
            let mut settings = full_settings();
            settings.insert("compute_zonal".to_string(), text.to_string());
            let cfg = SfrConfig::from_settings(&settings).unwrap();
            assert_eq!(cfg.compute_zonal, expected, "for {text:?}");
        }
    }

    #[test]
    fn eps_defaults_when_missing_or_unparsable() {
        let cfg = SfrConfig::from_settings(&full_settings()).unwrap();
        assert_eq!(cfg.eps, DEFAULT_EPS);

        let mut settings = full_settings();
        settings.insert("eps".to_string(), "not-a-number".to_string());
        let cfg = SfrConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.eps, DEFAULT_EPS);

        let mut settings = full_settings();
        settings.insert("eps".to_string(), "0.5".to_string());
        let cfg = SfrConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.eps, 0.5);
    }
}
