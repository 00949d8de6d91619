//! SFR network building: fuses NHDPlus hydrography with a MODFLOW
//! finite-difference grid and repairs routing topology where the hydrography
//! is clipped by the model-domain boundary.

pub mod boundary;
pub mod cli;
pub mod config;
pub mod error;
pub mod gis;
pub mod io;
pub mod reconcile;
pub mod registry;

pub use config::SfrConfig;
pub use error::{Result, SfrError};
