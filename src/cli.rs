use clap::{Parser, command};
use std::path::PathBuf;

/// Build SFR boundary corrections from hydrography and model-grid tables.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON settings document.
    pub config: PathBuf,

    /// Directory the routing-correction and manual-fix files are written to.
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,
}

pub fn get_args() -> Args {
    Args::parse()
}
