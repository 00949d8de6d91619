use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use sfr_rs::cli::get_args;
use sfr_rs::config::SfrConfig;
use sfr_rs::gis::SqliteBackend;
use sfr_rs::io::report::write_manual_fix_report_file;
use sfr_rs::io::routing::write_boundary_routing_file;
use sfr_rs::reconcile::{prepare_boundary_tables, reconcile_boundaries};
use sfr_rs::registry::ReachRegistry;

fn main() -> Result<()> {
    env_logger::init();
    let args = get_args();

    let cfg = SfrConfig::from_file(&args.config)
        .with_context(|| format!("failed to load settings from {:?}", args.config))?;
    let mut backend = SqliteBackend::open(Path::new(&cfg.gis_workspace))
        .with_context(|| format!("failed to open GIS workspace {:?}", cfg.gis_workspace))?;

    // Registry passes, in order
    println!("Building reach registry...");
    let mut registry = ReachRegistry::populate(&backend, &cfg)?;
    registry.populate_elevations(&mut backend, &cfg)?;
    registry.populate_routing(&backend, &cfg)?;
    println!(
        "Registry holds {} reaches ({} routing edges dropped, {} dangling neighbor refs)",
        registry.len(),
        registry.dropped_edges(),
        registry.unknown_neighbor_refs()
    );

    println!("Reconciling reaches at the domain boundary...");
    prepare_boundary_tables(&mut backend, &cfg)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} reaches ({eta})")?
            .progress_chars("#>-"),
    );
    let outcome = reconcile_boundaries(&mut backend, &cfg, Some(&pb))?;
    pb.finish_and_clear();

    let routing_path = args.output_dir.join("boundaryClipsRouting.txt");
    println!("Saving routing information to {}", routing_path.display());
    write_boundary_routing_file(&outcome, &routing_path)?;

    if outcome.needs_manual_fix() {
        let report_path = args.output_dir.join("boundary_manual_fix_issues.txt");
        write_manual_fix_report_file(&outcome.manual, &report_path)?;
        println!(
            "Some manual intervention required: {} reaches, see {}",
            outcome.manual.len(),
            report_path.display()
        );
    }

    println!(
        "Resolved {} boundary reaches ({} skipped as zero-length)",
        outcome.fixes.len(),
        outcome.degenerate.len()
    );
    Ok(())
}
