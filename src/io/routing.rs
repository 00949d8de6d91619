//! Routing-correction table for reaches clipped at the domain boundary.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;

use crate::boundary::FlowDirection;
use crate::error::Result;
use crate::reconcile::{OUTSIDE_DOMAIN, ReconcileOutcome};

/// Write `FROMCOMID,TOCOMID` rows for every resolved boundary reach.
///
/// Inflowing reaches route from the synthetic outside source, outflowing
/// ones to the outside sink, so downstream routing never leaves the grid and
/// comes back. Rows come out in ascending comid order.
pub fn write_boundary_routing<W: Write>(outcome: &ReconcileOutcome, sink: W) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(sink);
    writer.write_record(["FROMCOMID", "TOCOMID"])?;
    for fix in outcome.fixes.values() {
        let (from, to) = match fix.direction {
            FlowDirection::In => (OUTSIDE_DOMAIN, fix.comid),
            FlowDirection::Out => (fix.comid, OUTSIDE_DOMAIN),
        };
        writer.write_record([from.to_string(), to.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_boundary_routing_file(outcome: &ReconcileOutcome, path: &Path) -> Result<()> {
    write_boundary_routing(outcome, File::create(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{FlowDirection, compute_fix};

    #[test]
    fn rows_use_the_outside_sentinel() {
        let mut outcome = ReconcileOutcome::default();
        outcome.fixes.insert(
            12,
            compute_fix(12, FlowDirection::Out, (0.0, 0.0), (1.0, 1.0), 10.0, 5.0, 1.0, 2.0)
                .unwrap(),
        );
        outcome.fixes.insert(
            7,
            compute_fix(7, FlowDirection::In, (0.0, 0.0), (1.0, 1.0), 10.0, 5.0, 1.0, 2.0)
                .unwrap(),
        );

        let mut buffer = Vec::new();
        write_boundary_routing(&outcome, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "FROMCOMID,TOCOMID\n99999,7\n12,99999\n");
    }
}
