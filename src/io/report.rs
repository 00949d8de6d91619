//! Manual-intervention report for reaches the boundary fix could not
//! classify. Written only when at least one reach needs attention.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

const BANNER: &str = "################";

pub fn write_manual_fix_report<W: Write>(comids: &[i64], mut sink: W) -> Result<()> {
    writeln!(sink, "{BANNER}")?;
    for comid in comids {
        writeln!(sink, "both ends are cut off for comid {comid}")?;
    }
    writeln!(sink, "{BANNER}")?;
    Ok(())
}

pub fn write_manual_fix_report_file(comids: &[i64], path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_manual_fix_report(comids, &mut writer)?;
    writer.flush()?;
    Ok(())
}
