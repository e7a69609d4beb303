use crate::output::print_json;
use anyhow::Context;
use backfill_core::{io, paths, record::sample_records};
use std::path::Path;

pub fn run(root: &Path, out: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let records = sample_records();

    let Some(out) = out else {
        return print_json(&records);
    };

    let path = paths::resolve(root, out);
    io::write_records(&path, &records)
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({
            "path": path,
            "records": records.len(),
        }))?;
    } else {
        println!("Wrote {} sample records to {}", records.len(), path.display());
    }
    Ok(())
}
