use std::path::Path;

use specfile::{FileSpec, ScanId, Value};
use tracing::debug;

use crate::cli::GlobalArgs;

fn open(global: &GlobalArgs, path: &Path) -> anyhow::Result<FileSpec> {
    let options = global.parse_options()?;
    debug!(?options, "parse options");
    Ok(FileSpec::open_with(path, options)?)
}

pub fn list(global: &GlobalArgs, path: &Path) -> anyhow::Result<()> {
    let spec = open(global, path)?;
    let listing = spec.list_scans();
    if listing.is_empty() {
        println!("No scans found in {}", path.display());
        return Ok(());
    }

    println!("{:<6} {:<8} {:<6} {}", "Pos", "Scan", "Order", "Command");
    println!("{}", "-".repeat(60));
    for entry in &listing {
        let number = entry
            .number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into());
        println!(
            "{:<6} {:<8} {:<6} {}",
            entry.position, number, entry.order, entry.command
        );
    }
    println!("\n{} scan(s) found.", listing.len());
    Ok(())
}

pub fn info(global: &GlobalArgs, path: &Path) -> anyhow::Result<()> {
    let spec = open(global, path)?;
    println!("{}", serde_json::to_string_pretty(&spec.info())?);
    Ok(())
}

pub fn show(global: &GlobalArgs, path: &Path, id: ScanId) -> anyhow::Result<()> {
    let spec = open(global, path)?;
    let scan = spec.get_scan(id)?;
    println!("{}", serde_json::to_string_pretty(&scan.summary())?);
    Ok(())
}

pub fn data(global: &GlobalArgs, path: &Path, id: ScanId, json: bool) -> anyhow::Result<()> {
    let spec = open(global, path)?;
    let scan = spec.get_scan(id)?;
    let block = scan.data();
    if json {
        println!("{}", serde_json::to_string_pretty(block)?);
        return Ok(());
    }

    println!("#{}", block.labels.join("\t"));
    for row in &block.rows {
        let cells: Vec<String> = row
            .cells()
            .iter()
            .map(|cell| match &cell.value {
                Value::Scalar(v) => v.to_string(),
                Value::Series(s) => format!("[{} ch]", s.len()),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    for issue in &scan.issues {
        eprintln!("warning: {issue}");
    }
    Ok(())
}
