//! Result files
//!
//! Saves and reloads result trees as XML documents and exports flat CSV
//! rows for spreadsheets. One row per executed leaf.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::model::TestResult;
use crate::output::JunitReport;
use crate::serial::{read_result_document, write_result_document};

/// Save a result tree as an XML document.
pub fn save_result_xml(path: &Path, result: &TestResult) -> Result<()> {
    let document = write_result_document(result).context("Failed to serialize results")?;
    fs::write(path, document)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved test results to {}", path.display());
    Ok(())
}

/// Load a result tree from an XML document.
pub fn load_result_xml(path: &Path) -> Result<TestResult> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let result = read_result_document(&text).context("Failed to parse results")?;
    debug!("Loaded test results from {}", path.display());
    Ok(result)
}

/// Save a result tree as a JUnit document.
pub fn save_junit_xml(path: &Path, result: &TestResult) -> Result<()> {
    let document = JunitReport::new()
        .to_document(result)
        .context("Failed to build JUnit document")?;
    fs::write(path, document)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved JUnit report to {}", path.display());
    Ok(())
}

/// Export one CSV row per leaf.
pub fn export_csv(path: &Path, result: &TestResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(["suite", "test", "status", "elapsed_ms", "detail"])?;
    write_rows(&mut writer, result, &mut Vec::new())?;
    writer.flush()?;

    info!("Exported results to {}", path.display());
    Ok(())
}

fn write_rows<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    node: &TestResult,
    trail: &mut Vec<String>,
) -> Result<()> {
    if node.is_leaf() {
        let detail = node
            .errors()
            .first()
            .map(|e| e.to_string())
            .unwrap_or_default();
        writer.write_record([
            trail.join("/"),
            node.name().full_name(),
            node.status().as_str().to_string(),
            node.elapsed_ms().unwrap_or(0).to_string(),
            detail,
        ])?;
        return Ok(());
    }
    trail.push(node.name().full_name());
    for child in node.children() {
        write_rows(writer, child, trail)?;
    }
    trail.pop();
    Ok(())
}
