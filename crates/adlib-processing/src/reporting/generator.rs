use crate::config::PipelineConfig;
use crate::error::{PreprocessingError, Result};
use crate::types::{PipelineResult, PipelineSummary, SkippedRecord};
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Run report written next to the output table and printed by `--json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    /// Path to the output table (if written)
    pub output_file: Option<String>,
    /// Configuration the run used
    pub config: PipelineConfig,
    pub summary: PipelineSummary,
    /// Records dropped under the skip policy, in input order
    pub skipped_records: Vec<SkippedRecord>,
}

impl PipelineReport {
    pub fn new(
        config: &PipelineConfig,
        summary: &PipelineSummary,
        skipped_records: &[SkippedRecord],
        output_file: Option<&str>,
    ) -> Self {
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            output_file: output_file.map(str::to_string),
            config: config.clone(),
            summary: summary.clone(),
            skipped_records: skipped_records.to_vec(),
        }
    }

    /// Report for a finished run.
    pub fn from_result(config: &PipelineConfig, result: &PipelineResult) -> Self {
        Self::new(
            config,
            &result.summary,
            &result.skipped_records,
            result.output_file.as_deref(),
        )
    }
}

/// Writes the output table and the JSON run report.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `df` to `<output_dir>/<file_stem>.csv`.
    pub fn write_dataset(&self, df: &mut DataFrame, file_stem: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_dir.join(format!("{file_stem}.csv"));
        let mut file = File::create(&output_path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)?;

        info!("Dataset saved: {}", output_path.display());
        debug!("Wrote {} rows x {} columns", df.height(), df.width());
        Ok(output_path)
    }

    /// Write `report` to `<output_dir>/<file_stem>_report.json`.
    pub fn write_report(&self, report: &PipelineReport, file_stem: &str) -> Result<PathBuf> {
        let report_path = self.output_dir.join(format!("{file_stem}_report.json"));
        let json = serde_json::to_string_pretty(report)?;

        fs::create_dir_all(&self.output_dir)
            .and_then(|_| File::create(&report_path))
            .and_then(|mut file| file.write_all(json.as_bytes()))
            .map_err(|e| {
                PreprocessingError::ReportGenerationFailed(format!(
                    "{}: {e}",
                    report_path.display()
                ))
            })?;

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }
}
