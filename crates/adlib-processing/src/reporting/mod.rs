//! Output writing.
//!
//! [`ReportGenerator`] writes the merged table as CSV and, on request, a
//! [`PipelineReport`] with the run summary and every skipped record.
//!
//! ```rust,ignore
//! use adlib_processing::reporting::{PipelineReport, ReportGenerator};
//!
//! let generator = ReportGenerator::new("output");
//! generator.write_dataset(&mut result.data, "DE_merged_data")?;
//! generator.write_report(&PipelineReport::from_result(&config, &result), "DE_merged_data")?;
//! ```

mod generator;

pub use generator::{PipelineReport, ReportGenerator};
