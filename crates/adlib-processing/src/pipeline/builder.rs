//! Main preprocessing pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder that take a
//! raw ad-library export and a targeting export to the merged analysis table.

use crate::cleaner::AdLibraryCleaner;
use crate::config::{ConfigValidationError, PipelineConfig, RecordErrorPolicy};
use crate::demographics::{DemographicRecord, derive_profile};
use crate::error::{PreprocessingError, Result};
use crate::pipeline::criteria::CriteriaProfile;
use crate::pipeline::merge::{TargetingTable, merge_targeting};
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PreprocessingStage, ProgressReporter,
    ProgressUpdate,
};
use crate::pipeline::table::build_output_table;
use crate::reporting::{PipelineReport, ReportGenerator};
use crate::types::{PipelineResult, PipelineSummary, ProcessedAd, SkippedRecord};
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Records handled between cancellation checks and progress updates.
const BATCH_SIZE: usize = 1_000;

/// The ad-library preprocessing pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use adlib_processing::{CancellationToken, Pipeline, PipelineConfig};
///
/// let token = CancellationToken::new();
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().country_id("DE").build()?)
///     .cancellation_token(token.clone())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .process(&ad_library, &targeting)?;
///
/// println!("{} ads, {} skipped", result.data.height(), result.skipped_records.len());
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    cleaner: AdLibraryCleaner,
    reporter: ReportGenerator,
}

static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean, merge and derive demographics for an ad-library export and its
    /// targeting export.
    ///
    /// # Errors
    ///
    /// Returns `Err(PreprocessingError::Cancelled)` if the run was cancelled
    /// through the cancellation token. Under [`RecordErrorPolicy::Abort`] the
    /// first record failure is returned as [`PreprocessingError::Record`].
    pub fn process(&self, ad_library: &DataFrame, targeting: &DataFrame) -> Result<PipelineResult> {
        self.run(ad_library, targeting, None)
    }

    /// Like [`process`](Self::process), with the location-targeting export
    /// left-joined onto the targeting rows.
    pub fn process_with_location(
        &self,
        ad_library: &DataFrame,
        targeting: &DataFrame,
        location: &DataFrame,
    ) -> Result<PipelineResult> {
        self.run(ad_library, targeting, Some(location))
    }

    fn run(
        &self,
        ad_library: &DataFrame,
        targeting: &DataFrame,
        location: Option<&DataFrame>,
    ) -> Result<PipelineResult> {
        match self.process_internal(ad_library, targeting, location) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Pipeline completed: {} ads derived, {} skipped",
                    result.summary.records_derived, result.summary.records_skipped
                )));
                Ok(result)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(PreprocessingError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    /// Apply the record error policy to a failed record.
    ///
    /// Frame-level errors always propagate.
    fn handle_record_error(
        &self,
        stage: PreprocessingStage,
        error: PreprocessingError,
        skipped: &mut Vec<SkippedRecord>,
    ) -> Result<()> {
        if !error.is_record_level() || self.config.record_error_policy == RecordErrorPolicy::Abort {
            return Err(error);
        }
        warn!("Skipping record during {}: {}", stage.display_name(), error);
        skipped.push(SkippedRecord::from_error(stage, &error));
        Ok(())
    }

    /// Cancellation check and progress update at batch boundaries.
    fn batch_checkpoint(
        &self,
        stage: PreprocessingStage,
        done: usize,
        total: usize,
        noun: &str,
    ) -> Result<()> {
        if done % BATCH_SIZE != 0 {
            return Ok(());
        }
        self.check_cancelled()?;
        let batch = done / BATCH_SIZE + 1;
        let batches = total.div_ceil(BATCH_SIZE).max(1);
        self.report_progress(ProgressUpdate::with_items(
            stage,
            format!("Batch {batch}/{batches}"),
            done,
            total,
            format!("{} {done}/{total} {noun}", stage.display_name()),
        ));
        Ok(())
    }

    fn process_internal(
        &self,
        ad_library: &DataFrame,
        targeting: &DataFrame,
        location: Option<&DataFrame>,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();

        info!("Starting ad-library preprocessing pipeline...");
        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Initializing,
            0.0,
            "Starting preprocessing pipeline...",
        ));

        let mut summary = PipelineSummary {
            ad_rows: ad_library.height(),
            targeting_rows: targeting.height(),
            ..PipelineSummary::default()
        };
        let mut skipped: Vec<SkippedRecord> = Vec::new();

        let targeting_table = TargetingTable::from_frames(targeting, location)?;
        summary.location_rows = targeting_table.location_rows();
        debug!(
            "Ad library: {:?}, targeting: {:?}, location: {:?}",
            ad_library.shape(),
            targeting.shape(),
            location.map(DataFrame::shape)
        );

        self.check_cancelled()?;

        // Step 1: Clean ad-library rows and expand demographics
        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Cleaning,
            0.0,
            "Cleaning ad-library rows...",
        ));
        info!("Step 1: Cleaning {} ad-library rows...", ad_library.height());

        let cleaned = self.cleaner.clean(ad_library)?;
        let total = cleaned.len();
        let mut ads = Vec::with_capacity(total);
        for (done, record) in cleaned.into_iter().enumerate() {
            self.batch_checkpoint(PreprocessingStage::Cleaning, done, total, "rows")?;
            match record {
                Ok(ad) => ads.push(ad),
                Err(e) => self.handle_record_error(PreprocessingStage::Cleaning, e, &mut skipped)?,
            }
        }
        summary.ads_cleaned = ads.len();

        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Cleaning,
            1.0,
            format!("Cleaned {} of {} rows", ads.len(), total),
        ));

        self.check_cancelled()?;

        // Step 2: Join with targeting and filter by start date
        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Merging,
            0.0,
            "Merging targeting rows...",
        ));
        info!(
            "Step 2: Merging with {} targeting rows...",
            targeting_table.rows()
        );

        let merged = merge_targeting(ads, &targeting_table, self.config.start_date);
        summary.ads_without_targeting = merged.ads_without_targeting;
        summary.ads_before_start_date = merged.ads_before_start_date;
        summary.rows_without_spend = merged.rows_without_spend;
        debug!(
            "{} merged rows, {} ads without targeting, {} rows before {}, {} without spend",
            merged.pairs.len(),
            merged.ads_without_targeting,
            merged.ads_before_start_date,
            self.config.start_date,
            merged.rows_without_spend
        );

        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Merging,
            1.0,
            format!("{} merged rows", merged.pairs.len()),
        ));

        self.check_cancelled()?;

        // Step 3: Derive distributions, distances and targeting criteria
        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Deriving,
            0.0,
            "Deriving demographic distributions...",
        ));
        info!("Step 3: Deriving demographic distributions and targeting criteria...");

        let total = merged.pairs.len();
        let mut processed: Vec<ProcessedAd> = Vec::with_capacity(total);
        for (done, (ad, targeting_row)) in merged.pairs.into_iter().enumerate() {
            self.batch_checkpoint(PreprocessingStage::Deriving, done, total, "records")?;

            let record = DemographicRecord {
                id: ad.id.clone(),
                targeting_gender: targeting_row.gender.clone(),
                targeting_age: targeting_row.age.clone(),
                shares: ad.shares.clone(),
            };
            let derived = derive_profile(&record).and_then(|profile| {
                CriteriaProfile::parse(
                    targeting_row.include.as_deref(),
                    targeting_row.exclude.as_deref(),
                )
                .map(|criteria| (profile, criteria))
                .map_err(|source| PreprocessingError::record(&ad.id, source))
            });
            match derived {
                Ok((profile, criteria)) => processed.push(ProcessedAd {
                    ad,
                    targeting: targeting_row,
                    profile,
                    criteria,
                }),
                Err(e) => self.handle_record_error(PreprocessingStage::Deriving, e, &mut skipped)?,
            }
        }
        summary.records_derived = processed.len();
        summary.records_skipped = skipped.len();
        summary.mean_gender_distance =
            mean(processed.iter().map(|p| p.profile.gender_distribution_distance));
        summary.mean_age_distance =
            mean(processed.iter().map(|p| p.profile.age_distribution_distance));

        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Deriving,
            1.0,
            format!("Derived {} records, skipped {}", processed.len(), skipped.len()),
        ));

        self.check_cancelled()?;

        // Step 4: Assemble the output table
        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Assembling,
            0.0,
            "Assembling output table...",
        ));
        info!("Step 4: Assembling output table...");

        let mut data = build_output_table(
            &processed,
            ad_library,
            targeting,
            location,
            &self.config.country_id,
        )?;
        debug!("Output shape: {:?}", data.shape());

        self.report_progress(ProgressUpdate::new(
            PreprocessingStage::Assembling,
            1.0,
            format!("Assembled {} rows x {} columns", data.height(), data.width()),
        ));

        self.check_cancelled()?;

        // Step 5: Write outputs
        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        let stem = self.config.output_file_stem();
        let mut output_file = None;
        let mut report_file = None;

        if self.config.save_to_disk {
            self.report_progress(ProgressUpdate::new(
                PreprocessingStage::Writing,
                0.0,
                "Writing merged table...",
            ));
            info!("Step 5: Writing outputs...");

            let path = self.reporter.write_dataset(&mut data, &stem)?;
            output_file = Some(path.to_string_lossy().to_string());
        }

        if self.config.emit_report {
            let report =
                PipelineReport::new(&self.config, &summary, &skipped, output_file.as_deref());
            let path = self.reporter.write_report(&report, &stem)?;
            report_file = Some(path.to_string_lossy().to_string());
        }

        if output_file.is_some() || report_file.is_some() {
            self.report_progress(ProgressUpdate::new(
                PreprocessingStage::Writing,
                1.0,
                "Outputs written",
            ));
        }

        info!(
            "Pipeline finished in {}ms: {} rows, {} skipped",
            summary.duration_ms, summary.records_derived, summary.records_skipped
        );

        Ok(PipelineResult {
            data,
            summary,
            skipped_records: skipped,
            output_file,
            report_file,
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0_f64, 0_usize), |(sum, count), value| {
        (sum + value, count + 1)
    });
    (count > 0).then(|| sum / count as f64)
}

/// Builder for creating a [`Pipeline`] with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = Pipeline::builder()
///     .config(PipelineConfig::default())
///     .cancellation_token(token)
///     .on_progress(|update| println!("{}", update.message))
///     .build()?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// Shorthand for [`progress_reporter`](Self::progress_reporter) with a
    /// [`ClosureProgressReporter`].
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline.
    ///
    /// The token is checked between stages and every batch of records.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            cleaner: AdLibraryCleaner::new(config.election_date),
            reporter: ReportGenerator::new(config.output_dir.clone()),
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
            config,
        })
    }
}
