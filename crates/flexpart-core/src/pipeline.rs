//! End-to-end FLEXPART run orchestration.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::docker::ContainerRuntime;
use crate::error::Result;
use crate::flex_extract::FlexExtractService;
use crate::input_builder::FlexpartInputBuilder;
use crate::meteo::TracingObserver;
use crate::obs;
use crate::simulation::FlexpartSimulationRunner;
use crate::validator::{ResultValidator, ValidationReport};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// ERA5 download and `AVAILABLE` generation (skipped when ERA5 is off).
    FlexExtract,

    /// Control files and static tables.
    InputFiles,

    /// FLEXPART container run.
    Simulation,

    /// Output presence checks.
    Validation,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::FlexExtract => "flex_extract",
            PipelineStage::InputFiles => "input_files",
            PipelineStage::Simulation => "simulation",
            PipelineStage::Validation => "validation",
        }
    }
}

/// Wall-clock time spent in one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: PipelineStage,
    pub duration_ms: u64,
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub output_dir: PathBuf,

    /// `AVAILABLE` entries written by the extraction stage, if it ran.
    pub manifest_entries: Option<usize>,

    /// Completed stages in order.
    pub stages: Vec<StageTiming>,

    pub validation: ValidationReport,
    pub duration_ms: u64,
}

/// FLEXPART run orchestrator.
pub struct FlexpartPipeline;

impl FlexpartPipeline {
    /// Run every stage in sequence; the first failure aborts the run.
    ///
    /// Stages: flex_extract (when `use_era5`), input files, simulation,
    /// validation.
    pub async fn run(
        runtime: Arc<dyn ContainerRuntime>,
        cfg: &RuntimeConfig,
    ) -> Result<PipelineResult> {
        cfg.validate()?;

        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let span = obs::run_span(&run_id);

        let outcome = async {
            obs::emit_run_started(&run_id, &cfg.paths.workspace, cfg.simulation.use_era5);
            Self::run_stages(runtime, cfg).await
        }
        .instrument(span)
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(&run_id, duration_ms, outcome.is_ok());

        let (stages, manifest_entries, output_dir, validation) = outcome?;
        Ok(PipelineResult {
            run_id,
            output_dir,
            manifest_entries,
            stages,
            validation,
            duration_ms,
        })
    }

    async fn run_stages(
        runtime: Arc<dyn ContainerRuntime>,
        cfg: &RuntimeConfig,
    ) -> Result<(Vec<StageTiming>, Option<usize>, PathBuf, ValidationReport)> {
        let mut stages = Vec::new();
        let observer = TracingObserver;

        let manifest_entries = if cfg.simulation.use_era5 {
            let service = FlexExtractService::new(runtime.clone());
            let extracted = timed(
                PipelineStage::FlexExtract,
                &mut stages,
                service.run(cfg, &observer),
            )
            .await?;
            Some(extracted.manifest_entries)
        } else {
            info!("ERA5 extraction disabled; using existing meteorological inputs");
            None
        };

        let builder = FlexpartInputBuilder::new(runtime.clone());
        timed(PipelineStage::InputFiles, &mut stages, builder.prepare(cfg)).await?;

        let runner = FlexpartSimulationRunner::new(runtime);
        let output_dir = timed(PipelineStage::Simulation, &mut stages, runner.run(cfg)).await?;

        let validation = timed(PipelineStage::Validation, &mut stages, async {
            ResultValidator.validate(&output_dir)
        })
        .await?;

        info!("FLEXPART run complete. Results in {}", output_dir.display());
        Ok((stages, manifest_entries, output_dir, validation))
    }
}

async fn timed<T, F>(stage: PipelineStage, stages: &mut Vec<StageTiming>, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    obs::emit_stage_started(stage.name());
    let start = Instant::now();
    match work.await {
        Ok(value) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            obs::emit_stage_finished(stage.name(), duration_ms);
            stages.push(StageTiming { stage, duration_ms });
            Ok(value)
        }
        Err(err) => {
            obs::emit_stage_failed(stage.name(), &err);
            Err(err)
        }
    }
}
