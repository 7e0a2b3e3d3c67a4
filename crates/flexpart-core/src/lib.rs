//! FLEXPART Core Library
//!
//! Coordinates a FLEXPART dispersion run: ERA5 extraction through the
//! `flex_extract` container, the `AVAILABLE` meteorological index, control
//! file generation, the model container itself and output validation.

pub mod config;
pub mod docker;
pub mod error;
pub mod fakes;
pub mod flex_extract;
pub mod input_builder;
pub mod meteo;
pub mod obs;
pub mod pipeline;
pub mod simulation;
pub mod telemetry;
pub mod validator;

pub use config::{
    parse_cli_datetime, CredPaths, PathsConfig, ReleaseGeometry, RuntimeConfig, SimulationConfig,
    SimulationNumerics, SpeciesDefinition, TimeWindow,
};
pub use docker::{
    ContainerInvocation, ContainerOutput, ContainerRuntime, DockerError, DockerRunner, MountMode,
    VolumeMount,
};
pub use error::{ConfigError, FlexpartError, Result};
pub use flex_extract::{ExtractArea, ExtractOutcome, FlexExtractService};
pub use input_builder::{FlexpartInputBuilder, PreparedInputs};
pub use meteo::{
    build_manifest, create_available_file, parse_product_timestamp, AvailabilityEntry,
    AvailabilityManifest, InputFile, MeteoError, MeteoObserver, NoopObserver, TracingObserver,
    AVAILABLE_FILE_NAME, DEFAULT_PRODUCT_PREFIX,
};
pub use pipeline::{FlexpartPipeline, PipelineResult, PipelineStage};
pub use simulation::FlexpartSimulationRunner;
pub use telemetry::{init_tracing, LogFormat};
pub use validator::{ResultValidator, ValidationReport};
