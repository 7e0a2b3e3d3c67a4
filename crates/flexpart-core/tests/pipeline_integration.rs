//! Integration tests for the FLEXPART pipeline with RecordingRuntime.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use flexpart_core::fakes::RecordingRuntime;
use flexpart_core::{
    parse_cli_datetime, ContainerOutput, CredPaths, DockerError, FlexpartError,
    FlexpartPipeline, PathsConfig, PipelineStage, ReleaseGeometry, RuntimeConfig,
    SimulationConfig, SpeciesDefinition, TimeWindow,
};

const FLEXPART_IMAGE: &str = "flexpart-v10.4-arm64:latest";
const CONVERT2_IMAGE: &str = "convert2:latest";

fn runtime_config(workspace: &Path, cdsapirc: &Path) -> RuntimeConfig {
    let window = TimeWindow::new(
        parse_cli_datetime("2024-01-01T00:00").unwrap(),
        parse_cli_datetime("2024-01-01T12:00").unwrap(),
    )
    .unwrap();
    RuntimeConfig::new(
        SimulationConfig::new(
            window,
            ReleaseGeometry::at(47.5, 8.25),
            SpeciesDefinition::new("DUST", 100.0),
        ),
        PathsConfig::new(workspace),
        CredPaths::new(Some(cdsapirc.to_path_buf()), None),
    )
}

fn credential_file(dir: &Path) -> std::path::PathBuf {
    let path = dir.join(".cdsapirc");
    fs::write(&path, "url: https://cds.example\nkey: 1:abc\n").unwrap();
    path
}

/// flex_extract writes products; FLEXPART serves static tables via `cat`
/// and writes NetCDF output when run normally.
fn simulated_runtime() -> RecordingRuntime {
    RecordingRuntime::new()
        .with_image(FLEXPART_IMAGE)
        .with_image(CONVERT2_IMAGE)
        .on_run(CONVERT2_IMAGE, |inv| {
            let out = inv.host_path_for("/workspace/output").unwrap();
            for name in ["EC2024010106", "EC2024010100", "EC2024010112", "EC2024010200"] {
                fs::write(out.join(name), b"GRIB").unwrap();
            }
            Ok(ContainerOutput::default())
        })
        .on_run(FLEXPART_IMAGE, |inv| {
            if inv.entrypoint.is_some() {
                return Ok(ContainerOutput::from_stdout(format!("table {}", inv.args[0])));
            }
            let out = inv.host_path_for("/output").unwrap();
            fs::write(out.join("totals.nc"), b"CDF").unwrap();
            fs::write(out.join("grid_conc_20240101000000.nc"), b"CDF").unwrap();
            Ok(ContainerOutput::default())
        })
}

/// Test: full ERA5 run produces AVAILABLE, control files and validated output
#[tokio::test]
async fn test_full_era5_run() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("ws");
    let cfg = runtime_config(&workspace, &credential_file(dir.path()));
    let runtime = Arc::new(simulated_runtime());

    let result = FlexpartPipeline::run(runtime.clone(), &cfg)
        .await
        .expect("pipeline failed");

    assert!(!result.run_id.is_empty(), "Run ID should be set");
    assert_eq!(result.output_dir, workspace.join("output"));
    assert_eq!(result.manifest_entries, Some(3));
    let stages: Vec<PipelineStage> = result.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::FlexExtract,
            PipelineStage::InputFiles,
            PipelineStage::Simulation,
            PipelineStage::Validation,
        ]
    );
    assert_eq!(result.validation.grids.len(), 1);

    // AVAILABLE sits next to the products, window-filtered and ascending.
    let available =
        fs::read_to_string(workspace.join("meteo/preprocessed/AVAILABLE")).unwrap();
    let names: Vec<&str> = available
        .lines()
        .skip(3)
        .map(|line| line.split_whitespace().nth(2).unwrap())
        .collect();
    assert_eq!(names, vec!["EC2024010100", "EC2024010106", "EC2024010112"]);

    // Control files point FLEXPART at the preprocessed products.
    let pathnames = fs::read_to_string(workspace.join("pathnames")).unwrap();
    assert_eq!(
        pathnames,
        "/options/\n/output/\n/inputs/preprocessed/\n/inputs/preprocessed/AVAILABLE\n"
    );
    for name in ["COMMAND", "RELEASES", "OUTGRID", "AGECLASSES", "SPECIES/SPECIES_001"] {
        assert!(workspace.join(name).is_file(), "{name} should be written");
    }
    assert_eq!(
        fs::read_to_string(workspace.join("IGBP_int1.dat")).unwrap(),
        "table /options/IGBP_int1.dat"
    );

    // extract, three static tables, then the model run
    let invocations = runtime.invocations();
    assert_eq!(invocations.len(), 5);
    assert_eq!(invocations[0].image, CONVERT2_IMAGE);
    let model_run = invocations.last().unwrap();
    assert_eq!(model_run.image, FLEXPART_IMAGE);
    assert!(model_run.entrypoint.is_none());
    assert_eq!(
        model_run.host_path_for("/inputs"),
        Some(workspace.join("meteo").as_path())
    );
}

/// Test: with ERA5 disabled the extraction stage is skipped
#[tokio::test]
async fn test_run_without_era5() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("ws");
    let mut cfg = runtime_config(&workspace, &credential_file(dir.path()));
    cfg.simulation.use_era5 = false;
    cfg.credentials = CredPaths::default();
    let runtime = Arc::new(simulated_runtime());

    let result = FlexpartPipeline::run(runtime.clone(), &cfg)
        .await
        .expect("pipeline failed");

    assert_eq!(result.manifest_entries, None);
    assert_eq!(result.stages[0].stage, PipelineStage::InputFiles);
    assert!(runtime
        .invocations()
        .iter()
        .all(|inv| inv.image == FLEXPART_IMAGE));

    let pathnames = fs::read_to_string(workspace.join("pathnames")).unwrap();
    assert!(pathnames.contains("/inputs/AVAILABLE"));
    assert!(workspace.join("inputs").is_dir());
}

/// Test: a model run without totals.nc fails validation
#[tokio::test]
async fn test_missing_output_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = runtime_config(&dir.path().join("ws"), &credential_file(dir.path()));
    let runtime = RecordingRuntime::new()
        .with_image(FLEXPART_IMAGE)
        .with_image(CONVERT2_IMAGE)
        .on_run(CONVERT2_IMAGE, |inv| {
            let out = inv.host_path_for("/workspace/output").unwrap();
            fs::write(out.join("EC2024010100"), b"GRIB").unwrap();
            Ok(ContainerOutput::default())
        });

    let err = FlexpartPipeline::run(Arc::new(runtime), &cfg)
        .await
        .unwrap_err();
    match err {
        FlexpartError::MissingOutputs { missing, .. } => {
            assert_eq!(missing, vec!["totals.nc".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test: a failing container aborts the run before later stages
#[tokio::test]
async fn test_container_failure_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("ws");
    let cfg = runtime_config(&workspace, &credential_file(dir.path()));
    let runtime = Arc::new(
        RecordingRuntime::new()
            .with_image(FLEXPART_IMAGE)
            .with_image(CONVERT2_IMAGE)
            .on_run(CONVERT2_IMAGE, |_| {
                Err(DockerError::CommandFailed {
                    exit_code: 1,
                    message: "CDS request rejected".to_string(),
                })
            }),
    );

    let err = FlexpartPipeline::run(runtime.clone(), &cfg)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("CDS request rejected"));
    assert_eq!(runtime.invocations().len(), 1);
    assert!(!workspace.join("pathnames").exists());
}

/// Test: invalid configuration is rejected before any container runs
#[tokio::test]
async fn test_invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = runtime_config(&dir.path().join("ws"), &credential_file(dir.path()));
    cfg.simulation.release.height_top_m = -1.0;
    let runtime = Arc::new(simulated_runtime());

    let err = FlexpartPipeline::run(runtime.clone(), &cfg)
        .await
        .unwrap_err();
    assert!(matches!(err, FlexpartError::Config(_)));
    assert!(runtime.invocations().is_empty());
}
