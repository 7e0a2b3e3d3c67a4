//! FLEXPART control files: `pathnames`, `COMMAND`, `RELEASES`, `SPECIES`,
//! `OUTGRID` and `AGECLASSES`.
//!
//! The `render_*` functions are pure and produce the exact namelist text
//! FLEXPART v10.4 reads; [`FlexpartInputBuilder::prepare`] writes them into
//! the workspace together with the static tables copied out of the image.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use crate::config::{ReleaseGeometry, RuntimeConfig, SimulationConfig, SpeciesDefinition};
use crate::docker::ContainerRuntime;
use crate::error::Result;
use crate::meteo::AVAILABLE_FILE_NAME;

/// Land-use and surface tables shipped inside the FLEXPART image under `/options/`.
pub const STATIC_FILES: [&str; 3] = ["IGBP_int1.dat", "sfcdata.t", "sfcdepo.t"];

/// Decay value FLEXPART treats as "no decay".
const NO_DECAY: f64 = -9.9;

/// Files written by [`FlexpartInputBuilder::prepare`].
#[derive(Debug, Clone, Default)]
pub struct PreparedInputs {
    pub files: Vec<PathBuf>,
}

/// Generates the FLEXPART control files for a run.
pub struct FlexpartInputBuilder {
    runtime: Arc<dyn ContainerRuntime>,
}

impl FlexpartInputBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn prepare(&self, cfg: &RuntimeConfig) -> Result<PreparedInputs> {
        let paths = &cfg.paths;
        fs::create_dir_all(&paths.workspace)?;
        fs::create_dir_all(paths.output_dir())?;
        fs::create_dir_all(paths.species_dir())?;

        let mut prepared = PreparedInputs::default();
        self.extract_static_files(cfg, &mut prepared).await?;

        let sim = &cfg.simulation;
        let workspace = &paths.workspace;
        let inputs_root = meteo_inputs_root(cfg);
        write_file(
            workspace.join("pathnames"),
            &render_pathnames(inputs_root),
            &mut prepared,
        )?;
        write_file(workspace.join("COMMAND"), &render_command(sim), &mut prepared)?;
        write_file(workspace.join("RELEASES"), &render_releases(sim), &mut prepared)?;
        write_file(
            paths.species_dir().join("SPECIES_001"),
            &render_species(&sim.species),
            &mut prepared,
        )?;
        write_file(
            workspace.join("OUTGRID"),
            &render_outgrid(&sim.release),
            &mut prepared,
        )?;
        write_file(
            workspace.join("AGECLASSES"),
            render_ageclasses(),
            &mut prepared,
        )?;

        info!(
            files = prepared.files.len(),
            inputs = inputs_root,
            "FLEXPART control files written"
        );
        Ok(prepared)
    }

    async fn extract_static_files(
        &self,
        cfg: &RuntimeConfig,
        prepared: &mut PreparedInputs,
    ) -> Result<()> {
        for name in STATIC_FILES {
            info!("Extracting {} from {}", name, cfg.flexpart_image);
            let content = self
                .runtime
                .cat_file(&cfg.flexpart_image, &format!("/options/{name}"))
                .await?;

            let target = cfg.paths.workspace.join(name);
            fs::write(&target, content)?;
            prepared.files.push(target);
        }
        Ok(())
    }
}

fn write_file(path: PathBuf, content: &str, prepared: &mut PreparedInputs) -> Result<()> {
    fs::write(&path, content)?;
    prepared.files.push(path);
    Ok(())
}

/// Container-side meteorological input directory.
///
/// `/inputs/preprocessed` when ERA5 extraction is enabled and has produced
/// something, `/inputs` otherwise.
pub fn meteo_inputs_root(cfg: &RuntimeConfig) -> &'static str {
    if cfg.simulation.use_era5 && dir_has_entries(&cfg.paths.meteo_preprocessed_dir()) {
        "/inputs/preprocessed"
    } else {
        "/inputs"
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub fn render_pathnames(inputs_root: &str) -> String {
    format!("/options/\n/output/\n{inputs_root}/\n{inputs_root}/{AVAILABLE_FILE_NAME}\n")
}

pub fn render_command(sim: &SimulationConfig) -> String {
    let window = &sim.window;
    let numerics = &sim.numerics;
    let loutrestart = window.duration().num_seconds().max(86_400);
    format!(
        r#"&COMMAND
LDIRECT=               1,
IBDATE=         {ibdate},
IBTIME=           {ibtime},
IEDATE=         {iedate},
IETIME=           {ietime},
LOUTSTEP=           {output},
LOUTAVER=           {output},
LOUTSAMPLE=          {sampling},
LOUTRESTART=       {loutrestart},
LRECOUTSTEP=        {output},
LRECOUTAVER=        {output},
LRECOUTSAMPLE=       {sampling},
LSYNCTIME=           {sampling},
CTL=          -5.0000000,
IFINE=                 4,
IOUT=                  1,
IPOUT=                 0,
LSUBGRID=              0,
LCONVECTION=           0,
LTURBULENCE=           {turbulence},
LTURBULENCE_MESO=      0,
LAGESPECTRA=           0,
IPIN=                  0,
IOUTPUTFOREACHRELEASE= 0,
IFLUX=                 0,
MDOMAINFILL=           0,
IND_SOURCE=            1,
IND_RECEPTOR=          0,
MQUASILAG=             0,
NESTED_OUTPUT=         0,
LNETCDFOUT=            {netcdf},
LINIT_COND=            0,
SFC_ONLY=              0,
CBLFLAG=               0,
OHFIELDS_PATH= "../../flexin/",
NXSHIFT=               0,
MAXTHREADGRID=         4,
MAXFILESIZE=       10000,
LOGVERTINTERP=         0,
&END
"#,
        ibdate = window.start.format("%Y%m%d"),
        ibtime = window.start.format("%H%M%S"),
        iedate = window.end.format("%Y%m%d"),
        ietime = window.end.format("%H%M%S"),
        output = numerics.output_interval_sec,
        sampling = numerics.sampling_interval_sec,
        loutrestart = loutrestart,
        turbulence = numerics.turbulence,
        netcdf = numerics.netcdf_output,
    )
}

pub fn render_releases(sim: &SimulationConfig) -> String {
    let window = &sim.window;
    let release = &sim.release;
    // Spans past the representable range last the whole window.
    let span_ms = (release.duration_hours * 3_600_000.0).round() as i64;
    let release_end = Duration::try_milliseconds(span_ms)
        .and_then(|span| window.start.checked_add_signed(span))
        .map_or(window.end, |end| end.min(window.end));
    format!(
        r#"&RELEASES_CTRL
 NSPEC      =           1,
 SPECNUM_REL=           1,
 /
&RELEASE
 IDATE1  =       {idate1},
 ITIME1  =         {itime1},
 IDATE2  =       {idate2},
 ITIME2  =         {itime2},
 LON1    =         {lon:8.3},
 LON2    =         {lon:8.3},
 LAT1    =         {lat:8.3},
 LAT2    =         {lat:8.3},
 Z1      =         {z1:8.3},
 Z2      =         {z2:8.3},
 ZKIND   =              1,
 MASS    =       {mass},
 PARTS   =          {parts:8},
 COMMENT =    "RELEASE 1",
 /
"#,
        idate1 = window.start.format("%Y%m%d"),
        itime1 = window.start.format("%H%M%S"),
        idate2 = release_end.format("%Y%m%d"),
        itime2 = release_end.format("%H%M%S"),
        lon = release.longitude,
        lat = release.latitude,
        z1 = release.height_bottom_m,
        z2 = release.height_top_m,
        mass = format_exponent(sim.release_mass_kg, 4, 10),
        parts = sim.numerics.particles,
    )
}

pub fn render_species(species: &SpeciesDefinition) -> String {
    format!(
        "&SPECIES_PARAMS\n PSPECIES=\"{}\",\n PWEIGHTMOLAR={:.2},\n PDECAY={},\n /\n",
        species.name,
        species.molecular_weight,
        format_real(species.half_life_days.unwrap_or(NO_DECAY)),
    )
}

pub fn render_outgrid(release: &ReleaseGeometry) -> String {
    format!(
        r#"&OUTGRID
 OUTLON0=        {lon0:.1},
 OUTLAT0=        {lat0:.1},
 NUMXGRID=             60,
 NUMYGRID=             60,
 DXOUT=               0.2,
 DYOUT=               0.2,
 OUTHEIGHTS=   500.0, 1500.0, 5000.0, 50000.0,
 /
"#,
        lon0 = release.longitude - 5.0,
        lat0 = release.latitude - 5.0,
    )
}

pub fn render_ageclasses() -> &'static str {
    "&AGECLASSES\nNCLASS=                 1,\nLAGE=                   0,\n&END\n"
}

/// Shortest round-trip decimal, always with a fractional part (`6.0`, `0.25`).
pub(crate) fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Fortran-style `E` notation with a signed two-digit exponent, right-aligned
/// to `width` (`1.0000E+00`).
pub(crate) fn format_exponent(value: f64, precision: usize, width: usize) -> String {
    let raw = format!("{value:.precision$E}");
    let (mantissa, exponent) = raw.split_once('E').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let formatted = format!("{mantissa}E{sign}{:02}", exponent.abs());
    format!("{formatted:>width$}")
}
