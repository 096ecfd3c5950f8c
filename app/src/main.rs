mod config;
mod error;
mod inspect;

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;

use pcd_core::{format::Layout, pointcloud::point::PointCloud};
use pcd_exporter::{
    gltf::{GlbPreview, PreviewSink as _},
    ply::PlyExporter,
};
use pcd_merger::{ExternalReconstructor, MergePipeline, ScanLayout};
use pcd_parser::parsers::{ply::PlyParserProvider, ParserProvider as _};
use pcd_transformer::FilterCriteria;

use config::StageCalibration;
use error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "scanmerge",
    about = "Merges turntable structured-light scans into a single 360 degree point cloud",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstruct missing views, filter, align and write the full model
    Merge(MergeArgs),
    /// Render a subsampled GLB preview of a PLY file
    Preview(PreviewArgs),
    /// Print point counts and bounds of PLY files
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Directory containing the position_<deg> folders
    #[arg(long, default_value = "../data/avocado_30_deg", value_name = "DIR")]
    base_dir: PathBuf,

    /// Directory for the partial clouds and the full model
    #[arg(long, default_value = "media", value_name = "DIR")]
    results_dir: PathBuf,

    #[arg(long, default_value = "../data/calibrations/camera_geometry.json")]
    camera: PathBuf,

    #[arg(long, default_value = "../data/calibrations/projector_geometry.json")]
    projector: PathBuf,

    #[arg(long, default_value = "../data/calibrations/stage_geometry.json")]
    stage: PathBuf,

    #[arg(long, default_value_t = FilterCriteria::DEFAULT_Z_MIN, allow_negative_numbers = true)]
    z_min: f64,

    #[arg(long, default_value_t = FilterCriteria::DEFAULT_Z_MAX, allow_negative_numbers = true)]
    z_max: f64,

    /// Drop points farther than this from the stage axis
    #[arg(long)]
    max_radius: Option<f64>,

    /// Reconstruction executable
    #[arg(long, default_value = "./metrology-recon", value_name = "FILE")]
    recon_bin: PathBuf,

    /// Kill a reconstruction that runs longer than this
    #[arg(long, value_name = "SECONDS")]
    recon_timeout_secs: Option<u64>,

    /// Body encoding of the full model (binary or ascii)
    #[arg(long, default_value_t = Layout::BinaryLittleEndian)]
    layout: Layout,

    /// Number of views processed concurrently
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Also write a GLB preview of the merged cloud
    #[arg(long, value_name = "FILE")]
    preview: Option<PathBuf>,

    #[arg(long, default_value_t = GlbPreview::DEFAULT_TARGET_COUNT)]
    preview_points: usize,

    /// Seed for the preview subsampling
    #[arg(long)]
    seed: Option<u64>,

    /// Write the per-view diagnostics as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// PLY files or glob patterns; several inputs are rendered together
    #[arg(required = true, num_args = 1.., value_name = "FILE")]
    input: Vec<String>,

    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    #[arg(long, default_value_t = GlbPreview::DEFAULT_TARGET_COUNT)]
    points: usize,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    title: Option<String>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(required = true, num_args = 1.., value_name = "FILE")]
    input: Vec<String>,

    /// Also count the points with z_min <= z <= z_max
    #[arg(long, requires = "z_max", allow_negative_numbers = true)]
    z_min: Option<f64>,

    #[arg(long, requires = "z_min", allow_negative_numbers = true)]
    z_max: Option<f64>,

    #[arg(long)]
    json: bool,
}

fn preview_title(total_points: usize) -> String {
    format!("Full 360° Reconstruction ({} total points)", total_points)
}

fn render_preview(
    cloud: &PointCloud,
    output: &Path,
    points: usize,
    seed: Option<u64>,
    title: &str,
) -> Result<(), AppError> {
    let preview = GlbPreview {
        target_count: points,
        seed,
    };
    let rendered = preview.render(cloud, output, title)?;
    log::info!("preview with {} points written to {:?}", rendered, output);
    Ok(())
}

fn run_merge(args: MergeArgs) -> Result<(), AppError> {
    log::info!("base directory: {:?}", args.base_dir);
    log::info!("results directory: {:?}", args.results_dir);
    log::info!("stage calibration: {:?}", args.stage);
    log::info!("z range: [{}, {}]", args.z_min, args.z_max);
    if let Some(radius) = args.max_radius {
        log::info!("max radius: {}", radius);
    }

    let stage = StageCalibration::load(&args.stage)?.geometry()?;
    let criteria = FilterCriteria::new(args.z_min, args.z_max, args.max_radius)?;

    let mut reconstructor =
        ExternalReconstructor::new(args.recon_bin, args.camera, args.projector);
    if let Some(secs) = args.recon_timeout_secs {
        reconstructor = reconstructor.with_timeout(Duration::from_secs(secs));
    }

    let exporter = PlyExporter::new(args.layout)
        .with_comment(format!("merged by scanmerge {}", env!("CARGO_PKG_VERSION")))
        .with_comment(format!(
            "stage pivot {:?} axis {:?}",
            stage.pivot(),
            stage.axis()
        ));

    let mut pipeline = MergePipeline::new(
        ScanLayout::new(args.base_dir, args.results_dir),
        stage,
        criteria,
        reconstructor,
    )
    .with_exporter(exporter);
    if let Some(jobs) = args.jobs {
        pipeline = pipeline.with_jobs(jobs);
    }

    let output = pipeline.run()?;

    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&output.report)?)?;
        log::info!("report written to {:?}", path);
    }

    if let Some(path) = &args.preview {
        if output.cloud.is_empty() {
            log::warn!("nothing to preview; {:?} not written", path);
        } else {
            let title = preview_title(output.report.total_points);
            render_preview(&output.cloud, path, args.preview_points, args.seed, &title)?;
        }
    }

    Ok(())
}

fn run_preview(args: PreviewArgs) -> Result<(), AppError> {
    let start = std::time::Instant::now();
    let filenames = inspect::expand_globs(&args.input)?;
    log::info!("input files: {:?}", filenames);

    let provider = PlyParserProvider { filenames };
    let cloud = provider.get_parser().parse()?;
    log::info!("loaded {} points in {:?}", cloud.len(), start.elapsed());

    let title = args.title.unwrap_or_else(|| preview_title(cloud.len()));
    render_preview(&cloud, &args.output, args.points, args.seed, &title)
}

fn run_inspect(args: InspectArgs) -> Result<(), AppError> {
    let paths = inspect::expand_globs(&args.input)?;
    log::debug!("expanded input files: {:?}", paths);

    let z_range = args.z_min.zip(args.z_max).map(|(lo, hi)| [lo, hi]);
    let report = inspect::inspect(&paths, z_range)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(out, "{}", inspect::render_text(&report))?;
    }
    Ok(())
}

fn run(command: Command) -> Result<(), AppError> {
    match command {
        Command::Merge(args) => run_merge(args),
        Command::Preview(args) => run_preview(args),
        Command::Inspect(args) => run_inspect(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .init();

    let start = std::time::Instant::now();
    match run(cli.command) {
        Ok(()) => {
            log::info!("Elapsed: {:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;
    use pcd_parser::parsers::ply::read_ply;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn merge_defaults_follow_the_scan_session_layout() {
        let cli = Cli::try_parse_from(["scanmerge", "merge"]).unwrap();
        let Command::Merge(args) = cli.command else {
            panic!("expected merge");
        };

        assert_eq!(args.base_dir, PathBuf::from("../data/avocado_30_deg"));
        assert_eq!(args.results_dir, PathBuf::from("media"));
        assert_eq!(args.recon_bin, PathBuf::from("./metrology-recon"));
        assert_eq!((args.z_min, args.z_max), (810.0, 890.0));
        assert_eq!(args.layout, Layout::BinaryLittleEndian);
        assert_eq!(args.preview_points, 100_000);
        assert!(args.max_radius.is_none());
    }

    #[test]
    fn merge_options_parse() {
        let cli = Cli::try_parse_from([
            "scanmerge",
            "-v",
            "merge",
            "--layout",
            "ascii",
            "--z-min",
            "-5",
            "--max-radius",
            "60",
            "--jobs",
            "1",
            "--recon-timeout-secs",
            "600",
        ])
        .unwrap();
        assert!(cli.verbose);

        let Command::Merge(args) = cli.command else {
            panic!("expected merge");
        };
        assert_eq!(args.layout, Layout::Ascii);
        assert_eq!(args.z_min, -5.0);
        assert_eq!(args.max_radius, Some(60.0));
        assert_eq!(args.jobs, Some(1));
        assert_eq!(args.recon_timeout_secs, Some(600));
    }

    #[test]
    fn unknown_layout_is_rejected() {
        assert!(Cli::try_parse_from(["scanmerge", "merge", "--layout", "pcd"]).is_err());
    }

    #[test]
    fn inspect_requires_both_z_bounds() {
        assert!(Cli::try_parse_from(["scanmerge", "inspect", "a.ply", "--z-min", "810"]).is_err());
        assert!(Cli::try_parse_from([
            "scanmerge",
            "inspect",
            "a.ply",
            "--z-min",
            "810",
            "--z-max",
            "890"
        ])
        .is_ok());
    }

    #[test]
    fn preview_title_counts_points() {
        assert_eq!(
            preview_title(1234),
            "Full 360° Reconstruction (1234 total points)"
        );
    }

    #[test]
    fn merge_reuses_partials_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("media");
        fs::create_dir_all(&results).unwrap();
        for angle in ScanLayout::view_angles() {
            fs::write(
                results.join(format!("partial_{angle}.ply")),
                "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\n\
                 property float y\nproperty float z\nend_header\n1 0 850\n0 0 2000\n",
            )
            .unwrap();
        }
        let stage = dir.path().join("stage.json");
        fs::write(&stage, r#"{"p": [0, 0, 850], "dir": [0, 1, 0]}"#).unwrap();

        let report = dir.path().join("report.json");
        let preview = dir.path().join("preview.glb");
        let argv: Vec<std::ffi::OsString> = vec![
            "scanmerge".into(),
            "merge".into(),
            "--results-dir".into(),
            results.clone().into_os_string(),
            "--stage".into(),
            stage.into_os_string(),
            "--recon-bin".into(),
            dir.path().join("missing-recon").into_os_string(),
            "--report".into(),
            report.clone().into_os_string(),
            "--preview".into(),
            preview.clone().into_os_string(),
            "--seed".into(),
            "3".into(),
        ];
        let cli = Cli::try_parse_from(argv).unwrap();

        run(cli.command).unwrap();

        let model = read_ply(results.join("full_model.ply")).unwrap();
        assert_eq!(model.cloud.len(), 12);
        assert_eq!(model.header.comments.len(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(json["total_points"], 12);
        assert!(json["model_path"].is_string());
        assert_eq!(json["views"][0]["source"], "reused");
        assert_eq!(json["views"][0]["filter"]["removed_z_range"], 1);
        assert!(preview.is_file());
    }

    #[test]
    fn preview_renders_every_matched_file() {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [("partial_0.ply", "1 2 850\n"), ("partial_30.ply", "3 4 860\n")] {
            fs::write(
                dir.path().join(name),
                format!(
                    "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\n\
                     property float y\nproperty float z\nend_header\n{body}"
                ),
            )
            .unwrap();
        }
        let output = dir.path().join("views.glb");
        let pattern = dir.path().join("partial_*.ply").display().to_string();

        run(Command::Preview(PreviewArgs {
            input: vec![pattern],
            output: output.clone(),
            points: 10,
            seed: Some(1),
            title: None,
        }))
        .unwrap();

        let glb = fs::read(&output).unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        let text = String::from_utf8_lossy(&glb);
        assert!(text.contains("Full 360° Reconstruction (2 total points)"));
    }
}
