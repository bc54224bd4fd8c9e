//! scattergrid CLI - grid scattered points into rasters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geo_types::{coord, MultiPolygon, Rect};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use scattergrid_algorithms::gridding::{
    ExecutionMode, GridAlgorithm, GridOptions, GridSize, Gridder, PointSelection, ProgressSink,
};
use scattergrid_core::io::{read_csv_points, read_geotiff, write_geotiff, CsvOptions};
use scattergrid_core::{AnyRaster, DataType};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "scattergrid")]
#[command(author, version, about = "Grid scattered points into regular rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Interpolate points from a delimited file into a GeoTIFF
    Grid(GridArgs),
}

#[derive(clap::Args)]
struct GridArgs {
    /// Input CSV file with a header row
    input: PathBuf,
    /// Output GeoTIFF file
    output: PathBuf,

    /// Algorithm and parameters, e.g. invdist:power=2:radius=10
    #[arg(short = 'a', long = "algorithm", default_value = "invdist")]
    algorithm: String,

    /// Attribute field holding the value (default: the Z column)
    #[arg(long = "zfield")]
    z_field: Option<String>,
    /// Added to every value
    #[arg(long = "z_increase", default_value = "0", allow_negative_numbers = true)]
    z_increase: f64,
    /// Multiplies every value, after z_increase
    #[arg(long = "z_multiply", default_value = "1", allow_negative_numbers = true)]
    z_multiply: f64,

    /// Layer to read (repeatable)
    #[arg(short = 'l', long = "layer")]
    layers: Vec<String>,
    /// Attribute filter
    #[arg(long = "where")]
    where_clause: Option<String>,
    /// SELECT statement replacing the layer selection
    #[arg(long = "sql")]
    sql: Option<String>,
    /// Keep only points inside xmin ymin xmax ymax
    #[arg(long = "spat", num_args = 4, value_names = ["XMIN", "YMIN", "XMAX", "YMAX"], allow_negative_numbers = true)]
    spat: Option<Vec<f64>>,
    /// Keep only points inside the rectangle xmin ymin xmax ymax
    #[arg(long = "clipsrc", num_args = 4, value_names = ["XMIN", "YMIN", "XMAX", "YMAX"], allow_negative_numbers = true)]
    clipsrc: Option<Vec<f64>>,

    /// Output X extent, minimum first
    #[arg(long = "txe", num_args = 2, value_names = ["XMIN", "XMAX"], allow_negative_numbers = true)]
    txe: Option<Vec<f64>>,
    /// Output Y extent, minimum first
    #[arg(long = "tye", num_args = 2, value_names = ["YMIN", "YMAX"], allow_negative_numbers = true)]
    tye: Option<Vec<f64>>,
    /// Output size in pixels
    #[arg(long = "outsize", num_args = 2, value_names = ["WIDTH", "HEIGHT"], conflicts_with = "tr")]
    outsize: Option<Vec<usize>>,
    /// Output resolution in georeferenced units
    #[arg(long = "tr", num_args = 2, value_names = ["XRES", "YRES"])]
    tr: Option<Vec<f64>>,
    /// Output pixel type
    #[arg(long = "ot", default_value = "Float64")]
    output_type: String,

    /// Worker threads: 1 is sequential, 0 uses every core
    #[arg(long, default_value = "1")]
    threads: usize,

    /// X column of the input file
    #[arg(long, default_value = "x")]
    x_column: String,
    /// Y column of the input file
    #[arg(long, default_value = "y")]
    y_column: String,
    /// Z column of the input file
    #[arg(long, default_value = "z")]
    z_column: String,
    /// Field delimiter of the input file
    #[arg(long, default_value = ",")]
    delimiter: char,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Row progress on an indicatif bar
struct RowProgress(ProgressBar);

impl RowProgress {
    fn new() -> Self {
        let pb = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} rows ({eta})")
        {
            pb.set_style(style);
        }
        Self(pb)
    }
}

impl ProgressSink for RowProgress {
    fn report(&self, completed_rows: usize, total_rows: usize) -> scattergrid_core::Result<()> {
        self.0.set_length(total_rows as u64);
        self.0.set_position(completed_rows as u64);
        Ok(())
    }
}

fn rect(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Rect<f64> {
    Rect::new(coord! { x: xmin, y: ymin }, coord! { x: xmax, y: ymax })
}

fn rect_arg(values: &Option<Vec<f64>>) -> Option<Rect<f64>> {
    values
        .as_deref()
        .map(|v| rect(v[0], v[1], v[2], v[3]))
}

fn selection(args: &GridArgs) -> PointSelection {
    PointSelection {
        layers: args.layers.clone(),
        sql: args.sql.clone(),
        where_clause: args.where_clause.clone(),
        z_field: args.z_field.clone(),
        z_increase: args.z_increase,
        z_multiply: args.z_multiply,
        spatial_filter: rect_arg(&args.spat),
        clip: rect_arg(&args.clipsrc).map(|r| MultiPolygon(vec![r.to_polygon()])),
    }
}

fn grid_options(args: &GridArgs) -> Result<GridOptions> {
    let algorithm: GridAlgorithm = args
        .algorithm
        .parse()
        .with_context(|| format!("Invalid algorithm \"{}\"", args.algorithm))?;
    let output_type: DataType = args
        .output_type
        .parse()
        .with_context(|| format!("Invalid output type \"{}\"", args.output_type))?;

    let extent = match (&args.txe, &args.tye) {
        (Some(x), Some(y)) => {
            if x[0] > x[1] || y[0] > y[1] {
                anyhow::bail!(
                    "--txe and --tye take the minimum first, got x {} {} and y {} {}",
                    x[0],
                    x[1],
                    y[0],
                    y[1]
                );
            }
            Some(rect(x[0], y[0], x[1], y[1]))
        }
        (None, None) => None,
        _ => anyhow::bail!("--txe and --tye must be given together"),
    };

    let size = match (&args.outsize, &args.tr) {
        (Some(s), _) => GridSize::Dimensions {
            width: s[0],
            height: s[1],
        },
        (None, Some(r)) => GridSize::Resolution { x: r[0], y: r[1] },
        (None, None) => GridSize::default(),
    };

    Ok(GridOptions {
        algorithm,
        size,
        extent,
        output_type,
        mode: ExecutionMode::from_threads(args.threads),
        ..Default::default()
    })
}

fn csv_options(args: &GridArgs) -> Result<CsvOptions> {
    if !args.delimiter.is_ascii() {
        anyhow::bail!("Delimiter must be a single ASCII character");
    }
    Ok(CsvOptions {
        x_column: args.x_column.clone(),
        y_column: args.y_column.clone(),
        z_column: Some(args.z_column.clone()),
        delimiter: args.delimiter as u8,
        layer_name: None,
    })
}

fn run_grid(args: &GridArgs, show_progress: bool) -> Result<AnyRaster> {
    let options = grid_options(args)?;
    let csv = csv_options(args)?;

    let pb = spinner("Reading points...");
    let source = read_csv_points(&args.input, &csv).context("Failed to read points")?;
    pb.finish_and_clear();

    let progress = RowProgress::new();
    let mut gridder = Gridder::new(options)?;
    if show_progress {
        gridder = gridder.with_progress(&progress);
    }
    let raster = gridder
        .run_source(&source, &selection(args))
        .context("Gridding failed")?;
    progress.0.finish_and_clear();

    let pb = spinner("Writing output...");
    write_geotiff(&raster, &args.output).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(raster)
}

fn print_info(input: &PathBuf, raster: &AnyRaster) {
    let (rows, cols) = raster.shape();
    let t = raster.transform();
    let bounds = t.bounds(cols, rows);

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, rows * cols);
    println!("Data type: {}", raster.data_type());
    println!("Pixel size: {} x {}", t.pixel_width, t.pixel_height);
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.min().x,
        bounds.min().y,
        bounds.max().x,
        bounds.max().y
    );
    let nodata = raster.nodata();
    if let Some(nodata) = nodata {
        println!("NoData: {}", nodata);
    }

    let valid: Vec<f64> = raster
        .to_f64_vec()
        .into_iter()
        .filter(|v| v.is_finite() && Some(*v) != nodata)
        .collect();
    println!("\nStatistics:");
    if !valid.is_empty() {
        let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = valid.iter().sum::<f64>() / valid.len() as f64;
        println!("  Min: {:.4}", min);
        println!("  Max: {:.4}", max);
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        valid.len(),
        100.0 * valid.len() as f64 / (rows * cols).max(1) as f64
    );
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let raster = read_geotiff(&input).context("Failed to read raster")?;
            pb.finish_and_clear();
            print_info(&input, &raster);
        }

        Commands::Grid(args) => {
            let start = Instant::now();
            let raster = run_grid(&args, true)?;
            let (rows, cols) = raster.shape();
            info!("Output: {} x {} {}", cols, rows, raster.data_type());
            println!("Grid saved to: {}", args.output.display());
            println!("  Processing time: {:.2?}", start.elapsed());
        }
    }

    Ok(())
}
