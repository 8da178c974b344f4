// THEORY:
// Command-line front end for the analyzer. `analyze` runs one image through a
// session, `batch` walks a directory, and `demo` renders synthetic plates with
// known cell intensities and runs every locator, every brightness method and a
// batch over them, so the pipeline can be checked end to end without real data.
// Every subcommand can also write the outline/colormap figure.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use cell_brightness::batch::{
    self, BatchConfig, BatchReport, FailurePolicy, ImageAnalysis, LocatorPolicy,
    write_combined_results, write_image_results,
};
use cell_brightness::parallel_batch::process_directory_parallel;
use cell_brightness::synthetic::{SampleCell, sample_image};
use cell_brightness::{
    AnalysisSession, BrightnessMethod, DetectionConfig, ExportFormat, GridLayout, RegionUpdate,
    ResultRecord, SampleSpec, SessionConfig, SummaryStatistics, ThresholdMethod,
};
use cell_brightness_visualizer::{Colormap, RenderOptions, render_overlay, save_overlay};
use clap::{Args, Parser, Subcommand};
use flexi_logger::Logger;
use log::info;

#[derive(Parser)]
#[command(name = "cell_tester")]
#[command(version, about = "Measure cell brightness in grayscale photoluminescence images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single image
    Analyze {
        /// Input image
        #[arg(value_name = "IMAGE")]
        input: PathBuf,

        /// Detect cells automatically
        #[arg(long, conflicts_with = "grid")]
        auto: bool,

        #[command(flatten)]
        locator: LocatorArgs,

        /// Hand-placed cell (x,y,width,height); may be repeated
        #[arg(long = "manual", value_name = "X,Y,W,H", value_parser = parse_rect)]
        manual: Vec<[u32; 4]>,

        /// Brightness method (mean, median, max, percentile)
        #[arg(short, long, default_value = "mean")]
        method: BrightnessMethod,

        /// Results file
        #[arg(short, long, value_name = "FILE", default_value = "cell_brightness_results.csv")]
        out: PathBuf,

        /// Export format (csv or json); guessed from the extension when omitted
        #[arg(long, value_name = "FORMAT")]
        format: Option<ExportFormat>,

        /// Write the outline/colormap figure to this PNG
        #[arg(long, value_name = "FILE")]
        render: Option<PathBuf>,

        #[command(flatten)]
        style: RenderArgs,
    },

    /// Analyze every image of a directory
    Batch {
        /// Input directory
        #[arg(value_name = "DIR")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, value_name = "DIR", default_value = "batch_results")]
        out: PathBuf,

        #[command(flatten)]
        locator: LocatorArgs,

        /// Brightness method (mean, median, max, percentile)
        #[arg(short, long, default_value = "mean")]
        method: BrightnessMethod,

        /// JSON batch configuration; replaces the locator and method flags
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Report failing images and keep going
        #[arg(long)]
        skip_failures: bool,

        /// Number of parallel workers
        #[arg(short = 'j', long, value_name = "N")]
        jobs: Option<usize>,

        /// Write `<stem>_overlay.png` next to each result table
        #[arg(long)]
        render: bool,

        #[command(flatten)]
        style: RenderArgs,
    },

    /// Render synthetic plates and run every locator, method and a batch over them
    Demo {
        /// Output directory
        #[arg(short, long, value_name = "DIR", default_value = "demo_output")]
        out: PathBuf,

        #[arg(long, default_value_t = 3)]
        rows: u32,

        #[arg(long, default_value_t = 4)]
        cols: u32,

        /// Random seed
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

#[derive(Args)]
struct LocatorArgs {
    /// Split the image into a rows x cols grid (e.g. 3x4)
    #[arg(long, value_name = "RxC", value_parser = parse_grid)]
    grid: Option<(u32, u32)>,

    /// Grid margin in pixels
    #[arg(long, default_value_t = 0)]
    margin: u32,

    /// Grid spacing in pixels
    #[arg(long, default_value_t = 0)]
    spacing: u32,

    /// Minimum contour area for automatic detection
    #[arg(long, value_name = "PIXELS", default_value_t = 100.0)]
    min_area: f64,

    /// Threshold method for automatic detection (otsu, adaptive, manual)
    #[arg(long, default_value = "otsu")]
    threshold: ThresholdMethod,
}

impl LocatorArgs {
    fn layout(&self) -> Option<GridLayout> {
        self.grid.map(|(rows, cols)| {
            GridLayout::new(rows, cols)
                .with_margin(self.margin)
                .with_spacing(self.spacing)
        })
    }

    fn detection(&self) -> DetectionConfig {
        DetectionConfig {
            min_area: self.min_area,
            threshold: self.threshold,
        }
    }

    fn policy(&self) -> LocatorPolicy {
        match self.layout() {
            Some(layout) => LocatorPolicy::Grid(layout),
            None => LocatorPolicy::Automatic(self.detection()),
        }
    }
}

#[derive(Args)]
struct RenderArgs {
    /// Colormap of the figure (viridis, plasma, cool, heat)
    #[arg(long, default_value = "viridis")]
    colormap: Colormap,

    /// Leave brightness values and ids off the figure
    #[arg(long)]
    hide_values: bool,
}

impl RenderArgs {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            colormap: self.colormap,
            show_values: !self.hide_values,
            ..RenderOptions::default()
        }
    }
}

fn parse_grid(value: &str) -> std::result::Result<(u32, u32), String> {
    let (rows, cols) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected ROWSxCOLS, got `{value}`"))?;
    let rows = rows.trim().parse().map_err(|e| format!("rows: {e}"))?;
    let cols = cols.trim().parse().map_err(|e| format!("cols: {e}"))?;
    Ok((rows, cols))
}

fn parse_rect(value: &str) -> std::result::Result<[u32; 4], String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u32>().map_err(|e| format!("`{part}`: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    parts
        .try_into()
        .map_err(|parts: Vec<u32>| format!("expected X,Y,W,H, got {} values", parts.len()))
}

fn main() -> Result<()> {
    let _logger = Logger::try_with_env_or_str("info")?.start()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            auto,
            locator,
            manual,
            method,
            out,
            format,
            render,
            style,
        } => {
            let render = render.map(|path| (path, style.options()));
            analyze(&input, auto, &locator, &manual, method, &out, format, render)
        }
        Commands::Batch {
            input,
            out,
            locator,
            method,
            config,
            skip_failures,
            jobs,
            render,
            style,
        } => {
            let mut config = match config {
                Some(path) => BatchConfig::from_json_file(&path)
                    .with_context(|| format!("reading batch config {}", path.display()))?,
                None => BatchConfig {
                    locator: locator.policy(),
                    method,
                    ..BatchConfig::default()
                },
            };
            if skip_failures {
                config.failure_policy = FailurePolicy::Skip;
            }
            let render = render.then(|| style.options());
            run_batch(&input, &out, &config, jobs, render.as_ref()).map(|_| ())
        }
        Commands::Demo {
            out,
            rows,
            cols,
            seed,
        } => demo(&out, rows, cols, seed),
    }
}

#[allow(clippy::too_many_arguments)]
fn analyze(
    input: &Path,
    auto: bool,
    locator: &LocatorArgs,
    manual: &[[u32; 4]],
    method: BrightnessMethod,
    out: &Path,
    format: Option<ExportFormat>,
    render: Option<(PathBuf, RenderOptions)>,
) -> Result<()> {
    // --- 1. Load ---
    let mut session = open_session(input)?;

    // --- 2. Locate ---
    if auto {
        let cells = session.detect_cells(&locator.detection(), RegionUpdate::Replace)?;
        info!("detected {} cells", cells.len());
    } else if let Some(layout) = locator.layout() {
        session.add_grid_cells(&layout, RegionUpdate::Replace)?;
    } else if manual.is_empty() {
        bail!("no cells to analyze; pass --auto, --grid RxC or --manual X,Y,W,H");
    }
    for &[x, y, width, height] in manual {
        session.add_manual_cell(x, y, width, height, None)?;
    }

    // --- 3. Measure ---
    session.analyze_all(method)?;
    print_results(session.results());
    print_statistics(&session.statistics()?);

    // --- 4. Export ---
    let format = match format {
        Some(format) => format,
        None => ExportFormat::from_path(out)?,
    };
    session.save_results(out, format)?;
    println!("results saved to {}", out.display());

    if let Some((path, options)) = render {
        let figure = render_overlay(session.grid()?, session.regions(), &options)?;
        save_overlay(&figure, &path)?;
        println!("figure saved to {}", path.display());
    }
    Ok(())
}

fn run_batch(
    input: &Path,
    out: &Path,
    config: &BatchConfig,
    jobs: Option<usize>,
    render: Option<&RenderOptions>,
) -> Result<BatchReport> {
    batch::ensure_output_dir(out)?;

    let write_outputs = |analysis: &ImageAnalysis| -> cell_brightness::Result<()> {
        let table = write_image_results(out, analysis)?;
        info!("{}: {} cells -> {}", analysis.image_name, analysis.records.len(), table.display());
        if let Some(options) = render {
            let figure = render_overlay(&analysis.grid, &analysis.regions, options)?;
            save_overlay(&figure, out.join(format!("{}_overlay.png", analysis.stem())))?;
        }
        Ok(())
    };

    let report = match jobs {
        Some(workers) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting worker runtime")?;
            runtime.block_on(process_directory_parallel(input, config, workers, write_outputs))?
        }
        None => batch::process_directory(input, config, write_outputs)?,
    };

    for failure in &report.failures {
        eprintln!("skipped {}: {}", failure.path.display(), failure.error);
    }
    if report.records.is_empty() {
        bail!("no cells were measured in {}", input.display());
    }
    let combined = write_combined_results(out, &report)?;
    println!(
        "{} images, {} cells; combined results in {}",
        report.images_processed,
        report.records.len(),
        combined.display()
    );
    print_per_image(&report.records)?;
    print_statistics(&SummaryStatistics::from_records(&report.records)?);
    Ok(report)
}

fn open_session(path: &Path) -> Result<AnalysisSession> {
    let mut session = AnalysisSession::new(SessionConfig::default());
    session
        .load_image(path)
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(session)
}

/// The grid that lines up exactly with the cells of a synthetic plate.
fn sample_layout(spec: &SampleSpec) -> GridLayout {
    GridLayout::new(spec.rows, spec.cols)
        .with_margin(spec.spacing)
        .with_spacing(spec.spacing)
}

fn demo(out: &Path, rows: u32, cols: u32, seed: u64) -> Result<()> {
    batch::ensure_output_dir(out)?;
    let spec = SampleSpec {
        rows,
        cols,
        seed,
        ..SampleSpec::default()
    };

    let (grid, truth) = sample_image(&spec)?;
    let image_path = out.join("sample_cells.png");
    grid.save(&image_path)?;
    println!("sample image saved to {}", image_path.display());

    demo_automatic(out, &image_path, &truth)?;
    demo_grid(out, &image_path, &spec)?;
    demo_manual(out, &image_path, &spec)?;
    demo_method_comparison(&image_path, &spec)?;
    demo_batch(out, &spec)?;
    println!("\ndemo outputs written to {}", out.display());
    Ok(())
}

fn banner(title: &str) {
    println!("\n{}\n{title}\n{}", "=".repeat(60), "=".repeat(60));
}

/// Measures with the mean, prints, then writes `<name>_results.csv` and `<name>_overlay.png`.
fn finish_demo_pass(session: &mut AnalysisSession, out: &Path, name: &str, colormap: Colormap) -> Result<()> {
    session.analyze_all(BrightnessMethod::Mean)?;
    print_results(session.results());
    print_statistics(&session.statistics()?);

    session.save_results(out.join(format!("{name}_results.csv")), ExportFormat::Csv)?;
    let options = RenderOptions {
        colormap,
        ..RenderOptions::default()
    };
    let figure = render_overlay(session.grid()?, session.regions(), &options)?;
    save_overlay(&figure, out.join(format!("{name}_overlay.png")))?;
    Ok(())
}

fn demo_automatic(out: &Path, image_path: &Path, truth: &[SampleCell]) -> Result<()> {
    banner("DEMO 1: automatic cell detection");
    let mut session = open_session(image_path)?;
    let detection = DetectionConfig {
        min_area: 500.0,
        ..DetectionConfig::default()
    };
    let detected = session.detect_cells(&detection, RegionUpdate::Replace)?.len();
    println!("detected {detected} of {} cells", truth.len());
    if detected == 0 {
        bail!("no cells detected on the sample image");
    }
    finish_demo_pass(&mut session, out, "auto", Colormap::Plasma)?;

    for record in session.results() {
        let nearest = truth
            .iter()
            .min_by_key(|cell| cell.x.abs_diff(record.x) + cell.y.abs_diff(record.y));
        if let Some(cell) = nearest {
            println!(
                "{:<10} measured {:>8.3}  true {:>8.3}",
                record.cell_id, record.brightness, cell.true_brightness
            );
        }
    }
    Ok(())
}

fn demo_grid(out: &Path, image_path: &Path, spec: &SampleSpec) -> Result<()> {
    banner("DEMO 2: grid cells");
    let mut session = open_session(image_path)?;
    let cells = session
        .add_grid_cells(&sample_layout(spec), RegionUpdate::Replace)?
        .len();
    println!("added {cells} cells in a {}x{} grid", spec.rows, spec.cols);
    finish_demo_pass(&mut session, out, "grid", Colormap::Viridis)
}

fn demo_manual(out: &Path, image_path: &Path, spec: &SampleSpec) -> Result<()> {
    banner("DEMO 3: hand-placed cells");
    let mut session = open_session(image_path)?;
    for col in 0..spec.cols {
        let x = spec.spacing + col * (spec.cell_size + spec.spacing);
        session.add_manual_cell(
            x,
            spec.spacing,
            spec.cell_size,
            spec.cell_size,
            Some(format!("row1_col{}", col + 1)),
        )?;
    }
    println!("placed {} cells along the first row", spec.cols);
    finish_demo_pass(&mut session, out, "manual", Colormap::Cool)
}

/// Brightness of every grid cell under every method, one row per cell in
/// `BrightnessMethod::ALL` column order.
fn compare_methods(session: &mut AnalysisSession) -> Result<Vec<(String, Vec<f64>)>> {
    let mut rows: Vec<(String, Vec<f64>)> = Vec::new();
    for method in BrightnessMethod::ALL {
        let results = session.analyze_all(method)?;
        if rows.is_empty() {
            rows = results.iter().map(|r| (r.cell_id.clone(), Vec::new())).collect();
        }
        for (row, record) in rows.iter_mut().zip(results) {
            row.1.push(record.brightness);
        }
    }
    Ok(rows)
}

fn demo_method_comparison(image_path: &Path, spec: &SampleSpec) -> Result<()> {
    banner("DEMO 4: brightness methods compared");
    let mut session = open_session(image_path)?;
    session.add_grid_cells(&sample_layout(spec), RegionUpdate::Replace)?;

    print!("{:<14}", "cell_id");
    for method in BrightnessMethod::ALL {
        print!(" {:>10}", method.as_str());
    }
    println!();
    for (cell_id, values) in compare_methods(&mut session)? {
        print!("{cell_id:<14}");
        for value in values {
            print!(" {value:>10.2}");
        }
        println!();
    }
    Ok(())
}

fn demo_batch(out: &Path, spec: &SampleSpec) -> Result<()> {
    banner("DEMO 5: batch over several plates");
    let images = out.join("sample_images");
    batch::ensure_output_dir(&images)?;
    for i in 0..5u32 {
        let plate = SampleSpec {
            noise_std: (0.05 + f64::from(i) * 0.02) * 255.0,
            seed: spec.seed + u64::from(i) + 1,
            ..spec.clone()
        };
        let (grid, _) = sample_image(&plate)?;
        let path = images.join(format!("plate_{}.png", i + 1));
        grid.save(&path)?;
        println!("created {}", path.display());
    }

    let config = BatchConfig {
        locator: LocatorPolicy::Grid(sample_layout(spec)),
        ..BatchConfig::default()
    };
    run_batch(&images, &out.join("batch_results"), &config, None, None)?;
    Ok(())
}

fn print_results(records: &[ResultRecord]) {
    for record in records {
        println!(
            "{:<14} ({:>5}, {:>5}) {:>5}x{:<5} {:>9.3}",
            record.cell_id, record.x, record.y, record.width, record.height, record.brightness
        );
    }
}

/// Mean, std, min and max per source image, in batch order.
fn print_per_image(records: &[ResultRecord]) -> Result<()> {
    println!("{:<24} {:>9} {:>9} {:>9} {:>9}", "image_name", "mean", "std", "min", "max");
    for group in records.chunk_by(|a, b| a.image_name == b.image_name) {
        let name = group[0].image_name.as_deref().unwrap_or("-");
        let stats = SummaryStatistics::from_records(group)?;
        println!(
            "{name:<24} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
            stats.mean, stats.std, stats.min, stats.max
        );
    }
    Ok(())
}

fn print_statistics(stats: &SummaryStatistics) {
    println!("--- brightness statistics ---");
    println!("{stats}");
}
