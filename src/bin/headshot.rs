//! CLI binary for headshot-pipeline.
//!
//! Walks the upload → style → generate wizard non-interactively: CLI flags
//! become wizard actions, the pipeline does the work, results are printed
//! or saved.

use anyhow::{Context, Result};
use clap::Parser;
use headshot_pipeline::{
    accept_path, download, find_style, generate, ConversionFormat, DownloadProgressCallback,
    GenerationService, HeadshotError, HttpGenerationService, ImageSlot, Normalizer,
    PipelineConfig, ProgressCallback, WizardAction, WizardState, HEADSHOT_STYLES,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// saved or failed file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the item currently being fetched.
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} images  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::hidden();
        bar.set_style(style);
        bar.set_prefix("Downloading");

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self) -> String {
        let ms = self
            .started
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl DownloadProgressCallback for CliProgressCallback {
    fn on_download_start(&self, total: usize) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Downloading {total} images…"))
        ));
    }

    fn on_item_start(&self, position: usize, _total: usize) {
        *self.started.lock().unwrap() = Some(Instant::now());
        self.bar.set_message(format!("image {position}"));
    }

    fn on_item_complete(&self, position: usize, total: usize, path: &Path, bytes: usize) {
        self.bar.println(format!(
            "  {} Image {:>2}/{:<2}  {}  {}  {}",
            green("✓"),
            position,
            total,
            path.display(),
            dim(&format!("{:>7} bytes", bytes)),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, position: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Image {:>2}/{:<2}  {}  {}",
            red("✗"),
            position,
            total,
            red(&msg),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_throttle(&self, delay: Duration) {
        self.bar
            .set_message(format!("waiting {}ms", delay.as_millis()));
    }

    fn on_download_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images downloaded",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images downloaded  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Four professional headshots, all saved to the current directory
  headshot me.jpg

  # Eight casual variations with extra instructions
  headshot me.heic --style casual -n 8 --prompt "navy sweater, outdoors"

  # Keep only images 1 and 3 of the batch
  headshot me.png --select 1,3 -o ./headshots

  # Generate only, print the batch as JSON
  headshot me.png --no-download --json

  # Show the available styles
  headshot --list-styles

ENVIRONMENT VARIABLES:
  HEADSHOT_SERVICE_URL   Base URL of the generation/storage service
  HEADSHOT_PROJECT_ID    Project id on that service
  HEADSHOT_API_KEY       Bearer token (optional)
  RUST_LOG               Override log filtering (e.g. headshot_pipeline=debug)

LIMITS:
  Uploads must be JPEG, PNG, WebP, HEIC or HEIF and smaller than 10 MB.
  HEIC/HEIF photos are converted before upload (build with --features heic).
  A batch holds 1 to 12 images; downloads are spaced 500 ms apart.
"#;

/// Generate professional headshots from a single portrait photo.
#[derive(Parser, Debug)]
#[command(
    name = "headshot",
    version,
    about = "Generate professional AI headshots from one portrait photo",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Portrait photo (JPEG, PNG, WebP, HEIC, HEIF).
    #[arg(required_unless_present = "list_styles")]
    input: Option<PathBuf>,

    /// Headshot style.
    #[arg(short, long, env = "HEADSHOT_STYLE", value_enum, default_value = "professional")]
    style: StyleArg,

    /// Extra instructions appended to the style prompt.
    #[arg(short, long, env = "HEADSHOT_PROMPT", default_value = "")]
    prompt: String,

    /// Number of images to generate (clamped to 1–12).
    #[arg(short = 'n', long, env = "HEADSHOT_COUNT", default_value_t = 4)]
    count: i64,

    /// Directory downloaded images are written to.
    #[arg(short, long, env = "HEADSHOT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Output image size, WIDTHxHEIGHT.
    #[arg(long, env = "HEADSHOT_SIZE", default_value = "1024x1024")]
    size: String,

    /// Format HEIC/HEIF photos are converted to.
    #[arg(long, env = "HEADSHOT_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// Generation service base URL.
    #[arg(long, env = "HEADSHOT_SERVICE_URL")]
    service_url: Option<String>,

    /// Project id on the generation service.
    #[arg(long, env = "HEADSHOT_PROJECT_ID")]
    project: Option<String>,

    /// Bearer token for the generation service.
    #[arg(long, env = "HEADSHOT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Pause between two downloads, in milliseconds.
    #[arg(long, env = "HEADSHOT_THROTTLE_MS", default_value_t = 500)]
    throttle_ms: u64,

    /// Download only these images (1-based, comma separated).
    #[arg(long, value_delimiter = ',')]
    select: Vec<usize>,

    /// Generate only; skip downloading.
    #[arg(long)]
    no_download: bool,

    /// Print the batch (and download report) as JSON.
    #[arg(long)]
    json: bool,

    /// List available styles and exit.
    #[arg(long)]
    list_styles: bool,

    /// Disable progress bar.
    #[arg(long, env = "HEADSHOT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HEADSHOT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HEADSHOT_QUIET")]
    quiet: bool,

    /// Per-image download timeout in seconds.
    #[arg(long, env = "HEADSHOT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Generation call timeout in seconds.
    #[arg(long, env = "HEADSHOT_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StyleArg {
    Professional,
    Casual,
    Creative,
}

impl StyleArg {
    fn id(self) -> &'static str {
        match self {
            StyleArg::Professional => "professional",
            StyleArg::Casual => "casual",
            StyleArg::Creative => "creative",
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for ConversionFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ConversionFormat::Png,
            FormatArg::Jpeg => ConversionFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_styles {
        for style in &HEADSHOT_STYLES {
            println!(
                "{} {:<13} {}",
                style.preview,
                bold(style.id),
                dim(style.description)
            );
        }
        return Ok(());
    }

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and service ─────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn DownloadProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let service = build_service(&cli)?;

    // ── Step 1: Upload ───────────────────────────────────────────────────
    let input = cli
        .input
        .as_ref()
        .context("An input photo is required")?;
    let image = accept_path(input, &Normalizer::new(&config), &config)
        .await
        .with_context(|| format!("Could not use {}", input.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} {}  {}",
            green("✓"),
            bold(&image.file.name),
            dim(&format!("{} bytes", image.file.len()))
        );
    }

    let style = find_style(cli.style.id())
        .with_context(|| format!("Unknown style '{}'", cli.style.id()))?;

    let mut state = WizardState::new()
        .reduce(WizardAction::SetImage(ImageSlot::Present(Arc::new(image))))
        .reduce(WizardAction::Next)
        // ── Step 2: Style ────────────────────────────────────────────────
        .reduce(WizardAction::SelectStyle(style))
        .reduce(WizardAction::SetCustomPrompt(cli.prompt.clone()))
        .reduce(WizardAction::SetQuantity(cli.count))
        .reduce(WizardAction::Next);

    // ── Step 3: Generate ─────────────────────────────────────────────────
    let request = state
        .generation_request(&config.output_size)
        .context("Wizard is incomplete")?;

    state = state.reduce(WizardAction::BeginGeneration);
    let ticket = state
        .in_flight()
        .context("Generation did not start")?;

    let spinner = (!cli.quiet && !cli.json).then(|| {
        let sp = ProgressBar::new_spinner();
        sp.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        sp.set_prefix("Generating");
        sp.set_message(format!("{} {} headshots…", request.count, request.style));
        sp.enable_steady_tick(Duration::from_millis(80));
        sp
    });

    let outcome = generate(service.as_ref(), &request, &config).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let batch = match outcome {
        Ok(batch) => {
            state = state.reduce(WizardAction::FinishGeneration {
                ticket,
                artifacts: batch.artifacts.clone(),
            });
            batch
        }
        Err(e) => {
            let state = state.reduce(WizardAction::FailGeneration { ticket });
            tracing::debug!("Generation failed on step {:?}", state.current_step());
            return Err(e).context("Generation failed");
        }
    };

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {}/{} headshots in {}ms",
            green("✔"),
            bold(&batch.len().to_string()),
            batch.requested,
            batch.duration_ms
        );
        for (i, artifact) in batch.artifacts.iter().enumerate() {
            eprintln!("  {:>2}. {}", i + 1, dim(&artifact.url));
        }
    }

    if cli.no_download {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&batch).context("Failed to serialise batch")?
            );
        }
        return Ok(());
    }

    // ── Selection + download ─────────────────────────────────────────────
    state = select(state, &cli.select)?;
    let selection = state.download_selection();

    let report = match download(state.batch(), &selection, &config).await {
        Ok(report) => report,
        Err(HeadshotError::DownloadFailed {
            saved,
            failed,
            total,
            errors,
        }) => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&errors).context("Failed to serialise errors")?
                );
            }
            anyhow::bail!("{failed}/{total} downloads failed ({saved} saved)");
        }
        Err(e) => return Err(e).context("Download failed"),
    };

    if cli.json {
        let out = serde_json::json!({ "batch": batch, "download": report });
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("Failed to serialise output")?
        );
    } else if !cli.quiet && !show_progress {
        eprintln!(
            "Downloaded {} images in {}ms",
            report.files.len(),
            report.duration_ms
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .conversion_format(cli.format.into())
        .output_size(cli.size.clone())
        .throttle_ms(cli.throttle_ms)
        .download_dir(cli.output_dir.clone())
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_service(cli: &Cli) -> Result<Box<dyn GenerationService>> {
    let service = match cli.service_url {
        Some(ref url) => {
            let project = cli
                .project
                .clone()
                .context("--project (or HEADSHOT_PROJECT_ID) is required with --service-url")?;
            HttpGenerationService::new(url.clone(), project, cli.api_key.clone(), cli.api_timeout)?
        }
        None => HttpGenerationService::from_env(cli.api_timeout)?,
    };
    Ok(Box::new(service))
}

/// Apply `--select` to the wizard: explicit 1-based positions, or everything.
fn select(mut state: WizardState, positions: &[usize]) -> Result<WizardState> {
    if positions.is_empty() {
        return Ok(state.reduce(WizardAction::ToggleSelectAll));
    }

    let len = state.batch().len();
    for &p in positions {
        if p < 1 || p > len {
            anyhow::bail!("--select {p} is out of range (batch has {len} images)");
        }
        let id = state.batch()[p - 1].id.clone();
        if !state.is_selected(&id) {
            state = state.reduce(WizardAction::ToggleSelection(id));
        }
    }
    Ok(state)
}
