use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc_decoder::LopdfDecoder;
use secrecy::SecretString;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use viewer_core::{
    CallerIdentity, DocumentRef, DocumentViewer, HostContext, HttpKeyGate, PageView, Rotation,
    ViewerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "secure-viewer")]
#[command(about = "Key-gated document viewer")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Unlock a document and render the pages around `--page` to PNG files.
    View(ViewArgs),
    /// Print the resolved configuration as TOML.
    Config {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// Document identifier on the content service.
    #[arg(long, value_name = "ID")]
    document: String,
    #[arg(long, env = "SECURE_VIEWER_KEY", hide_env_values = true)]
    key: String,
    /// Session token forwarded as a bearer credential.
    #[arg(long, env = "SECURE_VIEWER_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long, default_value = "document.pdf")]
    file_name: String,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    scale: Option<f32>,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rotation: i32,
    #[arg(long)]
    radius: Option<u32>,
    /// Display name used in the watermark.
    #[arg(long, default_value = "")]
    user: String,
    #[arg(long, value_name = "DIR")]
    output: PathBuf,
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ViewSummary {
    document_id: String,
    page_count: u32,
    current_page: u32,
    window: [u32; 2],
    scale: f32,
    rotation: u32,
    can_download: bool,
    pages: Vec<PageOutput>,
    failed: Vec<FailedPage>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    file: String,
    width: u32,
    height: u32,
    watermark: Option<String>,
}

#[derive(Debug, Serialize)]
struct FailedPage {
    page: u32,
    error: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::View(args) => run_view(args),
        Commands::Config { config } => run_config(config.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_config(path: Option<&Path>) -> Result<()> {
    let config = ViewerConfig::load(path).context("failed to load configuration")?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn resolve_config(args: &ViewArgs) -> Result<ViewerConfig> {
    let mut config = ViewerConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(endpoint) = &args.endpoint {
        config = config.with_endpoint(endpoint.clone());
    }
    if let Some(radius) = args.radius {
        config = config.with_window_radius(radius);
    }
    if let Some(scale) = args.scale {
        config = config.with_default_scale(scale);
    }
    config.validate().context("invalid command-line overrides")?;
    Ok(config)
}

fn run_view(args: ViewArgs) -> Result<()> {
    if args.page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    let rotation = Rotation::from_degrees(args.rotation).with_context(|| {
        format!("--rotation must be a multiple of 90 degrees, got {}", args.rotation)
    })?;
    let config = resolve_config(&args)?;

    fs::create_dir_all(&args.output).with_context(|| {
        format!("failed to create output directory {}", args.output.display())
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let summary = runtime.block_on(view_document(&args, config, rotation))?;

    let json = serde_json::to_string_pretty(&summary)?;
    println!("{json}");
    Ok(())
}

async fn view_document(
    args: &ViewArgs,
    config: ViewerConfig,
    rotation: Rotation,
) -> Result<ViewSummary> {
    let mut gate = HttpKeyGate::new(&config.key_gate).context("failed to build key gate")?;
    if let Some(token) = &args.token {
        gate = gate.with_session_token(SecretString::from(token.clone()));
    }

    let identity = CallerIdentity::new(args.user.clone(), args.user.clone());
    let mut viewer =
        DocumentViewer::new(config, Arc::new(LopdfDecoder::new()), HostContext::new(identity))?;

    viewer
        .unlock(
            &gate,
            DocumentRef::new(args.document.as_str(), args.file_name.as_str()),
            SecretString::from(args.key.clone()),
        )
        .await
        .context("failed to unlock document")?;

    viewer.set_rotation(rotation)?;
    viewer.set_current_page(args.page)?;
    let commits = viewer.settle().await;
    info!(commits, epoch = ?viewer.epoch(), "window settled");

    let (page_count, scale, can_download) = match viewer.document() {
        Some(document) => (document.page_count(), document.scale(), document.grant().can_download),
        None => anyhow::bail!("viewer closed before rendering finished"),
    };
    let window = viewer.window().context("viewer has no resident window")?;

    let mut pages = Vec::new();
    let mut failed = Vec::new();
    for page in window.pages() {
        match viewer.page(page) {
            PageView::Ready(surface) => {
                let file = format!("page-{page}.png");
                let path = args.output.join(&file);
                surface
                    .image
                    .save(&path)
                    .with_context(|| format!("failed to write image to {}", path.display()))?;
                pages.push(PageOutput {
                    page,
                    file,
                    width: surface.width(),
                    height: surface.height(),
                    watermark: surface.watermark.as_ref().map(|spec| spec.text.clone()),
                });
            }
            PageView::Failed(err) => {
                warn!(page, error = %err, "page failed to render");
                failed.push(FailedPage { page, error: err.to_string() });
            }
            _ => {}
        }
    }

    let summary = ViewSummary {
        document_id: args.document.clone(),
        page_count,
        current_page: window.current_page,
        window: [window.lower_bound, window.upper_bound],
        scale,
        rotation: rotation.degrees(),
        can_download,
        pages,
        failed,
    };
    viewer.close();
    Ok(summary)
}
