//! Leafdoc command line.
//!
//! `leafdoc analyze <path|url>`  analyze one leaf photo and print the JSON record
//! `leafdoc capture [--webcam]`  grab a frame from a phone camera or webcam, then analyze it
//! `leafdoc serve`               run the HTTP API

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use leafdoc::api::endpoints::capture::{CAPTURE_PREFIX, WEBCAM_PREFIX};
use leafdoc::api::types::CaptureAnalysisResponse;
use leafdoc::api::{start_server, ApiContext};
use leafdoc::config::{self, AnalyzerConfig};
use leafdoc::pipeline::analysis::PlantAnalyzer;
use leafdoc::pipeline::source::{
    FrameGrabber, ImageSource, LocalCamera, NetworkCamera, DEFAULT_CAMERA_HOST,
    DEFAULT_CAMERA_PORT, DEFAULT_WEBCAM_INDEX,
};

/// Plant leaf crop and disease analysis
#[derive(Parser, Debug)]
#[command(name = "leafdoc")]
#[command(version)]
#[command(about = "Identify the crop in a leaf photo and suggest treatment")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the environment configuration.
#[derive(Args, Debug)]
struct BackendArgs {
    /// Vision backend: gemini or ollama
    #[arg(long, global = true, env = "LEAFDOC_VISION_BACKEND")]
    backend: Option<String>,

    /// Vision model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Directory holding model.onnx and config.json
    #[arg(long, global = true, env = "LEAFDOC_CLASSIFIER_DIR")]
    classifier_dir: Option<PathBuf>,

    /// Per-request timeout for remote calls, in seconds
    #[arg(long, global = true, env = "LEAFDOC_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an image file or URL
    Analyze {
        /// Local path or http(s) URL
        source: String,
    },

    /// Capture one frame from a phone camera app or local webcam and analyze it
    Capture {
        /// Use a local webcam instead of a phone camera
        #[arg(long)]
        webcam: bool,

        /// Webcam device index (with --webcam)
        #[arg(long, default_value_t = DEFAULT_WEBCAM_INDEX)]
        camera_index: i32,

        /// Camera IP address
        #[arg(long, default_value = DEFAULT_CAMERA_HOST)]
        ip: String,

        /// Camera port
        #[arg(long, default_value_t = DEFAULT_CAMERA_PORT)]
        port: u16,

        /// Seconds to wait for a frame
        #[arg(long, default_value_t = 30)]
        capture_timeout: u64,

        /// Where to save the frame (defaults to ~/Leafdoc/captures)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Only save the frame
        #[arg(long)]
        no_analyze: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(short, long, default_value_t = 5000)]
        port: u16,

        /// Where captured frames are saved (defaults to ~/Leafdoc/captures)
        #[arg(long)]
        captures_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    leafdoc::init_tracing();

    match cli.command {
        Command::Analyze { source } => {
            let analyzer = build_analyzer(&cli.backend)?;
            let result = analyzer.analyze_source(&ImageSource::parse(&source));
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Capture {
            webcam,
            camera_index,
            ip,
            port,
            capture_timeout,
            output_dir,
            no_analyze,
        } => {
            let dir = output_dir.unwrap_or_else(config::captures_dir);
            let timeout = Duration::from_secs(capture_timeout);
            let (grabber, prefix, label): (Box<dyn FrameGrabber>, &str, String) = if webcam {
                let camera = LocalCamera::new(camera_index, timeout);
                let label = camera.describe();
                (Box::new(camera) as Box<dyn FrameGrabber>, WEBCAM_PREFIX, label)
            } else {
                let camera = NetworkCamera::new(&ip, port, timeout);
                let label = camera.stream_url();
                (Box::new(camera) as Box<dyn FrameGrabber>, CAPTURE_PREFIX, label)
            };
            let path = grabber
                .capture_to(&dir, prefix)
                .with_context(|| format!("capturing from {label}"))?;

            if no_analyze {
                println!("{}", path.display());
            } else {
                let analyzer = build_analyzer(&cli.backend)?;
                let response = CaptureAnalysisResponse {
                    result: analyzer.analyze(&path),
                    image_path: path.display().to_string(),
                };
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Command::Serve {
            host,
            port,
            captures_dir,
        } => {
            let analyzer = Arc::new(build_analyzer(&cli.backend)?);
            let ctx = ApiContext::new(
                analyzer,
                captures_dir.unwrap_or_else(config::captures_dir),
            );
            serve(ctx, SocketAddr::new(host, port))?;
        }
    }

    Ok(())
}

/// Environment configuration with command-line overrides applied.
fn build_analyzer(args: &BackendArgs) -> anyhow::Result<PlantAnalyzer> {
    let backend = args
        .backend
        .clone()
        .or_else(|| std::env::var("LEAFDOC_VISION_BACKEND").ok())
        .unwrap_or_else(|| "gemini".to_string())
        .to_lowercase();
    let model_key = if backend == "ollama" {
        "LEAFDOC_OLLAMA_MODEL"
    } else {
        "LEAFDOC_GEMINI_MODEL"
    };

    let config = AnalyzerConfig::from_lookup(|key| {
        let flag = match key {
            "LEAFDOC_VISION_BACKEND" => Some(backend.clone()),
            "LEAFDOC_CLASSIFIER_DIR" => args
                .classifier_dir
                .as_ref()
                .map(|d| d.display().to_string()),
            "LEAFDOC_TIMEOUT_SECS" => args.timeout_secs.map(|t| t.to_string()),
            k if k == model_key => args.model.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    })?;

    PlantAnalyzer::from_config(&config).context("building plant analyzer")
}

/// Run the HTTP API until Ctrl-C.
///
/// The analyzer owns blocking HTTP clients, so the runtime is created here
/// and torn down before the context is dropped.
fn serve(ctx: ApiContext, addr: SocketAddr) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;

    runtime.block_on(async {
        let server = start_server(ctx.clone(), addr)
            .await
            .map_err(anyhow::Error::msg)?;
        println!("Leafdoc API listening on http://{}", server.addr);

        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
        server.stop().await;
        Ok::<_, anyhow::Error>(())
    })?;

    drop(runtime);
    drop(ctx);
    Ok(())
}
