use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocrline::config::Config;
use ocrline::models::{EngineKind, ImageFormat};
use ocrline::processing::capabilities;
use ocrline::ExtractionPipeline;

#[derive(Parser)]
#[command(name = "ocrline")]
#[command(about = "Extract text from images with Tesseract or EasyOCR")]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract text from an image file and print the result as JSON
    Extract {
        path: PathBuf,

        /// OCR engine: tesseract or easyocr
        #[arg(long)]
        engine: Option<EngineKind>,

        /// Language code, repeatable (e.g. --lang eng --lang deu)
        #[arg(long = "lang")]
        languages: Vec<String>,

        /// Minimum token confidence in [0, 1]
        #[arg(long)]
        confidence: Option<f32>,

        /// Skip enhancement stages; oversized images are still downscaled
        #[arg(long)]
        no_preprocess: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Print supported engines, formats and preprocessing stages
    Capabilities,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ocrline=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays valid JSON.
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    init_tracing(args.log_json);

    let config = Config::from_env();

    match args.command {
        Command::Capabilities => print_json(&capabilities(&config), true),
        Command::Extract {
            path,
            engine,
            languages,
            confidence,
            no_preprocess,
            pretty,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let declared = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(ImageFormat::from_extension);

            let pipeline = ExtractionPipeline::new(&config)?;
            let mut options = pipeline.default_options().clone();
            if let Some(engine) = engine {
                options.engine = engine;
            }
            if !languages.is_empty() {
                options.languages = languages;
            }
            if let Some(confidence) = confidence {
                options.confidence_threshold = confidence;
            }
            if no_preprocess {
                options.preprocess = false;
            }

            tracing::info!(path = %path.display(), engine = %options.engine, "Extracting text");
            let result = pipeline.extract(&bytes, declared, &options).await;
            pipeline.registry().shutdown().await;

            let result = result.map_err(|e| {
                tracing::error!(kind = e.kind(), "Extraction failed: {}", e);
                e
            })?;
            tracing::info!(
                words = result.word_count(),
                lines = result.line_count(),
                "Text extracted"
            );
            print_json(&result, pretty)
        }
    }
}
