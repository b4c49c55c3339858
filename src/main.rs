use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use screen_translator::capture::{ImageFileCapture, NoCapture, ScreenCapture};
use screen_translator::config::{load_settings, API_KEY_ENV};
use screen_translator::translation::{Stage, StreamHandler, TranslationService};

#[derive(Parser)]
#[command(name = "screen-translator", about = "Translate text or image regions with an OpenAI-compatible model")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Overrides {
    /// Stream the translation as it is generated
    #[arg(long, global = true, overrides_with = "no_stream")]
    stream: bool,
    #[arg(long, global = true)]
    no_stream: bool,

    /// Read and translate the image in a single vision call
    #[arg(long, global = true, overrides_with = "relay")]
    vision: bool,
    /// OCR first, then translate the extracted text
    #[arg(long, global = true)]
    relay: bool,

    #[arg(long, global = true)]
    source: Option<String>,
    #[arg(long, global = true)]
    target: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Translate text ("-" reads stdin)
    Text { text: String },
    /// Translate a region of an image file
    Image {
        path: PathBuf,
        /// left,top,right,bottom (defaults to the whole image)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        region: Option<Vec<i32>>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = load_settings();
    let o = &cli.overrides;
    if o.stream {
        settings.enable_stream_output = true;
    }
    if o.no_stream {
        settings.enable_stream_output = false;
    }
    if o.vision {
        settings.use_vision_for_translation = true;
    }
    if o.relay {
        settings.use_vision_for_translation = false;
    }
    if let Some(source) = &o.source {
        settings.source_language = source.clone();
    }
    if let Some(target) = &o.target {
        settings.target_language = target.clone();
    }
    if settings.api_key.is_empty() {
        tracing::warn!("no API key configured (settings file or {}), sending unauthenticated requests", API_KEY_ENV);
    }

    let streamed = settings.enable_stream_output;

    match cli.command {
        Command::Text { text } => {
            let input = if text == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                text
            };

            let service = build_service(Arc::new(NoCapture), &settings, streamed);
            let result = service.translate_text(&input)?;
            finish_output(streamed, &result.translated_text)?;
        }
        Command::Image { path, region } => {
            let capture = Arc::new(ImageFileCapture::new(&path));
            let (left, top, right, bottom) = match region.as_deref() {
                Some([l, t, r, b]) => (*l, *t, *r, *b),
                Some(other) => anyhow::bail!("--region needs 4 values, got {}", other.len()),
                None => capture.full_region()?,
            };
            let service = build_service(capture, &settings, streamed);
            let result = service
                .process_screenshot_detailed(left, top, right, bottom)
                .with_context(|| format!("failed to translate {}", path.display()))?;

            if !result.extracted_text.is_empty() {
                eprintln!("{}\n", result.extracted_text.trim());
            }
            if result.translated_text.is_empty() && !settings.use_vision_for_translation {
                tracing::info!("no text found");
                return Ok(());
            }
            finish_output(streamed, &result.translated_text)?;
        }
    }

    Ok(())
}

fn build_service(
    capture: Arc<dyn ScreenCapture>,
    settings: &screen_translator::config::Settings,
    streamed: bool,
) -> TranslationService {
    let service = TranslationService::new(capture)
        .with_client_config(settings.client_config())
        .with_prompts(settings.prompts())
        .with_options(settings.options());

    if streamed {
        service.set_stream_handler(Some(stdout_stream_handler()));
    }
    service
}

/// Prints the part of each cumulative update not yet written.
fn stdout_stream_handler() -> StreamHandler {
    let printed = std::sync::Mutex::new(0usize);
    Arc::new(move |_stage: Stage, text: &str| {
        let mut printed = printed.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tail) = text.get(*printed..) {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(tail.as_bytes());
            let _ = out.flush();
        }
        *printed = text.len();
    })
}

fn finish_output(streamed: bool, text: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if streamed {
        writeln!(out)?;
    } else {
        writeln!(out, "{}", text)?;
    }
    Ok(())
}
