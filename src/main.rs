use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use mediagen::catalog::{self, Category, Style, TemplateFilter};
use mediagen::config::Config;
use mediagen::credential::CredentialGate;
use mediagen::error::JobError;
use mediagen::job::{AspectRatio, ImageMime, LocalHandle, VideoInput};
use mediagen::poller::{AsyncJobPoller, translate_reported_failure};

#[derive(Parser)]
#[command(name = "mediagen", version, about = "Generate and edit template media with Gemini and Veo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Animate a still image into a short video.
    Animate {
        image: PathBuf,
        #[arg(long, default_value = "")]
        prompt: String,
        #[arg(long, default_value = "16:9")]
        aspect: AspectRatio,
        /// Directory for the downloaded video.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Give up after this many seconds.
        #[arg(long)]
        max_wait_secs: Option<u64>,
    },
    /// Edit an image with a text instruction.
    Edit {
        image: PathBuf,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write marketing copy for a template.
    Describe {
        #[arg(long)]
        title: String,
        #[arg(long)]
        category: String,
        #[arg(long = "tech", num_args = 1..)]
        tech: Vec<String>,
    },
    /// Print a development roadmap for the marketplace.
    Roadmap,
    /// Filter a JSON template catalog.
    Templates {
        file: PathBuf,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long, default_value_t = 0.0)]
        min: f64,
        #[arg(long, default_value_t = 100.0)]
        max: f64,
        #[arg(long)]
        style: Option<Style>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Command::Animate {
            image,
            prompt,
            aspect,
            out,
            max_wait_secs,
        } => animate(config, &image, prompt, aspect, out, max_wait_secs).await,
        Command::Edit { image, prompt, out } => edit(config, &image, &prompt, out).await,
        Command::Describe {
            title,
            category,
            tech,
        } => {
            let client = config.gemini_client();
            let credential = config.credential_gate().credential().await;
            match client
                .describe_template(&title, &category, &tech, &credential)
                .await
            {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    tracing::error!("error generating description: {e}");
                    println!("Error generating description. Please try again.");
                }
            }
            Ok(())
        }
        Command::Roadmap => {
            let client = config.gemini_client();
            let credential = config.credential_gate().credential().await;
            match client.project_roadmap(&credential).await {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    tracing::error!("error generating roadmap: {e}");
                    println!("Roadmap unavailable.");
                }
            }
            Ok(())
        }
        Command::Templates {
            file,
            search,
            category,
            min,
            max,
            style,
        } => {
            let templates = catalog::load_templates(&file)?;
            let filter = TemplateFilter {
                search,
                category,
                price_range: (min, max),
                style,
            };
            let found = catalog::filter_templates(&templates, &filter);
            for t in &found {
                println!(
                    "{}\t{}\t${}\t{}\t{}",
                    t.id, t.title, t.price, t.category, t.style
                );
            }
            tracing::info!(matched = found.len(), total = templates.len(), "catalog filtered");
            Ok(())
        }
    }
}

async fn read_image(path: &Path) -> anyhow::Result<(Vec<u8>, ImageMime)> {
    let mime = ImageMime::from_path(path)
        .with_context(|| format!("unsupported image type: {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok((bytes, mime))
}

async fn animate(
    mut config: Config,
    image: &Path,
    prompt: String,
    aspect: AspectRatio,
    out: Option<PathBuf>,
    max_wait_secs: Option<u64>,
) -> anyhow::Result<()> {
    let (bytes, mime) = read_image(image).await?;
    if let Some(dir) = out {
        config.poller.output_dir = dir;
    }
    if let Some(secs) = max_wait_secs {
        config.poller.max_poll_duration = Some(Duration::from_secs(secs));
    }

    let gate = config.credential_gate();
    let poller = AsyncJobPoller::new(config.gemini_client(), config.poller.clone());
    let input = VideoInput::new(bytes, mime)
        .with_prompt(prompt)
        .with_aspect_ratio(aspect);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    tracing::info!("video generation takes 1-2 minutes");
    let result = poller
        .submit_and_await_with_cancel(input, &gate, &cancel)
        .await;

    match result {
        Ok(media) => {
            match media.local_handle {
                LocalHandle::File(path) => println!("{}", path.display()),
                LocalHandle::Uri(uri) => println!("{uri}"),
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("animation failed: {e}");
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}

async fn edit(config: Config, image: &Path, prompt: &str, out: Option<PathBuf>) -> anyhow::Result<()> {
    let (bytes, mime) = read_image(image).await?;
    let gate = config.credential_gate();
    let client = config.gemini_client();
    let credential = gate.credential().await;

    let edited = match client.edit_image(&bytes, mime, prompt, &credential).await {
        Ok(edited) => edited,
        Err(e) => {
            let err = translate_reported_failure(e.to_string());
            if matches!(err, JobError::InvalidCredential(_)) {
                gate.open_selection_flow().await;
            }
            tracing::error!("image edit failed: {err}");
            eprintln!("{}", err.user_message());
            return Err(err.into());
        }
    };

    let ext = edited
        .mime_type
        .parse::<ImageMime>()
        .map(|m| m.extension())
        .unwrap_or("img");
    let out = out.unwrap_or_else(|| {
        let stem = image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        image.with_file_name(format!("{stem}-edited.{ext}"))
    });
    tokio::fs::write(&out, &edited.data)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("{}", out.display());
    Ok(())
}
