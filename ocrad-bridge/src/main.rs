use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocrad_bridge::{Config, ImageInput, Invocation, Ocrad, Recognition, RecognitionOptions};

#[derive(Parser)]
#[command(name = "ocrad-bridge")]
#[command(about = "Recognize text in an image with GNU Ocrad")]
struct Args {
    /// Image file (PNM passes through, other formats are decoded)
    image: PathBuf,

    /// Invert the image before recognition
    #[arg(long)]
    invert: bool,

    /// Only recognize digits
    #[arg(long)]
    numeric: bool,

    /// Print the parsed report as JSON
    #[arg(long)]
    verbose: bool,

    /// Print the engine's raw report
    #[arg(long)]
    raw: bool,

    /// Character filter, may be repeated
    #[arg(long = "filter", value_name = "NAME")]
    filters: Vec<String>,

    #[arg(long, value_name = "NAME")]
    transform: Option<String>,

    #[arg(long, value_name = "N")]
    scale: Option<f64>,

    /// Full options object as JSON; flags above are applied on top
    #[arg(long, value_name = "JSON")]
    options: Option<String>,

    /// Print the best guess for each recognized line, one per output line
    #[arg(long)]
    lines: bool,
}

impl Args {
    fn recognition_options(&self) -> anyhow::Result<RecognitionOptions> {
        let mut options: RecognitionOptions = match &self.options {
            Some(json) => serde_json::from_str(json).context("Invalid --options JSON")?,
            None => RecognitionOptions::default(),
        };

        options.invert |= self.invert;
        options.numeric |= self.numeric;
        options.verbose |= self.verbose || self.lines;
        options.raw |= self.raw;
        options.filters.extend(self.filters.iter().cloned());
        if self.transform.is_some() {
            options.transform = self.transform.clone();
        }
        if self.scale.is_some() {
            options.scale = self.scale;
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocrad_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    tracing::info!("Using ocrad binary: {}", config.engine.binary);

    let options = args.recognition_options()?;
    let image = ImageInput::open(&args.image)
        .with_context(|| format!("Failed to load {}", args.image.display()))?;

    let ocrad = Ocrad::from_config(&config);
    let result = ocrad
        .recognize_async(Invocation::with_options(image, options))
        .await?;

    match result {
        Recognition::Structured(structured) if args.lines => {
            for line in &structured.lines {
                println!("{}", line.text());
            }
        }
        Recognition::Structured(structured) => {
            println!("{}", serde_json::to_string_pretty(&structured)?);
        }
        Recognition::Text(text) => print!("{text}"),
    }

    Ok(())
}
