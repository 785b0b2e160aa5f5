use anyhow::Result;
use clap::{Parser, Subcommand};
use image_shrinker::app::App;
use image_shrinker::models::{BatchRun, Config, FitMode, OutputFormat, ResizePreset, ResizeSpec};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-shrinker")]
#[command(about = "Resize images in an S3 bucket in place, keeping a backup of each original")]
struct CliArgs {
    /// Print the run summary as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process every image under the configured prefix.
    All {
        /// Override S3_DIRECTORY_PREFIX for this run.
        #[arg(long)]
        prefix: Option<String>,

        /// thumbnail, medium, large or default.
        #[arg(long)]
        preset: Option<ResizePreset>,
    },
    /// Process a single image.
    Single {
        #[arg(value_name = "KEY")]
        key: String,

        /// thumbnail, medium, large or default.
        #[arg(long)]
        preset: Option<ResizePreset>,
    },
    /// Process a single image with explicit dimensions and quality.
    Custom {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(default_value_t = 800)]
        width: u32,

        #[arg(default_value_t = 600)]
        height: u32,

        #[arg(default_value_t = 80)]
        quality: u32,

        #[arg(long, default_value = "inside")]
        fit: FitMode,

        /// jpeg, png or webp. Defaults to the source format.
        #[arg(long)]
        format: Option<OutputFormat>,
    },
}

async fn execute(
    app: App,
    config: &Config,
    command: Command,
) -> image_shrinker::Result<BatchRun> {
    match command {
        Command::All { prefix, preset } => {
            let app = with_preset(app, config, preset);
            let prefix = prefix.unwrap_or_else(|| app.prefix().to_string());
            app.run_all(&prefix).await
        }
        Command::Single { key, preset } => {
            with_preset(app, config, preset).run_single(&key).await
        }
        Command::Custom {
            key,
            width,
            height,
            quality,
            fit,
            format,
        } => {
            let mut spec = ResizeSpec::new()
                .with_width(width)
                .with_height(height)
                .with_quality(quality)
                .with_fit(fit);
            spec.output_format = format;

            let result = app.run_with_options(&key, &spec).await?;
            info!(
                "{} -> {} bytes",
                result.original_byte_length, result.new_byte_length
            );

            let mut run = BatchRun::new();
            run.record_success(result.byte_savings());
            Ok(run)
        }
    }
}

fn with_preset(app: App, config: &Config, preset: Option<ResizePreset>) -> App {
    match preset {
        Some(preset) => app.with_default_spec(ResizeSpec::preset(preset, config.default_width)),
        None => app,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_shrinker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app = match App::new(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    match execute(app, &config, args.command).await {
        Ok(run) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            }
            Ok(())
        }
        Err(e) => {
            error!("Processing failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_custom_defaults() {
        let args = CliArgs::try_parse_from(["image-shrinker", "custom", "photos/a.jpg"]).unwrap();

        match args.command {
            Command::Custom {
                key,
                width,
                height,
                quality,
                fit,
                format,
            } => {
                assert_eq!(key, "photos/a.jpg");
                assert_eq!((width, height, quality), (800, 600, 80));
                assert_eq!(fit, FitMode::Inside);
                assert_eq!(format, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_custom_explicit_values() {
        let args = CliArgs::try_parse_from([
            "image-shrinker",
            "custom",
            "photos/a.jpg",
            "1200",
            "800",
            "90",
            "--fit",
            "cover",
            "--format",
            "webp",
            "--json",
        ])
        .unwrap();

        assert!(args.json);
        match args.command {
            Command::Custom {
                width,
                height,
                quality,
                fit,
                format,
                ..
            } => {
                assert_eq!((width, height, quality), (1200, 800, 90));
                assert_eq!(fit, FitMode::Cover);
                assert_eq!(format, Some(OutputFormat::Webp));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_single_requires_key() {
        assert!(CliArgs::try_parse_from(["image-shrinker", "single"]).is_err());
    }

    #[test]
    fn test_parse_all_with_preset() {
        let args =
            CliArgs::try_parse_from(["image-shrinker", "all", "--preset", "thumbnail"]).unwrap();

        match args.command {
            Command::All { prefix, preset } => {
                assert_eq!(prefix, None);
                assert_eq!(preset, Some(ResizePreset::Thumbnail));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
