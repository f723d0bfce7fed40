mod discover;
mod document;
mod extract;
mod fetch;
mod images;
mod pacing;
mod pipeline;
mod settings;
mod sink;
mod transport;
mod urls;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use discover::DiscoverConfig;
use extract::{Profile, RatingPolicy};
use fetch::RetryPolicy;
use pacing::Pacer;
use pipeline::{Input, RunConfig};
use settings::Settings;
use sink::WriteMode;
use transport::{HttpTransport, Transport};

#[derive(Parser)]
#[command(name = "perfume_scraper", about = "Parfumo perfume page scraper to CSV")]
struct Cli {
    /// Settings file (default: ./perfume_scraper.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ExtractArgs {
    /// Page layout to extract (default from settings)
    #[arg(long, value_enum)]
    profile: Option<Profile>,
    /// How multiple rating markers collapse into one value
    #[arg(long, value_enum)]
    rating: Option<RatingPolicy>,
    /// Download bottle images and add an Image Path column
    #[arg(long)]
    images: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every URL in a line-delimited file into a CSV
    Scrape {
        /// File with one perfume URL per line
        #[arg(short, long)]
        input: PathBuf,
        /// CSV output path
        #[arg(short, long)]
        output: PathBuf,
        /// Skip this many lines of the input; a non-zero offset implies --append
        #[arg(short, long, default_value = "0")]
        start: usize,
        /// Append to the CSV instead of overwriting it
        #[arg(long)]
        append: bool,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
        #[command(flatten)]
        extract: ExtractArgs,
    },
    /// Scrape a single perfume page into a fresh CSV
    Single {
        url: String,
        #[arg(short, long, default_value = "data/single_info.csv")]
        output: PathBuf,
        #[command(flatten)]
        extract: ExtractArgs,
    },
    /// Crawl the popular-brands index and append perfume URLs to a file
    Discover {
        #[arg(short, long, default_value = "urls/popular_brands.txt")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&settings.user_agent, settings.timeout())?);

    let result = match cli.command {
        Commands::Scrape {
            input,
            output,
            start,
            append,
            no_progress,
            extract,
        } => {
            let mode = write_mode(start, append);
            let config = RunConfig {
                start_line: start,
                show_progress: !no_progress && std::io::stderr().is_terminal(),
                ..run_config(&settings, Input::File(input), output, mode, &extract)
            };
            scrape(&config, transport).await
        }
        Commands::Single {
            url,
            output,
            extract,
        } => {
            let config = RunConfig {
                pacer: Pacer::None,
                ..run_config(&settings, Input::Url(url), output, WriteMode::Overwrite, &extract)
            };
            scrape(&config, transport).await
        }
        Commands::Discover { output } => {
            let config = DiscoverConfig {
                index_url: settings.discover_index_url.clone(),
                exclude: settings.discover_exclude.clone(),
                output,
                retry: RetryPolicy::discovery(),
                pacer: settings.discover_pacer(),
            };
            let summary = discover::discover(&config, transport).await?;
            println!(
                "Saved {} perfume URLs from {} brands ({} failed) to {}",
                summary.urls,
                summary.brands,
                summary.failed,
                config.output.display()
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_config(
    settings: &Settings,
    input: Input,
    output: PathBuf,
    mode: WriteMode,
    args: &ExtractArgs,
) -> RunConfig {
    let profile = args.profile.unwrap_or(settings.profile);
    RunConfig {
        input,
        output,
        start_line: 0,
        mode,
        retry: settings.retry_policy(),
        pacer: settings.pacer(),
        image_dir: args.images.then(|| settings.image_dir.clone()),
        profile,
        rating: args.rating.unwrap_or_else(|| settings.rating_for(profile)),
        fields: RunConfig::columns(profile, args.images),
        show_progress: false,
    }
}

/// A resumed run (`start > 0`) always appends so the earlier rows survive.
fn write_mode(start: usize, append: bool) -> WriteMode {
    if append || start > 0 {
        WriteMode::Append { start_line: start }
    } else {
        WriteMode::Overwrite
    }
}

async fn scrape(config: &RunConfig, transport: Arc<dyn Transport>) -> anyhow::Result<()> {
    let summary = pipeline::run(config, transport).await?;
    println!(
        "All information has been saved to {}: {}",
        config.output.display(),
        summary
    );
    Ok(())
}

/// Human-readable run time: `12.3s`, `4m 05s`, `2h 03m 09s`.
fn format_duration(d: std::time::Duration) -> String {
    let total = d.as_secs();
    let (hours, mins, secs) = (total / 3600, total / 60 % 60, total % 60);
    match (hours, mins) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{}m {:02}s", mins, secs),
        _ => format!("{}h {:02}m {:02}s", hours, mins, secs),
    }
}
