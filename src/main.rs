use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

use viewpulse::config::SystemConfig;
use viewpulse::controller::Collector;
use viewpulse::document::{load_targets, AggregateDocument};
use viewpulse::predictor::Forecaster;
use viewpulse::resample::half_hour_grid;
use viewpulse::youtube::YoutubeClient;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every tracked video once and update the history document
    Collect {
        #[arg(long, default_value = "data/video_list.json")]
        video_list: PathBuf,

        #[arg(long, default_value = "stats_history.json")]
        history: PathBuf,

        #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
        api_key: String,
    },
    /// Print current views and 7/30-day growth per video
    Report {
        #[arg(long, default_value = "stats_history.json")]
        history: PathBuf,
    },
    /// Print one video's history on the half-hour grid as JSON
    Series {
        #[arg(long, default_value = "stats_history.json")]
        history: PathBuf,

        #[arg(long)]
        video: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(None)
        .filter_level(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };

    match args.command {
        Command::Collect { video_list, history, api_key } => {
            let targets = load_targets(&video_list)?;
            info!("Tracking {} videos", targets.len());

            let mut doc = AggregateDocument::load(&history)?;
            let collector = Collector::new(YoutubeClient::new(&api_key)?, config);
            let report = collector.run_cycle(&mut doc, &targets, Utc::now());
            if report.failed_batches > 0 {
                warn!("{} batch(es) failed; histories were extrapolated", report.failed_batches);
            }

            doc.save(&history)?;
            info!("Saved {}", history.display());
        }
        Command::Report { history } => {
            let doc = AggregateDocument::load(&history)?;
            let now = Utc::now();
            println!("{:<14} {:>14} {:>12} {:>12} {:>10}  TITLE", "VIDEO", "VIEWS", "+7D", "+30D", "RATE/H");
            for video in &doc.videos {
                let forecaster = Forecaster::with_config(&video.history, &config.estimator);
                println!(
                    "{:<14} {:>14} {:>12} {:>12} {:>10.1}  {}",
                    video.video_id,
                    forecaster.predict(now),
                    forecaster.delta(7, now),
                    forecaster.delta(30, now),
                    forecaster.estimate().blended_slope * 60.0,
                    video.title
                );
            }
        }
        Command::Series { history, video } => {
            let doc = AggregateDocument::load(&history)?;
            let entry = doc
                .video(&video)
                .ok_or_else(|| anyhow!("No history for video {}", video))?;
            println!("{}", serde_json::to_string_pretty(&half_hour_grid(&entry.history))?);
        }
    }

    Ok(())
}
