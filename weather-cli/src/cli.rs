use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use weather_core::{
    Config, CycleError, DefaultFormatter, HttpWeatherSource, MemoryWeatherStore, PollScheduler,
    StubWeatherSource, WeatherSource, WeatherStore, city_equals,
};

use crate::prompt;

/// Exit code when none of the requested cities can be polled.
const EXIT_CITIES_NOT_SERVICED: u8 = 2;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Polls a weather REST API and prints current conditions")]
pub struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the weather API URL and credentials.
    Configure,

    /// Poll current weather for a list of cities until interrupted.
    Poll {
        /// Comma-separated city names, e.g. `--city Vilnius, Riga, New York`.
        #[arg(long, required = true, num_args = 1..)]
        city: Vec<String>,

        /// Seconds between poll cycles; defaults to the configured value (30).
        #[arg(long)]
        interval: Option<u64>,

        /// Use the offline stub source instead of the REST API.
        #[arg(long)]
        stub: bool,

        /// Continue without asking when only some cities are serviced.
        #[arg(long, short)]
        yes: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Configure => {
                let config = prompt::configure(Config::load()?)?;
                let path = config.save()?;
                println!("Configuration saved to {}", path.display());
                Ok(ExitCode::SUCCESS)
            }
            Command::Poll { city, interval, stub, yes } => {
                poll(parse_city_list(&city), interval, stub, yes).await
            }
        }
    }
}

/// Join raw arguments with spaces and split on commas, so unquoted
/// multi-word names like `New York` survive the shell.
pub fn parse_city_list(args: &[String]) -> Vec<String> {
    args.join(" ")
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split requested cities into (serviced, not serviced).
pub fn partition_serviced(requested: &[String], serviced: &[String]) -> (Vec<String>, Vec<String>) {
    requested
        .iter()
        .cloned()
        .partition(|c| serviced.iter().any(|s| city_equals(s, c)))
}

async fn poll(cities: Vec<String>, interval: Option<u64>, stub: bool, yes: bool) -> anyhow::Result<ExitCode> {
    if cities.is_empty() {
        bail!("No city names given. Example: weather poll --city Vilnius, Riga");
    }

    let mut config = Config::load()?;
    config.source.apply_env_overrides(|key| std::env::var(key).ok());
    if interval.is_some() {
        config.poll_interval_secs = interval;
    }

    println!("Starting application...");

    let source: Arc<dyn WeatherSource> = if stub {
        Arc::new(StubWeatherSource::new(config.source.clone()))
    } else {
        Arc::new(HttpWeatherSource::new(config.source.clone()))
    };
    let store: Arc<dyn WeatherStore> = Arc::new(MemoryWeatherStore::new());

    if !source.is_configured() {
        bail!(
            "Weather source service is not properly configured:\n{}\nHint: run `weather configure` first.",
            source.configuration_errors()
        );
    }
    if !store.is_configured() {
        bail!(
            "Weather store service is not properly configured:\n{}",
            store.configuration_errors()
        );
    }

    println!("Initializing application services...");
    tokio::try_join!(source.authenticate(), store.initialize())
        .context("Failed to initialize services")?;
    tracing::debug!("Application initialization succeeded");

    if !confirm_serviced_cities(&cities, &source.serviced_cities(), yes)? {
        tracing::debug!("Application exited at the serviced city validation");
        return Ok(ExitCode::from(EXIT_CITIES_NOT_SERVICED));
    }

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let period = config.poll_interval();
    println!(
        "Application is running, polling every {}. Press Ctrl-C to exit...",
        describe_period(period)
    );
    println!();

    let scheduler = PollScheduler::new(source, store, Arc::new(DefaultFormatter), cities)
        .with_period(period);

    let outcome = scheduler
        .run(cancel, |_, lines| {
            for line in lines {
                println!("{line}");
            }
            println!();
        })
        .await;

    let summary = match outcome {
        Ok(summary) => summary,
        Err(err) => match exit_code_for(&err) {
            Some(code) => {
                eprintln!("{err}");
                return Ok(ExitCode::from(code));
            }
            None => {
                return Err(
                    anyhow::Error::new(err).context("Critical error occurred while running a poll cycle")
                );
            }
        },
    };

    tracing::info!(cycles = summary.cycles, observations = summary.observations, "Stopped");
    Ok(ExitCode::SUCCESS)
}

/// Returns whether polling should go ahead with the serviced subset.
fn confirm_serviced_cities(requested: &[String], serviced: &[String], yes: bool) -> anyhow::Result<bool> {
    let (available, missing) = partition_serviced(requested, serviced);
    tracing::debug!(
        serviced = available.len(),
        requested = requested.len(),
        "Serviced cities validation finished"
    );

    if available.is_empty() {
        println!("None of the cities specified are currently serviced.");
        println!("Currently serviced cities are: {}", serviced.join(", "));
        return Ok(false);
    }
    if missing.is_empty() {
        return Ok(true);
    }

    println!(
        "WARNING! The following cities are not currently serviced: {}",
        missing.join(", ")
    );
    if yes {
        return Ok(true);
    }

    let proceed = prompt::confirm_partial_cities()?;
    if proceed {
        tracing::debug!("User decided to proceed with partial set of the cities");
    }
    Ok(proceed)
}

/// Exit code for cycle failures the operator can fix by changing the city list.
fn exit_code_for(err: &CycleError) -> Option<u8> {
    err.source
        .is_operator_recoverable()
        .then_some(EXIT_CITIES_NOT_SERVICED)
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                println!("Shutting down...");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

fn describe_period(period: Duration) -> String {
    match period.as_secs() {
        1 => "second".to_string(),
        secs => format!("{secs} seconds"),
    }
}
