//! Fixed-period fetch → save → render loop.
//!
//! The first cycle starts immediately. Any error from the source or the store ends the
//! loop for good: the cancellation token is triggered and the error is returned to the
//! caller. Cancellation is checked at cycle boundaries; a cycle still in flight when the
//! token fires is dropped, which abandons its outstanding per-city requests.

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    config::DEFAULT_POLL_INTERVAL_SECS,
    error::WeatherError,
    format::WeatherFormatter,
    source::WeatherSource,
    store::WeatherStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    Fetch,
    Save,
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStep::Fetch => f.write_str("fetch"),
            CycleStep::Save => f.write_str("save"),
        }
    }
}

/// A fatal cycle failure, naming the step that broke.
#[derive(Debug, Error)]
#[error("Poll cycle {cycle} failed at {step} step: {source}")]
pub struct CycleError {
    pub cycle: u64,
    pub step: CycleStep,
    #[source]
    pub source: WeatherError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub cycles: u64,
    pub observations: usize,
}

pub struct PollScheduler {
    source: Arc<dyn WeatherSource>,
    store: Arc<dyn WeatherStore>,
    formatter: Arc<dyn WeatherFormatter>,
    cities: Vec<String>,
    period: Duration,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        store: Arc<dyn WeatherStore>,
        formatter: Arc<dyn WeatherFormatter>,
        cities: Vec<String>,
    ) -> Self {
        Self {
            source,
            store,
            formatter,
            cities,
            period: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    /// Zero periods are raised to one millisecond; `tokio::time::interval` rejects them.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(Duration::from_millis(1));
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// One fetch → save → render pass. Returns the rendered lines.
    pub async fn run_cycle(&self, cycle: u64) -> Result<Vec<String>, CycleError> {
        tracing::debug!(cycle, "Starting poll cycle");

        let entries = self
            .source
            .fetch(&self.cities)
            .await
            .map_err(|source| CycleError { cycle, step: CycleStep::Fetch, source })?;

        self.store
            .save(&entries)
            .await
            .map_err(|source| CycleError { cycle, step: CycleStep::Save, source })?;

        Ok(entries.iter().map(|e| self.formatter.format(e)).collect())
    }

    /// Run cycles every `period` until `cancel` fires or a cycle fails.
    ///
    /// `emit` receives the cycle number and its rendered lines after each successful cycle.
    pub async fn run<F>(&self, cancel: CancellationToken, mut emit: F) -> Result<PollSummary, CycleError>
    where
        F: FnMut(u64, &[String]),
    {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = PollSummary::default();

        tracing::info!(
            source = %self.source.uri(),
            store = %self.store.uri(),
            period = ?self.period,
            "Poll scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cycle = summary.cycles + 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(cycle, "Cancelled during poll cycle, abandoning it");
                    break;
                }
                outcome = self.run_cycle(cycle) => outcome,
            };

            match outcome {
                Ok(lines) => {
                    summary.cycles = cycle;
                    summary.observations += lines.len();
                    emit(cycle, &lines);
                }
                Err(err) => {
                    tracing::error!(cycle, step = %err.step, error = %err.source, "Poll cycle failed, stopping scheduler");
                    cancel.cancel();
                    return Err(err);
                }
            }
        }

        tracing::info!(cycles = summary.cycles, "Poll scheduler stopped");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SourceConfig,
        error::Result,
        format::DefaultFormatter,
        model::Observation,
        source::StubWeatherSource,
        store::MemoryWeatherStore,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::time::Instant;

    #[derive(Debug, Default)]
    struct BrokenStore;

    #[async_trait]
    impl WeatherStore for BrokenStore {
        fn uri(&self) -> String {
            "uri://BrokenStore@nowhere".into()
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn configuration_errors(&self) -> String {
            String::new()
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn save(&self, _entries: &[Observation]) -> Result<()> {
            Err(WeatherError::InvalidArgument("disk on fire".into()))
        }

        async fn fetch(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _cities: Option<&[String]>,
        ) -> Result<Vec<Observation>> {
            Ok(Vec::new())
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            url: "https://weather.example.com/".into(),
            user: "jonas".into(),
            password: "secret".into(),
            ..SourceConfig::default()
        }
    }

    fn cities() -> Vec<String> {
        vec!["Vilnius".into(), "Baku".into(), "Klaipeda".into()]
    }

    async fn authenticated_stub() -> Arc<StubWeatherSource> {
        let source = Arc::new(StubWeatherSource::new(config()));
        source.authenticate().await.unwrap();
        source
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_every_period_until_cancelled() {
        let store = Arc::new(MemoryWeatherStore::new());
        let scheduler = PollScheduler::new(
            authenticated_stub().await,
            store.clone(),
            Arc::new(DefaultFormatter),
            cities(),
        );
        assert_eq!(scheduler.period(), Duration::from_secs(30));

        let cancel = CancellationToken::new();
        let started = Instant::now();
        let mut seen = Vec::new();

        let summary = scheduler
            .run(cancel.clone(), |cycle, lines| {
                seen.push((cycle, lines.len(), started.elapsed()));
                if cycle == 3 {
                    cancel.cancel();
                }
            })
            .await
            .unwrap();

        assert_eq!(summary, PollSummary { cycles: 3, observations: 6 });
        assert_eq!(store.len(), 6);
        assert_eq!(
            seen,
            vec![
                (1, 2, Duration::ZERO),
                (2, 2, Duration::from_secs(30)),
                (3, 2, Duration::from_secs(60)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn custom_period_is_honoured() {
        let scheduler = PollScheduler::new(
            authenticated_stub().await,
            Arc::new(MemoryWeatherStore::new()),
            Arc::new(DefaultFormatter),
            cities(),
        )
        .with_period(Duration::from_secs(5));

        let cancel = CancellationToken::new();
        let started = Instant::now();
        let mut last = Duration::ZERO;

        scheduler
            .run(cancel.clone(), |cycle, _| {
                last = started.elapsed();
                if cycle == 2 {
                    cancel.cancel();
                }
            })
            .await
            .unwrap();

        assert_eq!(last, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_stops_the_scheduler() {
        // never authenticated
        let source = Arc::new(StubWeatherSource::new(config()));
        let scheduler = PollScheduler::new(
            source,
            Arc::new(MemoryWeatherStore::new()),
            Arc::new(DefaultFormatter),
            cities(),
        );

        let cancel = CancellationToken::new();
        let mut emitted = 0;
        let err = scheduler
            .run(cancel.clone(), |_, _| emitted += 1)
            .await
            .unwrap_err();

        assert_eq!(err.cycle, 1);
        assert_eq!(err.step, CycleStep::Fetch);
        assert!(matches!(err.source, WeatherError::NotAuthenticated(_)));
        assert!(err.to_string().contains("fetch step"));
        assert!(cancel.is_cancelled());
        assert_eq!(emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn save_failure_stops_the_scheduler() {
        let scheduler = PollScheduler::new(
            authenticated_stub().await,
            Arc::new(BrokenStore),
            Arc::new(DefaultFormatter),
            cities(),
        );

        let cancel = CancellationToken::new();
        let err = scheduler.run(cancel.clone(), |_, _| {}).await.unwrap_err();

        assert_eq!(err.step, CycleStep::Save);
        assert!(err.to_string().contains("disk on fire"));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_token_runs_no_cycle() {
        let store = Arc::new(MemoryWeatherStore::new());
        let scheduler = PollScheduler::new(
            authenticated_stub().await,
            store.clone(),
            Arc::new(DefaultFormatter),
            cities(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = scheduler.run(cancel, |_, _| {}).await.unwrap();
        assert_eq!(summary, PollSummary::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn single_cycle_renders_each_saved_entry() {
        let store = Arc::new(MemoryWeatherStore::new());
        let scheduler = PollScheduler::new(
            authenticated_stub().await,
            store.clone(),
            Arc::new(DefaultFormatter),
            cities(),
        );

        let lines = scheduler.run_cycle(1).await.unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Weather in Vilnius at "));
        assert!(lines[1].starts_with("Weather in Baku at "));
        assert_eq!(store.len(), 2);
    }
}
