use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    error::{Result, WeatherError},
    model::{Observation, city_equals},
};

#[async_trait]
pub trait WeatherStore: Send + Sync + Debug {
    fn uri(&self) -> String;

    fn is_configured(&self) -> bool;

    /// Empty iff the store is configured.
    fn configuration_errors(&self) -> String;

    async fn initialize(&self) -> Result<()>;

    /// Append every entry. An empty slice is a no-op.
    async fn save(&self, entries: &[Observation]) -> Result<()>;

    /// Entries with `from <= effective_at <= to`, optionally restricted to `cities`.
    /// When given, `cities` must not be empty. Result order is unspecified.
    async fn fetch(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cities: Option<&[String]>,
    ) -> Result<Vec<Observation>>;
}

/// Append-only store kept in process memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryWeatherStore {
    entries: RwLock<Vec<Observation>>,
}

impl MemoryWeatherStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl WeatherStore for MemoryWeatherStore {
    fn uri(&self) -> String {
        "uri://MemoryWeatherStore@memory".to_string()
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

    async fn save(&self, entries: &[Observation]) -> Result<()> {
        self.entries.write().extend_from_slice(entries);
        tracing::debug!(saved = entries.len(), "Memory store saved new weather entries");
        Ok(())
    }

    async fn fetch(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cities: Option<&[String]>,
    ) -> Result<Vec<Observation>> {
        if cities.is_some_and(|c| c.is_empty()) {
            tracing::error!("Memory store fetch called with an empty city filter");
            return Err(WeatherError::InvalidArgument(
                "city filter must contain at least one city".to_string(),
            ));
        }

        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|e| e.effective_at() >= from && e.effective_at() <= to)
            .filter(|e| match cities {
                Some(cities) => cities.iter().any(|c| city_equals(c, e.city())),
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemperatureUnit;
    use chrono::Duration;
    use std::sync::Arc;

    fn entry(city: &str) -> Observation {
        Observation::capture("test", city, 10.0, TemperatureUnit::Celsius, 5, "Clear")
    }

    fn same_set(mut a: Vec<Observation>, mut b: Vec<Observation>) -> bool {
        let key = |o: &Observation| (o.city().to_string(), o.effective_at());
        a.sort_by_key(key);
        b.sort_by_key(key);
        a == b
    }

    #[tokio::test]
    async fn saved_entries_come_back_within_the_window() {
        let store = MemoryWeatherStore::new();
        let entries = vec![entry("Vilnius"), entry("Baku"), entry("Minsk")];

        store.save(&entries).await.unwrap();

        let now = Utc::now();
        let fetched = store
            .fetch(now - Duration::minutes(1), now, None)
            .await
            .unwrap();

        assert!(same_set(fetched, entries));
    }

    #[tokio::test]
    async fn window_bounds_are_inclusive() {
        let store = MemoryWeatherStore::new();
        let e = entry("Riga");
        store.save(std::slice::from_ref(&e)).await.unwrap();

        let at = e.effective_at();
        assert_eq!(store.fetch(at, at, None).await.unwrap(), vec![e.clone()]);
        assert!(
            store
                .fetch(at + Duration::milliseconds(1), at + Duration::minutes(1), None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn city_filter_is_case_insensitive() {
        let store = MemoryWeatherStore::new();
        store.save(&[entry("Vilnius"), entry("Baku")]).await.unwrap();

        let now = Utc::now();
        let fetched = store
            .fetch(
                now - Duration::minutes(1),
                now,
                Some(&[" vilnius ".to_string()]),
            )
            .await
            .unwrap();

        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].city(), "Vilnius");
    }

    #[tokio::test]
    async fn filter_excluding_everything_is_empty_not_an_error() {
        let store = MemoryWeatherStore::new();
        store.save(&[entry("Vilnius"), entry("Baku"), entry("Minsk")]).await.unwrap();

        let now = Utc::now();
        let fetched = store
            .fetch(now - Duration::minutes(1), now, Some(&["London".to_string()]))
            .await
            .unwrap();

        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn empty_city_filter_is_rejected() {
        let store = MemoryWeatherStore::new();
        let now = Utc::now();

        let err = store.fetch(now, now, Some(&[])).await.unwrap_err();
        assert!(matches!(err, WeatherError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn saving_nothing_is_a_no_op() {
        let store = MemoryWeatherStore::new();
        store.save(&[]).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_keep_every_entry() {
        let store = Arc::new(MemoryWeatherStore::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let batch: Vec<_> = (0..25).map(|j| entry(&format!("city-{i}-{j}"))).collect();
                    store.save(&batch).await
                })
            })
            .collect();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let now = Utc::now();
                store.fetch(now - Duration::hours(1), now + Duration::hours(1), None).await
            })
        };

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let snapshot = reader.await.unwrap().unwrap();
        assert!(snapshot.len() <= 400);

        assert_eq!(store.len(), 400);
        let now = Utc::now();
        let all = store.fetch(now - Duration::hours(1), now, None).await.unwrap();
        assert_eq!(all.len(), 400);
    }
}
