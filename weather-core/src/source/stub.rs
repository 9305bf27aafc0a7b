use async_trait::async_trait;
use chrono::Utc;

use crate::{
    config::SourceConfig,
    error::Result,
    model::Observation,
    source::{Session, SessionState, WeatherSource},
};

pub const STUB_SERVICED_CITIES: [&str; 5] = ["Vilnius", "Baku", "Minsk", "London", "New York"];

const STUB_CONDITIONS: [&str; 4] = ["Sunny", "Cloudy", "Rain", "Snow"];

/// Offline source with the same state machine as [`super::HttpWeatherSource`].
///
/// Authentication never touches the network and every serviced city gets a
/// synthetic observation derived from its name.
#[derive(Debug)]
pub struct StubWeatherSource {
    session: Session,
}

impl StubWeatherSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            session: Session::new("StubWeatherSource", config),
        }
    }

    fn observe(&self, city: &str) -> Observation {
        let seed = city
            .bytes()
            .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        let config = self.session.config();

        Observation::capture(
            config.source_id_or_default(),
            city,
            f64::from(seed % 50) - 10.0,
            config.temperature_unit,
            (seed % 100) as i32,
            STUB_CONDITIONS[(seed as usize) % STUB_CONDITIONS.len()],
        )
    }
}

#[async_trait]
impl WeatherSource for StubWeatherSource {
    fn uri(&self) -> String {
        self.session.uri()
    }

    fn state(&self) -> SessionState {
        self.session.state()
    }

    fn serviced_cities(&self) -> Vec<String> {
        self.session.serviced_cities()
    }

    fn configuration_errors(&self) -> String {
        self.session.config().configuration_errors()
    }

    async fn authenticate(&self) -> Result<()> {
        let Some(attempt) = self.session.begin_authentication()? else {
            return Ok(());
        };

        tracing::debug!(source = %self.uri(), "Issuing stub bearer token");
        let token = format!("stub-{:x}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let cities = STUB_SERVICED_CITIES.iter().map(|c| c.to_string()).collect();
        attempt.complete(token, cities);

        Ok(())
    }

    async fn fetch(&self, cities: &[String]) -> Result<Vec<Observation>> {
        let plan = self.session.plan_fetch(cities)?;
        tracing::debug!(source = %self.uri(), cities = plan.cities.len(), "Producing stub observations");
        Ok(plan.cities.iter().map(|city| self.observe(city)).collect())
    }
}
