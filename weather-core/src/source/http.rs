use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    config::SourceConfig,
    error::{Result, WeatherError},
    model::Observation,
    source::{Session, SessionState, WeatherSource},
    transport::HttpTransport,
};

const AUTHORIZE_PATH: &str = "/api/authorize";
const CITIES_PATH: &str = "/api/Cities";
const WEATHER_PATH: &str = "/api/Weather/";

/// Weather source backed by the provider's REST API.
#[derive(Debug)]
pub struct HttpWeatherSource {
    session: Session,
    transport: HttpTransport,
}

#[derive(Debug, Serialize)]
struct AuthorizationRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthorizationResponse {
    bearer: String,
}

#[derive(Debug, Deserialize)]
struct CityWeather {
    city: String,
    temperature: f64,
    precipitation: i32,
    #[serde(default)]
    weather: String,
}

impl HttpWeatherSource {
    pub fn new(config: SourceConfig) -> Self {
        let transport = HttpTransport::from_config(&config);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: SourceConfig, transport: HttpTransport) -> Self {
        tracing::debug!(
            url = %config.url,
            encoding = %transport.encoding(),
            retries = transport.policy().max_retries,
            delay = ?transport.policy().delay,
            "Creating weather source"
        );
        Self {
            session: Session::new("HttpWeatherSource", config),
            transport,
        }
    }

    async fn fetch_bearer_token(&self) -> Result<String> {
        tracing::debug!("Fetching bearer token");

        let config = self.session.config();
        let payload = serde_json::to_string(&AuthorizationRequest {
            username: &config.user,
            password: &config.password,
        })
        .map_err(|e| WeatherError::InvalidArgument(format!("cannot encode credentials: {e}")))?;

        let url = config.api_method_url(AUTHORIZE_PATH);
        let body = self.transport.post(&url, None, &payload).await?;
        let response: AuthorizationResponse = parse(&url, &body)?;

        tracing::debug!("Bearer token fetched");
        Ok(response.bearer)
    }

    async fn fetch_serviced_cities(&self, bearer: &str) -> Result<Vec<String>> {
        tracing::debug!("Fetching serviced cities");

        let url = self.session.config().api_method_url(CITIES_PATH);
        let body = self.transport.get(&url, Some(bearer)).await?;
        let cities: Vec<String> = parse(&url, &body)?;

        tracing::debug!(count = cities.len(), "Serviced cities fetched");
        Ok(cities)
    }

    async fn fetch_city(&self, bearer: &str, city: &str) -> Result<Observation> {
        tracing::debug!(%city, "Fetching weather data");

        let config = self.session.config();
        let url = format!(
            "{}{}",
            config.api_method_url(WEATHER_PATH),
            urlencoding::encode(city)
        );
        let body = self.transport.get(&url, Some(bearer)).await?;
        let data: CityWeather = parse(&url, &body)?;

        tracing::debug!(%city, "Fetched weather data");
        Ok(Observation::capture(
            config.source_id_or_default(),
            data.city,
            data.temperature,
            config.temperature_unit,
            data.precipitation,
            data.weather,
        ))
    }
}

fn parse<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|source| {
        tracing::error!(%url, %body, error = %source, "Failed to deserialize response");
        WeatherError::InvalidResponse {
            url: url.to_string(),
            source,
        }
    })
}

#[async_trait]
impl WeatherSource for HttpWeatherSource {
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
            tracing::debug!(source = %self.uri(), "Already authenticated");
            return Ok(());
        };

        tracing::info!(source = %self.uri(), "Starting authentication");

        // Cities are requested with the token, so the token comes first.
        let outcome = async {
            let bearer = self.fetch_bearer_token().await?;
            let cities = self.fetch_serviced_cities(&bearer).await?;
            Ok::<_, WeatherError>((bearer, cities))
        }
        .await;

        match outcome {
            Ok((bearer, cities)) => {
                attempt.complete(bearer, cities);
                tracing::info!(source = %self.uri(), "Successfully authenticated");
                Ok(())
            }
            Err(err) => {
                drop(attempt);
                tracing::error!(source = %self.uri(), error = %err, "Failed to authenticate");
                Err(err)
            }
        }
    }

    async fn fetch(&self, cities: &[String]) -> Result<Vec<Observation>> {
        let plan = self.session.plan_fetch(cities)?;

        tracing::info!(source = %self.uri(), cities = plan.cities.len(), "Starting fetch");

        let bearer = plan.bearer.as_str();
        let result = try_join_all(plan.cities.iter().map(|city| self.fetch_city(bearer, city))).await;

        match &result {
            Ok(_) => tracing::info!(source = %self.uri(), "Fetch finished"),
            Err(err) => tracing::error!(source = %self.uri(), error = %err, "Failed to fetch"),
        }
        result
    }
}
