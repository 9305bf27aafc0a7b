use crate::{
    config::SourceConfig,
    error::{Result, WeatherError},
    model::{Observation, city_equals},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt::{self, Debug};

pub mod http;
pub mod stub;

pub use http::HttpWeatherSource;
pub use stub::StubWeatherSource;

/// Lifecycle of a source. Only `authenticate` moves it forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configured,
    Authenticating,
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Configured => "configured",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    /// `uri://<implementation>@<url>`, used to identify the source in logs.
    fn uri(&self) -> String;

    fn state(&self) -> SessionState;

    fn is_configured(&self) -> bool {
        self.state() != SessionState::Unconfigured
    }

    fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// Cities the provider declared during authentication; empty before that.
    fn serviced_cities(&self) -> Vec<String>;

    /// Empty iff the configuration is valid.
    fn configuration_errors(&self) -> String;

    async fn authenticate(&self) -> Result<()>;

    /// Fetch current conditions for every requested city the provider services,
    /// in serviced-city order. Fails as a whole if any single city fails.
    async fn fetch(&self, cities: &[String]) -> Result<Vec<Observation>>;
}

/// Authenticated request plan handed to an implementation by [`Session::plan_fetch`].
#[derive(Debug, Clone)]
pub(crate) struct FetchPlan {
    pub bearer: String,
    pub cities: Vec<String>,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    bearer: Option<String>,
    serviced_cities: Vec<String>,
}

/// Configuration plus session state shared by every source implementation.
#[derive(Debug)]
pub(crate) struct Session {
    name: &'static str,
    config: SourceConfig,
    inner: RwLock<SessionInner>,
}

impl Session {
    pub fn new(name: &'static str, config: SourceConfig) -> Self {
        let state = if config.is_valid() {
            SessionState::Configured
        } else {
            SessionState::Unconfigured
        };
        Self {
            name,
            config,
            inner: RwLock::new(SessionInner {
                state,
                bearer: None,
                serviced_cities: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn uri(&self) -> String {
        format!("uri://{}@{}", self.name, self.config.url.trim())
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    pub fn serviced_cities(&self) -> Vec<String> {
        self.inner.read().serviced_cities.clone()
    }

    /// Move to `Authenticating`. Returns `None` when already authenticated.
    ///
    /// The returned attempt must be completed; dropping it for any reason
    /// (error, timeout, cancelled caller) puts the session back to `Configured`.
    pub fn begin_authentication(&self) -> Result<Option<AuthenticationAttempt<'_>>> {
        let mut inner = self.inner.write();
        match inner.state {
            SessionState::Unconfigured => {
                let err = WeatherError::Configuration(self.config.configuration_errors());
                tracing::error!(source = %self.uri(), error = %err, "Cannot authenticate");
                Err(err)
            }
            SessionState::Authenticating => Err(WeatherError::AuthenticationInProgress(self.uri())),
            SessionState::Authenticated => Ok(None),
            SessionState::Configured => {
                inner.state = SessionState::Authenticating;
                Ok(Some(AuthenticationAttempt {
                    session: self,
                    completed: false,
                }))
            }
        }
    }

    fn complete_authentication(&self, bearer: String, serviced_cities: Vec<String>) {
        let mut inner = self.inner.write();
        inner.bearer = Some(bearer);
        inner.serviced_cities = serviced_cities;
        inner.state = SessionState::Authenticated;
    }

    fn abort_authentication(&self) {
        let mut inner = self.inner.write();
        if inner.state == SessionState::Authenticating {
            inner.state = SessionState::Configured;
            tracing::debug!(source = %self.uri(), "Authentication abandoned");
        }
    }

    /// Validate a fetch request and intersect it with the serviced cities.
    pub fn plan_fetch(&self, cities: &[String]) -> Result<FetchPlan> {
        let requested: Vec<String> = cities
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        if requested.is_empty() {
            tracing::error!(source = %self.uri(), "Fetch called without any city name");
            return Err(WeatherError::InvalidArgument(
                "at least one non-blank city name is required".to_string(),
            ));
        }

        let inner = self.inner.read();
        let bearer = match (&inner.state, &inner.bearer) {
            (SessionState::Authenticated, Some(bearer)) => bearer.clone(),
            _ => {
                let err = WeatherError::NotAuthenticated(self.uri());
                tracing::error!(error = %err, "Fetch rejected");
                return Err(err);
            }
        };

        let serviced: Vec<String> = inner
            .serviced_cities
            .iter()
            .filter(|s| requested.iter().any(|r| city_equals(s, r)))
            .cloned()
            .collect();

        if serviced.is_empty() {
            let err = WeatherError::NoServicedCities { requested };
            tracing::error!(source = %self.uri(), error = %err, "Fetch rejected");
            return Err(err);
        }

        Ok(FetchPlan { bearer, cities: serviced })
    }
}

/// An authentication started by [`Session::begin_authentication`].
#[derive(Debug)]
#[must_use = "dropping the attempt aborts the authentication"]
pub(crate) struct AuthenticationAttempt<'a> {
    session: &'a Session,
    completed: bool,
}

impl AuthenticationAttempt<'_> {
    pub fn complete(mut self, bearer: String, serviced_cities: Vec<String>) {
        self.session.complete_authentication(bearer, serviced_cities);
        self.completed = true;
    }
}

impl Drop for AuthenticationAttempt<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.session.abort_authentication();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SourceConfig {
        SourceConfig {
            url: "https://weather.example.com/".into(),
            user: "jonas".into(),
            password: "secret".into(),
            ..SourceConfig::default()
        }
    }

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn authenticated() -> Session {
        let session = Session::new("TestSource", config());
        let attempt = session.begin_authentication().unwrap().unwrap();
        attempt.complete(
            "tok".into(),
            cities(&["Vilnius", "Baku", "Minsk", "London", "New York"]),
        );
        session
    }

    #[test]
    fn invalid_config_starts_unconfigured_and_refuses_authentication() {
        let session = Session::new("TestSource", SourceConfig { user: String::new(), ..config() });
        assert_eq!(session.state(), SessionState::Unconfigured);

        let err = session.begin_authentication().unwrap_err();
        assert!(matches!(err, WeatherError::Configuration(msg) if msg.contains("User")));
        assert_eq!(session.state(), SessionState::Unconfigured);
    }

    #[test]
    fn authentication_walks_the_state_machine() {
        let session = Session::new("TestSource", config());
        assert_eq!(session.state(), SessionState::Configured);

        let attempt = session.begin_authentication().unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Authenticating);
        assert!(matches!(
            session.begin_authentication(),
            Err(WeatherError::AuthenticationInProgress(_))
        ));

        attempt.complete("tok".into(), cities(&["Riga"]));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.serviced_cities(), cities(&["Riga"]));
        assert!(session.begin_authentication().unwrap().is_none());
    }

    #[test]
    fn dropped_attempt_returns_to_configured() {
        let session = Session::new("TestSource", config());
        let attempt = session.begin_authentication().unwrap();
        assert_eq!(session.state(), SessionState::Authenticating);

        drop(attempt);
        assert_eq!(session.state(), SessionState::Configured);
        assert!(session.begin_authentication().unwrap().is_some());
    }

    #[test]
    fn uri_names_implementation_and_url() {
        let session = Session::new("TestSource", config());
        assert_eq!(session.uri(), "uri://TestSource@https://weather.example.com/");
    }

    #[test]
    fn plan_requires_a_non_blank_city() {
        let session = authenticated();
        assert!(matches!(session.plan_fetch(&[]), Err(WeatherError::InvalidArgument(_))));
        assert!(matches!(
            session.plan_fetch(&cities(&["", "  "])),
            Err(WeatherError::InvalidArgument(_))
        ));
    }

    #[test]
    fn plan_requires_authentication() {
        let session = Session::new("TestSource", config());
        assert!(matches!(
            session.plan_fetch(&cities(&["Vilnius"])),
            Err(WeatherError::NotAuthenticated(_))
        ));
    }

    #[test]
    fn plan_intersects_in_serviced_order() {
        let session = authenticated();

        let plan = session
            .plan_fetch(&cities(&["minsk ", "Klaipeda", "  VILNIUS", "new york"]))
            .unwrap();

        assert_eq!(plan.bearer, "tok");
        assert_eq!(plan.cities, cities(&["Vilnius", "Minsk", "New York"]));
    }

    #[test]
    fn plan_with_no_serviced_city_fails() {
        let session = authenticated();

        let err = session.plan_fetch(&cities(&["Klaipeda"])).unwrap_err();
        assert!(matches!(err, WeatherError::NoServicedCities { requested } if requested == ["Klaipeda"]));
    }
}
