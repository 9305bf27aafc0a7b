use reqwest::StatusCode;
use thiserror::Error;

/// Every failure the acquisition pipeline can surface to its caller.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Settings are missing or malformed. Raised before any network I/O.
    #[error("Weather source is not configured: {0}")]
    Configuration(String),

    /// A network exchange still failed after the whole retry budget was spent.
    #[error("Request to {url} failed after {attempts} attempt(s): {cause}")]
    Transport {
        url: String,
        attempts: u32,
        status: Option<StatusCode>,
        /// Description of the innermost network cause.
        cause: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response bytes could not be decoded with the configured text encoding.
    #[error("Failed to apply encoding {encoding} to response from {url}: {reason}")]
    Encoding {
        url: String,
        encoding: &'static str,
        reason: String,
    },

    /// Decoded response text did not have the expected JSON shape.
    #[error("Unexpected response from {url}: {source}")]
    InvalidResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Weather source {0} is not authenticated")]
    NotAuthenticated(String),

    #[error("Authentication at weather source {0} is already in progress")]
    AuthenticationInProgress(String),

    #[error("None of the cities requested ({}) are currently serviced", requested.join(", "))]
    NoServicedCities { requested: Vec<String> },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl WeatherError {
    /// Whether an operator can recover by changing their input rather than the setup.
    pub fn is_operator_recoverable(&self) -> bool {
        matches!(self, Self::NoServicedCities { .. })
    }
}

pub type Result<T, E = WeatherError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_serviced_cities_lists_requested_names() {
        let err = WeatherError::NoServicedCities {
            requested: vec!["Klaipeda".into(), "Riga".into()],
        };
        assert_eq!(
            err.to_string(),
            "None of the cities requested (Klaipeda, Riga) are currently serviced"
        );
        assert!(err.is_operator_recoverable());
    }

    #[test]
    fn configuration_error_is_not_operator_recoverable() {
        let err = WeatherError::Configuration("Url is not specified.".into());
        assert!(err.to_string().contains("Url is not specified."));
        assert!(!err.is_operator_recoverable());
    }
}
