use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        }
    }

    pub const fn all() -> &'static [TemperatureUnit] {
        &[TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit]
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Celsius => f.write_str("celsius"),
            TemperatureUnit::Fahrenheit => f.write_str("fahrenheit"),
        }
    }
}

/// One weather reading for one city, stamped with the instant it was captured.
///
/// Fields are read-only once built; `effective_at` is always taken from the clock
/// inside [`Observation::capture`], never from the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    effective_at: DateTime<Utc>,
    source_id: String,
    city: String,
    temperature: f64,
    temperature_unit: TemperatureUnit,
    precipitation: i32,
    weather: String,
}

impl Observation {
    pub fn capture(
        source_id: impl Into<String>,
        city: impl Into<String>,
        temperature: f64,
        temperature_unit: TemperatureUnit,
        precipitation: i32,
        weather: impl Into<String>,
    ) -> Self {
        Self {
            effective_at: Utc::now(),
            source_id: source_id.into(),
            city: city.into(),
            temperature,
            temperature_unit,
            precipitation,
            weather: weather.into(),
        }
    }

    pub fn effective_at(&self) -> DateTime<Utc> {
        self.effective_at
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.temperature_unit
    }

    pub fn precipitation(&self) -> i32 {
        self.precipitation
    }

    pub fn weather(&self) -> &str {
        &self.weather
    }
}

/// Case-insensitive, trimmed equality of two city names. Blank names never match.
pub fn city_equals(city: &str, other: &str) -> bool {
    let (a, b) = (city.trim(), other.trim());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.to_lowercase() == b.to_lowercase()
}
