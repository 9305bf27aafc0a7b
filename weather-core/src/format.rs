use chrono::Local;

use crate::model::Observation;

/// Renders one observation as a single line of text.
pub trait WeatherFormatter: Send + Sync {
    fn format(&self, entry: &Observation) -> String;
}

/// Formats timestamps in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl DefaultFormatter {
    fn render(entry: &Observation, at: &str) -> String {
        format!(
            "Weather in {} at {}: temperature - {:.1}{}, precipitation - {}, other info - {}",
            entry.city(),
            at,
            entry.temperature(),
            entry.temperature_unit().symbol(),
            entry.precipitation(),
            entry.weather(),
        )
    }
}

impl WeatherFormatter for DefaultFormatter {
    fn format(&self, entry: &Observation) -> String {
        let local = entry.effective_at().with_timezone(&Local);
        Self::render(entry, &local.format("%Y-%m-%d %H:%M").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemperatureUnit;

    #[test]
    fn renders_every_field_on_one_line() {
        let entry = Observation::capture("Metasite", "Vilnius", 21.456, TemperatureUnit::Celsius, 30, "Sunny");

        let line = DefaultFormatter.format(&entry);

        assert!(line.starts_with("Weather in Vilnius at "));
        assert!(line.ends_with(": temperature - 21.5C, precipitation - 30, other info - Sunny"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn fahrenheit_uses_f_suffix() {
        let entry = Observation::capture("", "New York", 70.0, TemperatureUnit::Fahrenheit, 0, "");
        let line = DefaultFormatter::render(&entry, "2026-10-19 12:00");
        assert_eq!(
            line,
            "Weather in New York at 2026-10-19 12:00: temperature - 70.0F, precipitation - 0, other info - "
        );
    }
}
