//! Interactive prompts. Everything here blocks on the terminal.

use anyhow::Result;
use inquire::{Confirm, CustomType, Password, PasswordDisplayMode, Select, Text};
use weather_core::{Config, TemperatureUnit};

/// Ask for source settings, using the current values as defaults.
pub fn configure(mut config: Config) -> Result<Config> {
    let source = &mut config.source;

    source.url = Text::new("Weather API base URL:")
        .with_default(&source.url)
        .prompt()?;

    source.user = Text::new("User:").with_default(&source.user).prompt()?;

    let password = Password::new("Password (leave empty to keep the current one):")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    if !password.is_empty() {
        source.password = password;
    }

    let units = TemperatureUnit::all().to_vec();
    let current = units
        .iter()
        .position(|u| *u == source.temperature_unit)
        .unwrap_or_default();
    source.temperature_unit = Select::new("Temperature unit:", units)
        .with_starting_cursor(current)
        .prompt()?;

    let retries = CustomType::<i64>::new("Retries after a failed request (1-1000):")
        .with_default(i64::from(source.retries_or_default()))
        .prompt()?;
    source.retries = Some(retries);

    let delay = CustomType::<i64>::new("Seconds between retries (1-43200):")
        .with_default(source.retry_delay_or_default().as_secs() as i64)
        .prompt()?;
    source.retry_delay_seconds = Some(delay);

    let errors = config.source.configuration_errors();
    if !errors.is_empty() {
        println!("Warning, the configuration is still incomplete:\n{errors}");
    }

    Ok(config)
}

pub fn confirm_partial_cities() -> Result<bool> {
    Ok(Confirm::new("Proceed with the rest of the cities?")
        .with_default(false)
        .prompt()?)
}
