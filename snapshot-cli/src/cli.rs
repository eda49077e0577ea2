use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use snapshot_core::{
    FileConfig, JobConfig, WeatherSnapshotJob,
    config::{API_KEY_VAR, DEFAULT_CITY},
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weather-snapshot",
    version,
    about = "Store the current weather for a city in blob storage"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the current weather once and store it. Meant to be run by a scheduler.
    Run {
        /// City and country, e.g. "Sao Paulo,BR". Overrides CITY and the config file.
        #[arg(long)]
        city: Option<String>,
    },

    /// Fetch the current weather and print it without storing.
    Show {
        #[arg(long)]
        city: Option<String>,
    },

    /// Interactively write the config file.
    Configure,

    /// Print the config file location.
    ConfigPath,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run { city } => {
                // A broken config file must not keep the scheduled job from running.
                let config = resolve_config(FileConfig::load_or_default(), city);
                tracing::debug!("Resolved configuration: {:?}", config);

                // Job failures are already logged; the scheduler gets a clean exit either way.
                let outcome = WeatherSnapshotJob::new(config).run().await;
                tracing::debug!(stored = outcome.is_stored(), "Invocation finished");
            }
            Command::Show { city } => {
                let config = resolve_config(FileConfig::load()?, city);
                let api_key = config.api_key.clone().ok_or_else(|| {
                    anyhow!(
                        "{API_KEY_VAR} is not configured.\n\
                         Hint: export it or run `weather-snapshot configure`."
                    )
                })?;

                let snapshot = WeatherSnapshotJob::new(config).fetch(&api_key).await?;
                println!("{}", serde_json::to_string_pretty(&snapshot.body)?);
            }
            Command::Configure => configure()?,
            Command::ConfigPath => {
                println!("{}", FileConfig::config_file_path()?.display());
            }
        }

        Ok(())
    }
}

/// CLI flag over environment over config file over defaults.
fn resolve_config(file: FileConfig, city: Option<String>) -> JobConfig {
    JobConfig::from_env(&file).with_city(city)
}

fn configure() -> anyhow::Result<()> {
    let mut file = FileConfig::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_help_message("Leave empty to keep the current value")
        .prompt()
        .context("Failed to read API key")?;

    let current_city = file.city.clone().unwrap_or_else(|| DEFAULT_CITY.to_string());
    let city = Text::new("City (name,country):")
        .with_default(&current_city)
        .prompt()
        .context("Failed to read city")?;

    let connection = Password::new("Storage connection string:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_help_message("Leave empty to keep the current value")
        .prompt()
        .context("Failed to read storage connection string")?;

    apply_answers(&mut file, api_key, city, connection);

    let path = file.save()?;
    println!("Configuration saved to {}", path.display());

    Ok(())
}

/// Empty answers keep what the file already has.
fn apply_answers(file: &mut FileConfig, api_key: String, city: String, connection: String) {
    if !api_key.trim().is_empty() {
        file.api_key = Some(api_key.trim().to_string());
    }
    if !city.trim().is_empty() {
        file.city = Some(city.trim().to_string());
    }
    if !connection.trim().is_empty() {
        file.storage_connection = Some(connection.trim().to_string());
    }
}
