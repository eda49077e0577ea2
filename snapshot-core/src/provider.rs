use async_trait::async_trait;
use std::fmt::Debug;

use crate::model::WeatherSnapshot;

pub mod openweather;

pub use openweather::OpenWeatherProvider;

/// Source of current-weather documents.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Fetch the current weather for `city` as an opaque JSON document.
    async fn current(&self, city: &str) -> anyhow::Result<WeatherSnapshot>;
}

/// Shorten an upstream body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }

    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
