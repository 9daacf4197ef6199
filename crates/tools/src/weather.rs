//! Weather lookup over an injected table of reports.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskloop_core::error::ToolError;
use taskloop_core::tool::TypedTool;

pub const GET_WEATHER: &str = "getWeather";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature: String,
    pub conditions: String,
    pub wind: String,
    pub humidity: String,
}

impl WeatherReport {
    pub fn new(location: &str, temperature: &str, conditions: &str, wind: &str, humidity: &str) -> Self {
        Self {
            location: location.into(),
            temperature: temperature.into(),
            conditions: conditions.into(),
            wind: wind.into(),
            humidity: humidity.into(),
        }
    }
}

/// Reports keyed by exact location string.
#[derive(Debug, Clone, Default)]
pub struct WeatherTable {
    reports: HashMap<String, WeatherReport>,
}

impl WeatherTable {
    pub fn new(reports: impl IntoIterator<Item = WeatherReport>) -> Self {
        Self {
            reports: reports
                .into_iter()
                .map(|r| (r.location.clone(), r))
                .collect(),
        }
    }

    /// A handful of US cities, for demos.
    pub fn sample() -> Self {
        Self::new([
            WeatherReport::new("San Francisco, CA", "70°F", "Sunny", "5 mph", "60%"),
            WeatherReport::new("New York City, NY", "65°F", "Partly Cloudy", "10 mph", "55%"),
            WeatherReport::new("Phoenix, AZ", "95°F", "Sunny", "7 mph", "20%"),
            WeatherReport::new("Dallas, TX", "80°F", "Clear", "8 mph", "45%"),
            WeatherReport::new("Miami, FL", "85°F", "Scattered Thunderstorms", "12 mph", "75%"),
            WeatherReport::new("Chicago, IL", "60°F", "Overcast", "15 mph", "65%"),
        ])
    }

    pub fn get(&self, location: &str) -> Option<&WeatherReport> {
        self.reports.get(location)
    }
}

pub struct WeatherTool {
    table: WeatherTable,
}

impl WeatherTool {
    pub fn new(table: WeatherTable) -> Self {
        Self { table }
    }
}

#[derive(Debug, Deserialize)]
pub struct WeatherArgs {
    pub location: String,
}

#[async_trait]
impl TypedTool for WeatherTool {
    type Args = WeatherArgs;
    type Output = serde_json::Value;

    fn name(&self) -> &str {
        GET_WEATHER
    }

    fn description(&self) -> &str {
        "Get the current weather for a location."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The location to get the weather for, e.g. \"Dallas, TX\""
                }
            },
            "required": ["location"]
        })
    }

    async fn call(&self, args: WeatherArgs) -> Result<serde_json::Value, ToolError> {
        match self.table.get(&args.location) {
            Some(report) => {
                serde_json::to_value(report).map_err(|e| ToolError::execution(GET_WEATHER, e))
            }
            None => Ok(serde_json::Value::String(
                "Weather data not found for this location.".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskloop_core::message::ToolRequest;
    use taskloop_core::tool::{ToolDispatcher, ToolRegistry};

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_typed(WeatherTool::new(WeatherTable::sample()))
    }

    #[tokio::test]
    async fn known_location_returns_report() {
        let result = registry()
            .dispatch(&ToolRequest::new("c1", GET_WEATHER, r#"{"location":"Dallas, TX"}"#))
            .await;
        let value = result.outcome.unwrap();
        assert_eq!(value["temperature"], "80°F");
        assert_eq!(value["conditions"], "Clear");
    }

    #[tokio::test]
    async fn unknown_location_is_a_normal_result() {
        let result = registry()
            .dispatch(&ToolRequest::new("c1", GET_WEATHER, r#"{"location":"Atlantis"}"#))
            .await;
        assert!(result.is_success());
        assert_eq!(result.content(), "Weather data not found for this location.");
    }

    #[tokio::test]
    async fn malformed_arguments_rejected() {
        let result = registry()
            .dispatch(&ToolRequest::new("c1", GET_WEATHER, r#"{"location":42}"#))
            .await;
        assert!(!result.is_success());
    }
}
