//! Weather lookup tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolError};

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    city: String,
}

/// Report the weather of a city (canned answer, no network access).
pub struct GetWeather;

#[async_trait]
impl Tool for GetWeather {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "A function to get the weather of a city"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The name of the city to get the weather of"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: WeatherArgs = parse_args(self.name(), args)?;
        if args.city.trim().is_empty() {
            return Err(ToolError::malformed(self.name(), "'city' must not be empty"));
        }

        Ok(format!("The weather in {} is 33 degrees celsius.", args.city))
    }
}
