use serde_json::{Map, Value};

use super::schema::AppConfig;

/// The built-in configuration as a JSON value, used as the bottom layer of the merge.
pub fn default_config() -> Value {
    serde_json::to_value(AppConfig::default()).unwrap_or_else(|_| Value::Object(Map::new()))
}
