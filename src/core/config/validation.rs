use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(analysis) = expect_optional_object(root, "analysis")? {
        validate_u64_field(analysis, "analysis.max_chars", "max_chars", 1, 100_000)?;
        validate_u64_field(analysis, "analysis.overlap", "overlap", 0, 99_999)?;
        validate_u64_field(analysis, "analysis.k", "k", 1, 100)?;
        validate_u64_field(
            analysis,
            "analysis.concurrency_limit",
            "concurrency_limit",
            1,
            256,
        )?;
        validate_u64_field(analysis, "analysis.deadline_ms", "deadline_ms", 1, 600_000)?;
        validate_u64_field(analysis, "analysis.max_retries", "max_retries", 0, 5)?;
        validate_u64_field(
            analysis,
            "analysis.retry_backoff_ms",
            "retry_backoff_ms",
            0,
            10_000,
        )?;
        validate_u64_field(
            analysis,
            "analysis.max_document_chars",
            "max_document_chars",
            1,
            10_000_000,
        )?;
        validate_f64_field(
            analysis,
            "analysis.score_threshold",
            "score_threshold",
            f64::MIN_POSITIVE,
            1.0,
        )?;
        validate_f64_field(
            analysis,
            "analysis.disclosure_discount",
            "disclosure_discount",
            0.0,
            1.0,
        )?;
        if let Some(weights) = expect_optional_object(analysis, "severity_weights")? {
            for key in ["info", "warning", "violation"] {
                validate_f64_field(
                    weights,
                    &format!("analysis.severity_weights.{}", key),
                    key,
                    0.0,
                    1.0,
                )?;
            }
        }
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_enum_field(
            embedding,
            "embedding.provider",
            "provider",
            &["hashing", "openai"],
        )?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 65_536)?;
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_optional_string_field(embedding, "embedding.api_key", "api_key")?;
        validate_optional_string_field(embedding, "embedding.api_key_env", "api_key_env")?;
        validate_u64_field(embedding, "embedding.timeout_ms", "timeout_ms", 1, 600_000)?;
    }

    if let Some(index) = expect_optional_object(root, "index")? {
        validate_enum_field(index, "index.backend", "backend", &["memory", "sqlite"])?;
        validate_optional_string_field(index, "index.path", "path")?;
    }

    if let Some(corpus) = expect_optional_object(root, "corpus")? {
        validate_bool_field(corpus, "corpus.seed_on_startup", "seed_on_startup")?;
        validate_optional_string_field(corpus, "corpus.seed_path", "seed_path")?;
    }

    if let Some(rules) = expect_optional_object(root, "rules")? {
        validate_optional_string_field(rules, "rules.path", "path")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "non-negative integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !number.is_finite() || number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !allowed.contains(&text) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// Accepts a missing key, `null`, or a string.
fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
