//! Response shapes of the SharePoint REST API.

use listgrid_api::StoreError;
use reqwest::StatusCode;
use serde_json::Value;

/// Map an HTTP failure status onto an error kind.
pub(crate) fn status_error(status: StatusCode, body: &str) -> StoreError {
    let msg = format!("HTTP {}: {}", status.as_u16(), error_message(body));
    match status.as_u16() {
        404 => StoreError::not_found(msg),
        401 | 403 => StoreError::unauthorized(msg),
        400 => StoreError::invalid_query(msg),
        408 | 429 => StoreError::transient(msg),
        s if s >= 500 => StoreError::transient(msg),
        _ => StoreError::format_err(msg),
    }
}

/// `error.message.value` (verbose) or `odata.error.message.value`, else the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.get("error").or_else(|| v.get("odata.error")))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.get("value").or(Some(m)))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().chars().take(300).collect())
}

/// Strip the `d` envelope and turn every `{results: [...]}` wrapper into a
/// plain array, so both metadata styles decode the same way.
pub(crate) fn normalize(value: Value) -> Value {
    let value = match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("d") => {
            map.remove("d").unwrap_or(Value::Null)
        }
        other => other,
    };
    unwrap_results(value)
}

fn unwrap_results(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.remove("__metadata");
            map.remove("__deferred");
            if let Some(Value::Array(_)) = map.get("results") {
                if map.len() == 1 {
                    return unwrap_results(map.remove("results").unwrap_or(Value::Null));
                }
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, unwrap_results(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_results).collect()),
        other => other,
    }
}

/// Items of a collection response: `value` (nometadata) or a bare array.
pub(crate) fn collection(value: Value) -> Result<Vec<Value>, StoreError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("value") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(StoreError::format_err("expected a collection response")),
        },
        _ => Err(StoreError::format_err("expected a collection response")),
    }
}

/// `{...}` braces and surrounding whitespace removed from a list/view id.
pub(crate) fn guid(id: &str) -> String {
    id.trim().trim_start_matches('{').trim_end_matches('}').to_string()
}

/// Single-quoted OData string literal, percent-encoded for a path segment.
pub(crate) fn string_literal(s: &str) -> String {
    format!("'{}'", urlencoding::encode(&s.replace('\'', "''")))
}
