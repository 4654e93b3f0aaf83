//! Helpers for pulling named values out of query maps and JSON bodies, with
//! the `MissingX`/`InvalidX` error split the spec's input-shape taxonomy
//! calls for.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{AppError, RequestError};

pub fn query_param(params: &HashMap<String, String>, name: &str) -> Result<String, AppError> {
    params
        .get(name)
        .cloned()
        .ok_or_else(|| RequestError::MissingQueryParameter(name.to_string()).into())
}

pub fn json_key(body: &Value, name: &str) -> Result<String, AppError> {
    match body.get(name) {
        None => Err(RequestError::MissingJsonKey(name.to_string()).into()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RequestError::InvalidJsonKey(name.to_string()).into()),
    }
}
