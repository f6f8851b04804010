use serde_json::Value;

use crate::query::Query;

/// Failures talking to the inventory API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("inventory API error: {0}")]
    Api(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out after {seconds} seconds")]
    Timeout { url: String, seconds: u64 },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Read access to the inventory.
///
/// Implementations only move bytes: [`InventoryClient::get_json`] returns the
/// decoded body, the provided methods interpret error payloads, envelopes and
/// pagination.
pub trait InventoryClient: Send + Sync {
    fn get_json(&self, query: &Query) -> Result<Value, ApiError>;

    /// Single request; `results` when the body has that envelope, the whole
    /// body otherwise.
    fn fetch_page(&self, query: &Query) -> Result<Value, ApiError> {
        let body = self.get_json(query)?;
        check_error(&body)?;
        Ok(into_results(body))
    }

    /// Follows pagination until the envelope's `subtotal` is reached or a page
    /// adds nothing. List pages are concatenated; keyed pages (such as
    /// `fact_values`) are merged by key.
    fn fetch_all(&self, query: &Query) -> Result<Value, ApiError> {
        let mut body = self.get_json(query)?;
        check_error(&body)?;

        let expected = expected_items(&body);
        if body.get("results").is_none() {
            return Ok(body);
        }
        let mut collected = body["results"].take();

        let Some(expected) = expected else {
            return Ok(collected);
        };

        let mut page = query.page().unwrap_or(1);
        while item_count(&collected).is_some_and(|count| (count as u64) < expected) {
            page += 1;
            tracing::debug!(query = %query, page, "fetching next page");
            let next = self.fetch_page(&query.clone().with_page(page))?;
            if !merge_page(&mut collected, next) {
                break;
            }
        }

        Ok(collected)
    }

    /// Values of one field across every item of the collection.
    fn list_field(&self, query: &Query, field: &str) -> Result<Vec<String>, ApiError> {
        let collection = self.fetch_all(query)?;
        field_values(&collection, field).map_err(|message| ApiError::Decode {
            url: query.to_string(),
            message,
        })
    }
}

/// Short-circuits bodies carrying an `error` object.
pub fn check_error(body: &Value) -> Result<(), ApiError> {
    match body.get("error") {
        None | Some(Value::Null) => Ok(()),
        Some(error) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| error.to_string());
            Err(ApiError::Api(message))
        }
    }
}

fn into_results(mut body: Value) -> Value {
    if body.get("results").is_some() {
        body["results"].take()
    } else {
        body
    }
}

fn item_count(collected: &Value) -> Option<usize> {
    match collected {
        Value::Array(items) => Some(items.len()),
        Value::Object(entries) => Some(entries.len()),
        _ => None,
    }
}

/// Appends `page` to `collected`; false when the page brought nothing new.
fn merge_page(collected: &mut Value, page: Value) -> bool {
    match (collected, page) {
        (Value::Array(items), Value::Array(more)) if !more.is_empty() => {
            items.extend(more);
            true
        }
        (Value::Object(entries), Value::Object(more)) => {
            let before = entries.len();
            entries.extend(more);
            entries.len() > before
        }
        _ => false,
    }
}

fn expected_items(body: &Value) -> Option<u64> {
    body.get("subtotal")
        .and_then(Value::as_u64)
        .or_else(|| body.get("total").and_then(Value::as_u64))
}

pub(crate) fn field_values(collection: &Value, field: &str) -> Result<Vec<String>, String> {
    let items = collection
        .as_array()
        .ok_or_else(|| "expected a list of items".to_string())?;

    items
        .iter()
        .map(|item| match item.get(field) {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(Value::Number(number)) => Ok(number.to_string()),
            Some(Value::Bool(flag)) => Ok(flag.to_string()),
            _ => Err(format!("item without a `{}` value: {}", field, item)),
        })
        .collect()
}
