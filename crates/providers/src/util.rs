use np_domain::error::{Error, Result};
use serde::de::DeserializeOwned;

pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read `{SERVICE}_BASE_URL` / `{SERVICE}_API_KEY` the way the upstream
/// Python clients pull their configuration from the environment.
pub(crate) fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

/// Decode a JSON response body, surfacing a non-2xx status as a
/// provider error with the response body (or the raw text if it isn't
/// JSON) folded into the message — mirrors the upstream clients'
/// "try JSON, fall back to raw text" error path.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(from_reqwest)?;
    if !status.is_success() {
        let message = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(v) => v.to_string(),
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        };
        return Err(Error::Provider {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {message}"),
        });
    }
    serde_json::from_slice(&bytes).map_err(Error::Json)
}
