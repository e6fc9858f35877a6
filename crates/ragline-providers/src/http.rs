//! Shared JSON-over-HTTP plumbing for API backends.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::ProviderError;

/// POST `body` as JSON with bearer auth and decode the JSON reply.
///
/// 429 and 5xx map to [`ProviderError::Transient`]; other non-success
/// statuses map to [`ProviderError::Rejected`].
pub(crate) async fn post_json<Req, Resp>(
    client: &Client,
    provider: &str,
    url: &str,
    api_key: &str,
    body: &Req,
) -> Result<Resp, ProviderError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    debug!("POST {} ({})", url, provider);

    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::transient(provider, format!("Network error: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        return response
            .json::<Resp>()
            .await
            .map_err(|e| ProviderError::invalid_response(provider, e.to_string()));
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(classify_status(provider, status, message))
}

fn classify_status(provider: &str, status: StatusCode, message: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::transient(provider, format!("API error ({}): {}", status.as_u16(), message))
    } else {
        ProviderError::Rejected {
            provider: provider.to_string(),
            status: status.as_u16(),
            message,
        }
    }
}
