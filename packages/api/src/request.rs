//! Single-shot JSON request helper.
//!
//! Every endpoint goes through [`send_json`] so that status handling and
//! body diagnostics are uniform. Failures are returned as-is; nothing in
//! this crate retries.

use crate::ApiError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Sends `request` and parses the response body as JSON.
///
/// # Errors
///
/// Returns [`ApiError::Http`] if the request cannot be sent or the body
/// cannot be read, [`ApiError::Status`] for any non-2xx status, and
/// [`ApiError::Parse`] if the body is not valid JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, ApiError> {
    let response = request.send().await?;

    let url = response.url().to_string();
    let status = response.status();
    log::debug!("{status} {url}");

    if !status.is_success() {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            log::warn!("HTTP {status} (transient) from {url}");
        } else {
            log::warn!("HTTP {status} from {url}");
        }
        return Err(ApiError::Status {
            status: status.as_u16(),
            url,
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|json_err| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::error!(
            "JSON parse failed.\n  \
             url: {url}\n  \
             status: {status}\n  \
             content-type: {content_type:?}\n  \
             received: {} bytes\n  \
             parse error: {json_err}\n  \
             body preview: {preview}",
            text.len(),
        );
        ApiError::Parse {
            message: format!(
                "JSON parse failed: {json_err} (status={status}, received {} bytes, \
                 content-type={content_type:?})",
                text.len()
            ),
        }
    })
}
