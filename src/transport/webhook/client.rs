use crate::transport::TransportError;
use reqwest::header::{CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Used when a 429 carries no usable retry-after value.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);
const MIN_RETRY_AFTER: Duration = Duration::from_millis(100);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize)]
pub(crate) struct WebhookPayload<'a> {
    pub content: &'a str,
    pub username: &'a str,
    pub allowed_mentions: AllowedMentions,
}

/// Empty `parse` list: logged text can never ping users or roles.
#[derive(Debug, Default, Serialize)]
pub(crate) struct AllowedMentions {
    pub parse: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Posts one message.
///
/// A 429 sleeps for the advertised duration before failing with
/// `RateLimited`, so the caller can retry without adding its own backoff.
pub(crate) async fn send_message(
    client: &Client,
    url: &str,
    username: &str,
    content: &str,
    timeout: Duration,
) -> Result<(), TransportError> {
    let payload = WebhookPayload {
        content,
        username,
        allowed_mentions: AllowedMentions::default(),
    };

    let response = client
        .post(url)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .timeout(timeout)
        .json(&payload)
        .send()
        .await
        .map_err(classify_send_error)?;

    let status = response.status();
    if status.is_success() {
        debug!("Webhook accepted message ({} chars)", content.chars().count());
        return Ok(());
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let header = response.headers().get(RETRY_AFTER).and_then(|value| {
            let parsed = parse_retry_after_header(value.as_bytes());
            if parsed.is_none() {
                debug!(
                    "Ignoring unparseable Retry-After header {:?}",
                    String::from_utf8_lossy(value.as_bytes())
                );
            }
            parsed
        });
        let seconds = match header {
            Some(seconds) => Some(seconds),
            None => response
                .json::<RateLimitBody>()
                .await
                .ok()
                .and_then(|body| body.retry_after),
        };
        let retry_after = clamp_retry_after(seconds);
        warn!("Webhook rate limited, waiting {:?}", retry_after);
        tokio::time::sleep(retry_after).await;
        return Err(TransportError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Delivery {
        status: status.as_u16(),
        body,
    })
}

fn classify_send_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

/// Delay-seconds form only; HTTP-date values are not understood.
pub(crate) fn parse_retry_after_header(raw: &[u8]) -> Option<f64> {
    std::str::from_utf8(raw).ok()?.trim().parse::<f64>().ok()
}

pub(crate) fn clamp_retry_after(seconds: Option<f64>) -> Duration {
    match seconds {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
            Duration::from_secs_f64(seconds).clamp(MIN_RETRY_AFTER, MAX_RETRY_AFTER)
        }
        Some(_) => MIN_RETRY_AFTER,
        None => DEFAULT_RETRY_AFTER,
    }
}
