use async_trait::async_trait;
use engine::source::{MessageSource, SourceError};
use engine::types::{ChannelRef, Message};
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::convert::{to_channel_ref, to_message};
use crate::types::{MessagesPage, WireChannel, WireError};

pub struct GatewayClient {
    client: reqwest::Client,
    base_url: Url,
    session: String,
}

impl GatewayClient {
    pub fn new(base_url: &str, session: String) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("gateway url cannot be a base: {}", base_url);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    fn channel_url(&self, handle: &str, tail: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "channels", handle]);
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        handle: &str,
    ) -> Result<T, SourceError> {
        debug!(url = %url, "gateway request");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.session)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, &body, handle));
        }

        resp.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                SourceError::Decode(e.to_string())
            } else {
                transport(e)
            }
        })
    }
}

#[async_trait]
impl MessageSource for GatewayClient {
    async fn resolve(&self, handle: &str) -> Result<ChannelRef, SourceError> {
        let url = self.channel_url(handle, None);
        let channel: WireChannel = self.get(url, handle).await?;
        Ok(to_channel_ref(channel))
    }

    async fn fetch_page(
        &self,
        channel: &ChannelRef,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>, SourceError> {
        let mut url = self.channel_url(&channel.handle, Some("messages"));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(max_id) = cursor {
                query.append_pair("max_id", &max_id.to_string());
            }
        }
        let page: MessagesPage = self.get(url, &channel.handle).await?;
        Ok(page.messages.into_iter().map(to_message).collect())
    }
}

fn transport(err: reqwest::Error) -> SourceError {
    SourceError::Transport(Box::new(err))
}

/// Retry-After in its delta-seconds form; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn status_error(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    handle: &str,
) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(handle.to_string()),
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Unauthorized,
        _ => SourceError::Upstream {
            status: status.as_u16(),
            message: error_message(body),
        },
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<WireError>(body) {
        Ok(WireError {
            message: Some(message),
            ..
        }) => message,
        Ok(WireError {
            error: Some(error), ..
        }) => error,
        _ => body.chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GatewayClient {
        GatewayClient::new(base, "session".to_string()).unwrap()
    }

    #[test]
    fn test_gateway_client_new_accepts_urls() {
        let urls = vec![
            "http://localhost:8080",
            "https://gateway.internal/api/",
            "http://127.0.0.1:3000",
        ];
        for url in urls {
            assert!(
                GatewayClient::new(url, String::new()).is_ok(),
                "Should accept valid URL: {}",
                url
            );
        }
    }

    #[test]
    fn test_gateway_client_new_rejects_garbage() {
        assert!(GatewayClient::new("not a url", String::new()).is_err());
        assert!(GatewayClient::new("mailto:ops@example.com", String::new()).is_err());
    }

    #[test]
    fn test_channel_url_layout() {
        let url = client("http://localhost:8080").channel_url("news", None);
        assert_eq!(url.as_str(), "http://localhost:8080/v1/channels/news");

        let url = client("https://gw.example.com/api/").channel_url("news", Some("messages"));
        assert_eq!(
            url.as_str(),
            "https://gw.example.com/api/v1/channels/news/messages"
        );
    }

    #[test]
    fn test_channel_url_escapes_handle() {
        let url = client("http://localhost:8080").channel_url("a/b", None);
        assert_eq!(url.as_str(), "http://localhost:8080/v1/channels/a%2Fb");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, None, "", "ghost"),
            SourceError::NotFound(h) if h == "ghost"
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, "", "x"),
            SourceError::Unauthorized
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, "", "x"),
            SourceError::Unauthorized
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, None, "", "x"),
            SourceError::Upstream { status: 502, .. }
        ));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = status_error(
            StatusCode::TOO_MANY_REQUESTS,
            parse_retry_after(" 42 "),
            "",
            "x",
        );
        match err {
            SourceError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(42)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_retry_after_http_date_is_ignored() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_upstream_message_from_json_body() {
        let err = status_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            r#"{"error": "flood_wait", "message": "slow down"}"#,
            "x",
        );
        assert!(err.to_string().contains("slow down"));

        let err = status_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            r#"{"error": "flood_wait"}"#,
            "x",
        );
        assert!(err.to_string().contains("flood_wait"));
    }

    #[test]
    fn test_upstream_message_truncates_plain_body() {
        let body = "x".repeat(1000);
        match status_error(StatusCode::SERVICE_UNAVAILABLE, None, &body, "x") {
            SourceError::Upstream { message, .. } => assert_eq!(message.len(), 200),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
