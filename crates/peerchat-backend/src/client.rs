//! reqwest-based `BackendClient`

use async_trait::async_trait;
use peerchat_core::{
    valid_history, BackendClient, BackendEndpoint, HistoryRecord, MessageRecord, PeerChatResult,
    RegisteredUser, SessionId, WireHistoryRecord,
};
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use super::error::BackendError;

/// Client for the persistence and directory service
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let invalid = |reason: String| BackendError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    pub fn from_endpoint(endpoint: &BackendEndpoint) -> Result<Self, BackendError> {
        Self::new(&endpoint.base_url)
    }

    /// Base URL with `segments` appended, each percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BackendError::Status {
                status: status.as_u16(),
                endpoint: response.url().path().to_string(),
            })
        }
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<(), BackendError> {
        let response = self.client.post(url).json(body).send().await?;
        Self::check(response)?;
        Ok(())
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn register(&self, user: &RegisteredUser) -> PeerChatResult<()> {
        debug!("Registering {} as {}", user.peer_id, user.name);
        self.post_json(self.endpoint(&["api", "register"]), user)
            .await
            .map_err(Into::into)
    }

    async fn persist_message(&self, record: &MessageRecord) -> PeerChatResult<()> {
        self.post_json(self.endpoint(&["api", "message"]), record)
            .await
            .map_err(Into::into)
    }

    async fn fetch_history(
        &self,
        local: &SessionId,
        remote: &SessionId,
    ) -> PeerChatResult<Vec<HistoryRecord>> {
        let url = self.endpoint(&["api", "messages", local.as_str(), remote.as_str()]);
        let fetch = async {
            let response = Self::check(self.client.get(url).send().await?)?;
            Ok::<_, BackendError>(response.json::<Vec<WireHistoryRecord>>().await?)
        };
        let records = valid_history(fetch.await?);
        debug!("Fetched {} records for {} / {}", records.len(), local, remote);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_and_encodes() {
        let backend = HttpBackend::new("http://localhost:5000").unwrap();
        assert_eq!(
            backend.endpoint(&["api", "register"]).as_str(),
            "http://localhost:5000/api/register"
        );
        assert_eq!(
            backend.endpoint(&["api", "messages", "a b", "c/d"]).as_str(),
            "http://localhost:5000/api/messages/a%20b/c%2Fd"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = HttpBackend::new("http://example.com/chat/").unwrap();
        assert_eq!(
            backend.endpoint(&["api", "message"]).as_str(),
            "http://example.com/chat/api/message"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBackend::new("not a url"),
            Err(BackendError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            HttpBackend::new("mailto:someone@example.com"),
            Err(BackendError::InvalidBaseUrl { .. })
        ));
    }
}
