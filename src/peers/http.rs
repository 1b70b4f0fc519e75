//! HTTP peer getter.
//!
//! Requests `GET {peer}{base_path}{group}/{key}` with both trailing segments
//! percent-encoded, and expects the raw value bytes back with status 200.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url};
use tracing::debug;
use uuid::Uuid;

use crate::error::PeerError;
use crate::peers::PeerGetter;

/// Header carrying the id of a peer request, for correlating logs across nodes.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Fetches values from one peer over HTTP.
#[derive(Clone)]
pub struct HttpGetter {
    peer: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpGetter {
    /// `peer` is the peer's root URL (e.g. `http://10.0.0.2:8001`), `base_path`
    /// the path its peer server is mounted under (e.g. `/_peercache/`).
    pub fn new(peer: impl Into<String>, base_path: &str, client: reqwest::Client) -> Self {
        let peer = peer.into();
        let base_url = format!(
            "{}/{}",
            peer.trim_end_matches('/'),
            base_path.trim_start_matches('/')
        );
        Self {
            peer,
            base_url,
            client,
        }
    }

    /// The URL requested for `(group, key)`.
    pub fn url_for(&self, group: &str, key: &str) -> Result<Url, PeerError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| PeerError::InvalidUrl(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| PeerError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(group)
            .push(key);
        Ok(url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn get(&self, group: &str, key: &str) -> Result<Bytes, PeerError> {
        let url = self.url_for(group, key)?;
        let request_id = Uuid::new_v4();
        debug!(%request_id, %url, "Peer request");

        let request_error = |e: reqwest::Error| PeerError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url.clone())
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PeerError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        response.bytes().await.map_err(request_error)
    }

    fn peer_id(&self) -> &str {
        &self.peer
    }
}

impl fmt::Debug for HttpGetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpGetter")
            .field("peer", &self.peer)
            .field("base_url", &self.base_url)
            .finish()
    }
}
