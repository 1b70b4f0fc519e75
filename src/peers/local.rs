//! In-process peer backed by a [`GroupRegistry`].
//!
//! Useful for running several nodes inside one process (tests, embedded
//! clusters) without a network hop.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PeerError;
use crate::group::GroupRegistry;
use crate::peers::PeerGetter;

pub struct LocalPeer {
    id: String,
    registry: Arc<GroupRegistry>,
}

impl LocalPeer {
    pub fn new(id: impl Into<String>, registry: Arc<GroupRegistry>) -> Self {
        Self {
            id: id.into(),
            registry,
        }
    }
}

#[async_trait]
impl PeerGetter for LocalPeer {
    async fn get(&self, group: &str, key: &str) -> Result<Bytes, PeerError> {
        let target = self
            .registry
            .get_group(group)
            .ok_or_else(|| PeerError::GroupNotFound(group.to_string()))?;
        let value = target
            .get(key)
            .await
            .map_err(|e| PeerError::Remote(e.to_string()))?;
        Ok(value.to_bytes())
    }

    fn peer_id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for LocalPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPeer").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::SourceFn;

    #[tokio::test]
    async fn test_serves_from_registry() {
        let registry = Arc::new(GroupRegistry::new().unwrap());
        registry
            .new_group(
                "echo",
                0,
                SourceFn(|key: String| async move { anyhow::Ok(key.to_uppercase().into_bytes()) }),
            )
            .unwrap();

        let peer = LocalPeer::new("node-b", registry);
        assert_eq!(peer.get("echo", "abc").await.unwrap(), Bytes::from_static(b"ABC"));
        assert_eq!(
            peer.get("missing", "abc").await.unwrap_err(),
            PeerError::GroupNotFound("missing".into())
        );
        assert!(matches!(peer.get("echo", "").await, Err(PeerError::Remote(_))));
    }
}
