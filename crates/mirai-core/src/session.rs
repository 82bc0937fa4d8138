//! Session management.
//!
//! A session starts empty; `/verify` exchanges the verify key for a session
//! key and `/bind` ties that key to one bot account. The key is the only
//! mutable state shared between calls. It sits behind a lock that is never
//! held across an await, so a call racing a handshake may read the old key
//! and fail once; the retry helper in [`Bot`](crate::bot::Bot) covers that.
//!
//! A session can also be marked lost. Whoever keeps the event source
//! attached to the session waits on [`Session::lost`] and starts over; the
//! mark is cleared by the next successful handshake.

use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::endpoints;
use crate::error::{ApiError, ApiResult};
use crate::transport::BoxedTransport;

/// Authentication state for one bot account.
pub struct Session {
    transport: BoxedTransport,
    verify_key: String,
    qq: i64,
    key: RwLock<String>,
    lost: watch::Sender<bool>,
}

impl Session {
    /// Creates an unauthenticated session.
    pub fn new(transport: BoxedTransport, verify_key: impl Into<String>, qq: i64) -> Self {
        Self {
            transport,
            verify_key: verify_key.into(),
            qq,
            key: RwLock::new(String::new()),
            lost: watch::Sender::new(false),
        }
    }

    /// The bot account this session binds to.
    pub fn qq(&self) -> i64 {
        self.qq
    }

    /// Current session key, empty if not authenticated.
    pub fn key(&self) -> String {
        self.key.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        !self.key.read().is_empty()
    }

    /// Current session key, or a [`ApiError::Session`] if there is none.
    pub fn require_key(&self) -> ApiResult<String> {
        let key = self.key();
        if key.is_empty() {
            return Err(ApiError::Session("session is not established".into()));
        }
        Ok(key)
    }

    /// Forgets the current key after the server reported it expired.
    pub fn invalidate(&self) {
        self.key.write().clear();
    }

    /// Flags the session as no longer trustworthy, e.g. after a call failed
    /// with a transient error.
    pub fn mark_lost(&self) {
        if !self.lost.send_replace(true) {
            warn!(qq = self.qq, "Session marked lost");
        }
    }

    pub fn is_lost(&self) -> bool {
        *self.lost.borrow()
    }

    /// Resolves once the session is marked lost. Returns immediately if it
    /// already is.
    pub async fn lost(&self) {
        let mut lost = self.lost.subscribe();
        loop {
            if *lost.borrow_and_update() {
                return;
            }
            if lost.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Exchanges the verify key for a fresh session key.
    pub async fn authenticate(&self) -> ApiResult<()> {
        let response = self
            .transport
            .post(endpoints::VERIFY, json!({ "verifyKey": self.verify_key }))
            .await?;

        let key = response
            .get("session")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Authentication("server returned no session key".into()))?;

        *self.key.write() = key.to_string();
        debug!(qq = self.qq, "Session authenticated");
        Ok(())
    }

    /// Binds the session key to the bot account.
    pub async fn bind(&self) -> ApiResult<()> {
        let key = self.require_key()?;
        self.transport
            .post(endpoints::BIND, json!({ "sessionKey": key, "qq": self.qq }))
            .await?;
        debug!(qq = self.qq, "Session bound");
        Ok(())
    }

    /// Authenticates and binds in one step.
    pub async fn handshake(&self) -> ApiResult<()> {
        self.authenticate().await?;
        self.bind().await?;
        self.lost.send_replace(false);
        info!(qq = self.qq, "Session established");
        Ok(())
    }

    /// Releases the session on the server.
    ///
    /// Releasing a session that is not established is a no-op, so calling
    /// this twice is fine.
    pub async fn release(&self) -> ApiResult<()> {
        let key = self.key();
        if key.is_empty() {
            debug!(qq = self.qq, "No session to release");
            return Ok(());
        }

        self.transport
            .post(endpoints::RELEASE, json!({ "sessionKey": key, "qq": self.qq }))
            .await?;

        // Only clear the key if no handshake replaced it meanwhile.
        let mut current = self.key.write();
        if *current == key {
            current.clear();
        }
        info!(qq = self.qq, "Session released");
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("qq", &self.qq)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::testing::MockTransport;

    fn session(mock: &Arc<MockTransport>) -> Session {
        Session::new(mock.clone(), "INITKEY", 10001)
    }

    #[tokio::test]
    async fn test_handshake_stores_key() {
        let mock = Arc::new(MockTransport::with_session("SESSION-1"));
        let session = session(&mock);

        session.handshake().await.unwrap();

        assert_eq!(session.key(), "SESSION-1");
        let bind = mock.calls_to(endpoints::BIND);
        assert_eq!(bind.len(), 1);
        assert_eq!(bind[0].payload, json!({ "sessionKey": "SESSION-1", "qq": 10001 }));
        let verify = mock.calls_to(endpoints::VERIFY);
        assert_eq!(verify[0].payload, json!({ "verifyKey": "INITKEY" }));
    }

    #[tokio::test]
    async fn test_handshake_twice_stays_usable() {
        let mock = Arc::new(MockTransport::with_session("SESSION-1"));
        let session = session(&mock);

        session.handshake().await.unwrap();
        session.handshake().await.unwrap();

        assert!(session.is_authenticated());
        assert_eq!(session.key(), "SESSION-1");
        assert_eq!(mock.calls_to(endpoints::BIND).len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_credential() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_err(endpoints::VERIFY, ApiError::from_code(1, None));
        let session = session(&mock);

        let err = session.authenticate().await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_missing_session_key() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(endpoints::VERIFY, json!({ "code": 0 }));
        let session = session(&mock);

        let err = session.authenticate().await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_bind_before_authenticate() {
        let mock = Arc::new(MockTransport::new());
        let session = session(&mock);

        let err = session.bind().await.unwrap_err();
        assert!(matches!(err, ApiError::Session(_)));
        assert!(mock.calls_to(endpoints::BIND).is_empty());
    }

    #[tokio::test]
    async fn test_lost_mark_cleared_by_handshake() {
        let mock = Arc::new(MockTransport::with_session("SESSION-1"));
        let session = session(&mock);
        session.handshake().await.unwrap();
        assert!(!session.is_lost());

        session.mark_lost();
        session.mark_lost();
        assert!(session.is_lost());
        tokio::time::timeout(Duration::from_secs(1), session.lost())
            .await
            .unwrap();

        session.handshake().await.unwrap();
        assert!(!session.is_lost());
        let still_fresh = tokio::time::timeout(Duration::from_millis(20), session.lost()).await;
        assert!(still_fresh.is_err());
    }

    #[tokio::test]
    async fn test_lost_wakes_waiter() {
        let mock = Arc::new(MockTransport::with_session("SESSION-1"));
        let session = Arc::new(session(&mock));
        session.handshake().await.unwrap();

        let waiter = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.lost().await }
        });
        tokio::task::yield_now().await;
        session.mark_lost();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let mock = Arc::new(MockTransport::with_session("SESSION-1"));
        let session = session(&mock);
        session.handshake().await.unwrap();

        session.release().await.unwrap();
        session.release().await.unwrap();

        assert!(!session.is_authenticated());
        assert_eq!(mock.calls_to(endpoints::RELEASE).len(), 1);
    }
}
