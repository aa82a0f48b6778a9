//! Bearer identity attached to outgoing requests.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// The single bearer value currently in use.
///
/// Starts as the configured long-lived credential. A session token may
/// replace it; [`Identity::clear`] goes back to the credential. Clones share
/// the same cell, so the transport always sees the latest write.
#[derive(Clone)]
pub struct Identity {
    inner: Arc<IdentityInner>,
}

struct IdentityInner {
    credential: String,
    session: RwLock<Option<String>>,
}

impl Identity {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(IdentityInner {
                credential: credential.into(),
                session: RwLock::new(None),
            }),
        }
    }

    /// Replace the active bearer value. In-flight requests keep the value
    /// they were sent with.
    pub fn set(&self, token: impl Into<String>) {
        *self.inner.session.write() = Some(token.into());
    }

    /// Restore the configured credential.
    pub fn clear(&self) {
        *self.inner.session.write() = None;
    }

    /// The value to send right now.
    pub fn current(&self) -> String {
        self.inner
            .session
            .read()
            .clone()
            .unwrap_or_else(|| self.inner.credential.clone())
    }

    pub fn is_session(&self) -> bool {
        self.inner.session.read().is_some()
    }

    pub(crate) fn bearer_header(&self) -> String {
        format!("Bearer {}", self.current())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("session", &self.is_session())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_overrides_then_restores() {
        let identity = Identity::new("key-123");
        assert_eq!(identity.current(), "key-123");
        assert!(!identity.is_session());

        identity.set("sess-1");
        identity.set("sess-2");
        assert_eq!(identity.current(), "sess-2");
        assert!(identity.is_session());

        identity.clear();
        assert_eq!(identity.current(), "key-123");
        assert_eq!(identity.bearer_header(), "Bearer key-123");
    }

    #[test]
    fn clones_share_state() {
        let identity = Identity::new("key");
        let seen_by_transport = identity.clone();
        identity.set("sess");
        assert_eq!(seen_by_transport.current(), "sess");
    }

    #[test]
    fn debug_hides_secrets() {
        let identity = Identity::new("super-secret");
        identity.set("also-secret");
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains("secret"));
    }
}
