use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock};

use api::response::Author;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    user: Option<Author>,
}

/// Owner of the bearer token and the cached user profile.
///
/// Cloning shares the same state, so an eviction triggered by one request is
/// seen by every holder.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    inner: Arc<RwLock<AuthState>>,
}

impl AuthContext {
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        Self {
            inner: Arc::new(RwLock::new(AuthState { token, user: None })),
        }
    }

    /// Reads a token persisted by a previous login. Surrounding whitespace is ignored.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let token = fs::read_to_string(path.as_ref())?;
        debug!("[auth] token loaded from {}", path.as_ref().display());
        Ok(Self::new(Some(token.trim().to_string())))
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn set_token(&self, token: String) {
        if let Ok(mut state) = self.inner.write() {
            state.token = Some(token);
        }
    }

    pub fn user(&self) -> Option<Author> {
        self.inner.read().ok().and_then(|s| s.user.clone())
    }

    pub fn set_user(&self, user: Author) {
        if let Ok(mut state) = self.inner.write() {
            state.user = Some(user);
        }
    }

    /// Drops token and cached user, e.g. after the API rejected the token.
    pub fn evict(&self) {
        if let Ok(mut state) = self.inner.write()
            && (state.token.is_some() || state.user.is_some())
        {
            state.token = None;
            state.user = None;
            info!("[auth] credentials evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_token_is_anonymous() {
        assert!(!AuthContext::new(Some("  ".to_string())).is_authenticated());
        assert!(AuthContext::new(Some("abc".to_string())).is_authenticated());
    }

    #[test]
    fn test_evict_is_shared_between_clones() {
        let ctx = AuthContext::new(Some("abc".to_string()));
        let other = ctx.clone();
        other.set_user(Author {
            name: "mamadou".to_string(),
            avatar: None,
        });
        ctx.evict();
        assert_eq!(other.token(), None);
        assert_eq!(other.user(), None);
    }
}
