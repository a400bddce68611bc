use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, PoisonError, RwLock};

/// Holder of the access token attached to network fetches.
pub trait Credentials: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn set_access_token(&self, token: String);
}

pub type CredentialsHandle = Arc<dyn Credentials>;

/// A token kept in memory.
#[derive(Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self { token: RwLock::new(token) }
    }
}

impl Credentials for StaticCredentials {
    fn access_token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_access_token(&self, token: String) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }
}

// Never print the token itself.
impl Debug for StaticCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StaticCredentials")
            .field("token", &self.access_token().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_access_token() {
        let credentials = StaticCredentials::default();
        assert_eq!(credentials.access_token(), None);
        credentials.set_access_token("pk.one".to_string());
        credentials.set_access_token("pk.two".to_string());
        assert_eq!(credentials.access_token().as_deref(), Some("pk.two"));
        assert!(!format!("{credentials:?}").contains("pk.two"));
    }
}
