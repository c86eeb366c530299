use async_trait::async_trait;

/// Source of the signed-in user's email. Session lifecycle belongs to the
/// identity provider; this is only asked, never managed.
#[async_trait]
pub trait Identity: Send + Sync {
    async fn user_email(&self) -> Option<String>;
}

/// A session handed over by the identity provider after sign-in.
#[derive(Debug, Clone, Default)]
pub struct Session {
    email: Option<String>,
    token: Option<String>,
}

impl Session {
    pub fn signed_in(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Bearer token for mutating requests.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[async_trait]
impl Identity for Session {
    async fn user_email(&self) -> Option<String> {
        self.email.clone()
    }
}
