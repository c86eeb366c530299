use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Allowed browser origin; permissive CORS when unset.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("PERSPECTIVA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PERSPECTIVA_JWT_SECRET is unset or still a placeholder; it must match the identity provider's signing secret");
        }

        let host = var("PERSPECTIVA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("PERSPECTIVA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PERSPECTIVA_PORT is not a valid port")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("PERSPECTIVA_HOST is not a valid address")?;

        let db_path = var("PERSPECTIVA_DB_PATH")
            .unwrap_or_else(|| "perspectiva.db".into())
            .into();
        let cors_origin = var("PERSPECTIVA_CORS_ORIGIN").filter(|v| !v.is_empty());

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            cors_origin,
        })
    }
}
