use anyhow::{Context, Result};

/// Deployment-time settings, read once at startup. `.env` is loaded before
/// this runs, so either real environment or dotfile works.
pub struct Config {
    pub jwt_secret: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    /// Origins allowed CORS/credentialed access. `*` means permissive.
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret =
            std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
        let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
        let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("PARLEY_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let allowed_origins =
            parse_origins(&std::env::var("PARLEY_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".into()));

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            allowed_origins,
        })
    }

    pub fn permit_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
