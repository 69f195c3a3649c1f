use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

/// Client configuration: application settings plus the session token
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
    token: Option<String>,
}

impl Config {
    /// Defaults, optional TOML file, then environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::from_app(AppConfig::load()?))
    }

    pub fn from_app(app: AppConfig) -> Self {
        Self { app, token: None }
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::from_app(builder.build()?))
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn get_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn server_url(&self) -> &str {
        &self.app.server_url
    }

    /// Get the full URL for an API endpoint on the configured server
    pub fn api_url(&self, path: &str) -> String {
        build_url(self.server_url(), path)
    }
}

/// Drop a trailing slash and a trailing `/api` from a base URL
pub fn normalize_base_url(base: &str) -> &str {
    let base = base.strip_suffix('/').unwrap_or(base);
    base.strip_suffix("/api").unwrap_or(base)
}

/// Join a base URL and an endpoint, making sure the path sits under `/api/`
pub fn build_url(base: &str, endpoint: &str) -> String {
    let base = normalize_base_url(base);
    let endpoint = if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{}", endpoint)
    };
    if endpoint.starts_with("/api/") {
        format!("{}{}", base, endpoint)
    } else {
        format!("{}/api{}", base, endpoint)
    }
}
