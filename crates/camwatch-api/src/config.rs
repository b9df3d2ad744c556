//! API configuration.

use camwatch_core::ConfigSource;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Serve Prometheus metrics at /metrics
    pub metrics_enabled: bool,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            cors_origins: vec!["*".to_string()],
            max_body_size: 64 * 1024,
            metrics_enabled: true,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from the options file and environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&ConfigSource::load())
    }

    pub fn from_source(source: &ConfigSource) -> Self {
        let defaults = Self::default();

        Self {
            host: source.string("http_host").unwrap_or(defaults.host),
            port: source.get("http_port").unwrap_or(defaults.port),
            cors_origins: source
                .string("cors_origins")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.cors_origins),
            max_body_size: source.get("max_body_size").unwrap_or(defaults.max_body_size),
            metrics_enabled: source
                .string("metrics_enabled")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(defaults.metrics_enabled),
            environment: source.string("environment").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
