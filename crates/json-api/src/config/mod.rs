//! Server configuration module

use clap::Parser;

use crate::config::{
    db::DatabaseConfig,
    engine::EngineConfig,
    observability::{LoggingConfig, ObservabilityConfig},
    server::ServerRuntimeConfig,
};

pub(crate) mod db;
pub(crate) mod engine;
pub(crate) mod observability;
pub(crate) mod server;

/// Recoup JSON API Server configuration
#[derive(Debug, Parser)]
#[command(name = "recoup-json", about = "Recoup JSON API Server", long_about = None)]
pub struct ServerConfig {
    /// Server network settings.
    #[command(flatten)]
    pub server: ServerRuntimeConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Request observability settings.
    #[command(flatten)]
    pub observability: ObservabilityConfig,

    /// Application database settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Decision and evolution engine settings.
    #[command(flatten)]
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    /// Get the socket address for binding
    #[must_use]
    pub fn socket_addr(&self) -> String {
        self.server.socket_addr()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_apply_without_arguments() -> TestResult {
        let config = ServerConfig::try_parse_from(["recoup-json"])?;

        assert_eq!(config.server.port, 8698);
        assert_eq!(config.engine.store_timeout_ms, 150);
        assert!(
            (config.engine.exploit_rate - 0.9).abs() < f64::EPSILON,
            "default exploit rate is 0.9"
        );
        assert_eq!(config.observability.slow_request_threshold_ms, 1_000);
        assert_eq!(config.server.shutdown_grace().as_secs(), 10);

        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> TestResult {
        let config = ServerConfig::try_parse_from([
            "recoup-json",
            "--port",
            "9000",
            "--rng-seed",
            "42",
            "--log-format",
            "json",
            "--shutdown-grace-secs",
            "30",
        ])?;

        assert_eq!(config.socket_addr(), "0.0.0.0:9000");
        assert_eq!(config.engine.rng_seed, Some(42));
        assert_eq!(config.server.shutdown_grace().as_secs(), 30);

        Ok(())
    }
}
