//! Orchestrator configuration

use kiln_runner::config::RunnerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Postgres connection string; records are kept in memory when absent
    pub database_url: Option<String>,

    pub runner: RunnerConfig,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// - KILN_BIND_ADDR (default: 0.0.0.0:<KILN_PORT>)
    /// - DATABASE_URL (optional)
    /// - plus everything read by [`RunnerConfig::from_env`]
    pub fn from_env() -> Self {
        let runner = RunnerConfig::from_env();
        let bind_addr = std::env::var("KILN_BIND_ADDR")
            .unwrap_or_else(|_| format!("0.0.0.0:{}", runner.port));
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self {
            bind_addr,
            database_url,
            runner,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bind_addr.is_empty() {
            return Err("bind_addr cannot be empty".to_string());
        }
        self.runner.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_covers_runner_settings() {
        let mut config = Config {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            runner: RunnerConfig::new("/srv/kiln"),
        };
        assert!(config.validate().is_ok());

        config.runner.port = 0;
        assert!(config.validate().is_err());

        config.runner.port = 8080;
        config.bind_addr.clear();
        assert!(config.validate().is_err());
    }
}
