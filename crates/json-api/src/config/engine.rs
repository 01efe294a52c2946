//! Engine Config

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Args;
use thiserror::Error;

use recoup::genes::{GenePool, GenePoolError};
use recoup_app::context::EngineSettings;

/// Errors raised while turning engine flags into settings.
#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("failed to read gene pool file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse gene pool file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: GenePoolError,
    },
}

/// Decision and evolution engine settings.
#[derive(Debug, Args)]
pub struct EngineConfig {
    /// Bound on each serving-path store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 150_u64)]
    pub store_timeout_ms: u64,

    /// Probability of serving an available champion rather than exploring
    #[arg(long, env = "EXPLOIT_RATE", default_value_t = 0.9_f64)]
    pub exploit_rate: f64,

    /// Seed for reproducible decisions and evolution cycles
    #[arg(long, env = "RNG_SEED")]
    pub rng_seed: Option<u64>,

    /// YAML file replacing the built-in gene pool
    #[arg(long, env = "GENE_POOL_PATH")]
    pub gene_pool_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Resolve the flags into engine settings, reading the gene pool file if one is set.
    ///
    /// # Errors
    ///
    /// Returns an error when the gene pool file cannot be read or parsed.
    pub fn settings(&self) -> Result<EngineSettings, EngineConfigError> {
        let gene_pool = match &self.gene_pool_path {
            Some(path) => load_gene_pool(path)?,
            None => GenePool::default(),
        };

        Ok(EngineSettings {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            exploit_rate: self.exploit_rate,
            rng_seed: self.rng_seed,
            gene_pool,
        })
    }
}

fn load_gene_pool(path: &Path) -> Result<GenePool, EngineConfigError> {
    let document = fs::read_to_string(path).map_err(|source| EngineConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    GenePool::from_yaml(&document).map_err(|source| EngineConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn engine_config(gene_pool_path: Option<PathBuf>) -> EngineConfig {
        EngineConfig {
            store_timeout_ms: 75,
            exploit_rate: 0.5,
            rng_seed: Some(3),
            gene_pool_path,
        }
    }

    #[test]
    fn settings_carry_flags_and_default_pool() -> TestResult {
        let settings = engine_config(None).settings()?;

        assert_eq!(settings.store_timeout, Duration::from_millis(75));
        assert_eq!(settings.rng_seed, Some(3));
        assert_eq!(settings.gene_pool, GenePool::default());

        Ok(())
    }

    #[test]
    fn missing_gene_pool_file_is_reported() {
        let result = engine_config(Some(PathBuf::from("/nonexistent/recoup/pool.yaml"))).settings();

        assert!(
            matches!(result, Err(EngineConfigError::Read { .. })),
            "expected a read error, got {result:?}"
        );
    }
}
