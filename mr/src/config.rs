use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Worker counts for one job.
///
/// Missing fields fall back to the machine's available parallelism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_workers")]
    pub num_mapper: usize,
    #[serde(default = "default_workers")]
    pub num_reducer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_mapper: default_workers(),
            num_reducer: default_workers(),
        }
    }
}

impl EngineConfig {
    pub fn new(num_mapper: usize, num_reducer: usize) -> Self {
        EngineConfig {
            num_mapper,
            num_reducer,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_mapper == 0 {
            return Err(Error::Configuration("num_mapper must be at least 1".into()));
        }
        if self.num_reducer == 0 {
            return Err(Error::Configuration("num_reducer must be at least 1".into()));
        }
        Ok(())
    }

    /// Loads and validates a JSON config such as
    /// `{"num_mapper": 4, "num_reducer": 2}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}
