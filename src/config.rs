use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash_to_prime::NoncePolicy;
use crate::parallel::{Executor, DEFAULT_PARALLEL_THRESHOLD};

/// 128-bit security.
pub const DEFAULT_MODULUS_BITS: u32 = 3072;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 10;

const MIN_MODULUS_BITS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub modulus_bits: u32,
    pub batch_size: usize,
    /// Checkpoint every this many batches.
    pub checkpoint_interval: u64,
    pub nonce_policy: NoncePolicy,
    /// Worker threads; 0 uses rayon's default pool.
    pub threads: usize,
    /// Fewer work units than this run on the calling thread.
    pub parallel_threshold: usize,
    /// Cap on prime candidates sampled during setup. Unbounded if unset.
    pub setup_candidate_budget: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modulus_bits: DEFAULT_MODULUS_BITS,
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            nonce_policy: NoncePolicy::default(),
            threads: 0,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            setup_candidate_budget: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.modulus_bits < MIN_MODULUS_BITS || self.modulus_bits % 2 != 0 {
            return Err(Error::InvalidParameter(format!(
                "modulus_bits must be even and at least {MIN_MODULUS_BITS}, got {}",
                self.modulus_bits
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter("batch_size must be positive".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::InvalidParameter(
                "checkpoint_interval must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn executor(&self) -> Result<Executor> {
        Executor::new(self.threads, self.parallel_threshold)
    }
}
