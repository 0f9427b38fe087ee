use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tinyid_lease::{
    lease_allocator::DEFAULT_RESERVATION_SIZE,
    retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER},
    AllocatorConfig, RetryPolicy,
};

#[derive(Parser, Debug)]
#[command(name = "tinyid")]
#[command(bin_name = "tinyid")]
pub struct Cli {
    /// Identifiers reserved from the shared counter per refill
    #[arg(long, env = "TINYID_RESERVATION_SIZE", default_value_t = DEFAULT_RESERVATION_SIZE)]
    pub reservation_size: u64,

    /// Attempts per refill before giving up
    #[arg(long, env = "TINYID_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Delay before the first refill retry, in milliseconds
    #[arg(long, env = "TINYID_BASE_DELAY_MS", default_value = "200")]
    pub base_delay_ms: u64,

    #[arg(long, env = "TINYID_BACKOFF_MULTIPLIER", default_value_t = DEFAULT_MULTIPLIER)]
    pub backoff_multiplier: f64,

    /// Simulated round-trip latency of the shared counter, in milliseconds
    #[arg(long, env = "TINYID_STORE_LATENCY_MS", default_value = "0")]
    pub store_latency_ms: u64,

    #[command(subcommand)]
    pub commands: Commands,
}

impl Cli {
    pub fn allocator_config(&self) -> Result<AllocatorConfig> {
        let config = AllocatorConfig::new(self.reservation_size).with_retry(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.backoff_multiplier,
            max_delay: DEFAULT_MAX_DELAY,
            randomization_factor: 0.0,
        });
        config.validate()?;
        Ok(config)
    }

    pub fn store_latency(&self) -> Duration {
        Duration::from_millis(self.store_latency_ms)
    }

    pub fn version(&self) -> bool {
        matches!(self.commands, Commands::Version)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Issue identifiers from a single allocator
    Issue {
        #[arg(long = "count", short = 'n', default_value = "10")]
        count: usize,
    },
    /// Drive several allocators sharing one counter and check that every
    /// identifier issued is unique
    Load {
        #[arg(long, short = 'a', default_value = "4")]
        allocators: usize,

        #[arg(long, short = 'w', default_value = "32")]
        workers: usize,

        #[arg(long, short = 'r', default_value = "10000")]
        requests: usize,
    },
    Version,
}
