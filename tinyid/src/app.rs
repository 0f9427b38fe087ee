use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::{bail, Error, Result};
use tokio::{select, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use tinyid_lease::{
    metric_definitions::describe_metrics, AllocatorConfig, IdentifierStream, LeaseAllocator,
    MemoryCounter, ReadinessProbe,
};

use crate::{cli::Commands, initialize_stderr_logging, Cli};

const READINESS_INTERVAL: Duration = Duration::from_millis(250);

pub struct App {
    cli: Cli,
}

impl App {
    pub fn new(cli: Cli) -> Result<App> {
        Ok(App { cli })
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(&mut self) -> Result<()> {
        if self.cli.version() {
            println!("tinyid {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        initialize_stderr_logging();
        describe_metrics();

        let config = self.cli.allocator_config()?;
        let counter = MemoryCounter::new().with_latency(self.cli.store_latency());
        debug!(?config, "allocator config");

        let res = match self.cli.commands {
            Commands::Issue { count } => self.issue(counter, config, count).await,
            Commands::Load {
                allocators,
                workers,
                requests,
            } => {
                self.load(counter, config, allocators, workers, requests)
                    .await
            }
            Commands::Version => Ok(()),
        };
        if let Err(e) = res {
            error!(err = e.to_string());
            return Err(e);
        }
        Ok(())
    }

    async fn issue(
        &self,
        counter: MemoryCounter,
        config: AllocatorConfig,
        count: usize,
    ) -> Result<()> {
        let allocator = Arc::new(LeaseAllocator::new(Arc::new(counter), config)?);

        let cancel = CancellationToken::new();
        let probe = ReadinessProbe::spawn(allocator.clone(), READINESS_INTERVAL, cancel.clone());
        info!(readiness = %probe.current(), "identifier stream created");

        allocator.prime().await?;
        for _ in 0..count {
            let id = allocator.next().await?;
            println!("{id}");
        }

        cancel.cancel();
        probe.stopped().await;

        let stats = allocator.stats().await;
        info!(
            refills = stats.refills,
            issued = stats.issued,
            remaining = stats.remaining,
            "issued identifiers"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self, counter, config), err)]
    async fn load(
        &self,
        counter: MemoryCounter,
        config: AllocatorConfig,
        allocators: usize,
        workers: usize,
        requests: usize,
    ) -> Result<()> {
        if allocators == 0 || workers == 0 {
            bail!("at least one allocator and one worker are required");
        }

        // One allocator per simulated process, all contending on one counter
        let allocators = (0..allocators)
            .map(|_| LeaseAllocator::new(Arc::new(counter.clone()), config.clone()).map(Arc::new))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let cancel = CancellationToken::new();

        // Set up ctrl-c handler
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            select! {
                _ = ctrl_c_cancel.cancelled() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received ctrl-c, shutting down...");
                    ctrl_c_cancel.cancel();
                }
            }
        });

        let remaining = Arc::new(AtomicUsize::new(requests));
        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let allocator = allocators[worker % allocators.len()].clone();
            let worker_cancel = cancel.clone();
            let remaining = remaining.clone();
            tasks.spawn(async move {
                let mut ids = vec![];
                while !worker_cancel.is_cancelled()
                    && remaining
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok()
                {
                    ids.push(allocator.next_id().await?);
                }
                Ok::<_, Error>(ids)
            });
        }

        info!("Starting load...");
        let started = Instant::now();
        let mut seen = HashSet::with_capacity(requests);
        let mut duplicates = 0usize;
        let mut failure = None;
        while let Some(res) = tasks.join_next().await {
            match res? {
                Ok(ids) => {
                    if !ids.windows(2).all(|pair| pair[0] < pair[1]) {
                        failure.get_or_insert(Error::msg("worker observed a non-increasing id"));
                    }
                    for id in ids {
                        if !seen.insert(id) {
                            duplicates += 1;
                        }
                    }
                }
                Err(e) => {
                    cancel.cancel();
                    failure.get_or_insert(e);
                }
            }
        }
        let elapsed = started.elapsed();
        cancel.cancel();

        let mut refills = 0;
        for allocator in allocators.iter() {
            refills += allocator.stats().await.refills;
        }
        let per_sec = seen.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            issued = seen.len(),
            duplicates,
            refills,
            counter = counter.value(),
            elapsed_ms = elapsed.as_millis() as u64,
            per_sec = per_sec as u64,
            "load complete"
        );
        println!(
            "issued {} ids ({} duplicates) in {:?} with {} refills, counter at {}",
            seen.len(),
            duplicates,
            elapsed,
            refills,
            counter.value()
        );

        if let Some(e) = failure {
            return Err(e);
        }
        if duplicates > 0 {
            bail!("{duplicates} duplicate ids issued");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[tokio::test]
    async fn test_load_issues_unique_ids() {
        let cli = Cli::try_parse_from([
            "tinyid",
            "--reservation-size",
            "5",
            "--base-delay-ms",
            "1",
            "--max-attempts",
            "50",
            "load",
        ])
        .unwrap();
        let app = App::new(cli).unwrap();
        let counter = MemoryCounter::new();
        let config = app.cli.allocator_config().unwrap();

        app.load(counter.clone(), config, 3, 6, 300).await.unwrap();
        assert!(counter.value() >= 300);
    }

    #[tokio::test]
    async fn test_load_requires_workers() {
        let cli = Cli::try_parse_from(["tinyid", "load"]).unwrap();
        let app = App::new(cli).unwrap();
        let config = app.cli.allocator_config().unwrap();

        assert!(app
            .load(MemoryCounter::new(), config, 2, 0, 10)
            .await
            .is_err());
    }
}
