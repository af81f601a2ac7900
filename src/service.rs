//! Top-level assembly of the running service.
//!
//! [`Service`] owns the single instances of the queue, the clone-URL cache,
//! the Stash client, the command runner and the worker pool, and wires them
//! together through constructors.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::CloneUrlCache;
use crate::config::Config;
use crate::exec::{CommandRunner, SystemRunner};
use crate::pipeline::{Dispatcher, PipelineContext, PipelineSettings};
use crate::scheduler::{PoolStats, TaskQueue, WorkerPool, WorkerPoolConfig};
use crate::stash::{SourceControl, StashClient};

/// The assembled service.
pub struct Service {
    queue: Arc<TaskQueue>,
    cache: Arc<CloneUrlCache>,
    pool: WorkerPool,
}

impl Service {
    /// Builds the service from configuration with the real Stash client and
    /// local process runner.
    ///
    /// # Errors
    ///
    /// Fails if the Stash client can't be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let stash = StashClient::new(
            config.stash.address.as_str(),
            config.stash.username.as_str(),
            config.stash.password.as_str(),
        )
        .context("can't create Stash client")?;

        Ok(Self::with_collaborators(
            config,
            Arc::new(stash),
            Arc::new(SystemRunner),
        ))
    }

    /// Builds the service around the given collaborators.
    pub fn with_collaborators(
        config: &Config,
        source_control: Arc<dyn SourceControl>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new(config.tasks.queue_capacity));
        let cache = Arc::new(CloneUrlCache::new());

        let context = PipelineContext::new(
            source_control,
            runner,
            Arc::clone(&cache),
            PipelineSettings::from_config(config),
        );
        let dispatcher = Dispatcher::new(Arc::new(context));

        let pool = WorkerPool::new(
            WorkerPoolConfig::new(config.tasks.threads)
                .with_shutdown_timeout(config.shutdown_timeout()),
            Arc::clone(&queue),
            Arc::new(dispatcher),
        );

        Self {
            queue,
            cache,
            pool,
        }
    }

    /// Starts the workers.
    pub fn start(&mut self) -> Result<()> {
        self.pool.start().context("can't start workers")?;
        info!(
            workers = self.pool.num_workers(),
            queue_capacity = self.queue.capacity(),
            "Service started"
        );
        Ok(())
    }

    /// Stops taking submissions and waits for running tasks to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.queue.close();
        if self.pool.is_running() {
            self.pool.shutdown().await.context("can't stop workers")?;
        }
        info!(
            pending = self.queue.pending(),
            cache_entries = self.cache.len(),
            "Service stopped"
        );
        Ok(())
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<CloneUrlCache> {
        &self.cache
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::default()
            .with_stash("https://git.example.com", "u", "p")
            .with_threads(2)
            .with_queue_capacity(16)
    }

    #[test]
    fn test_from_config() {
        let service = Service::from_config(&config()).expect("service");
        assert_eq!(service.queue().capacity(), 16);
        assert!(service.cache().is_empty());
        assert_eq!(service.stats().num_workers, 2);
    }

    #[test]
    fn test_from_config_bad_stash_address() {
        let config = config().with_stash("git.example.com", "u", "p");
        assert!(Service::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut service = Service::from_config(&config()).expect("service");
        service.start().expect("start");
        service.shutdown().await.expect("shutdown");
        assert!(service.queue().is_closed());
    }
}
