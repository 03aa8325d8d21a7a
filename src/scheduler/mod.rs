use anyhow::{Context, Result};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

/// Fires at second zero of every minute.
pub const EVERY_MINUTE: &str = "0 * * * * *";

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Background job runner owned by one bot instance.
///
/// There is no stop operation: jobs keep firing until the process exits.
pub struct Scheduler {
    owner: String,
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new(owner: &str) -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .with_context(|| format!("Failed to create job scheduler for {}", owner))?;
        Ok(Self {
            owner: owner.to_string(),
            inner,
        })
    }

    /// Run `task` on the one-minute tick, named `<owner>/<name>` in logs.
    pub async fn every_minute<F>(&self, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        self.add_job(EVERY_MINUTE, name, task).await
    }

    async fn add_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let label = format!("{}/{}", self.owner, name);
        let job = Job::new_async(cron_expr, {
            let label = label.clone();
            move |_uuid, _lock| {
                let label = label.clone();
                let run = task();
                Box::pin(async move {
                    let started = Instant::now();
                    run.await;
                    debug!("{} finished in {:?}", label, started.elapsed());
                })
            }
        })
        .with_context(|| format!("Invalid schedule '{}' for {}", cron_expr, label))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to register {}", label))?;
        info!("{} runs on '{}'", label, cron_expr);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .with_context(|| format!("Failed to start scheduler for {}", self.owner))?;
        info!("Scheduler for {} started", self.owner);
        Ok(())
    }
}
