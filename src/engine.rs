//! Job lifecycle: start, stop, and the fault boundary around a running job.

use crate::api::{DiscordApi, HttpClient, Snowflake};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::deletion::{ChannelOutcome, DeletionLoop};
use crate::enumerator::ChannelEnumerator;
use crate::error::{ApiError, EngineError};
use crate::events::{EngineEvent, EventSink, EventStream, JobOutcome};
use crate::filter::AuthorFilter;
use crate::job::{DeletionJob, JobContext, Scope};
use crate::ratelimit::{RateLimitGovernor, RateLimitPolicy, Sleeper, TokioSleeper};
use futures::FutureExt;
use secrecy::SecretString;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Builds the API client for a job from its credential.
pub type ApiFactory =
    Arc<dyn Fn(SecretString) -> Result<Arc<dyn DiscordApi>, ApiError> + Send + Sync>;

/// Final tally of a job, also returned by [`JobHandle::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub total_deleted: u64,
    pub outcome: JobOutcome,
}

/// Caller's side of a running job.
pub struct JobHandle {
    id: Uuid,
    scope: Scope,
    cancel: CancellationToken,
    events: EventStream,
    task: JoinHandle<JobSummary>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Request a cooperative stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token that stops this job, for use from another task (e.g. a signal handler).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the job has finished and the stream is drained.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    pub async fn wait(self) -> Result<JobSummary, EngineError> {
        self.task
            .await
            .map_err(|e| EngineError::Join(e.to_string()))
    }
}

/// Runs at most one deletion job at a time.
pub struct Engine {
    api_factory: ApiFactory,
    sleeper: Arc<dyn Sleeper>,
    pacing: Duration,
    policy: RateLimitPolicy,
    active: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        let api_config = config.api.clone();
        Self {
            api_factory: Arc::new(move |token| {
                let client = HttpClient::new(&api_config, token)?;
                Ok(Arc::new(client) as Arc<dyn DiscordApi>)
            }),
            sleeper: Arc::new(TokioSleeper),
            pacing: Duration::from_millis(config.engine.pacing_ms),
            policy: config.engine.rate_limit_policy(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_api_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(SecretString) -> Result<Arc<dyn DiscordApi>, ApiError> + Send + Sync + 'static,
    {
        self.api_factory = Arc::new(factory);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether a job is currently running.
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawn a deletion job. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        scope: Scope,
        user_id: Snowflake,
        credential: SecretString,
    ) -> Result<JobHandle, EngineError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::JobActive);
        }

        let api = match (self.api_factory)(credential) {
            Ok(api) => api,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let job = DeletionJob::new(scope, user_id);
        let (events, rx) = EventSink::channel();
        let cancel = CancellationToken::new();
        let ctx = JobContext::new(
            api,
            RateLimitGovernor::new(self.pacing, self.sleeper.clone()),
            AuthorFilter::new(user_id),
            events,
            cancel.clone(),
            self.policy,
        );

        let id = job.id;
        let task = tokio::spawn(run_job(job, ctx, self.active.clone()));

        Ok(JobHandle {
            id,
            scope,
            cancel,
            events: rx,
            task,
        })
    }

    /// Request a cooperative stop of `handle`'s job.
    pub fn stop(&self, handle: &JobHandle) {
        handle.stop();
    }
}

async fn run_job(job: DeletionJob, mut ctx: JobContext, active: Arc<AtomicBool>) -> JobSummary {
    info!(job = %job.id, scope = %job.scope, user = %job.user_id, "job started");

    let result = AssertUnwindSafe(execute(&job, &mut ctx))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => fail(&ctx, &job, e.to_string()),
        Err(panic) => fail(&ctx, &job, panic_message(panic.as_ref())),
    };
    let total_deleted = ctx.deleted();

    // Released before `finished` so the caller can start the next job on it
    active.store(false, Ordering::SeqCst);
    ctx.events.finished(total_deleted, outcome.clone());

    info!(
        job = %job.id,
        outcome = outcome.as_str(),
        total_deleted,
        "job finished"
    );
    JobSummary {
        job_id: job.id,
        total_deleted,
        outcome,
    }
}

async fn execute(job: &DeletionJob, ctx: &mut JobContext) -> Result<JobOutcome, ApiError> {
    match job.scope {
        Scope::Channel(channel_id) => {
            let label = format!("channel {}", channel_id);
            let outcome = DeletionLoop::new(ctx, channel_id, label).run().await?;
            Ok(match outcome {
                ChannelOutcome::Purged | ChannelOutcome::Skipped => JobOutcome::Completed,
                ChannelOutcome::Aborted { status } => {
                    JobOutcome::Failed(format!("failed to fetch messages: {}", status))
                }
                ChannelOutcome::Stopped => JobOutcome::Cancelled,
            })
        }
        Scope::Guild(guild_id) => ChannelEnumerator::new(guild_id).run(ctx).await,
    }
}

fn fail(ctx: &JobContext, job: &DeletionJob, reason: String) -> JobOutcome {
    error!(job = %job.id, "job failed: {}", reason);
    ctx.events.status(format!("Job failed: {}", reason));
    JobOutcome::Failed(reason)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
