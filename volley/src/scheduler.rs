//! Runs the virtual users of a load test.
//!
//! The scheduler spawns exactly `virtual_users` workers, one tokio task each, and
//! lets them loop until the run deadline passes or the run is cancelled through a
//! [`CancelHandle`]. Shutdown is cooperative: a worker only looks at the shutdown
//! signal before starting an iteration, so a request in flight when the run ends
//! still completes and is counted.
//!
//! # High-level flow
//! 1. Validate the [`RunConfig`], the [`CheckSet`] and the [`RequestBuilder`].
//!    Nothing is spawned when any of them is invalid.
//! 2. Compute the deadline (`start + duration`) and build the shared
//!    [`ExecutionContext`].
//! 3. Spawn N workers, each with its own [`ParamStrategy`].
//! 4. Wait for the deadline or an explicit cancel, then broadcast shutdown.
//! 5. Join every worker and only then read the [`ResultAggregator`].
use std::sync::Arc;

use futures::future::join_all;
use tokio::{
    sync::watch::{self, Receiver, Sender},
    task::JoinHandle,
    time::Instant,
};

use crate::{
    aggregate::{ResultAggregator, RunResult},
    check::CheckSet,
    config::RunConfig,
    error::{ConfigError, RunError},
    param::{ParamStrategy, RandomParams},
    request::RequestBuilder,
    transport::Transport,
    user::{ExecutionContext, VirtualUser, WorkerId, WorkerStats},
};
use internals::*;

/// Stops a run early. Cloneable and usable from any task or thread.
///
/// Cancelling is permanent: a scheduler that was cancelled, before or during a
/// run, ends every later run immediately. A run that simply reaches its
/// deadline does not cancel the scheduler.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel: Arc<Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Runs virtual users for the duration of a [`RunConfig`].
///
/// ```rust,no_run
/// use std::time::Duration;
/// use volley::{
///     CheckSet, RequestSpec, Response, RunConfig, Scheduler, Transport, TransportError, check,
/// };
///
/// struct Local;
/// impl Transport for Local {
///     async fn send(&self, _: &RequestSpec) -> Result<Response, TransportError> {
///         Ok(Response::new(200))
///     }
/// }
///
/// # async fn demo() -> Result<(), volley::ConfigError> {
/// let config = RunConfig::builder().virtual_users(4).duration(Duration::from_secs(5)).build();
/// let scheduler = Scheduler::new(config);
/// let cancel = scheduler.cancel_handle();
/// tokio::spawn(async move {
///     tokio::time::sleep(Duration::from_secs(1)).await;
///     cancel.cancel();
/// });
///
/// let builder = |_: &mut dyn volley::ParamStrategy| {
///     Ok::<_, volley::ParamError>(RequestSpec::get("http://localhost:3000"))
/// };
/// let result = scheduler
///     .run(builder, CheckSet::new().check("is status 200", check::status_is(200)), Local)
///     .await?;
/// println!("{} requests", result.total_requests);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    config: RunConfig,
    /// Set only by [`CancelHandle::cancel`].
    cancel: Arc<Sender<bool>>,
}

impl Scheduler {
    pub fn new(config: RunConfig) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            config,
            cancel: Arc::new(tx),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Runs with [`RandomParams`], seeded per worker from [`RunConfig::seed`].
    pub async fn run<B, T>(
        &self,
        builder: B,
        checks: CheckSet,
        transport: T,
    ) -> Result<RunResult, ConfigError>
    where
        B: RequestBuilder + 'static,
        T: Transport + 'static,
    {
        let seed = self.config.seed;
        self.run_with_params(builder, checks, transport, move |worker| {
            RandomParams::for_worker(seed, worker)
        })
        .await
    }

    /// Runs with one parameter strategy per worker, created by `params`.
    pub async fn run_with_params<B, T, P, F>(
        &self,
        builder: B,
        checks: CheckSet,
        transport: T,
        params: F,
    ) -> Result<RunResult, ConfigError>
    where
        B: RequestBuilder + 'static,
        T: Transport + 'static,
        P: ParamStrategy + 'static,
        F: Fn(WorkerId) -> P,
    {
        self.config.validate()?;
        checks.validate()?;
        builder.validate()?;

        // Each run gets its own stop signal; only the cancel channel outlives it.
        let (stop, stopped) = watch::channel(*self.cancel.borrow());
        let started = Instant::now();
        let deadline = started + self.config.duration;
        let aggregator = Arc::new(ResultAggregator::for_checks(checks.names()));
        let ctx = ExecutionContext {
            builder: Arc::new(builder),
            checks: Arc::new(checks),
            transport: Arc::new(transport),
            aggregator: Arc::clone(&aggregator),
            shutdown: stopped,
            deadline,
            pacing: self.config.pacing,
        };

        tracing::info!("Spawning {} virtual users...", self.config.virtual_users);
        let handles = spawn_users(ctx, self.config.virtual_users, params);

        tracing::info!("Running for {:?}...", self.config.duration);
        wait_for_stop(self.cancel.subscribe(), deadline).await;
        stop.send_replace(true);

        tracing::info!("Draining virtual users...");
        let stats: Vec<WorkerStats> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|res| match res {
                Ok(stats) => Some(stats),
                Err(e) => {
                    // Whatever the worker recorded before dying is still in the aggregator
                    tracing::error!("Virtual user panicked with error: {e}");
                    None
                }
            })
            .collect();

        let mut result = aggregator.snapshot();
        result.worker_iterations = stats.iter().map(|s| (s.worker, s.iterations)).collect();
        result.elapsed = started.elapsed();

        if result.transport_failures > 0 {
            tracing::warn!(
                "{} of {} iterations got no response.",
                result.transport_failures,
                result.total_requests
            );
        }
        tracing::info!(
            "Done: {} requests in {:?}.",
            result.total_requests,
            result.elapsed
        );
        Ok(result)
    }
}

/// Runs `config` to completion. See [`Scheduler::run`].
pub async fn run<B, T>(
    config: RunConfig,
    builder: B,
    checks: CheckSet,
    transport: T,
) -> Result<RunResult, RunError>
where
    B: RequestBuilder + 'static,
    T: Transport + 'static,
{
    Ok(Scheduler::new(config)
        .run(builder, checks, transport)
        .await?)
}

/// Blocking version of [`run`] for callers outside of an async runtime.
///
/// Builds a multi-threaded tokio runtime for the duration of the run. Must not
/// be called from within a runtime.
pub fn run_blocking<B, T>(
    config: RunConfig,
    builder: B,
    checks: CheckSet,
    transport: T,
) -> Result<RunResult, RunError>
where
    B: RequestBuilder + 'static,
    T: Transport + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, builder, checks, transport))
}

#[cfg(feature = "internals")]
pub use internals::*;

mod internals {
    use super::*;

    /// Spawns one task per virtual user. Each task returns the user's stats.
    pub fn spawn_users<B, T, P, F>(
        ctx: ExecutionContext<B, T>,
        users: usize,
        params: F,
    ) -> Vec<JoinHandle<WorkerStats>>
    where
        B: RequestBuilder + 'static,
        T: Transport + 'static,
        P: ParamStrategy + 'static,
        F: Fn(WorkerId) -> P,
    {
        (0..users)
            .map(|i| {
                let mut user = VirtualUser::new(i, ctx.clone(), params(i));
                tracing::debug!("Worker {i} spawned.");
                tokio::spawn(async move { user.run().await })
            })
            .collect()
    }

    /// Resolves once the deadline passes or shutdown is signalled. A closed
    /// channel can no longer signal, so only the deadline counts then.
    pub async fn wait_for_stop(mut shutdown: Receiver<bool>, deadline: Instant) {
        let cancelled = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => false,
            res = shutdown.wait_for(|b| *b) => res.is_ok(),
        };
        if cancelled {
            tracing::debug!("Run cancelled.");
        } else {
            tokio::time::sleep_until(deadline).await;
            tracing::debug!("Run deadline reached.");
        }
    }
}
