//! The virtual user: one worker looping build → send → check → record.
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::{sync::watch::Receiver, time::Instant};

use crate::{
    aggregate::ResultAggregator,
    check::CheckSet,
    error::{ParamError, TransportError},
    param::ParamStrategy,
    request::RequestBuilder,
    transport::{Response, Transport},
};

pub type WorkerId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Idle,
    Running,
    Stopped,
}

/// What a virtual user reports back when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker: WorkerId,
    pub iterations: u64,
}

/// Shared state handed to every virtual user of a run.
pub struct ExecutionContext<B, T> {
    pub builder: Arc<B>,
    pub checks: Arc<CheckSet>,
    pub transport: Arc<T>,
    pub aggregator: Arc<ResultAggregator>,
    /// Flips to `true` once the run is over.
    pub shutdown: Receiver<bool>,
    /// No iteration starts at or after this instant.
    pub deadline: Instant,
    pub pacing: Option<Duration>,
}

impl<B, T> Clone for ExecutionContext<B, T> {
    fn clone(&self) -> Self {
        Self {
            builder: Arc::clone(&self.builder),
            checks: Arc::clone(&self.checks),
            transport: Arc::clone(&self.transport),
            aggregator: Arc::clone(&self.aggregator),
            shutdown: self.shutdown.clone(),
            deadline: self.deadline,
            pacing: self.pacing,
        }
    }
}

enum Failure {
    Param(ParamError),
    BuilderPanicked,
    Transport(TransportError),
}

/// A single simulated client.
///
/// Cancellation is only observed at the top of the loop: once a request is
/// sent, it completes (or fails) and is recorded before the user stops.
pub struct VirtualUser<B, T, P> {
    id: WorkerId,
    state: UserState,
    ctx: ExecutionContext<B, T>,
    params: P,
}

impl<B, T, P> VirtualUser<B, T, P>
where
    B: RequestBuilder,
    T: Transport,
    P: ParamStrategy,
{
    pub fn new(id: WorkerId, ctx: ExecutionContext<B, T>, params: P) -> Self {
        Self {
            id,
            state: UserState::Idle,
            ctx,
            params,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> UserState {
        self.state
    }

    pub async fn run(&mut self) -> WorkerStats {
        self.state = UserState::Running;
        tracing::debug!("Worker {} started.", self.id);

        let mut iterations = 0;
        while !self.should_stop() {
            self.iterate().await;
            iterations += 1;

            match self.ctx.pacing {
                Some(pacing) => self.pace(pacing).await,
                // instant transports would otherwise never give the runtime back
                None => tokio::task::yield_now().await,
            }
        }

        self.state = UserState::Stopped;
        tracing::debug!("Worker {} shutting down after {iterations} iterations.", self.id);
        WorkerStats {
            worker: self.id,
            iterations,
        }
    }

    fn should_stop(&self) -> bool {
        *self.ctx.shutdown.borrow() || Instant::now() >= self.ctx.deadline
    }

    /// Sleeps for `pacing`, waking early on shutdown. A closed shutdown channel
    /// can never fire, so the full pause is taken instead.
    async fn pace(&mut self, pacing: Duration) {
        let wake = Instant::now() + pacing;
        let closed = tokio::select! {
            _ = tokio::time::sleep_until(wake) => false,
            res = self.ctx.shutdown.wait_for(|b| *b) => res.is_err(),
        };
        if closed {
            tokio::time::sleep_until(wake).await;
        }
    }

    async fn iterate(&mut self) {
        let outcome = self.send().await;
        let ctx = &self.ctx;
        match outcome {
            Ok((response, latency)) => {
                let results = ctx.checks.evaluate(&response);
                ctx.aggregator.record(&results, Some(latency));
            }
            Err(failure) => {
                match failure {
                    Failure::Param(e) => {
                        tracing::debug!("Worker {} could not build a request: {e}", self.id)
                    }
                    Failure::BuilderPanicked => {
                        tracing::error!("Worker {} request builder panicked.", self.id)
                    }
                    Failure::Transport(e) => {
                        tracing::debug!("Worker {} request failed: {e}", self.id)
                    }
                }
                ctx.aggregator.record_transport_failure(&ctx.checks.fail_all());
            }
        }
    }

    async fn send(&mut self) -> Result<(Response, Duration), Failure> {
        let builder = &self.ctx.builder;
        let params = &mut self.params;
        let request = panic::catch_unwind(AssertUnwindSafe(|| builder.build(params)))
            .map_err(|_| Failure::BuilderPanicked)?
            .map_err(Failure::Param)?;

        let start = Instant::now();
        let response = AssertUnwindSafe(self.ctx.transport.send(&request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(TransportError::Panicked))
            .map_err(Failure::Transport)?;
        Ok((response, start.elapsed()))
    }
}
