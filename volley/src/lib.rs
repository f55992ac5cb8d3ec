//! Volley: the core of an HTTP load-test driver.
//!
//! Volley runs a fixed number of virtual users for a fixed time. Each virtual
//! user loops: build a request, send it, run named checks against the response
//! and record the outcome. At the end the counters of every user are returned as
//! one [`RunResult`].
//!
//! # Architecture
//!
//! - [`RequestBuilder`]: produces a [`RequestSpec`] per iteration, drawing random
//!   values from a [`ParamStrategy`]. [`TemplateRequest`] covers the common case of
//!   a URL template with randomized query parameters.
//! - [`Transport`]: sends a [`RequestSpec`] and returns a [`Response`]. Volley never
//!   speaks HTTP itself; [`HttpTransport`] adapts `reqwest` (feature `http`).
//! - [`CheckSet`]: ordered, named predicates evaluated against every response.
//! - [`VirtualUser`]: one worker running the build → send → check → record loop.
//! - [`Scheduler`]: spawns the users, stops them at the deadline or on cancel and
//!   collects the [`RunResult`].
//! - [`ResultAggregator`]: the counters shared by every user of a run.
//! - [`Summary`]: percentiles and ratios derived from a [`RunResult`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use volley::{
//!     CheckSet, HttpTransport, ParamSpec, RunConfig, Summary, TemplateRequest, UrlTemplate,
//!     check,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = TemplateRequest::get(UrlTemplate::parse(
//!         "http://localhost:3000/api/items?page={page}&q={q}",
//!     )?)
//!     .param("page", ParamSpec::IntBetween(1, 10))
//!     .param("q", ParamSpec::Alphanumeric(1));
//!
//!     let checks = CheckSet::new()
//!         .check("is status 200", check::status_is(200))
//!         .check("is found", check::json_number_gt("count", 0.0));
//!
//!     let config = RunConfig::builder()
//!         .virtual_users(10)
//!         .duration(Duration::from_secs(30))
//!         .build();
//!
//!     let result = volley::run(config, request, checks, HttpTransport::default()).await?;
//!     println!("{:#?}", Summary::from(&result));
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! - `http`: the `reqwest` backed [`HttpTransport`]. (Enabled by default)
//! - `internals`: exposes the scheduler's building blocks (`spawn_users`,
//!   `wait_for_stop`) for custom run loops.
//!
//! # Logging
//!
//! Volley logs through `tracing` and never installs a subscriber. Run lifecycle
//! events are `info`, per-worker and per-iteration events are `debug`.

/// Shared counters and the final run result
pub mod aggregate;
/// Named response assertions and the built-in predicates
pub mod check;
/// Run configuration
pub mod config;
/// Error types
pub mod error;
/// Randomness behind request parameters
pub mod param;
/// Request descriptions and how they are built
pub mod request;
/// Runs virtual users to completion
pub mod scheduler;
/// Statistics derived from a finished run
pub mod summary;
/// The boundary to the system under test
pub mod transport;
/// The per-worker request loop
pub mod user;

pub use aggregate::{ResultAggregator, RunResult};
pub use check::{CheckResult, CheckSet};
pub use config::RunConfig;
pub use error::{CheckError, ConfigError, ParamError, RunError, TransportError};
pub use param::{ParamStrategy, RandomParams, ScriptedParams};
pub use request::{Cookie, ParamSpec, RequestBuilder, RequestSpec, TemplateRequest, UrlTemplate};
pub use scheduler::{CancelHandle, Scheduler, run, run_blocking};
pub use summary::{LatencySummary, Summary};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{Response, Transport};
pub use user::{ExecutionContext, UserState, VirtualUser, WorkerId, WorkerStats};
