//! Hammers the task list endpoint with 20 virtual users for 20 seconds.
//!
//! ```sh
//! TASKS_TOKEN=<jwt> cargo run --example task_list
//! ```
//!
//! `TASKS_BASE_URL` overrides the target host. Log levels follow `RUST_LOG`,
//! e.g. `RUST_LOG=volley=debug`.
use std::{env, time::Duration};

use tracing_subscriber::EnvFilter;
use volley::{
    CheckSet, Cookie, HttpTransport, ParamError, ParamStrategy, RequestSpec, RunConfig, Summary,
    check,
};

const FEDERATION_UUID: &str = "cb06b506-f46f-4bf4-9edb-2b12b1367681";
const PROJECT_UUID: &str = "8784f657-0f21-459e-b305-29a0cbda796e";
const LIMIT: u32 = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let base = env::var("TASKS_BASE_URL").unwrap_or_else(|_| "https://oviovi.site".to_string());
    // Never check the token in; it is injected per run.
    let token = env::var("TASKS_TOKEN").ok();

    let list_tasks = move |params: &mut dyn ParamStrategy| -> Result<RequestSpec, ParamError> {
        let status = params.int_between(0, 1)?;
        let is_epic = status == 1;
        let name = params.alphanumeric(1)?;
        let url = format!(
            "{base}/api/task?federation_uuid={FEDERATION_UUID}&is_epic={is_epic}\
             &project_uuid={PROJECT_UUID}&status={status}&limit={LIMIT}&name={name}"
        );

        let mut request = RequestSpec::get(url);
        if let Some(token) = &token {
            request = request.with_cookie("TOKEN", Cookie::new(token.clone()));
        }
        Ok(request)
    };

    let checks = CheckSet::new()
        .check("is status 200", check::status_is(200))
        .check("is found", check::json_number_gt("count", 0.0));

    let config = RunConfig::builder()
        .virtual_users(20)
        .duration(Duration::from_secs(20))
        .build();

    let transport = HttpTransport::builder()
        .timeout(Duration::from_secs(10))
        .build();

    let result = volley::run(config, list_tasks, checks, transport).await?;
    println!("{:#?}", Summary::from(&result));
    Ok(())
}
