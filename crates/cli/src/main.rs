//! `retouch` -- submit one image for retouching and save the result.
//!
//! # Environment variables
//!
//! | Variable                       | Required | Default     | Description                        |
//! |--------------------------------|----------|-------------|------------------------------------|
//! | `RETOUCH_API_BASE_URL`         | yes      | --          | Backend base URL                   |
//! | `RETOUCH_BACKEND`              | no       | `job-queue` | `job-queue`, `comfyui`, `deployment` |
//! | `RETOUCH_API_AUTH_TOKEN`       | no       | --          | Bearer token                       |
//! | `RETOUCH_DEPLOYMENT_ID`        | for `deployment` | --  | Hosted deployment id               |
//! | `RETOUCH_REQUEST_TIMEOUT_SECS` | no       | --          | Per-request transport timeout      |
//! | `RETOUCH_WORKFLOW_TEMPLATE`    | no       | built-in    | Alternate workflow graph file      |
//! | `RETOUCH_POLL_INTERVAL_MS`     | no       | `4000`      | Delay between status polls         |
//! | `RETOUCH_POLL_START_DELAY_MS`  | no       | `1000`      | Delay before the first poll        |
//! | `RETOUCH_PROGRESS_TICK_MS`     | no       | `200`       | Synthetic progress period          |
//! | `RETOUCH_PROGRESS_CAP`         | no       | `90`        | Synthetic progress ceiling         |

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use retouch_backend::{BackendConfig, BackendKind, SubmitRequest};
use retouch_cli::args::Args;
use retouch_cli::{input, output};
use retouch_session::{ControllerConfig, ControllerState, JobController};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retouch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let backend_config = BackendConfig::from_env()?;
    let controller_config = ControllerConfig::from_env()?;

    let image = if args.is_remote_image() {
        anyhow::ensure!(
            backend_config.kind == BackendKind::Deployment,
            "remote image URLs are only supported by the deployment backend"
        );
        args.image.clone()
    } else {
        input::load_image(Path::new(&args.image))?
    };

    tracing::info!(
        backend = %backend_config.kind,
        input = %args.image,
        pro = args.pro,
        "Starting retouch",
    );

    let backend = retouch_backend::connect(&backend_config)?;
    let controller = JobController::new(backend, controller_config)?;

    let request = SubmitRequest::new(image)
        .with_options(args.options())
        .with_settings(args.settings())
        .pro(args.pro);

    let outcome = run(&controller, request).await;
    controller.dispose();
    let output_image = outcome?;

    let client = reqwest::Client::new();
    let written = output::save_output(
        &client,
        &output_image,
        &args.output,
        backend_config.base_url.as_str(),
        backend_config.auth_token.as_deref(),
    )
    .await?;

    tracing::info!(path = %args.output.display(), bytes = written, "Result saved");
    Ok(())
}

/// Submit, follow the job to a terminal state, and return its output image.
async fn run(controller: &JobController, request: SubmitRequest) -> anyhow::Result<String> {
    let mut updates = controller.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let job_id = tokio::select! {
        result = controller.submit(request) => result.context("submission failed")?,
        _ = &mut ctrl_c => {
            controller.cancel();
            anyhow::bail!("interrupted before the backend accepted the job");
        }
    };
    tracing::info!(job_id = %job_id, "Job submitted");

    let mut last_state = ControllerState::Submitting;
    let mut last_decile = 0;
    let snapshot = loop {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.state.is_terminal() {
            break snapshot;
        }
        if snapshot.state != last_state || snapshot.progress / 10 != last_decile {
            tracing::info!(
                job_id = %job_id,
                state = %snapshot.state,
                progress = snapshot.progress,
                "Job progress",
            );
            last_state = snapshot.state;
            last_decile = snapshot.progress / 10;
        }

        tokio::select! {
            changed = updates.changed() => changed.context("controller stopped publishing")?,
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::warn!(job_id = %job_id, "Interrupted; cancelling job");
                controller.cancel();
            }
        }
    };

    match snapshot.state {
        ControllerState::Done => snapshot
            .output_image
            .context("job finished without an output image"),
        ControllerState::Cancelled => anyhow::bail!("job {job_id} was cancelled"),
        _ => anyhow::bail!(
            "job {job_id} failed: {}",
            snapshot.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}
