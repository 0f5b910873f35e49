//! `sdworker` -- serverless forwarding worker for a local Stable
//! Diffusion WebUI instance.
//!
//! Waits for the WebUI API to come up, then takes jobs from the queue,
//! forwards them to `/sdapi/v1/<endpoint>`, writes the returned images
//! to the shared volume, and answers with one fetchable URL per image.
//!
//! # Environment variables
//!
//! | Variable                    | Required | Default | Description                          |
//! |-----------------------------|----------|---------|--------------------------------------|
//! | `AUTOMATIC_API_URL`         | no       | `http://127.0.0.1:3000/sdapi/v1` | WebUI API base |
//! | `VOLUME_ROOT`               | no       | `/runpod-volume` | Shared volume mount point   |
//! | `DEFAULT_ENDPOINT`          | no       | `txt2img` | Endpoint when a job names none     |
//! | `ENDPOINT_SOURCE`           | no       | `event` | `event` or `input`                   |
//! | `PUBLISH_BACKEND`           | no       | `runpod`| `runpod`, `s3` or `uploadthing`      |
//! | `RUNPOD_WEBHOOK_GET_JOB`    | no       | --      | Job-take webhook (`$ID` = pod id)    |
//! | `RUNPOD_WEBHOOK_POST_OUTPUT`| no       | --      | Result webhook (`$ID` = job id)      |
//! | `RUNPOD_AI_API_KEY`         | no       | --      | Bearer token for the queue webhooks  |
//! | `RUNPOD_POD_ID`             | no       | --      | Identity of this worker instance     |
//! | `RUNPOD_TEST_INPUT`         | no       | --      | One-shot job JSON when no queue is configured |
//!
//! Publisher credentials (`RUNPOD_VOLUME_ID`, `RUNPOD_API_KEY`,
//! `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY`, `S3_REGION`,
//! `S3_ENDPOINT_URL`, `UPLOADTHING_API_KEY`) are read by the selected
//! strategy; when absent, placeholder URLs are returned instead.

use sdworker::config::{PublishBackend, WorkerConfig};
use sdworker::handler::JobHandler;
use sdworker::serverless;

use sdworker_automatic::api::AutomaticApi;
use sdworker_automatic::probe;
use sdworker_publish::{RunpodPublisher, S3Publisher, UploadthingPublisher, UrlPublisher};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sdworker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();

    tracing::info!(
        api_url = %config.api_url,
        volume_root = %config.volume_root.display(),
        backend = ?config.publish_backend,
        "Starting sdworker",
    );

    // One pooled client, shared by the WebUI calls, the queue webhooks
    // and the HTTP-based publishers.
    let client = reqwest::Client::new();

    probe::wait_for_service(&client, &config.api_url).await;
    tracing::info!("WebUI API service is ready, starting serverless worker");

    let api = AutomaticApi::with_client(client.clone(), config.api_url.clone());

    let publisher: Box<dyn UrlPublisher> = match config.publish_backend {
        PublishBackend::Runpod => Box::new(RunpodPublisher::from_env(client.clone())),
        PublishBackend::S3 => Box::new(S3Publisher::from_env()),
        PublishBackend::Uploadthing => Box::new(UploadthingPublisher::from_env(
            client.clone(),
            config.volume_root.clone(),
        )),
    };

    let handler = JobHandler::new(
        api,
        publisher,
        config.volume_root,
        config.default_endpoint,
        config.endpoint_source,
    );

    match serverless::QueueConfig::from_env() {
        Some(queue) => serverless::run(&client, &queue, &handler).await,
        None => {
            let raw = std::env::var("RUNPOD_TEST_INPUT").unwrap_or_else(|_| {
                tracing::error!(
                    "No queue webhooks configured and RUNPOD_TEST_INPUT is unset"
                );
                std::process::exit(1);
            });
            if !serverless::run_local(&handler, &raw).await {
                std::process::exit(1);
            }
        }
    }
}
