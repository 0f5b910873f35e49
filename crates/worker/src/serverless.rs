//! Adapter for the serverless job queue.
//!
//! Takes one job at a time from the job-take webhook, runs the handler,
//! and posts the output (or the error) back. When the webhook
//! environment is absent the worker falls back to a one-shot local mode
//! driven by `RUNPOD_TEST_INPUT`, so the pipeline stays runnable without
//! queue credentials.

use std::time::Duration;

use serde::Deserialize;

use crate::handler::{JobHandler, JobRequest};

/// Delay between polls when the queue has no work.
const IDLE_POLL_DELAY: Duration = Duration::from_millis(500);

/// Webhook endpoints and worker identity read from the environment.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Job-take URL; `$ID` is replaced with the pod id.
    pub get_job_url: String,
    /// Result URL; `$ID` is replaced with the job id.
    pub post_output_url: String,
    /// Bearer token for both webhooks.
    pub api_key: String,
    /// Identity of this worker instance.
    pub pod_id: String,
}

impl QueueConfig {
    /// Read `RUNPOD_WEBHOOK_GET_JOB`, `RUNPOD_WEBHOOK_POST_OUTPUT`,
    /// `RUNPOD_AI_API_KEY` and `RUNPOD_POD_ID` from the environment.
    /// Returns `None` when any is absent.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            get_job_url: std::env::var("RUNPOD_WEBHOOK_GET_JOB").ok()?,
            post_output_url: std::env::var("RUNPOD_WEBHOOK_POST_OUTPUT").ok()?,
            api_key: std::env::var("RUNPOD_AI_API_KEY").ok()?,
            pod_id: std::env::var("RUNPOD_POD_ID").ok()?,
        })
    }
}

/// One job document as delivered by the job-take webhook.
#[derive(Debug, Deserialize)]
pub struct JobDocument {
    /// Queue-assigned job identifier.
    pub id: String,
    #[serde(flatten)]
    pub request: JobRequest,
}

/// Poll the queue and process jobs indefinitely.
///
/// This function never returns under normal operation. Job failures are
/// reported back to the queue and never crash the loop.
pub async fn run(client: &reqwest::Client, queue: &QueueConfig, handler: &JobHandler) {
    tracing::info!(pod_id = %queue.pod_id, "Polling for jobs");

    loop {
        if !run_once(client, queue, handler).await {
            tokio::time::sleep(IDLE_POLL_DELAY).await;
        }
    }
}

/// Take and process at most one job. Returns `true` when a job was
/// processed, `false` when the queue was idle or the fetch failed.
pub async fn run_once(
    client: &reqwest::Client,
    queue: &QueueConfig,
    handler: &JobHandler,
) -> bool {
    match take_job(client, queue).await {
        Ok(Some(job)) => {
            process_job(client, queue, handler, job).await;
            true
        }
        Ok(None) => false,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch job from queue");
            false
        }
    }
}

/// Fetch the next job, if any. HTTP 204/404 mean an empty queue.
async fn take_job(
    client: &reqwest::Client,
    queue: &QueueConfig,
) -> Result<Option<JobDocument>, reqwest::Error> {
    let url = queue.get_job_url.replace("$ID", &queue.pod_id);
    let response = client
        .get(&url)
        .bearer_auth(&queue.api_key)
        .send()
        .await?;

    let status = response.status();
    match status.as_u16() {
        204 | 404 => Ok(None),
        _ if status.is_success() => Ok(Some(response.json().await?)),
        _ => {
            tracing::warn!(status = status.as_u16(), "Unexpected status from job-take");
            Ok(None)
        }
    }
}

/// Run one job and report its result to the output webhook.
async fn process_job(
    client: &reqwest::Client,
    queue: &QueueConfig,
    handler: &JobHandler,
    job: JobDocument,
) {
    tracing::info!(job_id = %job.id, "Processing job");

    let body = match handler.handle(job.request).await {
        Ok(output) => serde_json::json!({ "output": output }),
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "Job failed");
            serde_json::json!({ "error": e.to_string() })
        }
    };

    let url = queue.post_output_url.replace("$ID", &job.id);
    if let Err(e) = client
        .post(&url)
        .bearer_auth(&queue.api_key)
        .json(&body)
        .send()
        .await
    {
        tracing::error!(job_id = %job.id, error = %e, "Failed to post job result");
    }
}

/// One-shot local mode: run a single job parsed from `raw` and print
/// the result as JSON to stdout. Returns `false` when the input was
/// malformed or the job failed, so the caller can exit nonzero.
pub async fn run_local(handler: &JobHandler, raw: &str) -> bool {
    let job: JobRequest = match serde_json::from_str(raw) {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(error = %e, "RUNPOD_TEST_INPUT is not valid JSON");
            return false;
        }
    };

    match handler.handle(job).await {
        Ok(output) => {
            let json =
                serde_json::to_string_pretty(&output).expect("JobOutput is always serialisable");
            println!("{json}");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Local job failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_document_parses_top_level_and_nested_fields() {
        let doc: JobDocument = serde_json::from_value(json!({
            "id": "job-1",
            "endpoint": "img2img",
            "input": {"prompt": "a cat"},
        }))
        .expect("job document should parse");

        assert_eq!(doc.id, "job-1");
        assert_eq!(doc.request.endpoint.as_deref(), Some("img2img"));
        assert_eq!(doc.request.input["prompt"], "a cat");
    }

    #[test]
    fn job_document_endpoint_is_optional() {
        let doc: JobDocument = serde_json::from_value(json!({
            "id": "job-2",
            "input": {},
        }))
        .expect("job document should parse");

        assert!(doc.request.endpoint.is_none());
    }
}
