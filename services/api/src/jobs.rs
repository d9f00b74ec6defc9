//! HTTP client for the diagram job queue.

use anyhow::{Context, Result};
use async_trait::async_trait;
use explainer_core::diagram::{DiagramResult, DiagramTask, JobQueue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct EnqueueRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct TaskStatus {
    ready: bool,
}

/// Upper bound for enqueue and status requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to a job queue exposing `POST /tasks`, `GET /tasks/{id}` and
/// `GET /tasks/{id}/result`.
pub struct HttpJobQueue {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpJobQueue {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bounds enqueue and status requests. Result fetches use the timeout
    /// passed by the caller.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn task_url(&self, task: &DiagramTask) -> String {
        format!("{}/tasks/{}", self.base_url, task.task_id)
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn enqueue(&self, prompt: &str) -> Result<DiagramTask> {
        let task = self
            .http
            .post(format!("{}/tasks", self.base_url))
            .json(&EnqueueRequest { prompt })
            .timeout(self.request_timeout)
            .send()
            .await
            .context("Could not reach the diagram queue")?
            .error_for_status()?
            .json::<DiagramTask>()
            .await
            .context("Unexpected enqueue response")?;
        Ok(task)
    }

    async fn is_ready(&self, task: &DiagramTask) -> Result<bool> {
        let status = self
            .http
            .get(self.task_url(task))
            .timeout(self.request_timeout)
            .send()
            .await
            .context("Diagram status request failed")?
            .error_for_status()?
            .json::<TaskStatus>()
            .await?;
        Ok(status.ready)
    }

    async fn result(&self, task: &DiagramTask, timeout: Duration) -> Result<DiagramResult> {
        let result = self
            .http
            .get(format!("{}/result", self.task_url(task)))
            .timeout(timeout)
            .send()
            .await
            .context("Diagram result request failed")?
            .error_for_status()?
            .json::<DiagramResult>()
            .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    #[tokio::test]
    async fn test_enqueue_poll_and_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .and(body_json(json!({"prompt": "a pulley"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "abc"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": true})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/abc/result"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "success", "data": "https://cdn/abc.png"})),
            )
            .mount(&server)
            .await;

        let queue = HttpJobQueue::new(server.uri());
        let task = queue.enqueue("a pulley").await.unwrap();
        assert_eq!(task, DiagramTask::new("abc"));
        assert!(queue.is_ready(&task).await.unwrap());
        assert_eq!(
            queue.result(&task, Duration::from_secs(1)).await.unwrap(),
            DiagramResult::Success("https://cdn/abc.png".into())
        );
    }

    #[tokio::test]
    async fn test_failed_job_and_slow_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/bad/result"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "error", "data": "syntax error"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/slow/result"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let queue = HttpJobQueue::new(server.uri());
        assert_eq!(
            queue
                .result(&DiagramTask::new("bad"), Duration::from_secs(1))
                .await
                .unwrap(),
            DiagramResult::Error("syntax error".into())
        );
        assert!(
            queue
                .result(&DiagramTask::new("slow"), Duration::from_millis(100))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_enqueue_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(HttpJobQueue::new(server.uri()).enqueue("x").await.is_err());
    }

    #[tokio::test]
    async fn test_slow_enqueue_and_status_requests_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"task_id": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/late"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ready": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let queue = HttpJobQueue::new(server.uri()).with_request_timeout(Duration::from_millis(100));
        assert!(queue.enqueue("a pulley").await.is_err());
        assert!(queue.is_ready(&DiagramTask::new("late")).await.is_err());
    }
}
