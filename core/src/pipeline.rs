//! Start a delivery pipeline and wait for its execution to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::Level;
use serde_json::json;

use crate::errors::{DeployError, Result, ServiceResult};
use crate::logging::log_event;
use crate::poll::{Deadline, PollSettings};

const MODULE: &str = "deckhand::pipeline";
const EXECUTION_NOT_FOUND: &str = "PipelineExecutionNotFoundException";

/// Statuses that keep the runner waiting.
pub const WAITING_STATUSES: &[&str] = &["InProgress", "Stopping"];

/// Final statuses reported as a failure.
pub const FAILED_STATUSES: &[&str] = &["Failed", "Superseded", "Stopped", "Cancelled"];

/// How long a freshly started execution may stay invisible.
pub const EXECUTION_LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Overall limit for one execution.
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(600);

#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Returns the execution id.
    async fn start_execution(&self, pipeline_name: &str) -> ServiceResult<String>;

    /// Current status of an execution. An unknown execution is reported with
    /// the `PipelineExecutionNotFoundException` code.
    async fn execution_status(&self, pipeline_name: &str, execution_id: &str) -> ServiceResult<String>;
}

pub struct PipelineRunner {
    api: Arc<dyn PipelineApi>,
}

impl PipelineRunner {
    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    /// Start `pipeline_name` and return its final status once the execution
    /// leaves the waiting statuses. A failed final status is an error.
    pub async fn start_pipeline_and_wait_for_success(
        &self,
        pipeline_name: &str,
        interval: Duration,
    ) -> Result<String> {
        let execution_id = self.api.start_execution(pipeline_name).await?;
        log_event(
            Level::Info,
            Some("CPL-0100"),
            MODULE,
            "pipeline started",
            Some(json!({ "pipeline": pipeline_name, "execution_id": execution_id })),
        );

        let poll = PollSettings::new(interval, EXECUTION_TIMEOUT);
        let status = self
            .wait_for_final_status(pipeline_name, &execution_id, &poll)
            .await?;

        if FAILED_STATUSES.contains(&status.as_str()) {
            return Err(DeployError::PipelineFailed {
                pipeline: pipeline_name.to_string(),
                status,
            });
        }
        log_event(
            Level::Info,
            Some("CPL-0200"),
            MODULE,
            "pipeline finished",
            Some(json!({ "pipeline": pipeline_name, "status": status })),
        );
        Ok(status)
    }

    async fn wait_for_final_status(
        &self,
        pipeline_name: &str,
        execution_id: &str,
        poll: &PollSettings,
    ) -> Result<String> {
        let deadline = poll.deadline(format!("pipeline {pipeline_name}"));
        loop {
            deadline.check()?;
            let status = self
                .current_status(pipeline_name, execution_id, poll)
                .await?;
            log::info!(target: MODULE, "Current status of {pipeline_name} is {status}");
            if !WAITING_STATUSES.contains(&status.as_str()) {
                return Ok(status);
            }
            poll.pause().await;
        }
    }

    /// Sleep one interval, then read the status. Executions can take a
    /// moment to become visible after start, so not-found is retried.
    async fn current_status(
        &self,
        pipeline_name: &str,
        execution_id: &str,
        poll: &PollSettings,
    ) -> Result<String> {
        let lookup = Deadline::after(EXECUTION_LOOKUP_TIMEOUT, "pipeline execution lookup");
        while !lookup.expired() {
            poll.pause().await;
            match self.api.execution_status(pipeline_name, execution_id).await {
                Ok(status) => return Ok(status),
                Err(err) if err.has_code(EXECUTION_NOT_FOUND) => {
                    log::info!(target: MODULE, "{err}");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(DeployError::PipelineExecutionNotFound {
            pipeline: pipeline_name.to_string(),
            execution_id: execution_id.to_string(),
            secs: EXECUTION_LOOKUP_TIMEOUT.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::errors::ServiceError;

    const PIPELINE: &str = "pipeline";
    const EXECUTION_ID: &str = "id";

    struct FakePipeline {
        statuses: Mutex<VecDeque<ServiceResult<String>>>,
        starts: Mutex<Vec<String>>,
        gets: Mutex<Vec<(String, String)>>,
    }

    impl FakePipeline {
        fn new(statuses: impl IntoIterator<Item = ServiceResult<String>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into_iter().collect()),
                starts: Mutex::new(Vec::new()),
                gets: Mutex::new(Vec::new()),
            }
        }

        fn get_calls(&self) -> usize {
            self.gets.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PipelineApi for FakePipeline {
        async fn start_execution(&self, pipeline_name: &str) -> ServiceResult<String> {
            self.starts.lock().unwrap().push(pipeline_name.to_string());
            Ok(EXECUTION_ID.to_string())
        }

        async fn execution_status(&self, pipeline_name: &str, execution_id: &str) -> ServiceResult<String> {
            self.gets
                .lock()
                .unwrap()
                .push((pipeline_name.to_string(), execution_id.to_string()));
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses.front().cloned().unwrap()
            }
        }
    }

    fn status(value: &str) -> ServiceResult<String> {
        Ok(value.to_string())
    }

    fn not_found() -> ServiceResult<String> {
        Err(ServiceError::with_code(
            EXECUTION_NOT_FOUND,
            format!("Pipeline Execution with id {EXECUTION_ID} does not exist in pipeline with name {PIPELINE}"),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_the_pipeline_succeeds() {
        let api = Arc::new(FakePipeline::new([status("InProgress"), status("Succeeded")]));

        let status = PipelineRunner::new(api.clone())
            .start_pipeline_and_wait_for_success(PIPELINE, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(status, "Succeeded");
        assert_eq!(*api.starts.lock().unwrap(), vec![PIPELINE.to_string()]);
        assert_eq!(api.get_calls(), 2);
        assert!(api
            .gets
            .lock()
            .unwrap()
            .iter()
            .all(|(name, id)| name == PIPELINE && id == EXECUTION_ID));
    }

    #[tokio::test(start_paused = true)]
    async fn reports_a_failed_pipeline() {
        let api = Arc::new(FakePipeline::new([status("InProgress"), status("Failed")]));

        let err = PipelineRunner::new(api.clone())
            .start_pipeline_and_wait_for_success(PIPELINE, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Pipeline pipeline has final status Failed");
        assert_eq!(api.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_waiting_while_stopping() {
        let api = Arc::new(FakePipeline::new([
            status("InProgress"),
            status("Stopping"),
            status("Stopped"),
        ]));

        let err = PipelineRunner::new(api.clone())
            .start_pipeline_and_wait_for_success(PIPELINE, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::PipelineFailed { ref status, .. } if status == "Stopped"));
        assert_eq!(api.get_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_while_the_execution_is_not_visible() {
        let api = Arc::new(FakePipeline::new([not_found(), status("Succeeded")]));

        PipelineRunner::new(api.clone())
            .start_pipeline_and_wait_for_success(PIPELINE, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(api.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_on_an_execution_that_never_appears() {
        let api = Arc::new(FakePipeline::new([not_found()]));

        let err = PipelineRunner::new(api.clone())
            .start_pipeline_and_wait_for_success(PIPELINE, Duration::from_secs(7))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Can't find execution id id for pipeline pipeline after 60 secs."
        );
        assert_eq!(api.get_calls(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn other_provider_errors_are_not_retried() {
        let api = Arc::new(FakePipeline::new([Err(ServiceError::new("AccessDenied"))]));

        let err = PipelineRunner::new(api.clone())
            .start_pipeline_and_wait_for_success(PIPELINE, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Service(_)));
        assert_eq!(api.get_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_on_a_pipeline_that_never_finishes() {
        let api = Arc::new(FakePipeline::new([status("InProgress")]));

        let err = PipelineRunner::new(api)
            .start_pipeline_and_wait_for_success(PIPELINE, Duration::from_secs(30))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Timeout { .. }));
    }
}
