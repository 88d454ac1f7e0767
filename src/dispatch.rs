//! Stand-in for the real queue/broker/worker-pool lifecycle, which is an external
//! collaborator out of scope for this crate. This in-process registry is the minimal
//! "submit(payload) -> task_id" / "fetch(task_id) -> state" implementation needed to run
//! the HTTP surface end to end. A production deployment swaps this for a broker (the
//! original implementation used Celery) without touching `JobCoordinator`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::coordinator::{JobCoordinator, TaskResult};

#[derive(Debug, Clone)]
pub enum JobState {
    Pending,
    Done(TaskResult),
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, JobState>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits a code-only job, spawning the coordinator's future onto the Tokio
    /// runtime. Returns the freshly generated job id.
    pub async fn submit_code(
        self: &Arc<Self>,
        coordinator: Arc<JobCoordinator>,
        language: String,
        source: String,
    ) -> Uuid {
        let job_id = Uuid::new_v4();
        self.jobs.lock().await.insert(job_id, JobState::Pending);

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let result = coordinator.run_code(&language, &source).await;
            registry
                .jobs
                .lock()
                .await
                .insert(job_id, JobState::Done(result));
        });

        job_id
    }

    /// Submits a code-with-files job. `job_id` is generated by the caller ahead of time
    /// because input files must already be staged under `<STORAGE_IN>/<JobId>/` before
    /// the coordinator runs.
    pub async fn submit_code_with_files(
        self: &Arc<Self>,
        coordinator: Arc<JobCoordinator>,
        job_id: Uuid,
        language: String,
        rewritten_source: String,
        declared_outputs: Vec<String>,
    ) {
        self.jobs.lock().await.insert(job_id, JobState::Pending);

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let result = coordinator
                .run_code_with_files(&language, &rewritten_source, job_id, &declared_outputs)
                .await;
            registry
                .jobs
                .lock()
                .await
                .insert(job_id, JobState::Done(result));
        });
    }

    pub async fn fetch(&self, job_id: Uuid) -> Option<JobState> {
        self.jobs.lock().await.get(&job_id).cloned()
    }
}
