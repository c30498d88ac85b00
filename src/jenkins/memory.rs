//! In-memory [`JobClient`] for tests and local runs without a CI server.
//!
//! Jobs live in a `BTreeMap` behind `std::sync::RwLock`, so listings come
//! back sorted by name. The client can be switched into an "unreachable"
//! state to exercise connection-failure handling.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::JobError;
use crate::job::{JobConfig, JobSummary};

use super::JobClient;

pub struct InMemoryJobClient {
    jobs: RwLock<BTreeMap<String, JobConfig>>,
    unreachable: AtomicBool,
}

impl InMemoryJobClient {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Seeds a job, replacing any job with the same name.
    pub fn insert(&self, name: &str, job: JobConfig) {
        self.jobs.write().unwrap().insert(name.to_string(), job);
    }

    /// Returns a copy of a stored job's configuration.
    pub fn job(&self, name: &str) -> Option<JobConfig> {
        self.jobs.read().unwrap().get(name).cloned()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs.read().unwrap().keys().cloned().collect()
    }

    /// Makes every subsequent call fail with [`JobError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), JobError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(JobError::Unreachable("no such host".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryJobClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobClient for InMemoryJobClient {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobError> {
        self.check_reachable()?;
        let jobs = self.jobs.read().unwrap();
        Ok(jobs
            .keys()
            .map(|name| JobSummary {
                name: name.clone(),
                url: format!("memory:{}", self.job_url_path(name)),
            })
            .collect())
    }

    async fn get_job_config(&self, name: &str) -> Result<JobConfig, JobError> {
        self.check_reachable()?;
        self.job(name)
            .ok_or_else(|| JobError::NotFound(name.to_string()))
    }

    async fn create_job(&self, job: &JobConfig, name: &str) -> Result<(), JobError> {
        self.check_reachable()?;
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(name) {
            return Err(JobError::Http {
                status: 400,
                body: format!("A job already exists with the name '{}'", name),
            });
        }
        jobs.insert(name.to_string(), job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &JobConfig, name: &str) -> Result<(), JobError> {
        self.check_reachable()?;
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(name) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(JobError::NotFound(name.to_string())),
        }
    }

    async fn remove_job(&self, name: &str) -> Result<(), JobError> {
        self.check_reachable()?;
        match self.jobs.write().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(JobError::NotFound(name.to_string())),
        }
    }
}
