//! BuildConfig operations realised against CI jobs.
//!
//! The [`Translator`] holds no state of its own: a shared [`JobClient`] and
//! an [`AnnotationOverlay`] are injected at construction, and every call
//! goes straight to them. Nothing is retried; one failed remote call fails
//! the operation.
//!
//! # Writes and annotations
//!
//! Create and update write the job first. Annotations are persisted only
//! after the job write succeeds, and a failure to persist them never turns
//! the operation into an error. It is reported instead through
//! [`WriteOutcome::annotation_warning`].

use std::sync::Arc;

use crate::annotations::AnnotationOverlay;
use crate::error::{JobError, TranslateError};
use crate::jenkins::JobClient;
use crate::job::build_pipeline_job;
use crate::models::{BuildConfig, JENKINS_URL_PATH_ANNOTATION};
use crate::scm::extract;

/// Result of a create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub build_config: BuildConfig,
    /// Set when the job was written but its annotations could not be.
    pub annotation_warning: Option<String>,
}

#[derive(Clone)]
pub struct Translator {
    jobs: Arc<dyn JobClient>,
    annotations: AnnotationOverlay,
}

impl Translator {
    pub fn new(jobs: Arc<dyn JobClient>, annotations: AnnotationOverlay) -> Self {
        Self { jobs, annotations }
    }

    /// Lists the BuildConfigs of every job with a recognised kind.
    ///
    /// An unreachable CI host yields an empty list. Jobs that fail to load
    /// are logged and skipped.
    pub async fn list(&self, namespace: &str) -> Result<Vec<BuildConfig>, TranslateError> {
        let jobs = match self.jobs.list_jobs().await {
            Ok(jobs) => jobs,
            Err(JobError::Unreachable(msg)) => {
                tracing::warn!(error = %msg, "CI server unreachable, listing no BuildConfigs");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut build_configs = Vec::with_capacity(jobs.len());
        for job in jobs {
            match self.load(namespace, &job.name).await {
                Ok(Some(bc)) => build_configs.push(bc),
                Ok(None) => tracing::debug!(job = %job.name, "skipping job of unrecognised kind"),
                Err(e) => tracing::warn!(job = %job.name, error = %e, "failed to load job"),
            }
        }
        Ok(build_configs)
    }

    /// Fetches the BuildConfig for job `name`.
    pub async fn get(&self, namespace: &str, name: &str) -> Result<BuildConfig, TranslateError> {
        if name.is_empty() {
            return Err(TranslateError::Validation(
                "No BuildConfig name specified in URL".to_string(),
            ));
        }
        self.load(namespace, name).await?.ok_or_else(|| {
            TranslateError::NotFound(format!("No BuildConfig could be found for job {}", name))
        })
    }

    /// Creates the job backing `build_config`, then stores its annotations.
    pub async fn create(
        &self,
        namespace: &str,
        mut build_config: BuildConfig,
    ) -> Result<WriteOutcome, TranslateError> {
        if build_config.metadata.namespace.is_empty() {
            build_config.metadata.namespace = namespace.to_string();
        }
        let name = build_config.metadata.name.clone();
        if name.is_empty() {
            return Err(TranslateError::Validation(
                "No BuildConfig name specified in the body".to_string(),
            ));
        }

        let source = build_config.source_descriptor();
        let job = build_pipeline_job(&source);
        tracing::info!(job = %name, uri = %source.uri, git_ref = %source.git_ref, "creating pipeline job");
        self.jobs.create_job(&job, &name).await?;

        Ok(self.finish_write(build_config).await)
    }

    /// Rewrites job `name` from `build_config`, then stores its annotations.
    ///
    /// The path name wins over whatever name the body carries.
    pub async fn update(
        &self,
        namespace: &str,
        name: &str,
        mut build_config: BuildConfig,
    ) -> Result<WriteOutcome, TranslateError> {
        if name.is_empty() {
            return Err(TranslateError::Validation(
                "No BuildConfig name specified in URL".to_string(),
            ));
        }
        build_config.metadata.name = name.to_string();
        if build_config.metadata.namespace.is_empty() {
            build_config.metadata.namespace = namespace.to_string();
        }

        let source = build_config.source_descriptor();
        let job = build_pipeline_job(&source);
        tracing::info!(job = %name, namespace, uri = %source.uri, git_ref = %source.git_ref, "updating pipeline job");
        self.jobs.update_job(&job, name).await?;

        Ok(self.finish_write(build_config).await)
    }

    /// Deletes job `name`. Stored annotations are left in place.
    pub async fn delete(&self, name: &str) -> Result<(), TranslateError> {
        if name.is_empty() {
            return Err(TranslateError::Validation(
                "No BuildConfig name specified in URL".to_string(),
            ));
        }
        self.jobs.remove_job(name).await?;
        tracing::info!(job = %name, "removed job");
        Ok(())
    }

    /// Builds the BuildConfig for one job.
    ///
    /// `Ok(None)` means the job exists but its kind has no BuildConfig form.
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<BuildConfig>, TranslateError> {
        let job = self.jobs.get_job_config(name).await?;
        let Some(scm) = job.scm() else {
            tracing::debug!(job = %name, kind = job.kind(), "unrecognised job kind");
            return Ok(None);
        };

        let mut bc = BuildConfig::new(namespace, name, &extract(scm));
        bc.metadata.annotations.insert(
            JENKINS_URL_PATH_ANNOTATION.to_string(),
            self.jobs.job_url_path(name),
        );
        self.annotations
            .load(name, &mut bc.metadata.annotations)
            .await;
        Ok(Some(bc))
    }

    async fn finish_write(&self, build_config: BuildConfig) -> WriteOutcome {
        let name = &build_config.metadata.name;
        let annotation_warning = match self
            .annotations
            .merge(name, &build_config.metadata.annotations)
            .await
        {
            Ok(outcome) => {
                tracing::debug!(job = %name, ?outcome, "merged annotations");
                None
            }
            Err(e) => {
                tracing::warn!(job = %name, error = %e, "job written but annotations were not stored");
                Some(format!("annotations for {} were not stored: {}", name, e))
            }
        };
        WriteOutcome {
            build_config,
            annotation_warning,
        }
    }
}
