//! CI job client abstraction and the Jenkins REST implementation.
//!
//! The [`JobClient`] trait is the translator's only view of the CI server.
//! [`JenkinsClient`] talks to a real Jenkins over HTTP; [`memory`] provides
//! an in-process implementation for tests and local runs.
//!
//! # Jenkins endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`list_jobs`](JobClient::list_jobs) | `GET /api/json?tree=jobs[name,url]` |
//! | [`get_job_config`](JobClient::get_job_config) | `GET /job/{name}/config.xml` |
//! | [`create_job`](JobClient::create_job) | `POST /createItem?name={name}` |
//! | [`update_job`](JobClient::update_job) | `POST /job/{name}/config.xml` |
//! | [`remove_job`](JobClient::remove_job) | `POST /job/{name}/doDelete` |

pub mod memory;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use crate::config::JenkinsConfig;
use crate::error::JobError;
use crate::job::{JobConfig, JobSummary};

/// Operations the translator needs from the CI server.
///
/// Implementations must be `Send + Sync`; one instance is shared by all
/// request handlers.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Lists every job on the server.
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobError>;

    /// Fetches and decodes a job's configuration.
    ///
    /// Returns [`JobError::NotFound`] when no job has this name.
    async fn get_job_config(&self, name: &str) -> Result<JobConfig, JobError>;

    async fn create_job(&self, job: &JobConfig, name: &str) -> Result<(), JobError>;

    async fn update_job(&self, job: &JobConfig, name: &str) -> Result<(), JobError>;

    /// Deletes a job. Returns [`JobError::NotFound`] when it does not exist.
    async fn remove_job(&self, name: &str) -> Result<(), JobError>;

    /// The job's URL path relative to the server root.
    fn job_url_path(&self, name: &str) -> String {
        format!("/job/{}", name)
    }
}

#[derive(Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<JobSummary>,
}

/// [`JobClient`] backed by the Jenkins REST API.
pub struct JenkinsClient {
    base: Url,
    http: reqwest::Client,
    credentials: Option<(String, String)>,
}

impl JenkinsClient {
    pub fn new(config: &JenkinsConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .with_context(|| format!("Invalid Jenkins URL: {}", config.url))?;
        if base.cannot_be_a_base() {
            bail!("Jenkins URL cannot be used as a base: {}", config.url);
        }

        let credentials = match (&config.username, &config.api_token) {
            (Some(user), Some(token)) => Some((user.clone(), token.clone())),
            (None, None) => None,
            _ => bail!("jenkins.username and jenkins.api_token must be set together"),
        };

        // Jenkins answers createItem/doDelete with redirects; they are
        // treated as success instead of being followed.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base,
            http,
            credentials,
        })
    }

    /// Builds `base/<segments...>`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.credentials {
            Some((user, token)) => req.basic_auth(user, Some(token)),
            None => req,
        }
    }

    /// Sends a request and maps transport and status failures.
    ///
    /// A 404 becomes [`JobError::NotFound`] for `job`.
    async fn send(&self, req: RequestBuilder, job: &str) -> Result<Response, JobError> {
        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() || status.is_redirection() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(JobError::NotFound(job.to_string()));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(JobError::Http {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn post_config(&self, url: Url, job: &JobConfig, name: &str) -> Result<(), JobError> {
        let xml = job.to_xml()?;
        let req = self
            .request(Method::POST, url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(xml);
        self.send(req, name).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> JobError {
    if err.is_connect() {
        JobError::Unreachable(err.to_string())
    } else {
        JobError::Transport(err.to_string())
    }
}

#[async_trait]
impl JobClient for JenkinsClient {
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobError> {
        let mut url = self.url(&["api", "json"]);
        url.query_pairs_mut().append_pair("tree", "jobs[name,url]");
        let resp = self.send(self.request(Method::GET, url), "").await?;
        let listing: JobsResponse = resp
            .json()
            .await
            .map_err(|e| JobError::Transport(format!("invalid job listing: {}", e)))?;
        Ok(listing.jobs)
    }

    async fn get_job_config(&self, name: &str) -> Result<JobConfig, JobError> {
        let url = self.url(&["job", name, "config.xml"]);
        let resp = self.send(self.request(Method::GET, url), name).await?;
        let xml = resp.text().await.map_err(transport_error)?;
        JobConfig::from_xml(&xml)
    }

    async fn create_job(&self, job: &JobConfig, name: &str) -> Result<(), JobError> {
        let mut url = self.url(&["createItem"]);
        url.query_pairs_mut().append_pair("name", name);
        self.post_config(url, job, name).await
    }

    async fn update_job(&self, job: &JobConfig, name: &str) -> Result<(), JobError> {
        let url = self.url(&["job", name, "config.xml"]);
        self.post_config(url, job, name).await
    }

    async fn remove_job(&self, name: &str) -> Result<(), JobError> {
        let url = self.url(&["job", name, "doDelete"]);
        self.send(self.request(Method::POST, url), name).await?;
        Ok(())
    }

    fn job_url_path(&self, name: &str) -> String {
        self.url(&["job", name]).path().to_string()
    }
}
