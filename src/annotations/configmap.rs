//! [`AnnotationStore`] backed by Kubernetes ConfigMaps.
//!
//! Each record is a ConfigMap in a fixed namespace, named after the
//! BuildConfig. The record's annotations and labels are the ConfigMap's own
//! `metadata.annotations` and `metadata.labels`. Updates replace the whole
//! object, so they start from the object as fetched: `data`, owner
//! references and any other field this store does not model survive.
//!
//! # Configuration
//!
//! ```toml
//! [kubernetes]
//! api_url = "https://kubernetes.default.svc"
//! namespace = "default"
//! token_file = "/var/run/secrets/kubernetes.io/serviceaccount/token"
//! ca_file = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::KubernetesConfig;
use crate::error::StoreError;

use super::{AnnotationRecord, AnnotationStore};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigMap {
    #[serde(default = "config_map_api_version")]
    api_version: String,
    #[serde(default = "config_map_kind")]
    kind: String,
    metadata: ConfigMapMeta,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigMapMeta {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_version: Option<String>,
}

fn config_map_api_version() -> String {
    "v1".to_string()
}

fn config_map_kind() -> String {
    "ConfigMap".to_string()
}

impl ConfigMap {
    fn from_record(record: &AnnotationRecord, namespace: &str) -> Self {
        Self {
            api_version: config_map_api_version(),
            kind: config_map_kind(),
            metadata: ConfigMapMeta {
                name: record.name.clone(),
                namespace: Some(namespace.to_string()),
                annotations: record.annotations.clone(),
                labels: record.labels.clone(),
                resource_version: record.resource_version.clone(),
            },
        }
    }

    fn decode(raw: Value) -> Result<AnnotationRecord, StoreError> {
        let config_map: ConfigMap =
            serde_json::from_value(raw.clone()).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(AnnotationRecord {
            name: config_map.metadata.name,
            annotations: config_map.metadata.annotations,
            labels: config_map.metadata.labels,
            resource_version: config_map.metadata.resource_version,
            stored: Some(raw),
        })
    }
}

/// The request body for writing `record`.
///
/// Starts from the stored object when there is one and writes the modelled
/// fields over it. Objects are merged one level deep, so `metadata` keeps
/// its other keys while `annotations` and `labels` are replaced whole.
fn request_body(record: &AnnotationRecord, namespace: &str) -> Result<Value, StoreError> {
    let modelled = match serde_json::to_value(ConfigMap::from_record(record, namespace)) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => return Err(StoreError::Decode(format!("unexpected encoding: {}", other))),
        Err(e) => return Err(StoreError::Decode(e.to_string())),
    };
    let mut body = match &record.stored {
        Some(Value::Object(fields)) => fields.clone(),
        _ => Map::new(),
    };
    for (key, value) in modelled {
        if let Value::Object(fields) = &value {
            if let Some(Value::Object(existing)) = body.get_mut(&key) {
                for (k, v) in fields {
                    existing.insert(k.clone(), v.clone());
                }
                continue;
            }
        }
        body.insert(key, value);
    }
    Ok(Value::Object(body))
}

pub struct ConfigMapStore {
    api: Url,
    namespace: String,
    http: reqwest::Client,
    token: Option<String>,
}

impl ConfigMapStore {
    pub fn new(config: &KubernetesConfig) -> Result<Self> {
        let api = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Kubernetes API URL: {}", config.api_url))?;
        if api.cannot_be_a_base() {
            bail!("Kubernetes API URL cannot be used as a base: {}", config.api_url);
        }

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file)
                .with_context(|| format!("Failed to read CA file: {}", ca_file.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid CA certificate: {}", ca_file.display()))?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            api,
            namespace: config.namespace.clone(),
            http: builder.build().context("Failed to build HTTP client")?,
            token: config.bearer_token()?,
        })
    }

    /// `{api}/api/v1/namespaces/{ns}/configmaps[/{name}]`
    fn url(&self, name: Option<&str>) -> Url {
        let mut url = self.api.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["api", "v1", "namespaces", self.namespace.as_str(), "configmaps"]);
            if let Some(name) = name {
                path.push(name);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, name: &str) -> Result<Response, StoreError> {
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Http {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }
}

#[async_trait]
impl AnnotationStore for ConfigMapStore {
    async fn get(&self, name: &str) -> Result<AnnotationRecord, StoreError> {
        let resp = self
            .send(self.request(Method::GET, self.url(Some(name))), name)
            .await?;
        let raw: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        ConfigMap::decode(raw)
    }

    async fn create(&self, record: &AnnotationRecord) -> Result<(), StoreError> {
        let body = request_body(record, &self.namespace)?;
        let req = self.request(Method::POST, self.url(None)).json(&body);
        self.send(req, &record.name).await?;
        Ok(())
    }

    async fn update(&self, record: &AnnotationRecord) -> Result<(), StoreError> {
        let body = request_body(record, &self.namespace)?;
        let req = self
            .request(Method::PUT, self.url(Some(&record.name)))
            .json(&body);
        self.send(req, &record.name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(api_url: &str) -> ConfigMapStore {
        ConfigMapStore::new(&KubernetesConfig {
            api_url: api_url.to_string(),
            namespace: "ci".to_string(),
            ..KubernetesConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let s = store("https://kube.example:6443");
        assert_eq!(
            s.url(None).as_str(),
            "https://kube.example:6443/api/v1/namespaces/ci/configmaps"
        );
        assert_eq!(
            s.url(Some("demo")).as_str(),
            "https://kube.example:6443/api/v1/namespaces/ci/configmaps/demo"
        );
    }

    #[test]
    fn test_config_map_wire_shape() {
        let mut record = AnnotationRecord::fresh("demo");
        record
            .annotations
            .insert("fabric8.io/git-clone-url".to_string(), "x".to_string());
        let json = request_body(&record, "ci").unwrap();
        assert_eq!(json["kind"], "ConfigMap");
        assert_eq!(json["metadata"]["namespace"], "ci");
        assert_eq!(json["metadata"]["labels"]["owner"], "jenkinshift");
        assert_eq!(json["metadata"]["annotations"]["fabric8.io/git-clone-url"], "x");
        assert!(json["metadata"].get("resourceVersion").is_none());
    }

    #[test]
    fn test_decode_config_map_without_annotations() {
        let raw = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "demo", "resourceVersion": "42" },
            "data": { "k": "v" }
        });
        let record = ConfigMap::decode(raw).unwrap();
        assert_eq!(record.name, "demo");
        assert!(record.annotations.is_empty());
        assert_eq!(record.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_update_body_keeps_unmodelled_fields() {
        let raw = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "fabric8",
                "namespace": "default",
                "resourceVersion": "7",
                "uid": "0f3c",
                "annotations": { "existing": "kept" },
                "ownerReferences": [{ "kind": "Deployment", "name": "console" }]
            },
            "data": { "fabric8-console": "important" },
            "binaryData": { "logo": "aGk=" }
        });
        let mut record = ConfigMap::decode(raw).unwrap();
        record.annotations.insert("a".to_string(), "1".to_string());

        let body = request_body(&record, "default").unwrap();
        assert_eq!(body["data"]["fabric8-console"], "important");
        assert_eq!(body["binaryData"]["logo"], "aGk=");
        assert_eq!(body["metadata"]["ownerReferences"][0]["name"], "console");
        assert_eq!(body["metadata"]["uid"], "0f3c");
        assert_eq!(body["metadata"]["resourceVersion"], "7");
        assert_eq!(body["metadata"]["annotations"]["existing"], "kept");
        assert_eq!(body["metadata"]["annotations"]["a"], "1");
    }

    #[test]
    fn test_removed_annotation_is_not_resurrected_from_stored_object() {
        let raw = serde_json::json!({
            "metadata": { "name": "demo", "annotations": { "old": "x" } }
        });
        let mut record = ConfigMap::decode(raw).unwrap();
        record.annotations.clear();
        record.annotations.insert("new".to_string(), "y".to_string());

        let body = request_body(&record, "ci").unwrap();
        assert_eq!(body["metadata"]["annotations"], serde_json::json!({ "new": "y" }));
        assert_eq!(body["kind"], "ConfigMap");
    }
}
