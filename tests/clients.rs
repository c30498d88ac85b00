//! Integration tests for the HTTP-backed clients.
//!
//! `JenkinsClient` and `ConfigMapStore` are pointed at a small axum server
//! that records every request and answers with canned statuses, so the
//! status mapping, auth headers and request bodies are checked on the wire.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use jenkinshift::annotations::configmap::ConfigMapStore;
use jenkinshift::annotations::{AnnotationOverlay, AnnotationRecord, AnnotationStore, MergeOutcome};
use jenkinshift::config::{JenkinsConfig, KubernetesConfig};
use jenkinshift::error::{JobError, StoreError};
use jenkinshift::jenkins::{JenkinsClient, JobClient};
use jenkinshift::job::build_pipeline_job;
use jenkinshift::scm::{extract, ScmDescriptor};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;

// ─── Recording stub ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    uri: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

type Responder = fn(&Method, &str) -> Response;

#[derive(Clone)]
struct Stub {
    requests: Arc<Mutex<Vec<Recorded>>>,
    respond: Responder,
}

impl Stub {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn last(&self, method: &str) -> Recorded {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.method == method)
            .unwrap_or_else(|| panic!("no {} request recorded", method))
    }
}

async fn record(
    State(stub): State<Stub>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header_value = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    stub.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        uri: uri.to_string(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body,
    });
    (stub.respond)(&method, uri.path())
}

/// Starts the stub and returns its base URL.
async fn start_stub(respond: Responder) -> (String, Stub) {
    let stub = Stub {
        requests: Arc::new(Mutex::new(Vec::new())),
        respond,
    };
    let app = Router::new().fallback(record).with_state(stub.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://127.0.0.1:{}/", port), stub)
}

// ─── Jenkins ────────────────────────────────────────────────────────

const PIPELINE_XML: &str = r#"<?xml version='1.1' encoding='UTF-8'?>
<flow-definition plugin="workflow-job">
  <definition class="org.jenkinsci.plugins.workflow.cps.CpsScmFlowDefinition">
    <scm class="hudson.plugins.git.GitSCM">
      <userRemoteConfigs>
        <hudson.plugins.git.UserRemoteConfig><url>https://example.com/p1.git</url></hudson.plugins.git.UserRemoteConfig>
      </userRemoteConfigs>
      <branches>
        <hudson.plugins.git.BranchSpec><name>main</name></hudson.plugins.git.BranchSpec>
      </branches>
    </scm>
  </definition>
</flow-definition>"#;

fn jenkins_responses(method: &Method, path: &str) -> Response {
    match (method.as_str(), path) {
        ("GET", "/api/json") => Json(json!({
            "jobs": [
                { "name": "p1", "url": "http://ci/job/p1/" },
                { "name": "u1", "url": "http://ci/job/u1/" }
            ]
        }))
        .into_response(),
        ("GET", "/job/p1/config.xml") => {
            ([(header::CONTENT_TYPE, "application/xml")], PIPELINE_XML).into_response()
        }
        ("POST", "/createItem") => {
            (StatusCode::FOUND, [(header::LOCATION, "/job/demo/")]).into_response()
        }
        ("POST", "/job/p1/config.xml") => StatusCode::OK.into_response(),
        ("POST", "/job/p1/doDelete") => {
            (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
        }
        ("POST", "/job/broken/config.xml") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(2000)).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn jenkins() -> (JenkinsClient, Stub) {
    let (base, stub) = start_stub(jenkins_responses).await;
    let client = JenkinsClient::new(&JenkinsConfig {
        url: base,
        username: Some("admin".to_string()),
        api_token: Some("secret".to_string()),
        ..JenkinsConfig::default()
    })
    .unwrap();
    (client, stub)
}

/// `admin:secret`, base64-encoded.
const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

#[tokio::test]
async fn test_jenkins_list_jobs_sends_basic_auth() {
    let (client, stub) = jenkins().await;

    let jobs = client.list_jobs().await.unwrap();
    let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["p1", "u1"]);

    let req = stub.last("GET");
    assert!(req.uri.starts_with("/api/json?tree="), "uri was {}", req.uri);
    assert_eq!(req.authorization.as_deref(), Some(BASIC_AUTH));
}

#[tokio::test]
async fn test_jenkins_get_job_config() {
    let (client, _stub) = jenkins().await;

    let job = client.get_job_config("p1").await.unwrap();
    let descriptor = extract(job.scm().unwrap());
    assert_eq!(descriptor.uri, "https://example.com/p1.git");
    assert_eq!(descriptor.git_ref, "main");

    let err = client.get_job_config("missing").await.unwrap_err();
    assert_eq!(err, JobError::NotFound("missing".to_string()));
}

#[tokio::test]
async fn test_jenkins_create_accepts_redirect() {
    let (client, stub) = jenkins().await;
    let job = build_pipeline_job(&ScmDescriptor {
        uri: "https://example.com/demo.git".to_string(),
        git_ref: "main".to_string(),
    });

    client.create_job(&job, "demo").await.unwrap();

    let req = stub.last("POST");
    assert_eq!(req.uri, "/createItem?name=demo");
    assert_eq!(req.content_type.as_deref(), Some("application/xml"));
    assert_eq!(req.authorization.as_deref(), Some(BASIC_AUTH));
    assert!(req.body.contains("<flow-definition"));
    assert!(req.body.contains("https://example.com/demo.git"));
    // The redirect is not followed.
    assert_eq!(stub.requests().len(), 1);
}

#[tokio::test]
async fn test_jenkins_update_posts_config() {
    let (client, stub) = jenkins().await;
    let job = build_pipeline_job(&ScmDescriptor::default());

    client.update_job(&job, "p1").await.unwrap();
    let req = stub.last("POST");
    assert_eq!(req.uri, "/job/p1/config.xml");
    assert!(req.body.contains("<flow-definition"));
}

#[tokio::test]
async fn test_jenkins_error_body_is_truncated() {
    let (client, _stub) = jenkins().await;
    let job = build_pipeline_job(&ScmDescriptor::default());

    match client.update_job(&job, "broken").await.unwrap_err() {
        JobError::Http { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body.len(), 500);
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_jenkins_remove_job() {
    let (client, stub) = jenkins().await;

    client.remove_job("p1").await.unwrap();
    assert_eq!(stub.last("POST").uri, "/job/p1/doDelete");

    let err = client.remove_job("missing").await.unwrap_err();
    assert_eq!(err, JobError::NotFound("missing".to_string()));
}

// ─── ConfigMaps ─────────────────────────────────────────────────────

fn fabric8_config_map() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": "fabric8",
            "namespace": "ci",
            "resourceVersion": "7",
            "annotations": { "existing": "kept" },
            "labels": { "provider": "fabric8" },
            "ownerReferences": [{ "apiVersion": "v1", "kind": "Service", "name": "console", "uid": "1" }]
        },
        "data": { "fabric8-console": "important" }
    })
}

fn config_map_responses(method: &Method, path: &str) -> Response {
    match (method.as_str(), path) {
        ("GET", "/api/v1/namespaces/ci/configmaps/fabric8") => {
            Json(fabric8_config_map()).into_response()
        }
        ("PUT", "/api/v1/namespaces/ci/configmaps/fabric8") => StatusCode::OK.into_response(),
        ("POST", "/api/v1/namespaces/ci/configmaps") => StatusCode::CREATED.into_response(),
        ("PUT", "/api/v1/namespaces/ci/configmaps/conflict") => {
            (StatusCode::CONFLICT, "the object has been modified").into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn config_maps() -> (ConfigMapStore, Stub, NamedTempFile) {
    let (base, stub) = start_stub(config_map_responses).await;
    let mut token = NamedTempFile::new().unwrap();
    writeln!(token, "s3cret").unwrap();
    let store = ConfigMapStore::new(&KubernetesConfig {
        api_url: base,
        namespace: "ci".to_string(),
        token_file: Some(token.path().to_path_buf()),
        ..KubernetesConfig::default()
    })
    .unwrap();
    (store, stub, token)
}

fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_config_map_update_keeps_existing_object() {
    let (store, stub, _token) = config_maps().await;
    let overlay = AnnotationOverlay::new(Arc::new(store));

    let outcome = overlay
        .merge("fabric8", &annotations(&[("a", "1")]))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Updated);

    let req = stub.last("PUT");
    assert_eq!(req.uri, "/api/v1/namespaces/ci/configmaps/fabric8");
    assert_eq!(req.authorization.as_deref(), Some("Bearer s3cret"));
    let body: Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body["data"]["fabric8-console"], "important");
    assert_eq!(body["metadata"]["ownerReferences"][0]["name"], "console");
    assert_eq!(body["metadata"]["resourceVersion"], "7");
    assert_eq!(body["metadata"]["labels"]["provider"], "fabric8");
    assert_eq!(
        body["metadata"]["annotations"],
        json!({ "a": "1", "existing": "kept" })
    );
}

#[tokio::test]
async fn test_config_map_created_when_absent() {
    let (store, stub, _token) = config_maps().await;
    let overlay = AnnotationOverlay::new(Arc::new(store));

    let outcome = overlay
        .merge("demo", &annotations(&[("a", "1")]))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Created);

    let req = stub.last("POST");
    assert_eq!(req.uri, "/api/v1/namespaces/ci/configmaps");
    let body: Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body["kind"], "ConfigMap");
    assert_eq!(body["metadata"]["name"], "demo");
    assert_eq!(body["metadata"]["namespace"], "ci");
    assert_eq!(body["metadata"]["labels"]["owner"], "jenkinshift");
    assert_eq!(body["metadata"]["labels"]["project"], "fabric8");
    assert_eq!(body["metadata"]["annotations"]["a"], "1");
    assert!(body["metadata"].get("resourceVersion").is_none());
}

#[tokio::test]
async fn test_config_map_error_status() {
    let (store, _stub, _token) = config_maps().await;

    let err = store.get("absent").await.unwrap_err();
    assert_eq!(err, StoreError::NotFound("absent".to_string()));

    let err = store
        .update(&AnnotationRecord::fresh("conflict"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::Http {
            status: 409,
            body: "the object has been modified".to_string(),
        }
    );
}

#[tokio::test]
async fn test_config_map_probe() {
    let (store, _stub, _token) = config_maps().await;
    let overlay = AnnotationOverlay::new(Arc::new(store));

    assert_eq!(overlay.probe("fabric8").await, Ok(true));
    assert_eq!(overlay.probe("absent").await, Ok(false));
}
