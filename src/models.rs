//! OpenShift resource types served by the REST facade.
//!
//! These mirror the `v1` JSON shape the console expects. Only the fields the
//! translation layer reads or writes are modelled; unknown fields in request
//! bodies are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scm::ScmDescriptor;

/// API version stamped on every resource and list envelope.
pub const API_VERSION: &str = "v1";

/// Source type for Git-backed build sources.
pub const SOURCE_TYPE_GIT: &str = "Git";

/// Annotation carrying the job's URL path on the CI server.
pub const JENKINS_URL_PATH_ANNOTATION: &str = "fabric8.io/jenkins-url-path";

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_build_config_kind() -> String {
    "BuildConfig".to_string()
}

/// A BuildConfig resource backed by a CI job of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default = "default_build_config_kind")]
    pub kind: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: BuildConfigSpec,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            kind: default_build_config_kind(),
            api_version: default_api_version(),
            metadata: ObjectMeta::default(),
            spec: BuildConfigSpec::default(),
        }
    }
}

impl BuildConfig {
    /// Builds a Git-sourced BuildConfig for `namespace/name`.
    pub fn new(namespace: &str, name: &str, source: &ScmDescriptor) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                annotations: BTreeMap::new(),
            },
            spec: BuildConfigSpec {
                source: BuildSource::git(source),
            },
            ..Self::default()
        }
    }

    /// The `{uri, ref}` pair carried by this resource's source.
    ///
    /// A missing `git` block yields empty strings, which the job builder
    /// treats as "no remote" and "default branch".
    pub fn source_descriptor(&self) -> ScmDescriptor {
        match &self.spec.source.git {
            Some(git) => ScmDescriptor {
                uri: git.uri.clone(),
                git_ref: git.git_ref.clone(),
            },
            None => ScmDescriptor::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigSpec {
    #[serde(default)]
    pub source: BuildSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitBuildSource>,
}

impl BuildSource {
    pub fn git(source: &ScmDescriptor) -> Self {
        Self {
            source_type: SOURCE_TYPE_GIT.to_string(),
            git: Some(GitBuildSource {
                uri: source.uri.clone(),
                git_ref: source.git_ref.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitBuildSource {
    #[serde(default)]
    pub uri: String,
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub git_ref: String,
}

/// A `kind: <Name>List` envelope around a set of items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList<T> {
    pub kind: String,
    pub api_version: String,
    pub items: Vec<T>,
}

impl<T> ResourceList<T> {
    pub fn new(kind: &str, items: Vec<T>) -> Self {
        Self {
            kind: kind.to_string(),
            api_version: default_api_version(),
            items,
        }
    }
}

pub type BuildConfigList = ResourceList<BuildConfig>;
