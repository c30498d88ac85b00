//! # jenkinshift
//!
//! An OpenShift `BuildConfig` REST facade whose source of truth is Jenkins.
//!
//! A console lists, fetches, creates, updates and deletes BuildConfigs; each
//! one is backed by a Jenkins job of the same name. Metadata the job format
//! cannot hold (annotations) is kept in a ConfigMap per BuildConfig and
//! merged back on read.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐
//! │   HTTP   │──▶│ Translator │──▶│  JobClient   │──▶ Jenkins
//! │ (server) │   │            │   │  (jenkins)   │
//! └──────────┘   │  scm / job │   └──────────────┘
//!                │            │   ┌──────────────┐
//!                │            │──▶│  Annotation  │──▶ ConfigMaps
//!                └────────────┘   │   Overlay    │
//!                                 └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | BuildConfig wire types |
//! | [`scm`] | SCM descriptors and `{uri, ref}` extraction |
//! | [`job`] | Job kinds, `config.xml` codec, pipeline job builder |
//! | [`jenkins`] | CI job client trait and Jenkins implementation |
//! | [`annotations`] | Annotation store trait, ConfigMap store, overlay rules |
//! | [`translator`] | The five BuildConfig operations |
//! | [`server`] | HTTP routes |
//! | [`error`] | Error types |

pub mod annotations;
pub mod config;
pub mod error;
pub mod jenkins;
pub mod job;
pub mod models;
pub mod scm;
pub mod server;
pub mod translator;
