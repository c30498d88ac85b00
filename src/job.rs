//! CI job configuration: the recognised job kinds, the `config.xml` codec,
//! and the builder that turns a source descriptor into a pipeline job.
//!
//! # Recognised kinds
//!
//! | Root element | Kind | SCM location |
//! |--------------|------|--------------|
//! | `flow-definition` | [`JobConfig::Pipeline`] | `definition/scm` |
//! | `maven2-moduleset` | [`JobConfig::Maven`] | `scm` |
//! | anything else | [`JobConfig::Unknown`] | not read |
//!
//! Inside a Git `<scm>` block, remote URLs are read from
//! `userRemoteConfigs/*/url`, branch names from `branches/*/name` and the
//! browser fallback from `browser/url`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::JobError;
use crate::scm::{GitScm, Scm, ScmDescriptor, GIT_SCM_CLASS};

/// Placeholder pipeline embedded in every job this service writes.
///
/// Not derived from the repository; jobs created or updated through the
/// facade always run this script.
pub const PLACEHOLDER_SCRIPT: &str = "node {
   stage 'Stage 1'
   echo 'Hello World 1'
   stage 'Stage 2'
   echo 'Hello World 2'
}";

const PIPELINE_ROOT: &str = "flow-definition";
const MAVEN_ROOT: &str = "maven2-moduleset";
const PIPELINE_DEFINITION_CLASS: &str = "org.jenkinsci.plugins.workflow.cps.CpsScmFlowDefinition";
const NULL_SCM_CLASS: &str = "hudson.scm.NullSCM";

/// A job's configuration, by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobConfig {
    Pipeline(PipelineJob),
    Maven(MavenJob),
    /// A job type without a BuildConfig mapping, keyed by its root element.
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineJob {
    pub script: String,
    pub scm: Scm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MavenJob {
    pub scm: Scm,
}

/// One entry of the CI server's job listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct JobSummary {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

impl JobConfig {
    /// Short kind label used in logs.
    pub fn kind(&self) -> &str {
        match self {
            JobConfig::Pipeline(_) => "pipeline",
            JobConfig::Maven(_) => "maven",
            JobConfig::Unknown(root) => root,
        }
    }

    /// The SCM block of a recognised job; `None` for unknown kinds.
    pub fn scm(&self) -> Option<&Scm> {
        match self {
            JobConfig::Pipeline(job) => Some(&job.scm),
            JobConfig::Maven(job) => Some(&job.scm),
            JobConfig::Unknown(_) => None,
        }
    }

    /// Parses a Jenkins `config.xml` document.
    pub fn from_xml(xml: &str) -> Result<Self, JobError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut root: Option<String> = None;
        let mut scm = Scm::None;
        let mut scm_depth: Option<usize> = None;
        let mut script = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = element_name(&e);
                    root.get_or_insert_with(|| name.clone());
                    if name == "scm" && scm_depth.is_none() && is_job_scm_parent(&path) {
                        scm = scm_for_class(scm_class(&e)?.as_deref());
                        scm_depth = Some(path.len());
                    }
                    path.push(name);
                    text.clear();
                }
                Ok(Event::Empty(e)) => {
                    let name = element_name(&e);
                    root.get_or_insert_with(|| name.clone());
                    if name == "scm" && scm_depth.is_none() && is_job_scm_parent(&path) {
                        scm = scm_for_class(scm_class(&e)?.as_deref());
                    } else if let (Some(depth), Scm::Git(git)) = (scm_depth, &mut scm) {
                        // `<name/>` still occupies its position in the list.
                        let mut rel = path[depth + 1..].to_vec();
                        rel.push(name);
                        record_git_field(git, &rel, "");
                    }
                }
                Ok(Event::Text(t)) => {
                    let unescaped = t.unescape().map_err(|e| JobError::Xml(e.to_string()))?;
                    text.push_str(&unescaped);
                }
                Ok(Event::CData(c)) => {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
                Ok(Event::End(_)) => {
                    if let Some(depth) = scm_depth {
                        if path.len() == depth + 1 {
                            scm_depth = None;
                        } else if let Scm::Git(git) = &mut scm {
                            record_git_field(git, &path[depth + 1..], &text);
                        }
                    }
                    if path_is(&path, &[PIPELINE_ROOT, "definition", "script"]) {
                        script = text.clone();
                    }
                    path.pop();
                    text.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(JobError::Xml(format!(
                        "error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        match root.as_deref() {
            None => Err(JobError::Xml("empty job configuration".to_string())),
            Some(PIPELINE_ROOT) => Ok(JobConfig::Pipeline(PipelineJob { script, scm })),
            Some(MAVEN_ROOT) => Ok(JobConfig::Maven(MavenJob { scm })),
            Some(other) => Ok(JobConfig::Unknown(other.to_string())),
        }
    }

    /// Renders this job as a Jenkins `config.xml` document.
    ///
    /// Only pipeline jobs are rendered, since the builder produces nothing
    /// else.
    pub fn to_xml(&self) -> Result<String, JobError> {
        let job = match self {
            JobConfig::Pipeline(job) => job,
            other => return Err(JobError::UnsupportedKind(other.kind().to_string())),
        };

        let mut out = XmlOut::new();
        out.event(Event::Decl(BytesDecl::new("1.1", Some("UTF-8"), None)))?;
        out.start(PIPELINE_ROOT, &[("plugin", "workflow-job")])?;
        out.text_element("description", "")?;
        out.text_element("keepDependencies", "false")?;
        out.start(
            "definition",
            &[("class", PIPELINE_DEFINITION_CLASS), ("plugin", "workflow-cps")],
        )?;
        match &job.scm {
            Scm::Git(git) => write_git_scm(&mut out, git)?,
            Scm::None => out.empty("scm", &[("class", NULL_SCM_CLASS)])?,
            Scm::Unsupported(class) => out.empty("scm", &[("class", class.as_str())])?,
        }
        out.text_element("script", &job.script)?;
        out.end("definition")?;
        out.end(PIPELINE_ROOT)?;
        out.finish()
    }
}

/// Builds the pipeline job configuration for a source descriptor.
///
/// The result is always a pipeline job running [`PLACEHOLDER_SCRIPT`]. A
/// non-empty ref becomes the single branch spec; an empty ref leaves the
/// branch list empty so the CI server picks its default. A non-empty URI
/// becomes the sole remote URL.
pub fn build_pipeline_job(source: &ScmDescriptor) -> JobConfig {
    let remote_urls = if source.uri.is_empty() {
        Vec::new()
    } else {
        vec![source.uri.clone()]
    };
    let branches = if source.git_ref.is_empty() {
        Vec::new()
    } else {
        vec![source.git_ref.clone()]
    };

    JobConfig::Pipeline(PipelineJob {
        script: PLACEHOLDER_SCRIPT.to_string(),
        scm: Scm::Git(GitScm {
            remote_urls,
            browser_url: None,
            branches,
        }),
    })
}

// ============ Parsing helpers ============

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn path_is(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}

fn is_job_scm_parent(path: &[String]) -> bool {
    path_is(path, &[PIPELINE_ROOT, "definition"]) || path_is(path, &[MAVEN_ROOT])
}

fn scm_class(e: &BytesStart<'_>) -> Result<Option<String>, JobError> {
    let attr = e
        .try_get_attribute("class")
        .map_err(|err| JobError::Xml(err.to_string()))?;
    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|err| JobError::Xml(err.to_string()))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

fn scm_for_class(class: Option<&str>) -> Scm {
    match class {
        Some(GIT_SCM_CLASS) => Scm::Git(GitScm::default()),
        None | Some(NULL_SCM_CLASS) => Scm::None,
        Some(other) => Scm::Unsupported(other.to_string()),
    }
}

/// Stores the text of an element nested in a Git `<scm>` block.
///
/// `rel` is the element path relative to `<scm>`.
fn record_git_field(git: &mut GitScm, rel: &[String], text: &str) {
    let rel: Vec<&str> = rel.iter().map(String::as_str).collect();
    match rel.as_slice() {
        ["userRemoteConfigs", _, "url"] => git.remote_urls.push(text.to_string()),
        ["branches", _, "name"] => git.branches.push(text.to_string()),
        ["browser", "url"] => git.browser_url = Some(text.to_string()),
        _ => {}
    }
}

// ============ Rendering helpers ============

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), JobError> {
        self.writer
            .write_event(event)
            .map_err(|e| JobError::Xml(e.to_string()))
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), JobError> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.event(Event::Start(el))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), JobError> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.event(Event::Empty(el))
    }

    fn end(&mut self, name: &str) -> Result<(), JobError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), JobError> {
        self.start(name, &[])?;
        if !text.is_empty() {
            self.event(Event::Text(BytesText::new(text)))?;
        }
        self.end(name)
    }

    fn finish(self) -> Result<String, JobError> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| JobError::Xml(e.to_string()))
    }
}

fn write_git_scm(out: &mut XmlOut, git: &GitScm) -> Result<(), JobError> {
    out.start("scm", &[("class", GIT_SCM_CLASS), ("plugin", "git")])?;
    out.text_element("configVersion", "2")?;
    out.start("userRemoteConfigs", &[])?;
    out.start("hudson.plugins.git.UserRemoteConfig", &[])?;
    for url in &git.remote_urls {
        out.text_element("url", url)?;
    }
    out.end("hudson.plugins.git.UserRemoteConfig")?;
    out.end("userRemoteConfigs")?;
    out.start("branches", &[])?;
    for branch in &git.branches {
        out.start("hudson.plugins.git.BranchSpec", &[])?;
        out.text_element("name", branch)?;
        out.end("hudson.plugins.git.BranchSpec")?;
    }
    out.end("branches")?;
    if let Some(browser) = &git.browser_url {
        out.start("browser", &[])?;
        out.text_element("url", browser)?;
        out.end("browser")?;
    }
    out.end("scm")
}
