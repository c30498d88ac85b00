//! SCM descriptors embedded in CI job configuration.
//!
//! A job's `<scm>` block is modelled as a sum type over SCM backends. Only
//! Git is understood; any other backend is kept by class name so it can be
//! logged, and extraction from it yields empty strings.

/// Jenkins class name of the Git SCM plugin.
pub const GIT_SCM_CLASS: &str = "hudson.plugins.git.GitSCM";

/// SCM configuration of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scm {
    /// No `<scm>` block, or `hudson.scm.NullSCM`.
    #[default]
    None,
    Git(GitScm),
    /// A backend other than Git, identified by its class attribute.
    Unsupported(String),
}

/// The Git plugin's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitScm {
    /// Remote URLs in declaration order.
    pub remote_urls: Vec<String>,
    /// Repository browser URL, used when no remote URL is set.
    pub browser_url: Option<String>,
    /// Branch spec names in declaration order.
    pub branches: Vec<String>,
}

/// The normalized `{uri, ref}` pair describing a source repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScmDescriptor {
    pub uri: String,
    pub git_ref: String,
}

/// Extracts the canonical repository URI and ref from an SCM configuration.
///
/// Never fails. The URI is the first non-empty remote URL, else the browser
/// URL, else empty. The ref is the first branch spec name, else
/// empty.
pub fn extract(scm: &Scm) -> ScmDescriptor {
    let git = match scm {
        Scm::Git(git) => git,
        Scm::None | Scm::Unsupported(_) => return ScmDescriptor::default(),
    };

    let uri = git
        .remote_urls
        .iter()
        .find(|url| !url.is_empty())
        .or(git.browser_url.as_ref())
        .cloned()
        .unwrap_or_default();
    let git_ref = git.branches.first().cloned().unwrap_or_default();

    ScmDescriptor { uri, git_ref }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(urls: &[&str], browser: Option<&str>, branches: &[&str]) -> Scm {
        Scm::Git(GitScm {
            remote_urls: urls.iter().map(|s| s.to_string()).collect(),
            browser_url: browser.map(str::to_string),
            branches: branches.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_first_remote_url_wins() {
        let d = extract(&git(
            &["https://a.example/r.git", "https://b.example/r.git"],
            Some("https://browse.example/r"),
            &["main", "dev"],
        ));
        assert_eq!(d.uri, "https://a.example/r.git");
        assert_eq!(d.git_ref, "main");
    }

    #[test]
    fn test_browser_url_fallback_when_no_remote() {
        let d = extract(&git(&[], Some("https://browse.example/r"), &[]));
        assert_eq!(d.uri, "https://browse.example/r");
        assert_eq!(d.git_ref, "");
    }

    #[test]
    fn test_browser_url_fallback_when_first_remote_empty() {
        let d = extract(&git(&[""], Some("https://browse.example/r"), &["main"]));
        assert_eq!(d.uri, "https://browse.example/r");
        assert_eq!(d.git_ref, "main");
    }

    #[test]
    fn test_skips_empty_remote_entries() {
        let d = extract(&git(&["", "https://b.example/r.git"], None, &[]));
        assert_eq!(d.uri, "https://b.example/r.git");
    }

    #[test]
    fn test_git_without_anything() {
        assert_eq!(extract(&git(&[], None, &[])), ScmDescriptor::default());
    }

    #[test]
    fn test_unknown_scm_degrades_to_empty() {
        let d = extract(&Scm::Unsupported("hudson.scm.SubversionSCM".into()));
        assert_eq!(d, ScmDescriptor::default());
        assert_eq!(extract(&Scm::None), ScmDescriptor::default());
    }
}
