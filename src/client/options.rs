//! Server and client options

use std::path::PathBuf;
use std::time::Duration;

use globset::Glob;
use tower_lsp::lsp_types::{DocumentFilter, DocumentSelector, Url};
use tracing::warn;

/// Default time allowed for the server to answer `shutdown`.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// How protocol messages reach the server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Content-Length framed JSON-RPC over the child's stdin/stdout.
    #[default]
    Stdio,
}

/// How to launch the language server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub transport: TransportKind,
}

/// How the client talks to the server once it is running.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Documents the client forwards to the server.
    pub document_selector: DocumentSelector,
    /// Workspace root announced in `initialize`.
    pub workspace_root: Option<PathBuf>,
    pub shutdown_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            document_selector: Vec::new(),
            workspace_root: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ClientOptions {
    /// Options governing `file:` documents of one language.
    pub fn for_language(language_id: &str) -> Self {
        Self {
            document_selector: vec![DocumentFilter {
                language: Some(language_id.to_string()),
                scheme: Some("file".to_string()),
                pattern: None,
            }],
            ..Default::default()
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Whether a document is governed by this client.
    pub fn selects(&self, uri: &Url, language_id: &str) -> bool {
        self.document_selector
            .iter()
            .any(|filter| filter_matches(filter, uri, language_id))
    }
}

fn filter_matches(filter: &DocumentFilter, uri: &Url, language_id: &str) -> bool {
    if filter
        .pattern
        .as_deref()
        .is_some_and(|pattern| !pattern_matches(pattern, uri))
    {
        return false;
    }
    let scheme_ok = filter
        .scheme
        .as_deref()
        .is_none_or(|scheme| scheme == uri.scheme());
    let language_ok = filter
        .language
        .as_deref()
        .is_none_or(|language| language == language_id);

    scheme_ok && language_ok
}

/// Patterns apply to the document's file system path; other schemes never match.
fn pattern_matches(pattern: &str, uri: &Url) -> bool {
    let Ok(path) = uri.to_file_path() else {
        return false;
    };
    match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(path),
        Err(e) => {
            warn!("Ignoring document filter with invalid pattern {:?}: {}", pattern, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("file:///srv/app/index.jsp", "jsp", true)]
    #[case("file:///srv/app/index.jsp", "html", false)]
    #[case("untitled:Untitled-1", "jsp", false)]
    #[case("https://example.com/index.jsp", "jsp", false)]
    fn language_selector_matches_file_scheme_and_language(
        #[case] uri: &str,
        #[case] language_id: &str,
        #[case] expected: bool,
    ) {
        let options = ClientOptions::for_language("jsp");
        let uri = Url::parse(uri).unwrap();

        assert_eq!(options.selects(&uri, language_id), expected);
    }

    #[test]
    fn empty_selector_matches_nothing() {
        let options = ClientOptions::default();
        let uri = Url::parse("file:///a.jsp").unwrap();

        assert!(!options.selects(&uri, "jsp"));
    }

    fn pattern_options(pattern: &str) -> ClientOptions {
        ClientOptions {
            document_selector: vec![DocumentFilter {
                language: None,
                scheme: None,
                pattern: Some(pattern.to_string()),
            }],
            ..Default::default()
        }
    }

    #[rstest]
    #[case("**/*.jsp", "file:///srv/app/index.jsp", true)]
    #[case("**/*.jsp", "file:///srv/app/web.xml", false)]
    #[case("/srv/app/WEB-INF/**", "file:///srv/app/WEB-INF/views/list.jsp", true)]
    #[case("/srv/app/WEB-INF/**", "file:///srv/other/list.jsp", false)]
    #[case("**/*.jsp", "untitled:Untitled-1.jsp", false)]
    #[case("**/*.{jsp", "file:///srv/app/index.jsp", false)]
    fn pattern_filter_matches_file_path(
        #[case] pattern: &str,
        #[case] uri: &str,
        #[case] expected: bool,
    ) {
        let options = pattern_options(pattern);
        let uri = Url::parse(uri).unwrap();

        assert_eq!(options.selects(&uri, "jsp"), expected);
    }

    #[test]
    fn pattern_and_language_must_both_match() {
        let options = ClientOptions {
            document_selector: vec![DocumentFilter {
                language: Some("jsp".to_string()),
                scheme: Some("file".to_string()),
                pattern: Some("**/*.jsp".to_string()),
            }],
            ..Default::default()
        };
        let uri = Url::parse("file:///srv/app/index.jsp").unwrap();

        assert!(options.selects(&uri, "jsp"));
        assert!(!options.selects(&uri, "html"));
    }

    #[test]
    fn filter_without_constraints_matches_everything() {
        let options = ClientOptions {
            document_selector: vec![DocumentFilter {
                language: None,
                scheme: None,
                pattern: None,
            }],
            ..Default::default()
        };
        let uri = Url::parse("untitled:x").unwrap();

        assert!(options.selects(&uri, "plaintext"));
    }
}
