use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use dialoguer::Confirm;
use tower_lsp::lsp_types::{TextDocumentItem, Url};
use tracing::{info, warn};

use jsp_lsp_launcher::config::{self, JAVA_CONFIG_DIR_KEY, JAVA_LAUNCHER_JAR_KEY, LANGUAGE_ID};
use jsp_lsp_launcher::{Host, NotificationAction};

/// File extensions opened with the JSP language id.
const JSP_EXTENSIONS: &[&str] = &["jsp", "jspf", "jspx"];

#[derive(Debug, Parser)]
#[command(name = "jsp-lsp-launcher", version, about)]
pub struct Args {
    /// Installation directory; the server fallback path is resolved relative to it
    #[arg(long, value_name = "DIR")]
    pub extension_path: Option<PathBuf>,

    /// Settings file (JSON, `jspLsp.*` keys)
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Never ask questions on the terminal
    #[arg(long)]
    pub no_prompt: bool,

    /// Documents to open once the server is running
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,
}

impl Args {
    pub fn settings_path(&self) -> PathBuf {
        self.settings.clone().unwrap_or_else(config::settings_path)
    }

    /// Defaults to the directory holding the running executable.
    pub fn extension_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.extension_path {
            return Ok(path.clone());
        }
        let exe = std::env::current_exe().context("Cannot locate the running executable")?;
        exe.parent()
            .map(Path::to_path_buf)
            .context("Executable has no parent directory")
    }
}

/// Host backed by the terminal: errors on stderr, choices read from stdin.
pub struct TerminalHost {
    settings_path: PathBuf,
    prompt: bool,
}

impl TerminalHost {
    pub fn new(settings_path: PathBuf, prompt: bool) -> Self {
        Self {
            settings_path,
            prompt,
        }
    }

    fn ask(&self, action: NotificationAction) -> bool {
        let answer = Confirm::new()
            .with_prompt(action.label())
            .default(false)
            .interact_opt();
        confirmed(answer)
    }
}

/// Only an explicit yes counts; errors (no terminal) and Esc dismiss.
fn confirmed(answer: dialoguer::Result<Option<bool>>) -> bool {
    match answer {
        Ok(choice) => choice.unwrap_or(false),
        Err(e) => {
            warn!("Cannot prompt on this terminal: {}", e);
            false
        }
    }
}

impl Host for TerminalHost {
    fn show_error_message(
        &self,
        message: &str,
        action: Option<NotificationAction>,
    ) -> Option<NotificationAction> {
        eprintln!("error: {}", message);
        let action = action?;
        if self.prompt && self.ask(action) {
            Some(action)
        } else {
            None
        }
    }

    fn open_settings(&self, namespace: &str) {
        eprintln!(
            "Settings file: {}\nExpected keys: \"{ns}.{}\", \"{ns}.{}\"",
            self.settings_path.display(),
            JAVA_LAUNCHER_JAR_KEY,
            JAVA_CONFIG_DIR_KEY,
            ns = namespace,
        );

        let Some(editor) = std::env::var_os("VISUAL").or_else(|| std::env::var_os("EDITOR"))
        else {
            return;
        };
        if let Some(parent) = self.settings_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::process::Command::new(&editor)
            .arg(&self.settings_path)
            .status()
        {
            Ok(status) => info!(?status, "Settings editor closed"),
            Err(e) => warn!("Failed to run {:?}: {}", editor, e),
        }
    }
}

/// Language id the editor would assign to a file.
pub fn language_id_for(path: &Path) -> &'static str {
    let is_jsp = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| JSP_EXTENSIONS.iter().any(|jsp| ext.eq_ignore_ascii_case(jsp)));
    if is_jsp { LANGUAGE_ID } else { "plaintext" }
}

/// Reads a file into an open-document item.
pub fn load_document(path: &Path) -> anyhow::Result<TextDocumentItem> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    let text = std::fs::read_to_string(&absolute)
        .with_context(|| format!("Cannot read {}", absolute.display()))?;
    let uri = Url::from_file_path(&absolute)
        .map_err(|_| anyhow::anyhow!("Cannot build a file URI for {}", absolute.display()))?;

    Ok(TextDocumentItem {
        uri,
        language_id: language_id_for(path).to_string(),
        version: 1,
        text,
    })
}
