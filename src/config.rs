use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::LaunchError;

/// Settings namespace owned by the launcher.
pub const SETTINGS_NAMESPACE: &str = "jspLsp";

/// Setting holding the path to the JDT language server launcher jar.
pub const JAVA_LAUNCHER_JAR_KEY: &str = "javaLauncherJar";

/// Setting holding the path to the JDT language server configuration directory.
pub const JAVA_CONFIG_DIR_KEY: &str = "javaConfigDir";

/// Environment variable overriding the server executable location.
pub const SERVER_BIN_ENV: &str = "JSP_LSP_BIN";

/// Language identifier of the documents the client governs.
pub const LANGUAGE_ID: &str = "jsp";

/// File name of the log inside the data directory.
pub const LOG_FILE_NAME: &str = "jsp-lsp-launcher.log";

/// Flag asking the server to talk over stdin/stdout.
pub const STDIO_FLAG: &str = "--stdio";

/// Returns the path to the data directory for jsp-lsp-launcher.
/// Uses $XDG_DATA_HOME/jsp-lsp-launcher if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/jsp-lsp-launcher,
/// or ./jsp-lsp-launcher if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join(LOG_FILE_NAME)
}

/// Returns the path to the default settings file.
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("jsp-lsp-launcher")
}

/// User/workspace settings under the `jspLsp` namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub java_launcher_jar: Option<PathBuf>,
    pub java_config_dir: Option<PathBuf>,
}

impl Settings {
    /// Parses a JSON settings document.
    ///
    /// Accepts both editor-style dotted keys (`"jspLsp.javaLauncherJar"`) and a
    /// nested `"jspLsp": { ... }` object. Dotted keys win when both are present.
    /// Keys outside the namespace are ignored.
    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        let root: Map<String, Value> = serde_json::from_str(content)?;

        let mut section = match root.get(SETTINGS_NAMESPACE) {
            Some(Value::Object(nested)) => nested.clone(),
            _ => Map::new(),
        };

        let prefix = format!("{}.", SETTINGS_NAMESPACE);
        for (key, value) in &root {
            if let Some(name) = key.strip_prefix(&prefix) {
                section.insert(name.to_string(), value.clone());
            }
        }

        serde_json::from_value(Value::Object(section))
    }

    /// Loads settings from a file. A missing file yields empty settings.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!("Loading settings from {:?}", path);
                Ok(Self::from_json_str(&content)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Everything needed to spawn the server, resolved once per activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    pub executable_path: PathBuf,
    pub extra_args: Vec<String>,
    pub language_id: String,
}

impl LauncherConfig {
    /// Resolves the launch configuration, reading `JSP_LSP_BIN` from the process
    /// environment.
    pub fn resolve(extension_path: &Path, settings: &Settings) -> Result<Self, LaunchError> {
        Self::resolve_with_env(
            extension_path,
            settings,
            std::env::var_os(SERVER_BIN_ENV),
        )
    }

    pub fn resolve_with_env(
        extension_path: &Path,
        settings: &Settings,
        bin_override: Option<OsString>,
    ) -> Result<Self, LaunchError> {
        let jar = settings
            .java_launcher_jar
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(LaunchError::MissingSetting(JAVA_LAUNCHER_JAR_KEY))?;
        let config_dir = settings
            .java_config_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(LaunchError::MissingSetting(JAVA_CONFIG_DIR_KEY))?;

        warn_if_missing(JAVA_LAUNCHER_JAR_KEY, jar);
        warn_if_missing(JAVA_CONFIG_DIR_KEY, config_dir);

        let executable_path = resolve_executable(extension_path, bin_override);

        Ok(Self {
            executable_path,
            extra_args: vec![
                STDIO_FLAG.to_string(),
                "-p".to_string(),
                path_arg(JAVA_LAUNCHER_JAR_KEY, jar)?,
                "-c".to_string(),
                path_arg(JAVA_CONFIG_DIR_KEY, config_dir)?,
            ],
            language_id: LANGUAGE_ID.to_string(),
        })
    }
}

/// Picks the server executable: `JSP_LSP_BIN` when set and non-empty, otherwise
/// `<extension_path>/../../target/debug/jsp-lsp`.
///
/// The fallback points at a local development build. Packaged installs must
/// either set `JSP_LSP_BIN` or ship the binary at that location.
pub fn resolve_executable(extension_path: &Path, bin_override: Option<OsString>) -> PathBuf {
    match bin_override.filter(|value| !value.is_empty()) {
        Some(value) => PathBuf::from(value),
        None => default_executable(extension_path),
    }
}

pub fn default_executable(extension_path: &Path) -> PathBuf {
    extension_path
        .join("..")
        .join("..")
        .join("target")
        .join("debug")
        .join("jsp-lsp")
}

fn path_arg(key: &'static str, path: &Path) -> Result<String, LaunchError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| LaunchError::NonUtf8Path {
            key,
            path: path.to_path_buf(),
        })
}

fn warn_if_missing(key: &str, path: &Path) {
    if !path.exists() {
        warn!("{}.{} points to {:?}, which does not exist", SETTINGS_NAMESPACE, key, path);
    }
}
