//! Host side of the launcher: user notifications and the per-session context

use std::path::{Path, PathBuf};

use crate::client::LanguageClient;
use crate::config::Settings;

/// Action offered alongside an error notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    OpenSettings,
}

impl NotificationAction {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::OpenSettings => "Open Settings",
        }
    }
}

/// Services the editor host provides to the launcher.
#[cfg_attr(test, mockall::automock)]
pub trait Host {
    /// Shows an error. When `action` is given, the user may pick it; the
    /// returned value is the picked action, `None` if dismissed.
    fn show_error_message(
        &self,
        message: &str,
        action: Option<NotificationAction>,
    ) -> Option<NotificationAction>;

    /// Opens the settings UI filtered to one namespace.
    fn open_settings(&self, namespace: &str);
}

/// Where the launcher is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    Uninitialized,
    /// Activation gave up; no client exists.
    Failed,
    Running,
    Stopped,
}

/// State shared between `activate` and `deactivate`, owned by the host.
#[derive(Debug)]
pub struct ExtensionContext {
    extension_path: PathBuf,
    pub settings: Settings,
    pub workspace_root: Option<PathBuf>,
    pub(crate) client: Option<LanguageClient>,
    pub(crate) state: LauncherState,
}

impl ExtensionContext {
    pub fn new(extension_path: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            extension_path: extension_path.into(),
            settings,
            workspace_root: None,
            client: None,
            state: LauncherState::Uninitialized,
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Installation directory of the launcher.
    pub fn extension_path(&self) -> &Path {
        &self.extension_path
    }

    /// The active client, if activation succeeded and deactivate has not run.
    pub fn client(&self) -> Option<&LanguageClient> {
        self.client.as_ref()
    }

    pub fn state(&self) -> LauncherState {
        self.state
    }
}
