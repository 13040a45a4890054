#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use jsp_lsp_launcher::{Host, NotificationAction};

/// Answers `initialize` as soon as the first request byte arrives, then
/// records everything else it receives until stdin closes.
const RESPONSIVE_SERVER: &str = r#"#!/bin/sh
here="$(dirname "$0")"
printf '%s\n' "$@" > "$here/args.txt"
head -c 1 > /dev/null
body='{"jsonrpc":"2.0","id":1,"result":{"capabilities":{"hoverProvider":true},"serverInfo":{"name":"fake-jsp-lsp","version":"0.0.1"}}}'
printf 'Content-Length: %s\r\n\r\n%s' "${#body}" "$body"
cat > "$here/received.txt"
"#;

/// Never answers anything.
const SILENT_SERVER: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/args.txt"
cat > /dev/null
"#;

/// Replies to `initialize` with a frame too large to accept.
const OVERSIZED_SERVER: &str = r#"#!/bin/sh
head -c 1 > /dev/null
printf 'Content-Length: 18446744073709551615\r\n\r\n{}'
cat > /dev/null
"#;

/// A fake language server script; its records land next to it.
pub struct FakeServer {
    _root: TempDir,
    pub path: PathBuf,
}

impl FakeServer {
    /// Server in a directory of its own.
    pub fn responsive() -> Self {
        Self::standalone(RESPONSIVE_SERVER)
    }

    pub fn silent() -> Self {
        Self::standalone(SILENT_SERVER)
    }

    pub fn oversized() -> Self {
        Self::standalone(OVERSIZED_SERVER)
    }

    fn standalone(script: &str) -> Self {
        let root = TempDir::new().unwrap();
        let path = root.path().join("jsp-lsp");
        write_executable(&path, script);
        Self { _root: root, path }
    }

    /// Server placed at the fallback location of an install layout, returned
    /// together with the extension directory to activate from.
    pub fn installed(responsive: bool) -> (Self, PathBuf) {
        let root = TempDir::new().unwrap();
        let extension_path = root.path().join("editors").join("vscode");
        fs::create_dir_all(&extension_path).unwrap();

        let target = root.path().join("target").join("debug");
        fs::create_dir_all(&target).unwrap();
        let path = target.join("jsp-lsp");
        let script = if responsive { RESPONSIVE_SERVER } else { SILENT_SERVER };
        write_executable(&path, script);

        (Self { _root: root, path }, extension_path)
    }

    fn dir(&self) -> &Path {
        self.path.parent().unwrap()
    }

    pub fn args_path(&self) -> PathBuf {
        self.dir().join("args.txt")
    }

    pub fn args(&self) -> Vec<String> {
        read_lines(&self.args_path())
    }

    pub fn received(&self) -> String {
        fs::read_to_string(self.dir().join("received.txt")).unwrap_or_default()
    }
}

pub fn write_executable(path: &Path, script: &str) {
    fs::write(path, script).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

pub async fn wait_for_file(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{:?} never appeared", path);
}

/// Host that records what it was asked to show.
#[derive(Default)]
pub struct RecordingHost {
    pub choice: Option<NotificationAction>,
    pub errors: RefCell<Vec<(String, Option<NotificationAction>)>>,
    pub opened_settings: RefCell<Vec<String>>,
}

impl RecordingHost {
    pub fn choosing(choice: NotificationAction) -> Self {
        Self {
            choice: Some(choice),
            ..Default::default()
        }
    }
}

impl Host for RecordingHost {
    fn show_error_message(
        &self,
        message: &str,
        action: Option<NotificationAction>,
    ) -> Option<NotificationAction> {
        self.errors.borrow_mut().push((message.to_string(), action));
        action.and(self.choice)
    }

    fn open_settings(&self, namespace: &str) {
        self.opened_settings.borrow_mut().push(namespace.to_string());
    }
}
