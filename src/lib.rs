//! Launches the `jsp-lsp` language server over stdio and binds it to JSP
//! documents.
//!
//! The host owns an [`ExtensionContext`] and calls [`activate`] once on load
//! and [`deactivate`] once on unload. The server executable comes from
//! `JSP_LSP_BIN`, falling back to a development build next to the install
//! directory (see [`config::resolve_executable`]).

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod launcher;
pub mod log;

pub use config::{LauncherConfig, Settings};
pub use error::LaunchError;
pub use host::{ExtensionContext, Host, LauncherState, NotificationAction};
pub use launcher::{Deactivation, activate, deactivate};
