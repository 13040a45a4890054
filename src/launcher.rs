//! `activate` / `deactivate` entry points

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tracing::{error, info, warn};

use crate::client::{ClientError, ClientOptions, LanguageClient, ServerOptions, TransportKind};
use crate::config::{LauncherConfig, SETTINGS_NAMESPACE};
use crate::error::LaunchError;
use crate::host::{ExtensionContext, Host, LauncherState, NotificationAction};

pub const CLIENT_ID: &str = "jsp-lsp";
pub const CLIENT_NAME: &str = "JSP Language Server";

/// Message shown when the required settings are absent.
pub const MISSING_SETTINGS_MESSAGE: &str =
    "JSP Language Server needs jspLsp.javaLauncherJar and jspLsp.javaConfigDir to be set.";

/// Completion of a deactivation, resolved once the server has stopped.
pub type Deactivation = BoxFuture<'static, Result<(), ClientError>>;

/// Resolves configuration, creates the language client and starts it.
///
/// Never fails from the caller's point of view: every problem is reported
/// through `host` and leaves the context in [`LauncherState::Failed`].
/// Must be called inside a tokio runtime.
pub fn activate(ctx: &mut ExtensionContext, host: &dyn Host) {
    match launch(ctx) {
        Ok(client) => {
            info!(
                command = %client.server_options().command.display(),
                "Activated {}",
                CLIENT_NAME
            );
            ctx.client = Some(client);
            ctx.state = LauncherState::Running;
        }
        Err(LaunchError::MissingSetting(key)) => {
            warn!("Not starting {}: jspLsp.{} is not set", CLIENT_NAME, key);
            ctx.state = LauncherState::Failed;
            let choice = host.show_error_message(
                MISSING_SETTINGS_MESSAGE,
                Some(NotificationAction::OpenSettings),
            );
            if choice == Some(NotificationAction::OpenSettings) {
                host.open_settings(SETTINGS_NAMESPACE);
            }
        }
        Err(e) => {
            error!("Failed to activate {}: {}", CLIENT_NAME, e);
            ctx.state = LauncherState::Failed;
            host.show_error_message(&format!("Failed to start {}: {}", CLIENT_NAME, e), None);
        }
    }
}

fn launch(ctx: &ExtensionContext) -> Result<LanguageClient, LaunchError> {
    let config = LauncherConfig::resolve(ctx.extension_path(), &ctx.settings)?;

    let server = ServerOptions {
        command: config.executable_path,
        args: config.extra_args,
        transport: TransportKind::Stdio,
    };
    let mut options = ClientOptions::for_language(&config.language_id);
    if let Some(root) = &ctx.workspace_root {
        options = options.with_workspace_root(root);
    }

    let client = LanguageClient::new(CLIENT_ID, CLIENT_NAME, server, options)?;
    // The handshake completes in the background
    drop(client.start()?);
    Ok(client)
}

/// Stops the client created by [`activate`], if any.
///
/// The returned future resolves once the server has shut down; without a
/// client it is already resolved.
pub fn deactivate(ctx: &mut ExtensionContext) -> Deactivation {
    let Some(client) = ctx.client.take() else {
        return future::ready(Ok(())).boxed();
    };

    info!("Deactivating {}", CLIENT_NAME);
    ctx.state = LauncherState::Stopped;
    client.stop()
}
