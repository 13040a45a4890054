use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::*;
use tracing::{debug, error, info, warn};

use super::connection::{Connection, lock, read_loop};
use super::error::ClientError;
use super::options::{ClientOptions, ServerOptions, TransportKind};
use super::transport::FrameReader;

/// Time the server gets to exit on its own after stdin is closed.
const EXIT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Lifecycle of a [`LanguageClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    NotStarted,
    /// Process spawned, `initialize` in flight.
    Starting,
    Running,
    /// Process spawned but the handshake failed.
    StartFailed,
    Stopping,
    Stopped,
}

/// Editor-side client for a language server running as a child process.
///
/// Cloning yields another handle to the same client.
#[derive(Clone)]
pub struct LanguageClient {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    name: String,
    server: ServerOptions,
    options: ClientOptions,
    state: watch::Sender<ClientState>,
    connection: Mutex<Option<Arc<Connection>>>,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    capabilities: Mutex<Option<ServerCapabilities>>,
    open_documents: Mutex<HashSet<Url>>,
}

impl LanguageClient {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        server: ServerOptions,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        if server.command.as_os_str().is_empty() {
            return Err(ClientError::InvalidServerOptions(
                "server command is empty".to_string(),
            ));
        }

        let (state, _) = watch::channel(ClientState::NotStarted);
        Ok(Self {
            inner: Arc::new(Inner {
                id: id.into(),
                name: name.into(),
                server,
                options,
                state,
                connection: Mutex::new(None),
                child: Mutex::new(None),
                reader: Mutex::new(None),
                capabilities: Mutex::new(None),
                open_documents: Mutex::new(HashSet::new()),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn server_options(&self) -> &ServerOptions {
        &self.inner.server
    }

    pub fn client_options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.borrow()
    }

    /// Capabilities announced by the server, once initialized.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        lock(&self.inner.capabilities).clone()
    }

    /// Spawns the server and kicks off the `initialize` handshake.
    ///
    /// Spawning happens before this returns, so a missing binary is reported
    /// here. The handshake runs on a background task; the returned handle may
    /// be awaited or dropped. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<JoinHandle<Result<InitializeResult, ClientError>>, ClientError> {
        let mut claimed = false;
        self.inner.state.send_if_modified(|state| {
            if *state == ClientState::NotStarted {
                *state = ClientState::Starting;
                claimed = true;
            }
            claimed
        });
        if !claimed {
            return Err(ClientError::AlreadyStarted(self.inner.id.clone()));
        }

        let (child, connection, reader) = match self.inner.spawn_process() {
            Ok(spawned) => spawned,
            Err(e) => {
                self.inner.state.send_replace(ClientState::Stopped);
                return Err(e);
            }
        };

        *lock(&self.inner.child) = Some(child);
        *lock(&self.inner.connection) = Some(connection.clone());
        *lock(&self.inner.reader) = Some(tokio::spawn(read_loop(reader, connection.clone())));

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            let result = inner.initialize(&connection).await;
            match &result {
                Ok(_) => {
                    inner.state.send_if_modified(|state| {
                        let starting = *state == ClientState::Starting;
                        if starting {
                            *state = ClientState::Running;
                        }
                        starting
                    });
                    info!("{} initialized", inner.name);
                }
                Err(e) => {
                    inner.state.send_if_modified(|state| {
                        let starting = *state == ClientState::Starting;
                        if starting {
                            *state = ClientState::StartFailed;
                        }
                        starting
                    });
                    error!("{} failed to initialize: {}", inner.name, e);
                }
            }
            result
        }))
    }

    /// Waits until the handshake has finished and reports whether the client is usable.
    pub async fn on_ready(&self) -> Result<(), ClientError> {
        self.ready_connection().await.map(|_| ())
    }

    /// Sends `textDocument/didOpen` if the document is governed by this client
    /// and not already open.
    ///
    /// Returns whether the document was forwarded.
    pub async fn did_open(&self, document: TextDocumentItem) -> Result<bool, ClientError> {
        if !self
            .inner
            .options
            .selects(&document.uri, &document.language_id)
        {
            debug!("Not forwarding {} ({})", document.uri, document.language_id);
            return Ok(false);
        }
        if self.is_open(&document.uri) {
            debug!("{} is already open", document.uri);
            return Ok(false);
        }

        let connection = self.ready_connection().await?;
        let uri = document.uri.clone();
        let params = DidOpenTextDocumentParams {
            text_document: document,
        };
        connection
            .notify(
                "textDocument/didOpen",
                Some(serde_json::to_value(params)?),
            )
            .await?;
        lock(&self.inner.open_documents).insert(uri);
        Ok(true)
    }

    /// Sends the full new text of an open document.
    pub async fn did_change(
        &self,
        uri: Url,
        version: i32,
        text: String,
    ) -> Result<bool, ClientError> {
        if !self.is_open(&uri) {
            return Ok(false);
        }

        let connection = self.ready_connection().await?;
        let params = DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier { uri, version },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text,
            }],
        };
        connection
            .notify(
                "textDocument/didChange",
                Some(serde_json::to_value(params)?),
            )
            .await?;
        Ok(true)
    }

    pub async fn did_close(&self, uri: Url) -> Result<bool, ClientError> {
        if !lock(&self.inner.open_documents).remove(&uri) {
            return Ok(false);
        }

        let connection = self.ready_connection().await?;
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
        };
        connection
            .notify(
                "textDocument/didClose",
                Some(serde_json::to_value(params)?),
            )
            .await?;
        Ok(true)
    }

    fn is_open(&self, uri: &Url) -> bool {
        lock(&self.inner.open_documents).contains(uri)
    }

    async fn ready_connection(&self) -> Result<Arc<Connection>, ClientError> {
        let mut state = self.inner.state.subscribe();
        let settled = state
            .wait_for(|state| *state != ClientState::Starting)
            .await
            .map(|state| *state)
            .map_err(|_| ClientError::NotRunning(self.inner.id.clone()))?;

        if settled != ClientState::Running {
            return Err(ClientError::NotRunning(self.inner.id.clone()));
        }

        lock(&self.inner.connection)
            .clone()
            .ok_or_else(|| ClientError::NotRunning(self.inner.id.clone()))
    }

    /// Stops the server: `shutdown`, `exit`, close stdin, wait, kill if needed.
    ///
    /// The stop runs on its own task and proceeds even if the returned future
    /// is dropped; awaiting it waits for the server to be gone. Stopping a
    /// client that never started or already stopped resolves to `Ok(())`.
    pub fn stop(&self) -> BoxFuture<'static, Result<(), ClientError>> {
        let inner = self.inner.clone();
        let stopping = tokio::spawn(async move { inner.shutdown().await });
        async move { stopping.await? }.boxed()
    }
}

impl Inner {
    fn spawn_process(
        &self,
    ) -> Result<
        (
            Child,
            Arc<Connection>,
            FrameReader<BufReader<tokio::process::ChildStdout>>,
        ),
        ClientError,
    > {
        match self.server.transport {
            TransportKind::Stdio => {}
        }

        debug!(
            command = %self.server.command.display(),
            args = ?self.server.args,
            "Spawning language server"
        );

        let mut child = Command::new(&self.server.command)
            .args(&self.server.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ClientError::BinaryNotFound {
                        command: self.server.command.display().to_string(),
                        source: e,
                    }
                } else {
                    ClientError::SpawnFailed {
                        message: format!("failed to start {}", self.server.command.display()),
                        source: e,
                    }
                }
            })?;

        let stdin = child.stdin.take().ok_or_else(|| ClientError::SpawnFailed {
            message: "failed to capture stdin".to_string(),
            source: std::io::Error::other("no stdin"),
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::SpawnFailed {
                message: "failed to capture stdout".to_string(),
                source: std::io::Error::other("no stdout"),
            })?;

        info!(pid = child.id(), "{} spawned", self.name);

        Ok((
            child,
            Arc::new(Connection::new(stdin)),
            FrameReader::new(BufReader::new(stdout)),
        ))
    }

    fn initialize_params(&self) -> InitializeParams {
        let root_uri = self
            .options
            .workspace_root
            .as_deref()
            .and_then(|root| Url::from_directory_path(root).ok());
        let workspace_folders = root_uri.as_ref().map(|uri| {
            let name = self
                .options
                .workspace_root
                .as_deref()
                .and_then(|root| root.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| uri.to_string());
            vec![WorkspaceFolder {
                uri: uri.clone(),
                name,
            }]
        });

        InitializeParams {
            process_id: Some(std::process::id()),
            root_uri,
            workspace_folders,
            capabilities: ClientCapabilities::default(),
            client_info: Some(ClientInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        }
    }

    async fn initialize(&self, connection: &Connection) -> Result<InitializeResult, ClientError> {
        let params = serde_json::to_value(self.initialize_params())?;
        let result = connection.request("initialize", Some(params)).await?;
        let result: InitializeResult = serde_json::from_value(result)?;

        if let Some(info) = &result.server_info {
            info!(
                "Connected to {} {}",
                info.name,
                info.version.as_deref().unwrap_or("")
            );
        }
        *lock(&self.capabilities) = Some(result.capabilities.clone());

        connection
            .notify(
                "initialized",
                Some(serde_json::to_value(InitializedParams {})?),
            )
            .await?;
        Ok(result)
    }

    async fn shutdown(&self) -> Result<(), ClientError> {
        let mut previous = ClientState::NotStarted;
        self.state.send_if_modified(|state| {
            previous = *state;
            let live = matches!(
                state,
                ClientState::Starting | ClientState::Running | ClientState::StartFailed
            );
            if live {
                *state = ClientState::Stopping;
            }
            live
        });
        if !matches!(
            previous,
            ClientState::Starting | ClientState::Running | ClientState::StartFailed
        ) {
            debug!("{} is {:?}, nothing to stop", self.name, previous);
            return Ok(());
        }

        info!("Stopping {}", self.name);
        let connection = lock(&self.connection).take();
        let child = lock(&self.child).take();
        let reader = lock(&self.reader).take();
        lock(&self.open_documents).clear();

        if let Some(connection) = &connection {
            if previous == ClientState::Running {
                self.request_shutdown(connection).await;
            }
            if let Err(e) = connection.close().await {
                debug!("Closing server stdin failed: {}", e);
            }
        }

        let result = match child {
            Some(child) => terminate_child(child, &self.name).await,
            None => Ok(()),
        };

        if let Some(reader) = reader {
            reader.abort();
        }
        if let Some(connection) = connection {
            connection.fail_pending();
        }

        self.state.send_replace(ClientState::Stopped);
        info!("{} stopped", self.name);
        result
    }

    async fn request_shutdown(&self, connection: &Connection) {
        match tokio::time::timeout(
            self.options.shutdown_timeout,
            connection.request("shutdown", None),
        )
        .await
        {
            Ok(Ok(_)) => debug!("{} acknowledged shutdown", self.name),
            Ok(Err(e)) => debug!("Shutdown request failed: {}", e),
            Err(_) => warn!(
                "{} did not answer shutdown within {:?}",
                self.name, self.options.shutdown_timeout
            ),
        }

        if let Err(e) = connection.notify("exit", None).await {
            debug!("Exit notification failed: {}", e);
        }
    }
}

async fn terminate_child(mut child: Child, name: &str) -> Result<(), ClientError> {
    let waited = tokio::time::timeout(EXIT_GRACE_PERIOD, child.wait()).await;
    match waited {
        Ok(Ok(status)) => {
            debug!(?status, "{} exited", name);
            Ok(())
        }
        Ok(Err(e)) => Err(ClientError::Wait(e)),
        Err(_) => {
            warn!("{} did not exit within {:?}, killing it", name, EXIT_GRACE_PERIOD);
            child.kill().await.map_err(ClientError::Wait)
        }
    }
}

impl std::fmt::Debug for LanguageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageClient")
            .field("id", &self.inner.id)
            .field("command", &self.inner.server.command)
            .field("state", &self.state())
            .finish()
    }
}
