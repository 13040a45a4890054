//! Request/response correlation over a framed stdio channel

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::oneshot;
use tower_lsp::jsonrpc::{self, Id, Request, Response};
use tower_lsp::lsp_types::{LogMessageParams, MessageType, ShowMessageParams};
use tracing::{debug, error, info, warn};

use super::error::ClientError;
use super::message::Incoming;
use super::transport::{FrameReader, FrameWriter};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outgoing half of the channel plus the table of requests awaiting replies.
pub(crate) struct Connection {
    writer: tokio::sync::Mutex<FrameWriter<BoxedWriter>>,
    pending: Mutex<HashMap<i64, oneshot::Sender<Response>>>,
    next_id: AtomicI64,
}

impl Connection {
    pub(crate) fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(FrameWriter::new(Box::new(writer))),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Sends a request and waits for the matching response.
    pub(crate) async fn request(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let mut builder = Request::build(method).id(id);
        if let Some(params) = params {
            builder = builder.params(params);
        }

        debug!("Sending request {} ({})", method, id);
        if let Err(e) = self.send(&builder.finish()).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        let response = rx.await.map_err(|_| ClientError::ProcessExited)?;
        let (_, result) = response.into_parts();
        result.map_err(|e| ClientError::Server {
            code: e.code.code(),
            message: e.message.to_string(),
        })
    }

    pub(crate) async fn notify(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<(), ClientError> {
        let mut builder = Request::build(method);
        if let Some(params) = params {
            builder = builder.params(params);
        }

        debug!("Sending notification {}", method);
        self.send(&builder.finish()).await
    }

    pub(crate) async fn respond(&self, response: Response) -> Result<(), ClientError> {
        self.send(&response).await
    }

    async fn send(&self, message: &impl serde::Serialize) -> Result<(), ClientError> {
        let payload = serde_json::to_vec(message)?;
        self.writer.lock().await.write_frame(&payload).await?;
        Ok(())
    }

    /// Closes the server's stdin.
    pub(crate) async fn close(&self) -> Result<(), ClientError> {
        self.writer.lock().await.close().await?;
        Ok(())
    }

    /// Hands a response to the request waiting for it.
    pub(crate) fn complete(&self, response: Response) {
        let waiter = match response.id() {
            Id::Number(id) => lock(&self.pending).remove(id),
            _ => None,
        };

        match waiter {
            Some(tx) => {
                // The requester may have given up already
                let _ = tx.send(response);
            }
            None => warn!("Dropping response with unknown id {:?}", response.id()),
        }
    }

    /// Fails every outstanding request with `ProcessExited`.
    pub(crate) fn fail_pending(&self) {
        let dropped = std::mem::take(&mut *lock(&self.pending));
        if !dropped.is_empty() {
            debug!("Abandoning {} pending requests", dropped.len());
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Fails the pending requests when the reader task ends, whether it returns,
/// unwinds or is aborted.
struct FailPendingOnExit(Arc<Connection>);

impl Drop for FailPendingOnExit {
    fn drop(&mut self) {
        self.0.fail_pending();
    }
}

/// Reads server output until EOF, routing responses and answering server requests.
pub(crate) async fn read_loop<R>(mut reader: FrameReader<R>, connection: Arc<Connection>)
where
    R: AsyncBufRead + Unpin,
{
    let guard = FailPendingOnExit(connection);
    let connection = &guard.0;

    loop {
        let frame = match reader.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Language server closed its output");
                break;
            }
            Err(e) => {
                error!("Failed to read from language server: {}", e);
                break;
            }
        };

        match Incoming::from_slice(&frame) {
            Ok(Incoming::Response(response)) => connection.complete(response),
            Ok(Incoming::Request(request)) => {
                warn!("Declining server request {}", request.method());
                let Some(id) = request.id().cloned() else {
                    continue;
                };
                let reply = Response::from_error(id, jsonrpc::Error::method_not_found());
                if let Err(e) = connection.respond(reply).await {
                    error!("Failed to answer server request: {}", e);
                    break;
                }
            }
            Ok(Incoming::Notification(notification)) => log_notification(&notification),
            Err(e) => warn!("Ignoring malformed message from language server: {}", e),
        }
    }
}

fn log_notification(notification: &Request) {
    let params = notification.params().cloned().unwrap_or(Value::Null);
    match notification.method() {
        "window/logMessage" => match serde_json::from_value::<LogMessageParams>(params) {
            Ok(log) => log_server_message(log.typ, &log.message),
            Err(e) => warn!("Malformed window/logMessage: {}", e),
        },
        "window/showMessage" => match serde_json::from_value::<ShowMessageParams>(params) {
            Ok(show) => log_server_message(show.typ, &show.message),
            Err(e) => warn!("Malformed window/showMessage: {}", e),
        },
        method => debug!("Server notification {}", method),
    }
}

fn log_server_message(typ: MessageType, message: &str) {
    match typ {
        MessageType::ERROR => error!(target: "jsp_lsp", "{}", message),
        MessageType::WARNING => warn!(target: "jsp_lsp", "{}", message),
        MessageType::INFO => info!(target: "jsp_lsp", "{}", message),
        _ => debug!(target: "jsp_lsp", "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncWriteExt, BufReader};

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[tokio::test]
    async fn request_resolves_with_matching_response() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_end);
        let connection = Arc::new(Connection::new(client_write));

        let reader = FrameReader::new(BufReader::new(server_read));
        let reader_task = tokio::spawn(read_loop(reader, connection.clone()));

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request("initialize", Some(json!({}))).await })
        };

        // Wait for the request to land before answering it
        let mut incoming = FrameReader::new(BufReader::new(&mut server_end));
        let sent = incoming.read_frame().await.unwrap().unwrap();
        let sent: Value = serde_json::from_slice(&sent).unwrap();
        assert_eq!(sent["method"], "initialize");
        assert_eq!(sent["id"], 1);

        server_end
            .write_all(&frame(r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#))
            .await
            .unwrap();

        let result = requester.await.unwrap().unwrap();
        assert_eq!(result, json!({"capabilities": {}}));

        drop(server_end);
        reader_task.await.unwrap();
    }

    #[tokio::test]
    async fn error_response_maps_to_server_error() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_end);
        let connection = Arc::new(Connection::new(client_write));
        tokio::spawn(read_loop(
            FrameReader::new(BufReader::new(server_read)),
            connection.clone(),
        ));

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request("shutdown", None).await })
        };

        let mut incoming = FrameReader::new(BufReader::new(&mut server_end));
        incoming.read_frame().await.unwrap().unwrap();
        server_end
            .write_all(&frame(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32603,"message":"boom"}}"#,
            ))
            .await
            .unwrap();

        let err = requester.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Server { code: -32603, ref message } if message == "boom"));
    }

    #[tokio::test]
    async fn eof_fails_pending_requests() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_end);
        let connection = Arc::new(Connection::new(client_write));
        let reader_task = tokio::spawn(read_loop(
            FrameReader::new(BufReader::new(server_read)),
            connection.clone(),
        ));

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request("initialize", None).await })
        };

        let mut incoming = FrameReader::new(BufReader::new(&mut server_end));
        incoming.read_frame().await.unwrap().unwrap();
        drop(incoming);
        drop(server_end);

        reader_task.await.unwrap();
        let err = requester.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::ProcessExited));
        assert_eq!(connection.pending_len(), 0);
    }

    #[tokio::test]
    async fn server_requests_are_declined() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_end);
        let connection = Arc::new(Connection::new(client_write));
        tokio::spawn(read_loop(
            FrameReader::new(BufReader::new(server_read)),
            connection,
        ));

        server_end
            .write_all(&frame(
                r#"{"jsonrpc":"2.0","id":9,"method":"workspace/configuration","params":{"items":[]}}"#,
            ))
            .await
            .unwrap();

        let mut incoming = FrameReader::new(BufReader::new(&mut server_end));
        let reply = incoming.read_frame().await.unwrap().unwrap();
        let reply: Value = serde_json::from_slice(&reply).unwrap();

        assert_eq!(reply["id"], 9);
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn oversized_frame_fails_pending_requests() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_end);
        let connection = Arc::new(Connection::new(client_write));
        let reader_task = tokio::spawn(read_loop(
            FrameReader::new(BufReader::new(server_read)),
            connection.clone(),
        ));

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request("initialize", None).await })
        };

        let mut incoming = FrameReader::new(BufReader::new(&mut server_end));
        incoming.read_frame().await.unwrap().unwrap();
        drop(incoming);
        server_end
            .write_all(b"Content-Length: 18446744073709551615\r\n\r\n{}")
            .await
            .unwrap();

        reader_task.await.unwrap();
        let err = requester.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::ProcessExited));
        assert_eq!(connection.pending_len(), 0);
    }

    #[tokio::test]
    async fn aborted_reader_fails_pending_requests() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_end);
        let connection = Arc::new(Connection::new(client_write));
        let reader_task = tokio::spawn(read_loop(
            FrameReader::new(BufReader::new(server_read)),
            connection.clone(),
        ));

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request("initialize", None).await })
        };

        let mut incoming = FrameReader::new(BufReader::new(&mut server_end));
        incoming.read_frame().await.unwrap().unwrap();

        reader_task.abort();
        assert!(reader_task.await.unwrap_err().is_cancelled());

        let err = requester.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::ProcessExited));
    }
}
