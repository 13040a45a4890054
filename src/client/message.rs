//! JSON-RPC message classification for frames read from the server

use serde::Deserialize;
use tower_lsp::jsonrpc::{Request, Response};

use super::error::ClientError;

/// A message received from the language server.
#[derive(Debug)]
pub enum Incoming {
    /// Reply to one of our requests.
    Response(Response),
    /// Server-initiated request expecting a reply.
    Request(Request),
    /// Server notification.
    Notification(Request),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMessage {
    Request(Request),
    Response(Response),
}

impl Incoming {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ClientError> {
        let message = match serde_json::from_slice(bytes)? {
            RawMessage::Request(request) if request.id().is_some() => Self::Request(request),
            RawMessage::Request(notification) => Self::Notification(notification),
            RawMessage::Response(response) => Self::Response(response),
        };
        Ok(message)
    }
}
