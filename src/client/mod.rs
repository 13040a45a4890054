// Language client layer
// - language_client.rs: LanguageClient lifecycle (start, documents, stop)
// - connection.rs: request/response correlation and the server reader loop
// - message.rs: classification of incoming JSON-RPC frames
// - transport.rs: Content-Length framing over async streams
// - options.rs: ServerOptions, ClientOptions, document selector matching
// - error.rs: ClientError, TransportError

mod connection;
pub mod error;
pub mod language_client;
pub mod message;
pub mod options;
pub mod transport;

pub use error::{ClientError, TransportError};
pub use language_client::{ClientState, LanguageClient};
pub use options::{ClientOptions, DEFAULT_SHUTDOWN_TIMEOUT, ServerOptions, TransportKind};
