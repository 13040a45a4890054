use std::path::PathBuf;

use thiserror::Error;

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Missing required setting: jspLsp.{0}")]
    MissingSetting(&'static str),

    #[error("Setting jspLsp.{key} is not valid UTF-8: {path:?}")]
    NonUtf8Path { key: &'static str, path: PathBuf },

    #[error(transparent)]
    Client(#[from] ClientError),
}
