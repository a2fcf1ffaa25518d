//! Error taxonomy shared by the decoder, scene construction and the asset
//! collaborators.
use thiserror::Error;

/// The payload could not be turned into a [`ParsedMesh`](crate::ParsedMesh).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Structurally broken or incomplete payload.
    #[error("malformed model payload: {reason}")]
    Malformed { reason: String },

    /// A PLY variant other than ASCII (binary encodings are not supported).
    #[error("unsupported model format: {format}")]
    UnsupportedFormat { format: String },
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// A decoded mesh that cannot be turned into a renderable object.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("mesh has no vertices")]
    Empty,

    #[error("vertex {index} has a non-finite coordinate")]
    NonFinite { index: usize },

    #[error("triangle {triangle} references vertex {vertex} but only {count} exist")]
    IndexOutOfRange {
        triangle: usize,
        vertex: u32,
        count: usize,
    },
}

/// Failure talking to the generation service or fetching the asset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("generation request failed: {reason}")]
    Request { reason: String },

    #[error("generation service returned an unusable response: {reason}")]
    BadResponse { reason: String },

    #[error("failed to fetch asset {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("no response after {after_secs}s")]
    Timeout { after_secs: u64 },
}
