use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures. Everything here ends the run without a result.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("{0:#}")]
    Setup(anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Input(_) => ErrorKind::Input,
            Error::Setup(_) => ErrorKind::Setup,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Input => 2,
            ErrorKind::Setup => 1,
        }
    }

    /// Machine-readable form printed in place of a result.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Input,
    Setup,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Bad caller-supplied input.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("reference descriptor is not a JSON array of numbers: {0}")]
    MalformedReference(#[source] serde_json::Error),
    #[error("reference descriptor is empty")]
    EmptyReference,
    #[error("reference descriptor value at index {index} is not finite")]
    NonFiniteReference { index: usize },
    #[error("cannot read reference file {path}: {source}")]
    UnreadableReference {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("video source {path} does not exist")]
    MissingVideo { path: PathBuf },
    #[error("cannot open video source {path}: {source:#}")]
    UnreadableVideo {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// The extractor failed on one sampled frame. Recovered by skipping the frame.
#[derive(Debug, Error)]
#[error("face extraction failed on frame {frame}: {source:#}")]
pub struct ExtractionError {
    pub frame: usize,
    #[source]
    pub source: anyhow::Error,
}

/// Why a frame stream stopped. Neither variant is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Exhausted,
    DecodeFailed { after_frame: usize, reason: String },
}

impl std::fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamEnd::Exhausted => write!(f, "end of stream"),
            StreamEnd::DecodeFailed {
                after_frame,
                reason,
            } => write!(f, "decode failed after frame {}: {}", after_frame, reason),
        }
    }
}
