//! Error taxonomy for chronicles and composition generation.
//!
//! Admission errors are returned synchronously to the caller of
//! `request_generation`. Recognition, assignment and storage errors raised
//! after admission end a single job and are only visible through logs and
//! the composition's `failed` status.

use std::fmt;
use std::path::PathBuf;

use crate::media::MediaError;
use crate::types::ChronicleId;

/// Reasons a generation request is rejected before anything is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The chronicle does not exist.
    ChronicleNotFound(ChronicleId),

    /// The chronicle does not own exactly one audio file.
    AudioFileCount { chronicle: ChronicleId, found: usize },
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChronicleNotFound(id) => write!(f, "Chronicle not found: {}", id),
            Self::AudioFileCount { chronicle, found } => write!(
                f,
                "Chronicle {} needs to contain one audio file, found {}",
                chronicle, found
            ),
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Failures while turning an audio file into timed events.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionError {
    /// No model is configured for the language code.
    UnsupportedLanguage(String),

    /// The configured model could not be found or loaded.
    ModelUnavailable { language: String, path: PathBuf },

    /// The audio file is unreadable or corrupt.
    AudioDecode(String),

    /// The recognizer itself failed.
    Recognizer(String),
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedLanguage(code) => write!(f, "Unsupported language: {}", code),
            Self::ModelUnavailable { language, path } => write!(
                f,
                "Recognition model for '{}' unavailable at {}",
                language,
                path.display()
            ),
            Self::AudioDecode(msg) => write!(f, "Could not decode audio: {}", msg),
            Self::Recognizer(msg) => write!(f, "Recognition failed: {}", msg),
        }
    }
}

impl std::error::Error for RecognitionError {}

/// Failures while mapping onsets onto the module catalogs.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentError {
    /// A voice catalog has no modules.
    EmptyCatalog { voice: usize },

    /// A module has a duration that is not a positive finite number.
    InvalidDuration {
        voice: usize,
        module: usize,
        duration: f64,
    },

    /// Onsets must be finite and non-decreasing.
    UnorderedOnsets { index: usize },

    /// The strategy picked a voice outside the two catalogs.
    UnknownVoice { voice: usize },

    /// `notes` and `parameters` differ in length.
    MisalignedDocument { notes: usize, parameters: usize },
}

impl fmt::Display for AssignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCatalog { voice } => write!(f, "Module catalog for voice {} is empty", voice),
            Self::InvalidDuration {
                voice,
                module,
                duration,
            } => write!(
                f,
                "Module {} of voice {} has invalid duration {}",
                module, voice, duration
            ),
            Self::UnorderedOnsets { index } => {
                write!(f, "Onset at index {} is out of order or not finite", index)
            }
            Self::UnknownVoice { voice } => write!(f, "Strategy selected unknown voice {}", voice),
            Self::MisalignedDocument { notes, parameters } => write!(
                f,
                "Document has {} notes but {} parameter entries",
                notes, parameters
            ),
        }
    }
}

impl std::error::Error for AssignmentError {}

/// Failures of the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist.
    NotFound(String),

    /// The composition is no longer pending and cannot be completed or failed.
    NotPending(String),

    /// The composition is still pending and cannot be deleted.
    StillPending(String),

    /// The stored payload could not be encoded or decoded.
    Codec(String),

    /// Database error occurred.
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::NotPending(id) => write!(f, "Composition {} is not pending", id),
            Self::StillPending(id) => write!(f, "Composition {} is not ready yet", id),
            Self::Codec(msg) => write!(f, "Payload codec error: {}", msg),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Anything that can end a running generation job.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    Recognition(RecognitionError),
    Assignment(AssignmentError),
    Storage(StoreError),
    /// The blocking task running recognition panicked or was cancelled.
    Worker(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recognition(err) => write!(f, "{}", err),
            Self::Assignment(err) => write!(f, "{}", err),
            Self::Storage(err) => write!(f, "{}", err),
            Self::Worker(msg) => write!(f, "Worker error: {}", msg),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<RecognitionError> for GenerationError {
    fn from(err: RecognitionError) -> Self {
        Self::Recognition(err)
    }
}

impl From<AssignmentError> for GenerationError {
    fn from(err: AssignmentError) -> Self {
        Self::Assignment(err)
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err)
    }
}

/// Errors returned by the synchronous chronicle, file and composition
/// operations of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// A generation request was rejected.
    Admission(AdmissionError),

    /// The addressed resource does not exist (or belongs to another chronicle).
    NotFound(String),

    /// The request conflicts with the current state.
    Conflict(String),

    /// The operation is not allowed in the current state.
    Forbidden(String),

    /// The request payload is invalid.
    Invalid(String),

    /// The uploaded media type is not on the allow-list.
    UnsupportedMedia(String),

    /// Storing or processing an uploaded file failed.
    Media(String),

    /// The persistence layer failed.
    Storage(StoreError),

    /// Internal error occurred.
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admission(err) => write!(f, "{}", err),
            Self::NotFound(msg) => write!(f, "{}", msg),
            Self::Conflict(msg) => write!(f, "{}", msg),
            Self::Forbidden(msg) => write!(f, "{}", msg),
            Self::Invalid(msg) => write!(f, "{}", msg),
            Self::UnsupportedMedia(mime) => write!(f, "File format {} is not supported", mime),
            Self::Media(msg) => write!(f, "Could not process file: {}", msg),
            Self::Storage(err) => write!(f, "{}", err),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Result type for orchestrator operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<AdmissionError> for ServiceError {
    fn from(err: AdmissionError) -> Self {
        Self::Admission(err)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::StillPending(id) => {
                Self::Forbidden(format!("Can't delete composition {} which is not ready yet", id))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<MediaError> for ServiceError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::UnsupportedType(mime) => Self::UnsupportedMedia(mime),
            other => Self::Media(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
