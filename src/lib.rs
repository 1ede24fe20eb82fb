// Core modules
mod config;
mod db;
mod error;
mod page;
mod types;

// Generation pipeline
pub mod composition;
pub mod jobs;
pub mod media;
pub mod recognition;

// Service layer
pub mod api;
mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types and functions
pub use config::{ChroniclerConfig, Module, RecognizerConfig, StrategyKind, UploadsConfig};
pub use db::schema::{ChronicleRecord, CompositionRecord, CompositionStatus, FileRecord};
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use error::{
    AdmissionError, AssignmentError, GenerationError, RecognitionError, ServiceError,
    ServiceResult, StoreError,
};
pub use page::{Page, PageParams};
pub use types::{ChronicleId, CompositionId, FileId};

pub use composition::{CompositionDocument, GenerationPipeline};
pub use orchestrator::{ChronicleInput, Orchestrator};
pub use recognition::{EnergyRecognizer, SpeechRecognizer};
