//! The composition document and its versioned storage encoding.
//!
//! Stored payloads are JSON envelopes of the form
//! `{"version": 1, "notes": [...], "parameters": [...]}`. The version is read
//! first so that rows written by a future schema are rejected instead of
//! being decoded into the wrong shape.

use serde::{Deserialize, Serialize};

use crate::error::{AssignmentError, StoreError};

/// Version of the document schema written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// A note event: onset and duration in seconds. Serialized as a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Note {
    pub onset: f64,
    pub duration: f64,
}

impl From<(f64, f64)> for Note {
    fn from((onset, duration): (f64, f64)) -> Self {
        Self { onset, duration }
    }
}

impl From<Note> for (f64, f64) {
    fn from(note: Note) -> Self {
        (note.onset, note.duration)
    }
}

/// Voice and catalog index of a module. Serialized as a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct ModuleRef {
    pub voice: usize,
    pub index: usize,
}

impl From<(usize, usize)> for ModuleRef {
    fn from((voice, index): (usize, usize)) -> Self {
        Self { voice, index }
    }
}

impl From<ModuleRef> for (usize, usize) {
    fn from(module: ModuleRef) -> Self {
        (module.voice, module.index)
    }
}

/// Tags and module chosen for one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAssignment {
    #[serde(rename = "parameters")]
    pub parameter_names: Vec<String>,
    pub module: ModuleRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionDocument {
    pub notes: Vec<Note>,
    /// Index-aligned with `notes`.
    pub parameters: Vec<ModuleAssignment>,
}

impl CompositionDocument {
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Check the structural invariants: aligned sequences, known voices and
    /// onsets in non-decreasing order.
    pub fn validate(&self) -> Result<(), AssignmentError> {
        if self.notes.len() != self.parameters.len() {
            return Err(AssignmentError::MisalignedDocument {
                notes: self.notes.len(),
                parameters: self.parameters.len(),
            });
        }
        if let Some(assignment) = self.parameters.iter().find(|p| p.module.voice > 1) {
            return Err(AssignmentError::UnknownVoice {
                voice: assignment.module.voice,
            });
        }

        let mut prev = f64::NEG_INFINITY;
        for (index, note) in self.notes.iter().enumerate() {
            if !note.onset.is_finite() || note.onset < prev {
                return Err(AssignmentError::UnorderedOnsets { index });
            }
            prev = note.onset;
        }
        Ok(())
    }
}

/// Serialized form of a document as stored in the `data` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDocument(String);

impl EncodedDocument {
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    #[serde(flatten)]
    document: &'a CompositionDocument,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(flatten)]
    document: CompositionDocument,
}

pub fn encode(document: &CompositionDocument) -> Result<EncodedDocument, StoreError> {
    let envelope = EnvelopeRef {
        version: SCHEMA_VERSION,
        document,
    };
    serde_json::to_string(&envelope)
        .map(EncodedDocument)
        .map_err(|e| StoreError::Codec(e.to_string()))
}

pub fn decode(encoded: &EncodedDocument) -> Result<CompositionDocument, StoreError> {
    let probe: VersionProbe =
        serde_json::from_str(encoded.as_str()).map_err(|e| StoreError::Codec(e.to_string()))?;
    if probe.version != SCHEMA_VERSION {
        return Err(StoreError::Codec(format!(
            "unsupported document version {}",
            probe.version
        )));
    }

    let envelope: Envelope =
        serde_json::from_str(encoded.as_str()).map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(envelope.document)
}
