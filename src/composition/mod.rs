//! Composition generation: quantization, module assignment, the document
//! format and its persistence.

pub mod assign;
pub mod document;
pub mod quantize;
pub mod store;

pub use assign::{
    strategy_for, Alternating, AssignmentStrategy, CatalogCycle, ModuleAssigner, TagContext,
};
pub use document::{
    decode, encode, CompositionDocument, EncodedDocument, ModuleAssignment, ModuleRef, Note,
    SCHEMA_VERSION,
};
pub use quantize::{snap, snap_onsets, GridQuantizer};
pub use store::{CompositionStore, CompositionView};

use std::path::Path;
use std::sync::Arc;

use crate::config::ChroniclerConfig;
use crate::error::GenerationError;
use crate::recognition::SpeechRecognizer;

/// Audio file in, composition document out.
#[derive(Clone)]
pub struct GenerationPipeline {
    quantizer: GridQuantizer,
    assigner: ModuleAssigner,
}

impl GenerationPipeline {
    pub fn new(config: Arc<ChroniclerConfig>, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            quantizer: GridQuantizer::new(config.clone(), recognizer),
            assigner: ModuleAssigner::new(config),
        }
    }

    /// Blocking; run it on the blocking thread pool.
    pub fn run(&self, audio_path: &Path, language: &str) -> Result<CompositionDocument, GenerationError> {
        let onsets = self.quantizer.quantize(audio_path, language)?;
        let document = self.assigner.assign(&onsets)?;
        document.validate()?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{speech_wav, test_config, FixedRecognizer};

    #[test]
    fn test_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(dir.path()));
        let pipeline = GenerationPipeline::new(
            config,
            Arc::new(FixedRecognizer::new(vec![0.01, 0.02, 0.20, 1.5])),
        );

        let audio = dir.path().join("speech.wav");
        std::fs::write(&audio, speech_wav()).unwrap();

        let doc = pipeline.run(&audio, "en").unwrap();
        let onsets: Vec<f64> = doc.notes.iter().map(|n| n.onset).collect();
        assert_eq!(onsets, vec![0.0, 0.1875, 1.5]);
        assert_eq!(doc.parameters.len(), 3);
    }

    #[test]
    fn test_pipeline_surfaces_recognition_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(dir.path()));
        let pipeline = GenerationPipeline::new(config, Arc::new(FixedRecognizer::new(vec![])));

        let err = pipeline.run(&dir.path().join("missing.wav"), "en").unwrap_err();
        assert!(matches!(err, GenerationError::Recognition(_)));
    }
}
