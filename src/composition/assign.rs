// Module assignment: quantized onsets -> composition document.
//
// Each voice keeps a rotation pointer into its catalog. The strategy decides
// which voice plays an onset; the pointer of that voice then advances by one
// and wraps around the catalog.

use std::sync::Arc;

use crate::composition::document::{CompositionDocument, ModuleAssignment, ModuleRef, Note};
use crate::config::{ChroniclerConfig, Module, StrategyKind};
use crate::error::AssignmentError;

/// Interval of the beat used for the `accent` tag, in seconds (a quarter
/// note at 120 bpm).
const BEAT: f64 = 0.5;

/// Gap after which an onset starts a new phrase, in seconds.
const PHRASE_GAP: f64 = 1.0;

const ON_BEAT_EPSILON: f64 = 1e-9;

/// What a strategy gets to see when deriving the tags of one note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagContext {
    pub index: usize,
    pub onset: f64,
    pub previous_onset: Option<f64>,
    pub module: ModuleRef,
}

pub fn default_tags(ctx: &TagContext) -> Vec<String> {
    let mut tags = Vec::new();

    let beats = ctx.onset / BEAT;
    if (beats - beats.round()).abs() < ON_BEAT_EPSILON {
        tags.push("accent");
    }
    match ctx.previous_onset {
        None => tags.push("phrase-start"),
        Some(prev) if ctx.onset - prev >= PHRASE_GAP => tags.push("phrase-start"),
        Some(_) => {}
    }
    tags.push(if ctx.module.voice == 0 {
        "voice-lead"
    } else {
        "voice-follow"
    });
    if ctx.module.index == 0 {
        tags.push("rotation-start");
    }

    tags.into_iter().map(String::from).collect()
}

/// Picks the voice of each onset and derives its tags.
///
/// `voice_for` must be a pure function of its arguments so that assignment
/// stays reproducible.
pub trait AssignmentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn voice_for(&self, index: usize, catalog_lens: [usize; 2]) -> usize;

    fn tags(&self, ctx: &TagContext) -> Vec<String> {
        default_tags(ctx)
    }
}

/// Even onsets go to voice 0, odd ones to voice 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Alternating;

impl AssignmentStrategy for Alternating {
    fn name(&self) -> &'static str {
        "alternating"
    }

    fn voice_for(&self, index: usize, _catalog_lens: [usize; 2]) -> usize {
        index % 2
    }
}

/// Plays the whole catalog of voice 0, then the whole catalog of voice 1,
/// and starts over.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogCycle;

impl AssignmentStrategy for CatalogCycle {
    fn name(&self) -> &'static str {
        "catalog-cycle"
    }

    fn voice_for(&self, index: usize, catalog_lens: [usize; 2]) -> usize {
        let cycle = (catalog_lens[0] + catalog_lens[1]).max(1);
        if index % cycle < catalog_lens[0] { 0 } else { 1 }
    }
}

pub fn strategy_for(kind: StrategyKind) -> Arc<dyn AssignmentStrategy> {
    match kind {
        StrategyKind::Alternating => Arc::new(Alternating),
        StrategyKind::CatalogCycle => Arc::new(CatalogCycle),
    }
}

#[derive(Clone)]
pub struct ModuleAssigner {
    config: Arc<ChroniclerConfig>,
    strategy: Arc<dyn AssignmentStrategy>,
}

impl ModuleAssigner {
    /// Assigner using the strategy named in the configuration.
    pub fn new(config: Arc<ChroniclerConfig>) -> Self {
        let strategy = strategy_for(config.strategy);
        Self { config, strategy }
    }

    pub fn with_strategy(
        config: Arc<ChroniclerConfig>,
        strategy: Arc<dyn AssignmentStrategy>,
    ) -> Self {
        Self { config, strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// The catalog module a reference points to.
    pub fn module_reference(&self, module: ModuleRef) -> Option<&Module> {
        self.config.voices.get(module.voice)?.get(module.index)
    }

    fn check_catalogs(&self) -> Result<[usize; 2], AssignmentError> {
        for (voice, catalog) in self.config.voices.iter().enumerate() {
            if catalog.is_empty() {
                return Err(AssignmentError::EmptyCatalog { voice });
            }
            for (module, m) in catalog.iter().enumerate() {
                if !m.duration.is_finite() || m.duration <= 0.0 {
                    return Err(AssignmentError::InvalidDuration {
                        voice,
                        module,
                        duration: m.duration,
                    });
                }
            }
        }
        Ok([self.config.voices[0].len(), self.config.voices[1].len()])
    }

    pub fn assign(&self, onsets: &[f64]) -> Result<CompositionDocument, AssignmentError> {
        let lens = self.check_catalogs()?;

        let mut prev = f64::NEG_INFINITY;
        for (index, &onset) in onsets.iter().enumerate() {
            if !onset.is_finite() || onset < prev {
                return Err(AssignmentError::UnorderedOnsets { index });
            }
            prev = onset;
        }

        let mut pointers = [0usize; 2];
        let mut document = CompositionDocument {
            notes: Vec::with_capacity(onsets.len()),
            parameters: Vec::with_capacity(onsets.len()),
        };

        for (index, &onset) in onsets.iter().enumerate() {
            let voice = self.strategy.voice_for(index, lens);
            if voice >= lens.len() {
                return Err(AssignmentError::UnknownVoice { voice });
            }

            let module = ModuleRef {
                voice,
                index: pointers[voice] % lens[voice],
            };
            pointers[voice] += 1;

            let ctx = TagContext {
                index,
                onset,
                previous_onset: index.checked_sub(1).map(|i| onsets[i]),
                module,
            };

            document.notes.push(Note {
                onset,
                duration: self.config.voices[voice][module.index].duration,
            });
            document.parameters.push(ModuleAssignment {
                parameter_names: self.strategy.tags(&ctx),
                module,
            });
        }

        Ok(document)
    }
}
