//! Static configuration: grid size, language model table, voice catalogs and
//! the knobs of the surrounding service.
//!
//! The configuration is read once at start-up, validated, and then shared as
//! an immutable `Arc<ChroniclerConfig>`.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

/// Grid size of the composition in seconds: a 32nd note at 120 bpm.
pub const DEFAULT_GRID_SIZE: f64 = 0.0625;

/// A pre-authored musical fragment of one voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Reference handed to the renderer (a MIDI file name).
    pub file: String,
    /// Nominal duration in seconds, authored by hand rather than measured.
    pub duration: f64,
}

impl Module {
    pub fn new(file: impl Into<String>, duration: f64) -> Self {
        Self {
            file: file.into(),
            duration,
        }
    }
}

/// Which assignment strategy picks the voice of each onset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Voices take turns: even onsets go to voice 0, odd ones to voice 1.
    #[default]
    Alternating,
    /// Play through the whole catalog of voice 0, then the one of voice 1.
    CatalogCycle,
}

/// Tuning of the built-in energy based recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Analysis frame length in milliseconds.
    pub frame_ms: u32,
    /// Frames louder than `peak + threshold_db` count as speech.
    pub threshold_db: f32,
    /// Quiet time that separates two events, in milliseconds.
    pub min_silence_ms: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            frame_ms: 20,
            threshold_db: -30.0,
            min_silence_ms: 80,
        }
    }
}

/// Where uploads live and how thumbnails are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    pub dir: PathBuf,
    /// URL prefix under which `dir` is served.
    pub url_prefix: String,
    /// Maximum edge length of generated thumbnails, in pixels.
    pub thumbnail_size: u32,
    pub max_upload_bytes: usize,
    /// ffmpeg executable used for thumbnails.
    pub ffmpeg: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            url_prefix: "/uploads".to_string(),
            thumbnail_size: 1600,
            max_upload_bytes: 512 * 1024 * 1024,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChroniclerConfig {
    /// Quantization step in seconds.
    pub grid_size: f64,
    /// Language used for chronicles that don't name one.
    pub default_language: String,
    /// Recognition model path per language code.
    pub models: BTreeMap<String, PathBuf>,
    /// Module catalogs of the two voices.
    pub voices: [Vec<Module>; 2],
    pub strategy: StrategyKind,
    /// Number of generation workers.
    pub workers: usize,
    pub recognizer: RecognizerConfig,
    pub uploads: UploadsConfig,
}

impl Default for ChroniclerConfig {
    fn default() -> Self {
        let models = [
            ("cn", "models/vosk-model-small-cn-0.22.zip"),
            ("de", "models/vosk-model-small-de-0.15.zip"),
            ("en", "models/vosk-model-small-en-us-0.15"),
            ("es", "models/vosk-model-small-es-0.42.zip"),
            ("fr", "models/vosk-model-small-fr-0.22.zip"),
            ("it", "models/vosk-model-small-it-0.22.zip"),
            ("ja", "models/vosk-model-small-ja-0.22.zip"),
            ("pl", "models/vosk-model-small-pl-0.22.zip"),
            ("ru", "models/vosk-model-small-ru-0.22.zip"),
        ]
        .into_iter()
        .map(|(code, path)| (code.to_string(), PathBuf::from(path)))
        .collect();

        // Three eighth notes at 120 bpm.
        let voice = |range: std::ops::RangeInclusive<u32>| {
            range
                .map(|n| Module::new(format!("module-3notes-{}.mid", n), 0.375))
                .collect::<Vec<_>>()
        };

        Self {
            grid_size: DEFAULT_GRID_SIZE,
            default_language: "en".to_string(),
            models,
            voices: [voice(1..=3), voice(4..=7)],
            strategy: StrategyKind::default(),
            workers: 2,
            recognizer: RecognizerConfig::default(),
            uploads: UploadsConfig::default(),
        }
    }
}

impl ChroniclerConfig {
    /// Load the configuration file if one can be found, otherwise fall back
    /// to the built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        match resolve_config_path() {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let mut cfg: ChroniclerConfig = serde_json::from_str(raw)?;

        for path in cfg.models.values_mut() {
            *path = PathBuf::from(expand_env_vars(&path.to_string_lossy()));
        }
        cfg.uploads.dir = PathBuf::from(expand_env_vars(&cfg.uploads.dir.to_string_lossy()));

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engines could never work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.grid_size.is_finite() || self.grid_size <= 0.0 {
            anyhow::bail!("grid_size must be a positive number, got {}", self.grid_size);
        }
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        for (voice, catalog) in self.voices.iter().enumerate() {
            if catalog.is_empty() {
                anyhow::bail!("module catalog of voice {} is empty", voice);
            }
            if let Some(module) = catalog
                .iter()
                .find(|m| !m.duration.is_finite() || m.duration <= 0.0)
            {
                anyhow::bail!(
                    "module `{}` of voice {} has invalid duration {}",
                    module.file,
                    voice,
                    module.duration
                );
            }
        }
        if self.recognizer.frame_ms == 0 {
            anyhow::bail!("recognizer.frame_ms must be at least 1");
        }
        if !self.models.contains_key(&self.default_language) {
            tracing::warn!(
                "Default language `{}` has no configured model; generation will fail for chronicles using it",
                self.default_language
            );
        }
        Ok(())
    }

    /// Model path configured for a language code.
    pub fn model_path(&self, language: &str) -> Option<&Path> {
        self.models.get(language).map(PathBuf::as_path)
    }
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("CHRONICLER_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("chronicler").join("chronicler.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("chronicler.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Replace `${NAME}` with the value of the environment variable; unknown
/// variables are left untouched.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
