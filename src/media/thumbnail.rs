// Thumbnail rendering through ffmpeg.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::config::UploadsConfig;
use crate::media::{MediaCategory, MediaError};

/// Renders a JPEG preview of an uploaded file. Blocking.
pub trait Thumbnailer: Send + Sync {
    fn render(&self, source: &Path, category: MediaCategory, dest: &Path)
        -> Result<(), MediaError>;
}

/// Images are resized, videos contribute their first frame, audio files a
/// waveform picture. All are scaled to fit `max_edge` pixels.
#[derive(Debug, Clone)]
pub struct FfmpegThumbnailer {
    program: String,
    max_edge: u32,
}

impl FfmpegThumbnailer {
    pub fn new(program: impl Into<String>, max_edge: u32) -> Self {
        Self {
            program: program.into(),
            max_edge,
        }
    }

    pub fn from_config(config: &UploadsConfig) -> Self {
        Self::new(config.ffmpeg.clone(), config.thumbnail_size)
    }

    fn scale_filter(&self) -> String {
        format!(
            "scale='min({e},iw)':'min({e},ih)':force_original_aspect_ratio=decrease",
            e = self.max_edge
        )
    }

    pub(crate) fn args(&self, source: &Path, category: MediaCategory, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];

        match category {
            MediaCategory::Image => {
                args.push("-i".into());
                args.push(source.into());
                args.push("-vf".into());
                args.push(self.scale_filter().into());
            }
            MediaCategory::Video => {
                args.push("-ss".into());
                args.push("00:00:00.000".into());
                args.push("-i".into());
                args.push(source.into());
                args.push("-vf".into());
                args.push(self.scale_filter().into());
            }
            MediaCategory::Audio => {
                let graph = format!(
                    "color=c=black[color];\
                     aformat=channel_layouts=mono,showwavespic=s={e}x1024:colors=white[wave];\
                     [color][wave]scale2ref[bg][fg];\
                     [bg][fg]overlay=format=auto,{scale}",
                    e = self.max_edge,
                    scale = self.scale_filter()
                );
                args.push("-i".into());
                args.push(source.into());
                args.push("-filter_complex".into());
                args.push(graph.into());
            }
        }

        args.push("-frames:v".into());
        args.push("1".into());
        args.push(dest.into());
        args
    }
}

impl Thumbnailer for FfmpegThumbnailer {
    fn render(&self, source: &Path, category: MediaCategory, dest: &Path) -> Result<(), MediaError> {
        let output = Command::new(&self.program)
            .args(self.args(source, category, dest))
            .output()
            .map_err(|e| MediaError::Thumbnail(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::Thumbnail(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!("Rendered thumbnail {} for {}", dest.display(), source.display());
        Ok(())
    }
}
