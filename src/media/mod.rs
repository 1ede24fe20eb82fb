//! Uploaded media: the MIME allow-list, on-disk storage and thumbnails.

pub mod thumbnail;
pub mod uploads;

pub use thumbnail::{FfmpegThumbnailer, Thumbnailer};
pub use uploads::UploadStore;

use std::fmt;

/// Broad kind of an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
}

/// Accepted MIME types with their category and file extension.
const ALLOWED: &[(&str, MediaCategory, &str)] = &[
    ("image/jpeg", MediaCategory::Image, "jpg"),
    ("image/png", MediaCategory::Image, "png"),
    ("video/mp4", MediaCategory::Video, "mp4"),
    ("video/mpeg", MediaCategory::Video, "mpeg"),
    ("audio/mpeg", MediaCategory::Audio, "mp3"),
    ("audio/x-wav", MediaCategory::Audio, "wav"),
];

impl MediaCategory {
    /// Category of an allow-listed MIME type. Parameters such as
    /// `; charset=...` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        lookup(mime).map(|(_, category, _)| category)
    }
}

/// File extension used when storing an allow-listed MIME type.
pub fn extension_for(mime: &str) -> Option<&'static str> {
    lookup(mime).map(|(_, _, ext)| ext)
}

pub fn is_audio(mime: &str) -> bool {
    MediaCategory::from_mime(mime) == Some(MediaCategory::Audio)
}

fn lookup(mime: &str) -> Option<(&'static str, MediaCategory, &'static str)> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    ALLOWED
        .iter()
        .find(|(allowed, _, _)| allowed.eq_ignore_ascii_case(essence))
        .copied()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The MIME type is not on the allow-list.
    UnsupportedType(String),

    /// Reading or writing the uploads directory failed.
    Io(String),

    /// The thumbnail could not be produced.
    Thumbnail(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType(mime) => write!(f, "File format {} is not supported", mime),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::Thumbnail(msg) => write!(f, "Thumbnail generation failed: {}", msg),
        }
    }
}

impl std::error::Error for MediaError {}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
