use serde::{Deserialize, Serialize};

/// Which input track a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackRole {
    Video,
    Audio,
}

impl TrackRole {
    /// Extension assumed when the locator carries none. Recordings default to webm,
    /// the container browsers produce first.
    pub fn default_extension(self) -> &'static str {
        match self {
            TrackRole::Video => "mp4",
            TrackRole::Audio => "webm",
        }
    }

    pub fn mime_for(self, extension: &str) -> &'static str {
        match (self, extension) {
            (TrackRole::Video, "mp4") => "video/mp4",
            (TrackRole::Video, "m4v") => "video/x-m4v",
            (TrackRole::Video, "mov") => "video/quicktime",
            (TrackRole::Video, "webm") => "video/webm",
            (TrackRole::Video, "mkv") => "video/x-matroska",
            (TrackRole::Audio, "webm") => "audio/webm",
            (TrackRole::Audio, "ogg" | "oga" | "opus") => "audio/ogg",
            (TrackRole::Audio, "mp4" | "m4a") => "audio/mp4",
            (TrackRole::Audio, "mp3" | "mpeg") => "audio/mpeg",
            (TrackRole::Audio, "wav") => "audio/wav",
            (TrackRole::Audio, "aac") => "audio/aac",
            _ => "application/octet-stream",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackRole::Video => "video",
            TrackRole::Audio => "audio",
        }
    }
}

/// Opaque locator for a stored media object (a storage key or an issued URL).
///
/// Extension and mime type are inferred once at construction and never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    locator: String,
    extension: String,
    mime_type: String,
}

impl MediaReference {
    pub fn new(locator: impl Into<String>, role: TrackRole) -> Self {
        let locator = locator.into();
        let extension =
            infer_extension(&locator).unwrap_or_else(|| role.default_extension().to_string());
        let mime_type = role.mime_for(&extension).to_string();
        Self {
            locator,
            extension,
            mime_type,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Extension of the last path segment, ignoring query and fragment.
/// Works on encoded locators too: `.../o/user_videos%2Fu1%2Fclip.mp4?alt=media` yields `mp4`.
fn infer_extension(locator: &str) -> Option<String> {
    let path = locator.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Kind of artifact produced by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Thumbnail,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Thumbnail => "png",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Video => "video/mp4",
            MediaKind::Thumbnail => "image/png",
        }
    }

    pub fn folder(self) -> &'static str {
        match self {
            MediaKind::Video => crate::constants::VIDEO_FOLDER,
            MediaKind::Thumbnail => crate::constants::THUMBNAIL_FOLDER,
        }
    }
}
