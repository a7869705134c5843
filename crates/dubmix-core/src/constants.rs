//! Application-wide constants.

/// API path prefix for catalog endpoints.
pub const API_PREFIX: &str = "/api/v0";

/// Owner recorded for merges requested without an owner id.
pub const DEFAULT_ANONYMOUS_OWNER_ID: &str = "anonymous";

/// Storage folder for merged videos: `user_videos/{owner}/{id}.mp4`.
pub const VIDEO_FOLDER: &str = "user_videos";

/// Storage folder for poster thumbnails: `user_thumbnails/{owner}/{id}.png`.
pub const THUMBNAIL_FOLDER: &str = "user_thumbnails";

/// Seek offset used for poster frames. Clips shorter than this fall back to 0.
pub const THUMBNAIL_OFFSET_SECS: f64 = 1.0;

/// Length of generated short ids (the `/v/{short_id}` links).
pub const SHORT_ID_LEN: usize = 6;

/// Status written on every catalog entry. Only completed merges are recorded.
pub const CATALOG_STATUS_READY: &str = "ready";

/// Postgres NOTIFY channel raised when a recording row is inserted.
pub const RECORDING_CREATED_CHANNEL: &str = "dubmix_recording_created";

/// Header carrying the caller's owner id on catalog mutations.
pub const OWNER_HEADER: &str = "x-owner-id";
