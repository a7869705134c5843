//! Short share links (`{base}/{short_id}`).

use dubmix_core::constants::SHORT_ID_LEN;
use rand::distr::{Alphanumeric, SampleString};

#[derive(Debug, Clone, Default)]
pub struct ShortLinker {
    base_url: Option<String>,
}

impl ShortLinker {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    /// A fresh short id and, when a base URL is configured, the link built from it.
    pub fn issue(&self) -> (String, Option<String>) {
        let short_id = Alphanumeric.sample_string(&mut rand::rng(), SHORT_ID_LEN);
        let short_url = self
            .base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, short_id));
        (short_id, short_url)
    }
}
