//! Media reference normalization.
//!
//! Inputs name stored objects in three shapes:
//!
//! - a raw storage key: `recordings/u1/voice.webm`
//! - a URL issued by one of our backends: `{public prefix}{key}`
//! - a Firebase-style download URL: `https://firebasestorage.googleapis.com/v0/b/{bucket}/o/{percent-encoded key}?alt=media&token=...`.
//!   The same shape is accepted from the hosts of our public prefixes and from hosts added
//!   with [`ReferenceParser::with_firebase_hosts`], never from anywhere else.
//!
//! [`ReferenceParser::storage_key`] maps all of them to a backend key, dropping query
//! strings and fragments and percent-decoding the result.

use crate::traits::Storage;
use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Reference is empty")]
    Empty,

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL is not under a known storage location: {0}")]
    UnknownLocation(String),

    #[error("Invalid percent-encoding in reference: {0}")]
    InvalidEncoding(String),

    #[error("Reference escapes the storage root: {0}")]
    PathTraversal(String),

    #[error("Reference does not name an object: {0}")]
    MissingObjectName(String),
}

/// Marker that precedes the encoded object path in Firebase download URLs.
const FIREBASE_OBJECT_MARKER: &str = "/o/";

/// Host that serves Firebase Storage download URLs.
const FIREBASE_STORAGE_HOST: &str = "firebasestorage.googleapis.com";

#[derive(Debug, Clone)]
pub struct ReferenceParser {
    public_prefixes: Vec<String>,
    /// Hosts whose `/o/` URLs name objects in our bucket.
    firebase_hosts: Vec<String>,
}

impl Default for ReferenceParser {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl ReferenceParser {
    pub fn new<I, S>(public_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let public_prefixes = public_prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .map(|p| {
                if p.ends_with('/') {
                    p
                } else {
                    format!("{}/", p)
                }
            })
            .collect::<Vec<String>>();

        let mut firebase_hosts = vec![FIREBASE_STORAGE_HOST.to_string()];
        for prefix in &public_prefixes {
            if let Some(host) = prefix.split_once("://").map(|(_, rest)| url_host(rest)) {
                if !host.is_empty() && !firebase_hosts.contains(&host) {
                    firebase_hosts.push(host);
                }
            }
        }

        Self {
            public_prefixes,
            firebase_hosts,
        }
    }

    /// Also accept Firebase-style URLs from `hosts`, e.g. an emulator.
    pub fn with_firebase_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            let host = host.as_ref().to_ascii_lowercase();
            if !host.is_empty() && !self.firebase_hosts.contains(&host) {
                self.firebase_hosts.push(host);
            }
        }
        self
    }

    /// Parser that understands the URLs `storage` issues.
    pub fn for_storage(storage: &dyn Storage) -> Self {
        Self::new(storage.public_url_prefixes())
    }

    pub fn storage_key(&self, reference: &str) -> Result<String, ReferenceError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();

        let encoded = match without_query.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                if scheme != "http" && scheme != "https" {
                    return Err(ReferenceError::UnsupportedScheme(scheme));
                }
                self.strip_url(without_query, rest)?
            }
            None => without_query,
        };

        let key = decode(encoded)?;
        validate_key(&key)?;
        Ok(key)
    }

    fn strip_url<'a>(&self, url: &'a str, after_scheme: &'a str) -> Result<&'a str, ReferenceError> {
        if let Some(rest) = self
            .public_prefixes
            .iter()
            .find_map(|prefix| url.strip_prefix(prefix.as_str()))
        {
            return Ok(rest);
        }

        let host = url_host(after_scheme);
        if self.firebase_hosts.contains(&host) {
            if let Some((_, rest)) = after_scheme.split_once(FIREBASE_OBJECT_MARKER) {
                return Ok(rest);
            }
        }

        let authority = after_scheme.split('/').next().unwrap_or_default();
        Err(ReferenceError::UnknownLocation(authority.to_string()))
    }
}

/// Lowercased host of the authority at the start of `after_scheme`, without a port.
/// An authority with userinfo keeps it, so it never equals a plain host.
fn url_host(after_scheme: &str) -> String {
    let authority = after_scheme.split('/').next().unwrap_or_default();
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };
    host.to_ascii_lowercase()
}

fn decode(encoded: &str) -> Result<String, ReferenceError> {
    let bytes = encoded.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(ReferenceError::InvalidEncoding(encoded.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| ReferenceError::InvalidEncoding(encoded.to_string()))
}

fn validate_key(key: &str) -> Result<(), ReferenceError> {
    if key.starts_with('/') || key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(ReferenceError::PathTraversal(key.to_string()));
    }
    if key.is_empty() || key.ends_with('/') {
        return Err(ReferenceError::MissingObjectName(key.to_string()));
    }
    Ok(())
}
