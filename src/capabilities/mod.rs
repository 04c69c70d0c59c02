//! Server capability discovery.
//!
//! The client runs one discovery call per instance in the background and
//! publishes the result here. Readers never wait for it: until something is
//! published, every feature reads as unsupported and the version as absent.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Response header carrying `key=value;key=value` server metadata.
pub const META_HEADER: &str = "x-canvas-meta";

/// Response header carrying the server version on its own.
pub const VERSION_HEADER: &str = "x-canvas-version";

/// Version reported when the server sends no version token.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Parses a semicolon-separated `key=value` metadata header.
///
/// Empty segments and segments without `=` are skipped; keys are
/// lower-cased and both sides trimmed.
pub fn parse_meta_header(value: &str) -> BTreeMap<String, String> {
    value
        .split(';')
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return None;
            }
            Some((key, value.trim().to_string()))
        })
        .collect()
}

/// Immutable description of what the remote server supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    version: String,
    features: HashSet<String>,
    metadata: BTreeMap<String, String>,
    discovered_at: DateTime<Utc>,
}

impl CapabilityDescriptor {
    /// Creates a descriptor.
    pub fn new(
        version: impl Into<String>,
        features: impl IntoIterator<Item = String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            version: version.into(),
            features: features.into_iter().collect(),
            metadata,
            discovered_at: Utc::now(),
        }
    }

    /// Builds a descriptor from discovery response headers.
    ///
    /// `version` comes from the metadata header, then the version header;
    /// `features` is a comma-separated list in the metadata header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let metadata = headers
            .get(META_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_meta_header)
            .unwrap_or_default();

        let version = metadata
            .get("version")
            .cloned()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                headers
                    .get(VERSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());

        let features: Vec<String> = metadata
            .get("features")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self::new(version, features, metadata)
    }

    /// Gets the server version token.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns true if the server advertised `feature`.
    pub fn supports(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Gets the advertised features.
    pub fn features(&self) -> &HashSet<String> {
        &self.features
    }

    /// Gets a raw metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Gets when the descriptor was built.
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }
}

/// Single-flight launch guard plus the published descriptor.
#[derive(Debug, Default)]
pub struct CapabilityProbe {
    started: AtomicBool,
    descriptor: RwLock<Option<Arc<CapabilityDescriptor>>>,
}

impl CapabilityProbe {
    /// Creates an unstarted probe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the right to run the probe. Only the first caller gets `true`.
    pub fn try_start(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true once some caller has claimed the probe.
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Publishes a descriptor, replacing any previous one.
    pub fn publish(&self, descriptor: CapabilityDescriptor) {
        *self.descriptor.write() = Some(Arc::new(descriptor));
    }

    /// Gets the published descriptor.
    pub fn descriptor(&self) -> Option<Arc<CapabilityDescriptor>> {
        self.descriptor.read().clone()
    }

    /// Gets the published version.
    pub fn version(&self) -> Option<String> {
        self.descriptor().map(|d| d.version().to_string())
    }

    /// Returns true only if a published descriptor lists `feature`.
    pub fn supports_feature(&self, feature: &str) -> bool {
        self.descriptor()
            .map(|d| d.supports(feature))
            .unwrap_or(false)
    }
}
