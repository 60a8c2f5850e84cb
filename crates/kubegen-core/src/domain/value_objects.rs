//! Domain value objects: ProviderKind, FileId, FileKind, Location.
//!
//! # Design
//!
//! These are pure value types: `Copy` where possible, equality-by-value,
//! no behaviour beyond their string representations and `FromStr` parsers.
//! Provider-specific behaviour lives behind the `ProviderTarget` trait, never
//! in match arms on [`ProviderKind`].

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── ProviderKind ─────────────────────────────────────────────────────────────

/// The deployment target a generation run is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    K3d,
    GoogleGke,
    AmazonEks,
    DigitalOceanKubernetes,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        Self::K3d,
        Self::GoogleGke,
        Self::AmazonEks,
        Self::DigitalOceanKubernetes,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::K3d => "k3d",
            Self::GoogleGke => "google-gke",
            Self::AmazonEks => "amazon-eks",
            Self::DigitalOceanKubernetes => "digitalocean-kubernetes",
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::K3d => "k3d (local k3s in docker)",
            Self::GoogleGke => "Google Kubernetes Engine",
            Self::AmazonEks => "Amazon Elastic Kubernetes Service",
            Self::DigitalOceanKubernetes => "DigitalOcean Kubernetes",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "k3d" => Ok(Self::K3d),
            "google-gke" | "gke" => Ok(Self::GoogleGke),
            "amazon-eks" | "eks" => Ok(Self::AmazonEks),
            "digitalocean-kubernetes" | "doks" => Ok(Self::DigitalOceanKubernetes),
            other => Err(DomainError::UnknownProvider {
                name: other.to_string(),
            }),
        }
    }
}

// ── FileId ───────────────────────────────────────────────────────────────────

/// Stable identity of an output file inside an `OutputProject`.
///
/// Assigned by `OutputProject::append`, strictly increasing from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(u32);

impl FileId {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── FileKind ─────────────────────────────────────────────────────────────────

/// What an output file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Concatenated structural documents (manifests).
    Documents,
    /// Shell script lines.
    Script,
}

impl FileKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Location ─────────────────────────────────────────────────────────────────

/// Where an output driver decided to place a file.
///
/// Opaque to the core: a filesystem path for directory drivers, a label for
/// stream drivers. Deferred templates embed its display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        Self(s)
    }
}
