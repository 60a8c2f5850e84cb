//! Resource profiles and their per-provider registries.
//!
//! A profile is a swappable strategy that materializes one logical resource
//! role (a persistent volume, a claim) for a concrete provider. The registry
//! only selects; production lives in the profile.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as Json;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::object::StructuralObject;
use crate::domain::value_objects::ProviderKind;

/// Role every provider binds its built-in profiles to.
pub const DEFAULT_ROLE: &str = "default";

/// A declared persistent volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRequest {
    /// Volume name, also the emitted object name.
    pub name: String,
    /// Profile-specific settings (capacity, disk name, host path...).
    pub config: Json,
    /// Deep-merged into the materialized document last.
    pub merge: Json,
}

/// A declared persistent volume claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRequest {
    pub name: String,
    pub config: Json,
    pub merge: Json,
    /// The bound volume's materialized document, when
    /// `config.persistentVolume` names a declared volume.
    pub volume: Option<Json>,
}

pub trait PersistentVolumeProfile: Send + Sync + fmt::Debug {
    fn materialize(
        &self,
        request: &VolumeRequest,
        provider: ProviderKind,
    ) -> DomainResult<StructuralObject>;
}

pub trait PersistentVolumeClaimProfile: Send + Sync + fmt::Debug {
    fn materialize(
        &self,
        request: &ClaimRequest,
        provider: ProviderKind,
    ) -> DomainResult<StructuralObject>;
}

/// Role key → profile, at most one binding per role.
pub struct ProfileRegistry<P: ?Sized> {
    family: &'static str,
    profiles: BTreeMap<String, Box<P>>,
}

impl<P: ?Sized> ProfileRegistry<P> {
    /// An empty registry; `family` names the profile kind in errors.
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            profiles: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, role: impl Into<String>, profile: Box<P>) -> DomainResult<()> {
        let role = role.into();
        if self.profiles.contains_key(&role) {
            return Err(DomainError::DuplicateRole {
                family: self.family,
                role,
            });
        }
        self.profiles.insert(role, profile);
        Ok(())
    }

    pub fn resolve(&self, role: &str) -> DomainResult<&P> {
        self.profiles
            .get(role)
            .map(Box::as_ref)
            .ok_or_else(|| DomainError::UnknownRole {
                family: self.family,
                role: role.to_string(),
            })
    }

    /// Registered role keys, sorted.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn family(&self) -> &'static str {
        self.family
    }
}

impl<P: ?Sized> fmt::Debug for ProfileRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileRegistry")
            .field("family", &self.family)
            .field("roles", &self.profiles.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub type VolumeProfiles = ProfileRegistry<dyn PersistentVolumeProfile>;
pub type ClaimProfiles = ProfileRegistry<dyn PersistentVolumeClaimProfile>;
