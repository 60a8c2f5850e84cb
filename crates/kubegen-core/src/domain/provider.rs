//! The deployment target and its profile registries.
//!
//! Each target kind is one [`ProviderTarget`] implementation, chosen once at
//! startup. Provider-sensitive call sites ask the target instead of branching
//! on [`ProviderKind`].

use std::fmt;
use std::sync::Arc;

use crate::domain::error::DomainResult;
use crate::domain::patch::{ObjectFilter, PatchRule};
use crate::domain::profile::{
    ClaimProfiles, DEFAULT_ROLE, PersistentVolumeClaimProfile, PersistentVolumeProfile,
    VolumeProfiles,
};
use crate::domain::value_objects::ProviderKind;

/// Target-specific behaviour.
pub trait ProviderTarget: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Profile bound to the `default` persistent-volume role.
    fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile>;

    /// Profile bound to the `default` persistent-volume-claim role.
    fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile>;

    /// Path pattern an HTTP ingress rule uses to match everything.
    fn ingress_http_path(&self) -> &'static str {
        "/"
    }

    /// Rules the target weaves into the ingress objects `ingress` selects.
    fn patch_rules(&self, ingress: &ObjectFilter) -> Vec<PatchRule> {
        let _ = ingress;
        Vec::new()
    }

    /// Commented shell hint for creating a local cluster, if the target has one.
    fn cluster_setup_hint(&self, storage_dir: &str) -> Option<String> {
        let _ = storage_dir;
        None
    }
}

/// A deployment target plus its profile registries. Immutable once built.
#[derive(Debug)]
pub struct Provider {
    target: Box<dyn ProviderTarget>,
    volume_profiles: VolumeProfiles,
    claim_profiles: ClaimProfiles,
}

impl Provider {
    pub fn builder(target: impl ProviderTarget + 'static) -> ProviderBuilder {
        ProviderBuilder {
            target: Box::new(target),
            volume_profiles: VolumeProfiles::new("persistent volume profile"),
            claim_profiles: ClaimProfiles::new("persistent volume claim profile"),
        }
    }

    /// A provider with only the target's default profiles registered.
    pub fn for_target(target: impl ProviderTarget + 'static) -> DomainResult<Arc<Self>> {
        Ok(Self::builder(target).with_default_profiles()?.build())
    }

    pub fn kind(&self) -> ProviderKind {
        self.target.kind()
    }

    pub fn target(&self) -> &dyn ProviderTarget {
        self.target.as_ref()
    }

    pub fn volume_profiles(&self) -> &VolumeProfiles {
        &self.volume_profiles
    }

    pub fn claim_profiles(&self) -> &ClaimProfiles {
        &self.claim_profiles
    }
}

/// Registers profiles before the provider is frozen behind an `Arc`.
#[derive(Debug)]
pub struct ProviderBuilder {
    target: Box<dyn ProviderTarget>,
    volume_profiles: VolumeProfiles,
    claim_profiles: ClaimProfiles,
}

impl ProviderBuilder {
    pub fn volume_profile(
        mut self,
        role: impl Into<String>,
        profile: Box<dyn PersistentVolumeProfile>,
    ) -> DomainResult<Self> {
        self.volume_profiles.register(role, profile)?;
        Ok(self)
    }

    pub fn claim_profile(
        mut self,
        role: impl Into<String>,
        profile: Box<dyn PersistentVolumeClaimProfile>,
    ) -> DomainResult<Self> {
        self.claim_profiles.register(role, profile)?;
        Ok(self)
    }

    /// Bind the target's built-in profiles to [`DEFAULT_ROLE`].
    pub fn with_default_profiles(self) -> DomainResult<Self> {
        let volume = self.target.default_volume_profile();
        let claim = self.target.default_claim_profile();
        self.volume_profile(DEFAULT_ROLE, volume)?
            .claim_profile(DEFAULT_ROLE, claim)
    }

    pub fn build(self) -> Arc<Provider> {
        Arc::new(Provider {
            target: self.target,
            volume_profiles: self.volume_profiles,
            claim_profiles: self.claim_profiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DomainError;
    use crate::domain::object::StructuralObject;
    use crate::domain::profile::{ClaimRequest, VolumeRequest};
    use serde_json::json;

    #[derive(Debug)]
    struct Local;

    #[derive(Debug)]
    struct Echo;

    impl PersistentVolumeProfile for Echo {
        fn materialize(&self, r: &VolumeRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
            Ok(StructuralObject::named(r.name.clone(), json!({"kind": "PersistentVolume"})))
        }
    }

    impl PersistentVolumeClaimProfile for Echo {
        fn materialize(&self, r: &ClaimRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
            Ok(StructuralObject::named(r.name.clone(), json!({"kind": "PersistentVolumeClaim"})))
        }
    }

    impl ProviderTarget for Local {
        fn kind(&self) -> ProviderKind {
            ProviderKind::K3d
        }
        fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile> {
            Box::new(Echo)
        }
        fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile> {
            Box::new(Echo)
        }
    }

    #[test]
    fn for_target_registers_default_roles() {
        let provider = Provider::for_target(Local).unwrap();

        assert_eq!(provider.kind(), ProviderKind::K3d);
        assert!(provider.volume_profiles().resolve(DEFAULT_ROLE).is_ok());
        assert!(provider.claim_profiles().resolve(DEFAULT_ROLE).is_ok());
        assert_eq!(provider.target().ingress_http_path(), "/");
        assert!(provider.target().patch_rules(&ObjectFilter::new()).is_empty());
    }

    #[test]
    fn extra_roles_can_be_registered_before_build() {
        let provider = Provider::builder(Local)
            .with_default_profiles()
            .unwrap()
            .volume_profile("fast", Box::new(Echo))
            .unwrap()
            .build();

        let roles: Vec<_> = provider.volume_profiles().roles().collect();
        assert_eq!(roles, vec!["default", "fast"]);
    }

    #[test]
    fn default_role_cannot_be_bound_twice() {
        let err = Provider::builder(Local)
            .volume_profile(DEFAULT_ROLE, Box::new(Echo))
            .unwrap()
            .with_default_profiles()
            .unwrap_err();

        assert!(matches!(err, DomainError::DuplicateRole { .. }));
    }
}
