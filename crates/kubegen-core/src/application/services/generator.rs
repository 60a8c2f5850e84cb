//! Generator - the entry point a generation script works against.
//!
//! Holds the selected provider and the root option store, hands out
//! builders whose `!root` references resolve against that store, and keeps
//! the declared storage so it can be materialized through the provider's
//! profiles in declaration order.

use std::sync::Arc;

use serde_json::Value as Json;
use tracing::{debug, instrument};

use crate::domain::{
    BuildSource, Builder, ClaimRequest, DomainError, ObjectFilter, OptionStore, OptionValue,
    PatchRule, Provider, ProviderKind, StructuralObject, VolumeRequest,
};
use crate::error::KubegenResult;

#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    role: String,
    config: Json,
    merge: Json,
}

/// Provider + root options + declared storage.
#[derive(Debug)]
pub struct Generator {
    provider: Arc<Provider>,
    options: OptionStore,
    volumes: Vec<Declaration>,
    claims: Vec<Declaration>,
}

impl Generator {
    pub fn new(provider: Arc<Provider>, options: OptionStore) -> Self {
        Self {
            provider,
            options,
            volumes: Vec::new(),
            claims: Vec::new(),
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn options(&self) -> &OptionStore {
        &self.options
    }

    /// Resolve `path` in the root store.
    pub fn option_get(&self, path: &str) -> KubegenResult<OptionValue> {
        Ok(self.options.get(path)?)
    }

    /// Bind `source` to its defaults overlaid with `user` options.
    #[instrument(skip_all, fields(source = source.source_name()))]
    pub fn builder<S: BuildSource>(
        &self,
        source: S,
        user: impl Into<OptionValue>,
    ) -> KubegenResult<Builder<S>> {
        let builder = Builder::derived(source, &self.options, user)?;
        debug!(namespace = ?builder.namespace().ok(), "Builder created");
        Ok(builder)
    }

    /// Declare a persistent volume materialized by the profile bound to `role`.
    pub fn persistent_volume_add(
        &mut self,
        name: impl Into<String>,
        role: impl Into<String>,
        config: Json,
        merge: Json,
    ) -> KubegenResult<()> {
        let declaration = declare(&self.volumes, "persistent volume", name, role, config, merge)?;
        self.provider.volume_profiles().resolve(&declaration.role)?;
        self.volumes.push(declaration);
        Ok(())
    }

    /// Declare a persistent volume claim materialized by the profile bound to `role`.
    pub fn persistent_volume_claim_add(
        &mut self,
        name: impl Into<String>,
        role: impl Into<String>,
        config: Json,
        merge: Json,
    ) -> KubegenResult<()> {
        let declaration = declare(
            &self.claims,
            "persistent volume claim",
            name,
            role,
            config,
            merge,
        )?;
        self.provider.claim_profiles().resolve(&declaration.role)?;
        self.claims.push(declaration);
        Ok(())
    }

    /// Materialize every declared volume, in declaration order.
    #[instrument(skip_all, fields(provider = %self.kind()))]
    pub fn persistent_volume_build(&self) -> KubegenResult<Vec<StructuralObject>> {
        self.volumes
            .iter()
            .map(|declaration| self.materialize_volume(declaration))
            .collect()
    }

    /// Materialize every declared claim, in declaration order.
    #[instrument(skip_all, fields(provider = %self.kind()))]
    pub fn persistent_volume_claim_build(&self) -> KubegenResult<Vec<StructuralObject>> {
        self.claims
            .iter()
            .map(|declaration| -> KubegenResult<StructuralObject> {
                let volume = match declaration.config.get("persistentVolume").and_then(Json::as_str) {
                    Some(name) => Some(self.bound_volume(name)?.into_document()),
                    None => None,
                };
                let request = ClaimRequest {
                    name: declaration.name.clone(),
                    config: declaration.config.clone(),
                    merge: declaration.merge.clone(),
                    volume,
                };
                let object = self
                    .provider
                    .claim_profiles()
                    .resolve(&declaration.role)?
                    .materialize(&request, self.kind())?;
                debug!(claim = %declaration.name, role = %declaration.role, "Claim materialized");
                Ok(object)
            })
            .collect()
    }

    /// Rules the provider contributes for the ingress objects `ingress` selects.
    pub fn provider_patches(&self, ingress: &ObjectFilter) -> Vec<PatchRule> {
        self.provider.target().patch_rules(ingress)
    }

    fn bound_volume(&self, name: &str) -> KubegenResult<StructuralObject> {
        let declaration = self
            .volumes
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DomainError::PathNotFound {
                path: format!("persistent volume '{name}'"),
            })?;
        self.materialize_volume(declaration)
    }

    fn materialize_volume(&self, declaration: &Declaration) -> KubegenResult<StructuralObject> {
        let request = VolumeRequest {
            name: declaration.name.clone(),
            config: declaration.config.clone(),
            merge: declaration.merge.clone(),
        };
        let object = self
            .provider
            .volume_profiles()
            .resolve(&declaration.role)?
            .materialize(&request, self.kind())?;
        debug!(volume = %declaration.name, role = %declaration.role, "Volume materialized");
        Ok(object)
    }
}

fn declare(
    existing: &[Declaration],
    kind: &'static str,
    name: impl Into<String>,
    role: impl Into<String>,
    config: Json,
    merge: Json,
) -> KubegenResult<Declaration> {
    let name = name.into();
    if existing.iter().any(|d| d.name == name) {
        return Err(DomainError::DuplicateResource { kind, name }.into());
    }
    Ok(Declaration {
        name,
        role: role.into(),
        config,
        merge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DEFAULT_ROLE, DomainResult, PersistentVolumeClaimProfile, PersistentVolumeProfile,
        ProviderTarget, merge_json,
    };
    use crate::error::KubegenError;
    use serde_json::json;

    #[derive(Debug)]
    struct Target;

    #[derive(Debug)]
    struct HostPath;

    #[derive(Debug)]
    struct Basic;

    impl PersistentVolumeProfile for HostPath {
        fn materialize(&self, r: &VolumeRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
            let mut doc = json!({
                "apiVersion": "v1",
                "kind": "PersistentVolume",
                "metadata": {"name": r.name},
                "spec": {"hostPath": r.config["hostPath"].clone()},
            });
            merge_json(&mut doc, r.merge.clone());
            Ok(StructuralObject::named(r.name.clone(), doc))
        }
    }

    impl PersistentVolumeClaimProfile for Basic {
        fn materialize(&self, r: &ClaimRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
            let capacity = r
                .volume
                .as_ref()
                .map(|v| v["spec"]["capacity"].clone())
                .unwrap_or(Json::Null);
            Ok(StructuralObject::named(
                r.name.clone(),
                json!({"kind": "PersistentVolumeClaim", "metadata": {"name": r.name}, "spec": {"resources": {"requests": capacity}}}),
            ))
        }
    }

    impl ProviderTarget for Target {
        fn kind(&self) -> ProviderKind {
            ProviderKind::K3d
        }
        fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile> {
            Box::new(HostPath)
        }
        fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile> {
            Box::new(Basic)
        }
    }

    fn generator() -> Generator {
        Generator::new(
            Provider::for_target(Target).unwrap(),
            OptionStore::build(json!({"namespaces": {"mon": "monitoring"}})).unwrap(),
        )
    }

    #[test]
    fn volumes_build_in_declaration_order() {
        let mut kg = generator();
        for name in ["b", "a"] {
            kg.persistent_volume_add(name, DEFAULT_ROLE, json!({"hostPath": {"path": "/x"}}), json!({}))
                .unwrap();
        }

        let names: Vec<_> = kg
            .persistent_volume_build()
            .unwrap()
            .iter()
            .map(|o| o.identity().name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn claim_sees_its_bound_volume() {
        let mut kg = generator();
        kg.persistent_volume_add(
            "loki-storage",
            DEFAULT_ROLE,
            json!({"hostPath": {"path": "/var/storage/loki"}}),
            json!({"spec": {"capacity": {"storage": "50Gi"}}}),
        )
        .unwrap();
        kg.persistent_volume_claim_add(
            "loki-storage-claim",
            DEFAULT_ROLE,
            json!({"namespace": "monitoring", "persistentVolume": "loki-storage"}),
            json!({}),
        )
        .unwrap();

        let claims = kg.persistent_volume_claim_build().unwrap();
        assert_eq!(
            claims[0].document()["spec"]["resources"]["requests"],
            json!({"storage": "50Gi"})
        );
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let mut kg = generator();
        kg.persistent_volume_add("data", DEFAULT_ROLE, json!({}), json!({})).unwrap();
        let err = kg
            .persistent_volume_add("data", DEFAULT_ROLE, json!({}), json!({}))
            .unwrap_err();

        assert_eq!(
            err,
            KubegenError::Domain(DomainError::DuplicateResource {
                kind: "persistent volume",
                name: "data".into(),
            })
        );
    }

    #[test]
    fn unknown_role_fails_at_declaration() {
        let mut kg = generator();
        assert!(matches!(
            kg.persistent_volume_add("data", "fast", json!({}), json!({})),
            Err(KubegenError::Domain(DomainError::UnknownRole { .. }))
        ));
    }

    #[test]
    fn claim_bound_to_undeclared_volume_fails() {
        let mut kg = generator();
        kg.persistent_volume_claim_add(
            "claim",
            DEFAULT_ROLE,
            json!({"persistentVolume": "missing"}),
            json!({}),
        )
        .unwrap();
        assert!(kg.persistent_volume_claim_build().is_err());
    }
}
