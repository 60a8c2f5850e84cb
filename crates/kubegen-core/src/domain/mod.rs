// ============================================================================
//  CLEAN MODULE BOUNDARIES
// ============================================================================

//! Core domain layer for kubegen.
//!
//! Pure generation logic: option resolution, profile selection, building,
//! patching and output assembly. Serialization and persistence are reached
//! only through the ports of the application layer.
//!
//! ## Hexagonal Architecture Compliance
//!
//! - **No async**: Domain logic is synchronous
//! - **No I/O**: No filesystem, network, or external calls
//! - **No logging**: Observability belongs to the application and CLI layers
//! - **Plain data errors**: `DomainError` is `Clone + PartialEq`
//!
// Public API - what the world sees
pub mod builder;
pub mod error;
pub mod object;
pub mod options;
pub mod output;
pub mod patch;
pub mod profile;
pub mod provider;
pub mod value_objects;

// Re-exports for convenience
pub use builder::{BuildContext, BuildItem, BuildSource, Builder};
pub use error::{DomainError, DomainResult, ErrorCategory};
pub use object::{ObjectIdentity, StructuralObject, merge_json};
pub use options::{DottedPath, OptionRef, OptionStore, OptionValue, RefScope};
pub use output::{
    DocumentFile, FileTemplate, LocationMap, OutputFile, OutputProject, SCRIPT_HEADER, ScriptFile,
    ScriptLine,
};
pub use patch::{ObjectFilter, PatchOp, PatchPath, PatchRule};
pub use profile::{
    ClaimProfiles, ClaimRequest, DEFAULT_ROLE, PersistentVolumeClaimProfile,
    PersistentVolumeProfile, ProfileRegistry, VolumeProfiles, VolumeRequest,
};
pub use provider::{Provider, ProviderBuilder, ProviderTarget};
pub use value_objects::{FileId, FileKind, Location, ProviderKind};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========================================================================
    // Builder output woven by an external rule
    // ========================================================================

    struct Ingress;

    impl BuildSource for Ingress {
        fn source_name(&self) -> &'static str {
            "app"
        }

        fn items(&self) -> &'static [BuildItem] {
            const ITEMS: &[BuildItem] = &[BuildItem::new("ingress")];
            ITEMS
        }

        fn object_names(&self) -> &'static [&'static str] {
            &["ingress"]
        }

        fn produce(&self, _: &str, ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>> {
            Ok(vec![StructuralObject::named(
                "ingress",
                json!({
                    "kind": "Ingress",
                    "metadata": {"name": ctx.object_name("ingress")?},
                }),
            )])
        }
    }

    #[test]
    fn rule_selects_remapped_builder_output() {
        let mut builder = Builder::new(Ingress, OptionStore::empty()).unwrap();
        builder.remap([("ingress", "public")]).unwrap();
        let mut objects = builder.build(&["ingress"]).unwrap();

        let rules = vec![PatchRule::new(
            ObjectFilter::new().names(["public"]).sources(["app"]),
            vec![PatchOp::merge("metadata", json!({"annotations": {"a": "b"}})).unwrap()],
        )];
        patch::apply(&mut objects, &rules).unwrap();

        assert_eq!(objects[0].document()["metadata"]["annotations"]["a"], "b");
    }

    #[test]
    fn rule_on_logical_name_misses_remapped_object() {
        let mut builder = Builder::new(Ingress, OptionStore::empty()).unwrap();
        builder.remap([("ingress", "public")]).unwrap();
        let mut objects = builder.build(&["ingress"]).unwrap();
        let before = objects.clone();

        let rules = vec![PatchRule::new(
            ObjectFilter::new().names(["ingress"]),
            vec![PatchOp::remove("metadata").unwrap()],
        )];
        patch::apply(&mut objects, &rules).unwrap();

        assert_eq!(objects, before);
    }

    #[test]
    fn every_error_has_a_category_and_suggestions() {
        let err = DomainError::DanglingReference {
            file: FileId::new(1),
            referenced: FileId::new(5),
        };
        assert_eq!(err.category(), ErrorCategory::Assembly);
        assert!(!err.suggestions().is_empty());
        assert_eq!(
            DomainError::PathNotMapping {
                path: "x".into(),
                object: "-/-/-".into()
            }
            .category(),
            ErrorCategory::Patch
        );
    }
}
