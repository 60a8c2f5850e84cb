//! Integration tests for kubegen-core: the generation pipeline end to end,
//! with in-test collaborators standing in for the adapters crate.

use std::sync::Mutex;

use kubegen_core::domain::{
    ClaimRequest, DEFAULT_ROLE, DomainResult, PersistentVolumeClaimProfile,
    PersistentVolumeProfile, VolumeRequest, merge_json, patch,
};
use kubegen_core::prelude::*;
use serde_json::{Value as Json, json};

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Default)]
struct Staging {
    staged: Mutex<Vec<(String, String)>>,
    published: Mutex<Vec<(String, String)>>,
    fail_on: Option<&'static str>,
}

impl OutputDriver for Staging {
    fn choose_location(&self, id: FileId, _: FileKind, name: &str) -> KubegenResult<Location> {
        Ok(Location::new(format!("out/{:02}-{name}", id.get())))
    }

    fn write(&self, location: &Location, contents: &[u8], _: bool) -> KubegenResult<()> {
        if self.fail_on.is_some_and(|f| location.as_str().ends_with(f)) {
            return Err(ApplicationError::driver(location.as_str(), "injected failure").into());
        }
        self.staged.lock().unwrap().push((
            location.to_string(),
            String::from_utf8_lossy(contents).into_owned(),
        ));
        Ok(())
    }

    fn commit(&self) -> KubegenResult<()> {
        let staged = std::mem::take(&mut *self.staged.lock().unwrap());
        self.published.lock().unwrap().extend(staged);
        Ok(())
    }

    fn rollback(&self) -> KubegenResult<()> {
        self.staged.lock().unwrap().clear();
        Ok(())
    }
}

struct JsonLines;

impl DocumentSerializer for JsonLines {
    fn serialize(&self, objects: &[StructuralObject]) -> KubegenResult<String> {
        Ok(objects
            .iter()
            .map(|o| o.document().to_string())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Debug)]
struct Local;

#[derive(Debug)]
struct HostPath;

#[derive(Debug)]
struct Claim;

impl PersistentVolumeProfile for HostPath {
    fn materialize(&self, r: &VolumeRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
        let mut doc = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {"name": r.name},
            "spec": {"hostPath": r.config["hostPath"]},
        });
        merge_json(&mut doc, r.merge.clone());
        Ok(StructuralObject::named(r.name.clone(), doc))
    }
}

impl PersistentVolumeClaimProfile for Claim {
    fn materialize(&self, r: &ClaimRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
        Ok(StructuralObject::named(
            r.name.clone(),
            json!({"apiVersion": "v1", "kind": "PersistentVolumeClaim", "metadata": {"name": r.name}}),
        ))
    }
}

impl ProviderTarget for Local {
    fn kind(&self) -> ProviderKind {
        ProviderKind::K3d
    }
    fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile> {
        Box::new(HostPath)
    }
    fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile> {
        Box::new(Claim)
    }
}

struct Service;

impl BuildSource for Service {
    fn source_name(&self) -> &'static str {
        "lokistack"
    }

    fn items(&self) -> &'static [BuildItem] {
        const ITEMS: &[BuildItem] = &[
            BuildItem::new("service"),
            BuildItem::requires("config", &["config.loki_service_port"]),
        ];
        ITEMS
    }

    fn object_names(&self) -> &'static [&'static str] {
        &["svc", "svc-config"]
    }

    fn required_options(&self) -> &'static [&'static str] {
        &["namespace"]
    }

    fn produce(&self, item: &str, ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>> {
        let (logical, kind) = match item {
            "service" => ("svc", "Service"),
            _ => ("svc-config", "ConfigMap"),
        };
        Ok(vec![StructuralObject::named(
            logical,
            json!({
                "apiVersion": "v1",
                "kind": kind,
                "metadata": {"name": ctx.object_name(logical)?, "namespace": ctx.namespace()?},
            }),
        )])
    }
}

fn root_options() -> OptionStore {
    OptionStore::build(json!({"namespaces": {"default": "default", "mon": "monitoring"}})).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn overlaid_reference_resolves_to_earlier_value() {
    let store = OptionStore::build(json!({"a": {"b": 1}})).unwrap();
    let store = store
        .overlay(
            "",
            OptionValue::map([("a", OptionValue::map([("c", OptionValue::reference("a.b"))]))]),
        )
        .unwrap();

    assert_eq!(store.get("a.c").unwrap(), OptionValue::Int(1));
}

#[test]
fn remapped_builder_names_its_objects() {
    let kg = Generator::new(Provider::for_target(Local).unwrap(), root_options());
    let mut builder = kg
        .builder(
            Service,
            OptionValue::map([("namespace", OptionValue::root_reference("namespaces.mon"))]),
        )
        .unwrap();
    builder.remap([("svc", "loki")]).unwrap();

    assert_eq!(builder.object_name("svc").unwrap(), "loki");
    let objects = builder.build(&["service"]).unwrap();
    assert_eq!(objects[0].identity().name.as_deref(), Some("loki"));
    assert_eq!(objects[0].document()["metadata"]["namespace"], "monitoring");
}

#[test]
fn merge_then_remove_leaves_no_annotation() {
    let mut objects = vec![StructuralObject::with_identity(
        ObjectIdentity::new("ingress", "app", "ingress"),
        json!({"kind": "Ingress", "metadata": {"name": "ingress"}}),
    )];
    let rules = vec![
        PatchRule::new(
            ObjectFilter::new().names(["ingress"]),
            vec![PatchOp::merge("", json!({"metadata": {"annotations": {"x": "1"}}})).unwrap()],
        ),
        PatchRule::new(
            ObjectFilter::new().names(["ingress"]),
            vec![PatchOp::remove("metadata.annotations.x").unwrap()],
        ),
    ];

    patch::apply(&mut objects, &rules).unwrap();
    assert_eq!(objects[0].document()["metadata"]["annotations"], json!({}));
}

#[test]
fn script_resolves_file_appended_after_it() {
    let mut project = OutputProject::new();
    let script = project.append(ScriptFile::new("create.sh"));
    project
        .script_mut(script)
        .unwrap()
        .append_template_str("kubectl apply -f ${FILE_5}")
        .unwrap();
    for name in ["a.yaml", "b.yaml", "c.yaml", "d.yaml"] {
        project.append(DocumentFile::new(name));
    }

    let driver = Staging::default();
    project.materialize(&driver, &JsonLines).unwrap();

    let published = driver.published.lock().unwrap();
    assert_eq!(published.len(), 5);
    assert_eq!(published[0].1, "#!/bin/bash\nkubectl apply -f out/05-d.yaml\n");
}

// ============================================================================
// Pipeline
// ============================================================================

#[test]
fn full_pipeline_publishes_every_file_in_order() {
    let mut kg = Generator::new(Provider::for_target(Local).unwrap(), root_options());
    kg.persistent_volume_add(
        "loki-storage",
        DEFAULT_ROLE,
        json!({"hostPath": {"path": "/var/storage/loki"}}),
        json!({"metadata": {"labels": {"pv.role": "loki"}}}),
    )
    .unwrap();
    kg.persistent_volume_claim_add(
        "loki-storage-claim",
        DEFAULT_ROLE,
        json!({"namespace": "monitoring", "persistentVolume": "loki-storage"}),
        json!({}),
    )
    .unwrap();

    let builder = kg
        .builder(
            Service,
            json!({"namespace": "monitoring", "config": {"loki_service_port": 80}}),
        )
        .unwrap();
    builder.ensure_items(&["service", "config"]).unwrap();

    let mut project = OutputProject::new().strict_references(true);
    let script = project.append(ScriptFile::new("create_k3d.sh"));
    project.script_mut(script).unwrap().append_line("set -e");

    let mut storage = DocumentFile::new("storage.yaml");
    storage
        .extend(kg.persistent_volume_build().unwrap())
        .extend(kg.persistent_volume_claim_build().unwrap());
    let mut stack = DocumentFile::new("lokistack.yaml");
    stack.extend(builder.build(&["config", "service"]).unwrap());

    for file in [storage, stack] {
        let id = project.append(file);
        project
            .script_mut(script)
            .unwrap()
            .append_template_str(&format!("kubectl apply -f {}", FileTemplate::placeholder(id)))
            .unwrap();
    }

    // The script references files appended after it.
    assert!(matches!(
        project.validate_references(),
        Err(DomainError::ForwardReference { .. })
    ));

    let project = {
        let mut relaxed = OutputProject::new();
        for (_, file) in project.files() {
            relaxed.append(file.clone());
        }
        relaxed
    };

    let driver = Staging::default();
    let written = project.materialize(&driver, &JsonLines).unwrap();
    assert_eq!(
        written.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
        vec!["create_k3d.sh", "storage.yaml", "lokistack.yaml"]
    );

    let published = driver.published.lock().unwrap();
    assert_eq!(
        published[0].1,
        "#!/bin/bash\nset -e\nkubectl apply -f out/02-storage.yaml\nkubectl apply -f out/03-lokistack.yaml\n"
    );
    let storage: Vec<Json> = published[1]
        .1
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(storage[0]["metadata"]["labels"]["pv.role"], "loki");
    assert_eq!(storage[1]["kind"], "PersistentVolumeClaim");
}

#[test]
fn failed_write_publishes_nothing() {
    let mut project = OutputProject::new();
    project.append(DocumentFile::new("a.yaml"));
    project.append(DocumentFile::new("b.yaml"));

    let driver = Staging {
        fail_on: Some("b.yaml"),
        ..Staging::default()
    };
    assert!(project.materialize(&driver, &JsonLines).is_err());
    assert!(driver.published.lock().unwrap().is_empty());
    assert!(driver.staged.lock().unwrap().is_empty());
}

#[test]
fn missing_prerequisite_fails_before_emission() {
    let kg = Generator::new(Provider::for_target(Local).unwrap(), root_options());
    let builder = kg.builder(Service, json!({"namespace": "default"})).unwrap();

    let err = builder.ensure_items(&["service", "config"]).unwrap_err();
    assert_eq!(
        err,
        DomainError::UnbuildableItem {
            item: "config".into(),
            missing: vec!["config.loki_service_port".into()],
        }
    );
}
