//! Patch/Filter engine.
//!
//! A [`PatchRule`] pairs an identity filter with an ordered list of
//! structural edits. Rules are applied in declaration order and each edit
//! sees the result of the previous one, so a provider can weave its own
//! concerns (load-balancer annotations, path conventions) into objects whose
//! builder knows nothing about providers.
//!
//! Paths are written either dotted (`metadata.annotations.x`) or as a JSON
//! pointer (`/metadata/annotations/kubernetes.io~1ingress.class`). The
//! pointer form is required for keys that contain dots.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::object::{ObjectIdentity, StructuralObject, merge_json};

// ── Paths ────────────────────────────────────────────────────────────────────

/// A location inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatchPath {
    raw: String,
    segments: Vec<String>,
}

impl PatchPath {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let segments = if raw.is_empty() {
            Vec::new()
        } else if let Some(pointer) = raw.strip_prefix('/') {
            pointer
                .split('/')
                .map(|s| s.replace("~1", "/").replace("~0", "~"))
                .collect()
        } else {
            let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
            if segments.iter().any(String::is_empty) {
                return Err(DomainError::InvalidPath {
                    path: raw.to_string(),
                    reason: "empty path segment".into(),
                });
            }
            segments
        };

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The whole document.
    pub fn root() -> Self {
        Self {
            raw: String::new(),
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for PatchPath {
    type Error = DomainError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<PatchPath> for String {
    fn from(path: PatchPath) -> Self {
        path.raw
    }
}

// ── Operations ───────────────────────────────────────────────────────────────

/// One structural edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Deep-merge `value` into the mapping at `path`.
    Merge { path: PatchPath, value: Json },
    /// Overwrite the node at `path`, creating intermediate mappings.
    Replace { path: PatchPath, value: Json },
    /// Delete the node at `path`; absent paths are a no-op.
    Remove { path: PatchPath },
}

impl PatchOp {
    pub fn merge(path: &str, value: Json) -> DomainResult<Self> {
        Ok(Self::Merge {
            path: PatchPath::parse(path)?,
            value,
        })
    }

    pub fn replace(path: &str, value: Json) -> DomainResult<Self> {
        Ok(Self::Replace {
            path: PatchPath::parse(path)?,
            value,
        })
    }

    /// The root cannot be removed: an object always keeps a document.
    pub fn remove(path: &str) -> DomainResult<Self> {
        let path = PatchPath::parse(path)?;
        if path.segments().is_empty() {
            return Err(root_removal(&path));
        }
        Ok(Self::Remove { path })
    }

    fn apply_to(&self, object: &mut StructuralObject) -> DomainResult<()> {
        let owner = object.identity().to_string();
        let not_mapping = |path: &PatchPath| DomainError::PathNotMapping {
            path: path.to_string(),
            object: owner.clone(),
        };

        match self {
            Self::Merge { path, value } => {
                let err = not_mapping(path);
                match lookup_mut(object.document_mut(), path.segments()) {
                    Some(target @ Json::Object(_)) => {
                        merge_json(target, value.clone());
                        Ok(())
                    }
                    _ => Err(err),
                }
            }
            Self::Replace { path, value } => {
                let err = not_mapping(path);
                let Some((leaf, parents)) = path.segments().split_last() else {
                    *object.document_mut() = value.clone();
                    return Ok(());
                };
                let parent = create_path(object.document_mut(), parents).ok_or_else(|| err.clone())?;
                match parent {
                    Json::Object(map) => {
                        map.insert(leaf.clone(), value.clone());
                        Ok(())
                    }
                    Json::Array(items) => match leaf.parse::<usize>() {
                        Ok(i) if i < items.len() => {
                            items[i] = value.clone();
                            Ok(())
                        }
                        _ => Err(err),
                    },
                    _ => Err(err),
                }
            }
            Self::Remove { path } => {
                let Some((leaf, parents)) = path.segments().split_last() else {
                    return Err(root_removal(path));
                };
                match lookup_mut(object.document_mut(), parents) {
                    Some(Json::Object(map)) => {
                        map.shift_remove(leaf);
                    }
                    Some(Json::Array(items)) => {
                        if let Some(i) = leaf.parse::<usize>().ok().filter(|i| *i < items.len()) {
                            items.remove(i);
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
        }
    }
}

fn root_removal(path: &PatchPath) -> DomainError {
    DomainError::InvalidPath {
        path: path.to_string(),
        reason: "cannot remove the document root".into(),
    }
}

fn lookup_mut<'a>(doc: &'a mut Json, segments: &[String]) -> Option<&'a mut Json> {
    segments.iter().try_fold(doc, |node, segment| match node {
        Json::Object(map) => map.get_mut(segment),
        Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

/// Walk `segments`, creating empty mappings where keys are absent.
/// Returns `None` when a scalar (or a missing sequence index) is in the way.
fn create_path<'a>(doc: &'a mut Json, segments: &[String]) -> Option<&'a mut Json> {
    segments.iter().try_fold(doc, |node, segment| match node {
        Json::Object(map) => Some(
            map.entry(segment.clone())
                .or_insert_with(|| Json::Object(Map::new())),
        ),
        Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

// ── Filters ──────────────────────────────────────────────────────────────────

/// Identity predicate.
///
/// Each specified set must contain the object's corresponding identity
/// value; unspecified sets accept anything. An empty filter matches every
/// object, including anonymous ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<BTreeSet<String>>,
}

impl ObjectFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn instances<I, S>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instances = Some(instances.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, identity: &ObjectIdentity) -> bool {
        fn accepts(set: &Option<BTreeSet<String>>, value: &Option<String>) -> bool {
            match set {
                None => true,
                Some(set) => value.as_ref().is_some_and(|v| set.contains(v)),
            }
        }

        accepts(&self.names, &identity.name)
            && accepts(&self.sources, &identity.source)
            && accepts(&self.instances, &identity.instance)
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

/// A filter plus the edits applied to every object it selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRule {
    #[serde(default, alias = "filters")]
    pub filter: ObjectFilter,
    pub patches: Vec<PatchOp>,
}

impl PatchRule {
    pub fn new(filter: ObjectFilter, patches: Vec<PatchOp>) -> Self {
        Self { filter, patches }
    }
}

/// Apply `rules` to `objects` in order.
///
/// Objects are never reordered; objects no rule selects are untouched.
pub fn apply(objects: &mut [StructuralObject], rules: &[PatchRule]) -> DomainResult<()> {
    for rule in rules {
        for object in objects.iter_mut() {
            if !rule.filter.matches(object.identity()) {
                continue;
            }
            for op in &rule.patches {
                op.apply_to(object)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ingress() -> StructuralObject {
        StructuralObject::with_identity(
            ObjectIdentity::new("ingress", "app", "ingress"),
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "Ingress",
                "metadata": {"name": "ingress", "namespace": "default"},
            }),
        )
    }

    #[test]
    fn merge_then_remove_cancels_out() {
        let mut objects = vec![ingress()];
        let rules = vec![
            PatchRule::new(
                ObjectFilter::new().names(["ingress"]),
                vec![PatchOp::merge("metadata", json!({"annotations": {"x": "1"}})).unwrap()],
            ),
            PatchRule::new(
                ObjectFilter::new().names(["ingress"]),
                vec![PatchOp::remove("metadata.annotations.x").unwrap()],
            ),
        ];

        apply(&mut objects, &rules).unwrap();

        assert_eq!(objects[0].document()["metadata"]["annotations"], json!({}));
        assert!(objects[0].document()["metadata"]["annotations"].get("x").is_none());
    }

    #[test]
    fn rule_order_is_significant_for_overlapping_paths() {
        let merge = PatchOp::merge("metadata", json!({"annotations": {"x": "1"}})).unwrap();
        let remove = PatchOp::remove("metadata.annotations.x").unwrap();
        let rule = |op: PatchOp| PatchRule::new(ObjectFilter::new(), vec![op]);

        let mut forward = vec![ingress()];
        apply(&mut forward, &[rule(merge.clone()), rule(remove.clone())]).unwrap();

        let mut reverse = vec![ingress()];
        apply(&mut reverse, &[rule(remove), rule(merge)]).unwrap();

        assert_ne!(forward, reverse);
        assert_eq!(reverse[0].document()["metadata"]["annotations"]["x"], "1");
    }

    #[test]
    fn merge_into_missing_path_fails() {
        let mut objects = vec![ingress()];
        let rules = vec![PatchRule::new(
            ObjectFilter::new(),
            vec![PatchOp::merge("spec.rules", json!({"a": 1})).unwrap()],
        )];

        assert_eq!(
            apply(&mut objects, &rules).unwrap_err(),
            DomainError::PathNotMapping {
                path: "spec.rules".into(),
                object: "app/ingress/ingress".into(),
            }
        );
    }

    #[test]
    fn merge_into_scalar_fails() {
        let mut objects = vec![ingress()];
        let rules = vec![PatchRule::new(
            ObjectFilter::new(),
            vec![PatchOp::merge("kind", json!({"a": 1})).unwrap()],
        )];
        assert!(matches!(
            apply(&mut objects, &rules),
            Err(DomainError::PathNotMapping { .. })
        ));
    }

    #[test]
    fn replace_creates_intermediate_nodes() {
        let mut objects = vec![ingress()];
        let rules = vec![PatchRule::new(
            ObjectFilter::new(),
            vec![PatchOp::replace("spec.ingressClassName", json!("alb")).unwrap()],
        )];
        apply(&mut objects, &rules).unwrap();
        assert_eq!(objects[0].document()["spec"]["ingressClassName"], "alb");
    }

    #[test]
    fn replace_through_scalar_fails() {
        let mut objects = vec![ingress()];
        let rules = vec![PatchRule::new(
            ObjectFilter::new(),
            vec![PatchOp::replace("kind.sub", json!(1)).unwrap()],
        )];
        assert!(apply(&mut objects, &rules).is_err());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut objects = vec![ingress()];
        let rules = vec![PatchRule::new(
            ObjectFilter::new(),
            vec![
                PatchOp::remove("metadata.labels.app").unwrap(),
                PatchOp::remove("metadata.namespace").unwrap(),
                PatchOp::remove("metadata.namespace").unwrap(),
            ],
        )];
        apply(&mut objects, &rules).unwrap();
        assert_eq!(objects[0].document()["metadata"], json!({"name": "ingress"}));
    }

    #[test]
    fn pointer_paths_address_keys_with_dots_and_slashes() {
        let mut objects = vec![ingress()];
        let rules = vec![PatchRule::new(
            ObjectFilter::new(),
            vec![
                PatchOp::replace(
                    "/metadata/annotations/kubernetes.io~1ingress.class",
                    json!("alb"),
                )
                .unwrap(),
            ],
        )];
        apply(&mut objects, &rules).unwrap();
        assert_eq!(
            objects[0].document()["metadata"]["annotations"]["kubernetes.io/ingress.class"],
            "alb"
        );
    }

    #[test]
    fn sequence_indices_are_addressable() {
        let mut objects = vec![StructuralObject::new(
            json!({"spec": {"ports": [{"port": 80}, {"port": 443}]}}),
        )];
        let rules = vec![PatchRule::new(
            ObjectFilter::new(),
            vec![PatchOp::replace("spec.ports.1.port", json!(8443)).unwrap()],
        )];
        apply(&mut objects, &rules).unwrap();
        assert_eq!(objects[0].document()["spec"]["ports"][1]["port"], 8443);
    }

    #[test]
    fn filters_select_by_intersection_and_preserve_order() {
        let mut objects = vec![
            StructuralObject::with_identity(ObjectIdentity::new("a", "loki", "one"), json!({"metadata": {}})),
            StructuralObject::with_identity(ObjectIdentity::new("b", "traefik2", "one"), json!({"metadata": {}})),
            StructuralObject::new(json!({"metadata": {}})),
        ];
        let rules = vec![PatchRule::new(
            ObjectFilter::new().sources(["loki", "grafana"]).instances(["one"]),
            vec![PatchOp::replace("metadata.touched", json!(true)).unwrap()],
        )];
        apply(&mut objects, &rules).unwrap();

        assert_eq!(objects[0].document()["metadata"]["touched"], true);
        assert!(objects[1].document()["metadata"].get("touched").is_none());
        assert!(objects[2].document()["metadata"].get("touched").is_none());
        assert_eq!(objects[1].identity().name.as_deref(), Some("b"));
    }

    #[test]
    fn empty_filter_matches_anonymous_objects() {
        assert!(ObjectFilter::new().matches(&ObjectIdentity::default()));
        assert!(!ObjectFilter::new().names(["x"]).matches(&ObjectIdentity::default()));
    }

    #[test]
    fn rules_deserialize_from_patch_documents() {
        let rule: PatchRule = serde_json::from_value(json!({
            "filters": {"names": ["ingress"]},
            "patches": [
                {"op": "merge", "path": "/metadata", "value": {"annotations": {"a": "b"}}},
                {"op": "remove", "path": "metadata.labels"}
            ]
        }))
        .unwrap();

        assert!(rule.filter.matches(&ObjectIdentity::new("ingress", "app", "ingress")));
        assert_eq!(rule.patches.len(), 2);
        assert!(matches!(rule.patches[1], PatchOp::Remove { .. }));
    }

    #[test]
    fn removing_the_root_is_rejected() {
        assert!(matches!(PatchOp::remove(""), Err(DomainError::InvalidPath { .. })));

        let rule: PatchRule = serde_json::from_value(json!({
            "patches": [{"op": "remove", "path": ""}]
        }))
        .unwrap();
        let mut objects = vec![ingress()];
        let err = apply(&mut objects, &[rule]).unwrap_err();

        assert!(matches!(err, DomainError::InvalidPath { .. }));
        assert_eq!(objects[0].document()["metadata"]["name"], "ingress");
    }

    #[test]
    fn invalid_dotted_path_is_rejected() {
        assert!(PatchOp::remove("a..b").is_err());
    }

    proptest! {
        #[test]
        fn disjoint_edits_commute(a in "[a-z]{1,6}", b in "[A-Z]{1,6}", va in any::<i32>(), vb in any::<i32>()) {
            let first = PatchOp::replace(&format!("spec.{a}"), json!(va)).unwrap();
            let second = PatchOp::merge("metadata", json!({ b.clone(): vb })).unwrap();
            let rule = |op: PatchOp| PatchRule::new(ObjectFilter::new(), vec![op]);

            let mut forward = vec![ingress()];
            apply(&mut forward, &[rule(first.clone()), rule(second.clone())]).unwrap();
            let mut reverse = vec![ingress()];
            apply(&mut reverse, &[rule(second), rule(first)]).unwrap();

            prop_assert_eq!(forward[0].document(), reverse[0].document());
        }
    }
}
