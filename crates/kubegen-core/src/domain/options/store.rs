use std::sync::Arc;

use serde_json::Value as Json;

use super::path::DottedPath;
use super::value::{OptionRef, OptionValue, RefScope};
use crate::domain::error::{DomainError, DomainResult};

/// Hierarchical, read-only configuration store.
///
/// Values may be deferred references ([`OptionValue::Ref`]) that are
/// resolved against the store at read time, so a fragment can point at a
/// value that is only finalized by a later overlay.
///
/// The store is a cheap-to-clone snapshot: [`OptionStore::overlay`] returns a
/// new store and never changes the receiver.
#[derive(Debug, Clone)]
pub struct OptionStore {
    tree: Arc<OptionValue>,
    root: Option<Arc<OptionStore>>,
}

/// One entry of the resolution trail: which store, which path.
type TrailEntry = (usize, String);

impl OptionStore {
    /// Build a store from a literal nested mapping.
    pub fn build(tree: impl Into<OptionValue>) -> DomainResult<Self> {
        let tree = tree.into();
        if !tree.is_map() {
            return Err(DomainError::InvalidOptionValue {
                path: String::new(),
                expected: "mapping",
            });
        }

        Ok(Self {
            tree: Arc::new(tree),
            root: None,
        })
    }

    /// An empty store.
    pub fn empty() -> Self {
        Self {
            tree: Arc::new(OptionValue::empty_map()),
            root: None,
        }
    }

    /// Derive a builder-options store: `defaults` overlaid with `user`, whose
    /// root-scoped references resolve against `self`.
    pub fn derive(
        &self,
        defaults: impl Into<OptionValue>,
        user: impl Into<OptionValue>,
    ) -> DomainResult<Self> {
        let mut derived = Self::build(defaults)?.overlay("", user)?;
        derived.root = Some(Arc::new(self.clone()));
        Ok(derived)
    }

    /// The raw, unresolved tree.
    pub fn tree(&self) -> &OptionValue {
        &self.tree
    }

    /// Resolve the value at `path`, following deferred references.
    pub fn get(&self, path: &str) -> DomainResult<OptionValue> {
        let path = DottedPath::parse(path)?;
        self.lookup(&path, &mut Vec::new())
    }

    /// Whether `path` resolves to a value.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    pub fn get_str(&self, path: &str) -> DomainResult<String> {
        match self.get(path)? {
            OptionValue::Str(s) => Ok(s),
            _ => Err(invalid(path, "string")),
        }
    }

    pub fn get_i64(&self, path: &str) -> DomainResult<i64> {
        self.get(path)?.as_i64().ok_or_else(|| invalid(path, "integer"))
    }

    pub fn get_u64(&self, path: &str) -> DomainResult<u64> {
        self.get_i64(path)
            .and_then(|i| u64::try_from(i).map_err(|_| invalid(path, "non-negative integer")))
    }

    pub fn get_bool(&self, path: &str) -> DomainResult<bool> {
        self.get(path)?.as_bool().ok_or_else(|| invalid(path, "boolean"))
    }

    /// The resolved subtree at `path` as a JSON document value.
    pub fn to_json(&self, path: &str) -> DomainResult<Json> {
        Ok(self.get(path)?.into_json())
    }

    /// Deep-merge `partial` into the node at `path`, returning a new store.
    ///
    /// Missing intermediate mappings are created; a scalar in the way is an
    /// error. The empty path addresses the root.
    pub fn overlay(&self, path: &str, partial: impl Into<OptionValue>) -> DomainResult<Self> {
        let path = DottedPath::parse(path)?;
        let partial = partial.into();
        if path.is_root() && !partial.is_map() {
            return Err(invalid("", "mapping"));
        }

        let mut tree = self.tree.as_ref().clone();
        let mut node = &mut tree;
        for (depth, segment) in path.segments().iter().enumerate() {
            let OptionValue::Map(map) = node else {
                return Err(invalid(&path.prefix(depth).to_string(), "mapping"));
            };
            node = map
                .entry(segment.clone())
                .or_insert_with(OptionValue::empty_map);
        }
        node.merge(partial);

        Ok(Self {
            tree: Arc::new(tree),
            root: self.root.clone(),
        })
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    fn id(&self) -> usize {
        Arc::as_ptr(&self.tree) as usize
    }

    fn lookup(&self, path: &DottedPath, trail: &mut Vec<TrailEntry>) -> DomainResult<OptionValue> {
        let (owner, node) = self.locate(path, trail)?;
        owner.resolve_deep(node.clone(), trail)
    }

    /// Walk `path` to its raw node, following references only where the walk
    /// has to descend through them. Returns the node with the store owning it.
    fn locate<'a>(
        &'a self,
        path: &DottedPath,
        trail: &mut Vec<TrailEntry>,
    ) -> DomainResult<(&'a OptionStore, &'a OptionValue)> {
        let mut owner = self;
        let mut node = self.tree.as_ref();

        for (depth, segment) in path.segments().iter().enumerate() {
            if let OptionValue::Ref(reference) = node {
                (owner, node) = owner.follow_shallow(reference, trail)?;
            }

            node = node.child(segment).ok_or_else(|| DomainError::PathNotFound {
                path: path.prefix(depth + 1).to_string(),
            })?;
        }

        Ok((owner, node))
    }

    /// Follow a reference chain to the first concrete node without resolving
    /// anything beneath it.
    fn follow_shallow<'a>(
        &'a self,
        reference: &OptionRef,
        trail: &mut Vec<TrailEntry>,
    ) -> DomainResult<(&'a OptionStore, &'a OptionValue)> {
        let store = self.target(reference);
        enter(trail, (store.id(), reference.path.to_string()))?;

        let located = match store.locate(&reference.path, trail) {
            Ok((owner, OptionValue::Ref(next))) => owner.follow_shallow(next, trail),
            other => other,
        };
        trail.pop();
        located
    }

    fn follow(&self, reference: &OptionRef, trail: &mut Vec<TrailEntry>) -> DomainResult<OptionValue> {
        let store = self.target(reference);
        enter(trail, (store.id(), reference.path.to_string()))?;

        let resolved = store.lookup(&reference.path, trail);
        trail.pop();
        resolved
    }

    fn target(&self, reference: &OptionRef) -> &OptionStore {
        match reference.scope {
            RefScope::Local => self,
            RefScope::Root => self.root.as_deref().unwrap_or(self),
        }
    }

    fn resolve_deep(&self, value: OptionValue, trail: &mut Vec<TrailEntry>) -> DomainResult<OptionValue> {
        match value {
            OptionValue::Ref(reference) => self.follow(&reference, trail),
            OptionValue::Map(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, self.resolve_deep(v, trail)?)))
                .collect::<DomainResult<_>>()
                .map(OptionValue::Map),
            OptionValue::Seq(items) => items
                .into_iter()
                .map(|v| self.resolve_deep(v, trail))
                .collect::<DomainResult<_>>()
                .map(OptionValue::Seq),
            other => Ok(other),
        }
    }
}

impl Default for OptionStore {
    fn default() -> Self {
        Self::empty()
    }
}

fn enter(trail: &mut Vec<TrailEntry>, entry: TrailEntry) -> DomainResult<()> {
    if trail.contains(&entry) {
        let mut cycle: Vec<&str> = trail.iter().map(|(_, p)| p.as_str()).collect();
        cycle.push(&entry.1);
        return Err(DomainError::CyclicReference {
            cycle: cycle.join(" -> "),
        });
    }

    trail.push(entry);
    Ok(())
}

fn invalid(path: &str, expected: &'static str) -> DomainError {
    DomainError::InvalidOptionValue {
        path: path.to_string(),
        expected,
    }
}
