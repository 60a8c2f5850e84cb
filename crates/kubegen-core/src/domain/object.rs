//! Structural objects: generated documents tagged with identity metadata.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Identity metadata carried by an emitted object.
///
/// Every field is optional: hand-written documents appended by a driver
/// script usually carry none, builder output always carries all three.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    /// Emitted object name (after builder remapping).
    pub name: Option<String>,
    /// Subsystem that produced the object, e.g. `traefik2`.
    pub source: Option<String>,
    /// Logical instance, for stacks deployed more than once.
    pub instance: Option<String>,
}

impl ObjectIdentity {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            source: Some(source.into()),
            instance: Some(instance.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none() && self.source.is_none() && self.instance.is_none()
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
        write!(
            f,
            "{}/{}/{}",
            part(&self.source),
            part(&self.instance),
            part(&self.name)
        )
    }
}

/// A generated document plus its identity.
///
/// Mutable (through the patch engine) until it is appended to an output
/// file; output files only hand out shared references.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralObject {
    identity: ObjectIdentity,
    document: Json,
}

impl StructuralObject {
    /// An object without identity metadata.
    pub fn new(document: Json) -> Self {
        Self {
            identity: ObjectIdentity::default(),
            document,
        }
    }

    /// An object carrying only a name; builders fill in source and instance.
    pub fn named(name: impl Into<String>, document: Json) -> Self {
        Self {
            identity: ObjectIdentity {
                name: Some(name.into()),
                ..ObjectIdentity::default()
            },
            document,
        }
    }

    pub fn with_identity(identity: ObjectIdentity, document: Json) -> Self {
        Self { identity, document }
    }

    pub fn identity(&self) -> &ObjectIdentity {
        &self.identity
    }

    pub(crate) fn identity_mut(&mut self) -> &mut ObjectIdentity {
        &mut self.identity
    }

    pub fn document(&self) -> &Json {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Json {
        &mut self.document
    }

    pub fn into_document(self) -> Json {
        self.document
    }

    /// `kind` of the document, if it has one.
    pub fn kind(&self) -> Option<&str> {
        self.document.get("kind").and_then(Json::as_str)
    }
}

impl From<Json> for StructuralObject {
    fn from(document: Json) -> Self {
        Self::new(document)
    }
}

/// Deep-merge `overlay` into `base`: objects merge key by key, anything else
/// is replaced.
pub fn merge_json(base: &mut Json, overlay: Json) {
    match (base, overlay) {
        (Json::Object(base), Json::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}
