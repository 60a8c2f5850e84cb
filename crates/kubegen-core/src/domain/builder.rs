//! Builder / Build Item protocol.
//!
//! A [`BuildSource`] describes one stack: which items it can produce, which
//! logical object names those items emit, and which options they need. A
//! [`Builder`] binds a source to an immutable option snapshot and a remap
//! table, validates up front, and runs items on request.
//!
//! Items are pure functions of the options and the remap table. Nothing is
//! cached: building the same item twice produces it twice.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::object::{ObjectIdentity, StructuralObject};
use crate::domain::options::{OptionStore, OptionValue};

/// A named production step and the option paths it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildItem {
    pub name: &'static str,
    pub requires: &'static [&'static str],
}

impl BuildItem {
    pub const fn new(name: &'static str) -> Self {
        Self { name, requires: &[] }
    }

    pub const fn requires(name: &'static str, requires: &'static [&'static str]) -> Self {
        Self { name, requires }
    }
}

/// What a stack can build.
pub trait BuildSource: Send + Sync {
    /// Source tag stamped on every emitted object, e.g. `traefik2`.
    fn source_name(&self) -> &'static str;

    fn items(&self) -> &'static [BuildItem];

    /// Every logical object name any item may emit.
    fn object_names(&self) -> &'static [&'static str];

    /// Option paths that must resolve for the builder to exist at all.
    fn required_options(&self) -> &'static [&'static str] {
        &[]
    }

    /// Defaults the caller's options are overlaid onto.
    fn option_defaults(&self) -> OptionValue {
        OptionValue::empty_map()
    }

    /// Produce the objects of `item`. Objects carry their logical name;
    /// the builder stamps the final identity.
    fn produce(&self, item: &str, ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>>;
}

/// Logical → emitted object names.
#[derive(Debug, Clone, Default)]
struct NameTable {
    declared: &'static [&'static str],
    remap: BTreeMap<String, String>,
}

impl NameTable {
    fn declares(&self, logical: &str) -> bool {
        self.declared.iter().any(|name| *name == logical)
    }

    fn resolve(&self, builder: &str, logical: &str) -> DomainResult<String> {
        if !self.declares(logical) {
            return Err(DomainError::UnknownObject {
                builder: builder.to_string(),
                name: logical.to_string(),
            });
        }
        Ok(self
            .remap
            .get(logical)
            .cloned()
            .unwrap_or_else(|| logical.to_string()))
    }
}

/// What an item sees while producing.
pub struct BuildContext<'a> {
    source: &'static str,
    options: &'a OptionStore,
    names: &'a NameTable,
}

impl BuildContext<'_> {
    /// Emitted name for a logical object name.
    pub fn object_name(&self, logical: &str) -> DomainResult<String> {
        self.names.resolve(self.source, logical)
    }

    pub fn options(&self) -> &OptionStore {
        self.options
    }

    pub fn namespace(&self) -> DomainResult<String> {
        self.options.get_str("namespace")
    }
}

/// A [`BuildSource`] bound to its options and remap table.
pub struct Builder<S> {
    source: S,
    options: OptionStore,
    names: NameTable,
    instance: String,
    strict: bool,
}

impl<S: BuildSource> Builder<S> {
    /// Bind `source` to `options`, failing on the first required option
    /// that does not resolve.
    pub fn new(source: S, options: OptionStore) -> DomainResult<Self> {
        if let Some(path) = source
            .required_options()
            .iter()
            .find(|path| !options.contains(path))
        {
            return Err(DomainError::MissingConfig {
                builder: source.source_name().to_string(),
                path: (*path).to_string(),
            });
        }

        Ok(Self {
            instance: source.source_name().to_string(),
            names: NameTable {
                declared: source.object_names(),
                remap: BTreeMap::new(),
            },
            source,
            options,
            strict: false,
        })
    }

    /// Bind `source` to its defaults overlaid with `user`; `!root`
    /// references in either resolve against `root`.
    pub fn derived(
        source: S,
        root: &OptionStore,
        user: impl Into<OptionValue>,
    ) -> DomainResult<Self> {
        let options = root.derive(source.option_defaults(), user)?;
        Self::new(source, options)
    }

    /// Instance tag for emitted objects. Defaults to the source name.
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Reject builds whose output repeats an identity.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Overlay entries onto the remap table. Later entries win.
    pub fn remap<I, K, V>(&mut self, entries: I) -> DomainResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        if let Some((logical, _)) = entries
            .iter()
            .find(|(logical, _)| !self.names.declares(logical))
        {
            return Err(DomainError::UnknownObject {
                builder: self.source_name().to_string(),
                name: logical.clone(),
            });
        }

        self.names.remap.extend(entries);
        Ok(())
    }

    /// Check every item exists and its option prerequisites resolve.
    /// Produces nothing.
    pub fn ensure_items(&self, names: &[&str]) -> DomainResult<()> {
        for name in names {
            let item = self.item(name)?;
            let missing: Vec<String> = item
                .requires
                .iter()
                .filter(|path| !self.options.contains(path))
                .map(|path| (*path).to_string())
                .collect();
            if !missing.is_empty() {
                return Err(DomainError::UnbuildableItem {
                    item: (*name).to_string(),
                    missing,
                });
            }
        }
        Ok(())
    }

    /// Build `names` in order and concatenate their objects.
    pub fn build(&self, names: &[&str]) -> DomainResult<Vec<StructuralObject>> {
        self.ensure_items(names)?;

        let ctx = BuildContext {
            source: self.source.source_name(),
            options: &self.options,
            names: &self.names,
        };

        let mut objects = Vec::new();
        for name in names {
            for mut object in self.source.produce(name, &ctx)? {
                self.stamp(&mut object)?;
                objects.push(object);
            }
        }

        if self.strict {
            let mut seen = HashSet::new();
            if let Some(dup) = objects.iter().find(|o| !seen.insert(o.identity())) {
                return Err(DomainError::DuplicateIdentity {
                    identity: dup.identity().to_string(),
                });
            }
        }

        Ok(objects)
    }

    pub fn object_name(&self, logical: &str) -> DomainResult<String> {
        self.names.resolve(self.source_name(), logical)
    }

    pub fn namespace(&self) -> DomainResult<String> {
        self.options.get_str("namespace")
    }

    pub fn option_get(&self, path: &str) -> DomainResult<OptionValue> {
        self.options.get(path)
    }

    pub fn options(&self) -> &OptionStore {
        &self.options
    }

    pub fn source_name(&self) -> &'static str {
        self.source.source_name()
    }

    pub fn instance_name(&self) -> &str {
        &self.instance
    }

    pub fn item_names(&self) -> impl Iterator<Item = &'static str> {
        self.source.items().iter().map(|item| item.name)
    }

    fn item(&self, name: &str) -> DomainResult<&'static BuildItem> {
        self.source
            .items()
            .iter()
            .find(|item| item.name == name)
            .ok_or_else(|| DomainError::UnknownBuildItem {
                builder: self.source_name().to_string(),
                item: name.to_string(),
            })
    }

    fn stamp(&self, object: &mut StructuralObject) -> DomainResult<()> {
        let name = match object.identity().name.as_deref() {
            Some(logical) => Some(self.object_name(logical)?),
            None => None,
        };
        *object.identity_mut() = ObjectIdentity {
            name,
            source: Some(self.source_name().to_string()),
            instance: Some(self.instance.clone()),
        };
        Ok(())
    }
}

impl<S: BuildSource> fmt::Debug for Builder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("source", &self.source.source_name())
            .field("instance", &self.instance)
            .field("remap", &self.names.remap)
            .field("strict", &self.strict)
            .finish()
    }
}
