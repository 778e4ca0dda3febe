//! The schema registry and its shortest-path forest.
//!
//! A [`Registry`] is built once at startup from validated [`Model`]s and is
//! read-only afterwards. Consumers receive it explicitly (usually behind an
//! `Arc`); there is no process-wide instance.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{LookupError, SchemaError};
use crate::schema::{ChildDef, Model, ModelBuilder};
use crate::value::PropertyKind;

/// One hop of an ancestor path: the node label and the relationship type
/// leaving it towards the next hop.
pub type Hop = (String, String);

/// Accumulates models before the forest is computed.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: BTreeMap<String, Model>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validated model.
    pub fn register(&mut self, model: Model) -> Result<&mut Self, SchemaError> {
        if self.models.contains_key(model.label()) {
            return Err(SchemaError::DuplicateModel(model.label().to_string()));
        }
        self.models.insert(model.label().to_string(), model);
        Ok(self)
    }

    /// Validate and register a model declaration.
    pub fn define(&mut self, builder: ModelBuilder) -> Result<&mut Self, SchemaError> {
        let model = builder.build()?;
        self.register(model)
    }

    /// Check child references and compute the forest.
    pub fn build(self) -> Result<Registry, SchemaError> {
        for model in self.models.values() {
            for (name, child) in model.children() {
                if !self.models.contains_key(&child.label) {
                    return Err(SchemaError::UnknownChildModel {
                        label: model.label().to_string(),
                        child: name.clone(),
                        target: child.label.clone(),
                    });
                }
            }
        }

        let forest = Forest::compute(&self.models);
        let ancestors = compute_ancestors(&self.models);

        tracing::debug!(
            models = self.models.len(),
            roots = ancestors.values().filter(|p| p.is_empty()).count(),
            "Schema registry built"
        );

        Ok(Registry {
            models: self.models,
            forest,
            ancestors,
        })
    }
}

/// Read-only mapping of label to [`Model`] plus derived paths.
#[derive(Debug, Clone)]
pub struct Registry {
    models: BTreeMap<String, Model>,
    forest: Forest,
    ancestors: BTreeMap<String, Vec<Hop>>,
}

impl Registry {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn get(&self, label: &str) -> Option<&Model> {
        self.models.get(label)
    }

    /// Like [`get`](Self::get) but unknown labels are a [`LookupError`].
    pub fn model(&self, label: &str) -> Result<&Model, LookupError> {
        self.models
            .get(label)
            .ok_or_else(|| LookupError::ModelNotFound(label.to_string()))
    }

    pub fn identity_property(&self, label: &str) -> Result<&str, LookupError> {
        Ok(self.model(label)?.identity_property())
    }

    pub fn static_properties(&self, label: &str) -> Result<&[String], LookupError> {
        Ok(self.model(label)?.static_properties())
    }

    pub fn state_properties(&self, label: &str) -> Result<&[String], LookupError> {
        Ok(self.model(label)?.state_properties())
    }

    pub fn properties(&self, label: &str) -> Result<Vec<&str>, LookupError> {
        Ok(self.model(label)?.property_names())
    }

    pub fn property_kind(&self, label: &str, property: &str) -> Result<PropertyKind, LookupError> {
        self.model(label)?
            .property(property)
            .map(|p| p.kind)
            .ok_or_else(|| LookupError::PropertyNotFound {
                model: label.to_string(),
                property: property.to_string(),
            })
    }

    pub fn state_label(&self, label: &str) -> Result<&str, LookupError> {
        Ok(self.model(label)?.state_label())
    }

    pub fn child(&self, label: &str, name: &str) -> Result<&ChildDef, LookupError> {
        self.model(label)?
            .child(name)
            .ok_or_else(|| LookupError::ChildNotFound {
                model: label.to_string(),
                child: name.to_string(),
            })
    }

    /// Unknown labels are reported as not shared.
    pub fn is_shared(&self, label: &str) -> bool {
        self.models.get(label).is_some_and(Model::is_shared)
    }

    /// Every shortest descendant path from `label`, shortest first.
    ///
    /// The first entry is always `[label]`. Unknown labels yield an empty list.
    pub fn paths_from(&self, label: &str) -> Vec<Vec<String>> {
        self.forest.paths_from(label)
    }

    /// Ancestor chain from a graph root down to (not including) `label`.
    ///
    /// Roots and unknown labels yield an empty chain.
    pub fn path(&self, label: &str) -> Vec<Hop> {
        self.ancestors.get(label).cloned().unwrap_or_default()
    }
}

/// Shortest descendant paths for every label.
#[derive(Debug, Clone, Default)]
struct Forest {
    paths: BTreeMap<String, Vec<Vec<String>>>,
}

impl Forest {
    fn compute(models: &BTreeMap<String, Model>) -> Self {
        let paths = models
            .keys()
            .map(|label| (label.clone(), bfs_paths(models, label)))
            .collect();
        Self { paths }
    }

    fn paths_from(&self, label: &str) -> Vec<Vec<String>> {
        self.paths.get(label).cloned().unwrap_or_default()
    }
}

/// Breadth-first walk over child relationships. BFS discovery order is
/// already ascending by length; ties follow child-set name order.
fn bfs_paths(models: &BTreeMap<String, Model>, root: &str) -> Vec<Vec<String>> {
    let mut seen = BTreeSet::from([root.to_string()]);
    let mut queue = VecDeque::from([vec![root.to_string()]]);
    let mut out = Vec::new();

    while let Some(path) = queue.pop_front() {
        let Some(last) = path.last().and_then(|l| models.get(l)) else {
            continue;
        };
        for child in last.children().values() {
            if seen.insert(child.label.clone()) {
                let mut next = path.clone();
                next.push(child.label.clone());
                queue.push_back(next);
            }
        }
        out.push(path);
    }
    out
}

/// Shortest hop chain from any root to every reachable label.
fn compute_ancestors(models: &BTreeMap<String, Model>) -> BTreeMap<String, Vec<Hop>> {
    let targets: BTreeSet<&str> = models
        .values()
        .flat_map(|m| m.children().values().map(|c| c.label.as_str()))
        .collect();

    let mut ancestors: BTreeMap<String, Vec<Hop>> = BTreeMap::new();
    let mut queue = VecDeque::new();
    for label in models.keys().filter(|l| !targets.contains(l.as_str())) {
        ancestors.insert(label.clone(), Vec::new());
        queue.push_back(label.clone());
    }

    while let Some(label) = queue.pop_front() {
        let Some(model) = models.get(&label) else {
            continue;
        };
        let chain = ancestors.get(&label).cloned().unwrap_or_default();
        for child in model.children().values() {
            if ancestors.contains_key(&child.label) {
                continue;
            }
            let mut hops = chain.clone();
            hops.push((label.clone(), child.reltype.clone()));
            ancestors.insert(child.label.clone(), hops);
            queue.push_back(child.label.clone());
        }
    }
    ancestors
}
