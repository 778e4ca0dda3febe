//! Model definitions and the builder that validates them.
//!
//! A [`Model`] is produced once by [`ModelBuilder::build`], which checks the
//! identity / static / state partition. Nothing re-validates a model after
//! that point.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::SchemaError;
use crate::value::PropertyKind;

/// Delimiter joining the components of a concatenated identity.
pub const CONCAT_DELIMITER: &str = "_";

/// One declared property of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    pub is_identity: bool,
    pub is_static: bool,
    pub is_state: bool,
    /// Components joined with [`CONCAT_DELIMITER`] to derive this value.
    pub concat: Vec<String>,
}

impl PropertyDef {
    /// A property with no classification flags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Str,
            is_identity: false,
            is_static: false,
            is_state: false,
            concat: Vec::new(),
        }
    }

    pub fn identity(name: impl Into<String>) -> Self {
        Self::new(name).with_identity()
    }

    pub fn static_(name: impl Into<String>) -> Self {
        Self::new(name).with_static()
    }

    pub fn state(name: impl Into<String>) -> Self {
        Self::new(name).with_state()
    }

    pub fn with_identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn with_state(mut self) -> Self {
        self.is_state = true;
        self
    }

    pub fn with_kind(mut self, kind: PropertyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_concat(mut self, components: &[&str]) -> Self {
        self.concat = components.iter().map(|c| c.to_string()).collect();
        self
    }

    fn flag_count(&self) -> usize {
        [self.is_identity, self.is_static, self.is_state]
            .iter()
            .filter(|f| **f)
            .count()
    }
}

/// A named child relationship of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildDef {
    pub reltype: String,
    pub label: String,
}

/// Immutable schema record for one node label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    label: String,
    state_label: String,
    identity: String,
    statics: Vec<String>,
    states: Vec<String>,
    properties: BTreeMap<String, PropertyDef>,
    children: BTreeMap<String, ChildDef>,
    shared: bool,
}

impl Model {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label of the companion state nodes (`<Label>State` unless overridden).
    pub fn state_label(&self) -> &str {
        &self.state_label
    }

    pub fn identity_property(&self) -> &str {
        &self.identity
    }

    pub fn static_properties(&self) -> &[String] {
        &self.statics
    }

    pub fn state_properties(&self) -> &[String] {
        &self.states
    }

    pub fn has_state(&self) -> bool {
        !self.states.is_empty()
    }

    /// Property names, identity first, then static, then state.
    pub fn property_names(&self) -> Vec<&str> {
        std::iter::once(self.identity.as_str())
            .chain(self.statics.iter().map(String::as_str))
            .chain(self.states.iter().map(String::as_str))
            .collect()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.values()
    }

    /// Components of the identity property when it is derived.
    pub fn identity_concat(&self) -> &[String] {
        self.properties
            .get(&self.identity)
            .map(|p| p.concat.as_slice())
            .unwrap_or(&[])
    }

    pub fn children(&self) -> &BTreeMap<String, ChildDef> {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&ChildDef> {
        self.children.get(name)
    }

    /// Shared models are referenced from many environments (package/version
    /// tuples and the like) and are never removed with an environment.
    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

/// Collects the declaration of a model and validates it in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    label: String,
    state_label: Option<String>,
    properties: Vec<PropertyDef>,
    children: Vec<(String, ChildDef)>,
    shared: bool,
}

impl ModelBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state_label: None,
            properties: Vec::new(),
            children: Vec::new(),
            shared: false,
        }
    }

    pub fn state_label(mut self, label: impl Into<String>) -> Self {
        self.state_label = Some(label.into());
        self
    }

    pub fn property(mut self, def: PropertyDef) -> Self {
        self.properties.push(def);
        self
    }

    pub fn identity(self, name: &str) -> Self {
        self.property(PropertyDef::identity(name))
    }

    /// Identity derived by joining `components` with `_`.
    pub fn identity_concat(self, name: &str, components: &[&str]) -> Self {
        self.property(PropertyDef::identity(name).with_concat(components))
    }

    pub fn statics(mut self, names: &[&str]) -> Self {
        for name in names {
            self.properties.push(PropertyDef::static_(*name));
        }
        self
    }

    pub fn states(mut self, names: &[&str]) -> Self {
        for name in names {
            self.properties.push(PropertyDef::state(*name));
        }
        self
    }

    pub fn typed_state(self, name: &str, kind: PropertyKind) -> Self {
        self.property(PropertyDef::state(name).with_kind(kind))
    }

    pub fn typed_static(self, name: &str, kind: PropertyKind) -> Self {
        self.property(PropertyDef::static_(name).with_kind(kind))
    }

    pub fn child(mut self, name: &str, reltype: &str, label: &str) -> Self {
        self.children.push((
            name.to_string(),
            ChildDef {
                reltype: reltype.to_string(),
                label: label.to_string(),
            },
        ));
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    /// Validate the property partition and freeze the model.
    pub fn build(self) -> Result<Model, SchemaError> {
        let mut properties = BTreeMap::new();
        let mut identities = Vec::new();
        let mut statics = Vec::new();
        let mut states = Vec::new();

        for def in self.properties {
            if def.flag_count() > 1 {
                return Err(SchemaError::ConflictingFlags {
                    label: self.label,
                    property: def.name,
                });
            }
            if properties.contains_key(&def.name) {
                return Err(SchemaError::DuplicateProperty {
                    label: self.label,
                    property: def.name,
                });
            }
            // Unflagged properties are written once, like statics.
            if def.is_identity {
                identities.push(def.name.clone());
            } else if def.is_state {
                states.push(def.name.clone());
            } else {
                statics.push(def.name.clone());
            }
            properties.insert(def.name.clone(), def);
        }

        let identity = match identities.len() {
            0 => return Err(SchemaError::MissingIdentity { label: self.label }),
            1 => identities.remove(0),
            _ => {
                return Err(SchemaError::MultipleIdentity {
                    label: self.label,
                    properties: identities,
                })
            }
        };

        for def in properties.values() {
            for component in &def.concat {
                if !properties.contains_key(component) {
                    return Err(SchemaError::UnknownConcatProperty {
                        label: self.label.clone(),
                        property: def.name.clone(),
                        component: component.clone(),
                    });
                }
            }
        }

        let state_label = self
            .state_label
            .unwrap_or_else(|| format!("{}State", self.label));

        Ok(Model {
            label: self.label,
            state_label,
            identity,
            statics,
            states,
            properties,
            children: self.children.into_iter().collect(),
            shared: self.shared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ModelBuilder {
        ModelBuilder::new("Test")
    }

    #[test]
    fn builds_partition() {
        let model = base()
            .identity_concat("test_concat", &["test_state", "test_static"])
            .statics(&["test_static"])
            .typed_state("test_state", PropertyKind::Int)
            .build()
            .unwrap();

        assert_eq!(model.label(), "Test");
        assert_eq!(model.state_label(), "TestState");
        assert_eq!(model.identity_property(), "test_concat");
        assert_eq!(model.static_properties(), ["test_static".to_string()]);
        assert_eq!(model.state_properties(), ["test_state".to_string()]);
        assert_eq!(
            model.identity_concat(),
            ["test_state".to_string(), "test_static".to_string()]
        );
        assert_eq!(
            model.property("test_state").map(|p| p.kind),
            Some(PropertyKind::Int)
        );
        assert!(model.has_state());
    }

    #[test]
    fn rejects_missing_identity() {
        let err = base().statics(&["a"]).build().unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingIdentity {
                label: "Test".into()
            }
        );
    }

    #[test]
    fn rejects_multiple_identities() {
        let err = base().identity("a").identity("b").build().unwrap_err();
        assert!(matches!(err, SchemaError::MultipleIdentity { properties, .. } if properties == ["a", "b"]));
    }

    #[test]
    fn rejects_static_and_state() {
        let err = base()
            .identity("id")
            .property(PropertyDef::static_("x").with_state())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingFlags { property, .. } if property == "x"));
    }

    #[test]
    fn rejects_identity_with_static() {
        let err = base()
            .property(PropertyDef::identity("id").with_static())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingFlags { .. }));
    }

    #[test]
    fn rejects_duplicate_property() {
        let err = base()
            .identity("id")
            .statics(&["x"])
            .states(&["x"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateProperty { property, .. } if property == "x"));
    }

    #[test]
    fn rejects_unknown_concat_component() {
        let err = base()
            .identity_concat("a_b", &["a", "b"])
            .statics(&["a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownConcatProperty { component, .. } if component == "b"));
    }

    #[test]
    fn model_without_state() {
        let model = base().identity("id").statics(&["x"]).build().unwrap();
        assert!(!model.has_state());
        assert_eq!(model.property_names(), vec!["id", "x"]);
    }
}
