//! Versioned entities: one node per identity plus an optional chain of
//! interval-stamped state nodes.

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_core::convert::convert;
use strata_core::schema::CONCAT_DELIMITER;
use strata_core::{LookupError, Model, PropertyMap, PropertyValue, Registry};

use crate::client::GraphError;
use crate::query::entity::ChildEdges;
use crate::query::{
    CloseChildren, CloseState, CreateNode, CreateState, FindNode, LastStateChange, LinkChildren,
    NodeRef, OpenChildren, OpenState, SetProperties,
};
use crate::store::{finish, GraphStore, StoreTxn};

/// One observation of an entity, converted to its model's types.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity<'m> {
    model: &'m Model,
    identity: PropertyValue,
    statics: PropertyMap,
    state: PropertyMap,
}

impl<'m> Entity<'m> {
    /// Build an entity from raw observed values.
    ///
    /// Values are converted to the declared property kinds where possible and
    /// kept as observed otherwise. Nulls are dropped. A concatenated identity
    /// is derived from its components unless supplied directly.
    pub fn new(model: &'m Model, values: PropertyMap) -> Result<Self, GraphError> {
        let mut statics = PropertyMap::new();
        let mut state = PropertyMap::new();
        let mut identity = None;
        let identity_property = model.identity_property();

        for (name, raw) in values {
            let def = model.property(&name).ok_or_else(|| LookupError::PropertyNotFound {
                model: model.label().to_string(),
                property: name.clone(),
            })?;
            let value = convert(&raw, def.kind).unwrap_or(raw);
            if value.is_null() {
                continue;
            }
            if def.is_identity {
                identity = Some(value);
            } else if def.is_state {
                state.insert(name, value);
            } else {
                statics.insert(name, value);
            }
        }

        let identity = match identity {
            Some(v) => v,
            None => concat_identity(model, &statics, &state)?,
        };

        Ok(Self {
            model,
            identity,
            statics,
            state,
        })
    }

    /// Start a builder for `model`.
    pub fn builder(model: &'m Model) -> EntityBuilder<'m> {
        EntityBuilder {
            model,
            values: PropertyMap::new(),
        }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn identity(&self) -> &PropertyValue {
        &self.identity
    }

    pub fn statics(&self) -> &PropertyMap {
        &self.statics
    }

    pub fn state(&self) -> &PropertyMap {
        &self.state
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        if name == self.model.identity_property() {
            return Some(&self.identity);
        }
        self.statics.get(name).or_else(|| self.state.get(name))
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(
            self.model.label(),
            self.model.identity_property(),
            self.identity.clone(),
        )
    }
}

fn concat_identity(
    model: &Model,
    statics: &PropertyMap,
    state: &PropertyMap,
) -> Result<PropertyValue, GraphError> {
    let missing = || GraphError::MissingIdentity {
        label: model.label().to_string(),
        property: model.identity_property().to_string(),
    };
    if model.identity_concat().is_empty() {
        return Err(missing());
    }
    let parts = model
        .identity_concat()
        .iter()
        .map(|component| {
            statics
                .get(component)
                .or_else(|| state.get(component))
                .map(ToString::to_string)
                .ok_or_else(|| GraphError::MissingIdentity {
                    label: model.label().to_string(),
                    property: component.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PropertyValue::Str(parts.join(CONCAT_DELIMITER)))
}

/// Collects observed values for an [`Entity`].
#[derive(Debug, Clone)]
pub struct EntityBuilder<'m> {
    model: &'m Model,
    values: PropertyMap,
}

impl<'m> EntityBuilder<'m> {
    pub fn set(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Set from a snapshot document value. Absent keys leave the property unset.
    pub fn set_json(self, name: &str, value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(v) => self.set(name, PropertyValue::from_json(v)),
            None => self,
        }
    }

    pub fn build(self) -> Result<Entity<'m>, GraphError> {
        Entity::new(self.model, self.values)
    }
}

/// An entity as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub label: String,
    pub identity: PropertyValue,
    pub properties: PropertyMap,
    /// Open state, for models with state properties.
    pub state: Option<PropertyMap>,
}

/// What [`VersionedGraph::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Created,
    StateChanged,
    Unchanged,
}

/// What [`VersionedGraph::update_children`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildChanges {
    pub opened: Vec<PropertyValue>,
    pub closed: Vec<PropertyValue>,
    pub unchanged: usize,
}

/// Versioned reads and writes against a store.
#[derive(Clone)]
pub struct VersionedGraph<S> {
    store: S,
    registry: Arc<Registry>,
}

impl<S: GraphStore> VersionedGraph<S> {
    pub fn new(store: S, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Look up one entity by identity. Absence is `Ok(None)`.
    pub async fn find(
        &self,
        label: &str,
        identity: impl Into<PropertyValue>,
    ) -> Result<Option<StoredEntity>, GraphError> {
        let model = self.registry.model(label)?;
        let identity = identity.into();
        let mut txn = self.store.begin().await?;
        let result = find_in(&mut txn, model, &identity).await;
        finish(txn, result).await
    }

    /// Record `entity` as observed at `t`.
    pub async fn update(&self, entity: &Entity<'_>, t: i64) -> Result<UpdateOutcome, GraphError> {
        let mut txn = self.store.begin().await?;
        let result = update_in(&mut txn, entity, t).await;
        let outcome = finish(txn, result).await?;
        tracing::trace!(node = %entity.node_ref(), ?outcome, t, "Entity updated");
        Ok(outcome)
    }

    /// Make the open `child_set` edges of `parent` exactly `children` as of `t`.
    pub async fn update_children(
        &self,
        parent: &Entity<'_>,
        child_set: &str,
        children: &[Entity<'_>],
        t: i64,
    ) -> Result<ChildChanges, GraphError> {
        let model = parent.model();
        let def = model.child(child_set).ok_or_else(|| LookupError::ChildNotFound {
            model: model.label().to_string(),
            child: child_set.to_string(),
        })?;
        let child_model = self.registry.model(&def.label)?;
        let child_property = child_model.identity_property();
        let edges = ChildEdges {
            parent: parent.node_ref(),
            reltype: def.reltype.clone(),
            child_label: def.label.clone(),
            child_property: child_property.to_string(),
        };
        let child_kind = child_model
            .property(child_property)
            .map(|p| p.kind)
            .unwrap_or_default();
        let observed: BTreeSet<PropertyValue> =
            children.iter().map(|c| c.identity().clone()).collect();

        let mut txn = self.store.begin().await?;
        let result = reconcile(&mut txn, edges, child_kind, &observed, t).await;
        let changes = finish(txn, result).await?;
        tracing::trace!(
            parent = %parent.node_ref(),
            child_set,
            opened = changes.opened.len(),
            closed = changes.closed.len(),
            unchanged = changes.unchanged,
            "Children reconciled"
        );
        Ok(changes)
    }

    /// Overwrite unversioned properties on a stored node.
    ///
    /// For bookkeeping that must not open a new state interval. The names
    /// must be declared static on the model.
    pub async fn annotate(
        &self,
        label: &str,
        identity: impl Into<PropertyValue>,
        properties: PropertyMap,
    ) -> Result<(), GraphError> {
        let model = self.registry.model(label)?;
        let find = FindNode::new(model, identity.into());
        let mut txn = self.store.begin().await?;
        let result = annotate_in(&mut txn, find, properties).await;
        finish(txn, result).await
    }

    /// Start of the most recent state interval of an entity.
    pub async fn last_update(
        &self,
        label: &str,
        identity: impl Into<PropertyValue>,
    ) -> Result<Option<i64>, GraphError> {
        let model = self.registry.model(label)?;
        if !model.has_state() {
            return Ok(None);
        }
        let query = LastStateChange {
            node: NodeRef::new(label, model.identity_property(), identity.into()),
            state_label: model.state_label().to_string(),
        };
        let mut txn = self.store.begin().await?;
        let result = txn.last_state_change(&query).await;
        finish(txn, result).await
    }
}

async fn find_in<T: StoreTxn>(
    txn: &mut T,
    model: &Model,
    identity: &PropertyValue,
) -> Result<Option<StoredEntity>, GraphError> {
    let Some(properties) = txn.find_node(&FindNode::new(model, identity.clone())).await? else {
        return Ok(None);
    };
    let state = if model.has_state() {
        txn.open_state(&OpenState::new(model, identity.clone())).await?
    } else {
        None
    };
    Ok(Some(StoredEntity {
        label: model.label().to_string(),
        identity: identity.clone(),
        properties,
        state,
    }))
}

async fn annotate_in<T: StoreTxn>(
    txn: &mut T,
    find: FindNode,
    properties: PropertyMap,
) -> Result<(), GraphError> {
    if txn.find_node(&find).await?.is_none() {
        return Err(GraphError::NotFound {
            label: find.node.label,
            identity: find.node.value.to_string(),
        });
    }
    txn.set_properties(&SetProperties {
        node: find.node,
        properties,
    })
    .await
}

async fn update_in<T: StoreTxn>(
    txn: &mut T,
    entity: &Entity<'_>,
    t: i64,
) -> Result<UpdateOutcome, GraphError> {
    let model = entity.model();
    let node = entity.node_ref();

    let Some(stored) = find_in(txn, model, entity.identity()).await? else {
        let mut properties = entity.statics().clone();
        properties.insert(node.property.clone(), node.value.clone());
        txn.create_node(&CreateNode::new(model, node.value.clone(), properties))
            .await?;
        if model.has_state() {
            txn.create_state(&CreateState {
                node,
                state_label: model.state_label().to_string(),
                properties: entity.state().clone(),
                t,
            })
            .await?;
        }
        return Ok(UpdateOutcome::Created);
    };

    for (name, value) in entity.statics() {
        match stored.properties.get(name) {
            Some(existing) if existing != value => {
                tracing::warn!(
                    %node,
                    property = %name,
                    stored = %existing,
                    observed = %value,
                    "Ignoring conflicting static property"
                );
            }
            _ => {}
        }
    }

    if !model.has_state() {
        return Ok(UpdateOutcome::Unchanged);
    }

    if stored.state.as_ref() == Some(entity.state()) {
        return Ok(UpdateOutcome::Unchanged);
    }

    let state_label = model.state_label().to_string();
    if stored.state.is_some() {
        txn.close_state(&CloseState {
            node: node.clone(),
            state_label: state_label.clone(),
            t,
        })
        .await?;
    }
    txn.create_state(&CreateState {
        node,
        state_label,
        properties: entity.state().clone(),
        t,
    })
    .await?;
    Ok(UpdateOutcome::StateChanged)
}

async fn reconcile<T: StoreTxn>(
    txn: &mut T,
    edges: ChildEdges,
    child_kind: strata_core::PropertyKind,
    observed: &BTreeSet<PropertyValue>,
    t: i64,
) -> Result<ChildChanges, GraphError> {
    let open: BTreeSet<PropertyValue> = txn
        .open_children(&OpenChildren {
            edges: edges.clone(),
            child_kind,
        })
        .await?
        .into_iter()
        .collect();

    let closed: Vec<PropertyValue> = open.difference(observed).cloned().collect();
    let opened: Vec<PropertyValue> = observed.difference(&open).cloned().collect();
    let unchanged = open.intersection(observed).count();

    if !closed.is_empty() {
        txn.close_children(&CloseChildren {
            edges: edges.clone(),
            children: closed.clone(),
            t,
        })
        .await?;
    }
    if !opened.is_empty() {
        let linked: BTreeSet<PropertyValue> = txn
            .link_children(&LinkChildren {
                edges: edges.clone(),
                child_kind,
                children: opened.clone(),
                t,
            })
            .await?
            .into_iter()
            .collect();
        if let Some(missing) = opened.iter().find(|c| !linked.contains(*c)) {
            return Err(GraphError::NotFound {
                label: edges.child_label,
                identity: missing.to_string(),
            });
        }
    }

    Ok(ChildChanges {
        opened,
        closed,
        unchanged,
    })
}
