//! `GraphStore` over Neo4j.

use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, Node, Query, Row as BoltRow};
use strata_core::{PropertyKind, PropertyMap, PropertyValue};

use crate::client::{GraphClient, GraphError};
use crate::query::diff::{paged, Select};
use crate::query::{
    CloseChildren, CloseState, Columns, CreateNode, CreateState, Cypher, DeleteBatch,
    DiffSideQuery, DiffStateQuery, FindNode, LastStateChange, LinkChildren, NodeAtTime,
    OpenChildren, OpenState, Param, Params, SetProperties,
};
use crate::store::{GraphStore, Row, StoreTxn};

fn bolt(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::Null => BoltType::Null(BoltNull),
        PropertyValue::Str(s) => s.clone().into(),
        PropertyValue::Int(i) => (*i).into(),
        PropertyValue::Float(f) => (*f).into(),
        PropertyValue::Bool(b) => (*b).into(),
    }
}

/// Bind rendered text and parameters into a neo4rs query.
pub(crate) fn to_query(text: &str, params: Params) -> Query {
    params.into_iter().fold(query(text), |q, (name, param)| match param {
        Param::Value(v) => q.param(&name, bolt(&v)),
        Param::List(values) => q.param(&name, values.iter().map(bolt).collect::<Vec<_>>()),
    })
}

fn cypher_query(builder: &impl Cypher) -> Query {
    to_query(&builder.cypher(), builder.params())
}

fn read_node(node: &Node, name: &str, kind: PropertyKind) -> Option<PropertyValue> {
    let typed = match kind {
        PropertyKind::Str => node.get::<String>(name).ok().map(PropertyValue::Str),
        PropertyKind::Int => node.get::<i64>(name).ok().map(PropertyValue::Int),
        PropertyKind::Float => node.get::<f64>(name).ok().map(PropertyValue::Float),
        PropertyKind::Bool => node.get::<bool>(name).ok().map(PropertyValue::Bool),
    };
    // Values written before a type change may be stored under another kind.
    typed
        .or_else(|| node.get::<String>(name).ok().map(PropertyValue::Str))
        .or_else(|| node.get::<i64>(name).ok().map(PropertyValue::Int))
        .or_else(|| node.get::<f64>(name).ok().map(PropertyValue::Float))
        .or_else(|| node.get::<bool>(name).ok().map(PropertyValue::Bool))
}

fn node_properties(node: &Node, columns: &Columns, into: &mut PropertyMap) {
    for (name, kind) in columns {
        if let Some(value) = read_node(node, name, *kind) {
            into.insert(name.clone(), value);
        }
    }
}

fn read_column(row: &BoltRow, column: &str, kind: PropertyKind) -> PropertyValue {
    let typed = match kind {
        PropertyKind::Str => row.get::<String>(column).ok().map(PropertyValue::Str),
        PropertyKind::Int => row.get::<i64>(column).ok().map(PropertyValue::Int),
        PropertyKind::Float => row.get::<f64>(column).ok().map(PropertyValue::Float),
        PropertyKind::Bool => row.get::<bool>(column).ok().map(PropertyValue::Bool),
    };
    typed
        .or_else(|| row.get::<String>(column).ok().map(PropertyValue::Str))
        .or_else(|| row.get::<i64>(column).ok().map(PropertyValue::Int))
        .unwrap_or_default()
}

fn select_row(row: &BoltRow, selects: &[Select]) -> Row {
    selects
        .iter()
        .map(|s| read_column(row, &s.to_string(), s.kind))
        .collect()
}

fn get_node(row: &BoltRow, column: &str) -> Result<Node, GraphError> {
    row.get::<Node>(column)
        .map_err(|e| GraphError::Serialization(format!("Failed to deserialize node: {e}")))
}

#[async_trait]
impl GraphStore for GraphClient {
    type Txn = Neo4jTxn;

    async fn begin(&self) -> Result<Neo4jTxn, GraphError> {
        Ok(Neo4jTxn {
            txn: self.start_txn().await?,
        })
    }

    async fn side_rows(
        &self,
        q: &DiffSideQuery,
        page: usize,
        size: usize,
    ) -> Result<Vec<Row>, GraphError> {
        let rows = self
            .query_rows(to_query(&paged(&q.cypher(), page, size), q.params()))
            .await?;
        Ok(rows.iter().map(|r| select_row(r, q.selects())).collect())
    }

    async fn state_rows(
        &self,
        q: &DiffStateQuery,
        page: usize,
        size: usize,
    ) -> Result<Vec<Row>, GraphError> {
        let rows = self
            .query_rows(to_query(&paged(&q.cypher(), page, size), q.params()))
            .await?;
        Ok(rows.iter().map(|r| select_row(r, q.selects())).collect())
    }

    async fn node_at(&self, q: &NodeAtTime) -> Result<Option<PropertyMap>, GraphError> {
        let Some(row) = self.query_one(cypher_query(q)).await? else {
            return Ok(None);
        };
        let mut props = PropertyMap::new();
        node_properties(&get_node(&row, "n")?, &q.node_columns, &mut props);
        if q.state_label.is_some() {
            node_properties(&get_node(&row, "ns")?, &q.state_columns, &mut props);
        }
        Ok(Some(props))
    }

    async fn delete_batch(&self, q: &DeleteBatch) -> Result<u64, GraphError> {
        let mut txn = self.start_txn().await?;
        let mut stream = txn.execute(cypher_query(q)).await?;
        let deleted = match stream.next(txn.handle()).await? {
            Some(row) => row.get::<i64>("deleted").unwrap_or(0),
            None => 0,
        };
        txn.commit().await?;
        Ok(u64::try_from(deleted).unwrap_or(0))
    }
}

/// A neo4rs transaction.
pub struct Neo4jTxn {
    txn: neo4rs::Txn,
}

impl Neo4jTxn {
    async fn rows(&mut self, q: Query) -> Result<Vec<BoltRow>, GraphError> {
        let mut stream = self.txn.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn first(&mut self, q: Query) -> Result<Option<BoltRow>, GraphError> {
        Ok(self.rows(q).await?.into_iter().next())
    }

    async fn write(&mut self, builder: &impl Cypher) -> Result<(), GraphError> {
        self.txn.run(cypher_query(builder)).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTxn for Neo4jTxn {
    async fn find_node(&mut self, q: &FindNode) -> Result<Option<PropertyMap>, GraphError> {
        let Some(row) = self.first(cypher_query(q)).await? else {
            return Ok(None);
        };
        let mut props = PropertyMap::new();
        node_properties(&get_node(&row, "n")?, &q.columns, &mut props);
        Ok(Some(props))
    }

    async fn create_node(&mut self, q: &CreateNode) -> Result<PropertyMap, GraphError> {
        let row = self.first(cypher_query(q)).await?.ok_or_else(|| GraphError::NotFound {
            label: q.node.label.clone(),
            identity: q.node.value.to_string(),
        })?;
        let mut props = PropertyMap::new();
        node_properties(&get_node(&row, "n")?, &q.columns, &mut props);
        Ok(props)
    }

    async fn set_properties(&mut self, q: &SetProperties) -> Result<(), GraphError> {
        self.write(q).await
    }

    async fn open_state(&mut self, q: &OpenState) -> Result<Option<PropertyMap>, GraphError> {
        let Some(row) = self.first(cypher_query(q)).await? else {
            return Ok(None);
        };
        let mut props = PropertyMap::new();
        node_properties(&get_node(&row, "s")?, &q.columns, &mut props);
        Ok(Some(props))
    }

    async fn close_state(&mut self, q: &CloseState) -> Result<(), GraphError> {
        self.write(q).await
    }

    async fn create_state(&mut self, q: &CreateState) -> Result<(), GraphError> {
        self.write(q).await
    }

    async fn last_state_change(&mut self, q: &LastStateChange) -> Result<Option<i64>, GraphError> {
        Ok(self
            .first(cypher_query(q))
            .await?
            .and_then(|row| row.get::<Option<i64>>("last_update").ok().flatten()))
    }

    async fn open_children(&mut self, q: &OpenChildren) -> Result<Vec<PropertyValue>, GraphError> {
        let rows = self.rows(cypher_query(q)).await?;
        Ok(rows
            .iter()
            .map(|r| read_column(r, "child", q.child_kind))
            .collect())
    }

    async fn close_children(&mut self, q: &CloseChildren) -> Result<(), GraphError> {
        self.write(q).await
    }

    async fn link_children(&mut self, q: &LinkChildren) -> Result<Vec<PropertyValue>, GraphError> {
        let rows = self.rows(cypher_query(q)).await?;
        Ok(rows
            .iter()
            .map(|r| read_column(r, "child", q.child_kind))
            .collect())
    }

    async fn commit(self) -> Result<(), GraphError> {
        Ok(self.txn.commit().await?)
    }

    async fn rollback(self) -> Result<(), GraphError> {
        Ok(self.txn.rollback().await?)
    }
}
