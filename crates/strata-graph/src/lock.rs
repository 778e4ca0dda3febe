//! Single-writer locking per environment.
//!
//! A lock is an `EnvironmentLock` node whose `locked` property is `0` when
//! free and the acquisition key (a millisecond timestamp) while held. Every
//! transition happens in one transaction.

use std::future::Future;

use strata_core::{now_ms, Model, PropertyMap, PropertyValue, Registry};

use crate::client::GraphError;
use crate::query::{CreateNode, FindNode, SetProperties};
use crate::store::{finish, GraphStore, StoreTxn};

const LOCK_LABEL: &str = "EnvironmentLock";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Environment {uuid} is already locked with key {key}")]
    Held { uuid: String, key: i64 },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The environment a lock guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRef {
    pub uuid: String,
    pub account_number: String,
    pub name: String,
}

impl std::fmt::Display for EnvironmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.uuid, self.account_number, self.name)
    }
}

/// Lock handle for one environment. Remembers the key it acquired.
pub struct EnvironmentLock<S> {
    store: S,
    model: Model,
    env: EnvironmentRef,
    key: i64,
}

fn lock_key() -> i64 {
    now_ms().max(1)
}

fn locked_value(props: &PropertyMap) -> i64 {
    props.get("locked").and_then(PropertyValue::as_i64).unwrap_or(0)
}

impl<S: GraphStore> EnvironmentLock<S> {
    pub fn new(store: S, registry: &Registry, env: EnvironmentRef) -> Result<Self, GraphError> {
        Ok(Self {
            store,
            model: registry.model(LOCK_LABEL)?.clone(),
            env,
            key: 0,
        })
    }

    pub fn environment(&self) -> &EnvironmentRef {
        &self.env
    }

    /// Key held by this handle, `0` when not holding the lock.
    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn is_locked(&self) -> bool {
        self.key != 0
    }

    fn find(&self) -> FindNode {
        FindNode::new(&self.model, self.env.uuid.as_str().into()).for_update()
    }

    fn set_locked(&self, value: i64) -> SetProperties {
        let find = self.find();
        SetProperties {
            node: find.node,
            properties: [("locked".to_string(), PropertyValue::Int(value))]
                .into_iter()
                .collect(),
        }
    }

    /// Acquire the lock and return its key. Fails immediately when held.
    pub async fn lock(&mut self) -> Result<i64, LockError> {
        let key = lock_key();
        let mut txn = self.store.begin().await?;
        let result = self.acquire(&mut txn, key).await;
        finish(txn, result).await?;
        self.key = key;
        tracing::debug!(env = %self.env, key, "Obtained lock");
        Ok(key)
    }

    async fn acquire(&self, txn: &mut S::Txn, key: i64) -> Result<(), LockError> {
        let find = self.find();
        let stored = match txn.find_node(&find).await? {
            Some(props) => props,
            // MERGE hands back the winner's node if another first
            // acquisition got there between the two statements.
            None => {
                let properties: PropertyMap = [
                    ("uuid", PropertyValue::from(self.env.uuid.as_str())),
                    ("account_number", self.env.account_number.as_str().into()),
                    ("name", self.env.name.as_str().into()),
                    ("locked", key.into()),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
                txn.create_node(&CreateNode::new(&self.model, find.node.value, properties))
                    .await?
            }
        };
        match locked_value(&stored) {
            held if held == key => Ok(()),
            0 => Ok(txn.set_properties(&self.set_locked(key)).await?),
            held => Err(LockError::Held {
                uuid: self.env.uuid.clone(),
                key: held,
            }),
        }
    }

    /// Release with an explicit key.
    ///
    /// `true` when the lock is now free because of this call or was never
    /// held. `false` when another key holds it; nothing changes then.
    pub async fn release_key(&self, key: i64) -> Result<bool, GraphError> {
        let mut txn = self.store.begin().await?;
        let result = self.try_release(&mut txn, key).await;
        let released = finish(txn, result).await?;
        if !released {
            tracing::warn!(env = %self.env, key, "Unable to release lock");
        }
        Ok(released)
    }

    async fn try_release(&self, txn: &mut S::Txn, key: i64) -> Result<bool, GraphError> {
        let Some(props) = txn.find_node(&self.find()).await? else {
            return Ok(true);
        };
        match locked_value(&props) {
            0 => Ok(true),
            held if held == key => {
                txn.set_properties(&self.set_locked(0)).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Release the key this handle acquired. A no-op when not holding it.
    pub async fn release(&mut self) -> Result<bool, GraphError> {
        if self.key == 0 {
            return Ok(true);
        }
        let released = self.release_key(self.key).await?;
        if released {
            tracing::debug!(env = %self.env, "Released lock");
            self.key = 0;
        }
        Ok(released)
    }
}

/// Run `f` while holding the lock on `env`.
///
/// The lock is released on every exit path once acquired. Release failures
/// are logged and never replace the result of `f`.
pub async fn with_lock<S, F, Fut, T, E>(
    store: S,
    registry: &Registry,
    env: EnvironmentRef,
    f: F,
) -> Result<T, E>
where
    S: GraphStore,
    F: FnOnce(i64) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let mut lock = EnvironmentLock::new(store, registry, env).map_err(LockError::from)?;
    let key = lock.lock().await?;
    let result = f(key).await;
    if let Err(e) = lock.release().await {
        tracing::warn!(env = %lock.environment(), key, error = %e, "Lock release failed");
    }
    result
}
