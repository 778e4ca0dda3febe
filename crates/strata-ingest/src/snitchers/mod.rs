//! Extraction modules. Each reads its slice of a run and writes it to the
//! graph, stamped with the run's completion time.

pub mod apt;
pub mod configfile;
pub mod configured_interface;
pub mod environment;
pub mod git;
pub mod host;
pub mod kernel_module;
pub mod pip;
pub mod uservars;

use serde::Serialize;
use serde_json::Value;
use strata_core::Model;
use strata_graph::{EntityBuilder, GraphStore};

use crate::error::Result;
use crate::run::SyncContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Snitcher {
    Environment,
    Host,
    Apt,
    Pip,
    Configfile,
    ConfiguredInterface,
    KernelModule,
    Git,
    Uservars,
}

impl Snitcher {
    /// Run order. Hosts must exist before anything that hangs off them.
    pub const ORDER: [Snitcher; 9] = [
        Snitcher::Environment,
        Snitcher::Host,
        Snitcher::Apt,
        Snitcher::Pip,
        Snitcher::Configfile,
        Snitcher::ConfiguredInterface,
        Snitcher::KernelModule,
        Snitcher::Git,
        Snitcher::Uservars,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Host => "host",
            Self::Apt => "apt",
            Self::Pip => "pip",
            Self::Configfile => "configfile",
            Self::ConfiguredInterface => "configured_interface",
            Self::KernelModule => "kernel_module",
            Self::Git => "git",
            Self::Uservars => "uservars",
        }
    }

    /// Apply this module's documents. Returns the number of entities written.
    pub async fn snitch<S: GraphStore>(self, ctx: &SyncContext<'_, S>) -> Result<usize> {
        match self {
            Self::Environment => environment::snitch(ctx).await,
            Self::Host => host::snitch(ctx).await,
            Self::Apt => apt::snitch(ctx).await,
            Self::Pip => pip::snitch(ctx).await,
            Self::Configfile => configfile::snitch(ctx).await,
            Self::ConfiguredInterface => configured_interface::snitch(ctx).await,
            Self::KernelModule => kernel_module::snitch(ctx).await,
            Self::Git => git::snitch(ctx).await,
            Self::Uservars => uservars::snitch(ctx).await,
        }
    }
}

/// Copy the non-identity properties `model` declares from a JSON object.
pub(crate) fn declared<'m>(mut builder: EntityBuilder<'m>, model: &Model, doc: &Value) -> EntityBuilder<'m> {
    let Some(fields) = doc.as_object() else {
        return builder;
    };
    for (name, value) in fields {
        if model.property(name).is_some_and(|p| !p.is_identity) {
            builder = builder.set_json(name, Some(value));
        }
    }
    builder
}

/// Walk nested objects by key.
pub(crate) fn lookup<'v>(doc: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(doc, |v, key| v.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{catalog, PropertyValue};
    use strata_graph::Entity;

    #[test]
    fn order_is_fixed() {
        let names: Vec<_> = Snitcher::ORDER.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "environment",
                "host",
                "apt",
                "pip",
                "configfile",
                "configured_interface",
                "kernel_module",
                "git",
                "uservars",
            ]
        );
    }

    #[test]
    fn declared_skips_unknown_and_identity() {
        let registry = catalog::registry().unwrap();
        let model = registry.model("ConfiguredInterface").unwrap();
        let doc = json!({
            "mtu": "9000",
            "bogus": 1,
            "device_host": "nope",
            "address": "10.0.0.2",
        });
        let entity = declared(Entity::builder(model), model, &doc)
            .set("device", "br-mgmt")
            .set("host", "h1_e1")
            .build()
            .unwrap();
        assert_eq!(entity.identity(), &PropertyValue::from("br-mgmt_h1_e1"));
        assert_eq!(entity.get("mtu"), Some(&PropertyValue::Int(9000)));
        assert_eq!(entity.get("address"), Some(&PropertyValue::from("10.0.0.2")));
        assert_eq!(entity.get("bogus"), None);
    }

    #[test]
    fn lookup_nested() {
        let doc = json!({"ansible_lsb": {"codename": "jammy"}});
        assert_eq!(lookup(&doc, &["ansible_lsb", "codename"]), Some(&json!("jammy")));
        assert_eq!(lookup(&doc, &["ansible_lsb", "id"]), None);
        assert_eq!(lookup(&doc, &["missing", "id"]), None);
    }
}
