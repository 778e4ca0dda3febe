//! strata-core: Shared types, schema registry, configuration, and error handling for Strata.
//!
//! This crate provides the foundational pieces used by every Strata component:
//! - Property values and type conversion for entity properties
//! - The schema builder and the immutable [`Registry`] with its path forest
//! - The built-in model catalogue for infrastructure environments
//! - Configuration management
//! - Common error types

pub mod catalog;
pub mod config;
pub mod convert;
pub mod error;
pub mod registry;
pub mod schema;
pub mod time;
pub mod value;

pub use error::{ConversionError, LookupError, SchemaError, StrataError};
pub use registry::{Registry, RegistryBuilder};
pub use schema::{Model, ModelBuilder, PropertyDef};
pub use time::{now_ms, valid_at, EOT};
pub use value::{PropertyKind, PropertyMap, PropertyValue};
