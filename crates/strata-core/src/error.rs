use thiserror::Error;

use crate::value::PropertyKind;

/// Invalid model definition. Raised while the registry is being built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Model {label} declares no identity property")]
    MissingIdentity { label: String },

    #[error("Model {label} declares multiple identity properties: {properties:?}")]
    MultipleIdentity {
        label: String,
        properties: Vec<String>,
    },

    #[error("Property {property} on model {label} combines identity, static, and state flags")]
    ConflictingFlags { label: String, property: String },

    #[error("Cannot create property {property} as it already exists on model {label}")]
    DuplicateProperty { label: String, property: String },

    #[error("Concat property {property} on model {label} references unknown property {component}")]
    UnknownConcatProperty {
        label: String,
        property: String,
        component: String,
    },

    #[error("Model {0} is already registered")]
    DuplicateModel(String),

    #[error("Child set {child} on model {label} references unknown model {target}")]
    UnknownChildModel {
        label: String,
        child: String,
        target: String,
    },
}

/// Unknown model, property, or environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Property '{property}' not found on model '{model}'")]
    PropertyNotFound { model: String, property: String },

    #[error("Child set '{child}' not found on model '{model}'")]
    ChildNotFound { model: String, child: String },

    #[error("Unable to locate environment with uuid '{0}'")]
    EnvironmentNotFound(String),
}

/// A value could not be coerced to the declared property type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unable to convert value '{value}' to '{kind}'")]
pub struct ConversionError {
    pub value: String,
    pub kind: PropertyKind,
}

/// Top-level error type for Strata.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
