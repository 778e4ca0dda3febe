//! Coercion of observed values to declared property types.

use crate::error::{ConversionError, StrataError};
use crate::registry::Registry;
use crate::value::{PropertyKind, PropertyValue};

const FALSES: [&str; 2] = ["false", "no"];

/// Empty strings, `false`, and `no` (any case) are false; everything else is true.
pub fn string_to_bool(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    !FALSES.iter().any(|f| value.eq_ignore_ascii_case(f))
}

/// Convert `value` to `kind`.
///
/// Null is passed through untouched; the caller decides whether a missing
/// value matters.
pub fn convert(value: &PropertyValue, kind: PropertyKind) -> Result<PropertyValue, ConversionError> {
    if value.is_null() || value.kind() == Some(kind) {
        return Ok(value.clone());
    }

    let converted = match (value, kind) {
        (PropertyValue::Str(s), PropertyKind::Bool) => Some(PropertyValue::Bool(string_to_bool(s))),
        (PropertyValue::Str(s), PropertyKind::Int) => s.trim().parse().ok().map(PropertyValue::Int),
        (PropertyValue::Str(s), PropertyKind::Float) => s.trim().parse().ok().map(PropertyValue::Float),
        (PropertyValue::Int(n), PropertyKind::Float) => Some(PropertyValue::Float(*n as f64)),
        (PropertyValue::Int(n), PropertyKind::Bool) => Some(PropertyValue::Bool(*n != 0)),
        (PropertyValue::Float(x), PropertyKind::Int) if x.is_finite() => {
            Some(PropertyValue::Int(x.trunc() as i64))
        }
        (PropertyValue::Float(x), PropertyKind::Bool) => Some(PropertyValue::Bool(*x != 0.0)),
        (PropertyValue::Bool(b), PropertyKind::Int) => Some(PropertyValue::Int(i64::from(*b))),
        (PropertyValue::Bool(b), PropertyKind::Float) => Some(PropertyValue::Float(f64::from(u8::from(*b)))),
        (other, PropertyKind::Str) => Some(PropertyValue::Str(other.to_string())),
        _ => None,
    };

    converted.ok_or_else(|| ConversionError {
        value: value.to_string(),
        kind,
    })
}

/// Prepare `value` for `model.property`.
///
/// Unknown models and properties are always errors. A value that cannot be
/// converted is an error when `strict` is set and is returned unchanged
/// otherwise.
pub fn prep_val(
    registry: &Registry,
    model: &str,
    property: &str,
    value: &PropertyValue,
    strict: bool,
) -> Result<PropertyValue, StrataError> {
    let kind = registry.property_kind(model, property)?;
    match convert(value, kind) {
        Ok(v) => Ok(v),
        Err(e) if strict => Err(e.into()),
        Err(_) => Ok(value.clone()),
    }
}
