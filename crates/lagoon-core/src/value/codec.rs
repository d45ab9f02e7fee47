use crate::{
    key::KeyError,
    schema::attribute::{AttributeDescriptor, LogicalType},
    value::{
        Value,
        wire::{WireValue, format_f64},
    },
};
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error as ThisError;

///
/// CodecError
///
/// Raised when a native value cannot cross the wire boundary for its
/// declared logical type, or when a stored wire value cannot be read
/// back. Recoverable; surfaced at assignment/encode time.
///

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("attribute '{attribute}' ({expected}): cannot encode {found} value")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },

    #[error("attribute '{attribute}': stored wire value has unexpected kind")]
    WireMismatch { attribute: String },

    #[error("attribute '{attribute}': malformed stored number '{text}'")]
    MalformedNumber { attribute: String, text: String },

    #[error("attribute '{attribute}': malformed stored timestamp '{text}'")]
    MalformedTimestamp { attribute: String, text: String },

    #[error("attribute '{attribute}': stored blob is not valid JSON: {reason}")]
    MalformedJson { attribute: String, reason: String },

    #[error("attribute '{attribute}': referenced entity has no usable key")]
    ReferenceKey {
        attribute: String,
        #[source]
        source: Box<KeyError>,
    },
}

impl CodecError {
    fn mismatch(desc: &AttributeDescriptor, value: &Value) -> Self {
        Self::TypeMismatch {
            attribute: desc.name.clone(),
            expected: desc.logical_type.to_string(),
            found: value.kind().to_string(),
        }
    }
}

/// Encode one native value into its wire form. `Ok(None)` means the
/// attribute is omitted from the persisted item entirely.
pub fn encode(desc: &AttributeDescriptor, value: &Value) -> Result<Option<WireValue>, CodecError> {
    match &desc.logical_type {
        LogicalType::String => encode_string(desc, value),
        LogicalType::Integer => encode_integer(desc, value),
        LogicalType::Float => encode_float(desc, value),
        LogicalType::Boolean => encode_boolean(desc, value),
        LogicalType::DateTime => Ok(encode_datetime(value)),
        LogicalType::Serialized => encode_serialized(desc, value),
        LogicalType::Reference => encode_reference(desc, value),
        LogicalType::SetOf(inner) => encode_set_of(desc, inner, value),
    }
}

/// Decode a stored wire value (or its absence) back to a native value.
pub fn decode(desc: &AttributeDescriptor, wire: Option<&WireValue>) -> Result<Value, CodecError> {
    match &desc.logical_type {
        LogicalType::String => decode_string(desc, wire),
        LogicalType::Integer => decode_integer(desc, wire),
        LogicalType::Float => decode_float(desc, wire),
        LogicalType::Boolean => Ok(decode_boolean(wire)),
        LogicalType::DateTime => decode_datetime(desc, wire),
        LogicalType::Serialized => decode_serialized(desc, wire),
        LogicalType::Reference => decode_reference(desc, wire),
        LogicalType::SetOf(inner) => decode_set_of(desc, inner, wire),
    }
}

// ---------------------------------------------------------------------
// string
// ---------------------------------------------------------------------

// Lossy by design: nil, "" and the empty collection all encode to
// omitted, so they are indistinguishable after a round trip.
fn encode_string(
    desc: &AttributeDescriptor,
    value: &Value,
) -> Result<Option<WireValue>, CodecError> {
    if value.is_blank() {
        return Ok(None);
    }
    match value {
        Value::Set(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_text(desc, item)?);
            }
            Ok(Some(WireValue::StrSet(out)))
        }
        other => Ok(Some(WireValue::Str(render_text(desc, other)?))),
    }
}

fn render_text(desc: &AttributeDescriptor, value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(n) => Ok(format_f64(*n)),
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::DateTime(t) => Ok(t.to_rfc3339()),
        _ => Err(CodecError::mismatch(desc, value)),
    }
}

fn decode_string(desc: &AttributeDescriptor, wire: Option<&WireValue>) -> Result<Value, CodecError> {
    match wire {
        None => Ok(Value::Text(String::new())),
        Some(WireValue::Str(s)) => Ok(Value::Text(s.clone())),
        Some(WireValue::StrSet(items)) => Ok(Value::Set(
            items.iter().map(|s| Value::Text(s.clone())).collect(),
        )),
        Some(_) => Err(CodecError::WireMismatch {
            attribute: desc.name.clone(),
        }),
    }
}

// ---------------------------------------------------------------------
// integer / float
// ---------------------------------------------------------------------

fn encode_integer(
    desc: &AttributeDescriptor,
    value: &Value,
) -> Result<Option<WireValue>, CodecError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Text(s) if s.trim().is_empty() => Ok(None),
        Value::Set(items) => {
            if items.is_empty() {
                return Ok(None);
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(coerce_i64(desc, item)?.to_string());
            }
            Ok(Some(WireValue::NumSet(out)))
        }
        other => Ok(Some(WireValue::num_from_i64(coerce_i64(desc, other)?))),
    }
}

fn coerce_i64(desc: &AttributeDescriptor, value: &Value) -> Result<i64, CodecError> {
    match value {
        Value::Int(n) => Ok(*n),
        // Numeric truncation is part of the documented normalization.
        Value::Float(n) => Ok(n.trunc() as i64),
        Value::Text(s) => Ok(parse_int_prefix(s)),
        Value::DateTime(t) => Ok(t.timestamp()),
        _ => Err(CodecError::mismatch(desc, value)),
    }
}

fn encode_float(
    desc: &AttributeDescriptor,
    value: &Value,
) -> Result<Option<WireValue>, CodecError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Text(s) if s.trim().is_empty() => Ok(None),
        Value::Set(items) => {
            if items.is_empty() {
                return Ok(None);
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(format_f64(coerce_f64(desc, item)?));
            }
            Ok(Some(WireValue::NumSet(out)))
        }
        other => Ok(Some(WireValue::num_from_f64(coerce_f64(desc, other)?))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn coerce_f64(desc: &AttributeDescriptor, value: &Value) -> Result<f64, CodecError> {
    match value {
        Value::Float(n) => Ok(*n),
        Value::Int(n) => Ok(*n as f64),
        Value::Text(s) => Ok(parse_float_prefix(s)),
        Value::DateTime(t) => Ok(t.timestamp() as f64),
        _ => Err(CodecError::mismatch(desc, value)),
    }
}

fn decode_integer(
    desc: &AttributeDescriptor,
    wire: Option<&WireValue>,
) -> Result<Value, CodecError> {
    match wire {
        None => Ok(Value::Null),
        Some(WireValue::Num(s)) => decode_stored_i64(desc, s).map(Value::Int),
        Some(WireValue::NumSet(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for s in items {
                out.push(Value::Int(decode_stored_i64(desc, s)?));
            }
            Ok(Value::Set(out))
        }
        Some(_) => Err(CodecError::WireMismatch {
            attribute: desc.name.clone(),
        }),
    }
}

fn decode_stored_i64(desc: &AttributeDescriptor, s: &str) -> Result<i64, CodecError> {
    if let Ok(n) = s.parse::<i64>() {
        return Ok(n);
    }
    s.parse::<f64>()
        .map(|f| f.trunc() as i64)
        .map_err(|_| CodecError::MalformedNumber {
            attribute: desc.name.clone(),
            text: s.to_string(),
        })
}

fn decode_float(desc: &AttributeDescriptor, wire: Option<&WireValue>) -> Result<Value, CodecError> {
    match wire {
        None => Ok(Value::Null),
        Some(WireValue::Num(s)) => decode_stored_f64(desc, s).map(Value::Float),
        Some(WireValue::NumSet(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for s in items {
                out.push(Value::Float(decode_stored_f64(desc, s)?));
            }
            Ok(Value::Set(out))
        }
        Some(_) => Err(CodecError::WireMismatch {
            attribute: desc.name.clone(),
        }),
    }
}

fn decode_stored_f64(desc: &AttributeDescriptor, s: &str) -> Result<f64, CodecError> {
    s.parse::<f64>().map_err(|_| CodecError::MalformedNumber {
        attribute: desc.name.clone(),
        text: s.to_string(),
    })
}

// ---------------------------------------------------------------------
// boolean
// ---------------------------------------------------------------------

fn encode_boolean(
    desc: &AttributeDescriptor,
    value: &Value,
) -> Result<Option<WireValue>, CodecError> {
    let truthy = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => *b,
        Value::Text(s) => s == "true",
        other => return Err(CodecError::mismatch(desc, other)),
    };
    let token = if truthy { "true" } else { "false" };
    Ok(Some(WireValue::Str(token.to_string())))
}

// Anything but the literal "true" token decodes false.
fn decode_boolean(wire: Option<&WireValue>) -> Value {
    match wire {
        None => Value::Null,
        Some(WireValue::Str(s)) => Value::Bool(s == "true"),
        Some(_) => Value::Bool(false),
    }
}

// ---------------------------------------------------------------------
// datetime
// ---------------------------------------------------------------------

// Non-time input stores nil rather than raising. Intentional; see
// DESIGN.md before changing this.
fn encode_datetime(value: &Value) -> Option<WireValue> {
    match value {
        Value::DateTime(t) => Some(WireValue::num_from_i64(t.timestamp())),
        _ => None,
    }
}

fn decode_datetime(
    desc: &AttributeDescriptor,
    wire: Option<&WireValue>,
) -> Result<Value, CodecError> {
    match wire {
        None => Ok(Value::Null),
        Some(WireValue::Num(s)) => {
            let secs = s.parse::<i64>().map_err(|_| CodecError::MalformedTimestamp {
                attribute: desc.name.clone(),
                text: s.clone(),
            })?;
            utc_from_secs(secs)
                .map(Value::DateTime)
                .ok_or_else(|| CodecError::MalformedTimestamp {
                    attribute: desc.name.clone(),
                    text: s.clone(),
                })
        }
        Some(_) => Err(CodecError::WireMismatch {
            attribute: desc.name.clone(),
        }),
    }
}

fn utc_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ---------------------------------------------------------------------
// serialized blob
// ---------------------------------------------------------------------

fn encode_serialized(
    desc: &AttributeDescriptor,
    value: &Value,
) -> Result<Option<WireValue>, CodecError> {
    match value {
        Value::Null | Value::Blob(serde_json::Value::Null) => Ok(None),
        Value::Blob(json) => {
            let text = serde_json::to_string(json).map_err(|err| CodecError::MalformedJson {
                attribute: desc.name.clone(),
                reason: err.to_string(),
            })?;
            Ok(Some(WireValue::Str(text)))
        }
        other => Err(CodecError::mismatch(desc, other)),
    }
}

fn decode_serialized(
    desc: &AttributeDescriptor,
    wire: Option<&WireValue>,
) -> Result<Value, CodecError> {
    match wire {
        None => Ok(Value::Null),
        Some(WireValue::Str(s)) => serde_json::from_str(s)
            .map(Value::Blob)
            .map_err(|err| CodecError::MalformedJson {
                attribute: desc.name.clone(),
                reason: err.to_string(),
            }),
        Some(_) => Err(CodecError::WireMismatch {
            attribute: desc.name.clone(),
        }),
    }
}

// ---------------------------------------------------------------------
// reference
// ---------------------------------------------------------------------

fn encode_reference(
    desc: &AttributeDescriptor,
    value: &Value,
) -> Result<Option<WireValue>, CodecError> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) if s.is_empty() => Ok(None),
        // A raw key string stores verbatim.
        Value::Text(s) => Ok(Some(WireValue::Str(s.clone()))),
        Value::Reference(r) => {
            // A loaded entity of the wrong type must not store its key.
            if let (Some(target), Some(found)) = (desc.references.as_deref(), r.entity_type_name())
            {
                if found != target {
                    return Err(CodecError::TypeMismatch {
                        attribute: desc.name.clone(),
                        expected: format!("reference to '{target}'"),
                        found: format!("'{found}' entity"),
                    });
                }
            }
            let key = r.key_string().map_err(|source| CodecError::ReferenceKey {
                attribute: desc.name.clone(),
                source: Box::new(source),
            })?;
            Ok(Some(WireValue::Str(key)))
        }
        other => Err(CodecError::mismatch(desc, other)),
    }
}

// Decode yields the raw key string; the referenced entity is fetched
// lazily on first logical access, never at decode time.
fn decode_reference(
    desc: &AttributeDescriptor,
    wire: Option<&WireValue>,
) -> Result<Value, CodecError> {
    match wire {
        None => Ok(Value::Null),
        Some(WireValue::Str(s)) => Ok(Value::Reference(crate::value::Reference::Key(s.clone()))),
        Some(_) => Err(CodecError::WireMismatch {
            attribute: desc.name.clone(),
        }),
    }
}

// ---------------------------------------------------------------------
// set-of(T)
// ---------------------------------------------------------------------

fn encode_set_of(
    desc: &AttributeDescriptor,
    inner: &LogicalType,
    value: &Value,
) -> Result<Option<WireValue>, CodecError> {
    let items = match value {
        Value::Null => return Ok(None),
        Value::Set(items) => items,
        other => return Err(CodecError::mismatch(desc, other)),
    };
    if items.is_empty() {
        return Ok(None);
    }

    match inner {
        LogicalType::String => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_text(desc, item)?);
            }
            Ok(Some(WireValue::StrSet(out)))
        }
        LogicalType::Integer => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(coerce_i64(desc, item)?.to_string());
            }
            Ok(Some(WireValue::NumSet(out)))
        }
        LogicalType::Float => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(format_f64(coerce_f64(desc, item)?));
            }
            Ok(Some(WireValue::NumSet(out)))
        }
        LogicalType::DateTime => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::DateTime(t) => out.push(t.timestamp().to_string()),
                    other => return Err(CodecError::mismatch(desc, other)),
                }
            }
            Ok(Some(WireValue::NumSet(out)))
        }
        // The schema builder rejects other element types.
        other_inner => Err(CodecError::TypeMismatch {
            attribute: desc.name.clone(),
            expected: format!("set-of({other_inner})"),
            found: value.kind().to_string(),
        }),
    }
}

fn decode_set_of(
    desc: &AttributeDescriptor,
    inner: &LogicalType,
    wire: Option<&WireValue>,
) -> Result<Value, CodecError> {
    let Some(wire) = wire else {
        return Ok(Value::Null);
    };
    match (inner, wire) {
        (LogicalType::String, WireValue::StrSet(items)) => Ok(Value::Set(
            items.iter().map(|s| Value::Text(s.clone())).collect(),
        )),
        (LogicalType::Integer, WireValue::NumSet(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for s in items {
                out.push(Value::Int(decode_stored_i64(desc, s)?));
            }
            Ok(Value::Set(out))
        }
        (LogicalType::Float, WireValue::NumSet(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for s in items {
                out.push(Value::Float(decode_stored_f64(desc, s)?));
            }
            Ok(Value::Set(out))
        }
        (LogicalType::DateTime, WireValue::NumSet(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for s in items {
                let secs = s.parse::<i64>().map_err(|_| CodecError::MalformedTimestamp {
                    attribute: desc.name.clone(),
                    text: s.clone(),
                })?;
                let t = utc_from_secs(secs).ok_or_else(|| CodecError::MalformedTimestamp {
                    attribute: desc.name.clone(),
                    text: s.clone(),
                })?;
                out.push(Value::DateTime(t));
            }
            Ok(Value::Set(out))
        }
        _ => Err(CodecError::WireMismatch {
            attribute: desc.name.clone(),
        }),
    }
}

// ---------------------------------------------------------------------
// lenient numeric parsing
// ---------------------------------------------------------------------

/// Parse the leading integer prefix of a string, defaulting to 0.
/// "12abc" is 12, "abc" is 0. This is the coercion the original
/// marshaler applied to numeric-like strings.
fn parse_int_prefix(s: &str) -> i64 {
    let s = s.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return 0;
    }
    s[..end].parse::<i64>().unwrap_or(0)
}

/// Parse the leading float prefix of a string, defaulting to 0.0.
fn parse_float_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Reference;
    use proptest::prelude::*;

    fn desc(name: &str, lt: LogicalType) -> AttributeDescriptor {
        AttributeDescriptor::new(name, lt)
    }

    // The nil/empty collapse is specified behavior and regresses easily;
    // every blank form must omit, and omitted must read back as "".
    #[test]
    fn string_blank_forms_all_omit() {
        let d = desc("token", LogicalType::String);
        assert_eq!(encode(&d, &Value::Null).unwrap(), None);
        assert_eq!(encode(&d, &Value::Text(String::new())).unwrap(), None);
        assert_eq!(encode(&d, &Value::Set(vec![])).unwrap(), None);
        assert_eq!(decode(&d, None).unwrap(), Value::Text(String::new()));
    }

    #[test]
    fn string_round_trips_non_blank() {
        let d = desc("token", LogicalType::String);
        let wire = encode(&d, &Value::Text("hey".into())).unwrap().unwrap();
        assert_eq!(wire, WireValue::Str("hey".into()));
        assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Text("hey".into()));
    }

    #[test]
    fn string_set_round_trips() {
        let d = desc("tags", LogicalType::String);
        let native = Value::Set(vec![Value::Text("a".into()), Value::Text("b".into())]);
        let wire = encode(&d, &native).unwrap().unwrap();
        assert_eq!(wire, WireValue::StrSet(vec!["a".into(), "b".into()]));
        assert_eq!(decode(&d, Some(&wire)).unwrap(), native);
    }

    #[test]
    fn integer_nil_false_blank_all_omit() {
        let d = desc("steps", LogicalType::Integer);
        assert_eq!(encode(&d, &Value::Null).unwrap(), None);
        assert_eq!(encode(&d, &Value::Bool(false)).unwrap(), None);
        assert_eq!(encode(&d, &Value::Text("  ".into())).unwrap(), None);
        assert_eq!(decode(&d, None).unwrap(), Value::Null);
    }

    #[test]
    fn integer_coerces_numeric_like_strings() {
        let d = desc("steps", LogicalType::Integer);
        let wire = encode(&d, &Value::Text("42".into())).unwrap().unwrap();
        assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Int(42));

        let wire = encode(&d, &Value::Text("12abc".into())).unwrap().unwrap();
        assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Int(12));

        let wire = encode(&d, &Value::Text("Edwin".into())).unwrap().unwrap();
        assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Int(0));
    }

    #[test]
    fn integer_truncates_floats() {
        let d = desc("steps", LogicalType::Integer);
        let wire = encode(&d, &Value::Float(3.99)).unwrap().unwrap();
        assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Int(3));
    }

    #[test]
    fn integer_array_coerces_element_wise() {
        let d = desc("steps", LogicalType::Integer);
        let native = Value::Set(vec![Value::Int(1), Value::Text("2".into()), Value::Float(3.7)]);
        let wire = encode(&d, &native).unwrap().unwrap();
        assert_eq!(
            wire,
            WireValue::NumSet(vec!["1".into(), "2".into(), "3".into()])
        );
    }

    #[test]
    fn boolean_uses_literal_tokens() {
        let d = desc("flag", LogicalType::Boolean);
        assert_eq!(
            encode(&d, &Value::Bool(true)).unwrap(),
            Some(WireValue::Str("true".into()))
        );
        assert_eq!(
            encode(&d, &Value::Bool(false)).unwrap(),
            Some(WireValue::Str("false".into()))
        );
        assert_eq!(encode(&d, &Value::Null).unwrap(), None);
    }

    #[test]
    fn boolean_decodes_anything_but_true_as_false() {
        let d = desc("flag", LogicalType::Boolean);
        assert_eq!(
            decode(&d, Some(&WireValue::Str("true".into()))).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decode(&d, Some(&WireValue::Str("yes".into()))).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(decode(&d, None).unwrap(), Value::Null);
    }

    #[test]
    fn datetime_round_trips_at_second_precision() {
        let d = desc("at", LogicalType::DateTime);
        let t = Utc.timestamp_opt(1_378_936_326, 0).single().unwrap();
        let wire = encode(&d, &Value::DateTime(t)).unwrap().unwrap();
        assert_eq!(wire, WireValue::Num("1378936326".into()));
        assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::DateTime(t));
    }

    // Documented original behavior: a non-time value on a datetime
    // attribute stores nil instead of raising.
    #[test]
    fn datetime_non_time_input_stores_nil() {
        let d = desc("at", LogicalType::DateTime);
        assert_eq!(encode(&d, &Value::Text("yesterday".into())).unwrap(), None);
        assert_eq!(encode(&d, &Value::Int(3)).unwrap(), None);
    }

    #[test]
    fn serialized_round_trips_json() {
        let d = desc("payload", LogicalType::Serialized);
        let json: serde_json::Value = serde_json::json!({"a": [1, 2], "b": "x"});
        let wire = encode(&d, &Value::Blob(json.clone())).unwrap().unwrap();
        assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Blob(json));
    }

    #[test]
    fn serialized_nil_round_trips_to_nil() {
        let d = desc("payload", LogicalType::Serialized);
        assert_eq!(encode(&d, &Value::Null).unwrap(), None);
        assert_eq!(decode(&d, None).unwrap(), Value::Null);
    }

    #[test]
    fn reference_key_string_stores_verbatim() {
        let d = desc("order_id", LogicalType::Reference);
        let wire = encode(&d, &Value::Text("abc-123".into())).unwrap().unwrap();
        assert_eq!(wire, WireValue::Str("abc-123".into()));
        assert_eq!(
            decode(&d, Some(&wire)).unwrap(),
            Value::Reference(Reference::Key("abc-123".into()))
        );
    }

    #[test]
    fn reference_rejects_non_reference_values() {
        let d = desc("order_id", LogicalType::Reference);
        let err = encode(&d, &Value::Int(7)).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn reference_rejects_loaded_entity_of_the_wrong_type() {
        use crate::{entity::Entity, schema::EntityType};
        use std::sync::Arc;

        let mut d = desc("order_id", LogicalType::Reference);
        d.references = Some("order".to_string());

        let customer_type = Arc::new(
            EntityType::builder("customer").build().expect("schema"),
        );
        let mut customer = Entity::new(customer_type);
        customer.put_raw("uuid", Value::from("cust-1"));

        let err = encode(&d, &Value::Reference(Reference::from(customer))).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn reference_without_a_usable_key_is_an_error() {
        use crate::{entity::Entity, schema::EntityType};
        use std::sync::Arc;

        let d = desc("order_id", LogicalType::Reference);
        let order_type = Arc::new(EntityType::builder("order").build().expect("schema"));
        // Blank hash key: the reference has nothing to render.
        let order = Entity::new(order_type);

        let err = encode(&d, &Value::Reference(Reference::from(order))).unwrap_err();
        assert!(matches!(err, CodecError::ReferenceKey { .. }));
    }

    #[test]
    fn reference_accepts_loaded_entity_of_the_declared_type() {
        use crate::{entity::Entity, schema::EntityType};
        use std::sync::Arc;

        let mut d = desc("order_id", LogicalType::Reference);
        d.references = Some("order".to_string());

        let order_type = Arc::new(EntityType::builder("order").build().expect("schema"));
        let mut order = Entity::new(order_type);
        order.put_raw("uuid", Value::from("ord-1"));

        let wire = encode(&d, &Value::Reference(Reference::from(order)))
            .unwrap()
            .unwrap();
        assert_eq!(wire, WireValue::Str("ord-1".into()));
    }

    #[test]
    fn set_of_integer_round_trips() {
        let d = desc("steps", LogicalType::SetOf(Box::new(LogicalType::Integer)));
        let native = Value::Set(vec![Value::Int(3), Value::Int(1)]);
        let wire = encode(&d, &native).unwrap().unwrap();
        assert_eq!(decode(&d, Some(&wire)).unwrap(), native);
    }

    #[test]
    fn empty_set_of_omits() {
        let d = desc("steps", LogicalType::SetOf(Box::new(LogicalType::Integer)));
        assert_eq!(encode(&d, &Value::Set(vec![])).unwrap(), None);
        assert_eq!(decode(&d, None).unwrap(), Value::Null);
    }

    proptest! {
        #[test]
        fn integer_round_trip(n in any::<i64>()) {
            let d = desc("n", LogicalType::Integer);
            let wire = encode(&d, &Value::Int(n)).unwrap().unwrap();
            prop_assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Int(n));
        }

        #[test]
        fn float_round_trip(n in proptest::num::f64::NORMAL) {
            let d = desc("n", LogicalType::Float);
            let wire = encode(&d, &Value::Float(n)).unwrap().unwrap();
            prop_assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Float(n));
        }

        #[test]
        fn non_empty_string_round_trip(s in "[a-zA-Z0-9 ]{1,40}") {
            let d = desc("s", LogicalType::String);
            let wire = encode(&d, &Value::Text(s.clone())).unwrap().unwrap();
            prop_assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::Text(s));
        }

        #[test]
        fn datetime_round_trip(secs in 0_i64..4_102_444_800) {
            let d = desc("t", LogicalType::DateTime);
            let t = Utc.timestamp_opt(secs, 0).single().unwrap();
            let wire = encode(&d, &Value::DateTime(t)).unwrap().unwrap();
            prop_assert_eq!(decode(&d, Some(&wire)).unwrap(), Value::DateTime(t));
        }
    }
}
