use linked_hash_map::LinkedHashMap;
use reflex_config::Value;
use reflex_error::{Error, Result};

use crate::types::SignalType;

/// Producer and consumer module lists of one signal in one state, in
/// scheduling order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalUsage {
    pub producers: Vec<String>,
    pub consumers: Vec<String>,
}

/// Fully resolved signal description. Immutable after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDescriptor {
    /// `<datasource>.<name>`.
    pub qualified_name: String,
    /// Name inside the DataSource, after alias application.
    pub name: String,
    pub signal_type: SignalType,
    /// 0 = scalar, 1 = vector, 2 = matrix.
    pub num_dimensions: u8,
    pub num_elements: [u32; 3],
    pub num_samples: u32,
    /// Derived: element size × elements × samples.
    pub byte_size: u32,
    /// The `Default` literal as written in the configuration.
    pub default_literal: Option<Value>,
    /// The literal rendered to raw little-endian bytes, one sample's worth
    /// replicated per sample.
    pub default_value: Option<Vec<u8>>,
    /// State name → usage, in state declaration order.
    pub states: LinkedHashMap<String, SignalUsage>,
}

impl SignalDescriptor {
    pub fn total_elements(&self) -> u32 {
        self.num_elements[0] * self.num_elements[1] * self.num_elements[2]
    }

    pub fn usage(&self, state: &str) -> Option<&SignalUsage> {
        self.states.get(state)
    }

    pub fn produced_in(&self, state: &str) -> bool {
        self.states
            .get(state)
            .map(|u| !u.producers.is_empty())
            .unwrap_or(false)
    }

    pub fn consumed_in(&self, state: &str) -> bool {
        self.states
            .get(state)
            .map(|u| !u.consumers.is_empty())
            .unwrap_or(false)
    }
}

fn push_element(ty: &SignalType, value: &Value, out: &mut Vec<u8>, context: &str) -> Result<()> {
    let bad = || {
        Error::initialisation(format!(
            "signal {context}: default element {value:?} does not fit type {ty}"
        ))
    };
    match ty {
        SignalType::Int8 => {
            let v = value.as_i64().ok_or_else(bad)?;
            out.extend_from_slice(&i8::try_from(v).map_err(|_| bad())?.to_le_bytes());
        }
        SignalType::Uint8 => {
            let v = value.as_i64().ok_or_else(bad)?;
            out.extend_from_slice(&u8::try_from(v).map_err(|_| bad())?.to_le_bytes());
        }
        SignalType::Int16 => {
            let v = value.as_i64().ok_or_else(bad)?;
            out.extend_from_slice(&i16::try_from(v).map_err(|_| bad())?.to_le_bytes());
        }
        SignalType::Uint16 => {
            let v = value.as_i64().ok_or_else(bad)?;
            out.extend_from_slice(&u16::try_from(v).map_err(|_| bad())?.to_le_bytes());
        }
        SignalType::Int32 => {
            let v = value.as_i64().ok_or_else(bad)?;
            out.extend_from_slice(&i32::try_from(v).map_err(|_| bad())?.to_le_bytes());
        }
        SignalType::Uint32 => {
            let v = value.as_i64().ok_or_else(bad)?;
            out.extend_from_slice(&u32::try_from(v).map_err(|_| bad())?.to_le_bytes());
        }
        SignalType::Int64 => {
            let v = value.as_i64().ok_or_else(bad)?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        SignalType::Uint64 => {
            let v = value.as_u64().ok_or_else(bad)?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        SignalType::Float32 => {
            let v = value.as_f64().ok_or_else(bad)?;
            out.extend_from_slice(&(v as f32).to_le_bytes());
        }
        SignalType::Float64 => {
            let v = value.as_f64().ok_or_else(bad)?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        SignalType::Composite { .. } => return Err(bad()),
    }
    Ok(())
}

/// Renders a `Default` literal to raw bytes: one sample's worth of elements,
/// replicated `num_samples` times.
pub(crate) fn parse_default(
    literal: &Value,
    ty: &SignalType,
    total_elements: u32,
    num_samples: u32,
    context: &str,
) -> Result<Vec<u8>> {
    if !ty.is_numeric() {
        return Err(Error::initialisation(format!(
            "signal {context}: composite type {ty} cannot carry a default literal"
        )));
    }
    let mut sample = Vec::with_capacity((ty.byte_size() * total_elements) as usize);
    match literal {
        Value::Array(items) => {
            // accept nested arrays for matrix-shaped defaults
            let mut flat = Vec::new();
            flatten(items, &mut flat);
            if flat.len() != total_elements as usize {
                return Err(Error::initialisation(format!(
                    "signal {context}: default has {} elements, geometry requires {total_elements}",
                    flat.len()
                )));
            }
            for item in flat {
                push_element(ty, item, &mut sample, context)?;
            }
        }
        scalar => {
            if total_elements != 1 {
                return Err(Error::initialisation(format!(
                    "signal {context}: scalar default for a geometry of {total_elements} elements"
                )));
            }
            push_element(ty, scalar, &mut sample, context)?;
        }
    }
    let mut bytes = Vec::with_capacity(sample.len() * num_samples as usize);
    for _ in 0..num_samples {
        bytes.extend_from_slice(&sample);
    }
    Ok(bytes)
}

fn flatten<'a>(items: &'a [Value], out: &mut Vec<&'a Value>) {
    for item in items {
        match item {
            Value::Array(inner) => flatten(inner, out),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_default_bytes() {
        let bytes = parse_default(&Value::Int(42), &SignalType::Int32, 1, 1, "t").expect("parse");
        assert_eq!(bytes, 42i32.to_le_bytes());
    }

    #[test]
    fn vector_default_replicated_per_sample() {
        let literal = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        let bytes =
            parse_default(&literal, &SignalType::Uint16, 2, 3, "t").expect("parse");
        assert_eq!(bytes.len(), 2 * 2 * 3);
        assert_eq!(&bytes[0..2], &1u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &2u16.to_le_bytes());
        assert_eq!(&bytes[4..6], &1u16.to_le_bytes());
    }

    #[test]
    fn matrix_default_flattens() {
        let literal = Value::Array(vec![
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
            Value::Array(vec![Value::Int(3), Value::Int(4)]),
        ]);
        let bytes = parse_default(&literal, &SignalType::Int32, 4, 1, "t").expect("parse");
        assert_eq!(&bytes[8..12], &3i32.to_le_bytes());
    }

    #[test]
    fn mismatched_counts_are_fatal() {
        let literal = Value::Array(vec![Value::Int(1)]);
        assert!(parse_default(&literal, &SignalType::Int32, 2, 1, "t").is_err());
        assert!(parse_default(&Value::Int(1), &SignalType::Int32, 4, 1, "t").is_err());
    }

    #[test]
    fn out_of_range_element_is_fatal() {
        assert!(parse_default(&Value::Int(300), &SignalType::Uint8, 1, 1, "t").is_err());
        assert!(parse_default(&Value::Int(-1), &SignalType::Uint32, 1, 1, "t").is_err());
    }
}
