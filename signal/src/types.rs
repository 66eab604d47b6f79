use std::collections::HashMap;
use std::fmt;

use reflex_error::{Error, Result};

/// Element type of a signal: a primitive numeric type, or a registered
/// composite with a known byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Composite { name: String, byte_size: u32 },
}

impl SignalType {
    /// Size of one element in bytes.
    pub fn byte_size(&self) -> u32 {
        match self {
            SignalType::Int8 | SignalType::Uint8 => 1,
            SignalType::Int16 | SignalType::Uint16 => 2,
            SignalType::Int32 | SignalType::Uint32 | SignalType::Float32 => 4,
            SignalType::Int64 | SignalType::Uint64 | SignalType::Float64 => 8,
            SignalType::Composite { byte_size, .. } => *byte_size,
        }
    }

    /// The configuration name of the type.
    pub fn name(&self) -> &str {
        match self {
            SignalType::Int8 => "int8",
            SignalType::Uint8 => "uint8",
            SignalType::Int16 => "int16",
            SignalType::Uint16 => "uint16",
            SignalType::Int32 => "int32",
            SignalType::Uint32 => "uint32",
            SignalType::Int64 => "int64",
            SignalType::Uint64 => "uint64",
            SignalType::Float32 => "float32",
            SignalType::Float64 => "float64",
            SignalType::Composite { name, .. } => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, SignalType::Composite { .. })
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn primitive_from_name(name: &str) -> Option<SignalType> {
    Some(match name {
        "int8" => SignalType::Int8,
        "uint8" => SignalType::Uint8,
        "int16" => SignalType::Int16,
        "uint16" => SignalType::Uint16,
        "int32" => SignalType::Int32,
        "uint32" => SignalType::Uint32,
        "int64" => SignalType::Int64,
        "uint64" => SignalType::Uint64,
        "float32" => SignalType::Float32,
        "float64" => SignalType::Float64,
        _ => return None,
    })
}

/// Name-to-type mapping used during resolution. Primitives are always
/// known; composites must be registered before resolution.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    composites: HashMap<String, u32>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registers a composite type with a fixed byte size.
    pub fn register_composite(&mut self, name: &str, byte_size: u32) -> Result<()> {
        if primitive_from_name(name).is_some() {
            return Err(Error::parameters(format!(
                "type name {name} is reserved for a primitive"
            )));
        }
        if byte_size == 0 {
            return Err(Error::parameters(format!(
                "composite type {name} must have a non-zero byte size"
            )));
        }
        if self.composites.insert(name.to_owned(), byte_size).is_some() {
            return Err(Error::parameters(format!(
                "composite type {name} is already registered"
            )));
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<SignalType> {
        primitive_from_name(name).or_else(|| {
            self.composites
                .get(name)
                .map(|&byte_size| SignalType::Composite {
                    name: name.to_owned(),
                    byte_size,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_sizes() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.lookup("int32").unwrap().byte_size(), 4);
        assert_eq!(registry.lookup("float64").unwrap().byte_size(), 8);
        assert_eq!(registry.lookup("uint8").unwrap().byte_size(), 1);
        assert!(registry.lookup("complex").is_none());
    }

    #[test]
    fn composites_are_registered_once() {
        let mut registry = TypeRegistry::new();
        registry.register_composite("Pose3D", 24).expect("register");
        assert_eq!(registry.lookup("Pose3D").unwrap().byte_size(), 24);
        assert!(registry.register_composite("Pose3D", 24).is_err());
        assert!(registry.register_composite("int32", 4).is_err());
        assert!(registry.register_composite("Empty", 0).is_err());
    }
}
