//! Type identifiers for LodeDB column values.

use serde::{Deserialize, Serialize};

/// Identifier for the data types a column can hold.
///
/// Type IDs are stored as one-byte tags in the serialized row format and
/// in catalog metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeId {
    // 32-bit signed integer
    Int = 1,

    // 32-bit float
    Float = 2,

    // Fixed-length character string (length in the column definition)
    Char = 3,

    // Variable-length character string
    Varchar = 4,
}

impl TypeId {
    /// Returns the fixed byte size for this type, or None for
    /// variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            TypeId::Int | TypeId::Float => Some(4),
            TypeId::Char | TypeId::Varchar => None,
        }
    }

    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeId::Int | TypeId::Float)
    }

    /// Returns true if this type is a string type.
    pub fn is_string(&self) -> bool {
        matches!(self, TypeId::Char | TypeId::Varchar)
    }

    /// Decodes a type tag from its on-disk byte.
    pub fn from_u8(tag: u8) -> Option<TypeId> {
        match tag {
            1 => Some(TypeId::Int),
            2 => Some(TypeId::Float),
            3 => Some(TypeId::Char),
            4 => Some(TypeId::Varchar),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeId::Int => "INT",
            TypeId::Float => "FLOAT",
            TypeId::Char => "CHAR",
            TypeId::Varchar => "VARCHAR",
        };
        write!(f, "{}", name)
    }
}
