//! Metadata tokens
//!
//! A token is the 32-bit table reference embedded in instruction operands:
//! the high byte selects the metadata table, the low 24 bits are a 1-based row.

use serde::{Deserialize, Serialize};
use std::fmt;

/// TypeRef table (types defined in other modules)
pub const TABLE_TYPE_REF: u8 = 0x01;
/// TypeDef table (types defined in this module)
pub const TABLE_TYPE_DEF: u8 = 0x02;
/// Field table (fields defined in this module)
pub const TABLE_FIELD: u8 = 0x04;
/// MethodDef table (methods and constructors defined in this module)
pub const TABLE_METHOD_DEF: u8 = 0x06;
/// MemberRef table (fields and methods of other modules)
pub const TABLE_MEMBER_REF: u8 = 0x0A;
/// StandAloneSig table (calli signatures, local signatures)
pub const TABLE_STANDALONE_SIG: u8 = 0x11;
/// TypeSpec table (constructed types: arrays, generics, pointers)
pub const TABLE_TYPE_SPEC: u8 = 0x1B;
/// MethodSpec table (generic method instantiations)
pub const TABLE_METHOD_SPEC: u8 = 0x2B;
/// User string heap (ldstr operands)
pub const TABLE_USER_STRING: u8 = 0x70;

/// Metadata token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(pub u32);

impl Token {
    /// Build a token from a table id and a 1-based row
    pub const fn new(table: u8, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Metadata table this token points into
    #[inline]
    pub const fn table(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// 1-based row inside the table (0 is the nil token)
    #[inline]
    pub const fn row(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Zero-based index for table lookups, `None` for nil rows
    #[inline]
    pub fn index(self) -> Option<usize> {
        self.row().checked_sub(1).map(|r| r as usize)
    }

    pub const fn is_nil(self) -> bool {
        self.row() == 0
    }

    /// Raw little-endian operand encoding
    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
