//! Machine type codes shared by the instrumenter and the runtime algebra.
//!
//! The closed set follows the runtime ABI: one code per fixed-width
//! integer shape plus a single opaque aggregate code. Aggregates carry
//! their byte size explicitly wherever it matters (`LoadAggr`, `Deref`
//! snapshots); [`TypeCode::size_of`] reports 0 for them.

use serde::{Deserialize, Serialize};

use crate::ast::CType;
use crate::error::CoreError;

/// Closed set of value type codes passed to the runtime.
///
/// Codes are part of the runtime ABI and must not be renumbered.
/// `U128` is reserved for future 128-bit support; nothing emits it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeCode {
    Bool = 0,
    U8 = 1,
    I8 = 2,
    U16 = 3,
    I16 = 4,
    U32 = 5,
    I32 = 6,
    U64 = 7,
    I64 = 8,
    U128 = 9,
    Aggregate = 10,
}

impl TypeCode {
    /// ABI code for this type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Byte size of a value of this type. Aggregates have no fixed
    /// size and report 0; their size travels alongside the code.
    pub fn size_of(self) -> u64 {
        match self {
            TypeCode::Bool | TypeCode::U8 | TypeCode::I8 => 1,
            TypeCode::U16 | TypeCode::I16 => 2,
            TypeCode::U32 | TypeCode::I32 => 4,
            TypeCode::U64 | TypeCode::I64 => 8,
            TypeCode::U128 => 16,
            TypeCode::Aggregate => 0,
        }
    }

    /// Smallest representable value, as a signed 64-bit integer.
    pub fn min_value(self) -> i64 {
        match self {
            TypeCode::I8 => i64::from(i8::MIN),
            TypeCode::I16 => i64::from(i16::MIN),
            TypeCode::I32 => i64::from(i32::MIN),
            TypeCode::I64 => i64::MIN,
            _ => 0,
        }
    }

    /// Largest representable value, as a signed 64-bit integer.
    ///
    /// The unsigned 64-bit and 128-bit maxima do not fit in `i64`; they
    /// wrap to -1, the same bit pattern the runtime compares against.
    pub fn max_value(self) -> i64 {
        match self {
            TypeCode::Bool => 1,
            TypeCode::U8 => i64::from(u8::MAX),
            TypeCode::I8 => i64::from(i8::MAX),
            TypeCode::U16 => i64::from(u16::MAX),
            TypeCode::I16 => i64::from(i16::MAX),
            TypeCode::U32 => i64::from(u32::MAX),
            TypeCode::I32 => i64::from(i32::MAX),
            TypeCode::U64 | TypeCode::U128 => -1,
            TypeCode::I64 => i64::MAX,
            TypeCode::Aggregate => 0,
        }
    }

    /// Whether values of this code compare with signed operators.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            TypeCode::I8 | TypeCode::I16 | TypeCode::I32 | TypeCode::I64
        )
    }
}

impl TryFrom<u8> for TypeCode {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, CoreError> {
        Ok(match code {
            0 => TypeCode::Bool,
            1 => TypeCode::U8,
            2 => TypeCode::I8,
            3 => TypeCode::U16,
            4 => TypeCode::I16,
            5 => TypeCode::U32,
            6 => TypeCode::I32,
            7 => TypeCode::U64,
            8 => TypeCode::I64,
            9 => TypeCode::U128,
            10 => TypeCode::Aggregate,
            other => return Err(CoreError::UnknownTypeCode { code: other }),
        })
    }
}

/// Map a resolved C type to its runtime type code.
///
/// Pointers map to unsigned long, enums to signed int, records and
/// arrays to the aggregate code. Floating-point and void types have no
/// code; callers gate on [`CType::is_symbolic`] first, and reaching
/// here with one is an error.
pub fn to_type_code(ty: &CType) -> Result<TypeCode, CoreError> {
    Ok(match ty {
        CType::Bool => TypeCode::Bool,
        CType::Char | CType::UChar => TypeCode::U8,
        CType::SChar => TypeCode::I8,
        CType::UShort => TypeCode::U16,
        CType::Short => TypeCode::I16,
        CType::UInt => TypeCode::U32,
        CType::Int | CType::Enum(_) => TypeCode::I32,
        CType::ULong | CType::ULongLong | CType::Pointer(_) => TypeCode::U64,
        CType::Long | CType::LongLong => TypeCode::I64,
        CType::Array(_, _) | CType::Record(_) => TypeCode::Aggregate,
        CType::Void | CType::Float | CType::Double => {
            return Err(CoreError::NotSymbolic { ty: ty.clone() })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RecordType;

    #[test]
    fn sizes_match_the_width_in_the_name() {
        assert_eq!(TypeCode::Bool.size_of(), 1);
        assert_eq!(TypeCode::U8.size_of(), 1);
        assert_eq!(TypeCode::I16.size_of(), 2);
        assert_eq!(TypeCode::U32.size_of(), 4);
        assert_eq!(TypeCode::I64.size_of(), 8);
        assert_eq!(TypeCode::U128.size_of(), 16);
        assert_eq!(TypeCode::Aggregate.size_of(), 0);
    }

    #[test]
    fn signed_ranges() {
        assert_eq!(TypeCode::I8.min_value(), -128);
        assert_eq!(TypeCode::I8.max_value(), 127);
        assert_eq!(TypeCode::U8.min_value(), 0);
        assert_eq!(TypeCode::U8.max_value(), 255);
        assert_eq!(TypeCode::I64.min_value(), i64::MIN);
        // Unsigned 64-bit max wraps to the all-ones pattern.
        assert_eq!(TypeCode::U64.max_value(), -1);
    }

    #[test]
    fn code_roundtrip() {
        for code in 0u8..=10 {
            let ty = TypeCode::try_from(code).unwrap();
            assert_eq!(ty.code(), code);
        }
        assert!(TypeCode::try_from(11).is_err());
    }

    #[test]
    fn pointer_maps_to_unsigned_long() {
        let ty = CType::Pointer(Box::new(CType::Int));
        assert_eq!(to_type_code(&ty).unwrap(), TypeCode::U64);
    }

    #[test]
    fn enum_maps_to_int() {
        assert_eq!(
            to_type_code(&CType::Enum("color".into())).unwrap(),
            TypeCode::I32
        );
    }

    #[test]
    fn record_maps_to_aggregate() {
        let rec = CType::Record(RecordType {
            name: "pair".into(),
            is_union: false,
            size: 8,
            fields: vec![],
        });
        assert_eq!(to_type_code(&rec).unwrap(), TypeCode::Aggregate);
    }

    #[test]
    fn float_has_no_code() {
        assert!(to_type_code(&CType::Float).is_err());
        assert!(to_type_code(&CType::Void).is_err());
    }
}
