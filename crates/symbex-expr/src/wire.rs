//! The self-describing binary serialization of symbolic expressions.
//!
//! Little-endian on the wire, prefix order, tagged:
//!
//! ```text
//! expr      := <value:i64> <size:u64> <tag:u8> <payload>
//! payload   := Basic   <var:u32>
//!            | Compare <op:u8> expr expr
//!            | Binary  <op:u8> expr expr
//!            | Unary   <op:u8> expr
//!            | Deref   <object> expr <bytes:object.size>
//!            | Const   (empty)
//! object    := <start:u64> <size:u64> <element:u8>
//! ```
//!
//! Parsing is strict: any short read or unknown code aborts with a
//! [`WireError`] and the partially-built tree is dropped. The `size`
//! header is not validated against the operator's arity or for being a
//! power of two; malformed values fail only when a dependent length
//! read runs out of input.

use symbex_core::ops::{BinaryOp, CompareOp, UnaryOp};
use symbex_core::{TypeCode, VarId};

use crate::error::WireError;
use crate::expr::SymExpr;
use crate::object::SymObject;

const TAG_BASIC: u8 = 0;
const TAG_COMPARE: u8 = 1;
const TAG_BINARY: u8 = 2;
const TAG_UNARY: u8 = 3;
const TAG_DEREF: u8 = 4;
const TAG_CONST: u8 = 5;

/// A forward-only reader over a byte slice.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

impl SymExpr {
    /// Append this expression's wire encoding to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value().to_le_bytes());
        out.extend_from_slice(&self.size().to_le_bytes());
        match self {
            SymExpr::Basic { var, .. } => {
                out.push(TAG_BASIC);
                out.extend_from_slice(&var.0.to_le_bytes());
            }
            SymExpr::Compare {
                op, left, right, ..
            } => {
                out.push(TAG_COMPARE);
                out.push(op.code());
                left.write_to(out);
                right.write_to(out);
            }
            SymExpr::Binary {
                op, left, right, ..
            } => {
                out.push(TAG_BINARY);
                out.push(op.code());
                left.write_to(out);
                right.write_to(out);
            }
            SymExpr::Unary { op, child, .. } => {
                out.push(TAG_UNARY);
                out.push(op.code());
                child.write_to(out);
            }
            SymExpr::Deref {
                object,
                addr,
                bytes,
                ..
            } => {
                out.push(TAG_DEREF);
                out.extend_from_slice(&object.start.to_le_bytes());
                out.extend_from_slice(&object.size.to_le_bytes());
                out.push(object.element.code());
                addr.write_to(out);
                out.extend_from_slice(bytes);
            }
            SymExpr::Concrete { .. } => {
                out.push(TAG_CONST);
            }
        }
    }

    /// The wire encoding as a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    /// Read one expression from the reader, leaving it positioned after
    /// the encoding (expressions nest inside larger structures).
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<SymExpr, WireError> {
        let value = reader.read_i64()?;
        let size = reader.read_u64()?;
        let tag = reader.read_u8()?;
        match tag {
            TAG_BASIC => {
                let var = VarId(reader.read_u32()?);
                Ok(SymExpr::Basic { size, value, var })
            }
            TAG_COMPARE => {
                let code = reader.read_u8()?;
                let op = CompareOp::try_from(code)
                    .map_err(|_| WireError::UnknownCode {
                        context: "compare op",
                        code,
                    })?;
                let left = Box::new(SymExpr::read_from(reader)?);
                let right = Box::new(SymExpr::read_from(reader)?);
                Ok(SymExpr::Compare {
                    size,
                    value,
                    op,
                    left,
                    right,
                })
            }
            TAG_BINARY => {
                let code = reader.read_u8()?;
                let op = BinaryOp::try_from(code).map_err(|_| WireError::UnknownCode {
                    context: "binary op",
                    code,
                })?;
                let left = Box::new(SymExpr::read_from(reader)?);
                let right = Box::new(SymExpr::read_from(reader)?);
                Ok(SymExpr::Binary {
                    size,
                    value,
                    op,
                    left,
                    right,
                })
            }
            TAG_UNARY => {
                let code = reader.read_u8()?;
                let op = UnaryOp::try_from(code).map_err(|_| WireError::UnknownCode {
                    context: "unary op",
                    code,
                })?;
                let child = Box::new(SymExpr::read_from(reader)?);
                Ok(SymExpr::Unary {
                    size,
                    value,
                    op,
                    child,
                })
            }
            TAG_DEREF => {
                let start = reader.read_u64()?;
                let obj_size = reader.read_u64()?;
                let code = reader.read_u8()?;
                let element =
                    TypeCode::try_from(code).map_err(|_| WireError::UnknownCode {
                        context: "type code",
                        code,
                    })?;
                let addr = Box::new(SymExpr::read_from(reader)?);
                let len = usize::try_from(obj_size).map_err(|_| WireError::Truncated {
                    needed: usize::MAX,
                    remaining: reader.remaining(),
                })?;
                let bytes = reader.take(len)?.to_vec();
                Ok(SymExpr::Deref {
                    size,
                    value,
                    object: SymObject::new(start, obj_size, element),
                    addr,
                    bytes,
                })
            }
            TAG_CONST => Ok(SymExpr::Concrete { size, value }),
            tag => Err(WireError::UnknownTag { tag }),
        }
    }

    /// Parse a complete expression; trailing input is an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<SymExpr, WireError> {
        let mut reader = ByteReader::new(bytes);
        let expr = SymExpr::read_from(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(WireError::TrailingBytes(reader.remaining()));
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Endian;

    fn sample_tree() -> SymExpr {
        SymExpr::compare(
            CompareOp::SLt,
            1,
            SymExpr::binary(
                BinaryOp::Add,
                4,
                13,
                SymExpr::basic(4, 6, VarId(0)),
                SymExpr::concrete(4, 7),
            ),
            SymExpr::unary(UnaryOp::SignedCast, 4, 100, SymExpr::basic(1, 100, VarId(1))),
        )
    }

    #[test]
    fn roundtrip_nested_tree() {
        let expr = sample_tree();
        let back = SymExpr::from_bytes(&expr.to_bytes()).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn roundtrip_concrete() {
        let expr = SymExpr::concrete(2, -5);
        let bytes = expr.to_bytes();
        // value + size + tag, nothing else
        assert_eq!(bytes.len(), 8 + 8 + 1);
        assert_eq!(SymExpr::from_bytes(&bytes).unwrap(), expr);
    }

    #[test]
    fn roundtrip_deref_with_snapshot() {
        let expr = SymExpr::deref(
            4,
            0x0403_0201,
            SymObject::new(0x7fff_0000, 4, TypeCode::I32),
            SymExpr::basic(8, 0x7fff_0000, VarId(9)),
            vec![1, 2, 3, 4],
        );
        let back = SymExpr::from_bytes(&expr.to_bytes()).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn roundtrip_concat_tree() {
        let expr = SymExpr::concat(
            SymExpr::basic(1, 0xAB, VarId(7)),
            SymExpr::concrete(1, 0xCD),
            Endian::Little,
        );
        let back = SymExpr::from_bytes(&expr.to_bytes()).unwrap();
        assert_eq!(expr, back);
        assert_eq!(back.value(), 0xCDAB);
    }

    #[test]
    fn every_truncated_prefix_fails() {
        let bytes = sample_tree().to_bytes();
        for cut in 0..bytes.len() {
            let err = SymExpr::from_bytes(&bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, WireError::Truncated { .. }),
                "prefix {cut}: {err:?}"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = SymExpr::concrete(1, 0).to_bytes();
        bytes.push(0xEE);
        assert_eq!(
            SymExpr::from_bytes(&bytes).unwrap_err(),
            WireError::TrailingBytes(1)
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.push(9);
        assert_eq!(
            SymExpr::from_bytes(&bytes).unwrap_err(),
            WireError::UnknownTag { tag: 9 }
        );
    }

    #[test]
    fn unknown_op_code_is_rejected() {
        // A unary node with an out-of-range op code.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.push(3); // Unary tag
        bytes.push(99); // bogus op
        assert!(matches!(
            SymExpr::from_bytes(&bytes).unwrap_err(),
            WireError::UnknownCode {
                context: "unary op",
                code: 99
            }
        ));
    }

    #[test]
    fn wire_is_little_endian() {
        let bytes = SymExpr::concrete(1, 0x0102).to_bytes();
        // value field first, least-significant byte first
        assert_eq!(&bytes[..8], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        // then size
        assert_eq!(&bytes[8..16], &[1, 0, 0, 0, 0, 0, 0, 0]);
        // then the Const tag
        assert_eq!(bytes[16], 5);
    }

    #[test]
    fn nested_read_leaves_reader_positioned() {
        let first = SymExpr::concrete(1, 1);
        let second = SymExpr::basic(4, 2, VarId(3));
        let mut buf = Vec::new();
        first.write_to(&mut buf);
        second.write_to(&mut buf);

        let mut reader = ByteReader::new(&buf);
        assert_eq!(SymExpr::read_from(&mut reader).unwrap(), first);
        assert_eq!(SymExpr::read_from(&mut reader).unwrap(), second);
        assert_eq!(reader.remaining(), 0);
    }
}
