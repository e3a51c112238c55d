//! Affine expressions: `c0 + sum(ci * vi)`.
//!
//! The fast path for comparisons and arithmetic over expressions that
//! happen to be linear. The representation is canonical: coefficients
//! are kept in an ordered map, zero coefficients are removed after
//! every mutator, and equal affine forms serialize identically.
//! Arithmetic wraps, matching machine integer semantics.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use symbex_core::VarId;

use crate::error::WireError;
use crate::wire::ByteReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    constant: i64,
    coefficients: BTreeMap<VarId, i64>,
}

impl LinearExpr {
    /// A constant affine form.
    pub fn constant(value: i64) -> Self {
        LinearExpr {
            constant: value,
            coefficients: BTreeMap::new(),
        }
    }

    /// The form `1 * var`.
    pub fn variable(var: VarId) -> Self {
        let mut coefficients = BTreeMap::new();
        coefficients.insert(var, 1);
        LinearExpr {
            constant: 0,
            coefficients,
        }
    }

    pub fn const_term(&self) -> i64 {
        self.constant
    }

    pub fn coefficient(&self, var: VarId) -> i64 {
        self.coefficients.get(&var).copied().unwrap_or(0)
    }

    /// An empty coefficient map means the form is concrete.
    pub fn is_concrete(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// `1 + number of nonzero terms`.
    pub fn size(&self) -> usize {
        1 + self.coefficients.len()
    }

    pub fn append_vars(&self, vars: &mut BTreeSet<VarId>) {
        vars.extend(self.coefficients.keys().copied());
    }

    fn prune_zeros(&mut self) {
        self.coefficients.retain(|_, c| *c != 0);
    }

    // -- Mutators -----------------------------------------------------

    pub fn negate(&mut self) {
        self.constant = self.constant.wrapping_neg();
        for c in self.coefficients.values_mut() {
            *c = c.wrapping_neg();
        }
    }

    pub fn add(&mut self, other: &LinearExpr) {
        self.constant = self.constant.wrapping_add(other.constant);
        for (var, c) in &other.coefficients {
            let entry = self.coefficients.entry(*var).or_insert(0);
            *entry = entry.wrapping_add(*c);
        }
        self.prune_zeros();
    }

    pub fn sub(&mut self, other: &LinearExpr) {
        self.constant = self.constant.wrapping_sub(other.constant);
        for (var, c) in &other.coefficients {
            let entry = self.coefficients.entry(*var).or_insert(0);
            *entry = entry.wrapping_sub(*c);
        }
        self.prune_zeros();
    }

    pub fn add_const(&mut self, value: i64) {
        self.constant = self.constant.wrapping_add(value);
    }

    pub fn sub_const(&mut self, value: i64) {
        self.constant = self.constant.wrapping_sub(value);
    }

    /// Scale every term. Multiplying by zero collapses to a concrete 0.
    pub fn mul_const(&mut self, value: i64) {
        self.constant = self.constant.wrapping_mul(value);
        for c in self.coefficients.values_mut() {
            *c = c.wrapping_mul(value);
        }
        self.prune_zeros();
    }

    // -- Wire format --------------------------------------------------
    //
    // <const:i64 LE> <n:u32 LE> (<var:u32 LE> <coeff:i64 LE>)*n
    // The ordered map makes the encoding canonical.

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.constant.to_le_bytes());
        out.extend_from_slice(&(self.coefficients.len() as u32).to_le_bytes());
        for (var, c) in &self.coefficients {
            out.extend_from_slice(&var.0.to_le_bytes());
            out.extend_from_slice(&c.to_le_bytes());
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<LinearExpr, WireError> {
        let constant = reader.read_i64()?;
        let n = reader.read_u32()?;
        let mut coefficients = BTreeMap::new();
        for _ in 0..n {
            let var = VarId(reader.read_u32()?);
            let c = reader.read_i64()?;
            if c != 0 {
                coefficients.insert(var, c);
            }
        }
        Ok(LinearExpr {
            constant,
            coefficients,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<LinearExpr, WireError> {
        let mut reader = ByteReader::new(bytes);
        let expr = LinearExpr::read_from(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(WireError::TrailingBytes(reader.remaining()));
        }
        Ok(expr)
    }
}
