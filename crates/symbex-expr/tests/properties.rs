//! Property tests over randomly generated expression trees.

use std::collections::BTreeSet;

use proptest::prelude::*;

use symbex_core::ops::{BinaryOp, CompareOp, UnaryOp};
use symbex_core::VarId;
use symbex_expr::expr::truncate;
use symbex_expr::{BvBuilder, BvTerm, Endian, SymExpr};

/// Sign-extend a `size`-byte witness to 64 bits.
fn sign_extend(value: i64, size: u64) -> i64 {
    if size >= 8 {
        return value;
    }
    let bits = 8 * size as u32;
    let shift = 64 - bits;
    (truncate(value, size) << shift) >> shift
}

/// Independent evaluator: recompute the witness of a tree from its
/// leaves, with machine integer semantics truncated to the node width.
fn eval(e: &SymExpr) -> i64 {
    match e {
        SymExpr::Concrete { size, value } | SymExpr::Basic { size, value, .. } => {
            truncate(*value, *size)
        }
        SymExpr::Unary {
            size, op, child, ..
        } => {
            let v = eval(child);
            let raw = match op {
                UnaryOp::Negate => v.wrapping_neg(),
                UnaryOp::BitwiseNot => !v,
                UnaryOp::LogicalNot => i64::from(v == 0),
                UnaryOp::UnsignedCast => truncate(v, child.size()),
                UnaryOp::SignedCast => sign_extend(v, child.size()),
            };
            truncate(raw, *size)
        }
        SymExpr::Binary {
            size,
            op,
            left,
            right,
            value,
        } => {
            let (l, r) = (eval(left), eval(right));
            let raw = match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitOr => l | r,
                BinaryOp::BitXor => l ^ r,
                // The generator only emits the operators above plus the
                // structural ones; a CONCRETE node's witness is its own.
                _ => *value,
            };
            truncate(raw, *size)
        }
        SymExpr::Compare {
            op, left, right, ..
        } => {
            let (lu, ru) = (
                truncate(eval(left), left.size()) as u64,
                truncate(eval(right), right.size()) as u64,
            );
            let (ls, rs) = (
                sign_extend(eval(left), left.size()),
                sign_extend(eval(right), right.size()),
            );
            i64::from(match op {
                CompareOp::Eq => lu == ru,
                CompareOp::Neq => lu != ru,
                CompareOp::Gt => lu > ru,
                CompareOp::Le => lu <= ru,
                CompareOp::Lt => lu < ru,
                CompareOp::Ge => lu >= ru,
                CompareOp::SGt => ls > rs,
                CompareOp::SLe => ls <= rs,
                CompareOp::SLt => ls < rs,
                CompareOp::SGe => ls >= rs,
            })
        }
        SymExpr::Deref { size, value, .. } => truncate(*value, *size),
    }
}

fn arb_size() -> impl Strategy<Value = u64> {
    prop_oneof![Just(1u64), Just(2), Just(4), Just(8)]
}

fn arb_leaf() -> impl Strategy<Value = SymExpr> {
    (arb_size(), any::<i64>(), 0u32..8).prop_flat_map(|(size, value, var)| {
        prop_oneof![
            Just(SymExpr::concrete(size, truncate(value, size))),
            Just(SymExpr::basic(size, truncate(value, size), VarId(var))),
        ]
    })
}

fn arb_binary_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::BitAnd),
        Just(BinaryOp::BitOr),
        Just(BinaryOp::BitXor),
    ]
}

fn arb_compare_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Neq),
        Just(CompareOp::Gt),
        Just(CompareOp::Le),
        Just(CompareOp::Lt),
        Just(CompareOp::Ge),
        Just(CompareOp::SGt),
        Just(CompareOp::SLe),
        Just(CompareOp::SLt),
        Just(CompareOp::SGe),
    ]
}

/// Trees whose witnesses are computed bottom-up by the evaluator, the
/// way the runtime computes them during a concrete run.
fn arb_tree() -> impl Strategy<Value = SymExpr> {
    arb_leaf().prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), arb_binary_op()).prop_map(|(child, op)| {
                // Same-width binary node over a cloned child and a leaf
                // keeps operand widths consistent.
                let size = child.size();
                let rhs = SymExpr::concrete(size, truncate(0x5A, size));
                let node = SymExpr::binary(op, size, 0, child, rhs);
                rewitness(node)
            }),
            (inner.clone(), prop_oneof![
                Just(UnaryOp::Negate),
                Just(UnaryOp::BitwiseNot),
                Just(UnaryOp::LogicalNot),
            ])
            .prop_map(|(child, op)| {
                let size = child.size();
                rewitness(SymExpr::unary(op, size, 0, child))
            }),
            (inner.clone(), inner, arb_compare_op()).prop_map(|(l, r, op)| {
                // Force equal operand widths for comparisons.
                let size = l.size();
                let r = resize_leafward(r, size);
                rewitness(SymExpr::compare(op, 0, l, r))
            }),
        ]
    })
}

/// Rebuild a node with its witness recomputed by the evaluator.
fn rewitness(e: SymExpr) -> SymExpr {
    let v = eval(&e);
    match e {
        SymExpr::Unary {
            size, op, child, ..
        } => SymExpr::Unary {
            size,
            value: v,
            op,
            child,
        },
        SymExpr::Binary {
            size,
            op,
            left,
            right,
            ..
        } => SymExpr::Binary {
            size,
            value: v,
            op,
            left,
            right,
        },
        SymExpr::Compare {
            size,
            op,
            left,
            right,
            ..
        } => SymExpr::Compare {
            size,
            value: v,
            op,
            left,
            right,
        },
        other => other,
    }
}

/// Coerce a subtree to the given width by wrapping it in a cast node.
fn resize_leafward(e: SymExpr, size: u64) -> SymExpr {
    if e.size() == size {
        return e;
    }
    rewitness(SymExpr::unary(UnaryOp::UnsignedCast, size, 0, e))
}

proptest! {
    #[test]
    fn value_coherence(tree in arb_tree()) {
        prop_assert_eq!(eval(&tree), tree.value());
    }

    #[test]
    fn wire_roundtrip(tree in arb_tree()) {
        let back = SymExpr::from_bytes(&tree.to_bytes()).unwrap();
        prop_assert_eq!(&back, &tree);
        prop_assert_eq!(back.value(), tree.value());
    }

    #[test]
    fn truncated_prefixes_never_parse(tree in arb_tree()) {
        let bytes = tree.to_bytes();
        for cut in 0..bytes.len() {
            prop_assert!(SymExpr::from_bytes(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn concrete_round_trip_and_blast(size in arb_size(), value in any::<i64>()) {
        let e = SymExpr::concrete(size, truncate(value, size));
        let back = SymExpr::from_bytes(&e.to_bytes()).unwrap();
        prop_assert_eq!(&back, &e);

        let mut ctx = BvBuilder;
        let term = e.bit_blast(&mut ctx, Endian::Little).unwrap();
        let expected = truncate(value, size) as u64 as u128
            & if size >= 8 { u128::MAX } else { (1u128 << (8 * size)) - 1 };
        prop_assert_eq!(term, BvTerm::Const { bits: (8 * size) as u32, value: expected });
    }

    #[test]
    fn compare_negation_partitions(
        op in arb_compare_op(),
        l in any::<i64>(),
        r in any::<i64>(),
        size in arb_size(),
    ) {
        let holds = |op: CompareOp| {
            let e = SymExpr::compare(
                op,
                0,
                SymExpr::concrete(size, truncate(l, size)),
                SymExpr::concrete(size, truncate(r, size)),
            );
            eval(&e) != 0
        };
        // Exactly one of {op, negate(op)} holds for any operand pair.
        prop_assert_ne!(holds(op), holds(op.negate()));
    }

    #[test]
    fn concat_extract_laws(
        s1 in arb_size(),
        s2 in arb_size(),
        v1 in any::<i64>(),
        v2 in any::<i64>(),
    ) {
        // The laws require slices aligned to their own width.
        prop_assume!(s1 == s2);
        for endian in [Endian::Little, Endian::Big] {
            let e1 = SymExpr::basic(s1, truncate(v1, s1), VarId(1));
            let e2 = SymExpr::basic(s2, truncate(v2, s2), VarId(2));
            let cat = SymExpr::concat(e1.clone(), e2.clone(), endian);

            prop_assert_eq!(cat.clone().extract(0, s1, endian), e1);
            prop_assert_eq!(cat.extract(s1, s2, endian), e2);
        }
    }

    #[test]
    fn append_vars_matches_leaf_walk(tree in arb_tree()) {
        let mut expected = BTreeSet::new();
        fn walk(e: &SymExpr, out: &mut BTreeSet<VarId>) {
            match e {
                SymExpr::Basic { var, .. } => { out.insert(*var); }
                SymExpr::Unary { child, .. } => walk(child, out),
                SymExpr::Binary { left, right, .. }
                | SymExpr::Compare { left, right, .. } => {
                    walk(left, out);
                    walk(right, out);
                }
                SymExpr::Deref { addr, .. } => walk(addr, out),
                SymExpr::Concrete { .. } => {}
            }
        }
        walk(&tree, &mut expected);
        prop_assert_eq!(tree.vars(), expected);
    }
}
