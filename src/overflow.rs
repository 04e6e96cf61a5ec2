//! Overflow predicates.
//!
//! For an operator node `N = L op R` of width `W`, [`overflow_condition`]
//! builds a boolean expression over `N`, `L` and `R` that is true exactly when
//! evaluating `op` at width `W` wraps (under the unsigned or the signed
//! reading) or faults:
//!
//! ```text
//! Add   N <u L  ∨  ((N ^ L) & (N ^ R)) <s 0
//! Sub   L <u R  ∨  ((N ^ L) & (L ^ R)) <s 0
//! Mul   N /u R <u L  ∨  (R ≠ 0 ∧ N /s R ≠ L)  ∨  (R = -1 ∧ L = MIN)
//! UDiv  R = 0
//! SDiv  R = 0  ∨  (L = MIN ∧ R = -1)
//! URem  R = 0
//! SRem  R = 0
//! Shl   N >>u R ≠ L  ∨  R ≥u W
//! ```
//!
//! Only the outermost operator is analyzed; operands are taken as they are.
//!
//! [`size_condition`] builds the other kind of predicate: whether a value
//! passed to a sink (an allocation size, a copy length) exceeds a bound.

use crate::expr::ExprManager;
use crate::node::Kind;
use crate::reference::ExprRef;
use crate::types::Width;

/// Whether nodes of this kind have an overflow predicate.
pub const fn can_overflow(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Add | Kind::Sub | Kind::Mul | Kind::UDiv | Kind::SDiv | Kind::URem | Kind::SRem | Kind::Shl
    )
}

/// Builds the overflow predicate of `e`, or `None` if `e` cannot overflow.
pub fn overflow_condition(mgr: &ExprManager, e: ExprRef) -> Option<ExprRef> {
    let node = mgr.node(e);
    if !can_overflow(node.kind) {
        return None;
    }

    let width = node.width;
    let (n, l, r) = (e, node.kid(0), node.kid(1));
    let zero = mgr.mk_const(0, width);
    let all_ones = mgr.mk_const(width.mask(), width);
    let min = mgr.mk_const(width.sign_bit(), width);

    let res = match node.kind {
        Kind::Add => {
            let unsigned = mgr.mk_ult(n, l);
            let flip = mgr.mk_and(mgr.mk_xor(n, l), mgr.mk_xor(n, r));
            mgr.mk_or(unsigned, mgr.mk_slt(flip, zero))
        }
        Kind::Sub => {
            let unsigned = mgr.mk_ult(l, r);
            let flip = mgr.mk_and(mgr.mk_xor(n, l), mgr.mk_xor(l, r));
            mgr.mk_or(unsigned, mgr.mk_slt(flip, zero))
        }
        Kind::Mul => {
            let unsigned = mgr.mk_ult(mgr.mk_udiv(n, r), l);
            let signed = mgr.mk_and(mgr.mk_ne(r, zero), mgr.mk_ne(mgr.mk_sdiv(n, r), l));
            let min_by_minus_one = mgr.mk_and(mgr.mk_eq(r, all_ones), mgr.mk_eq(l, min));
            mgr.mk_or(mgr.mk_or(unsigned, signed), min_by_minus_one)
        }
        Kind::UDiv | Kind::URem | Kind::SRem => mgr.mk_eq(r, zero),
        Kind::SDiv => {
            let min_by_minus_one = mgr.mk_and(mgr.mk_eq(l, min), mgr.mk_eq(r, all_ones));
            mgr.mk_or(mgr.mk_eq(r, zero), min_by_minus_one)
        }
        Kind::Shl => {
            let bits = mgr.mk_const(width.bits() as u64, width);
            let shifted_out = mgr.mk_ne(mgr.mk_lshr(n, r), l);
            mgr.mk_or(shifted_out, mgr.mk_uge(r, bits))
        }
        _ => unreachable!(),
    };
    Some(res)
}

/// Limit on the size argument of a sink, compared at 64 bits.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SizeBound {
    /// `sext(size) >s limit`, e.g. a copy length above a fixed buffer.
    Signed(i64),
    /// `zext(size) >u limit`, e.g. an allocation above the address space.
    Unsigned(u64),
    /// Either reading of the size is above its limit.
    Either { unsigned: u64, signed: i64 },
}

/// Builds the condition under which `size` violates `bound`.
pub fn size_condition(mgr: &ExprManager, size: ExprRef, bound: SizeBound) -> ExprRef {
    let wide = Width::INT64;
    let unsigned_above = |limit: u64| mgr.mk_ugt(mgr.mk_zext(size, wide), mgr.mk_const(limit, wide));
    let signed_above = |limit: i64| mgr.mk_sgt(mgr.mk_sext(size, wide), mgr.mk_const(limit as u64, wide));
    match bound {
        SizeBound::Signed(limit) => signed_above(limit),
        SizeBound::Unsigned(limit) => unsigned_above(limit),
        SizeBound::Either { unsigned, signed } => mgr.mk_or(unsigned_above(unsigned), signed_above(signed)),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::eval::{Assignment, Evaluator};

    const W32: Width = Width::INT32;

    /// Evaluates the predicate of `l op r` at width 32.
    fn check(kind: Kind, l: u32, r: u32) -> bool {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("l", W32);
        let y = mgr.mk_symbolic("r", W32);
        let e = mgr.mk_binary(kind, x, y);
        let pred = overflow_condition(&mgr, e).unwrap();
        assert!(mgr.width(pred).is_bool());
        let assignment = Assignment::new().with("l", l.to_le_bytes()).with("r", r.to_le_bytes());
        Evaluator::new(&mgr, &assignment).evaluate_bool(pred)
    }

    #[test]
    fn test_add() {
        assert!(check(Kind::Add, 0xffff_ffff, 1));
        assert!(check(Kind::Add, 0x7fff_ffff, 1));
        assert!(!check(Kind::Add, 1, 1));
        assert!(check(Kind::Add, 0x8000_0000, 0x8000_0000));
    }

    #[test]
    fn test_sub() {
        assert!(check(Kind::Sub, 0, 1));
        assert!(check(Kind::Sub, 0x8000_0000, 1));
        assert!(!check(Kind::Sub, 5, 3));
    }

    #[test]
    fn test_mul() {
        assert!(check(Kind::Mul, 0x10000, 0x10000));
        assert!(!check(Kind::Mul, 2, 3));
        assert!(check(Kind::Mul, 0x8000_0000, 0xffff_ffff));
        assert!(!check(Kind::Mul, 12345, 0));
        // -1 * -1 = 1 fits signed but wraps unsigned.
        assert!(check(Kind::Mul, 0xffff_ffff, 0xffff_ffff));
    }

    #[test]
    fn test_division_by_zero() {
        for kind in [Kind::UDiv, Kind::SDiv, Kind::URem, Kind::SRem] {
            for l in [0, 1, 0x8000_0000, 0xffff_ffff] {
                assert!(check(kind, l, 0), "{} {:#x} 0", kind, l);
            }
            assert!(!check(kind, 7, 2), "{} 7 2", kind);
        }
    }

    #[test]
    fn test_sdiv_min_by_minus_one() {
        assert!(check(Kind::SDiv, 0x8000_0000, 0xffff_ffff));
        assert!(!check(Kind::UDiv, 0x8000_0000, 0xffff_ffff));
        assert!(!check(Kind::SDiv, 0x8000_0001, 0xffff_ffff));
    }

    #[test]
    fn test_shl() {
        for l in [0, 1, 0x1234_5678, 0xffff_ffff] {
            assert!(check(Kind::Shl, l, 32), "{:#x} << 32", l);
        }
        assert!(check(Kind::Shl, 0x8000_0000, 1));
        assert!(!check(Kind::Shl, 0x4000_0000, 1));
        assert!(!check(Kind::Shl, 0, 31));
    }

    #[test]
    fn test_no_predicate() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W32);
        let y = mgr.mk_symbolic("y", W32);
        for kind in [Kind::And, Kind::Or, Kind::Xor, Kind::LShr, Kind::AShr, Kind::Eq, Kind::Slt, Kind::Uge] {
            assert!(!can_overflow(kind));
            assert_eq!(overflow_condition(&mgr, mgr.mk_binary(kind, x, y)), None, "{}", kind);
        }
        assert_eq!(overflow_condition(&mgr, mgr.mk_not(x)), None);
        assert_eq!(overflow_condition(&mgr, x), None);
        assert_eq!(overflow_condition(&mgr, mgr.mk_const(3, W32)), None);
    }

    #[test]
    fn test_predicate_is_shallow() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W32);
        let y = mgr.mk_symbolic("y", W32);
        let inner = mgr.mk_mul(x, y);
        let e = mgr.mk_add(inner, y);
        let pred = overflow_condition(&mgr, e).unwrap();
        // The inner multiplication appears only as an operand.
        let text = mgr.to_sexpr(pred);
        assert!(!text.contains("UDiv"));
        assert!(!text.contains("SDiv"));
    }

    #[test]
    fn test_odd_width() {
        let w = Width::new(5);
        let mgr = ExprManager::new();
        let arr = mgr.mk_array("v", 2);
        let idx0 = mgr.mk_const(0, W32);
        let idx1 = mgr.mk_const(1, W32);
        let x = mgr.mk_extract(mgr.mk_read(arr, idx0), 0, w);
        let y = mgr.mk_extract(mgr.mk_read(arr, idx1), 0, w);
        let pred = overflow_condition(&mgr, mgr.mk_mul(x, y)).unwrap();
        for a in 0u8..32 {
            for b in 0u8..32 {
                let assignment = Assignment::new().with("v", [a, b]);
                let got = Evaluator::new(&mgr, &assignment).evaluate_bool(pred);
                let unsigned = (a as u32) * (b as u32) >= 32;
                let sa = ((a << 3) as i8 >> 3) as i32;
                let sb = ((b << 3) as i8 >> 3) as i32;
                let signed = !(-16..16).contains(&(sa * sb));
                assert_eq!(got, unsigned || signed, "{} * {}", a, b);
            }
        }
    }

    #[test]
    fn test_size_condition() {
        let mgr = ExprManager::new();
        let size = mgr.mk_symbolic("size", W32);
        let holds = |bound, value: u32| {
            let pred = size_condition(&mgr, size, bound);
            assert!(mgr.width(pred).is_bool());
            let assignment = Assignment::new().with("size", value.to_le_bytes());
            Evaluator::new(&mgr, &assignment).evaluate_bool(pred)
        };

        let copy = SizeBound::Signed(0x20);
        assert!(holds(copy, 0x21));
        assert!(!holds(copy, 0x20));
        // A negative length is not above the bound.
        assert!(!holds(copy, 0xffff_fff0));

        let alloc = SizeBound::Unsigned(0x1000);
        assert!(holds(alloc, 0x1001));
        assert!(holds(alloc, 0xffff_fff0));
        assert!(!holds(alloc, 0x1000));

        let either = SizeBound::Either {
            unsigned: 0xffff_ffff,
            signed: 0x7fff_ffff,
        };
        assert!(!holds(either, 0xffff_ffff));
        assert!(!holds(either, 0x7fff_ffff));
        assert!(holds(SizeBound::Either { unsigned: 0x10, signed: 0x7fff_ffff }, 0x11));
        assert!(holds(SizeBound::Either { unsigned: u64::MAX, signed: -2 }, 0xffff_ffff));
    }

    #[test]
    fn test_size_condition_of_constant_folds() {
        let mgr = ExprManager::new();
        let size = mgr.mk_const(0x40, W32);
        assert_eq!(mgr.as_bool(size_condition(&mgr, size, SizeBound::Signed(0x20))), Some(true));
        assert_eq!(mgr.as_bool(size_condition(&mgr, size, SizeBound::Unsigned(0x40))), Some(false));
    }
}
