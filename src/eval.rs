//! Concrete semantics of expressions.
//!
//! The free functions define what every operator computes on concrete
//! values; they are shared by constant folding in the manager, by the
//! [`Evaluator`] and (bit for bit) by the bit-blaster.
//!
//! All arithmetic is modulo `2^W`. Division by zero follows SMT-LIB:
//!
//! ```text
//! udiv x 0 = ~0      urem x 0 = x
//! sdiv x 0 = x >= 0 ? -1 : 1
//! srem x 0 = x
//! ```
//!
//! Shifting by `W` or more yields zero (`shl`, `lshr`) or the sign fill (`ashr`).

use std::collections::HashMap;

use crate::expr::ExprManager;
use crate::node::Kind;
use crate::reference::ExprRef;
use crate::solver::Solution;
use crate::types::{ArrayId, Width};

/// Interprets the low `width` bits of `value` as a two's complement integer.
pub fn to_signed(value: u64, width: Width) -> i64 {
    let shift = 64 - width.bits();
    ((value << shift) as i64) >> shift
}

fn negate(value: u64, width: Width) -> u64 {
    value.wrapping_neg() & width.mask()
}

fn sdiv(width: Width, a: u64, b: u64) -> u64 {
    let sign = width.sign_bit();
    let (neg_a, neg_b) = (a & sign != 0, b & sign != 0);
    let ua = if neg_a { negate(a, width) } else { a };
    let ub = if neg_b { negate(b, width) } else { b };
    let q = if ub == 0 { width.mask() } else { ua / ub };
    if neg_a != neg_b {
        negate(q, width)
    } else {
        q
    }
}

fn srem(width: Width, a: u64, b: u64) -> u64 {
    let sign = width.sign_bit();
    let neg_a = a & sign != 0;
    let ua = if neg_a { negate(a, width) } else { a };
    let ub = if b & sign != 0 { negate(b, width) } else { b };
    let r = if ub == 0 { ua } else { ua % ub };
    if neg_a {
        negate(r, width)
    } else {
        r
    }
}

/// Applies a binary arithmetic or bitwise operator at the given width.
///
/// # Panics
///
/// Panics if `kind` is not a binary arithmetic operator.
pub fn binary(kind: Kind, width: Width, a: u64, b: u64) -> u64 {
    let mask = width.mask();
    let bits = width.bits() as u64;
    let (a, b) = (a & mask, b & mask);
    let res = match kind {
        Kind::Add => a.wrapping_add(b),
        Kind::Sub => a.wrapping_sub(b),
        Kind::Mul => a.wrapping_mul(b),
        Kind::UDiv => {
            if b == 0 {
                mask
            } else {
                a / b
            }
        }
        Kind::URem => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
        Kind::SDiv => sdiv(width, a, b),
        Kind::SRem => srem(width, a, b),
        Kind::And => a & b,
        Kind::Or => a | b,
        Kind::Xor => a ^ b,
        Kind::Shl => {
            if b >= bits {
                0
            } else {
                a << b
            }
        }
        Kind::LShr => {
            if b >= bits {
                0
            } else {
                a >> b
            }
        }
        Kind::AShr => {
            let s = to_signed(a, width);
            if b >= bits {
                if s < 0 {
                    mask
                } else {
                    0
                }
            } else {
                (s >> b) as u64
            }
        }
        _ => panic!("{} is not a binary arithmetic operator", kind),
    };
    res & mask
}

/// Applies a comparison operator to two values of the given width.
///
/// # Panics
///
/// Panics if `kind` is not a comparison.
pub fn compare(kind: Kind, width: Width, a: u64, b: u64) -> bool {
    let (a, b) = (a & width.mask(), b & width.mask());
    let (sa, sb) = (to_signed(a, width), to_signed(b, width));
    match kind {
        Kind::Eq => a == b,
        Kind::Ne => a != b,
        Kind::Ult => a < b,
        Kind::Ule => a <= b,
        Kind::Ugt => a > b,
        Kind::Uge => a >= b,
        Kind::Slt => sa < sb,
        Kind::Sle => sa <= sb,
        Kind::Sgt => sa > sb,
        Kind::Sge => sa >= sb,
        _ => panic!("{} is not a comparison", kind),
    }
}

/// Concrete contents of symbolic arrays, keyed by array name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    bytes: HashMap<String, Vec<u8>>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: assign the contents of an array.
    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.set(name, bytes);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.bytes.insert(name.into(), bytes.into());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.bytes.get(name).map(|v| v.as_slice())
    }

    /// Byte `index` of array `name`; unassigned bytes are zero.
    pub fn byte(&self, name: &str, index: u64) -> u8 {
        self.get(name)
            .and_then(|bytes| usize::try_from(index).ok().and_then(|i| bytes.get(i)))
            .copied()
            .unwrap_or(0)
    }
}

impl From<&Solution> for Assignment {
    fn from(solution: &Solution) -> Self {
        let mut assignment = Assignment::new();
        for (name, bytes) in solution.iter() {
            assignment.set(name, bytes);
        }
        assignment
    }
}

/// Evaluates expressions under a concrete [`Assignment`].
pub struct Evaluator<'a> {
    mgr: &'a ExprManager,
    assignment: &'a Assignment,
    cache: HashMap<ExprRef, u64>,
}

impl<'a> Evaluator<'a> {
    pub fn new(mgr: &'a ExprManager, assignment: &'a Assignment) -> Self {
        Self {
            mgr,
            assignment,
            cache: HashMap::new(),
        }
    }

    /// Returns the value of `e` in the low `width(e)` bits.
    pub fn evaluate(&mut self, e: ExprRef) -> u64 {
        if let Some(&v) = self.cache.get(&e) {
            return v;
        }

        let node = self.mgr.node(e);
        let res = match node.kind {
            Kind::Constant => node.value,
            Kind::Read => {
                let index = self.evaluate(node.kid(0));
                let array = self.mgr.array(ArrayId::new(node.value as u32));
                if index < array.size as u64 {
                    self.assignment.byte(&array.name, index) as u64
                } else {
                    0
                }
            }
            Kind::Select => {
                if self.evaluate(node.kid(0)) != 0 {
                    self.evaluate(node.kid(1))
                } else {
                    self.evaluate(node.kid(2))
                }
            }
            Kind::Concat => {
                let lsb_width = self.mgr.width(node.kid(1)).bits();
                let msb = self.evaluate(node.kid(0));
                let lsb = self.evaluate(node.kid(1));
                (msb << lsb_width) | lsb
            }
            Kind::Extract => self.evaluate(node.kid(0)) >> node.value,
            Kind::ZExt => self.evaluate(node.kid(0)),
            Kind::SExt => {
                let v = self.evaluate(node.kid(0));
                to_signed(v, self.mgr.width(node.kid(0))) as u64
            }
            Kind::Not => !self.evaluate(node.kid(0)),
            k if k.is_binary_arith() => {
                let a = self.evaluate(node.kid(0));
                let b = self.evaluate(node.kid(1));
                binary(k, node.width, a, b)
            }
            k => {
                debug_assert!(k.is_comparison());
                let a = self.evaluate(node.kid(0));
                let b = self.evaluate(node.kid(1));
                compare(k, self.mgr.width(node.kid(0)), a, b) as u64
            }
        };
        let res = res & node.width.mask();

        self.cache.insert(e, res);
        res
    }

    pub fn evaluate_bool(&mut self, e: ExprRef) -> bool {
        self.evaluate(e) != 0
    }
}
