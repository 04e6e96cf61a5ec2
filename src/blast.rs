//! Bit-blasting expressions into BDDs, and the BDD-backed [`Solver`].
//!
//! Every expression of width `W` becomes a vector of `W` BDDs, least
//! significant bit first. Array bits are BDD variables, interleaved by bit
//! position so that equal positions of different arrays sit next to each
//! other in the variable order:
//!
//! ```text
//! var(array, byte, bit) = 1 + (8 * byte + bit) * num_arrays + array
//! ```
//!
//! The circuits follow the concrete semantics in [`eval`][crate::eval] bit for
//! bit, including division by zero and over-wide shifts.

use std::collections::HashMap;

use log::debug;

use crate::bdd::Bdd;
use crate::constraints::ConstraintSet;
use crate::error::SolverError;
use crate::expr::ExprManager;
use crate::node::Kind;
use crate::reference::{ExprRef, Ref};
use crate::solver::{Query, Solution, Solver};
use crate::types::{ArrayId, Width};

type Bits = Vec<Ref>;

pub struct BitBlaster<'a> {
    mgr: &'a ExprManager,
    bdd: &'a Bdd,
    cache: HashMap<ExprRef, Bits>,
    num_arrays: u32,
    max_nodes: usize,
}

impl<'a> BitBlaster<'a> {
    pub fn new(mgr: &'a ExprManager, bdd: &'a Bdd, max_nodes: usize) -> Self {
        Self {
            mgr,
            bdd,
            cache: HashMap::new(),
            num_arrays: mgr.num_arrays() as u32,
            max_nodes,
        }
    }

    /// BDD variable of one bit of an array.
    pub fn var(&self, array: ArrayId, byte: u32, bit: u32) -> u32 {
        1 + (8 * byte + bit) * self.num_arrays + array.index() as u32
    }

    /// Inverse of [`BitBlaster::var`]: `(array, byte, bit)`.
    pub fn decode_var(&self, v: u32) -> (usize, u32, u32) {
        let v = v - 1;
        let array = (v % self.num_arrays) as usize;
        let pos = v / self.num_arrays;
        (array, pos / 8, pos % 8)
    }

    fn check_limit(&self) -> Result<(), SolverError> {
        if self.bdd.num_nodes() > self.max_nodes {
            debug!("node limit of {} exceeded", self.max_nodes);
            return Err(SolverError::NodeLimit { limit: self.max_nodes });
        }
        Ok(())
    }

    /// Blasts a boolean expression into a single BDD.
    pub fn blast_bool(&mut self, e: ExprRef) -> Result<Ref, SolverError> {
        assert!(self.mgr.width(e).is_bool(), "Expected a boolean expression, got {}", self.mgr.width(e));
        Ok(self.blast(e)?[0])
    }

    pub fn blast(&mut self, e: ExprRef) -> Result<Bits, SolverError> {
        if let Some(bits) = self.cache.get(&e) {
            return Ok(bits.clone());
        }

        let node = self.mgr.node(e);
        let w = node.width.bits() as usize;
        let res = match node.kind {
            Kind::Constant => (0..w).map(|i| self.bdd.constant((node.value >> i) & 1 == 1)).collect(),
            Kind::Read => {
                let index = self.blast(node.kid(0))?;
                let index_width = self.mgr.width(node.kid(0));
                self.read(ArrayId::new(node.value as u32), &index, index_width)
            }
            Kind::Select => {
                let c = self.blast(node.kid(0))?[0];
                let t = self.blast(node.kid(1))?;
                let f = self.blast(node.kid(2))?;
                self.mux(c, &t, &f)
            }
            Kind::Concat => {
                let msb = self.blast(node.kid(0))?;
                let mut bits = self.blast(node.kid(1))?;
                bits.extend(msb);
                bits
            }
            Kind::Extract => {
                let bits = self.blast(node.kid(0))?;
                let offset = node.value as usize;
                bits[offset..offset + w].to_vec()
            }
            Kind::ZExt => {
                let mut bits = self.blast(node.kid(0))?;
                bits.resize(w, self.bdd.zero);
                bits
            }
            Kind::SExt => {
                let mut bits = self.blast(node.kid(0))?;
                let sign = bits[bits.len() - 1];
                bits.resize(w, sign);
                bits
            }
            Kind::Not => self.blast(node.kid(0))?.into_iter().map(|b| -b).collect(),
            kind => {
                let a = self.blast(node.kid(0))?;
                let b = self.blast(node.kid(1))?;
                self.binary(kind, &a, &b)
            }
        };
        debug_assert_eq!(res.len(), w);

        self.check_limit()?;
        self.cache.insert(e, res.clone());
        Ok(res)
    }

    fn binary(&self, kind: Kind, a: &[Ref], b: &[Ref]) -> Bits {
        let bdd = self.bdd;
        match kind {
            Kind::Add => self.add(a, b, bdd.zero),
            Kind::Sub => self.sub(a, b),
            Kind::Mul => self.mul(a, b),
            Kind::UDiv => self.udivrem(a, b).0,
            Kind::URem => self.udivrem(a, b).1,
            Kind::SDiv => self.sdivrem(a, b).0,
            Kind::SRem => self.sdivrem(a, b).1,
            Kind::And => zip_with(a, b, |x, y| bdd.apply_and(x, y)),
            Kind::Or => zip_with(a, b, |x, y| bdd.apply_or(x, y)),
            Kind::Xor => zip_with(a, b, |x, y| bdd.apply_xor(x, y)),
            Kind::Shl | Kind::LShr | Kind::AShr => self.shift(kind, a, b),
            Kind::Eq => vec![self.eq(a, b)],
            Kind::Ne => vec![-self.eq(a, b)],
            Kind::Ult => vec![self.ult(a, b)],
            Kind::Ule => vec![-self.ult(b, a)],
            Kind::Ugt => vec![self.ult(b, a)],
            Kind::Uge => vec![-self.ult(a, b)],
            Kind::Slt => vec![self.slt(a, b)],
            Kind::Sle => vec![-self.slt(b, a)],
            Kind::Sgt => vec![self.slt(b, a)],
            Kind::Sge => vec![-self.slt(a, b)],
            _ => unreachable!("{} is not a binary operator", kind),
        }
    }

    fn read(&self, array: ArrayId, index: &[Ref], index_width: Width) -> Bits {
        let bdd = self.bdd;
        let size = self.mgr.array(array).size;
        let byte_bits = |byte: u32| -> Bits { (0..8).map(|bit| bdd.mk_var(self.var(array, byte, bit))).collect() };

        let mut res = vec![bdd.zero; 8];
        for byte in 0..size {
            if byte as u64 > index_width.mask() {
                break;
            }
            let hit = self.eq(index, &self.constant(byte as u64, index.len()));
            if bdd.is_zero(hit) {
                continue;
            }
            res = self.mux(hit, &byte_bits(byte), &res);
        }
        res
    }

    fn constant(&self, value: u64, width: usize) -> Bits {
        (0..width).map(|i| self.bdd.constant((value >> i) & 1 == 1)).collect()
    }

    fn mux(&self, c: Ref, t: &[Ref], f: &[Ref]) -> Bits {
        zip_with(t, f, |x, y| self.bdd.apply_ite(c, x, y))
    }

    /// Ripple-carry adder.
    fn add(&self, a: &[Ref], b: &[Ref], carry_in: Ref) -> Bits {
        let bdd = self.bdd;
        let mut carry = carry_in;
        let mut res = Vec::with_capacity(a.len());
        for (&x, &y) in a.iter().zip(b) {
            let half = bdd.apply_xor(x, y);
            res.push(bdd.apply_xor(half, carry));
            carry = bdd.apply_or(bdd.apply_and(x, y), bdd.apply_and(half, carry));
        }
        res
    }

    fn sub(&self, a: &[Ref], b: &[Ref]) -> Bits {
        let not_b: Bits = b.iter().map(|&y| -y).collect();
        self.add(a, &not_b, self.bdd.one)
    }

    fn neg(&self, a: &[Ref]) -> Bits {
        let zero = vec![self.bdd.zero; a.len()];
        self.sub(&zero, a)
    }

    /// Shift-and-add multiplier, truncated to the operand width.
    fn mul(&self, a: &[Ref], b: &[Ref]) -> Bits {
        let bdd = self.bdd;
        let w = a.len();
        let mut acc = vec![bdd.zero; w];
        for (i, &bi) in b.iter().enumerate() {
            if bdd.is_zero(bi) {
                continue;
            }
            let partial: Bits = (0..w)
                .map(|j| if j < i { bdd.zero } else { bdd.apply_and(bi, a[j - i]) })
                .collect();
            acc = self.add(&acc, &partial, bdd.zero);
        }
        acc
    }

    /// Restoring division. A zero divisor yields all ones and the dividend.
    fn udivrem(&self, a: &[Ref], b: &[Ref]) -> (Bits, Bits) {
        let bdd = self.bdd;
        let w = a.len();
        let mut divisor = b.to_vec();
        divisor.push(bdd.zero);

        let mut quot = vec![bdd.zero; w];
        let mut rem = vec![bdd.zero; w + 1];
        for i in (0..w).rev() {
            rem.pop();
            rem.insert(0, a[i]);
            let ge = -self.ult(&rem, &divisor);
            quot[i] = ge;
            let diff = self.sub(&rem, &divisor);
            rem = self.mux(ge, &diff, &rem);
        }
        rem.truncate(w);
        (quot, rem)
    }

    /// Signed division and remainder, truncating towards zero.
    fn sdivrem(&self, a: &[Ref], b: &[Ref]) -> (Bits, Bits) {
        let bdd = self.bdd;
        let w = a.len();
        let (neg_a, neg_b) = (a[w - 1], b[w - 1]);
        let abs_a = self.mux(neg_a, &self.neg(a), a);
        let abs_b = self.mux(neg_b, &self.neg(b), b);
        let (q, r) = self.udivrem(&abs_a, &abs_b);
        let q = self.mux(bdd.apply_xor(neg_a, neg_b), &self.neg(&q), &q);
        let r = self.mux(neg_a, &self.neg(&r), &r);
        (q, r)
    }

    /// Barrel shifter; amounts of `w` or more produce the fill value.
    fn shift(&self, kind: Kind, a: &[Ref], amount: &[Ref]) -> Bits {
        let bdd = self.bdd;
        let w = a.len();
        let fill = match kind {
            Kind::AShr => a[w - 1],
            _ => bdd.zero,
        };

        let mut cur = a.to_vec();
        let mut stage = 0;
        while (1usize << stage) < w {
            let k = 1usize << stage;
            let shifted: Bits = (0..w)
                .map(|j| match kind {
                    Kind::Shl => {
                        if j >= k {
                            cur[j - k]
                        } else {
                            bdd.zero
                        }
                    }
                    _ => {
                        if j + k < w {
                            cur[j + k]
                        } else {
                            fill
                        }
                    }
                })
                .collect();
            cur = self.mux(amount[stage], &shifted, &cur);
            stage += 1;
        }

        let too_big = -self.ult(amount, &self.constant(w as u64, w));
        let fill = vec![fill; w];
        self.mux(too_big, &fill, &cur)
    }

    fn eq(&self, a: &[Ref], b: &[Ref]) -> Ref {
        let bdd = self.bdd;
        bdd.apply_and_many(a.iter().zip(b).map(|(&x, &y)| bdd.apply_eq(x, y)))
    }

    /// Unsigned `a < b`, decided by the most significant differing bit.
    fn ult(&self, a: &[Ref], b: &[Ref]) -> Ref {
        let bdd = self.bdd;
        let mut lt = bdd.zero;
        for (&x, &y) in a.iter().zip(b) {
            lt = bdd.apply_ite(bdd.apply_xor(x, y), y, lt);
        }
        lt
    }

    fn slt(&self, a: &[Ref], b: &[Ref]) -> Ref {
        let w = a.len();
        let mut a = a.to_vec();
        let mut b = b.to_vec();
        a[w - 1] = -a[w - 1];
        b[w - 1] = -b[w - 1];
        self.ult(&a, &b)
    }
}

fn zip_with(a: &[Ref], b: &[Ref], f: impl Fn(Ref, Ref) -> Ref) -> Bits {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BddSolverConfig {
    /// Upper bound on the number of BDD nodes built for a single query.
    pub max_nodes: usize,
}

impl Default for BddSolverConfig {
    fn default() -> Self {
        Self { max_nodes: 1 << 20 }
    }
}

/// A complete solver that decides queries by building their BDDs.
///
/// Each call starts from a fresh BDD. Queries whose diagrams outgrow
/// [`BddSolverConfig::max_nodes`] fail with [`SolverError::NodeLimit`].
#[derive(Debug, Default)]
pub struct BddSolver {
    config: BddSolverConfig,
}

impl BddSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BddSolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> BddSolverConfig {
        self.config
    }

    fn conjunction(&self, blaster: &mut BitBlaster<'_>, bdd: &Bdd, exprs: impl IntoIterator<Item = ExprRef>) -> Result<Ref, SolverError> {
        let mut f = bdd.one;
        for e in exprs {
            let g = blaster.blast_bool(e)?;
            f = bdd.apply_and(f, g);
            blaster.check_limit()?;
            if bdd.is_zero(f) {
                break;
            }
        }
        Ok(f)
    }
}

impl Solver for BddSolver {
    fn may_be_true(&mut self, mgr: &ExprManager, query: &Query) -> Result<bool, SolverError> {
        let bdd = Bdd::new();
        let mut blaster = BitBlaster::new(mgr, &bdd, self.config.max_nodes);
        let f = self.conjunction(&mut blaster, &bdd, query.constraints.iter().chain([query.expr]))?;
        let res = !bdd.is_zero(f);
        debug!(
            "may_be_true({}) -> {} ({} constraints, {} BDD nodes)",
            query.expr,
            res,
            query.constraints.len(),
            bdd.num_nodes()
        );
        Ok(res)
    }

    fn concrete_model(&mut self, mgr: &ExprManager, constraints: &ConstraintSet) -> Result<Solution, SolverError> {
        let bdd = Bdd::new();
        let mut blaster = BitBlaster::new(mgr, &bdd, self.config.max_nodes);
        let f = self.conjunction(&mut blaster, &bdd, constraints.iter())?;
        let path = bdd.one_sat(f).ok_or(SolverError::Unsatisfiable)?;

        let arrays = mgr.arrays();
        let mut bytes: Vec<Vec<u8>> = arrays.iter().map(|a| vec![0; a.size as usize]).collect();
        for (v, value) in path {
            if !value {
                continue;
            }
            let (array, byte, bit) = blaster.decode_var(v);
            bytes[array][byte as usize] |= 1 << bit;
        }

        Ok(arrays.into_iter().map(|a| a.name).zip(bytes).collect())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::eval::{self, Assignment, Evaluator};

    const W8: Width = Width::INT8;

    /// Checks that the blasted circuit of `kind` agrees with the concrete
    /// semantics on every pair of operands.
    fn check_binary(kind: Kind, width: Width, pairs: &[(u64, u64)]) {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", width);
        let y = mgr.mk_symbolic("y", width);
        let e = mgr.mk_binary(kind, x, y);

        let bdd = Bdd::new();
        let mut blaster = BitBlaster::new(&mgr, &bdd, 1 << 22);
        let bits = blaster.blast(e).unwrap();
        let bytes = width.bits() as usize / 8;

        for &(a, b) in pairs {
            let assignment = Assignment::new()
                .with("x", a.to_le_bytes()[..bytes].to_vec())
                .with("y", b.to_le_bytes()[..bytes].to_vec());
            let mut values = HashMap::new();
            for (id, v) in [(ArrayId::new(0), a), (ArrayId::new(1), b)] {
                for i in 0..width.bits() {
                    values.insert(blaster.var(id, i / 8, i % 8), (v >> i) & 1 == 1);
                }
            }

            let got = bits
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, &bit)| acc | ((evaluate(&bdd, bit, &values) as u64) << i));
            let expected = Evaluator::new(&mgr, &assignment).evaluate(e);
            assert_eq!(got, expected, "{} {:#x} {:#x}", kind, a, b);
        }
    }

    fn pairs(samples: &[u64]) -> Vec<(u64, u64)> {
        samples.iter().flat_map(|&a| samples.iter().map(move |&b| (a, b))).collect()
    }

    /// Evaluates a BDD under a complete assignment.
    fn evaluate(bdd: &Bdd, f: Ref, values: &HashMap<u32, bool>) -> bool {
        let mut node = f;
        while !bdd.is_terminal(node) {
            let v = bdd.variable(node.index());
            node = if values[&v] { bdd.high_node(node) } else { bdd.low_node(node) };
        }
        bdd.is_one(node)
    }

    #[test]
    fn test_var_order() {
        let mgr = ExprManager::new();
        mgr.mk_array("a", 2);
        mgr.mk_array("b", 2);
        let bdd = Bdd::new();
        let blaster = BitBlaster::new(&mgr, &bdd, 100);
        assert_eq!(blaster.var(ArrayId::new(0), 0, 0), 1);
        assert_eq!(blaster.var(ArrayId::new(1), 0, 0), 2);
        assert_eq!(blaster.var(ArrayId::new(0), 0, 1), 3);
        assert_eq!(blaster.var(ArrayId::new(1), 1, 7), 32);
        assert_eq!(blaster.decode_var(32), (1, 1, 7));
    }

    #[test]
    fn test_agrees_with_evaluator() {
        let pairs = pairs(&[0, 1, 2, 3, 0x7f, 0x80, 0x81, 0xc3, 0xfe, 0xff]);
        for kind in Kind::ALL {
            if kind.is_binary_arith() || kind.is_comparison() {
                check_binary(kind, W8, &pairs);
            }
        }
    }

    #[test]
    fn test_shift_amounts() {
        for kind in [Kind::Shl, Kind::LShr, Kind::AShr] {
            let pairs: Vec<_> = [0, 1, 5, 7, 8, 9, 15, 16, 200].iter().map(|&r| (0x96, r)).collect();
            check_binary(kind, W8, &pairs);
        }
    }

    #[test]
    fn test_wider_arithmetic() {
        let pairs = [(0xffff, 1), (0x1234, 0x00ff), (0x8000, 0xffff), (0x0100, 0x0100), (0x00f0, 0x0004)];
        for kind in [Kind::Add, Kind::Sub, Kind::Ult, Kind::Slt, Kind::Shl, Kind::AShr] {
            check_binary(kind, Width::INT16, &pairs);
        }
    }

    #[test]
    fn test_may_be_true() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let c10 = mgr.mk_const(10, W8);
        let c5 = mgr.mk_const(5, W8);
        let mut constraints = ConstraintSet::new();
        constraints.push(mgr.mk_ult(x, c10));

        let mut solver = BddSolver::new();
        assert!(solver.may_be_true(&mgr, &Query::new(&constraints, mgr.mk_ugt(x, c5))).unwrap());
        assert!(!solver.may_be_true(&mgr, &Query::new(&constraints, mgr.mk_ugt(x, c10))).unwrap());
    }

    #[test]
    fn test_concrete_model() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", Width::INT16);
        mgr.mk_symbolic("y", W8);
        let mut constraints = ConstraintSet::new();
        constraints.push(mgr.mk_eq(x, mgr.mk_const(0x1234, Width::INT16)));

        let solution = BddSolver::new().concrete_model(&mgr, &constraints).unwrap();
        assert_eq!(solution.get("x"), Some(&[0x34, 0x12][..]));
        // Unconstrained arrays are reported as zeros.
        assert_eq!(solution.get("y"), Some(&[0][..]));

        let assignment = Assignment::from(&solution);
        let mut eval = Evaluator::new(&mgr, &assignment);
        assert!(constraints.iter().all(|c| eval.evaluate_bool(c)));
    }

    #[test]
    fn test_unsatisfiable_model() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let mut constraints = ConstraintSet::new();
        constraints.push(mgr.mk_ult(x, mgr.mk_const(3, W8)));
        constraints.push(mgr.mk_ugt(x, mgr.mk_const(3, W8)));
        let err = BddSolver::new().concrete_model(&mgr, &constraints).unwrap_err();
        assert_eq!(err, SolverError::Unsatisfiable);
    }

    #[test]
    fn test_symbolic_read() {
        let mgr = ExprManager::new();
        let buf = mgr.mk_array("buf", 4);
        let i = mgr.mk_symbolic("i", W8);
        let read = mgr.mk_read(buf, i);
        let mut constraints = ConstraintSet::new();
        constraints.push(mgr.mk_eq(read, mgr.mk_const(0xab, W8)));
        constraints.push(mgr.mk_ne(i, mgr.mk_const(0, W8)));

        let solution = BddSolver::new().concrete_model(&mgr, &constraints).unwrap();
        let assignment = Assignment::from(&solution);
        let mut eval = Evaluator::new(&mgr, &assignment);
        assert_eq!(eval.evaluate(read), 0xab);
        assert!((1..4).contains(&eval.evaluate(i)));
    }

    #[test]
    fn test_read_out_of_bounds_is_zero() {
        let mgr = ExprManager::new();
        let buf = mgr.mk_array("buf", 2);
        let i = mgr.mk_symbolic("i", W8);
        let read = mgr.mk_read(buf, i);
        let mut constraints = ConstraintSet::new();
        constraints.push(mgr.mk_uge(i, mgr.mk_const(2, W8)));
        let query = Query::new(&constraints, mgr.mk_ne(read, mgr.mk_const(0, W8)));
        assert!(!BddSolver::new().may_be_true(&mgr, &query).unwrap());
    }

    #[test]
    fn test_node_limit() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", Width::INT16);
        let y = mgr.mk_symbolic("y", Width::INT16);
        let e = mgr.mk_eq(mgr.mk_mul(x, y), mgr.mk_const(0x1234, Width::INT16));
        let constraints = ConstraintSet::new();
        let mut solver = BddSolver::with_config(BddSolverConfig { max_nodes: 64 });
        let err = solver.may_be_true(&mgr, &Query::new(&constraints, e)).unwrap_err();
        assert_eq!(err, SolverError::NodeLimit { limit: 64 });
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval::binary(Kind::UDiv, W8, 5, 0), 0xff);
        let pairs = [(5, 0), (0x80, 0), (0x7f, 0), (0, 0)];
        for kind in [Kind::UDiv, Kind::URem, Kind::SDiv, Kind::SRem] {
            check_binary(kind, W8, &pairs);
        }
    }
}
