//! Expression manager: the node construction facility.
//!
//! All expressions live in one hash-consing [`Storage`] owned by the
//! [`ExprManager`]. Builders validate arity and widths (violations are
//! programming errors and panic), fold operators whose operands are all
//! constants, and otherwise return the unique node for the requested
//! structure.

use std::cell::RefCell;
use std::fmt::{Debug, Write as _};

use log::debug;

use crate::eval;
use crate::node::{Kind, Node};
use crate::reference::ExprRef;
use crate::storage::Storage;
use crate::types::{ArrayId, Width};

/// A named symbolic byte array.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Array {
    pub name: String,
    pub size: u32,
}

pub struct ExprManager {
    storage: RefCell<Storage<Node>>,
    arrays: RefCell<Vec<Array>>,
}

impl Default for ExprManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ExprManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExprManager")
            .field("nodes", &self.storage.borrow().size())
            .field("arrays", &self.arrays.borrow().len())
            .finish()
    }
}

impl ExprManager {
    pub fn new() -> Self {
        Self {
            storage: RefCell::new(Storage::new()),
            arrays: RefCell::new(Vec::new()),
        }
    }

    /// Number of distinct nodes created so far.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().size()
    }

    pub fn node(&self, e: ExprRef) -> Node {
        self.storage.borrow().value(e.index() as u32)
    }

    pub fn kind(&self, e: ExprRef) -> Kind {
        self.node(e).kind
    }

    pub fn width(&self, e: ExprRef) -> Width {
        self.node(e).width
    }

    pub fn is_constant(&self, e: ExprRef) -> bool {
        self.node(e).is_constant()
    }

    pub fn constant_value(&self, e: ExprRef) -> Option<u64> {
        let node = self.node(e);
        node.is_constant().then_some(node.value)
    }

    /// Returns the truth value of a constant boolean expression.
    pub fn as_bool(&self, e: ExprRef) -> Option<bool> {
        let node = self.node(e);
        (node.is_constant() && node.width.is_bool()).then_some(node.value != 0)
    }

    fn intern(&self, node: Node) -> ExprRef {
        ExprRef::new(self.storage.borrow_mut().put(node))
    }
}

// Arrays
impl ExprManager {
    /// Registers a symbolic byte array of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if an array with the same name already exists.
    pub fn mk_array(&self, name: impl Into<String>, size: u32) -> ArrayId {
        let name = name.into();
        let mut arrays = self.arrays.borrow_mut();
        assert!(
            arrays.iter().all(|a| a.name != name),
            "Array '{}' is already registered",
            name
        );
        let id = ArrayId::new(arrays.len() as u32);
        debug!("mk_array(name = {}, size = {}) -> {}", name, size, id);
        arrays.push(Array { name, size });
        id
    }

    pub fn array(&self, id: ArrayId) -> Array {
        self.arrays.borrow()[id.index()].clone()
    }

    /// All registered arrays, in registration order.
    pub fn arrays(&self) -> Vec<Array> {
        self.arrays.borrow().clone()
    }

    pub fn num_arrays(&self) -> usize {
        self.arrays.borrow().len()
    }

    /// Registers a fresh `width / 8`-byte array and returns its contents as a
    /// little-endian value.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not a multiple of 8.
    pub fn mk_symbolic(&self, name: impl Into<String>, width: Width) -> ExprRef {
        assert_eq!(width.bits() % 8, 0, "Symbolic values must have a byte-multiple width, got {}", width);
        let bytes = width.bits() / 8;
        let array = self.mk_array(name, bytes);
        let mut res = self.mk_read(array, self.mk_const(0, Width::INT32));
        for i in 1..bytes {
            let byte = self.mk_read(array, self.mk_const(i as u64, Width::INT32));
            res = self.mk_concat(byte, res);
        }
        res
    }
}

// Builders
impl ExprManager {
    /// Creates a constant. Bits above `width` are discarded.
    pub fn mk_const(&self, value: u64, width: Width) -> ExprRef {
        self.intern(Node::new(Kind::Constant, width, value & width.mask(), &[]))
    }

    pub fn mk_bool(&self, value: bool) -> ExprRef {
        self.mk_const(value as u64, Width::BOOL)
    }

    /// One byte of `array` at `index`.
    pub fn mk_read(&self, array: ArrayId, index: ExprRef) -> ExprRef {
        assert!(array.index() < self.num_arrays(), "Unknown array {}", array);
        self.intern(Node::new(Kind::Read, Width::INT8, array.raw(), &[index]))
    }

    pub fn mk_select(&self, cond: ExprRef, then: ExprRef, other: ExprRef) -> ExprRef {
        assert!(self.width(cond).is_bool(), "Select condition must be boolean");
        let width = self.width(then);
        assert_eq!(width, self.width(other), "Select branches must have equal widths");
        match self.as_bool(cond) {
            Some(true) => return then,
            Some(false) => return other,
            None => {}
        }
        if then == other {
            return then;
        }
        self.intern(Node::new(Kind::Select, width, 0, &[cond, then, other]))
    }

    /// Concatenation with `msb` in the high bits.
    pub fn mk_concat(&self, msb: ExprRef, lsb: ExprRef) -> ExprRef {
        let (msb_width, lsb_width) = (self.width(msb), self.width(lsb));
        let width = Width::new(msb_width.bits() + lsb_width.bits());
        if let (Some(a), Some(b)) = (self.constant_value(msb), self.constant_value(lsb)) {
            return self.mk_const((a << lsb_width.bits()) | b, width);
        }
        self.intern(Node::new(Kind::Concat, width, 0, &[msb, lsb]))
    }

    /// Extracts `width` bits of `e` starting at bit `offset`.
    pub fn mk_extract(&self, e: ExprRef, offset: u32, width: Width) -> ExprRef {
        let src = self.width(e);
        assert!(
            offset + width.bits() <= src.bits(),
            "Extract of {} bits at offset {} is out of range for {}",
            width.bits(),
            offset,
            src
        );
        if offset == 0 && width == src {
            return e;
        }
        if let Some(v) = self.constant_value(e) {
            return self.mk_const(v >> offset, width);
        }
        self.intern(Node::new(Kind::Extract, width, offset as u64, &[e]))
    }

    pub fn mk_zext(&self, e: ExprRef, width: Width) -> ExprRef {
        let src = self.width(e);
        assert!(width >= src, "Cannot zero-extend {} to {}", src, width);
        if width == src {
            return e;
        }
        if let Some(v) = self.constant_value(e) {
            return self.mk_const(v, width);
        }
        self.intern(Node::new(Kind::ZExt, width, 0, &[e]))
    }

    pub fn mk_sext(&self, e: ExprRef, width: Width) -> ExprRef {
        let src = self.width(e);
        assert!(width >= src, "Cannot sign-extend {} to {}", src, width);
        if width == src {
            return e;
        }
        if let Some(v) = self.constant_value(e) {
            return self.mk_const(eval::to_signed(v, src) as u64, width);
        }
        self.intern(Node::new(Kind::SExt, width, 0, &[e]))
    }

    pub fn mk_not(&self, e: ExprRef) -> ExprRef {
        let width = self.width(e);
        if let Some(v) = self.constant_value(e) {
            return self.mk_const(!v, width);
        }
        self.intern(Node::new(Kind::Not, width, 0, &[e]))
    }

    /// Builds a binary arithmetic, bitwise or comparison node.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not binary or the operand widths differ.
    pub fn mk_binary(&self, kind: Kind, left: ExprRef, right: ExprRef) -> ExprRef {
        assert!(
            kind.is_binary_arith() || kind.is_comparison(),
            "{} is not a binary operator",
            kind
        );
        let width = self.width(left);
        assert_eq!(
            width,
            self.width(right),
            "Operands of {} must have equal widths",
            kind
        );

        let (lv, rv) = (self.constant_value(left), self.constant_value(right));

        if kind.is_comparison() {
            if let (Some(a), Some(b)) = (lv, rv) {
                return self.mk_bool(eval::compare(kind, width, a, b));
            }
            return self.intern(Node::new(kind, Width::BOOL, 0, &[left, right]));
        }

        if let (Some(a), Some(b)) = (lv, rv) {
            return self.mk_const(eval::binary(kind, width, a, b), width);
        }

        let ones = width.mask();
        match kind {
            Kind::And => {
                if lv == Some(0) || rv == Some(ones) {
                    return left;
                }
                if rv == Some(0) || lv == Some(ones) {
                    return right;
                }
            }
            Kind::Or => {
                if lv == Some(0) || rv == Some(ones) {
                    return right;
                }
                if rv == Some(0) || lv == Some(ones) {
                    return left;
                }
            }
            _ => {}
        }

        self.intern(Node::new(kind, width, 0, &[left, right]))
    }

    pub fn mk_add(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Add, l, r)
    }
    pub fn mk_sub(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Sub, l, r)
    }
    pub fn mk_mul(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Mul, l, r)
    }
    pub fn mk_udiv(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::UDiv, l, r)
    }
    pub fn mk_sdiv(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::SDiv, l, r)
    }
    pub fn mk_urem(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::URem, l, r)
    }
    pub fn mk_srem(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::SRem, l, r)
    }
    pub fn mk_and(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::And, l, r)
    }
    pub fn mk_or(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Or, l, r)
    }
    pub fn mk_xor(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Xor, l, r)
    }
    pub fn mk_shl(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Shl, l, r)
    }
    pub fn mk_lshr(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::LShr, l, r)
    }
    pub fn mk_ashr(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::AShr, l, r)
    }
    pub fn mk_eq(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Eq, l, r)
    }
    pub fn mk_ne(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Ne, l, r)
    }
    pub fn mk_ult(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Ult, l, r)
    }
    pub fn mk_ule(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Ule, l, r)
    }
    pub fn mk_ugt(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Ugt, l, r)
    }
    pub fn mk_uge(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Uge, l, r)
    }
    pub fn mk_slt(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Slt, l, r)
    }
    pub fn mk_sle(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Sle, l, r)
    }
    pub fn mk_sgt(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Sgt, l, r)
    }
    pub fn mk_sge(&self, l: ExprRef, r: ExprRef) -> ExprRef {
        self.mk_binary(Kind::Sge, l, r)
    }

    /// Rebuilds `e` over new children, keeping its kind, width and payload.
    ///
    /// The new children must have the widths of the old ones.
    pub fn rebuild(&self, e: ExprRef, kids: &[ExprRef]) -> ExprRef {
        let node = self.node(e);
        assert_eq!(
            kids.len(),
            node.kind.arity(),
            "{} expects {} children, got {}",
            node.kind,
            node.kind.arity(),
            kids.len()
        );
        match node.kind {
            Kind::Constant => e,
            Kind::Read => self.mk_read(ArrayId::new(node.value as u32), kids[0]),
            Kind::Select => self.mk_select(kids[0], kids[1], kids[2]),
            Kind::Concat => self.mk_concat(kids[0], kids[1]),
            Kind::Extract => self.mk_extract(kids[0], node.value as u32, node.width),
            Kind::ZExt => self.mk_zext(kids[0], node.width),
            Kind::SExt => self.mk_sext(kids[0], node.width),
            Kind::Not => self.mk_not(kids[0]),
            kind => self.mk_binary(kind, kids[0], kids[1]),
        }
    }
}

// Printing
impl ExprManager {
    /// Renders `e` as an s-expression, e.g. `(Add w32 (Read w8 x (w32 0x0)) (w32 0x1))`.
    pub fn to_sexpr(&self, e: ExprRef) -> String {
        let mut out = String::new();
        self.write_sexpr(e, &mut out);
        out
    }

    fn write_sexpr(&self, e: ExprRef, out: &mut String) {
        let node = self.node(e);
        match node.kind {
            Kind::Constant => {
                let _ = write!(out, "({} {:#x})", node.width, node.value);
            }
            Kind::Read => {
                let array = self.array(ArrayId::new(node.value as u32));
                let _ = write!(out, "(Read {} {} ", node.width, array.name);
                self.write_sexpr(node.kid(0), out);
                out.push(')');
            }
            Kind::Extract => {
                let _ = write!(out, "(Extract {} {} ", node.width, node.value);
                self.write_sexpr(node.kid(0), out);
                out.push(')');
            }
            kind => {
                let _ = write!(out, "({} {}", kind, node.width);
                for &kid in node.kids() {
                    out.push(' ');
                    self.write_sexpr(kid, out);
                }
                out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    const W8: Width = Width::INT8;
    const W32: Width = Width::INT32;

    #[test]
    fn test_hash_consing() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W32);
        let y = mgr.mk_symbolic("y", W32);
        let a = mgr.mk_add(x, y);
        let b = mgr.mk_add(x, y);
        assert_eq!(a, b);
        assert_ne!(a, mgr.mk_add(y, x));
        assert_eq!(mgr.kind(a), Kind::Add);
        assert_eq!(mgr.width(a), W32);
    }

    #[test]
    fn test_symbolic_layout() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", Width::INT16);
        let node = mgr.node(x);
        assert_eq!(node.kind, Kind::Concat);
        assert_eq!(mgr.to_sexpr(x), "(Concat w16 (Read w8 x (w32 0x1)) (Read w8 x (w32 0x0)))");

        let b = mgr.mk_symbolic("b", W8);
        assert_eq!(mgr.kind(b), Kind::Read);
        assert_eq!(mgr.arrays().len(), 2);
        assert_eq!(mgr.array(ArrayId::new(1)).size, 1);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_array() {
        let mgr = ExprManager::new();
        mgr.mk_array("a", 4);
        mgr.mk_array("a", 4);
    }

    #[test]
    fn test_constant_folding() {
        let mgr = ExprManager::new();
        let a = mgr.mk_const(200, W8);
        let b = mgr.mk_const(100, W8);
        assert_eq!(mgr.constant_value(mgr.mk_add(a, b)), Some(44));
        assert_eq!(mgr.as_bool(mgr.mk_ult(b, a)), Some(true));
        assert_eq!(mgr.as_bool(mgr.mk_slt(b, a)), Some(false));
        assert_eq!(mgr.constant_value(mgr.mk_sext(a, Width::INT16)), Some(0xffc8));
        assert_eq!(mgr.constant_value(mgr.mk_concat(a, b)), Some(0xc864));
        assert_eq!(mgr.constant_value(mgr.mk_not(b)), Some(0x9b));
        assert_eq!(mgr.mk_const(0x1ff, W8), mgr.mk_const(0xff, W8));
    }

    #[test]
    fn test_bitwise_simplification() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let zero = mgr.mk_const(0, W8);
        let ones = mgr.mk_const(0xff, W8);
        assert_eq!(mgr.mk_and(x, zero), zero);
        assert_eq!(mgr.mk_and(ones, x), x);
        assert_eq!(mgr.mk_or(zero, x), x);
        assert_eq!(mgr.mk_or(x, ones), ones);
        assert_eq!(mgr.kind(mgr.mk_xor(x, zero)), Kind::Xor);
    }

    #[test]
    fn test_select_folding() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let y = mgr.mk_symbolic("y", W8);
        assert_eq!(mgr.mk_select(mgr.mk_bool(true), x, y), x);
        assert_eq!(mgr.mk_select(mgr.mk_bool(false), x, y), y);
        let c = mgr.mk_eq(x, y);
        assert_eq!(mgr.kind(mgr.mk_select(c, x, y)), Kind::Select);
        assert_eq!(mgr.mk_select(c, x, x), x);
    }

    #[test]
    fn test_extract_and_extend() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W32);
        assert_eq!(mgr.mk_extract(x, 0, W32), x);
        assert_eq!(mgr.mk_zext(x, W32), x);
        let hi = mgr.mk_extract(x, 24, W8);
        assert_eq!(mgr.to_sexpr(hi).split(' ').take(3).collect::<Vec<_>>(), ["(Extract", "w8", "24"]);
        assert_eq!(mgr.width(mgr.mk_sext(hi, Width::INT64)), Width::INT64);
    }

    #[test]
    #[should_panic(expected = "must have equal widths")]
    fn test_width_mismatch() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W32);
        let y = mgr.mk_symbolic("y", W8);
        mgr.mk_add(x, y);
    }

    #[test]
    fn test_rebuild() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W32);
        let y = mgr.mk_symbolic("y", W32);
        let z = mgr.mk_symbolic("z", W32);
        let e = mgr.mk_mul(x, y);
        assert_eq!(mgr.rebuild(e, &[x, z]), mgr.mk_mul(x, z));
        assert_eq!(mgr.rebuild(e, &[x, y]), e);

        let c = mgr.mk_const(3, W32);
        assert_eq!(mgr.rebuild(c, &[]), c);

        let ext = mgr.mk_extract(x, 8, W8);
        let rebuilt = mgr.rebuild(ext, &[y]);
        assert_eq!(mgr.node(rebuilt).value, 8);
        assert_eq!(mgr.node(rebuilt).kid(0), y);
    }

    #[test]
    fn test_sexpr() {
        let mgr = ExprManager::new();
        let x = mgr.mk_symbolic("x", W8);
        let e = mgr.mk_add(x, mgr.mk_const(0x1f, W8));
        assert_eq!(mgr.to_sexpr(e), "(Add w8 (Read w8 x (w32 0x0)) (w8 0x1f))");
    }
}
