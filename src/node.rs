use std::fmt;

use crate::reference::ExprRef;
use crate::types::Width;

/// Operator kind of an expression node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Kind {
    Constant,
    /// One byte of a symbolic array at a (possibly symbolic) index.
    Read,
    Select,
    Concat,
    Extract,
    ZExt,
    SExt,

    // Arithmetic
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,

    // Bitwise
    Not,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,

    // Comparison
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl Kind {
    pub const ALL: [Kind; 31] = [
        Kind::Constant,
        Kind::Read,
        Kind::Select,
        Kind::Concat,
        Kind::Extract,
        Kind::ZExt,
        Kind::SExt,
        Kind::Add,
        Kind::Sub,
        Kind::Mul,
        Kind::UDiv,
        Kind::SDiv,
        Kind::URem,
        Kind::SRem,
        Kind::Not,
        Kind::And,
        Kind::Or,
        Kind::Xor,
        Kind::Shl,
        Kind::LShr,
        Kind::AShr,
        Kind::Eq,
        Kind::Ne,
        Kind::Ult,
        Kind::Ule,
        Kind::Ugt,
        Kind::Uge,
        Kind::Slt,
        Kind::Sle,
        Kind::Sgt,
        Kind::Sge,
    ];

    /// Number of children a node of this kind has.
    pub const fn arity(self) -> usize {
        match self {
            Kind::Constant => 0,
            Kind::Read | Kind::Extract | Kind::ZExt | Kind::SExt | Kind::Not => 1,
            Kind::Select => 3,
            _ => 2,
        }
    }

    /// Binary operators whose result has the width of their operands.
    pub const fn is_binary_arith(self) -> bool {
        matches!(
            self,
            Kind::Add
                | Kind::Sub
                | Kind::Mul
                | Kind::UDiv
                | Kind::SDiv
                | Kind::URem
                | Kind::SRem
                | Kind::And
                | Kind::Or
                | Kind::Xor
                | Kind::Shl
                | Kind::LShr
                | Kind::AShr
        )
    }

    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Kind::Eq | Kind::Ne | Kind::Ult | Kind::Ule | Kind::Ugt | Kind::Uge | Kind::Slt | Kind::Sle | Kind::Sgt | Kind::Sge
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Kind::Constant => "Constant",
            Kind::Read => "Read",
            Kind::Select => "Select",
            Kind::Concat => "Concat",
            Kind::Extract => "Extract",
            Kind::ZExt => "ZExt",
            Kind::SExt => "SExt",
            Kind::Add => "Add",
            Kind::Sub => "Sub",
            Kind::Mul => "Mul",
            Kind::UDiv => "UDiv",
            Kind::SDiv => "SDiv",
            Kind::URem => "URem",
            Kind::SRem => "SRem",
            Kind::Not => "Not",
            Kind::And => "And",
            Kind::Or => "Or",
            Kind::Xor => "Xor",
            Kind::Shl => "Shl",
            Kind::LShr => "LShr",
            Kind::AShr => "AShr",
            Kind::Eq => "Eq",
            Kind::Ne => "Ne",
            Kind::Ult => "Ult",
            Kind::Ule => "Ule",
            Kind::Ugt => "Ugt",
            Kind::Uge => "Uge",
            Kind::Slt => "Slt",
            Kind::Sle => "Sle",
            Kind::Sgt => "Sgt",
            Kind::Sge => "Sge",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable expression node.
///
/// `value` is the payload of the leaf-like kinds: the constant bits for
/// [`Kind::Constant`], the bit offset for [`Kind::Extract`] and the array
/// index for [`Kind::Read`]. It is zero for every other kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Node {
    pub kind: Kind,
    pub width: Width,
    pub value: u64,
    kids: [ExprRef; 3],
}

impl Node {
    pub(crate) fn new(kind: Kind, width: Width, value: u64, kids: &[ExprRef]) -> Self {
        assert_eq!(
            kids.len(),
            kind.arity(),
            "{} expects {} children, got {}",
            kind,
            kind.arity(),
            kids.len()
        );
        let mut slots = [ExprRef::INVALID; 3];
        slots[..kids.len()].copy_from_slice(kids);
        Self {
            kind,
            width,
            value,
            kids: slots,
        }
    }

    /// Children in operand order.
    pub fn kids(&self) -> &[ExprRef] {
        &self.kids[..self.kind.arity()]
    }

    pub fn kid(&self, i: usize) -> ExprRef {
        self.kids()[i]
    }

    pub fn is_constant(&self) -> bool {
        self.kind == Kind::Constant
    }
}
