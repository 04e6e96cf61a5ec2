use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// A handle to an expression node owned by an [`ExprManager`][crate::expr::ExprManager].
///
/// Nodes are hash-consed, so two handles from the same manager are equal
/// exactly when they denote the same expression. Comparing handles is the
/// identity check used by the rewriter and its cache.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct ExprRef(u32);

impl ExprRef {
    /// Sentinel used to pad unused child slots.
    pub const INVALID: Self = Self(u32::MAX);

    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the storage index of the node.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl Display for ExprRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A reference to a BDD node, potentially negated.
///
/// Uses a 32-bit representation where the least significant bit indicates negation
/// and the remaining bits store the node index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Ref(u32);

impl Ref {
    pub const fn new(index: u32, negated: bool) -> Self {
        Self((index << 1) | (negated as u32))
    }

    pub const fn positive(index: u32) -> Self {
        Self::new(index, false)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0 >> 1
    }

    #[inline]
    pub const fn is_negated(self) -> bool {
        (self.0 & 1) != 0
    }

    /// Returns the non-negated version of this reference.
    pub const fn regular(self) -> Self {
        Self(self.0 & !1)
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0 ^ 1)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}
