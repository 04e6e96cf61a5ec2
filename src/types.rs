//! Type-safe wrappers for bit-widths and symbolic arrays.
//!
//! This module provides newtype wrappers that keep widths and array handles
//! apart from the plain integers they are built from, so a bit offset cannot
//! be passed where a width is expected.
use std::fmt;

/// A bit-width of an expression.
///
/// # Invariants
///
/// - Widths are in the range `1..=64`
/// - Width 1 is the boolean width (see [`Width::BOOL`])
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Width(u32);

impl Width {
    pub const BOOL: Width = Width(1);
    pub const INT8: Width = Width(8);
    pub const INT16: Width = Width(16);
    pub const INT32: Width = Width(32);
    pub const INT64: Width = Width(64);

    /// Creates a new width of `bits` bits.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not in `1..=64`.
    pub fn new(bits: u32) -> Self {
        assert!((1..=64).contains(&bits), "Width must be in the range 1..=64, got {}", bits);
        Width(bits)
    }

    /// Returns the number of bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_bool(self) -> bool {
        self.0 == 1
    }

    /// Mask with the low `bits` bits set, i.e. the all-ones value of this width.
    pub const fn mask(self) -> u64 {
        if self.0 == 64 {
            u64::MAX
        } else {
            (1 << self.0) - 1
        }
    }

    /// The sign bit of this width, which is also the bit pattern of the
    /// most negative signed value.
    pub const fn sign_bit(self) -> u64 {
        1 << (self.0 - 1)
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

impl From<Width> for u32 {
    fn from(width: Width) -> Self {
        width.0
    }
}

/// A handle to a symbolic byte array registered in an
/// [`ExprManager`][crate::expr::ExprManager].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ArrayId(u32);

impl ArrayId {
    pub(crate) const fn new(index: u32) -> Self {
        ArrayId(index)
    }

    /// Returns the registration index of the array.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn raw(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for ArrayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arr{}", self.0)
    }
}
