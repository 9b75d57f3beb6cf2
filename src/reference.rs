use std::fmt::{Display, Formatter};
use std::ops::Neg;

use crate::backend::NodeId;

/// Backend-local reference to a node: the table index shifted left by one,
/// with the lowest bit marking a complemented edge.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Ref(u32);

impl Ref {
    pub const INVALID: Ref = Ref(0);

    pub const fn positive(index: u32) -> Self {
        Self(index << 1)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }

    pub const fn negate(self) -> Self {
        Self(self.0 ^ 1)
    }

    /// The same node without the complement mark.
    pub const fn regular(self) -> Self {
        Self(self.0 & !1)
    }

    /// Index of the node in the unique table.
    pub const fn index(self) -> usize {
        (self.0 >> 1) as usize
    }

    /// Conditionally complement.
    pub const fn xor(self, negate: bool) -> Self {
        Self(self.0 ^ negate as u32)
    }

    pub const fn id(self) -> NodeId {
        self.0 as NodeId
    }

    pub fn from_id(id: NodeId) -> Self {
        Self(id as u32)
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            if self.is_negated() { "~" } else { "" },
            self.index()
        )
    }
}
