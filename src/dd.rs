use std::fmt::{Display, Formatter};

use crate::backend::NodeId;

/// Node handle.
///
/// A `Dd` is a plain value: the id of the owning [`Context`][crate::context::Context],
/// the backend slot inside that context, and the backend-local node id. Copying
/// a `Dd` does not create a new reference. Ownership is tracked by the context:
/// every handle returned by an operation is owned by the caller and must be
/// given back exactly once through [`Context::release`][crate::context::Context::release]
/// (or through one of the consuming `..._with` operations).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Dd {
    pub(crate) context: u32,
    pub(crate) slot: u8,
    pub(crate) id: NodeId,
}

impl Dd {
    pub(crate) const fn new(context: u32, slot: u8, id: NodeId) -> Self {
        Self { context, slot, id }
    }

    /// Backend-local node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn context_id(&self) -> u32 {
        self.context
    }

    /// Index of the backend holding the node.
    pub fn slot(&self) -> u8 {
        self.slot
    }
}

impl Display for Dd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "dd#{}.{}:{}", self.context, self.slot, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Dd::new(3, 1, 42).to_string(), "dd#3.1:42");
    }

    #[test]
    fn test_equality_is_per_backend() {
        let a = Dd::new(0, 0, 2);
        assert_eq!(a, Dd::new(0, 0, 2));
        assert_ne!(a, Dd::new(0, 1, 2));
        assert_ne!(a, Dd::new(1, 0, 2));
    }
}
