use std::fmt;

/// Index of a node inside a [`Forest`](crate::tree::Forest) arena.
///
/// Node ids are only meaningful for the forest that allocated them. Equality of two
/// ids is the arena equivalent of reference equality between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Identifier of a model state (one equation / one tree of the forest).
///
/// States are owned by the host model; the core only uses the id to group
/// instances, detect conflicts and address storage slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u32);

/// Identifier of an [`Embedding`](crate::embedding::Embedding) within one collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmbeddingId(pub u32);

/// Result dimension of an expression (rows x columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub rows: u32,
    pub columns: u32,
}

impl Dimension {
    /// A scalar, 1x1.
    pub const ONE: Dimension = Dimension {
        rows: 1,
        columns: 1,
    };

    pub fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }

    pub fn is_one(&self) -> bool {
        *self == Self::ONE
    }

    /// Element-wise result dimension of combining `self` with `other`.
    ///
    /// Scalars broadcast against anything; otherwise the left operand wins.
    pub fn broadcast(self, other: Dimension) -> Dimension {
        if self.is_one() {
            other
        } else {
            self
        }
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for EmbeddingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.columns)
    }
}
