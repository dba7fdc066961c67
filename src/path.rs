use std::fmt;

/// Position of a node relative to one of its ancestors.
///
/// The path lists child indices from the ancestor downwards; the empty path addresses
/// the ancestor itself. Paths are the stable way to talk about "the same position" in
/// several instances of one prototype.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<u32>);

impl NodePath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, index: u32) {
        self.0.push(index);
    }

    /// Path of the `index`th child of the node addressed by `self`.
    pub fn child(&self, index: u32) -> NodePath {
        let mut ret = self.clone();
        ret.push(index);
        ret
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<u32>> for NodePath {
    fn from(steps: Vec<u32>) -> Self {
        Self(steps)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join(":"))
    }
}
