//! Embeddings: reusable prototype subexpressions and the tree locations they replace.
//!
//! An [`Embedding`] starts out with a prototype and a list of *potential* argument paths
//! (the placeholder leaves of the prototype). Every instance added afterwards is compared
//! against the first one; positions where the data differs become real [`Argument`]s.
//! Positions that always hold the same data are merged onto one argument index, so the
//! generated function takes a single parameter for them.

use itertools::{EitherOrBoth, Itertools};
use tracing::trace;

use crate::errors::EmbeddingError;
use crate::path::NodePath;
use crate::tree::Forest;
use crate::types::{EmbeddingId, NodeId, StateId};

/// Marks a tree node as replaced by a call of an embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    embedding: EmbeddingId,
    state: StateId,
    embedded_ids: Vec<u64>,
}

impl Instance {
    pub fn embedding(&self) -> EmbeddingId {
        self.embedding
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    /// Sorted tree ids of the original nodes covered by the instance.
    pub fn embedded_ids(&self) -> &[u64] {
        &self.embedded_ids
    }

    /// Whether both instances claim a common original node.
    pub fn overlaps(&self, other: &Instance) -> bool {
        self.state == other.state
            && self
                .embedded_ids
                .iter()
                .merge_join_by(&other.embedded_ids, |a, b| a.cmp(b))
                .any(|pair| matches!(pair, EitherOrBoth::Both(..)))
    }
}

/// A confirmed argument position of an embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub path: NodePath,
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct Embedding {
    id: EmbeddingId,
    prototype: Forest,
    arguments: Vec<Argument>,
    instances: Vec<NodeId>,
    potential: Vec<NodePath>,
    next_index: u32,
    pure: bool,
    inline: bool,
}

impl Embedding {
    pub fn new(id: EmbeddingId, prototype: Forest, potential: Vec<NodePath>) -> Self {
        let pure = prototype
            .roots()
            .first()
            .is_some_and(|root| prototype[*root].dimension().is_one());

        Self {
            id,
            prototype,
            arguments: Vec::new(),
            instances: Vec::new(),
            potential,
            next_index: 0,
            pure,
            inline: false,
        }
    }

    /// Embedding whose prototype is a copy of the subtree at `node`, with every
    /// placeholder leaf below the root as a potential argument.
    pub fn from_node(id: EmbeddingId, forest: &Forest, node: NodeId) -> Self {
        let prototype = forest.extract(node);
        let root = prototype.roots()[0];

        let potential = prototype
            .collect_where(root, |n| n.is_placeholder())
            .into_iter()
            .filter(|n| *n != root)
            .map(|n| prototype.rel_path(n, root))
            .collect();

        Self::new(id, prototype, potential)
    }

    pub fn id(&self) -> EmbeddingId {
        self.id
    }

    /// The prototype expression as a standalone one-tree forest.
    pub fn prototype(&self) -> &Forest {
        &self.prototype
    }

    pub fn prototype_root(&self) -> NodeId {
        self.prototype.roots()[0]
    }

    /// Number of nodes below the prototype root.
    pub fn descendant_count(&self) -> u32 {
        self.prototype[self.prototype_root()].descendant_count()
    }

    /// Whether the prototype evaluates to a scalar.
    pub fn is_pure(&self) -> bool {
        self.pure
    }

    pub fn set_pure(&mut self, pure: bool) {
        self.pure = pure;
    }

    /// Whether code emission should expand calls in place instead of calling a function.
    pub fn is_inline(&self) -> bool {
        self.inline
    }

    pub fn set_inline(&mut self, inline: bool) {
        self.inline = inline;
    }

    /// Confirmed arguments, sorted by index. Merged positions share an index.
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Number of distinct argument indices.
    pub fn arguments_count(&self) -> u32 {
        self.next_index
    }

    /// Paths that have been identical in every instance so far.
    pub fn potential(&self) -> &[NodePath] {
        &self.potential
    }

    pub fn instances(&self) -> &[NodeId] {
        &self.instances
    }

    pub fn instances_count(&self) -> usize {
        self.instances.len()
    }

    /// The first argument of every index, in index order.
    pub fn ordered_arguments(&self) -> Vec<&Argument> {
        self.arguments
            .iter()
            .dedup_by(|a, b| a.index == b.index)
            .collect()
    }

    /// Subtree roots passed for each argument index when `instance` is called.
    pub fn call_arguments(&self, forest: &Forest, instance: NodeId) -> Vec<NodeId> {
        self.ordered_arguments()
            .into_iter()
            .filter_map(|argument| forest.from_path(instance, &argument.path))
            .collect()
    }

    /// Wraps `node` as an instance of this embedding and adds it.
    ///
    /// # Errors
    /// [`EmbeddingError::AlreadyEmbedded`] if another embedding already claimed the node.
    pub fn embed(&mut self, forest: &mut Forest, node: NodeId) -> Result<NodeId, EmbeddingError> {
        if let Some(instance) = forest[node].instance() {
            return Err(EmbeddingError::AlreadyEmbedded {
                node,
                other: instance.embedding(),
            });
        }

        let mut embedded_ids: Vec<u64> = forest
            .preorder(node)
            .into_iter()
            .map(|n| forest[n].tree_id())
            .collect();
        embedded_ids.sort_unstable();

        let instance = Instance {
            embedding: self.id,
            state: forest[node].state(),
            embedded_ids,
        };
        forest.set_instance(node, Some(instance));

        self.add(forest, node)
    }

    /// Appends an already wrapped instance and updates the arguments.
    ///
    /// Returns the added node.
    pub fn add(&mut self, forest: &Forest, node: NodeId) -> Result<NodeId, EmbeddingError> {
        match forest[node].instance() {
            None => {
                return Err(EmbeddingError::NotAnInstance {
                    embedding: self.id,
                    node,
                })
            }
            Some(instance) if instance.embedding() != self.id => {
                return Err(EmbeddingError::AlreadyEmbedded {
                    node,
                    other: instance.embedding(),
                })
            }
            Some(_) if self.instances.contains(&node) => {
                return Err(EmbeddingError::AlreadyEmbedded {
                    node,
                    other: self.id,
                })
            }
            Some(_) => {}
        }

        self.instances.push(node);

        if self.instances.len() > 1 {
            self.verify(forest, node);
        }

        Ok(node)
    }

    fn verify(&mut self, forest: &Forest, node: NodeId) {
        let first = self.instances[0];

        let (mut pending, potential): (Vec<NodePath>, Vec<NodePath>) =
            std::mem::take(&mut self.potential)
                .into_iter()
                .partition(|path| !same_at(forest, first, node, path, path));
        self.potential = potential;

        // Merged groups must still agree now that another instance exists
        let indices: Vec<u32> = self.arguments.iter().map(|a| a.index).dedup().collect();

        for index in indices {
            let mut members = self.arguments.iter().filter(|a| a.index == index);
            let Some(anchor) = members.next().map(|a| a.path.clone()) else {
                continue;
            };

            let detached: Vec<NodePath> = members
                .filter(|a| !same_at(forest, node, node, &anchor, &a.path))
                .map(|a| a.path.clone())
                .collect();

            self.arguments
                .retain(|a| a.index != index || !detached.contains(&a.path));
            pending.extend(detached);
        }

        for path in pending {
            self.assign(forest, path);
        }
    }

    /// Merges `path` onto an index whose members agree with it in every instance, or
    /// allocates the next index.
    fn assign(&mut self, forest: &Forest, path: NodePath) {
        let merge = self
            .arguments
            .iter()
            .map(|a| a.index)
            .dedup()
            .find(|index| {
                self.arguments
                    .iter()
                    .filter(|a| a.index == *index)
                    .all(|a| self.agrees(forest, &a.path, &path))
            });

        let index = match merge {
            Some(index) => index,
            None => {
                self.next_index += 1;
                self.next_index - 1
            }
        };

        trace!(embedding = %self.id, path = %path, index, "argument");

        let at = self.arguments.partition_point(|a| a.index <= index);
        self.arguments.insert(at, Argument { path, index });
    }

    fn agrees(&self, forest: &Forest, a: &NodePath, b: &NodePath) -> bool {
        self.instances
            .iter()
            .all(|instance| same_at(forest, *instance, *instance, a, b))
    }

    /// Whether any instance of `self` claims an original node also claimed by `other`.
    pub fn conflicts(&self, other: &Embedding, forest: &Forest) -> bool {
        let claimed = |embedding: &Embedding| {
            embedding
                .instances
                .iter()
                .filter_map(|n| forest[*n].instance().cloned())
                .collect::<Vec<_>>()
        };

        let theirs = claimed(other);

        claimed(self)
            .iter()
            .any(|a| theirs.iter().any(|b| a.overlaps(b)))
    }

    /// Detaches every instance and returns the nodes that were released.
    pub fn revert(&mut self, forest: &mut Forest) -> Vec<NodeId> {
        let removed = std::mem::take(&mut self.instances);

        for node in &removed {
            forest.set_instance(*node, None);
        }

        removed
    }
}

/// Exact equality of the subtree at `a_path` below `a` and the one at `b_path` below `b`.
fn same_at(forest: &Forest, a: NodeId, b: NodeId, a_path: &NodePath, b_path: &NodePath) -> bool {
    match (forest.from_path(a, a_path), forest.from_path(b, b_path)) {
        (Some(x), Some(y)) => forest.same_subtree(x, y),
        _ => false,
    }
}
