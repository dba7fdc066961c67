//! Expression trees of the model forest.
//!
//! All trees of one generation run live in a single arena, the [`Forest`]. Nodes are
//! addressed by [`NodeId`]; children are stored as id lists and the parent link is an
//! optional id, so "is this the same node" is plain index equality.
//!
//! Every node caches structural metrics that the collectors rely on:
//!
//! - `label` / `strict_label`: canonical instruction labels (see [`crate::label`])
//! - `height`: 0 for leaves, otherwise 1 + the maximum child height
//! - `degree`: number of children
//! - `descendant_count`: number of nodes below this one
//! - `leaves`: the leaves below this node, sorted by id
//!
//! The metrics are maintained by [`Forest::add_child`], which propagates changes to all
//! ancestors, so they hold after every mutation.
//!
//! Trees are built from postfix instruction sequences with [`Forest::build`]. After
//! construction the children of commutative nodes are put in canonical order so that
//! trees that only differ in operand order of commutative operations become identical.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;

use itertools::Itertools;

use crate::embedding::Instance;
use crate::errors::TreeError;
use crate::instruction::Instruction;
use crate::label::{Context, PLACEHOLDER};
use crate::path::NodePath;
use crate::types::{Dimension, NodeId, StateId};

/// A node of an expression tree.
#[derive(Debug, Clone)]
pub struct Node {
    instruction: Instruction,
    state: StateId,
    label: u32,
    strict_label: u32,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    height: u32,
    descendant_count: u32,
    leaves: Vec<NodeId>,
    is_commutative: bool,
    dimension: Dimension,
    tree_id: u64,
    instance: Option<Instance>,
}

impl Node {
    fn new(state: StateId, instruction: Instruction, context: &mut Context) -> Self {
        let label = context.labels.label(&instruction);
        let strict_label = context.labels.strict_label(&instruction);

        Self {
            is_commutative: instruction.is_commutative(),
            dimension: instruction.dimension().unwrap_or_default(),
            instruction,
            state,
            label,
            strict_label,
            children: Vec::new(),
            parent: None,
            height: 0,
            descendant_count: 0,
            leaves: Vec::new(),
            tree_id: 0,
            instance: None,
        }
    }

    /// The node's own instruction. Embedded nodes keep their original instruction
    /// here; the embedding itself is attached as [`Node::instance`].
    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn strict_label(&self) -> u32 {
        self.strict_label
    }

    pub fn is_placeholder(&self) -> bool {
        self.label == PLACEHOLDER
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn degree(&self) -> u32 {
        self.children.len() as u32
    }

    pub fn descendant_count(&self) -> u32 {
        self.descendant_count
    }

    /// Leaves below this node, sorted by id. Empty for a leaf.
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_commutative(&self) -> bool {
        self.is_commutative
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Preorder number of the node within its tree.
    pub fn tree_id(&self) -> u64 {
        self.tree_id
    }

    /// The embedding instance wrapping this node, if any.
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn is_embedded(&self) -> bool {
        self.instance.is_some()
    }
}

/// Arena holding the expression trees of one generation run.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Index<NodeId> for Forest {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Roots of the trees, in the order they were built.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Root of the tree built for `state`.
    pub fn root_of(&self, state: StateId) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|root| self.nodes[root.0].state == state)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn set_instance(
        &mut self,
        id: NodeId,
        instance: Option<Instance>,
    ) -> Option<Instance> {
        std::mem::replace(&mut self.nodes[id.0].instance, instance)
    }

    fn alloc(&mut self, state: StateId, instruction: Instruction, context: &mut Context) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(state, instruction, context));
        id
    }

    /// Builds the tree for `state` from a postfix instruction sequence and registers it
    /// as a root of the forest.
    ///
    /// The tree is put in canonical order and numbered in preorder before it is returned.
    ///
    /// # Errors
    /// A sequence that needs more operands than available, or that does not reduce to
    /// exactly one expression, is malformed input and yields a [`TreeError`].
    pub fn build(
        &mut self,
        state: StateId,
        instructions: &[Instruction],
        context: &mut Context,
    ) -> Result<NodeId, TreeError> {
        let root = self.build_tree(state, instructions, context)?;

        self.sort(root);
        self.update_tree_id(root);
        self.roots.push(root);

        Ok(root)
    }

    fn build_tree(
        &mut self,
        state: StateId,
        instructions: &[Instruction],
        context: &mut Context,
    ) -> Result<NodeId, TreeError> {
        let mut stack: Vec<NodeId> = Vec::with_capacity(instructions.len());

        for (position, instruction) in instructions.iter().enumerate() {
            let arity = instruction.arity();

            if arity > stack.len() {
                return Err(TreeError::StackUnderflow {
                    state,
                    position,
                    needed: arity,
                    available: stack.len(),
                });
            }

            let children = stack.split_off(stack.len() - arity);
            let node = self.alloc(state, instruction.clone(), context);

            for child in children {
                self.add_child(node, child);
            }

            // Operator internals are inlined, delayed operators stay a data leaf
            if let Instruction::CustomOperator {
                delayed: false,
                expressions,
                ..
            } = instruction
            {
                for expression in expressions {
                    let sub = self.build_tree(state, expression, context)?;
                    self.add_child(node, sub);
                }
            }

            if instruction.dimension().is_none() {
                let dimension = self.nodes[node.0]
                    .children
                    .iter()
                    .map(|c| self.nodes[c.0].dimension)
                    .fold(Dimension::ONE, Dimension::broadcast);
                self.nodes[node.0].dimension = dimension;
            }

            stack.push(node);
        }

        match stack.len() {
            1 => Ok(stack[0]),
            remaining => Err(TreeError::Unbalanced { state, remaining }),
        }
    }

    /// Appends `child` to the children of `parent` and updates the metrics of `parent`
    /// and all of its ancestors.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let parent_was_leaf = self.nodes[parent.0].children.is_empty();

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);

        let added = self.nodes[child.0].descendant_count + 1;
        let new_leaves = if self.nodes[child.0].is_leaf() {
            vec![child]
        } else {
            self.nodes[child.0].leaves.clone()
        };

        let mut height = self.nodes[child.0].height + 1;
        let mut current = Some(parent);

        while let Some(id) = current {
            let node = &mut self.nodes[id.0];

            node.descendant_count += added;

            if height > node.height {
                node.height = height;
            }
            height = node.height + 1;

            // parent stops being a leaf of its ancestors
            if parent_was_leaf && id != parent {
                if let Ok(pos) = node.leaves.binary_search(&parent) {
                    node.leaves.remove(pos);
                }
            }

            for leaf in &new_leaves {
                if let Err(pos) = node.leaves.binary_search(leaf) {
                    node.leaves.insert(pos, *leaf);
                }
            }

            current = node.parent;
        }
    }

    /// Total order on subtrees: by label, then child count, then children pairwise.
    ///
    /// Data leaves all compare equal here, so `2 * x` and `x * 2` keep their operand
    /// order and need two arguments. Strict labels must not be used instead, they would
    /// split trees that only differ in data.
    pub fn compare(&self, a: NodeId, b: NodeId) -> Ordering {
        let (na, nb) = (&self.nodes[a.0], &self.nodes[b.0]);

        na.label
            .cmp(&nb.label)
            .then_with(|| na.children.len().cmp(&nb.children.len()))
            .then_with(|| {
                na.children
                    .iter()
                    .zip(&nb.children)
                    .map(|(ca, cb)| self.compare(*ca, *cb))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }

    /// Recursively reorders the children of commutative nodes into canonical order.
    pub fn sort(&mut self, id: NodeId) {
        for child in self.nodes[id.0].children.clone() {
            self.sort(child);
        }

        if !self.nodes[id.0].is_commutative {
            return;
        }

        let mut children = std::mem::take(&mut self.nodes[id.0].children);
        children.sort_by(|a, b| self.compare(*a, *b));
        self.nodes[id.0].children = children;
    }

    /// Assigns preorder numbers to the tree below `root`.
    pub fn update_tree_id(&mut self, root: NodeId) {
        for (tree_id, id) in self.preorder(root).into_iter().enumerate() {
            self.nodes[id.0].tree_id = tree_id as u64;
        }
    }

    /// `id` followed by all of its descendants, in preorder.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut ret = Vec::with_capacity(self.nodes[id.0].descendant_count as usize + 1);
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            ret.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev());
        }

        ret
    }

    /// All descendants of `id` in preorder, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut ret = self.preorder(id);
        ret.remove(0);
        ret
    }

    /// Nodes of the subtree at `id` (including `id`) for which `predicate` holds.
    pub fn collect_where<F>(&self, id: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.preorder(id)
            .into_iter()
            .filter(|n| predicate(&self.nodes[n.0]))
            .collect()
    }

    /// Root of the tree containing `id`.
    pub fn top(&self, id: NodeId) -> NodeId {
        let mut current = id;

        while let Some(parent) = self.nodes[current.0].parent {
            current = parent;
        }

        current
    }

    /// Path from `ancestor` down to `id`. If `ancestor` is not above `id` the path is
    /// relative to the root of the tree.
    pub fn rel_path(&self, id: NodeId, ancestor: NodeId) -> NodePath {
        let mut steps = Vec::new();
        let mut current = id;

        while current != ancestor {
            let Some(parent) = self.nodes[current.0].parent else {
                break;
            };

            let index = self.nodes[parent.0]
                .children
                .iter()
                .position(|c| *c == current)
                .unwrap_or_default();

            steps.push(index as u32);
            current = parent;
        }

        steps.reverse();
        NodePath::from(steps)
    }

    /// Path of `id` relative to the root of its tree.
    pub fn path(&self, id: NodeId) -> NodePath {
        self.rel_path(id, self.top(id))
    }

    /// Follows `path` down from `id`; `None` if a step is out of range.
    pub fn from_path(&self, id: NodeId, path: &NodePath) -> Option<NodeId> {
        path.iter().try_fold(id, |node, index| {
            self.nodes[node.0].children.get(index as usize).copied()
        })
    }

    /// Canonical serialization: label, dimension and children, recursively.
    ///
    /// Equal serializations mean equal shape and equal labels, i.e. the subtrees can be
    /// produced by one prototype with (possibly) different data at placeholder leaves.
    pub fn serialize(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        let children = node.children.iter().map(|c| self.serialize(*c)).join(", ");

        format!("{}[{}]({})", node.label, node.dimension, children)
    }

    /// Exact recursive equality of two subtrees, including the data at their leaves.
    pub fn same_subtree(&self, a: NodeId, b: NodeId) -> bool {
        let (na, nb) = (&self.nodes[a.0], &self.nodes[b.0]);

        na.strict_label == nb.strict_label
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(&nb.children)
                .all(|(ca, cb)| self.same_subtree(*ca, *cb))
    }

    /// Copies the subtree at `id` into a new forest holding it as its only root.
    pub fn extract(&self, id: NodeId) -> Forest {
        let mut ret = Forest::new();
        let root = self.copy_into(id, &mut ret);

        ret.update_tree_id(root);
        ret.roots.push(root);
        ret
    }

    fn copy_into(&self, id: NodeId, target: &mut Forest) -> NodeId {
        let source = &self.nodes[id.0];
        let copy = NodeId(target.nodes.len());

        target.nodes.push(Node {
            instruction: source.instruction.clone(),
            state: source.state,
            label: source.label,
            strict_label: source.strict_label,
            children: Vec::with_capacity(source.children.len()),
            parent: None,
            height: 0,
            descendant_count: 0,
            leaves: Vec::new(),
            is_commutative: source.is_commutative,
            dimension: source.dimension,
            tree_id: 0,
            instance: None,
        });

        for child in &source.children {
            let c = self.copy_into(*child, target);
            target.add_child(copy, c);
        }

        copy
    }

    /// Human readable form of the subtree at `id`, e.g. `[s0, *, (+, (?a, ?b)), ?c]`.
    pub fn render(&self, id: NodeId) -> NodeDisplay<'_> {
        NodeDisplay {
            forest: self,
            id,
            with_state: true,
        }
    }
}

/// Display adapter returned by [`Forest::render`].
pub struct NodeDisplay<'a> {
    forest: &'a Forest,
    id: NodeId,
    with_state: bool,
}

impl fmt::Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.forest[self.id];

        write!(f, "[")?;

        if self.with_state {
            write!(f, "{}, ", node.state)?;
        }

        match node.instance() {
            Some(instance) => write!(f, "{}", instance.embedding())?,
            None => write!(f, "{}", node.instruction)?,
        }

        if !node.children.is_empty() {
            let children = node.children.iter().map(|c| NodeDisplay {
                forest: self.forest,
                id: *c,
                with_state: false,
            });
            write!(f, ", ({})", children.format(", "))?;
        }

        write!(f, "]")
    }
}
