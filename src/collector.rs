//! Common subexpression collection.
//!
//! A [`Collector`] scans the forest for repeated subexpressions and turns every group of
//! repetitions into an [`Embedding`]. The embeddings are gathered in a [`CollectorResult`],
//! which also keeps the per-state index of embedded nodes that code emission uses to
//! find call sites.

use indexmap::IndexMap;
use tracing::debug;

use crate::embedding::Embedding;
use crate::errors::EmbeddingError;
use crate::tree::{Forest, Node};
use crate::types::{EmbeddingId, NodeId, StateId};

/// A strategy for finding repeated subexpressions.
pub trait Collector {
    /// Collects embeddings over every tree of `forest`. Embedded nodes are marked in
    /// the forest.
    fn collect(&mut self, forest: &mut Forest) -> Result<CollectorResult, EmbeddingError>;
}

/// Which subtrees are big enough to be worth a function of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    /// Minimum number of nodes of a candidate subtree, root included
    pub minimum: u32,
    /// Custom function calls are collected regardless of their size
    pub exempt_custom_calls: bool,
}

impl SizePolicy {
    pub fn new(minimum: u32, exempt_custom_calls: bool) -> Self {
        Self {
            minimum,
            exempt_custom_calls,
        }
    }

    pub fn admits(&self, node: &Node) -> bool {
        node.descendant_count() + 1 >= self.minimum
            || (self.exempt_custom_calls && node.instruction().is_custom_function())
    }
}

/// Embeddings found by a collector.
#[derive(Debug, Clone, Default)]
pub struct CollectorResult {
    embeddings: IndexMap<EmbeddingId, Embedding>,
    states: IndexMap<StateId, Vec<NodeId>>,
    next_id: u32,
}

impl CollectorResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn get(&self, id: EmbeddingId) -> Option<&Embedding> {
        self.embeddings.get(&id)
    }

    /// Embeddings in the order they were collected.
    pub fn embeddings(&self) -> impl Iterator<Item = &Embedding> {
        self.embeddings.values()
    }

    /// Creates one embedding prototyped on `members[0]` and embeds every member.
    pub fn embed_group(
        &mut self,
        forest: &mut Forest,
        members: &[NodeId],
    ) -> Result<EmbeddingId, EmbeddingError> {
        let id = EmbeddingId(self.next_id);
        self.next_id += 1;

        let mut embedding = Embedding::from_node(id, forest, members[0]);

        for member in members {
            let node = embedding.embed(forest, *member)?;
            self.states
                .entry(forest[node].state())
                .or_default()
                .push(node);
        }

        debug!(
            embedding = %id,
            instances = embedding.instances_count(),
            arguments = embedding.arguments_count(),
            size = embedding.descendant_count() + 1,
            "collected"
        );

        self.embeddings.insert(id, embedding);
        Ok(id)
    }

    /// Reverts and drops an embedding; its nodes leave the state index.
    pub fn remove(&mut self, forest: &mut Forest, id: EmbeddingId) -> Option<Embedding> {
        let mut embedding = self.embeddings.shift_remove(&id)?;

        for node in embedding.revert(forest) {
            if let Some(nodes) = self.states.get_mut(&forest[node].state()) {
                nodes.retain(|n| *n != node);
            }
        }

        self.states.retain(|_, nodes| !nodes.is_empty());
        Some(embedding)
    }

    /// Embedded nodes of `state`.
    pub fn instances_of(&self, state: StateId) -> &[NodeId] {
        self.states.get(&state).map(Vec::as_slice).unwrap_or_default()
    }

    /// The embedded node replacing the whole equation of `state`, if any.
    pub fn replacement(&self, forest: &Forest, state: StateId) -> Option<NodeId> {
        self.instances_of(state)
            .iter()
            .copied()
            .find(|n| forest[*n].parent().is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BuiltinOperator, Instruction};
    use crate::tree::tests::{forest_of, op, var};

    #[test]
    fn test_size_policy() {
        let (forest, roots) = forest_of(&[
            vec![var("a"), var("b"), op(BuiltinOperator::Plus)],
            vec![var("a"), Instruction::custom_function("f", 1)],
        ]);

        let strict = SizePolicy::new(3, false);
        let exempt = SizePolicy::new(3, true);

        assert!(strict.admits(&forest[roots[0]]));
        assert!(!strict.admits(&forest[roots[1]]));
        assert!(exempt.admits(&forest[roots[1]]));
    }

    #[test]
    fn test_remove_updates_state_index() -> Result<(), Box<dyn std::error::Error>> {
        let sum = vec![var("a"), var("b"), op(BuiltinOperator::Plus)];
        let (mut forest, roots) = forest_of(&[sum.clone(), sum]);

        let mut result = CollectorResult::new();
        let id = result.embed_group(&mut forest, &roots)?;

        assert_eq!(result.len(), 1);
        assert_eq!(result.replacement(&forest, StateId(0)), Some(roots[0]));
        assert_eq!(result.instances_of(StateId(1)), &[roots[1]]);

        let removed = result.remove(&mut forest, id).ok_or("missing embedding")?;
        assert_eq!(removed.instances_count(), 0);
        assert!(result.is_empty());
        assert!(result.instances_of(StateId(0)).is_empty());
        assert_eq!(result.replacement(&forest, StateId(1)), None);
        assert!(!forest[roots[0]].is_embedded());

        Ok(())
    }
}
