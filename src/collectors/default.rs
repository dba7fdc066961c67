//! Collector grouping subtrees by their canonical serialization.

use indexmap::IndexMap;
use tracing::{info, instrument};

use crate::collector::{Collector, CollectorResult, SizePolicy};
use crate::errors::EmbeddingError;
use crate::tree::Forest;
use crate::types::NodeId;

/// Finds repeated subtrees by serializing every inner node of the forest.
///
/// Two subtrees land in the same group iff they have the same shape and the same labels,
/// so they only differ in the data at their placeholder leaves.
#[derive(Debug, Clone)]
pub struct DefaultCollector {
    policy: SizePolicy,
}

impl DefaultCollector {
    pub fn new(policy: SizePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SizePolicy {
        self.policy
    }
}

impl Default for DefaultCollector {
    fn default() -> Self {
        Self::new(SizePolicy::new(3, true))
    }
}

impl Collector for DefaultCollector {
    #[instrument(skip_all, name = "default_collect", fields(trees = forest.roots().len()))]
    fn collect(&mut self, forest: &mut Forest) -> Result<CollectorResult, EmbeddingError> {
        let mut groups: IndexMap<String, Vec<NodeId>> = IndexMap::new();

        for root in forest.roots() {
            for node in forest.preorder(*root) {
                let n = &forest[node];

                if n.is_leaf() || !self.policy.admits(n) {
                    continue;
                }

                groups.entry(forest.serialize(node)).or_default().push(node);
            }
        }

        let mut result = CollectorResult::new();

        for members in groups.values().filter(|m| m.len() >= 2) {
            result.embed_group(forest, members)?;
        }

        info!(
            groups = groups.len(),
            embeddings = result.len(),
            "serialization grouping done"
        );

        Ok(result)
    }
}
