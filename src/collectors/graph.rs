//! Collector based on bottom-up DAG minimization of the whole forest.
//!
//! Every tree of the forest is folded into one shared DAG: leaves first, then each node
//! as soon as all of its children are mapped. A node is mapped onto an existing DAG node
//! with the same label and the same mapped children, or gets a new DAG node. DAG nodes
//! are created in non-decreasing height order, so the search for a match walks backwards
//! and stops at the first node of lower height.
//!
//! Every inner DAG node with two or more originals is a repeated subexpression.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use tracing::{info, instrument, trace};

use crate::collector::{Collector, CollectorResult, SizePolicy};
use crate::errors::EmbeddingError;
use crate::tree::Forest;
use crate::types::NodeId;

#[derive(Debug, Clone)]
struct DagNode {
    label: Option<u32>,
    height: u32,
    children: Vec<usize>,
    originals: Vec<NodeId>,
}

/// The minimal DAG of a forest together with the mapping from tree nodes onto it.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    nodes: Vec<DagNode>,
    mapping: HashMap<NodeId, usize>,
}

impl Dag {
    /// Number of DAG nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tree nodes mapped onto DAG node `index`, in mapping order.
    pub fn originals(&self, index: usize) -> &[NodeId] {
        &self.nodes[index].originals
    }

    /// DAG node a tree node was mapped onto.
    pub fn mapped(&self, node: NodeId) -> Option<usize> {
        self.mapping.get(&node).copied()
    }

    pub fn height(&self, index: usize) -> u32 {
        self.nodes[index].height
    }

    fn push(&mut self, label: Option<u32>, height: u32, children: Vec<usize>) -> usize {
        self.nodes.push(DagNode {
            label,
            height,
            children,
            originals: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn find(&self, label: Option<u32>, height: u32, children: &[usize]) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .rev()
            .take_while(|(_, d)| d.height == height)
            .find(|(_, d)| d.label == label && d.children == children)
            .map(|(index, _)| index)
    }
}

/// Finds repeated subtrees through the minimal DAG of the forest.
#[derive(Debug, Clone)]
pub struct GraphCollector {
    policy: SizePolicy,
    labeled: bool,
    dag: Dag,
}

impl GraphCollector {
    /// In unlabeled mode labels are ignored during minimization, so all leaves share
    /// one DAG node.
    pub fn new(policy: SizePolicy, labeled: bool) -> Self {
        Self {
            policy,
            labeled,
            dag: Dag::default(),
        }
    }

    /// The DAG built by the last collection.
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    fn minimize(&mut self, forest: &Forest) {
        let mut dag = Dag::default();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut unresolved: HashMap<NodeId, usize> = HashMap::new();
        let mut leaves: HashMap<Option<u32>, usize> = HashMap::new();

        for root in forest.roots() {
            for node in forest.preorder(*root) {
                match forest[node].children().len() {
                    0 => queue.push_back(node),
                    degree => {
                        unresolved.insert(node, degree);
                    }
                }
            }
        }

        while let Some(node) = queue.pop_front() {
            let n = &forest[node];
            let label = self.labeled.then(|| n.label());

            let index = if n.is_leaf() {
                *leaves
                    .entry(label)
                    .or_insert_with(|| dag.push(label, 0, Vec::new()))
            } else {
                let children: Vec<usize> = n
                    .children()
                    .iter()
                    .filter_map(|c| dag.mapped(*c))
                    .collect();

                match dag.find(label, n.height(), &children) {
                    Some(index) => index,
                    None => dag.push(label, n.height(), children),
                }
            };

            trace!(node = %node, dag = index, "mapped");

            dag.nodes[index].originals.push(node);
            dag.mapping.insert(node, index);

            if let Some(parent) = n.parent() {
                if let Some(count) = unresolved.get_mut(&parent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(parent);
                    }
                }
            }
        }

        self.dag = dag;
    }
}

impl Collector for GraphCollector {
    #[instrument(skip_all, name = "graph_collect", fields(labeled = self.labeled))]
    fn collect(&mut self, forest: &mut Forest) -> Result<CollectorResult, EmbeddingError> {
        self.minimize(forest);

        let mut result = CollectorResult::new();

        for dag_node in self.dag.nodes.iter().filter(|d| d.height > 0) {
            if dag_node.originals.len() < 2 {
                continue;
            }

            // Unlabeled matches may still differ in their operations
            let mut groups: IndexMap<String, Vec<NodeId>> = IndexMap::new();

            for original in &dag_node.originals {
                if self.policy.admits(&forest[*original]) {
                    groups
                        .entry(forest.serialize(*original))
                        .or_default()
                        .push(*original);
                }
            }

            for members in groups.values().filter(|m| m.len() >= 2) {
                result.embed_group(forest, members)?;
            }
        }

        info!(
            nodes = forest.len(),
            dag = self.dag.len(),
            embeddings = result.len(),
            "dag minimization done"
        );

        Ok(result)
    }
}
