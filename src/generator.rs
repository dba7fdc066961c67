//! The generation pipeline.
//!
//! A [`Generator`] runs the stages strictly in order:
//!
//! 1. build one canonical tree per equation
//! 2. collect repeated subexpressions with the configured [`Collector`]
//! 3. resolve conflicts with the configured [`Filter`]
//! 4. register every target state in the data table
//! 5. batch whole-equation calls of each embedding into an index [`Loop`]
//!
//! Every run starts from a fresh [`Context`], so label assignments never leak between
//! runs. A run either returns a complete [`Generation`] or fails as a whole.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use colored::Colorize;
use indexmap::IndexMap;
use tracing::{info, instrument};

use crate::collector::{Collector, CollectorResult, SizePolicy};
use crate::collectors::default::DefaultCollector;
use crate::collectors::graph::GraphCollector;
use crate::errors::{ConfigError, GenerateError, TreeError};
use crate::filter::{Filter, GreedyFilter, OptimalFilter};
use crate::instruction::Instruction;
use crate::label::Context;
use crate::loops::Loop;
use crate::table::{DataKey, DataTable};
use crate::tree::Forest;
use crate::types::{NodeId, StateId};

/// Strategy used to find repeated subexpressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CollectorKind {
    /// Group subtrees by canonical serialization
    #[default]
    Default,
    /// Minimize the whole forest into a DAG
    #[value(alias = "valiente")]
    Graph,
}

impl FromStr for CollectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(CollectorKind::Default),
            "graph" | "valiente" => Ok(CollectorKind::Graph),
            _ => Err(ConfigError::UnknownCollector(s.to_string())),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorKind::Default => write!(f, "default"),
            CollectorKind::Graph => write!(f, "graph"),
        }
    }
}

/// Strategy used to resolve conflicting embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FilterKind {
    #[default]
    Greedy,
    /// Exact selection, not available
    Optimal,
}

impl FilterKind {
    fn filter(self) -> Box<dyn Filter> {
        match self {
            FilterKind::Greedy => Box::new(GreedyFilter),
            FilterKind::Optimal => Box::new(OptimalFilter),
        }
    }
}

impl FromStr for FilterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" => Ok(FilterKind::Greedy),
            "optimal" => Ok(FilterKind::Optimal),
            _ => Err(ConfigError::UnknownFilter(s.to_string())),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Greedy => write!(f, "greedy"),
            FilterKind::Optimal => write!(f, "optimal"),
        }
    }
}

/// Settings of a generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Smallest subtree, in nodes, worth an embedding
    pub minimum_embedding_size: u32,
    pub collector: CollectorKind,
    pub filter: FilterKind,
    /// Distinguish labels while minimizing the DAG (graph collector only)
    pub labeled: bool,
    /// Default collector takes custom function calls of any size
    pub default_exempt_custom_calls: bool,
    /// Graph collector takes custom function calls of any size
    pub graph_exempt_custom_calls: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            minimum_embedding_size: 3,
            collector: CollectorKind::Default,
            filter: FilterKind::Greedy,
            labeled: true,
            default_exempt_custom_calls: true,
            graph_exempt_custom_calls: false,
        }
    }
}

impl Options {
    pub fn minimum_embedding_size(mut self, size: u32) -> Self {
        self.minimum_embedding_size = size;
        self
    }

    pub fn collector(mut self, collector: CollectorKind) -> Self {
        self.collector = collector;
        self
    }

    pub fn filter(mut self, filter: FilterKind) -> Self {
        self.filter = filter;
        self
    }

    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = labeled;
        self
    }

    fn build_collector(&self) -> Box<dyn Collector> {
        match self.collector {
            CollectorKind::Default => Box::new(DefaultCollector::new(SizePolicy::new(
                self.minimum_embedding_size,
                self.default_exempt_custom_calls,
            ))),
            CollectorKind::Graph => Box::new(GraphCollector::new(
                SizePolicy::new(
                    self.minimum_embedding_size,
                    self.graph_exempt_custom_calls,
                ),
                self.labeled,
            )),
        }
    }
}

/// The defining expression of one model state, as a postfix instruction sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub state: StateId,
    pub instructions: Vec<Instruction>,
}

impl Equation {
    pub fn new(state: StateId, instructions: Vec<Instruction>) -> Self {
        Self {
            state,
            instructions,
        }
    }
}

/// Output of a generation run.
#[derive(Debug)]
pub struct Generation {
    forest: Forest,
    result: CollectorResult,
    equations: IndexMap<StateId, NodeId>,
    table: DataTable,
    loops: Vec<Loop>,
}

impl Generation {
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// The accepted embeddings.
    pub fn result(&self) -> &CollectorResult {
        &self.result
    }

    /// Root node of every equation, in input order. Embedded nodes below the roots mark
    /// the call sites.
    pub fn equations(&self) -> &IndexMap<StateId, NodeId> {
        &self.equations
    }

    pub fn equation(&self, state: StateId) -> Option<NodeId> {
        self.equations.get(&state).copied()
    }

    /// Embedded node standing for the whole equation of `state`, if any.
    pub fn replacement(&self, state: StateId) -> Option<NodeId> {
        self.result.replacement(&self.forest, state)
    }

    /// Storage slots of states and argument data. Locked.
    pub fn table(&self) -> &DataTable {
        &self.table
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (state, root) in &self.equations {
            writeln!(
                f,
                "{} {}: {}",
                "Equation".cyan(),
                state,
                self.forest.render(*root)
            )?;
        }

        for embedding in self.result.embeddings() {
            writeln!(
                f,
                "{} {}: {} instances, {} arguments{}",
                "Embedding".cyan(),
                embedding.id(),
                embedding.instances_count(),
                embedding.arguments_count(),
                if embedding.is_pure() { "" } else { ", matrix valued" }
            )?;
            writeln!(
                f,
                "    {}: {}",
                "Prototype".cyan(),
                embedding.prototype().render(embedding.prototype_root())
            )?;
        }

        for index_loop in &self.loops {
            writeln!(
                f,
                "{} {} over {}: {:?}",
                "Loop".cyan(),
                index_loop.index().name(),
                index_loop.embedding(),
                index_loop.index().rows()
            )?;
        }

        writeln!(f, "{}: {} slots", "Data".cyan(), self.table.len())
    }
}

pub struct Generator {
    options: Options,
    filter: Box<dyn Filter>,
}

impl Generator {
    /// # Errors
    /// Fails with [`ConfigError::UnsupportedFilter`] for filters that cannot run.
    pub fn new(options: Options) -> Result<Self, GenerateError> {
        let filter = options.filter.filter();
        filter.supported()?;

        Ok(Self { options, filter })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    #[instrument(
        skip_all,
        fields(equations = equations.len(), collector = %self.options.collector)
    )]
    pub fn run(&self, equations: &[Equation]) -> Result<Generation, GenerateError> {
        let mut context = Context::new();
        let mut forest = Forest::new();
        let mut roots = IndexMap::new();

        for equation in equations {
            if roots.contains_key(&equation.state) {
                return Err(TreeError::DuplicateState {
                    state: equation.state,
                }
                .into());
            }

            let root = forest.build(equation.state, &equation.instructions, &mut context)?;
            roots.insert(equation.state, root);
        }

        info!(nodes = forest.len(), "forest built");

        let mut collector = self.options.build_collector();
        let mut result = collector.collect(&mut forest)?;
        self.filter.filter(&mut result, &mut forest)?;

        let mut table = DataTable::new("data");
        for state in roots.keys() {
            table.insert(DataKey::State(*state))?;
        }

        let mut loops = Vec::new();

        for embedding in result.embeddings() {
            let calls: Vec<NodeId> = embedding
                .instances()
                .iter()
                .copied()
                .filter(|n| forest[*n].parent().is_none())
                .collect();

            if calls.len() < 2 {
                continue;
            }

            let mut index_loop = Loop::new(embedding, format!("index_{}", embedding.id()));

            for node in calls {
                let target = table.insert(DataKey::State(forest[node].state()))?;
                index_loop.add(target, node, &forest, &mut table)?;
            }

            index_loop.close();
            loops.push(index_loop);
        }

        table.lock();

        info!(
            embeddings = result.len(),
            loops = loops.len(),
            slots = table.len(),
            "generation done"
        );

        Ok(Generation {
            forest,
            result,
            equations: roots,
            table,
            loops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BuiltinFunction, BuiltinOperator, Reference};
    use crate::loops::Mapped;
    use crate::path::NodePath;
    use crate::tree::tests::{op, var};
    use crate::types::Dimension;

    fn call(args: &[Instruction]) -> Vec<Instruction> {
        let mut ret = args.to_vec();
        ret.push(Instruction::custom_function("h", args.len()));
        ret
    }

    fn equations(list: Vec<Vec<Instruction>>) -> Vec<Equation> {
        list.into_iter()
            .enumerate()
            .map(|(state, instructions)| Equation::new(StateId(state as u32), instructions))
            .collect()
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("graph".parse::<CollectorKind>(), Ok(CollectorKind::Graph));
        assert_eq!(
            "Valiente".parse::<CollectorKind>(),
            Ok(CollectorKind::Graph)
        );
        assert_eq!(
            "default".parse::<CollectorKind>(),
            Ok(CollectorKind::Default)
        );
        assert_eq!(
            "fancy".parse::<CollectorKind>(),
            Err(ConfigError::UnknownCollector("fancy".to_string()))
        );
        assert_eq!("optimal".parse::<FilterKind>(), Ok(FilterKind::Optimal));
        assert!("best".parse::<FilterKind>().is_err());
        assert_eq!(CollectorKind::Graph.to_string(), "graph");
    }

    #[test]
    fn test_optimal_rejected_up_front() {
        let err = Generator::new(Options::default().filter(FilterKind::Optimal)).err();

        assert!(matches!(
            err,
            Some(GenerateError::Config(ConfigError::UnsupportedFilter(_)))
        ));
    }

    #[test]
    fn test_batched_calls() -> Result<(), Box<dyn std::error::Error>> {
        let k = Instruction::number(0.5);
        let generation = Generator::new(Options::default())?.run(&equations(vec![
            call(&[var("a"), k.clone()]),
            call(&[var("b"), k.clone()]),
            call(&[var("c"), k]),
        ]))?;

        assert_eq!(generation.result().len(), 1);
        let embedding = generation.result().embeddings().next().ok_or("no embedding")?;
        assert_eq!(embedding.instances_count(), 3);
        assert_eq!(embedding.arguments_count(), 1);

        for (state, root) in generation.equations() {
            assert_eq!(generation.replacement(*state), Some(*root));
        }

        // states first, then the argument data
        let table = generation.table();
        assert!(table.is_locked());
        assert_eq!(table.get(&DataKey::State(StateId(2))), Some(2));
        assert_eq!(table.get(&DataKey::Variable("a".to_string())), Some(3));
        assert_eq!(table.get(&DataKey::constant(0.5)), None);

        let index_loop = &generation.loops()[0];
        assert!(index_loop.is_closed());
        assert_eq!(
            index_loop.index().rows(),
            &[vec![0, 3], vec![1, 4], vec![2, 5]]
        );
        assert_eq!(
            index_loop.mapping().get(&NodePath::from(vec![0])),
            Some(&Mapped { column: 1 })
        );

        Ok(())
    }

    #[test]
    fn test_graph_pipeline() -> Result<(), Box<dyn std::error::Error>> {
        let product = |last: &str| {
            vec![
                var("a"),
                var("b"),
                op(BuiltinOperator::Plus),
                var(last),
                op(BuiltinOperator::Multiply),
            ]
        };

        let options = Options::default()
            .collector(CollectorKind::Graph)
            .minimum_embedding_size(1);
        let generation =
            Generator::new(options)?.run(&equations(vec![product("c"), product("d")]))?;

        // The products win over the sums inside them
        assert_eq!(generation.result().len(), 1);
        assert_eq!(generation.loops().len(), 1);
        assert_eq!(generation.loops()[0].index().len(), 2);

        Ok(())
    }

    #[test]
    fn test_inner_embedding_without_loop() -> Result<(), Box<dyn std::error::Error>> {
        let sum = |x: &str| {
            vec![
                var("a"),
                var("b"),
                op(BuiltinOperator::Plus),
                var(x),
                op(BuiltinOperator::Minus),
            ]
        };

        let generation =
            Generator::new(Options::default())?.run(&equations(vec![sum("c"), sum("d")]))?;

        // (a + b) - c and (a + b) - d match as a whole
        assert_eq!(generation.result().len(), 1);

        let generation = Generator::new(Options::default())?.run(&equations(vec![
            sum("c"),
            vec![
                var("a"),
                var("b"),
                op(BuiltinOperator::Plus),
                Instruction::function(BuiltinFunction::Sqrt, 1),
            ],
        ]))?;

        // Only a + b repeats, and never as a whole equation
        assert_eq!(generation.result().len(), 1);
        assert!(generation.loops().is_empty());
        assert_eq!(generation.replacement(StateId(0)), None);

        Ok(())
    }

    #[test]
    fn test_malformed_equation_aborts() {
        let result = Generator::new(Options::default())
            .map(|g| g.run(&equations(vec![vec![op(BuiltinOperator::Plus)]])));

        assert!(matches!(result, Ok(Err(GenerateError::Tree(_)))));
    }

    #[test]
    fn test_display_marks_matrix_embeddings() -> Result<(), Box<dyn std::error::Error>> {
        let sum = vec![
            Instruction::Variable {
                reference: Reference::Variable("m".to_string()),
                dimension: Dimension::new(2, 2),
            },
            var("a"),
            op(BuiltinOperator::Plus),
        ];

        let generation =
            Generator::new(Options::default())?.run(&equations(vec![sum.clone(), sum]))?;
        let embedding = generation.result().embeddings().next().ok_or("no embedding")?;

        assert!(!embedding.is_pure());
        assert!(generation.to_string().contains("matrix valued"));

        Ok(())
    }

    #[test]
    fn test_duplicate_state_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let mut list = equations(vec![call(&[var("a")]), call(&[var("b")])]);
        list.push(Equation::new(StateId(0), call(&[var("c")])));

        let result = Generator::new(Options::default())?.run(&list);

        assert!(matches!(
            result,
            Err(GenerateError::Tree(TreeError::DuplicateState { state: StateId(0) }))
        ));

        Ok(())
    }
}
