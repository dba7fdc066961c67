//! Index loops batching many calls of one embedding.
//!
//! Every whole-equation instance of an embedding becomes one row of an index table:
//!
//! ```text
//! row i = [target slot, slot of argument 0, slot of argument 1, ...]
//! ```
//!
//! so generated code can evaluate all of them with one loop over the rows. Closing the
//! loop drops argument columns that repeat an earlier argument column in every row and
//! maps each argument path onto the column that remains.

use indexmap::IndexMap;
use tracing::debug;

use crate::embedding::{Argument, Embedding};
use crate::errors::LoopError;
use crate::path::NodePath;
use crate::table::DataTable;
use crate::tree::Forest;
use crate::types::{EmbeddingId, NodeId};

/// Column of the index table an argument path reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapped {
    pub column: usize,
}

/// Table of slot indices, one row per loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    name: String,
    width: usize,
    rows: Vec<Vec<usize>>,
}

impl Index {
    fn new(name: String, width: usize) -> Self {
        Self {
            name,
            width,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of columns, the target column included.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn same_columns(&self, a: usize, b: usize) -> bool {
        self.rows.iter().all(|row| row[a] == row[b])
    }
}

#[derive(Debug, Clone)]
pub struct Loop {
    embedding: EmbeddingId,
    arguments: Vec<Argument>,
    ordered: Vec<NodePath>,
    index: Index,
    mapping: IndexMap<NodePath, Mapped>,
    closed: bool,
}

impl Loop {
    pub fn new(embedding: &Embedding, name: impl Into<String>) -> Self {
        let ordered: Vec<NodePath> = embedding
            .ordered_arguments()
            .into_iter()
            .map(|a| a.path.clone())
            .collect();

        Self {
            embedding: embedding.id(),
            arguments: embedding.arguments().to_vec(),
            index: Index::new(name.into(), ordered.len() + 1),
            ordered,
            mapping: IndexMap::new(),
            closed: false,
        }
    }

    pub fn embedding(&self) -> EmbeddingId {
        self.embedding
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Column each argument path reads from. Empty until the loop is closed.
    pub fn mapping(&self) -> &IndexMap<NodePath, Mapped> {
        &self.mapping
    }

    /// Adds the row for one occurrence: `target` is the slot receiving the result and
    /// `node` the embedded node whose argument data is registered in `table`.
    pub fn add(
        &mut self,
        target: usize,
        node: NodeId,
        forest: &Forest,
        table: &mut DataTable,
    ) -> Result<(), LoopError> {
        if self.closed {
            return Err(LoopError::Closed(self.embedding));
        }

        let mut row = Vec::with_capacity(self.index.width);
        row.push(target);

        for path in &self.ordered {
            let key = forest
                .from_path(node, path)
                .and_then(|n| DataTable::key_for_node(forest, n))
                .ok_or_else(|| LoopError::UnresolvedArgument {
                    embedding: self.embedding,
                    node,
                    path: path.to_string(),
                })?;

            row.push(table.insert(key)?);
        }

        self.index.rows.push(row);
        Ok(())
    }

    /// Removes redundant argument columns and builds the path mapping. Closing a closed
    /// loop does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let width = self.index.width;

        // redirect[c] is the retained column holding the values of column c
        let mut redirect: Vec<usize> = (0..width).collect();
        let mut kept: Vec<usize> = vec![0];

        for column in 1..width {
            let earlier = kept
                .iter()
                .skip(1)
                .copied()
                .find(|k| !self.index.is_empty() && self.index.same_columns(*k, column));

            match earlier {
                Some(k) => redirect[column] = k,
                None => kept.push(column),
            }
        }

        for row in &mut self.index.rows {
            *row = kept.iter().map(|c| row[*c]).collect();
        }
        self.index.width = kept.len();

        let position = |column: usize| kept.iter().position(|k| *k == column).unwrap_or(0);

        for argument in &self.arguments {
            let column = position(redirect[argument.index as usize + 1]);
            self.mapping
                .insert(argument.path.clone(), Mapped { column });
        }

        debug!(
            embedding = %self.embedding,
            rows = self.index.len(),
            columns = width,
            kept = kept.len(),
            "loop closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BuiltinFunction, Instruction};
    use crate::table::DataKey;
    use crate::tree::tests::{forest_of, var};
    use crate::types::StateId;

    fn call(args: &[Instruction]) -> Vec<Instruction> {
        let mut ret = args.to_vec();
        ret.push(Instruction::custom_function("h", args.len()));
        ret
    }

    fn setup(equations: &[Vec<Instruction>]) -> (Forest, Vec<NodeId>, Embedding, DataTable) {
        let (mut forest, roots) = forest_of(equations);
        let mut embedding = Embedding::from_node(EmbeddingId(0), &forest, roots[0]);

        for root in &roots {
            embedding.embed(&mut forest, *root).unwrap();
        }

        let mut table = DataTable::new("data");
        for state in 0..roots.len() {
            table.insert(DataKey::State(StateId(state as u32))).unwrap();
        }

        (forest, roots, embedding, table)
    }

    #[test]
    fn test_rows() -> Result<(), Box<dyn std::error::Error>> {
        let (forest, roots, embedding, mut table) =
            setup(&[call(&[var("a"), var("b")]), call(&[var("c"), var("d")])]);

        let mut index_loop = Loop::new(&embedding, "index_e0");
        for (state, root) in roots.iter().enumerate() {
            index_loop.add(state, *root, &forest, &mut table)?;
        }

        assert_eq!(index_loop.index().rows(), &[vec![0, 2, 3], vec![1, 4, 5]]);
        assert_eq!(index_loop.index().width(), 3);

        index_loop.close();
        assert_eq!(index_loop.index().width(), 3);
        assert_eq!(
            index_loop.mapping().get(&NodePath::from(vec![1])),
            Some(&Mapped { column: 2 })
        );

        Ok(())
    }

    #[test]
    fn test_close_keeps_distinct_columns() -> Result<(), Box<dyn std::error::Error>> {
        let (forest, roots, embedding, mut table) = setup(&[
            call(&[var("a"), var("x"), var("b")]),
            call(&[var("c"), var("y"), var("d")]),
        ]);
        assert_eq!(embedding.arguments_count(), 3);

        let mut index_loop = Loop::new(&embedding, "index_e0");
        for (state, root) in roots.iter().enumerate() {
            index_loop.add(state, *root, &forest, &mut table)?;
        }
        let before = index_loop.index().width();

        index_loop.close();
        let index = index_loop.index();

        assert!(index.width() <= before);
        for a in 1..index.width() {
            for b in a + 1..index.width() {
                assert!(index.rows().iter().any(|row| row[a] != row[b]));
            }
        }

        Ok(())
    }

    #[test]
    fn test_close_merges_columns() -> Result<(), Box<dyn std::error::Error>> {
        // h(a, a), h(b, b) and sin(h(c, d)): the inner call keeps the arguments
        // apart, but both whole-equation calls pass the same value twice
        let (mut forest, roots) = forest_of(&[
            call(&[var("a"), var("a")]),
            call(&[var("b"), var("b")]),
            {
                let mut inner = call(&[var("c"), var("d")]);
                inner.push(Instruction::function(BuiltinFunction::Sin, 1));
                inner
            },
        ]);
        let inner = forest[roots[2]].children()[0];

        let mut embedding = Embedding::from_node(EmbeddingId(0), &forest, roots[0]);
        for node in [roots[0], roots[1], inner] {
            embedding.embed(&mut forest, node)?;
        }
        assert_eq!(embedding.arguments_count(), 2);

        let mut table = DataTable::new("data");
        let mut index_loop = Loop::new(&embedding, "index_e0");
        for (state, root) in roots[..2].iter().enumerate() {
            let target = table.insert(DataKey::State(StateId(state as u32)))?;
            index_loop.add(target, *root, &forest, &mut table)?;
        }
        assert_eq!(index_loop.index().width(), 3);

        index_loop.close();

        assert_eq!(index_loop.index().width(), 2);
        assert_eq!(index_loop.index().rows(), &[vec![0, 1], vec![2, 3]]);
        assert_eq!(
            index_loop.mapping().get(&NodePath::from(vec![0])),
            Some(&Mapped { column: 1 })
        );
        assert_eq!(
            index_loop.mapping().get(&NodePath::from(vec![1])),
            Some(&Mapped { column: 1 })
        );

        Ok(())
    }

    #[test]
    fn test_closed_loop() -> Result<(), Box<dyn std::error::Error>> {
        let (forest, roots, embedding, mut table) = setup(&[call(&[var("a")]), call(&[var("b")])]);

        let mut index_loop = Loop::new(&embedding, "index_e0");
        index_loop.add(0, roots[0], &forest, &mut table)?;
        index_loop.close();

        let snapshot = index_loop.index().clone();
        index_loop.close();
        assert_eq!(index_loop.index(), &snapshot);

        assert_eq!(
            index_loop.add(1, roots[1], &forest, &mut table),
            Err(LoopError::Closed(EmbeddingId(0)))
        );

        Ok(())
    }

    #[test]
    fn test_locked_table() {
        let (forest, roots, embedding, mut table) = setup(&[call(&[var("a")]), call(&[var("b")])]);
        table.lock();

        let mut index_loop = Loop::new(&embedding, "index_e0");
        let err = index_loop.add(0, roots[0], &forest, &mut table).unwrap_err();

        assert!(matches!(err, LoopError::Table(_)));
    }
}
