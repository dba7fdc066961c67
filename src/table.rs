//! Registry of storage slots for the data referenced by generated code.

use std::fmt;

use indexmap::IndexSet;

use crate::errors::TableError;
use crate::instruction::{Instruction, Reference};
use crate::tree::Forest;
use crate::types::{NodeId, StateId};

/// Canonical identity of a stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataKey {
    State(StateId),
    Variable(String),
    /// Numeric constant, keyed by its bit pattern
    Constant(u64),
    /// Externally supplied value of a delayed operator
    Delayed(String),
}

impl DataKey {
    pub fn constant(value: f64) -> Self {
        DataKey::Constant(value.to_bits())
    }

    /// Key of the data an instruction refers to; `None` for operations.
    pub fn of(instruction: &Instruction) -> Option<Self> {
        if !instruction.is_data() {
            return None;
        }

        match instruction {
            Instruction::Number(value) => Some(Self::constant(*value)),
            Instruction::Variable { reference, .. } => Some(match reference {
                Reference::State(state) => DataKey::State(*state),
                Reference::Variable(name) => DataKey::Variable(name.clone()),
            }),
            Instruction::CustomOperator { name, .. } => Some(DataKey::Delayed(name.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKey::State(state) => write!(f, "{state}"),
            DataKey::Variable(name) => write!(f, "{name}"),
            DataKey::Constant(bits) => write!(f, "{}", f64::from_bits(*bits)),
            DataKey::Delayed(name) => write!(f, "delayed {name}"),
        }
    }
}

/// One registered value and its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataItem<'a> {
    pub slot: usize,
    pub key: &'a DataKey,
}

/// Lookup-or-create mapping from [`DataKey`]s to slots `0, 1, 2, ...` in first-seen order.
#[derive(Debug, Clone)]
pub struct DataTable {
    name: String,
    keys: IndexSet<DataKey>,
    locked: bool,
}

impl DataTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: IndexSet::new(),
            locked: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot of `key`, registering it first if needed.
    ///
    /// # Errors
    /// A locked table accepts lookups of known keys only.
    pub fn insert(&mut self, key: DataKey) -> Result<usize, TableError> {
        if let Some(slot) = self.keys.get_index_of(&key) {
            return Ok(slot);
        }

        if self.locked {
            return Err(TableError::Locked {
                table: self.name.clone(),
                key: key.to_string(),
            });
        }

        Ok(self.keys.insert_full(key).0)
    }

    pub fn get(&self, key: &DataKey) -> Option<usize> {
        self.keys.get_index_of(key)
    }

    /// Key of the data held by a tree node, ignoring any embedding it carries.
    pub fn key_for_node(forest: &Forest, node: NodeId) -> Option<DataKey> {
        DataKey::of(forest[node].instruction())
    }

    /// Freezes the set of keys.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DataItem<'_>> {
        self.keys
            .iter()
            .enumerate()
            .map(|(slot, key)| DataItem { slot, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::BuiltinOperator;
    use crate::tree::tests::{forest_of, op, var};

    #[test]
    fn test_insert_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new("data");

        let x = table.insert(DataKey::Variable("x".to_string()))?;
        let s = table.insert(DataKey::State(StateId(4)))?;
        let one = table.insert(DataKey::constant(1.0))?;

        assert_eq!((x, s, one), (0, 1, 2));
        assert_eq!(table.insert(DataKey::Variable("x".to_string()))?, x);
        assert_eq!(table.insert(DataKey::constant(1.0))?, one);
        assert_eq!(table.len(), 3);

        let slots: Vec<usize> = table.iter().map(|item| item.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);

        Ok(())
    }

    #[test]
    fn test_locked() -> Result<(), Box<dyn std::error::Error>> {
        let mut table = DataTable::new("data");
        table.insert(DataKey::State(StateId(0)))?;
        table.lock();

        assert_eq!(table.insert(DataKey::State(StateId(0)))?, 0);
        assert_eq!(
            table.insert(DataKey::Variable("y".to_string())),
            Err(TableError::Locked {
                table: "data".to_string(),
                key: "y".to_string()
            })
        );
        assert_eq!(table.get(&DataKey::Variable("y".to_string())), None);

        Ok(())
    }

    #[test]
    fn test_key_for_node() {
        let (forest, roots) = forest_of(&[vec![
            var("a"),
            Instruction::number(2.5),
            op(BuiltinOperator::Minus),
        ]]);
        let children = forest[roots[0]].children();

        assert_eq!(
            DataTable::key_for_node(&forest, children[0]),
            Some(DataKey::Variable("a".to_string()))
        );
        assert_eq!(
            DataTable::key_for_node(&forest, children[1]),
            Some(DataKey::constant(2.5))
        );
        assert_eq!(DataTable::key_for_node(&forest, roots[0]), None);
        assert_eq!(
            DataKey::of(&Instruction::state(StateId(2))),
            Some(DataKey::State(StateId(2)))
        );
    }

    #[test]
    fn test_custom_operator_keys() {
        let operator = |delayed| Instruction::CustomOperator {
            name: "lag".to_string(),
            delayed,
            expressions: Vec::new(),
        };

        assert_eq!(
            DataKey::of(&operator(true)),
            Some(DataKey::Delayed("lag".to_string()))
        );
        assert_eq!(DataKey::of(&operator(false)), None);
        assert_eq!(DataKey::of(&Instruction::custom_function("f", 1)), None);
    }
}
