//! Canonical instruction labels.
//!
//! A label is a small integer that identifies an instruction independently of where it
//! occurs. It is the primary discriminator for common subexpression detection:
//!
//! ```text
//! 0                                   placeholder (numbers, references, delayed operators)
//! 1 ..= FUNCTIONS                     built-in functions (id + 1)
//! FUNCTIONS + 1 ..= FUNCTIONS + OPS   built-in operators (id + FUNCTIONS + 1)
//! FUNCTIONS + OPS + 1 ..              custom functions and operators, first-seen order
//! 2^31 ..                             strict labels of data leaves, first-seen order
//! ```
//!
//! Data leaves share the placeholder label so that a varying literal or reference never
//! blocks structural matching; such leaves become argument candidates instead. The strict
//! variant folds the concrete value into the label and is used where exact equality is
//! required.

use std::collections::HashMap;

use crate::instruction::{BuiltinFunction, BuiltinOperator, Instruction, Reference};

/// Label shared by all data-dependent leaves.
pub const PLACEHOLDER: u32 = 0;

const CUSTOM_BASE: u32 = BuiltinFunction::COUNT + BuiltinOperator::COUNT + 1;
const STRICT_BASE: u32 = 1 << 31;

/// Registry assigning stable labels to instructions.
#[derive(Debug, Clone)]
pub struct LabelRegistry {
    custom: HashMap<String, u32>,
    strict: HashMap<String, u32>,
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self {
            custom: HashMap::new(),
            strict: HashMap::new(),
        }
    }

    /// Forgets every custom and strict assignment.
    pub fn reset(&mut self) {
        self.custom.clear();
        self.strict.clear();
    }

    /// Number of custom function/operator labels handed out so far.
    pub fn custom_count(&self) -> usize {
        self.custom.len()
    }

    fn map(table: &mut HashMap<String, u32>, base: u32, key: String) -> u32 {
        let next = base + table.len() as u32;
        *table.entry(key).or_insert(next)
    }

    /// Canonical label of an instruction.
    pub fn label(&mut self, instruction: &Instruction) -> u32 {
        match instruction {
            Instruction::Function { id, .. } => id.id() + 1,
            Instruction::Operator { id, .. } => id.id() + BuiltinFunction::COUNT + 1,
            Instruction::CustomFunction { name, .. } => {
                Self::map(&mut self.custom, CUSTOM_BASE, format!("f_{name}"))
            }
            Instruction::CustomOperator { delayed: true, .. } => PLACEHOLDER,
            Instruction::CustomOperator { name, .. } => {
                Self::map(&mut self.custom, CUSTOM_BASE, format!("co_{name}"))
            }
            Instruction::Number(_) | Instruction::Variable { .. } => PLACEHOLDER,
        }
    }

    /// Label that additionally distinguishes data leaves by value or name.
    ///
    /// Two instructions have equal strict labels iff they are exactly the same
    /// operation on exactly the same data.
    pub fn strict_label(&mut self, instruction: &Instruction) -> u32 {
        let key = match instruction {
            Instruction::Number(value) => format!("n_{:016x}", value.to_bits()),
            Instruction::Variable { reference, .. } => match reference {
                Reference::State(state) => format!("s_{}", state.0),
                Reference::Variable(name) => format!("v_{name}"),
            },
            Instruction::CustomOperator {
                name,
                delayed: true,
                ..
            } => format!("d_{name}"),
            _ => return self.label(instruction),
        };

        Self::map(&mut self.strict, STRICT_BASE, key)
    }
}

/// Per-run generation context.
///
/// Everything that needs canonicalization receives the context explicitly, so two
/// independent runs in one process never share label assignments.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub labels: LabelRegistry,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh run.
    pub fn reset(&mut self) {
        self.labels.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateId;

    #[test]
    fn test_builtin_ranges() {
        let mut registry = LabelRegistry::new();

        let sin = registry.label(&Instruction::function(BuiltinFunction::Sin, 1));
        let product = registry.label(&Instruction::function(BuiltinFunction::Product, 2));
        let plus = registry.label(&Instruction::operator(BuiltinOperator::Plus));
        let ternary = registry.label(&Instruction::operator(BuiltinOperator::Ternary));

        assert_eq!(sin, 1);
        assert_eq!(product, BuiltinFunction::COUNT);
        assert_eq!(plus, BuiltinFunction::COUNT + 1);
        assert!(ternary < CUSTOM_BASE);
    }

    #[test]
    fn test_placeholder_for_data() {
        let mut registry = LabelRegistry::new();

        assert_eq!(registry.label(&Instruction::number(3.0)), PLACEHOLDER);
        assert_eq!(registry.label(&Instruction::variable("x")), PLACEHOLDER);
        assert_eq!(registry.label(&Instruction::state(StateId(1))), PLACEHOLDER);

        let delayed = Instruction::CustomOperator {
            name: "delay".to_string(),
            delayed: true,
            expressions: vec![],
        };
        assert_eq!(registry.label(&delayed), PLACEHOLDER);
    }

    #[test]
    fn test_custom_first_seen() {
        let mut registry = LabelRegistry::new();

        let f = registry.label(&Instruction::custom_function("f", 1));
        let g = registry.label(&Instruction::custom_function("g", 2));
        let f_again = registry.label(&Instruction::custom_function("f", 1));

        assert_eq!(f, CUSTOM_BASE);
        assert_eq!(g, CUSTOM_BASE + 1);
        assert_eq!(f, f_again);

        // A custom operator with the same name as a function is a different thing
        let op = registry.label(&Instruction::CustomOperator {
            name: "f".to_string(),
            delayed: false,
            expressions: vec![],
        });
        assert_eq!(op, CUSTOM_BASE + 2);
    }

    #[test]
    fn test_strict_labels() {
        let mut registry = LabelRegistry::new();

        let one = registry.strict_label(&Instruction::number(1.0));
        let two = registry.strict_label(&Instruction::number(2.0));
        let x = registry.strict_label(&Instruction::variable("x"));

        assert_ne!(one, two);
        assert_ne!(one, x);
        assert_eq!(one, registry.strict_label(&Instruction::number(1.0)));

        // Strict labels of non-data instructions are the plain labels
        let plus = Instruction::operator(BuiltinOperator::Plus);
        assert_eq!(registry.strict_label(&plus), registry.label(&plus));

        // Strict assignments do not consume custom ordinals
        assert_eq!(
            registry.label(&Instruction::custom_function("f", 1)),
            CUSTOM_BASE
        );
    }

    #[test]
    fn test_reset() {
        let mut context = Context::new();

        context.labels.label(&Instruction::custom_function("f", 1));
        let g = context.labels.label(&Instruction::custom_function("g", 1));
        assert_eq!(g, CUSTOM_BASE + 1);

        context.reset();
        assert_eq!(context.labels.custom_count(), 0);

        let g = context.labels.label(&Instruction::custom_function("g", 1));
        assert_eq!(g, CUSTOM_BASE);
    }
}
