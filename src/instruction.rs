//! Instruction set of the flattened host-model expressions.
//!
//! The host model hands every state equation over as a postfix sequence of
//! [`Instruction`]s. The enum is closed: canonical labeling, tree construction,
//! comparison and storage resolution all match on it exhaustively.

use std::fmt;

use crate::types::{Dimension, StateId};

/// Built-in math functions, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Pow,
    Abs,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Hypot,
    Sum,
    Product,
}

impl BuiltinFunction {
    /// Number of built-in functions; bounds the label range reserved for them.
    pub const COUNT: u32 = 24;

    const ALL: [BuiltinFunction; Self::COUNT as usize] = [
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Asin,
        Self::Acos,
        Self::Atan,
        Self::Atan2,
        Self::Sinh,
        Self::Cosh,
        Self::Tanh,
        Self::Sqrt,
        Self::Exp,
        Self::Ln,
        Self::Log10,
        Self::Pow,
        Self::Abs,
        Self::Floor,
        Self::Ceil,
        Self::Round,
        Self::Min,
        Self::Max,
        Self::Hypot,
        Self::Sum,
        Self::Product,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Log10 => "log10",
            Self::Pow => "pow",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
            Self::Hypot => "hypot",
            Self::Sum => "sum",
            Self::Product => "product",
        }
    }

    /// Looks up a built-in function by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(Self::Ln),
            _ => Self::ALL.iter().copied().find(|f| f.name() == name),
        }
    }

    /// Whether the result is independent of the argument order.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Min | Self::Max | Self::Hypot | Self::Sum | Self::Product
        )
    }
}

/// Built-in operators, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Power,
    Negate,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Not,
    Ternary,
}

impl BuiltinOperator {
    /// Number of built-in operators; bounds the label range reserved for them.
    pub const COUNT: u32 = 17;

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Power => "^",
            Self::Negate => "neg",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::Ternary => "?:",
        }
    }

    /// Default operand count of the operator.
    pub fn default_arity(self) -> usize {
        match self {
            Self::Negate | Self::Not => 1,
            Self::Ternary => 3,
            _ => 2,
        }
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Plus | Self::Multiply | Self::Equal | Self::NotEqual | Self::And | Self::Or
        )
    }
}

/// What a variable instruction refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// The value of a model state
    State(StateId),
    /// A named model variable (parameter, input, intermediate)
    Variable(String),
}

/// One instruction of a postfix expression sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Built-in function taking `arguments` operands from the stack
    Function {
        id: BuiltinFunction,
        arguments: usize,
    },
    /// Built-in operator taking `arguments` operands from the stack
    Operator {
        id: BuiltinOperator,
        arguments: usize,
    },
    /// Call of a user-defined function
    CustomFunction {
        name: String,
        arguments: usize,
        dimension: Dimension,
    },
    /// Custom operator. Non-delayed operators carry internal sub-expressions that are
    /// expanded inline; delayed operators are supplied externally and act as a data leaf.
    CustomOperator {
        name: String,
        delayed: bool,
        expressions: Vec<Vec<Instruction>>,
    },
    /// Numeric literal
    Number(f64),
    /// Reference to a state or model variable
    Variable {
        reference: Reference,
        dimension: Dimension,
    },
}

impl Instruction {
    pub fn function(id: BuiltinFunction, arguments: usize) -> Self {
        Instruction::Function { id, arguments }
    }

    /// Built-in operator with its default operand count.
    pub fn operator(id: BuiltinOperator) -> Self {
        Instruction::Operator {
            id,
            arguments: id.default_arity(),
        }
    }

    pub fn custom_function(name: impl Into<String>, arguments: usize) -> Self {
        Instruction::CustomFunction {
            name: name.into(),
            arguments,
            dimension: Dimension::ONE,
        }
    }

    pub fn number(value: f64) -> Self {
        Instruction::Number(value)
    }

    /// Scalar model variable.
    pub fn variable(name: impl Into<String>) -> Self {
        Instruction::Variable {
            reference: Reference::Variable(name.into()),
            dimension: Dimension::ONE,
        }
    }

    /// Scalar state reference.
    pub fn state(state: StateId) -> Self {
        Instruction::Variable {
            reference: Reference::State(state),
            dimension: Dimension::ONE,
        }
    }

    /// Number of operands popped from the stack.
    pub fn arity(&self) -> usize {
        match self {
            Instruction::Function { arguments, .. }
            | Instruction::Operator { arguments, .. }
            | Instruction::CustomFunction { arguments, .. } => *arguments,
            Instruction::CustomOperator { .. }
            | Instruction::Number(_)
            | Instruction::Variable { .. } => 0,
        }
    }

    pub fn is_commutative(&self) -> bool {
        match self {
            Instruction::Function { id, .. } => id.is_commutative(),
            Instruction::Operator { id, .. } => id.is_commutative(),
            _ => false,
        }
    }

    pub fn is_custom_function(&self) -> bool {
        matches!(self, Instruction::CustomFunction { .. })
    }

    /// Whether the instruction is a data-dependent leaf (number, reference or delayed
    /// operator) whose concrete value varies per occurrence.
    pub fn is_data(&self) -> bool {
        match self {
            Instruction::Number(_) | Instruction::Variable { .. } => true,
            Instruction::CustomOperator { delayed, .. } => *delayed,
            _ => false,
        }
    }

    /// Result dimension when it is fixed by the instruction itself.
    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            Instruction::CustomFunction { dimension, .. }
            | Instruction::Variable { dimension, .. } => Some(*dimension),
            Instruction::Number(_) => Some(Dimension::ONE),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Function { id, .. } => write!(f, "{}", id.name()),
            Instruction::Operator { id, .. } => write!(f, "{}", id.symbol()),
            Instruction::CustomFunction { name, .. } => write!(f, "{name}"),
            Instruction::CustomOperator { name, .. } => write!(f, "{name}"),
            Instruction::Number(value) => write!(f, "?{value}"),
            Instruction::Variable { reference, .. } => match reference {
                Reference::State(state) => write!(f, "?{state}"),
                Reference::Variable(name) => write!(f, "?{name}"),
            },
        }
    }
}
