//! Front end turning textual expressions into postfix instruction sequences.
//!
//! Expressions are parsed with the [evalexpr](https://github.com/ISibboI/evalexpr) crate
//! and the resulting operator tree is flattened in postfix order. Identifiers naming a
//! model state become state references, all other identifiers model variables. Function
//! calls resolve to built-in functions by name; unknown names become custom functions.

use evalexpr::{build_operator_tree, Node, Operator};
use indexmap::IndexMap;

use crate::errors::ConvertError;
use crate::generator::Equation;
use crate::instruction::{BuiltinFunction, BuiltinOperator, Instruction};
use crate::types::StateId;

/// Parses `source` and flattens it into a postfix instruction sequence.
///
/// # Arguments
/// * `source` - The expression, e.g. `"-k * x + sin(y)"`
/// * `states` - Names referring to model states
///
/// # Returns
/// * `Result<Vec<Instruction>, ConvertError>` - The instructions or the reason the
///   expression cannot be represented
pub fn flatten_expression(
    source: &str,
    states: &IndexMap<String, StateId>,
) -> Result<Vec<Instruction>, ConvertError> {
    let node: Node = build_operator_tree(source)?;

    let mut out = Vec::new();
    flatten(&node, states, &mut out)?;
    Ok(out)
}

/// Parses a system of equations of the form `state = expression`.
///
/// State ids are assigned in the order the equations are given, so every equation may
/// refer to every state. Each state must be assigned exactly once.
pub fn parse_system<S: AsRef<str>>(
    sources: &[S],
) -> Result<(IndexMap<String, StateId>, Vec<Equation>), ConvertError> {
    let mut states = IndexMap::new();
    let mut bodies = Vec::with_capacity(sources.len());

    for source in sources {
        let (name, body) = split_equation(source.as_ref())?;
        if states.contains_key(name) {
            return Err(ConvertError::DuplicateState(name.to_string()));
        }

        let state = StateId(states.len() as u32);
        states.insert(name.to_string(), state);
        bodies.push((state, body));
    }

    let equations = bodies
        .into_iter()
        .map(|(state, body)| Ok(Equation::new(state, flatten_expression(body, &states)?)))
        .collect::<Result<Vec<_>, ConvertError>>()?;

    Ok((states, equations))
}

fn split_equation(source: &str) -> Result<(&str, &str), ConvertError> {
    let malformed = || ConvertError::Equation(source.to_string());

    let (lhs, rhs) = source.split_once('=').ok_or_else(malformed)?;
    let name = lhs.trim();

    let is_identifier = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');

    if !is_identifier || rhs.starts_with('=') || rhs.trim().is_empty() {
        return Err(malformed());
    }

    Ok((name, rhs))
}

fn flatten(
    node: &Node,
    states: &IndexMap<String, StateId>,
    out: &mut Vec<Instruction>,
) -> Result<(), ConvertError> {
    let children = node.children();

    let id = match node.operator() {
        Operator::RootNode => {
            return match children {
                [child] => flatten(child, states, out),
                _ => Err(ConvertError::RootNode(format!("{:?}", children))),
            };
        }
        // Sums and products may have more than two operands
        Operator::Add | Operator::Mul => {
            let id = match node.operator() {
                Operator::Add => BuiltinOperator::Plus,
                _ => BuiltinOperator::Multiply,
            };

            for (i, child) in children.iter().enumerate() {
                flatten(child, states, out)?;
                if i > 0 {
                    out.push(Instruction::operator(id));
                }
            }
            return Ok(());
        }
        Operator::Const { value } => {
            let number = match value {
                evalexpr::Value::Float(f) => *f,
                evalexpr::Value::Int(i) => *i as f64,
                _ => return Err(ConvertError::ConstOperator(format!("{:?}", value))),
            };
            out.push(Instruction::number(number));
            return Ok(());
        }
        Operator::VariableIdentifierRead { identifier } => {
            out.push(match states.get(identifier.as_str()) {
                Some(state) => Instruction::state(*state),
                None => Instruction::variable(identifier.as_str()),
            });
            return Ok(());
        }
        Operator::FunctionIdentifier { identifier } => {
            let args = arguments(children);
            for arg in &args {
                flatten(arg, states, out)?;
            }

            let name = identifier
                .strip_prefix("math::")
                .unwrap_or(identifier.as_str());
            out.push(match BuiltinFunction::from_name(name) {
                Some(function) => Instruction::function(function, args.len()),
                None => Instruction::custom_function(name, args.len()),
            });
            return Ok(());
        }
        Operator::Sub => BuiltinOperator::Minus,
        Operator::Div => BuiltinOperator::Divide,
        Operator::Mod => BuiltinOperator::Modulo,
        Operator::Exp => BuiltinOperator::Power,
        Operator::Neg => BuiltinOperator::Negate,
        Operator::Gt => BuiltinOperator::Greater,
        Operator::Lt => BuiltinOperator::Less,
        Operator::Geq => BuiltinOperator::GreaterOrEqual,
        Operator::Leq => BuiltinOperator::LessOrEqual,
        Operator::Eq => BuiltinOperator::Equal,
        Operator::Neq => BuiltinOperator::NotEqual,
        Operator::And => BuiltinOperator::And,
        Operator::Or => BuiltinOperator::Or,
        Operator::Not => BuiltinOperator::Not,
        other => return Err(ConvertError::UnsupportedOperator(format!("{:?}", other))),
    };

    if children.len() != id.default_arity() {
        return Err(ConvertError::UnsupportedOperator(format!(
            "{} with {} operands",
            id.symbol(),
            children.len()
        )));
    }

    for child in children {
        flatten(child, states, out)?;
    }
    out.push(Instruction::operator(id));

    Ok(())
}

/// Argument expressions of a function call: a parenthesized tuple is spread.
fn arguments(children: &[Node]) -> Vec<&Node> {
    match children {
        [single] => match single.operator() {
            Operator::Tuple => single.children().iter().collect(),
            Operator::RootNode if single.children().len() <= 1 => arguments(single.children()),
            _ => vec![single],
        },
        _ => children.iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(names: &[&str]) -> IndexMap<String, StateId> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), StateId(i as u32)))
            .collect()
    }

    #[test]
    fn test_flatten_arithmetic() -> Result<(), Box<dyn std::error::Error>> {
        let instructions = flatten_expression("2*x + y", &states(&["x"]))?;

        assert_eq!(
            instructions,
            vec![
                Instruction::number(2.0),
                Instruction::state(StateId(0)),
                Instruction::operator(BuiltinOperator::Multiply),
                Instruction::variable("y"),
                Instruction::operator(BuiltinOperator::Plus),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_flatten_unary_and_power() -> Result<(), Box<dyn std::error::Error>> {
        let instructions = flatten_expression("-x^2", &states(&[]))?;

        assert!(instructions.contains(&Instruction::operator(BuiltinOperator::Negate)));
        assert!(instructions.contains(&Instruction::operator(BuiltinOperator::Power)));
        assert_eq!(instructions.len(), 4);

        Ok(())
    }

    #[test]
    fn test_flatten_functions() -> Result<(), Box<dyn std::error::Error>> {
        let sin = flatten_expression("sin(x)", &states(&[]))?;
        assert_eq!(
            sin,
            vec![
                Instruction::variable("x"),
                Instruction::function(BuiltinFunction::Sin, 1)
            ]
        );

        let custom = flatten_expression("f(x, 1)", &states(&[]))?;
        assert_eq!(
            custom,
            vec![
                Instruction::variable("x"),
                Instruction::number(1.0),
                Instruction::custom_function("f", 2)
            ]
        );

        Ok(())
    }

    #[test]
    fn test_unsupported() {
        assert!(matches!(
            flatten_expression("x = 1", &states(&[])),
            Err(ConvertError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            flatten_expression("\"text\"", &states(&[])),
            Err(ConvertError::ConstOperator(_))
        ));
    }

    #[test]
    fn test_parse_system() -> Result<(), Box<dyn std::error::Error>> {
        let (states, equations) = parse_system(&["x = -x + y", "y = x * y"])?;

        assert_eq!(states.get("y"), Some(&StateId(1)));
        assert_eq!(equations.len(), 2);
        assert_eq!(equations[1].state, StateId(1));
        assert!(equations[0]
            .instructions
            .contains(&Instruction::state(StateId(1))));

        Ok(())
    }

    #[test]
    fn test_malformed_equation() {
        for source in ["x + y", "x == y", "2x = y", "x = "] {
            assert!(
                matches!(parse_system(&[source]), Err(ConvertError::Equation(_))),
                "{source}"
            );
        }
    }

    #[test]
    fn test_duplicate_state() {
        let result = parse_system(&["x = f(a)", "y = f(b)", "x = g(c)"]);

        assert!(matches!(
            result,
            Err(ConvertError::DuplicateState(name)) if name == "x"
        ));
    }
}
