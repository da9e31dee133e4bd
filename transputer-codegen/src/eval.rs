//! Expression evaluation against a symbol environment.

use crate::ast::{BinaryOp, Expression, UnaryOp};
use crate::symbol::{SymbolName, SymbolNameNormalizer};

use itertools::Itertools;
use thiserror::Error;

use std::collections::BTreeSet;

/// The environment expressions evaluate in.
///
/// The assembly model implements this; tests may substitute a plain map.
pub trait SymbolLookup {
    /// The value of a defined symbol, whatever its kind.
    fn lookup(&self, name: &SymbolName) -> Option<i32>;

    /// The normalizer raw names are wrapped with before lookup.
    fn normalizer(&self) -> &SymbolNameNormalizer;
}

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// The expression references names with no definition yet.
    #[error("Undefined symbol(s): {}", .0.iter().join(", "))]
    UndefinedSymbols(BTreeSet<SymbolName>),
    /// A character literal was used where an integer is required.
    #[error("Cannot evaluate characters as an integer")]
    CharactersInExpression,
    /// Division or remainder by zero.
    #[error("Division by zero")]
    DivisionByZero,
}

/// The names an expression references that the environment does not define.
pub fn find_undefineds<E: SymbolLookup>(expr: &Expression, env: &E) -> BTreeSet<SymbolName> {
    let mut undefined = BTreeSet::new();
    collect_undefineds(expr, env, &mut undefined);
    undefined
}

fn collect_undefineds<E: SymbolLookup>(
    expr: &Expression,
    env: &E,
    undefined: &mut BTreeSet<SymbolName>,
) {
    match expr {
        Expression::Num(_) | Expression::Characters(_) => {}
        Expression::SymbolArg(raw) => {
            let name = env.normalizer().name(raw);
            if env.lookup(&name).is_none() {
                undefined.insert(name);
            }
        }
        Expression::Unary(_, operand) => collect_undefineds(operand, env, undefined),
        Expression::Binary(_, lhs, rhs) => {
            collect_undefineds(lhs, env, undefined);
            collect_undefineds(rhs, env, undefined);
        }
    }
}

/// Evaluate an expression to a 32-bit signed value with wrap-around
/// arithmetic.
///
/// Undefined names are reported as a set before anything is computed, so a
/// caller receiving a value knows every referenced symbol was defined.
///
/// # Panics
///
/// Evaluating a raw [`UnaryOp::Offset`] panics: the statement transformer
/// chain must have rewritten it to [`UnaryOp::OffsetFrom`] first.
pub fn evaluate<E: SymbolLookup>(expr: &Expression, env: &E) -> Result<i32, EvaluationError> {
    let undefined = find_undefineds(expr, env);
    if !undefined.is_empty() {
        return Err(EvaluationError::UndefinedSymbols(undefined));
    }
    evaluate_defined(expr, env)
}

fn evaluate_defined<E: SymbolLookup>(expr: &Expression, env: &E) -> Result<i32, EvaluationError> {
    match expr {
        Expression::Num(n) => Ok(*n),
        Expression::Characters(_) => Err(EvaluationError::CharactersInExpression),
        Expression::SymbolArg(raw) => {
            let name = env.normalizer().name(raw);
            match env.lookup(&name) {
                Some(value) => Ok(value),
                None => panic!("symbol '{raw}' undefined after the undefined-names check"),
            }
        }
        Expression::Unary(op, operand) => {
            let value = evaluate_defined(operand, env)?;
            Ok(match op {
                UnaryOp::Negate => value.wrapping_neg(),
                UnaryOp::Not => !value,
                UnaryOp::OffsetFrom(anchor) => value.wrapping_sub(*anchor),
                UnaryOp::Offset => {
                    panic!("Offset must be rewritten to OffsetFrom before evaluation")
                }
            })
        }
        Expression::Binary(op, lhs, rhs) => {
            let lhs = evaluate_defined(lhs, env)?;
            let rhs = evaluate_defined(rhs, env)?;
            Ok(match op {
                BinaryOp::Add => lhs.wrapping_add(rhs),
                BinaryOp::Sub => lhs.wrapping_sub(rhs),
                BinaryOp::Mult => lhs.wrapping_mul(rhs),
                BinaryOp::Div => {
                    if rhs == 0 {
                        return Err(EvaluationError::DivisionByZero);
                    }
                    lhs.wrapping_div(rhs)
                }
                BinaryOp::ShiftLeft => lhs.wrapping_shl(rhs as u32),
                BinaryOp::ShiftRight => lhs.wrapping_shr(rhs as u32),
                BinaryOp::And => lhs & rhs,
                BinaryOp::Or => lhs | rhs,
                BinaryOp::Xor => lhs ^ rhs,
            })
        }
    }
}
