//! Error types raised by the assembly model and the code generator.

use crate::ast::CellWidth;
use crate::eval::EvaluationError;
use crate::symbol::{SymbolKind, SymbolName};

use itertools::Itertools;
use thiserror::Error;

/// A rule violation inside the assembly model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// A symbol was redefined incompatibly: with a different kind, or as a
    /// constant/label outside convergence mode.
    #[error(
        "{} '{name}' cannot override existing {}; defined on line {line}",
        .new_kind.capitalized(),
        .existing_kind.lowercase()
    )]
    KindConflict {
        /// The kind of the attempted definition.
        new_kind: SymbolKind,
        /// The name as written at the point of conflict.
        name: String,
        /// The kind already in the table.
        existing_kind: SymbolKind,
        /// Where the existing symbol was defined.
        line: u32,
    },

    /// A datum does not fit its cell.
    #[error("Value of {value} cannot be expressed in a {width}")]
    StorageOverflow {
        /// The offending value.
        value: i32,
        /// The cell width it was stored into.
        width: CellWidth,
    },

    /// The expression could not be evaluated where a value was required.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Pass 1 ended with forward references nobody resolved.
    #[error(
        "Forward references remain unresolved at end of Pass 1: ({})",
        format_unresolved(.0)
    )]
    UnresolvedForwardReferences(Vec<(SymbolName, Vec<u32>)>),
}

fn format_unresolved(names: &[(SymbolName, Vec<u32>)]) -> String {
    names
        .iter()
        .map(|(name, lines)| {
            format!(
                "{}: {}",
                name.key(),
                lines.iter().map(|line| format!("#{line}")).join(", ")
            )
        })
        .join("; ")
}

/// A code-generation error: a source line number and a description.
///
/// Line 0 marks findings that belong to the whole input rather than a line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{line}: {message}")]
pub struct CodeGenError {
    /// The source line the error is attached to.
    pub line: u32,
    /// What went wrong.
    pub message: String,
}

impl CodeGenError {
    /// An error attached to the given source line.
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}
