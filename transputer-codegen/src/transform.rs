//! Statement rewriting applied between parsing and code generation.
//!
//! Transformers run in registration order; the result replaces the stored
//! indexed line, so convergence-mode re-iteration sees the rewritten form.
//! A transformer failure is reported by the code generator against the
//! current line.

use crate::ast::Statement;
use crate::error::CodeGenError;
use crate::eval::EvaluationError;
use crate::model::AssemblyModel;
use crate::symbol::SymbolName;

use itertools::Itertools;
use thiserror::Error;

use std::collections::BTreeSet;

mod offset;

pub use offset::OffsetTransformer;

/// Why a statement could not be transformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformationError {
    /// A `DUP` count referenced names that are not yet defined; repetition
    /// counts must be known when the directive is reached.
    #[error("Count of DUP must be known: {}", .0.iter().join(", "))]
    UndefinedDupCount(BTreeSet<SymbolName>),

    /// A `DUP` count evaluated below zero.
    #[error("Count of DUP must not be negative: {0}")]
    NegativeDupCount(i32),

    /// A `DUP` count failed to evaluate for a non-forward-reference reason.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl TransformationError {
    /// Attach the current source line, yielding a code-generation error.
    pub fn at_line(&self, line: u32) -> CodeGenError {
        CodeGenError::new(line, self.to_string())
    }
}

/// A rewriting step applied to every statement before code generation.
pub trait StatementTransformer {
    /// Rewrite `statement` against the model's current state.
    fn transform(
        &self,
        model: &AssemblyModel,
        statement: Statement,
    ) -> Result<Statement, TransformationError>;
}

/// The ordered transformer chain. [`OffsetTransformer`] is pre-registered.
pub struct TransformerChain {
    transformers: Vec<Box<dyn StatementTransformer>>,
}

impl Default for TransformerChain {
    fn default() -> Self {
        Self {
            transformers: vec![Box::new(OffsetTransformer)],
        }
    }
}

impl TransformerChain {
    /// Register a transformer after the existing ones.
    pub fn register(&mut self, transformer: Box<dyn StatementTransformer>) {
        self.transformers.push(transformer);
    }

    /// Run the chain over a statement.
    pub fn apply(
        &self,
        model: &AssemblyModel,
        statement: Statement,
    ) -> Result<Statement, TransformationError> {
        self.transformers
            .iter()
            .try_fold(statement, |statement, transformer| {
                transformer.transform(model, statement)
            })
    }
}

impl core::fmt::Debug for TransformerChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransformerChain")
            .field("transformers", &self.transformers.len())
            .finish()
    }
}
