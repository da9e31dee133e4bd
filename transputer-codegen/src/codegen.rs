//! The two-pass code generator.
//!
//! Pass 1 walks the input lines once, emitting storage as it goes. A direct
//! instruction whose operand references undefined names opens a convergence
//! interval; when the last such name is defined the interval is re-walked to
//! a fixed point, growing tentative encodings one byte at a time. `ELSE`
//! arms of `IF1` blocks are captured during pass 1 and replayed as pass 2
//! against the block's recorded starting address.

use crate::ast::{CellWidth, Expression, Line, Statement};
use crate::error::{AssemblyError, CodeGenError};
use crate::eval::EvaluationError;
use crate::model::{AssemblyModel, LineRef};
use crate::symbol::{Casing, SymbolKind, SymbolName};
use crate::transform::{TransformationError, TransformerChain};

use tracing::debug;
use transputer_asm::{DirectInstruction, Function};

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

mod converge;
mod pass2;

pub use pass2::Pass2Region;

/// Which walk over the lines is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    One,
    Two,
}

/// Where pass 1 stands relative to a conditional block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationMode {
    /// Ordinary line-by-line assembly.
    Assembly,
    /// Between `IF1` and `ELSE`: assembling the pass-1 arm.
    If1Seen,
    /// Between `ELSE` and `ENDIF`: capturing the pass-2 arm.
    ElseSeen,
}

/// A direct instruction whose operand was unknown when its line assembled.
/// The tentative size only ever grows.
#[derive(Debug, Clone, Copy)]
struct TrackedInstruction {
    function: Function,
    size: usize,
}

/// The open convergence interval, if any.
#[derive(Debug, Default)]
struct ConvergeState {
    active: bool,
    start_index: usize,
    start_dollar: i32,
    symbols: BTreeSet<SymbolName>,
}

/// Drives pass 1, convergence and pass 2 over parsed lines, accumulating
/// errors rather than stopping at the first.
#[derive(Debug)]
pub struct CodeGenerator {
    model: AssemblyModel,
    transformers: TransformerChain,
    errors: Vec<CodeGenError>,
    mode: GenerationMode,
    current_region: Pass2Region,
    pass2_regions: Vec<Pass2Region>,
    tracked: BTreeMap<usize, TrackedInstruction>,
    converge: ConvergeState,
    end_seen: bool,
    last_line_number: u32,
    debug_codegen: bool,
}

impl CodeGenerator {
    /// A generator whose symbol names follow the given casing policy.
    pub fn new(casing: Casing) -> Self {
        Self {
            model: AssemblyModel::new(casing),
            transformers: TransformerChain::default(),
            errors: Vec::new(),
            mode: GenerationMode::Assembly,
            current_region: Pass2Region::default(),
            pass2_regions: Vec::new(),
            tracked: BTreeMap::new(),
            converge: ConvergeState::default(),
            end_seen: false,
            last_line_number: 0,
            debug_codegen: false,
        }
    }

    /// Turn per-line diagnostic logging on or off.
    pub fn with_debug_codegen(mut self, debug_codegen: bool) -> Self {
        self.debug_codegen = debug_codegen;
        self
    }

    /// The transformer chain applied ahead of every statement.
    pub fn transformers_mut(&mut self) -> &mut TransformerChain {
        &mut self.transformers
    }

    /// Run pass 1 over the lines, check for unresolved forward references,
    /// replay the captured pass-2 regions, and hand over the model.
    ///
    /// Errors do not stop pass 1; collect them afterwards from
    /// [`code_generation_errors`](Self::code_generation_errors).
    pub fn create_model(&mut self, lines: Vec<Line>) -> AssemblyModel {
        for line in lines {
            let index = self.model.append_line(line);
            self.assemble_line(index, Pass::One);
        }
        self.check_pending_convergence();
        if let Err(err) = self.model.check_unresolved_forward_references() {
            self.errors.push(CodeGenError::new(0, err.to_string()));
        }
        self.run_pass_two();
        mem::take(&mut self.model)
    }

    /// Record an error if no `END` directive was seen.
    pub fn end_check(&mut self) {
        if !self.end_seen {
            self.errors
                .push(CodeGenError::new(0, "End of input reached with no End statement"));
        }
    }

    /// Every error accumulated so far, in discovery order.
    pub fn code_generation_errors(&self) -> &[CodeGenError] {
        &self.errors
    }

    /// The largest source line number seen.
    pub fn last_line_number(&self) -> u32 {
        self.last_line_number
    }

    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.errors.push(CodeGenError::new(line, message));
    }

    fn assemble_line(&mut self, index: usize, pass: Pass) {
        let number = self.model.line(index).line.location.line;
        if number > self.last_line_number {
            self.last_line_number = number;
        }
        let statement = self.model.line(index).line.statement.clone();

        // Between ELSE and ENDIF whole lines are captured, labels included;
        // they assemble for the first time during pass-2 replay.
        if self.mode == GenerationMode::ElseSeen
            && !matches!(statement, Some(Statement::Endif))
        {
            self.current_region.capture(index);
            return;
        }

        if pass == Pass::One && self.end_seen {
            if statement.is_some() {
                self.error(number, "No statements allowed after End statement");
            }
            return;
        }

        let statement = match statement {
            Some(statement) => match self.transformers.apply(&self.model, statement) {
                Ok(statement) => {
                    self.model.replace_statement(index, Some(statement.clone()));
                    Some(statement)
                }
                Err(err) => {
                    self.errors.push(err.at_line(number));
                    return;
                }
            },
            None => None,
        };

        if self.debug_codegen {
            debug!(index, number, ?statement, "assembling line");
        }

        if let Some(Statement::Direct(_, expr)) = &statement {
            let undefineds = self.model.find_undefineds(expr);
            if !undefineds.is_empty() {
                if !self.converge.active {
                    self.converge.active = true;
                    self.converge.start_index = index;
                    self.converge.start_dollar = self.model.dollar();
                    debug!(index, dollar = self.converge.start_dollar, "opening convergence interval");
                }
                self.converge.symbols.extend(undefineds);
            }
        }

        if let Some(label) = self.model.line(index).line.label.clone() {
            let name = self.model.name(&label);
            let dollar = self.model.dollar();
            match self.model.set_label(name.clone(), dollar, LineRef { index, number }) {
                Ok(()) => {
                    if self.converge.active {
                        self.converge.symbols.remove(&name);
                    }
                }
                Err(err) => self.error(number, err.to_string()),
            }
        }

        if let Some(statement) = statement {
            self.dispatch(index, number, statement);
        }

        if self.converge.active {
            let model = &self.model;
            self.converge.symbols.retain(|name| model.symbol(name).is_none());
            if self.converge.symbols.is_empty() {
                let (start_index, start_dollar) =
                    (self.converge.start_index, self.converge.start_dollar);
                self.converge = ConvergeState::default();
                self.run_convergence(start_index, index, start_dollar);
            }
        }
    }

    fn dispatch(&mut self, index: usize, number: u32, statement: Statement) {
        let line_ref = LineRef { index, number };
        match statement {
            Statement::Title(title) => self.model.set_title(title),
            Statement::Page(rows, columns) => self.model.set_page(rows, columns),
            Statement::Processor(processor) => self.model.set_processor(processor),
            Statement::Align(boundary) => self.align(number, boundary),
            Statement::Org(expr) => match self.model.evaluate_expression(&expr) {
                Ok(address) => {
                    if let Err(err) = self.model.set_dollar(address, line_ref) {
                        self.error(number, err.to_string());
                    }
                }
                Err(EvaluationError::CharactersInExpression) => {
                    self.error(number, "Origin cannot be set to a character expression");
                }
                Err(err) => self.error(number, err.to_string()),
            },
            Statement::End => self.end_seen = true,
            Statement::ConstantAssignment(name, expr) => {
                self.assign(line_ref, &name, &expr, SymbolKind::Constant);
            }
            Statement::VariableAssignment(name, expr) => {
                self.assign(line_ref, &name, &expr, SymbolKind::Variable);
            }
            Statement::Data(width, exprs) => {
                if let Err(err) = self.model.allocate_storage_for_line(line_ref, width, &exprs) {
                    self.error(number, err.to_string());
                }
            }
            Statement::DataDup(width, count, value) => {
                self.data_dup(line_ref, width, &count, value);
            }
            Statement::If1 => {
                if self.mode != GenerationMode::Assembly {
                    self.error(number, "If1 seen inside an existing If1 block");
                    return;
                }
                self.current_region = Pass2Region::starting_at(self.model.dollar());
                self.mode = GenerationMode::If1Seen;
            }
            Statement::Else => match self.mode {
                GenerationMode::If1Seen => {
                    self.current_region.record_end(self.model.dollar());
                    self.mode = GenerationMode::ElseSeen;
                }
                _ => self.error(number, "Else seen without a preceding If1"),
            },
            Statement::Endif => match self.mode {
                GenerationMode::If1Seen | GenerationMode::ElseSeen => {
                    let region = mem::take(&mut self.current_region);
                    debug!(
                        start = region.start_address(),
                        captured = region.captured_line_indices().len(),
                        "conditional block closed"
                    );
                    self.pass2_regions.push(region);
                    self.mode = GenerationMode::Assembly;
                }
                GenerationMode::Assembly => {
                    self.error(number, "Endif seen without a preceding If1");
                }
            },
            Statement::Direct(function, expr) => match self.model.evaluate_expression(&expr) {
                Ok(operand) => {
                    let bytes = DirectInstruction::new(function, operand).encode();
                    self.model
                        .allocate_instruction_storage_for_line(line_ref, &bytes);
                }
                Err(EvaluationError::UndefinedSymbols(_)) => {
                    // reserve one byte; convergence settles the real size
                    self.tracked
                        .insert(index, TrackedInstruction { function, size: 1 });
                    self.model.increment_dollar(1);
                }
                Err(err) => self.error(number, err.to_string()),
            },
            Statement::Indirect(operation) => {
                self.model
                    .allocate_instruction_storage_for_line(line_ref, &operation.encode());
            }
        }
    }

    fn align(&mut self, number: u32, boundary: u32) {
        if boundary == 0 {
            self.error(number, "Cannot align on a boundary of 0");
            return;
        }
        let remainder = (self.model.dollar() as u32) % boundary;
        if remainder != 0 {
            // the gap is implicit: no storage is emitted for it
            self.model.increment_dollar((boundary - remainder) as i32);
        }
    }

    fn assign(&mut self, line_ref: LineRef, name: &str, expr: &Expression, kind: SymbolKind) {
        let cased = self.model.name(name);
        match self.model.evaluate_expression(expr) {
            Ok(value) => {
                let result = match kind {
                    SymbolKind::Constant => self.model.set_constant(cased, value, line_ref),
                    SymbolKind::Variable => self.model.set_variable(cased, value, line_ref),
                    SymbolKind::Label => panic!("labels assign through set_label"),
                };
                if let Err(err) = result {
                    self.error(line_ref.number, err.to_string());
                }
            }
            Err(EvaluationError::UndefinedSymbols(undefineds)) => {
                self.model
                    .record_symbol_forward_reference(undefineds, cased, expr, line_ref, kind);
            }
            Err(EvaluationError::CharactersInExpression) => {
                self.error(
                    line_ref.number,
                    format!(
                        "{} '{}' cannot be set to a character expression",
                        kind.capitalized(),
                        name
                    ),
                );
            }
            Err(err) => self.error(line_ref.number, err.to_string()),
        }
    }

    /// Fallback for `DUP` statements reaching dispatch untransformed, e.g.
    /// through a chain the caller replaced.
    fn data_dup(
        &mut self,
        line_ref: LineRef,
        width: CellWidth,
        count: &Expression,
        value: Expression,
    ) {
        match self.model.evaluate_expression(count) {
            Ok(count) if count >= 0 => {
                let exprs = vec![value; count as usize];
                if let Err(err) = self.model.allocate_storage_for_line(line_ref, width, &exprs) {
                    self.error(line_ref.number, err.to_string());
                }
            }
            Ok(count) => self.error(
                line_ref.number,
                TransformationError::NegativeDupCount(count).to_string(),
            ),
            Err(EvaluationError::UndefinedSymbols(names)) => self.error(
                line_ref.number,
                TransformationError::UndefinedDupCount(names).to_string(),
            ),
            Err(err) => self.error(line_ref.number, err.to_string()),
        }
    }

    /// Direct instructions still waiting on definitions when the input ran
    /// out never made it into the fixup tables; report them in the same
    /// shape as the model's unresolved-reference check.
    fn check_pending_convergence(&mut self) {
        if !self.converge.active || self.converge.symbols.is_empty() {
            return;
        }
        let mut findings: Vec<(SymbolName, Vec<u32>)> = Vec::new();
        for name in &self.converge.symbols {
            let mut lines: BTreeSet<u32> = BTreeSet::new();
            for &index in self.tracked.keys() {
                let line = self.model.line(index);
                if let Some(Statement::Direct(_, expr)) = &line.line.statement {
                    if self.model.find_undefineds(expr).contains(name) {
                        lines.insert(line.line.location.line);
                    }
                }
            }
            findings.push((name.clone(), lines.into_iter().collect()));
        }
        let err = AssemblyError::UnresolvedForwardReferences(findings);
        self.errors.push(CodeGenError::new(0, err.to_string()));
        self.converge = ConvergeState::default();
    }
}
