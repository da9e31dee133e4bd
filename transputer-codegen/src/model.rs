//! The mutable store code generation builds up: symbols, the ordered line
//! log, per-line sourced values, and the forward-reference tables.

use crate::ast::{
    CellWidth, Endianness, Expression, IndexedLine, Line, Processor, Statement,
};
use crate::error::AssemblyError;
use crate::eval::{self, EvaluationError, SymbolLookup};
use crate::symbol::{Casing, Symbol, SymbolKind, SymbolName, SymbolNameNormalizer};

use itertools::Itertools;
use tracing::debug;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::mem;

mod fixups;
mod storage;

pub use storage::{AssignmentValue, LineRef, SourcedValue, Storage, StorageId};

use fixups::{StorageReferences, SymbolReferences, UnresolvableSymbol};

#[cfg(test)]
mod tests;

/// The name `$` lives under in the symbol table.
pub const DOLLAR: &str = "$";

/// The assembly model: everything pass 1, convergence and pass 2 accumulate,
/// handed to the listing and binary writers when generation completes.
///
/// `$`, the current emission address, is an ordinary Variable in the symbol
/// table so that expressions resolve it with no special casing. The silent
/// mutators below bypass assignment recording and fixup — address bumps are
/// bookkeeping, not assignments.
#[derive(Debug)]
pub struct AssemblyModel {
    normalizer: SymbolNameNormalizer,
    dollar_name: SymbolName,
    symbols: HashMap<SymbolName, Symbol>,
    lines: Vec<IndexedLine>,
    sourced_values: Vec<Vec<SourcedValue>>,
    storages: Vec<Storage>,
    storage_refs: StorageReferences,
    symbol_refs: SymbolReferences,
    convergence_mode: bool,
    title: String,
    page_rows: u32,
    page_columns: u32,
    processor: Option<Processor>,
    endianness: Endianness,
}

impl Default for AssemblyModel {
    fn default() -> Self {
        Self::new(Casing::default())
    }
}

impl AssemblyModel {
    /// An empty model whose names follow the given casing policy.
    pub fn new(casing: Casing) -> Self {
        let normalizer = SymbolNameNormalizer::new(casing);
        let dollar_name = normalizer.name(DOLLAR);
        let mut symbols = HashMap::new();
        symbols.insert(
            dollar_name.clone(),
            Symbol {
                value: 0,
                kind: SymbolKind::Variable,
                line: 0,
            },
        );
        Self {
            normalizer,
            dollar_name,
            symbols,
            lines: Vec::new(),
            sourced_values: Vec::new(),
            storages: Vec::new(),
            storage_refs: StorageReferences::default(),
            symbol_refs: SymbolReferences::default(),
            convergence_mode: false,
            title: String::new(),
            page_rows: 50,
            page_columns: 80,
            processor: None,
            endianness: Endianness::Little,
        }
    }

    /// Wrap a raw identifier with this model's casing policy.
    pub fn name(&self, raw: &str) -> SymbolName {
        self.normalizer.name(raw)
    }

    // --- line log ---------------------------------------------------------

    /// Append a line to the log, returning its index.
    pub fn append_line(&mut self, line: Line) -> usize {
        let index = self.lines.len();
        self.lines.push(IndexedLine { index, line });
        self.sourced_values.push(Vec::new());
        index
    }

    /// The line at the given log index.
    pub fn line(&self, index: usize) -> &IndexedLine {
        &self.lines[index]
    }

    /// The number of lines in the log.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Replace a stored line's statement with its transformed form, so that
    /// re-iteration during convergence and pass 2 sees the rewrite.
    pub fn replace_statement(&mut self, index: usize, statement: Option<Statement>) {
        self.lines[index].line.statement = statement;
    }

    /// The full line log in input order, each with the sourced values whose
    /// originating line it is. The pairing is by log index, not line number:
    /// macro expansions share numbers but never indices.
    pub fn lines_with_sourced_values(
        &self,
    ) -> impl Iterator<Item = (&IndexedLine, &[SourcedValue])> {
        self.lines
            .iter()
            .map(|line| (line, self.sourced_values[line.index].as_slice()))
    }

    /// The sourced values a line emitted, in emission order.
    pub fn sourced_values_for_line_index(&self, index: usize) -> &[SourcedValue] {
        &self.sourced_values[index]
    }

    // --- symbols ----------------------------------------------------------

    /// The symbol-table entry for a name, whatever its kind.
    pub fn symbol(&self, name: &SymbolName) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// The value of a name defined as a variable.
    pub fn variable(&self, name: &SymbolName) -> Option<i32> {
        self.value_of_kind(name, SymbolKind::Variable)
    }

    /// The value of a name defined as a constant.
    pub fn constant(&self, name: &SymbolName) -> Option<i32> {
        self.value_of_kind(name, SymbolKind::Constant)
    }

    /// The value of a name defined as a label.
    pub fn label(&self, name: &SymbolName) -> Option<i32> {
        self.value_of_kind(name, SymbolKind::Label)
    }

    fn value_of_kind(&self, name: &SymbolName, kind: SymbolKind) -> Option<i32> {
        self.symbols
            .get(name)
            .filter(|symbol| symbol.kind == kind)
            .map(|symbol| symbol.value)
    }

    /// Define or reassign a variable.
    pub fn set_variable(
        &mut self,
        name: SymbolName,
        value: i32,
        line: LineRef,
    ) -> Result<(), AssemblyError> {
        self.set_symbol(name, SymbolKind::Variable, value, line)
    }

    /// Define a constant. Outside convergence mode a constant may be defined
    /// only once.
    pub fn set_constant(
        &mut self,
        name: SymbolName,
        value: i32,
        line: LineRef,
    ) -> Result<(), AssemblyError> {
        self.set_symbol(name, SymbolKind::Constant, value, line)
    }

    /// Define a label. Labels are rewritable only during convergence, when
    /// encoded sizes are still shifting addresses.
    pub fn set_label(
        &mut self,
        name: SymbolName,
        value: i32,
        line: LineRef,
    ) -> Result<(), AssemblyError> {
        self.set_symbol(name, SymbolKind::Label, value, line)
    }

    fn set_symbol(
        &mut self,
        name: SymbolName,
        kind: SymbolKind,
        value: i32,
        line: LineRef,
    ) -> Result<(), AssemblyError> {
        if let Some(existing) = self.symbols.get(&name) {
            let rewritable = match existing.kind {
                SymbolKind::Variable => true,
                SymbolKind::Constant | SymbolKind::Label => self.convergence_mode,
            };
            if existing.kind != kind || !rewritable {
                return Err(AssemblyError::KindConflict {
                    new_kind: kind,
                    name: name.spelling().to_owned(),
                    existing_kind: existing.kind,
                    line: existing.line,
                });
            }
        }
        debug!(name = %name, ?kind, value, line = line.number, "symbol set");
        self.symbols.insert(
            name.clone(),
            Symbol {
                value,
                kind,
                line: line.number,
            },
        );
        self.sourced_values[line.index].push(SourcedValue::Assignment(AssignmentValue {
            value,
            kind,
            line: line.number,
        }));
        self.resolve_forward_references(&name, kind)
    }

    /// Labels and constants, sorted by name, for the listing's symbol table.
    /// Variables are working state and are omitted.
    pub fn symbol_table(&self) -> Vec<(&SymbolName, &Symbol)> {
        self.symbols
            .iter()
            .filter(|(_, symbol)| symbol.kind != SymbolKind::Variable)
            .sorted_by(|a, b| a.0.cmp(b.0))
            .collect()
    }

    // --- the current emission address -------------------------------------

    /// The current emission address.
    pub fn dollar(&self) -> i32 {
        match self.symbols.get(&self.dollar_name) {
            Some(symbol) => symbol.value,
            None => panic!("$ missing from the symbol table"),
        }
    }

    /// Set `$` through the normal variable path, recording an assignment.
    pub fn set_dollar(&mut self, value: i32, line: LineRef) -> Result<(), AssemblyError> {
        self.set_variable(self.dollar_name.clone(), value, line)
    }

    /// Set `$` without recording an assignment or running fixup.
    pub fn set_dollar_silently(&mut self, value: i32) {
        if let Some(symbol) = self.symbols.get_mut(&self.dollar_name) {
            symbol.value = value;
        }
    }

    /// Advance `$` without recording an assignment or running fixup.
    pub fn increment_dollar(&mut self, delta: i32) {
        let dollar = self.dollar();
        self.set_dollar_silently(dollar.wrapping_add(delta));
    }

    // --- convergence mode -------------------------------------------------

    /// Whether constants and labels are currently rewritable.
    pub fn convergence_mode(&self) -> bool {
        self.convergence_mode
    }

    /// Enter or leave convergence mode.
    pub fn set_convergence_mode(&mut self, active: bool) {
        self.convergence_mode = active;
    }

    // --- expressions ------------------------------------------------------

    /// Evaluate an expression against the current symbol environment.
    pub fn evaluate_expression(&self, expr: &Expression) -> Result<i32, EvaluationError> {
        eval::evaluate(expr, self)
    }

    /// The names an expression references that are not yet defined.
    pub fn find_undefineds(&self, expr: &Expression) -> BTreeSet<SymbolName> {
        eval::find_undefineds(expr, self)
    }

    // --- storage ----------------------------------------------------------

    /// Allocate a storage at `$` for a data directive.
    ///
    /// Character literals in the expression list are expanded to one numeric
    /// cell per 8-bit character before anything is evaluated. Cells whose
    /// expression references undefined names are left at 0 and a storage
    /// forward reference is recorded for each such name. Every resolvable
    /// cell must fit the cell width. `$` advances by the block size.
    pub fn allocate_storage_for_line(
        &mut self,
        line: LineRef,
        cell_width: CellWidth,
        exprs: &[Expression],
    ) -> Result<StorageId, AssemblyError> {
        let exprs = expand_characters(exprs);
        let mut data = vec![0i32; exprs.len()];
        let mut pending: BTreeSet<SymbolName> = BTreeSet::new();
        for (cell, expr) in data.iter_mut().zip(&exprs) {
            match eval::evaluate(expr, self) {
                Ok(value) => {
                    check_cell_bounds(value, cell_width)?;
                    *cell = value;
                }
                Err(EvaluationError::UndefinedSymbols(names)) => pending.extend(names),
                Err(err) => return Err(err.into()),
            }
        }
        let address = self.dollar();
        let size = cell_width.bytes() as i32 * data.len() as i32;
        let id = StorageId(self.storages.len());
        self.storages.push(Storage {
            address,
            cell_width,
            data,
            exprs,
            line,
        });
        self.sourced_values[line.index].push(SourcedValue::Storage(id));
        for name in pending {
            debug!(name = %name, %id, "storage forward reference");
            self.storage_refs.record(name, id);
        }
        self.increment_dollar(size);
        Ok(id)
    }

    /// Allocate a byte-wide storage at `$` holding an encoded instruction.
    pub fn allocate_instruction_storage_for_line(
        &mut self,
        line: LineRef,
        bytes: &[u8],
    ) -> StorageId {
        let address = self.dollar();
        let id = StorageId(self.storages.len());
        self.storages.push(Storage {
            address,
            cell_width: CellWidth::Byte,
            data: bytes.iter().map(|byte| *byte as i32).collect(),
            exprs: bytes.iter().map(|byte| Expression::Num(*byte as i32)).collect(),
            line,
        });
        self.sourced_values[line.index].push(SourcedValue::Storage(id));
        self.increment_dollar(bytes.len() as i32);
        id
    }

    /// The storage behind an id.
    pub fn storage(&self, id: StorageId) -> &Storage {
        &self.storages[id.0]
    }

    /// Wipe a line's emissions so a convergence iteration can re-emit them.
    /// The wiped storages also leave the fixup table: resolution must not
    /// chase cells that are no longer part of the image.
    pub fn clear_sourced_values_for_line_index(&mut self, index: usize) {
        let removed = mem::take(&mut self.sourced_values[index]);
        let ids: HashSet<StorageId> = removed
            .iter()
            .filter_map(|value| match value {
                SourcedValue::Storage(id) => Some(*id),
                SourcedValue::Assignment(_) => None,
            })
            .collect();
        if !ids.is_empty() {
            self.storage_refs.purge_storages(&ids);
        }
    }

    /// The lowest address any live storage occupies.
    pub fn lowest_storage_address(&self) -> Option<i32> {
        self.live_storages()
            .filter(|storage| !storage.data.is_empty())
            .map(|storage| storage.address)
            .min()
    }

    /// The highest address any live storage occupies.
    pub fn highest_storage_address(&self) -> Option<i32> {
        self.live_storages()
            .filter(|storage| !storage.data.is_empty())
            .map(|storage| storage.address + storage.size_in_bytes() as i32 - 1)
            .max()
    }

    fn live_storages(&self) -> impl Iterator<Item = &Storage> {
        self.sourced_values
            .iter()
            .flatten()
            .filter_map(|value| match value {
                SourcedValue::Storage(id) => Some(&self.storages[id.0]),
                SourcedValue::Assignment(_) => None,
            })
    }

    // --- forward references -----------------------------------------------

    /// Record that `name` could not be assigned yet because `undefineds` are
    /// missing; the assignment replays as those names arrive.
    pub fn record_symbol_forward_reference(
        &mut self,
        undefineds: BTreeSet<SymbolName>,
        name: SymbolName,
        expr: &Expression,
        line: LineRef,
        kind: SymbolKind,
    ) {
        debug!(name = %name, ?kind, line = line.number, "symbol forward reference");
        for undefined in undefineds {
            self.symbol_refs.record(
                undefined,
                UnresolvableSymbol {
                    line,
                    kind,
                    name: name.clone(),
                    expr: expr.clone(),
                },
            );
        }
    }

    /// Chase everything waiting on the just-defined `name` of kind `kind`.
    ///
    /// Storage cells referencing the name are rewritten in place; pending
    /// assignments are replayed through the normal set path, which recurses
    /// here for anything they in turn define. Variable definitions end the
    /// chase for their name; constant and label definitions stay
    /// change-tracked so convergence-mode rewrites propagate.
    fn resolve_forward_references(
        &mut self,
        name: &SymbolName,
        kind: SymbolKind,
    ) -> Result<(), AssemblyError> {
        if let Some(ids) = self.storage_refs.storages_for(name) {
            debug!(name = %name, storages = ids.len(), "rewriting storages");
            for id in ids {
                self.refresh_storage(id)?;
            }
            if kind == SymbolKind::Variable {
                self.storage_refs.remove(name);
            } else {
                self.storage_refs.increment(name);
            }
        }
        if self.symbol_refs.contains(name) {
            let pending = self.symbol_refs.symbols_for(name);
            let mut discharged = Vec::new();
            for symbol in pending {
                if symbol.name == *name {
                    // a self-referential assignment can never settle
                    continue;
                }
                match eval::evaluate(&symbol.expr, self) {
                    Ok(value) => {
                        debug!(target_name = %symbol.name, value, "forward reference resolved");
                        match symbol.kind {
                            SymbolKind::Constant => {
                                self.set_constant(symbol.name.clone(), value, symbol.line)?;
                            }
                            SymbolKind::Variable => {
                                self.set_variable(symbol.name.clone(), value, symbol.line)?;
                                discharged.push(symbol);
                            }
                            SymbolKind::Label => {
                                panic!("labels are assigned from $ and never pend")
                            }
                        }
                    }
                    Err(EvaluationError::UndefinedSymbols(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            if kind == SymbolKind::Variable {
                // variables are not change-tracked: first resolution is final
                self.symbol_refs.remove(name);
            } else {
                for symbol in discharged {
                    self.symbol_refs.remove_symbol(name, &symbol);
                }
                self.symbol_refs.increment(name);
            }
        }
        Ok(())
    }

    fn refresh_storage(&mut self, id: StorageId) -> Result<(), AssemblyError> {
        let exprs = self.storages[id.0].exprs.clone();
        let cell_width = self.storages[id.0].cell_width;
        for (i, expr) in exprs.iter().enumerate() {
            match eval::evaluate(expr, self) {
                Ok(value) => {
                    check_cell_bounds(value, cell_width)?;
                    self.storages[id.0].data[i] = value;
                }
                // still waiting on another name; the cell stays 0
                Err(EvaluationError::UndefinedSymbols(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Fail if pass 1 left any forward reference unresolved: any name in
    /// either table whose resolution count is still zero. Names come out
    /// alphabetically with their referencing lines in ascending order.
    pub fn check_unresolved_forward_references(&self) -> Result<(), AssemblyError> {
        let mut findings: BTreeMap<SymbolName, BTreeSet<u32>> = BTreeMap::new();
        for (name, storages) in self.storage_refs.unresolved() {
            let lines = findings.entry(name.clone()).or_default();
            lines.extend(storages.iter().map(|id| self.storages[id.0].line.number));
        }
        for (name, symbols) in self.symbol_refs.unresolved() {
            let lines = findings.entry(name.clone()).or_default();
            lines.extend(symbols.iter().map(|symbol| symbol.line.number));
        }
        if findings.is_empty() {
            return Ok(());
        }
        Err(AssemblyError::UnresolvedForwardReferences(
            findings
                .into_iter()
                .map(|(name, lines)| (name, lines.into_iter().collect()))
                .collect(),
        ))
    }

    // --- metadata ---------------------------------------------------------

    /// Set the listing title.
    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }

    /// The listing title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set the listing page geometry.
    pub fn set_page(&mut self, rows: u32, columns: u32) {
        self.page_rows = rows;
        self.page_columns = columns;
    }

    /// Listing rows per page.
    pub fn page_rows(&self) -> u32 {
        self.page_rows
    }

    /// Listing columns per row.
    pub fn page_columns(&self) -> u32 {
        self.page_columns
    }

    /// Select the target processor; both targets are little-endian.
    pub fn set_processor(&mut self, processor: Processor) {
        self.processor = Some(processor);
        self.endianness = Endianness::Little;
    }

    /// The selected target processor, if any.
    pub fn processor(&self) -> Option<Processor> {
        self.processor
    }

    /// The byte ordering the binary writer should apply. Storage cells are
    /// numeric and carry no ordering themselves.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }
}

impl SymbolLookup for AssemblyModel {
    fn lookup(&self, name: &SymbolName) -> Option<i32> {
        self.symbols.get(name).map(|symbol| symbol.value)
    }

    fn normalizer(&self) -> &SymbolNameNormalizer {
        &self.normalizer
    }
}

fn expand_characters(exprs: &[Expression]) -> Vec<Expression> {
    let mut expanded = Vec::with_capacity(exprs.len());
    for expr in exprs {
        match expr {
            Expression::Characters(text) => {
                expanded.extend(text.bytes().map(|byte| Expression::Num(byte as i32)));
            }
            other => expanded.push(other.clone()),
        }
    }
    expanded
}

fn check_cell_bounds(value: i32, cell_width: CellWidth) -> Result<(), AssemblyError> {
    if (value as u32) > cell_width.max_unsigned() {
        return Err(AssemblyError::StorageOverflow {
            value,
            width: cell_width,
        });
    }
    Ok(())
}
