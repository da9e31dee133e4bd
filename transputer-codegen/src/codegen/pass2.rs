//! `IF1`/`ELSE`/`ENDIF` capture and pass-2 replay.

use crate::codegen::{CodeGenerator, GenerationMode, Pass};
use crate::error::CodeGenError;

use tracing::debug;

use std::mem;

/// The record of one conditional block.
///
/// The start address is taken at `IF1`, the end address at `ELSE`; the lines
/// between `ELSE` and `ENDIF` are captured for replay. Pass 2 re-runs them
/// against the start address and must emit exactly the pass-1 arm's size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pass2Region {
    start_address: i32,
    end_address: i32,
    lines: Vec<usize>,
}

impl Pass2Region {
    pub(crate) fn starting_at(address: i32) -> Self {
        Self {
            start_address: address,
            end_address: address,
            lines: Vec::new(),
        }
    }

    pub(crate) fn record_end(&mut self, address: i32) {
        self.end_address = address;
    }

    pub(crate) fn capture(&mut self, index: usize) {
        self.lines.push(index);
    }

    /// `$` when `IF1` was reached.
    pub fn start_address(&self) -> i32 {
        self.start_address
    }

    /// `$` when `ELSE` was reached.
    pub fn end_address(&self) -> i32 {
        self.end_address
    }

    /// Log indices of the captured lines, in input order.
    pub fn captured_line_indices(&self) -> &[usize] {
        &self.lines
    }

    /// How many bytes the pass-1 arm emitted.
    pub fn pass1_block_size(&self) -> i32 {
        self.end_address.wrapping_sub(self.start_address)
    }
}

impl CodeGenerator {
    /// Replay every captured region. Unlike pass 1, pass 2 stops at its
    /// first error: a mis-sized block invalidates every address after it.
    pub(crate) fn run_pass_two(&mut self) {
        self.mode = GenerationMode::Assembly;
        let regions = mem::take(&mut self.pass2_regions);
        for region in regions {
            if region.captured_line_indices().is_empty() {
                continue;
            }
            debug!(
                start = region.start_address(),
                lines = region.captured_line_indices().len(),
                "replaying pass-2 region"
            );
            self.model.set_dollar_silently(region.start_address());
            let errors_before = self.errors.len();
            for &index in region.captured_line_indices() {
                self.assemble_line(index, Pass::Two);
                if self.errors.len() > errors_before {
                    return;
                }
            }
            if self.model.dollar() != region.end_address() {
                let emitted = self.model.dollar().wrapping_sub(region.start_address());
                let number = region
                    .captured_line_indices()
                    .last()
                    .map(|&index| self.model.line(index).line.location.line)
                    .unwrap_or(0);
                self.errors.push(CodeGenError::new(
                    number,
                    format!(
                        "Differently-sized blocks in Passes 1 and 2: Pass 1={} byte(s); Pass 2={} byte(s)",
                        region.pass1_block_size(),
                        emitted
                    ),
                ));
                return;
            }
        }
    }
}
