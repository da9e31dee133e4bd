//! The encoded-size convergence loop.
//!
//! Entered when every name a tracked direct instruction waits on has a
//! candidate definition. Each iteration resets `$` to the interval's entry
//! address, wipes the interval's emissions and re-walks it; a tracked
//! instruction whose minimal encoding outgrew its tentative size bumps that
//! size by one byte and forces another iteration. Sizes only grow and are
//! bounded by [`MAX_ENCODED_LEN`], so the loop terminates; at exit every
//! tracked encoding is minimal for the settled addresses.

use crate::ast::Statement;
use crate::codegen::CodeGenerator;
use crate::model::LineRef;

use tracing::debug;
use transputer_asm::{DirectInstruction, MAX_ENCODED_LEN};

impl CodeGenerator {
    pub(crate) fn run_convergence(
        &mut self,
        start_index: usize,
        end_index: usize,
        start_dollar: i32,
    ) {
        debug!(start_index, end_index, start_dollar, "entering convergence loop");
        self.model.set_convergence_mode(true);
        let mut iterations = 0u32;
        loop {
            iterations += 1;
            self.model.set_dollar_silently(start_dollar);
            for index in start_index..=end_index {
                self.model.clear_sourced_values_for_line_index(index);
            }
            let mut grew = false;
            for index in start_index..=end_index {
                grew |= self.converge_line(index);
            }
            if !grew {
                break;
            }
        }
        self.model.set_convergence_mode(false);
        debug!(iterations, "convergence complete");
    }

    /// Re-assemble one line of the interval. Returns whether a tracked
    /// instruction's size grew, forcing another iteration.
    fn converge_line(&mut self, index: usize) -> bool {
        let line = self.model.line(index).line.clone();
        let number = line.location.line;
        let line_ref = LineRef { index, number };

        // Shifting sizes shift every following address; labels are
        // re-recorded at each iteration's addresses.
        if let Some(label) = &line.label {
            let name = self.model.name(label);
            let dollar = self.model.dollar();
            if let Err(err) = self.model.set_label(name, dollar, line_ref) {
                self.error(number, err.to_string());
            }
        }

        let Some(statement) = line.statement else {
            return false;
        };

        let Some((function, size)) = self
            .tracked
            .get(&index)
            .map(|tracked| (tracked.function, tracked.size))
        else {
            // already-encodable lines re-dispatch; the line log keeps its
            // single entry from pass 1
            self.dispatch(index, number, statement);
            return false;
        };

        let Statement::Direct(_, expr) = statement else {
            panic!("tracked line {index} no longer holds a direct instruction");
        };
        match self.model.evaluate_expression(&expr) {
            Ok(operand) => {
                let bytes = DirectInstruction::new(function, operand).encode();
                if bytes.len() > size {
                    let size = size + 1;
                    assert!(
                        size <= MAX_ENCODED_LEN,
                        "direct instruction on line {number} failed to converge within {MAX_ENCODED_LEN} bytes"
                    );
                    if let Some(tracked) = self.tracked.get_mut(&index) {
                        tracked.size = size;
                    }
                    self.model.increment_dollar(size as i32);
                    if self.debug_codegen {
                        debug!(number, size, "encoded size grew");
                    }
                    return true;
                }
                self.model
                    .allocate_instruction_storage_for_line(line_ref, &bytes);
            }
            // not settled yet: hold the slot at the tentative size
            Err(_) => self.model.increment_dollar(size as i32),
        }
        false
    }
}
