//! Instruction-set primitives of the Inmos Transputer.
//!
//! A Transputer instruction is a single byte whose high nibble selects one of
//! sixteen direct functions and whose low nibble feeds the operand register
//! `Oreg`. Larger operands are built up with `pfix`/`nfix` prefix bytes that
//! shift nibbles into `Oreg` before the final function byte executes. This
//! crate provides the direct function codes, the indirect (`opr`-selected)
//! operations, and the minimal prefix encoder.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod function;
mod instruction;
mod operation;

pub use function::{Function, InvalidFunction};
pub use instruction::{DirectInstruction, MAX_ENCODED_LEN};
pub use operation::Operation;
