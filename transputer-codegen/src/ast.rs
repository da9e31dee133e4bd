//! The parsed-source representation handed to the code generator.
//!
//! The parser and macro expander run before this crate sees anything: every
//! [`Line`] arrives fully expanded, with its optional label and statement
//! already separated from the raw text.

use transputer_asm::{Function, Operation};

use core::fmt;

/// Unary operators of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Two's-complement negation.
    Negate,
    /// Bitwise complement.
    Not,
    /// Placeholder for "distance from here"; rewritten to [`OffsetFrom`]
    /// before evaluation.
    ///
    /// [`OffsetFrom`]: UnaryOp::OffsetFrom
    Offset,
    /// Distance of the operand's value from a fixed anchor address.
    OffsetFrom(i32),
}

/// Binary operators of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mult,
    /// Signed division, truncated toward zero.
    Div,
    /// Arithmetic shift left.
    ShiftLeft,
    /// Arithmetic shift right.
    ShiftRight,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
}

/// An immutable expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// An integer literal.
    Num(i32),
    /// A character literal: a string of 8-bit characters. Only data
    /// directives accept these; everywhere else evaluation rejects them.
    Characters(String),
    /// A symbol reference, by the name as written.
    SymbolArg(String),
    /// A unary operator applied to a subexpression.
    Unary(UnaryOp, Box<Expression>),
    /// A binary operator applied to two subexpressions.
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
}

impl Expression {
    /// A symbol reference.
    pub fn symbol(name: &str) -> Self {
        Expression::SymbolArg(name.to_owned())
    }

    /// Apply a unary operator.
    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary(op, Box::new(operand))
    }

    /// Apply a binary operator.
    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }
}

impl From<i32> for Expression {
    fn from(n: i32) -> Self {
        Expression::Num(n)
    }
}

/// Target processors accepted by the `PROCESSOR` directive.
///
/// Both targets are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    /// The Inmos Transputer family.
    Transputer,
    /// The Intel 386.
    Intel386,
}

/// Byte ordering applied by the binary writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endianness {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// Cell widths of the data directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CellWidth {
    /// `DB`: one byte per cell.
    Byte = 1,
    /// `DW`: two bytes per cell.
    Word = 2,
    /// `DD`: four bytes per cell.
    DoubleWord = 4,
}

impl CellWidth {
    /// The number of bytes a cell occupies.
    pub const fn bytes(self) -> u32 {
        self as u32
    }

    /// The largest value a cell holds, viewed unsigned.
    pub const fn max_unsigned(self) -> u32 {
        match self {
            CellWidth::Byte => 0xFF,
            CellWidth::Word => 0xFFFF,
            CellWidth::DoubleWord => 0xFFFF_FFFF,
        }
    }
}

impl fmt::Display for CellWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CellWidth::Byte => "BYTE",
            CellWidth::Word => "WORD",
            CellWidth::DoubleWord => "DWORD",
        })
    }
}

/// A parsed statement: one directive or instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `TITLE`: listing title.
    Title(String),
    /// `PAGE rows, columns`: listing page geometry.
    Page(u32, u32),
    /// `.TRANSPUTER` / `.386`: select the target processor.
    Processor(Processor),
    /// `ALIGN n`: advance `$` to the next multiple of `n`.
    Align(u32),
    /// `ORG expr`: set `$`.
    Org(Expression),
    /// `END`: end of the program.
    End,
    /// `name EQU expr`: define a constant.
    ConstantAssignment(String, Expression),
    /// `name = expr`: define or reassign a variable.
    VariableAssignment(String, Expression),
    /// `DB`/`DW`/`DD` with an expression list.
    Data(CellWidth, Vec<Expression>),
    /// `DB`/`DW`/`DD` with `count DUP (value)`.
    DataDup(CellWidth, Expression, Expression),
    /// `IF1`: start of a conditional block; the following lines assemble in
    /// pass 1.
    If1,
    /// `ELSE`: the following lines are captured for pass 2.
    Else,
    /// `ENDIF`: end of the conditional block.
    Endif,
    /// A direct instruction with its operand expression.
    Direct(Function, Expression),
    /// An indirect operation, assembling to a fixed byte sequence.
    Indirect(Operation),
}

/// Where a line came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The source file name.
    pub file: String,
    /// The 1-based line number within the file.
    pub line: u32,
}

impl SourceLocation {
    /// A location in the given file.
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: file.to_owned(),
            line,
        }
    }
}

/// One parsed source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// The source position, as reported by the parser.
    pub location: SourceLocation,
    /// The raw text, for listings.
    pub text: String,
    /// The label preceding the statement, if any.
    pub label: Option<String>,
    /// The statement, if the line holds one.
    pub statement: Option<Statement>,
}

impl Line {
    /// Assemble a line from its parts.
    pub fn new(
        location: SourceLocation,
        text: &str,
        label: Option<&str>,
        statement: Option<Statement>,
    ) -> Self {
        Self {
            location,
            text: text.to_owned(),
            label: label.map(str::to_owned),
            statement,
        }
    }
}

/// A line as stored in the model's append-only log.
///
/// The index is assigned on append and is stable across macro expansion:
/// several indexed lines may share one source line number, but never an
/// index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedLine {
    /// Position in the log.
    pub index: usize,
    /// The line itself.
    pub line: Line,
}
