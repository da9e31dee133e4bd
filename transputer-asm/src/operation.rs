use crate::{DirectInstruction, Function};

use core::fmt;

/// Indirect operations, selected by the operand of [`Function::Opr`].
///
/// Each operation assembles to a fixed byte sequence: the operation code is
/// prefix-encoded exactly like a direct operand, so codes `0x00..0x10` are a
/// single `opr` byte, codes up to `0xFF` take one prefix byte, and so on.
/// The set below is the integer operation set of the T414/T800, plus the
/// emulator-control extension [`Terminate`] at the top of the code space.
///
/// [`Terminate`]: Operation::Terminate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
#[allow(missing_docs)] // the mnemonics are the documentation
pub enum Operation {
    Rev = 0x00,
    Lb = 0x01,
    Bsub = 0x02,
    Endp = 0x03,
    Diff = 0x04,
    Add = 0x05,
    Gcall = 0x06,
    In = 0x07,
    Prod = 0x08,
    Gt = 0x09,
    Wsub = 0x0A,
    Out = 0x0B,
    Sub = 0x0C,
    Startp = 0x0D,
    Outbyte = 0x0E,
    Outword = 0x0F,
    Seterr = 0x10,
    Resetch = 0x12,
    Csub0 = 0x13,
    Stopp = 0x15,
    Ladd = 0x16,
    Stlb = 0x17,
    Sthf = 0x18,
    Norm = 0x19,
    Ldiv = 0x1A,
    Ldpi = 0x1B,
    Stlf = 0x1C,
    Xdble = 0x1D,
    Ldpri = 0x1E,
    Rem = 0x1F,
    Ret = 0x20,
    Lend = 0x21,
    Ldtimer = 0x22,
    Testerr = 0x29,
    Testpranal = 0x2A,
    Tin = 0x2B,
    Div = 0x2C,
    Dist = 0x2E,
    Disc = 0x2F,
    Diss = 0x30,
    Lmul = 0x31,
    Not = 0x32,
    Xor = 0x33,
    Bcnt = 0x34,
    Lshr = 0x35,
    Lshl = 0x36,
    Lsum = 0x37,
    Lsub = 0x38,
    Runp = 0x39,
    Xword = 0x3A,
    Sb = 0x3B,
    Gajw = 0x3C,
    Savel = 0x3D,
    Saveh = 0x3E,
    Wcnt = 0x3F,
    Shr = 0x40,
    Shl = 0x41,
    Mint = 0x42,
    Alt = 0x43,
    Altwt = 0x44,
    Altend = 0x45,
    And = 0x46,
    Enbt = 0x47,
    Enbc = 0x48,
    Enbs = 0x49,
    Move = 0x4A,
    Or = 0x4B,
    Csngl = 0x4C,
    Ccnt1 = 0x4D,
    Talt = 0x4E,
    Ldiff = 0x4F,
    Sthb = 0x50,
    Taltwt = 0x51,
    Sum = 0x52,
    Mul = 0x53,
    Sttimer = 0x54,
    Stoperr = 0x55,
    Cword = 0x56,
    Clrhalterr = 0x57,
    Sethalterr = 0x58,
    Testhalterr = 0x59,
    Dup = 0x5A,
    /// Emulator control: stop the hosting emulator. Not an Inmos operation.
    Terminate = 0xFF,
}

impl Operation {
    /// The operation code fed to `opr` through the prefix chain.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// The encoded byte sequence: prefixes as needed, then the `opr` byte.
    pub fn encode(self) -> Vec<u8> {
        DirectInstruction::new(Function::Opr, self.code()).encode()
    }

    /// The assembler mnemonic.
    pub fn mnemonic(self) -> String {
        format!("{self:?}").to_lowercase()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic())
    }
}
