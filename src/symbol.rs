use std::ops::Range;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

use crate::error::AssembleError;

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn dummy() -> Self {
        Span {
            offs: SrcOffset(0),
            len: 0,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.offs.0..self.offs.0 + self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: Span) -> Span {
        let offs = self.offs().min(other.offs());
        let end = self.end().max(other.end());
        Span::new(SrcOffset(offs), end - offs)
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.offs() + value.len()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// Represents the CPU registers.
///
/// `FP` and `SP` are ordinary registers as far as encoding is concerned;
/// their special meaning comes entirely from the calling convention.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    Ax = 0,
    Bx,
    Cx,
    Dx,
    Ex,
    Fx,
    /// Frame pointer, valid between prologue and epilogue.
    Fp,
    /// Stack pointer, initialised to the top of memory.
    Sp,
}

impl Register {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: u8) -> Option<Register> {
        use Register::*;
        Some(match idx {
            0 => Ax,
            1 => Bx,
            2 => Cx,
            3 => Dx,
            4 => Ex,
            5 => Fx,
            6 => Fp,
            7 => Sp,
            _ => return None,
        })
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AX" => Ok(Register::Ax),
            "BX" => Ok(Register::Bx),
            "CX" => Ok(Register::Cx),
            "DX" => Ok(Register::Dx),
            "EX" => Ok(Register::Ex),
            "FX" => Ok(Register::Fx),
            "FP" => Ok(Register::Fp),
            "SP" => Ok(Register::Sp),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrKind {
    Mov,
    Add,
    Sub,
    Mul,
    Inc,
    Dec,
    Cmp,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Loop,
    Call,
    Ret,
    Push,
    Pop,
    Syscall,
    Halt,
}

impl InstrKind {
    /// Opcode byte for the encoded image. Zero is deliberately left
    /// unassigned so that zeroed memory decodes as an illegal instruction.
    pub fn opcode(self) -> u8 {
        use InstrKind::*;
        match self {
            Mov => 0x01,
            Add => 0x02,
            Sub => 0x03,
            Mul => 0x04,
            Inc => 0x05,
            Dec => 0x06,
            Cmp => 0x07,
            Jmp => 0x10,
            Je => 0x11,
            Jne => 0x12,
            Jl => 0x13,
            Jle => 0x14,
            Jg => 0x15,
            Jge => 0x16,
            Loop => 0x17,
            Call => 0x18,
            Ret => 0x19,
            Push => 0x20,
            Pop => 0x21,
            Syscall => 0x30,
            Halt => 0xFF,
        }
    }

    pub fn from_opcode(byte: u8) -> Option<InstrKind> {
        use InstrKind::*;
        Some(match byte {
            0x01 => Mov,
            0x02 => Add,
            0x03 => Sub,
            0x04 => Mul,
            0x05 => Inc,
            0x06 => Dec,
            0x07 => Cmp,
            0x10 => Jmp,
            0x11 => Je,
            0x12 => Jne,
            0x13 => Jl,
            0x14 => Jle,
            0x15 => Jg,
            0x16 => Jge,
            0x17 => Loop,
            0x18 => Call,
            0x19 => Ret,
            0x20 => Push,
            0x21 => Pop,
            0x30 => Syscall,
            0xFF => Halt,
            _ => return None,
        })
    }
}

impl FromStr for InstrKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use InstrKind::*;
        Ok(match s.to_ascii_uppercase().as_str() {
            "MOV" => Mov,
            "ADD" => Add,
            "SUB" => Sub,
            "MUL" => Mul,
            "INC" => Inc,
            "DEC" => Dec,
            "CMP" => Cmp,
            "JMP" => Jmp,
            "JE" => Je,
            "JNE" => Jne,
            "JL" => Jl,
            "JLE" => Jle,
            "JG" => Jg,
            "JGE" => Jge,
            "LOOP" => Loop,
            "CALL" => Call,
            "RET" => Ret,
            "PUSH" => Push,
            "POP" => Pop,
            "SYSCALL" => Syscall,
            "HALT" => Halt,
            _ => return Err(()),
        })
    }
}

/// Width of a data definition statement.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataWidth {
    /// `DB` - one byte per item
    Byte,
    /// `DW` - one little-endian word per item
    Word,
}

impl DataWidth {
    pub fn bytes(self) -> usize {
        match self {
            DataWidth::Byte => 1,
            DataWidth::Word => 2,
        }
    }
}

/// The closed set of host operations reachable through `SYSCALL`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Syscall {
    Atoi = 0x01,
    PrintInt = 0x02,
    PrintChar = 0x03,
    PrintString = 0x04,
    Exit = 0x05,
    ReadFile = 0x06,
    ClearScreen = 0x10,
    SetColor = 0x11,
    DrawRect = 0x12,
    DrawCircle = 0x13,
    DrawLine = 0x14,
    PaintDisplay = 0x15,
}

impl Syscall {
    pub fn vector(self) -> u8 {
        self as u8
    }

    pub fn from_vector(vect: u8) -> Option<Syscall> {
        use Syscall::*;
        Some(match vect {
            0x01 => Atoi,
            0x02 => PrintInt,
            0x03 => PrintChar,
            0x04 => PrintString,
            0x05 => Exit,
            0x06 => ReadFile,
            0x10 => ClearScreen,
            0x11 => SetColor,
            0x12 => DrawRect,
            0x13 => DrawCircle,
            0x14 => DrawLine,
            0x15 => PaintDisplay,
            _ => return None,
        })
    }
}

impl FromStr for Syscall {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Syscall::*;
        Ok(match s.to_ascii_uppercase().as_str() {
            "ATOI" => Atoi,
            "PRINT_INT" => PrintInt,
            "PRINT_CHAR" => PrintChar,
            "PRINT_STRING" => PrintString,
            "EXIT" => Exit,
            "READ_FILE" => ReadFile,
            "CLEAR_SCREEN" => ClearScreen,
            "SET_COLOR" => SetColor,
            "DRAW_RECT" => DrawRect,
            "DRAW_CIRCLE" => DrawCircle,
            "DRAW_LINE" => DrawLine,
            "PAINT_DISPLAY" => PaintDisplay,
            _ => return Err(()),
        })
    }
}

/// What a symbol refers to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    /// Address of an instruction in the code region.
    Code,
    /// Address and byte length of an object in the data region.
    Data { len: u16 },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SymbolInfo {
    pub addr: u16,
    pub kind: SymbolKind,
}

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Symbol table of label -> resolved address, built during pass 1 and
/// consulted during pass 2. Owned by a single `assemble` call; the
/// assembler holds no state across calls.
pub struct SymbolTable {
    table: FxMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Record a symbol. Errors on redefinition.
    pub fn insert(&mut self, name: &str, info: SymbolInfo, span: Span) -> Result<(), AssembleError> {
        if self.table.contains_key(name) {
            return Err(AssembleError::DuplicateSymbol {
                name: name.to_string(),
                span,
            });
        }
        self.table.insert(name.to_string(), info);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SymbolInfo> {
        self.table.get(name).copied()
    }

    /// Resolve a reference or fail with the span of the use site.
    pub fn resolve(&self, name: &str, span: Span) -> Result<u16, AssembleError> {
        self.get(name)
            .map(|info| info.addr)
            .ok_or_else(|| AssembleError::UndefinedSymbol {
                name: name.to_string(),
                span,
            })
    }

    /// Symbols in definition order, for listings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, SymbolInfo)> {
        self.table.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
