use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::symbol::Span;

/// Everything that can go wrong before a single instruction executes.
///
/// Each variant carries the span of the offending source so it can be
/// rendered as a labeled diagnostic pointing at the line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AssembleError {
    /// Malformed statement: wrong operand shape, bad literal, stray token.
    SyntaxError { msg: String, span: Span },
    /// First token of a statement is not an instruction, directive, or
    /// data definition - or a `SYSCALL` names an unknown operation.
    UnknownMnemonic { name: String, span: Span },
    /// A reference that resolved to nothing after pass 1.
    UndefinedSymbol { name: String, span: Span },
    /// A label or data object defined twice.
    DuplicateSymbol { name: String, span: Span },
    /// Combined code + data exceeds the declared memory size.
    LayoutOverflow {
        used: usize,
        limit: usize,
        span: Span,
    },
}

impl AssembleError {
    pub fn span(&self) -> Span {
        match self {
            AssembleError::SyntaxError { span, .. }
            | AssembleError::UnknownMnemonic { span, .. }
            | AssembleError::UndefinedSymbol { span, .. }
            | AssembleError::DuplicateSymbol { span, .. }
            | AssembleError::LayoutOverflow { span, .. } => *span,
        }
    }

    /// 1-based source line of the offending span.
    pub fn line(&self, src: &str) -> usize {
        let offs = self.span().offs().min(src.len());
        src[..offs].chars().filter(|&c| c == '\n').count() + 1
    }

    /// Render as a labeled diagnostic against the source it came from.
    pub fn report(&self, src: &str) -> Report {
        let report = match self {
            AssembleError::SyntaxError { msg, span } => miette!(
                severity = Severity::Error,
                code = "asm::syntax",
                help = "statement grammar is `label: MNEMONIC operand, operand ; comment`",
                labels = vec![LabeledSpan::at(*span, "malformed statement")],
                "Syntax error: {msg}",
            ),
            AssembleError::UnknownMnemonic { name, span } => miette!(
                severity = Severity::Error,
                code = "asm::unknown_mnemonic",
                help = "check the instruction and syscall listings for the x366 architecture",
                labels = vec![LabeledSpan::at(*span, "not a known operation")],
                "Unknown mnemonic `{name}`",
            ),
            AssembleError::UndefinedSymbol { name, span } => miette!(
                severity = Severity::Error,
                code = "asm::undefined_symbol",
                help = "labels may be referenced before their definition, but must be defined somewhere",
                labels = vec![LabeledSpan::at(*span, "unresolved reference")],
                "Undefined symbol `{name}`",
            ),
            AssembleError::DuplicateSymbol { name, span } => miette!(
                severity = Severity::Error,
                code = "asm::duplicate_symbol",
                help = "labels and data objects share one namespace and each name is allowed once",
                labels = vec![LabeledSpan::at(*span, "second definition")],
                "Duplicate symbol `{name}`",
            ),
            AssembleError::LayoutOverflow { used, limit, span } => miette!(
                severity = Severity::Error,
                code = "asm::layout_overflow",
                help = "raise the limit with a `.MEMORY <bytes>` directive",
                labels = vec![LabeledSpan::at(*span, "does not fit")],
                "Program needs {used} bytes but only {limit} are available",
            ),
        };
        report.with_source_code(src.to_string())
    }
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::SyntaxError { msg, .. } => write!(f, "syntax error: {msg}"),
            AssembleError::UnknownMnemonic { name, .. } => write!(f, "unknown mnemonic `{name}`"),
            AssembleError::UndefinedSymbol { name, .. } => write!(f, "undefined symbol `{name}`"),
            AssembleError::DuplicateSymbol { name, .. } => write!(f, "duplicate symbol `{name}`"),
            AssembleError::LayoutOverflow { used, limit, .. } => {
                write!(f, "layout overflow: {used} bytes used, {limit} available")
            }
        }
    }
}

impl std::error::Error for AssembleError {}

/// Fatal conditions the execution engine can hit. There is no recovery
/// and no instruction-level retry; the engine stops and surfaces these.
///
/// A failed `READ_FILE` is deliberately absent: it is a program-visible
/// condition reported through `AX = -1`, not a machine fault.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RuntimeError {
    /// Memory access outside the declared memory size.
    SegmentationFault { addr: u16 },
    /// `RET` or `POP` with nothing on the stack.
    StackUnderflow,
    /// Program counter ran past the end of the image without `HALT`.
    ImageOverrun { pc: u16 },
    /// Fetched a byte that is not a valid opcode or operand encoding.
    IllegalInstruction { pc: u16, byte: u8 },
    /// `SYSCALL` with a vector outside the recognized set.
    UnknownSyscall { vector: u8 },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::SegmentationFault { addr } => {
                write!(f, "segmentation fault: access at 0x{addr:04x}")
            }
            RuntimeError::StackUnderflow => write!(f, "stack underflow"),
            RuntimeError::ImageOverrun { pc } => {
                write!(f, "execution ran past the end of the image at 0x{pc:04x}")
            }
            RuntimeError::IllegalInstruction { pc, byte } => {
                write!(f, "illegal instruction 0x{byte:02x} at 0x{pc:04x}")
            }
            RuntimeError::UnknownSyscall { vector } => {
                write!(f, "unknown syscall vector 0x{vector:02x}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}
