// Assembling
mod lexer;
mod parser;
pub use parser::AsmParser;
mod air;
pub use air::{Air, DEFAULT_MEMORY};
mod image;
pub use image::{assemble, ExecutableImage};
mod symbol;
pub use symbol::{Register, Span, SrcOffset, Syscall, SymbolInfo, SymbolKind, SymbolTable};

// Running
mod runtime;
pub use runtime::{Flags, RunState, Step, StopReason, DEFAULT_COLOR};
mod syscall;
mod framebuffer;
pub use framebuffer::{Framebuffer, DISPLAY_HEIGHT, DISPLAY_WIDTH};
mod host;
pub use host::{
    BufferedOut, CaptureDisplay, Display, FileSystem, Host, LocalFs, MemFs, OutputSink,
    StdoutSink, TermDisplay,
};

mod error;
pub use error::{AssembleError, RuntimeError};

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
