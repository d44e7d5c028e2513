use crate::air::{Air, StmtKind};
use crate::error::AssembleError;
use crate::parser::AsmParser;
use crate::symbol::{SymbolInfo, SymbolKind, SymbolTable};

/// The combined, fully-resolved code+data byte sequence produced by the
/// assembler. Immutable after assembly.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExecutableImage {
    /// Code region followed by the data region
    bytes: Vec<u8>,
    /// Byte length of the code region
    code_len: usize,
    /// Address execution starts at: `main` if defined, else 0
    entry: u16,
    /// Declared (or default) memory size in bytes
    memory_size: usize,
}

const MAGIC: &[u8; 4] = b"X366";

impl ExecutableImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn code_len(&self) -> usize {
        self.code_len
    }

    pub fn entry(&self) -> u16 {
        self.entry
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Serialize to the flat `.x3` container format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + 10);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.memory_size as u16).to_le_bytes());
        out.extend_from_slice(&self.entry.to_le_bytes());
        out.extend_from_slice(&(self.code_len as u16).to_le_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    /// Load a flat `.x3` container produced by `to_bytes`.
    pub fn from_bytes(raw: &[u8]) -> Result<ExecutableImage, String> {
        if raw.len() < 10 || &raw[0..4] != MAGIC {
            return Err("not an x366 image (bad magic)".into());
        }
        let word = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let memory_size = word(4) as usize;
        let entry = word(6);
        let code_len = word(8) as usize;
        let bytes = raw[10..].to_vec();
        if code_len > bytes.len() {
            return Err("image header is inconsistent with its payload".into());
        }
        if bytes.len() > memory_size {
            return Err("image does not fit in its declared memory".into());
        }
        Ok(ExecutableImage {
            bytes,
            code_len,
            entry,
            memory_size,
        })
    }
}

/// Assemble source text into an executable image.
///
/// Holds no state across calls; the symbol table lives and dies inside.
pub fn assemble(src: &str) -> Result<ExecutableImage, AssembleError> {
    let air = AsmParser::new(src)?.parse()?;
    emit(&air)
}

/// Lower AIR to a resolved image: pass 1 assigns every address, pass 2
/// resolves references and emits bytes.
pub fn emit(air: &Air) -> Result<ExecutableImage, AssembleError> {
    let memory_size = air.memory_size() as usize;

    // Sizing walk: encoded lengths are known from syntax alone, so the
    // split point between code and data exists before any label resolves.
    let mut code_len = 0usize;
    let mut data_len = 0usize;
    for stmt in air.iter() {
        let size = stmt.kind.encoded_size();
        if stmt.kind.is_data() {
            data_len += size;
        } else {
            code_len += size;
        }
    }

    // Pass 1: walk statements in source order, tracking a code cursor and
    // a data cursor, and record each label's address. Data statements may
    // be interleaved with code but always land in the data region.
    let mut symbols = SymbolTable::new();
    let mut code_addr = 0usize;
    let mut data_addr = code_len;
    for stmt in air.iter() {
        let size = stmt.kind.encoded_size();
        let (addr, kind) = if stmt.kind.is_data() {
            let addr = data_addr;
            data_addr += size;
            (addr, SymbolKind::Data { len: size as u16 })
        } else {
            let addr = code_addr;
            code_addr += size;
            (addr, SymbolKind::Code)
        };
        if addr + size > memory_size {
            return Err(AssembleError::LayoutOverflow {
                used: code_len + data_len,
                limit: memory_size,
                span: stmt.span,
            });
        }
        if let Some(label) = &stmt.label {
            symbols.insert(
                &label.name,
                SymbolInfo {
                    addr: addr as u16,
                    kind,
                },
                label.span,
            )?;
        }
    }

    // Pass 2: re-walk and emit final bytes, resolving every symbolic
    // operand against the completed table.
    let mut bytes = Vec::with_capacity(code_len + data_len);
    for stmt in air.iter() {
        match &stmt.kind {
            StmtKind::Instr { kind, operands } => {
                bytes.push(kind.opcode());
                for operand in operands {
                    let (mode, payload) = operand.emit(&symbols)?;
                    bytes.push(mode);
                    if let Some(word) = payload {
                        bytes.extend_from_slice(&word.to_le_bytes());
                    }
                }
            }
            StmtKind::Syscall { vect } => {
                bytes.push(crate::symbol::InstrKind::Syscall.opcode());
                bytes.push(*vect);
            }
            StmtKind::Data { .. } => {}
        }
    }
    debug_assert_eq!(bytes.len(), code_len);
    for stmt in air.iter() {
        if let StmtKind::Data { width, items } = &stmt.kind {
            for item in items {
                item.emit(*width, &mut bytes);
            }
        }
    }
    debug_assert_eq!(bytes.len(), code_len + data_len);

    let entry = symbols.get("main").map(|info| info.addr).unwrap_or(0);

    Ok(ExecutableImage {
        bytes,
        code_len,
        entry,
        memory_size,
    })
}
