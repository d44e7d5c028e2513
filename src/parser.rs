use std::borrow::Cow;
use std::str::FromStr;

use crate::air::{Air, DataItem, Imm, Label, Operand, Stmt, StmtKind};
use crate::error::AssembleError;
use crate::lexer::{tokenize, LiteralKind, Token, TokenKind};
use crate::symbol::{DataWidth, InstrKind, Span, Syscall};

/// Transforms the token stream into AIR.
pub struct AsmParser<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Lexed tokens, whitespace and comments already dropped
    toks: Vec<Token>,
    pos: usize,
    /// Span of the most recently consumed token, for statement spans
    prev_span: Span,
    /// Assembly intermediate representation
    air: Air,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str) -> Result<Self, AssembleError> {
        let toks = tokenize(src)?;
        Ok(AsmParser {
            src,
            toks,
            pos: 0,
            prev_span: Span::dummy(),
            air: Air::new(),
        })
    }

    /// Create AIR out of the token stream.
    pub fn parse(mut self) -> Result<Air, AssembleError> {
        loop {
            let label = self.optional_label();

            let Some(tok) = self.bump() else {
                if let Some(label) = label {
                    return Err(AssembleError::SyntaxError {
                        msg: "label is not attached to a statement".into(),
                        span: label.span,
                    });
                }
                break;
            };
            let start = tok.span;

            match tok.kind {
                TokenKind::Dir => {
                    if let Some(label) = label {
                        return Err(AssembleError::SyntaxError {
                            msg: "directives cannot be labeled".into(),
                            span: label.span,
                        });
                    }
                    self.parse_directive(start)?;
                }
                TokenKind::Ident => {
                    let name = self.get_span(start);
                    if let Ok(kind) = InstrKind::from_str(name) {
                        let stmt_kind = self.parse_instr(kind)?;
                        self.add_stmt(label, stmt_kind, start);
                    } else if name.eq_ignore_ascii_case("DB") {
                        let stmt_kind = self.parse_data(DataWidth::Byte)?;
                        self.add_stmt(label, stmt_kind, start);
                    } else if name.eq_ignore_ascii_case("DW") {
                        let stmt_kind = self.parse_data(DataWidth::Word)?;
                        self.add_stmt(label, stmt_kind, start);
                    } else {
                        return Err(AssembleError::UnknownMnemonic {
                            name: name.to_string(),
                            span: start,
                        });
                    }
                }
                unexpected => {
                    return Err(AssembleError::SyntaxError {
                        msg: format!("statement cannot start with {unexpected}"),
                        span: start,
                    })
                }
            }
        }
        Ok(self.air)
    }

    fn add_stmt(&mut self, label: Option<Label>, kind: StmtKind, start: Span) {
        let span = start.join(self.prev_span);
        self.air.add_stmt(Stmt { label, kind, span });
    }

    fn get_span(&self, span: Span) -> &'a str {
        &self.src[span.range()]
    }

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.toks.get(self.pos + 1)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.toks.get(self.pos).cloned()?;
        self.pos += 1;
        self.prev_span = tok.span;
        Some(tok)
    }

    /// Consume `ident:` if present and return it as a label definition.
    fn optional_label(&mut self) -> Option<Label> {
        match (self.peek(), self.peek_second()) {
            (Some(tok), Some(colon))
                if tok.kind == TokenKind::Ident && colon.kind == TokenKind::Colon =>
            {
                let span = tok.span;
                let name = self.get_span(span).to_string();
                self.bump();
                self.bump();
                Some(Label { name, span })
            }
            _ => None,
        }
    }

    fn parse_directive(&mut self, span: Span) -> Result<(), AssembleError> {
        let name = self.get_span(span);
        if !name.eq_ignore_ascii_case(".MEMORY") {
            return Err(AssembleError::UnknownMnemonic {
                name: name.to_string(),
                span,
            });
        }
        let (val, val_span) = self.expect_int()?;
        if val <= 0 || val > u16::MAX as i32 {
            return Err(AssembleError::SyntaxError {
                msg: format!("memory size must be between 1 and {}", u16::MAX),
                span: val_span,
            });
        }
        self.air.set_memory(val as u16, span)
    }

    /// Process operands to form valid instruction AIR.
    fn parse_instr(&mut self, kind: InstrKind) -> Result<StmtKind, AssembleError> {
        use InstrKind::*;
        let operands = match kind {
            Mov | Add | Sub => {
                let dst = self.expect_writable()?;
                let src = self.expect_operand()?;
                vec![dst, src]
            }
            Cmp => {
                let a = self.expect_operand()?;
                let b = self.expect_operand()?;
                vec![a, b]
            }
            Mul | Push => vec![self.expect_operand()?],
            Inc | Dec | Pop => vec![self.expect_writable()?],
            Jmp | Je | Jne | Jl | Jle | Jg | Jge | Loop | Call => {
                vec![self.expect_target()?]
            }
            Ret | Halt => vec![],
            Syscall => {
                let tok = self.expect(TokenKind::Ident)?;
                let name = self.get_span(tok.span);
                let call = crate::symbol::Syscall::from_str(name).map_err(|_| {
                    AssembleError::UnknownMnemonic {
                        name: name.to_string(),
                        span: tok.span,
                    }
                })?;
                return Ok(StmtKind::Syscall {
                    vect: call.vector(),
                });
            }
        };
        Ok(StmtKind::Instr { kind, operands })
    }

    /// Parse a `DB`/`DW` initializer list: literals, strings, and
    /// `value DUP(n)` fills, at least one item.
    fn parse_data(&mut self, width: DataWidth) -> Result<StmtKind, AssembleError> {
        let mut items = Vec::new();
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::Lit(LiteralKind::Str) => {
                    let tok = self.bump().unwrap();
                    let raw = self.get_span(tok.span);
                    let text = unescape(&raw[1..raw.len() - 1]);
                    items.push(DataItem::Str(text.into_owned()));
                }
                TokenKind::Lit(LiteralKind::Char) => {
                    let tok = self.bump().unwrap();
                    let val = self.char_value(&tok)?;
                    items.push(DataItem::Int(val as u16));
                }
                TokenKind::Lit(LiteralKind::Dec(_) | LiteralKind::Hex(_)) => {
                    let (val, _) = self.expect_int()?;
                    let value = val as u16;
                    items.push(match self.try_dup()? {
                        Some(count) => DataItem::Dup { value, count },
                        None => DataItem::Int(value),
                    });
                }
                _ => break,
            }
        }
        if items.is_empty() {
            return Err(AssembleError::SyntaxError {
                msg: "data definition needs at least one initializer".into(),
                span: self.prev_span,
            });
        }
        Ok(StmtKind::Data { width, items })
    }

    /// Consume `DUP(n)` if it follows a numeric item.
    fn try_dup(&mut self) -> Result<Option<u16>, AssembleError> {
        match self.peek() {
            Some(tok)
                if tok.kind == TokenKind::Ident
                    && self.get_span(tok.span).eq_ignore_ascii_case("DUP") =>
            {
                self.bump();
                self.expect(TokenKind::LParen)?;
                let (count, span) = self.expect_int()?;
                if count < 0 || count > u16::MAX as i32 {
                    return Err(AssembleError::SyntaxError {
                        msg: "DUP count must be a non-negative 16-bit value".into(),
                        span,
                    });
                }
                self.expect(TokenKind::RParen)?;
                Ok(Some(count as u16))
            }
            _ => Ok(None),
        }
    }

    /// Any operand form: register, immediate, character, bare label,
    /// `[reg]`, `[label]`, or `[reg±offset]`.
    fn expect_operand(&mut self) -> Result<Operand, AssembleError> {
        let tok = self.bump().ok_or_else(|| self.eof_error())?;
        Ok(match tok.kind {
            TokenKind::Reg(reg) => Operand::Reg(reg),
            TokenKind::Lit(LiteralKind::Dec(val)) => Operand::Imm(Imm::Lit(val as u16)),
            TokenKind::Lit(LiteralKind::Hex(val)) => Operand::Imm(Imm::Lit(val)),
            TokenKind::Lit(LiteralKind::Char) => {
                Operand::Imm(Imm::Lit(self.char_value(&tok)? as u16))
            }
            TokenKind::Ident => Operand::Imm(Imm::Label(Label {
                name: self.get_span(tok.span).to_string(),
                span: tok.span,
            })),
            TokenKind::LBracket => {
                let operand = self.parse_bracket()?;
                self.expect(TokenKind::RBracket)?;
                operand
            }
            unexpected => {
                return Err(AssembleError::SyntaxError {
                    msg: format!("expected an operand, found {unexpected}"),
                    span: tok.span,
                })
            }
        })
    }

    /// The inside of a `[...]` memory operand.
    fn parse_bracket(&mut self) -> Result<Operand, AssembleError> {
        let tok = self.bump().ok_or_else(|| self.eof_error())?;
        match tok.kind {
            TokenKind::Ident => Ok(Operand::MemLabel(Label {
                name: self.get_span(tok.span).to_string(),
                span: tok.span,
            })),
            TokenKind::Reg(reg) => {
                let disp = match self.peek().map(|t| t.kind) {
                    Some(TokenKind::RBracket) => return Ok(Operand::MemReg(reg)),
                    // Sign folded into the literal: `[FP-2]`
                    Some(TokenKind::Lit(_)) => self.expect_disp()?,
                    Some(TokenKind::Plus) => {
                        self.bump();
                        self.expect_disp()?
                    }
                    Some(TokenKind::Minus) => {
                        self.bump();
                        self.expect_disp()?.wrapping_neg()
                    }
                    _ => {
                        let tok = self.bump().ok_or_else(|| self.eof_error())?;
                        return Err(AssembleError::SyntaxError {
                            msg: format!("expected `]` or a displacement, found {}", tok.kind),
                            span: tok.span,
                        });
                    }
                };
                Ok(Operand::MemDisp(reg, disp))
            }
            unexpected => Err(AssembleError::SyntaxError {
                msg: format!("expected a register or label inside `[]`, found {unexpected}"),
                span: tok.span,
            }),
        }
    }

    fn expect_disp(&mut self) -> Result<i16, AssembleError> {
        let (val, span) = self.expect_int()?;
        if val < i16::MIN as i32 || val > i16::MAX as i32 {
            return Err(AssembleError::SyntaxError {
                msg: "displacement does not fit in a signed 16-bit offset".into(),
                span,
            });
        }
        Ok(val as i16)
    }

    /// Like `expect_operand` but requires something an instruction can
    /// store into.
    fn expect_writable(&mut self) -> Result<Operand, AssembleError> {
        let span_before = self.peek().map(|t| t.span);
        let operand = self.expect_operand()?;
        if !operand.is_writable() {
            return Err(AssembleError::SyntaxError {
                msg: "destination operand must be a register or memory".into(),
                span: span_before.unwrap_or(self.prev_span),
            });
        }
        Ok(operand)
    }

    /// A control transfer target: a label or an absolute address.
    fn expect_target(&mut self) -> Result<Operand, AssembleError> {
        let tok = self.bump().ok_or_else(|| self.eof_error())?;
        Ok(match tok.kind {
            TokenKind::Ident => Operand::Imm(Imm::Label(Label {
                name: self.get_span(tok.span).to_string(),
                span: tok.span,
            })),
            TokenKind::Lit(LiteralKind::Dec(val)) => Operand::Imm(Imm::Lit(val as u16)),
            TokenKind::Lit(LiteralKind::Hex(val)) => Operand::Imm(Imm::Lit(val)),
            unexpected => {
                return Err(AssembleError::SyntaxError {
                    msg: format!("expected a jump target, found {unexpected}"),
                    span: tok.span,
                })
            }
        })
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, AssembleError> {
        match self.bump() {
            Some(tok) if tok.kind == expected => Ok(tok),
            Some(unexpected) => Err(AssembleError::SyntaxError {
                msg: format!("expected {expected}, found {}", unexpected.kind),
                span: unexpected.span,
            }),
            None => Err(self.eof_error()),
        }
    }

    fn expect_int(&mut self) -> Result<(i32, Span), AssembleError> {
        match self.bump() {
            Some(tok) => match tok.kind {
                TokenKind::Lit(LiteralKind::Dec(val)) => Ok((val, tok.span)),
                TokenKind::Lit(LiteralKind::Hex(val)) => Ok((val as i32, tok.span)),
                unexpected => Err(AssembleError::SyntaxError {
                    msg: format!("expected a numeric literal, found {unexpected}"),
                    span: tok.span,
                }),
            },
            None => Err(self.eof_error()),
        }
    }

    /// Decode a character literal token into its byte value.
    fn char_value(&self, tok: &Token) -> Result<u8, AssembleError> {
        let raw = self.get_span(tok.span);
        let inner = unescape(&raw[1..raw.len() - 1]);
        let mut chars = inner.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Ok(c as u8),
            _ => Err(AssembleError::SyntaxError {
                msg: "character literal must be a single ASCII character".into(),
                span: tok.span,
            }),
        }
    }

    fn eof_error(&self) -> AssembleError {
        AssembleError::SyntaxError {
            msg: "unexpected end of file; the last statement is missing operands".into(),
            span: self.prev_span,
        }
    }
}

/// Resolve C-style escapes in string and character literals.
pub(crate) fn unescape(s: &str) -> Cow<str> {
    if s.find('\\').is_none() {
        return Cow::Borrowed(s);
    }
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                // Trailing backslash; include it as is
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Register;

    fn parse(src: &str) -> Result<Air, AssembleError> {
        AsmParser::new(src)?.parse()
    }

    #[test]
    fn parse_mov_imm() {
        let air = parse("MOV AX, 5").unwrap();
        assert_eq!(
            air.get(0).kind,
            StmtKind::Instr {
                kind: InstrKind::Mov,
                operands: vec![Operand::Reg(Register::Ax), Operand::Imm(Imm::Lit(5))],
            }
        );
    }

    #[test]
    fn parse_label_and_forward_ref() {
        let air = parse("JMP main\nmain: HALT").unwrap();
        assert_eq!(air.len(), 2);
        assert!(air.get(0).label.is_none());
        assert_eq!(air.get(1).label.as_ref().unwrap().name, "main");
        match &air.get(0).kind {
            StmtKind::Instr { operands, .. } => match &operands[0] {
                Operand::Imm(Imm::Label(label)) => assert_eq!(label.name, "main"),
                other => panic!("expected label operand, got {other:?}"),
            },
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn parse_addressing_modes() {
        let air = parse("MOV AX, [BX]\nMOV [counter], AX\nMOV CX, [FP-2]\nMOV DX, [FP + 4]")
            .unwrap();
        let operand = |idx: usize, which: usize| match &air.get(idx).kind {
            StmtKind::Instr { operands, .. } => operands[which].clone(),
            _ => unreachable!(),
        };
        assert_eq!(operand(0, 1), Operand::MemReg(Register::Bx));
        assert!(matches!(operand(1, 0), Operand::MemLabel(ref l) if l.name == "counter"));
        assert_eq!(operand(2, 1), Operand::MemDisp(Register::Fp, -2));
        assert_eq!(operand(3, 1), Operand::MemDisp(Register::Fp, 4));
    }

    #[test]
    fn parse_char_operand() {
        let air = parse(r"MOV AX, '\n'").unwrap();
        match &air.get(0).kind {
            StmtKind::Instr { operands, .. } => {
                assert_eq!(operands[1], Operand::Imm(Imm::Lit(b'\n' as u16)))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_syscall() {
        let air = parse("SYSCALL PRINT_INT").unwrap();
        assert_eq!(
            air.get(0).kind,
            StmtKind::Syscall {
                vect: Syscall::PrintInt.vector()
            }
        );
    }

    #[test]
    fn parse_syscall_unknown_name() {
        assert!(matches!(
            parse("SYSCALL FROBNICATE"),
            Err(AssembleError::UnknownMnemonic { name, .. }) if name == "FROBNICATE"
        ));
    }

    #[test]
    fn parse_db_string_and_terminator() {
        let air = parse(r#"msg: DB "hi\n", '\0'"#).unwrap();
        assert_eq!(
            air.get(0).kind,
            StmtKind::Data {
                width: DataWidth::Byte,
                items: vec![DataItem::Str("hi\n".into()), DataItem::Int(0)],
            }
        );
    }

    #[test]
    fn parse_dw_dup() {
        let air = parse("grid: DW 0 DUP(1440)").unwrap();
        assert_eq!(
            air.get(0).kind,
            StmtKind::Data {
                width: DataWidth::Word,
                items: vec![DataItem::Dup {
                    value: 0,
                    count: 1440
                }],
            }
        );
    }

    #[test]
    fn parse_memory_directive() {
        let air = parse(".MEMORY 8192\nHALT").unwrap();
        assert_eq!(air.memory_size(), 8192);
        assert!(parse(".MEMORY 100\n.MEMORY 200").is_err());
    }

    #[test]
    fn parse_unknown_mnemonic() {
        assert!(matches!(
            parse("FLY AX, 1"),
            Err(AssembleError::UnknownMnemonic { name, .. }) if name == "FLY"
        ));
    }

    #[test]
    fn parse_imm_destination_rejected() {
        assert!(matches!(
            parse("MOV 5, AX"),
            Err(AssembleError::SyntaxError { .. })
        ));
    }

    #[test]
    fn parse_dangling_label() {
        assert!(matches!(
            parse("MOV AX, 1\nend:"),
            Err(AssembleError::SyntaxError { .. })
        ));
    }

    #[test]
    fn parse_missing_operand() {
        assert!(matches!(
            parse("MOV AX,"),
            Err(AssembleError::SyntaxError { .. })
        ));
    }
}
