use std::fmt;
use std::str::FromStr;

use crate::error::AssembleError;
use crate::lexer::cursor::Cursor;
use crate::symbol::{Register, Span, SrcOffset};

pub mod cursor;

/// A spanned token carrying everything the parser needs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralKind {
    /// Decimal literal with optional sign, value already parsed.
    Dec(i32),
    /// `0x`-prefixed hex literal.
    Hex(u16),
    /// Character literal; contents decoded by the parser from the span.
    Char,
    /// String literal; contents decoded by the parser from the span.
    Str,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Ident,
    Reg(Register),
    Lit(LiteralKind),
    /// `.`-prefixed directive
    Dir,
    Colon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Plus,
    Minus,
    /// Also includes commas
    Whitespace,
    Comment,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Reg(_) => "register",
            TokenKind::Lit(LiteralKind::Dec(_)) | TokenKind::Lit(LiteralKind::Hex(_)) => {
                "numeric literal"
            }
            TokenKind::Lit(LiteralKind::Char) => "character literal",
            TokenKind::Lit(LiteralKind::Str) => "string literal",
            TokenKind::Dir => "directive",
            TokenKind::Colon => "`:`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::Eof => "end of file",
        };
        f.write_str(s)
    }
}

/// Test if a character is considered to be whitespace.
/// Commas only separate operands, so they count as whitespace too.
pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\t' | '\r' | ',')
}

/// Test if a character may continue an identifier.
pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

/// Test if a character may start an identifier. Labels must not start
/// with a digit so that bare numbers always lex as literals.
pub(crate) fn is_id_start(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_')
}

/// Lex the whole source, dropping whitespace and comments.
pub fn tokenize(src: &str) -> Result<Vec<Token>, AssembleError> {
    let mut cur = Cursor::new(src);
    let mut res = Vec::new();
    loop {
        let token = cur.advance_token(src)?;
        match token.kind {
            TokenKind::Eof => break,
            TokenKind::Whitespace | TokenKind::Comment => continue,
            _ => res.push(token),
        }
    }
    Ok(res)
}

impl Cursor<'_> {
    pub fn advance_token(&mut self, src: &str) -> Result<Token, AssembleError> {
        let start = self.abs_pos();
        let first_char = match self.bump() {
            Some(c) => c,
            None => {
                return Ok(Token::new(
                    TokenKind::Eof,
                    Span::new(SrcOffset(start), 0),
                ))
            }
        };
        let kind = match first_char {
            ';' => {
                self.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            c if is_whitespace(c) => {
                self.take_while(is_whitespace);
                TokenKind::Whitespace
            }
            ':' => TokenKind::Colon,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            // A sign immediately followed by a digit folds into the literal,
            // so `[FP-2]` and `CMP AX, -1` both lex naturally.
            '+' if !self.first().is_ascii_digit() => TokenKind::Plus,
            '-' if !self.first().is_ascii_digit() => TokenKind::Minus,
            '0' if matches!(self.first(), 'x' | 'X') => {
                self.bump();
                self.take_while(|c| c.is_ascii_hexdigit());
                let span = self.span_from(start);
                let digits = &src[span.offs() + 2..span.end()];
                let value = u16::from_str_radix(digits, 16).map_err(|e| {
                    AssembleError::SyntaxError {
                        msg: format!("invalid hex literal: {e}"),
                        span,
                    }
                })?;
                TokenKind::Lit(LiteralKind::Hex(value))
            }
            c if c.is_ascii_digit() || c == '+' || c == '-' => {
                self.take_while(|c| c.is_ascii_digit());
                let span = self.span_from(start);
                let text = &src[span.range()];
                let value: i32 = text.parse().map_err(|e| AssembleError::SyntaxError {
                    msg: format!("invalid integer literal: {e}"),
                    span,
                })?;
                if value < i16::MIN as i32 || value > u16::MAX as i32 {
                    return Err(AssembleError::SyntaxError {
                        msg: format!("integer literal {value} does not fit in 16 bits"),
                        span,
                    });
                }
                TokenKind::Lit(LiteralKind::Dec(value))
            }
            '\'' => {
                if self.first() == '\\' {
                    self.bump();
                }
                self.bump();
                if self.first() != '\'' {
                    return Err(AssembleError::SyntaxError {
                        msg: "unterminated character literal".into(),
                        span: self.span_from(start),
                    });
                }
                self.bump();
                TokenKind::Lit(LiteralKind::Char)
            }
            '"' => {
                loop {
                    match self.bump() {
                        Some('"') => break,
                        Some('\\') => {
                            self.bump();
                        }
                        Some(_) => {}
                        None => {
                            return Err(AssembleError::SyntaxError {
                                msg: "unterminated string literal".into(),
                                span: self.span_from(start),
                            })
                        }
                    }
                }
                TokenKind::Lit(LiteralKind::Str)
            }
            '.' => {
                self.take_while(is_id);
                TokenKind::Dir
            }
            c if is_id_start(c) => {
                self.take_while(is_id);
                let span = self.span_from(start);
                match Register::from_str(&src[span.range()]) {
                    Ok(reg) => TokenKind::Reg(reg),
                    Err(_) => TokenKind::Ident,
                }
            }
            c => {
                return Err(AssembleError::SyntaxError {
                    msg: format!("unexpected character `{c}`"),
                    span: self.span_from(start),
                })
            }
        };
        Ok(Token::new(kind, self.span_from(start)))
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(SrcOffset(start), self.abs_pos() - start)
    }
}
