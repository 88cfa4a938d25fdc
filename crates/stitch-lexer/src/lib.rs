//! Lexer for Stitch scripts.
//!
//! Stitch is line-oriented: every statement sits on its own line and blocks
//! are delimited by indentation. The lexer therefore produces one [`Line`]
//! per non-blank, non-comment source line, recording its indentation and
//! its tokens. Block structure is left to the parser.

pub mod token;

use std::iter::Peekable;
use std::str::Chars;

pub use token::{Keyword, Token, TokenKind};

/// A lexed source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// 1-based line number in the lexed text.
    pub number: usize,
    /// Leading whitespace width (each space or tab counts as one column).
    pub indent: usize,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("line {line}, column {column}: unexpected character {found:?}")]
    UnexpectedChar {
        line: usize,
        column: usize,
        found: char,
    },
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
    #[error("line {line}: unknown escape sequence \\{escape}")]
    UnknownEscape { line: usize, escape: char },
    #[error("line {line}: malformed number {text:?}")]
    MalformedNumber { line: usize, text: String },
}

/// Width of the leading whitespace of `line`.
pub fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// True for lines that carry no code: empty, whitespace-only or `#` comments.
pub fn is_trivia(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Lex a whole script.
pub fn lex_str(source: &str) -> Result<Vec<Line>, LexError> {
    let mut lines = Vec::new();
    for (idx, text) in source.lines().enumerate() {
        if is_trivia(text) {
            continue;
        }
        let number = idx + 1;
        let indent = indent_width(text);
        let tokens = LineLexer::new(text, number).run()?;
        lines.push(Line {
            number,
            indent,
            tokens,
        });
    }
    Ok(lines)
}

struct LineLexer<'src> {
    chars: Peekable<Chars<'src>>,
    line: usize,
    column: usize,
}

impl<'src> LineLexer<'src> {
    fn new(text: &'src str, line: usize) -> Self {
        Self {
            chars: text.chars().peekable(),
            line,
            column: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.column += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.bump();
                continue;
            }
            // Trailing comment ends the line
            if c == '#' {
                break;
            }
            let column = self.column + 1;
            let kind = self.next_kind()?;
            tokens.push(Token::new(kind, column));
        }
        Ok(tokens)
    }

    fn next_kind(&mut self) -> Result<TokenKind, LexError> {
        let column = self.column + 1;
        let Some(c) = self.bump() else {
            unreachable!("next_kind called at end of line");
        };

        let kind = match c {
            '@' => TokenKind::At,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '%' => TokenKind::Percent,
            '+' if self.eat('=') => TokenKind::PlusAssign,
            '+' => TokenKind::Plus,
            '-' if self.eat('=') => TokenKind::MinusAssign,
            '-' => TokenKind::Minus,
            '*' if self.eat('=') => TokenKind::StarAssign,
            '*' => TokenKind::Star,
            '/' if self.eat('=') => TokenKind::SlashAssign,
            '/' => TokenKind::Slash,
            '=' if self.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => TokenKind::NotEq,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '"' | '\'' => self.string(c)?,
            c if c.is_ascii_digit() => self.number(c)?,
            c if c == '_' || c.is_alphabetic() => self.ident(c),
            found => {
                return Err(LexError::UnexpectedChar {
                    line: self.line,
                    column,
                    found,
                });
            }
        };
        Ok(kind)
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(LexError::UnterminatedString { line: self.line });
            };
            match c {
                c if c == quote => return Ok(TokenKind::Str(value)),
                '\\' => {
                    let Some(escape) = self.bump() else {
                        return Err(LexError::UnterminatedString { line: self.line });
                    };
                    let ch = match escape {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '\\' | '"' | '\'' => escape,
                        other => {
                            return Err(LexError::UnknownEscape {
                                line: self.line,
                                escape: other,
                            });
                        }
                    };
                    value.push(ch);
                }
                c => value.push(c),
            }
        }
    }

    fn number(&mut self, first: char) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        let mut seen_dot = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.bump();
        }
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        cleaned
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| LexError::MalformedNumber {
                line: self.line,
                text,
            })
    }

    fn ident(&mut self, first: char) -> TokenKind {
        let mut name = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c == '_' || c.is_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match Keyword::from_ident(&name) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(name),
        }
    }
}
