//! Tokeniser for contract source.

use super::errors::{CompileError, Position};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Keyword {
    Contract,
    Clause,
    Extends,
    Locks,
    Of,
    Requires,
    Verify,
    Lock,
    Unlock,
    With,
    If,
    Else,
    Define,
    Assign,
    Import,
    True,
    False,
}

impl Keyword {
    fn from_ident(s: &str) -> Option<Keyword> {
        Some(match s {
            "contract" => Keyword::Contract,
            "clause" => Keyword::Clause,
            "extends" => Keyword::Extends,
            "locks" => Keyword::Locks,
            "of" => Keyword::Of,
            "requires" => Keyword::Requires,
            "verify" => Keyword::Verify,
            "lock" => Keyword::Lock,
            "unlock" => Keyword::Unlock,
            "with" => Keyword::With,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "define" => Keyword::Define,
            "assign" => Keyword::Assign,
            "import" => Keyword::Import,
            "true" => Keyword::True,
            "false" => Keyword::False,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Contract => "contract",
            Keyword::Clause => "clause",
            Keyword::Extends => "extends",
            Keyword::Locks => "locks",
            Keyword::Of => "of",
            Keyword::Requires => "requires",
            Keyword::Verify => "verify",
            Keyword::Lock => "lock",
            Keyword::Unlock => "unlock",
            Keyword::With => "with",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::Define => "define",
            Keyword::Assign => "assign",
            Keyword::Import => "import",
            Keyword::True => "true",
            Keyword::False => "false",
        }
    }

    /// Every reserved word, `pragma` included.
    pub const RESERVED: &'static [&'static str] = &[
        "contract", "clause", "extends", "locks", "of", "requires", "verify", "lock", "unlock",
        "with", "if", "else", "define", "assign", "import", "true", "false", "pragma",
    ];
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokKind {
    Ident(String),
    Keyword(Keyword),
    Int(u64),
    /// `0x...` literal.
    Hex(Vec<u8>),
    /// Double-quoted string, escapes resolved.
    Str(Vec<u8>),
    /// `pragma version <constraint>`, constraint text as written.
    Pragma(String),
    /// Operators and delimiters.
    Punct(&'static str),
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokKind,
    pub pos: Position,
}

/// Longest first so that `<<` wins over `<`.
const PUNCTS: [&str; 31] = [
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "(", ")", "{", "}", "[", "]", ",", ":", ";",
    "=", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "~", "!", ".",
];

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    fn position(&self) -> Position {
        Position {
            offset: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn error(pos: Position, message: impl Into<String>) -> CompileError {
        CompileError::Lex {
            pos,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            self.bump_while(char::is_whitespace);
            if self.rest().starts_with("//") {
                self.bump_while(|c| c != '\n');
            } else {
                return;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, CompileError> {
        self.skip_trivia();
        let pos = self.position();
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let kind = if c.is_ascii_alphabetic() || c == '_' {
            let word = self.bump_while(|c| c.is_ascii_alphanumeric() || c == '_');
            if word == "pragma" {
                self.pragma(pos)?
            } else {
                match Keyword::from_ident(word) {
                    Some(kw) => TokKind::Keyword(kw),
                    None => TokKind::Ident(word.to_string()),
                }
            }
        } else if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.bump();
            self.bump();
            let digits = self.bump_while(|c| c.is_ascii_hexdigit());
            if self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
                return Err(Self::error(self.position(), "invalid hex digit"));
            }
            let bytes = hex::decode(digits)
                .map_err(|_| Self::error(pos, "hex literal needs an even number of digits"))?;
            TokKind::Hex(bytes)
        } else if c.is_ascii_digit() {
            let digits = self.bump_while(|c| c.is_ascii_digit());
            if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                return Err(Self::error(self.position(), "invalid digit in integer literal"));
            }
            let n = digits
                .parse::<u64>()
                .map_err(|_| Self::error(pos, format!("integer {digits} does not fit 64 bits")))?;
            TokKind::Int(n)
        } else if c == '"' {
            self.bump();
            TokKind::Str(self.string_body(pos)?)
        } else if let Some(p) = PUNCTS.iter().find(|p| self.rest().starts_with(**p)) {
            for _ in 0..p.len() {
                self.bump();
            }
            TokKind::Punct(*p)
        } else {
            return Err(Self::error(pos, format!("unexpected character '{c}'")));
        };

        Ok(Some(Token { kind, pos }))
    }

    /// Reads `version <constraint>` up to `;` or end of line.
    fn pragma(&mut self, pos: Position) -> Result<TokKind, CompileError> {
        self.bump_while(|c| c == ' ' || c == '\t');
        let word = self.bump_while(|c| c.is_ascii_alphanumeric());
        if word != "version" {
            return Err(Self::error(pos, "expected \"version\" after pragma"));
        }
        let constraint = self.bump_while(|c| c != ';' && c != '\n').trim().to_string();
        if constraint.is_empty() {
            return Err(Self::error(pos, "pragma version needs a constraint"));
        }
        if self.peek() == Some(';') {
            self.bump();
        }
        Ok(TokKind::Pragma(constraint))
    }

    fn string_body(&mut self, start: Position) -> Result<Vec<u8>, CompileError> {
        let mut out = Vec::new();
        loop {
            let pos = self.position();
            let Some(c) = self.bump() else {
                return Err(Self::error(start, "unterminated string literal"));
            };
            match c {
                '"' => return Ok(out),
                '\n' => return Err(Self::error(start, "unterminated string literal")),
                '\\' => {
                    let escaped = match self.bump() {
                        Some('n') => b'\n',
                        Some('t') => b'\t',
                        Some('r') => b'\r',
                        Some('0') => 0,
                        Some('\\') => b'\\',
                        Some('"') => b'"',
                        Some('x') => {
                            let digits: String = (0..2).filter_map(|_| self.bump()).collect();
                            u8::from_str_radix(&digits, 16).map_err(|_| {
                                Self::error(pos, format!("bad escape \\x{digits}"))
                            })?
                        }
                        Some(other) => {
                            return Err(Self::error(pos, format!("bad escape \\{other}")));
                        }
                        None => return Err(Self::error(start, "unterminated string literal")),
                    };
                    out.push(escaped);
                }
                other => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }
}

/// Splits `src` into tokens.
pub fn lex(src: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer {
        src,
        pos: 0,
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next_token()? {
        tokens.push(tok);
    }
    Ok(tokens)
}
