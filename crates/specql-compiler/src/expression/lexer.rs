//! Lexer (tokenizer) for action expressions.

use super::error::{ExpressionError, ExpressionResult};

/// Token types.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords (case-insensitive)
    And,
    Or,
    Not,
    In,
    Is,
    Null,
    True,
    False,
    Like,
    ILike,
    Between,
    Exists,
    Select,

    // Literals
    Ident(String),
    Number(String),
    String(String),

    // Symbols
    LParen,
    RParen,
    Comma,
    Dot,
    DoubleColon,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,

    // Never valid; kept as tokens so the security scan can name them.
    Semicolon,
    Comment,

    Eof,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::In => "IN",
            TokenKind::Is => "IS",
            TokenKind::Null => "NULL",
            TokenKind::True => "TRUE",
            TokenKind::False => "FALSE",
            TokenKind::Like => "LIKE",
            TokenKind::ILike => "ILIKE",
            TokenKind::Between => "BETWEEN",
            TokenKind::Exists => "EXISTS",
            TokenKind::Select => "SELECT",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Number(_) => "number",
            TokenKind::String(_) => "string",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::DoubleColon => "::",
            TokenKind::Eq => "=",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Concat => "||",
            TokenKind::Semicolon => ";",
            TokenKind::Comment => "comment",
            TokenKind::Eof => "end of expression",
        }
    }

    fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "IN" => TokenKind::In,
            "IS" => TokenKind::Is,
            "NULL" => TokenKind::Null,
            "TRUE" => TokenKind::True,
            "FALSE" => TokenKind::False,
            "LIKE" => TokenKind::Like,
            "ILIKE" => TokenKind::ILike,
            "BETWEEN" => TokenKind::Between,
            "EXISTS" => TokenKind::Exists,
            "SELECT" => TokenKind::Select,
            _ => return None,
        };
        Some(kind)
    }
}

/// A token with its byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Lexer state.
pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            pos: 0,
        }
    }

    /// Tokenize all input into a vector of tokens ending with `Eof`.
    pub fn tokenize(mut self) -> ExpressionResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn next_char(&mut self) -> Option<char> {
        let (pos, c) = self.chars.next()?;
        self.pos = pos + c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == ' ' || c == '\t' || c == '\n' || c == '\r' {
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> ExpressionResult<Token> {
        self.skip_whitespace();

        let start = self.pos;
        let Some(c) = self.next_char() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                start,
                end: start,
            });
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Eq,
            '-' => {
                if self.peek_char() == Some('-') {
                    self.next_char();
                    TokenKind::Comment
                } else {
                    TokenKind::Minus
                }
            }
            '/' => {
                if self.peek_char() == Some('*') {
                    self.next_char();
                    TokenKind::Comment
                } else {
                    TokenKind::Slash
                }
            }
            ':' => {
                if self.peek_char() == Some(':') {
                    self.next_char();
                    TokenKind::DoubleColon
                } else {
                    return Err(ExpressionError::syntax("unexpected character ':'", start));
                }
            }
            '|' => {
                if self.peek_char() == Some('|') {
                    self.next_char();
                    TokenKind::Concat
                } else {
                    return Err(ExpressionError::syntax("unexpected character '|'", start));
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.next_char();
                    TokenKind::NotEq
                } else {
                    return Err(ExpressionError::syntax("unexpected character '!'", start));
                }
            }
            '<' => match self.peek_char() {
                Some('=') => {
                    self.next_char();
                    TokenKind::LtEq
                }
                Some('>') => {
                    self.next_char();
                    TokenKind::NotEq
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if self.peek_char() == Some('=') {
                    self.next_char();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '\'' => self.read_string(start)?,
            '\\' => return Err(ExpressionError::security("backslash escapes are not allowed")),
            c if c.is_control() => {
                return Err(ExpressionError::security("control characters are not allowed"))
            }
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_word(start),
            other => {
                return Err(ExpressionError::syntax(
                    format!("unexpected character '{}'", other),
                    start,
                ))
            }
        };

        Ok(Token {
            kind,
            start,
            end: self.pos,
        })
    }

    fn read_string(&mut self, start: usize) -> ExpressionResult<TokenKind> {
        let mut value = String::new();
        loop {
            match self.next_char() {
                Some('\'') => {
                    if self.peek_char() == Some('\'') {
                        self.next_char();
                        value.push('\'');
                    } else {
                        return Ok(TokenKind::String(value));
                    }
                }
                Some('\\') => {
                    return Err(ExpressionError::security("backslash escapes are not allowed"))
                }
                Some(c) if c.is_control() && c != '\n' && c != '\t' => {
                    return Err(ExpressionError::security("control characters are not allowed"))
                }
                Some(c) => value.push(c),
                None => return Err(ExpressionError::syntax("unterminated string literal", start)),
            }
        }
    }

    fn read_number(&mut self, start: usize) -> TokenKind {
        let mut seen_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.next_char();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                self.next_char();
            } else {
                break;
            }
        }
        TokenKind::Number(self.input[start..self.pos].to_string())
    }

    fn read_word(&mut self, start: usize) -> TokenKind {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.next_char();
            } else {
                break;
            }
        }
        let word = &self.input[start..self.pos];
        TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
    }
}
