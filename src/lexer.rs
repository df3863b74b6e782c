use crate::diagnostics::{Diagnostic, Location, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    While,
    For,
    Function,
    Return,
    Break,
    Continue,
    Import,
    True,
    False,
    Null,
    Let,
    Const,
    Var,
    Matrix,
    Vector,
    Int,
    Float,
    String,
    Bool,
    Void,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::For => "for",
            Keyword::Function => "function",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Import => "import",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
            Keyword::Let => "let",
            Keyword::Const => "const",
            Keyword::Var => "var",
            Keyword::Matrix => "matrix",
            Keyword::Vector => "vector",
            Keyword::Int => "int",
            Keyword::Float => "float",
            Keyword::String => "string",
            Keyword::Bool => "bool",
            Keyword::Void => "void",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Identifier,
    Keyword(Keyword),
    Number,
    String,
    Operator,
    Symbol,
}

/// A token borrowing its text from the source buffer.
///
/// For string tokens `text` is the raw slice between the quotes, escapes
/// left untranslated; `span` always covers the whole token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: SourceSpan,
    pub location: Location,
}

impl<'a> Token<'a> {
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol && self.text.len() == 1 && self.text.starts_with(symbol)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::String => format!("string \"{}\"", self.text),
            _ => format!("`{}`", self.text),
        }
    }
}

const OPERATOR_CHARS: &[u8] = b"+-*/%=<>!&|^~";
const SYMBOL_CHARS: &[u8] = b"()[]{};,.";
const COMPOUND_OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "&&", "||"];

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    position: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.position + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if byte & 0xC0 != 0x80 {
            // continuation bytes of a multi-byte char do not advance the column
            self.column += 1;
        }
        Some(byte)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let mut progressed = false;

            while let Some(byte) = self.peek() {
                if byte.is_ascii_whitespace() {
                    self.bump();
                    progressed = true;
                } else {
                    break;
                }
            }

            if self.peek() == Some(b'/') {
                match self.peek_next() {
                    Some(b'/') => {
                        while let Some(byte) = self.peek() {
                            if byte == b'\n' {
                                break;
                            }
                            self.bump();
                        }
                        progressed = true;
                    }
                    Some(b'*') => {
                        self.bump();
                        self.bump();
                        // an unterminated block comment swallows the rest of the input
                        while let Some(byte) = self.bump() {
                            if byte == b'*' && self.peek() == Some(b'/') {
                                self.bump();
                                break;
                            }
                        }
                        progressed = true;
                    }
                    _ => {}
                }
            }

            if !progressed {
                break;
            }
        }
    }

    fn make_token(&self, kind: TokenKind, start: usize, location: Location) -> Token<'a> {
        Token {
            kind,
            text: &self.source[start..self.position],
            span: SourceSpan::new(start, self.position),
            location,
        }
    }

    fn identifier_or_keyword(&mut self, start: usize, location: Location) -> Token<'a> {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.position];
        let kind = keyword_for(text)
            .map(TokenKind::Keyword)
            .unwrap_or(TokenKind::Identifier);
        self.make_token(kind, start, location)
    }

    fn number_literal(&mut self, start: usize, location: Location) -> Token<'a> {
        let mut seen_dot = false;
        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' => {
                    self.bump();
                }
                b'.' if !seen_dot => {
                    seen_dot = true;
                    self.bump();
                }
                _ => break,
            }
        }
        self.make_token(TokenKind::Number, start, location)
    }

    fn string_literal(
        &mut self,
        start: usize,
        quote: u8,
        location: Location,
    ) -> Result<Token<'a>, Diagnostic> {
        let content_start = self.position;
        loop {
            match self.peek() {
                None => {
                    return Err(Diagnostic::syntax("unterminated string")
                        .with_span(SourceSpan::new(start, self.position))
                        .at(location));
                }
                Some(byte) if byte == quote => break,
                Some(b'\\') => {
                    self.bump();
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        let content_end = self.position;
        self.bump();
        Ok(Token {
            kind: TokenKind::String,
            text: &self.source[content_start..content_end],
            span: SourceSpan::new(start, self.position),
            location,
        })
    }

    fn operator(&mut self, start: usize, location: Location) -> Token<'a> {
        self.bump();
        if let Some(next) = self.peek() {
            let pair = [self.bytes[start], next];
            if COMPOUND_OPERATORS
                .iter()
                .any(|op| op.as_bytes() == pair.as_slice())
            {
                self.bump();
            }
        }
        self.make_token(TokenKind::Operator, start, location)
    }

    /// Scans the next token. Once the input is exhausted every further call
    /// yields `Eof` again.
    pub fn next_token(&mut self) -> Result<Token<'a>, Diagnostic> {
        self.skip_whitespace_and_comments();
        let start = self.position;
        let location = self.location();

        let Some(byte) = self.peek() else {
            return Ok(self.make_token(TokenKind::Eof, start, location));
        };

        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Ok(self.identifier_or_keyword(start, location)),
            b'0'..=b'9' => Ok(self.number_literal(start, location)),
            b'"' | b'\'' => {
                self.bump();
                self.string_literal(start, byte, location)
            }
            _ if OPERATOR_CHARS.contains(&byte) => Ok(self.operator(start, location)),
            _ if SYMBOL_CHARS.contains(&byte) => {
                self.bump();
                Ok(self.make_token(TokenKind::Symbol, start, location))
            }
            _ => {
                let ch = self.source[start..].chars().next().unwrap_or('\u{FFFD}');
                Err(Diagnostic::syntax("unknown character")
                    .with_span(SourceSpan::new(start, start + ch.len_utf8()))
                    .at(location)
                    .with_note(format!("found {ch:?}")))
            }
        }
    }

    /// Collects every token up to and including `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token<'a>>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

fn keyword_for(ident: &str) -> Option<Keyword> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "for" => Kw::For,
        "function" => Kw::Function,
        "return" => Kw::Return,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "import" => Kw::Import,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        "let" => Kw::Let,
        "const" => Kw::Const,
        "var" => Kw::Var,
        "matrix" => Kw::Matrix,
        "vector" => Kw::Vector,
        "int" => Kw::Int,
        "float" => Kw::Float,
        "string" => Kw::String,
        "bool" => Kw::Bool,
        "void" => Kw::Void,
        _ => return None,
    };
    Some(keyword)
}
