use std::fmt;
use std::iter::FusedIterator;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;

/// An input buffer plus the metadata needed to point diagnostics at it.
/// Locations are recovered by scanning the prefix on demand; only error
/// paths ever ask for them.
#[derive(Debug)]
pub struct File {
    name: String,
    contents: String,
}

impl File {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Line and column (both 1-based) of a byte offset.
    fn location(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let mut line = 1;
        let mut column = 1;
        for (idx, ch) in self.contents.char_indices() {
            if idx >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }

    /// The full text of the line containing `offset`, without its newline.
    fn line_text(&self, offset: usize) -> &str {
        let offset = offset.min(self.contents.len());
        let start = self.contents[..offset].rfind('\n').map_or(0, |i| i + 1);
        let end = self.contents[offset..]
            .find('\n')
            .map_or(self.contents.len(), |i| offset + i);
        &self.contents[start..end]
    }
}

/// A half-open byte range into a file.
#[derive(Debug, Clone)]
pub struct Span {
    file: Arc<File>,
    start: usize,
    end: usize,
}

impl Span {
    pub fn new(file: Arc<File>, start: usize, end: usize) -> Self {
        Self { file, start, end }
    }

    /// An empty span sitting at the end of the file.
    pub fn eof(file: Arc<File>) -> Self {
        let end = file.len();
        Self {
            file,
            start: end,
            end,
        }
    }

    fn text(&self) -> &str {
        &self.file.contents()[self.start..self.end]
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, column) = self.file.location(self.start);
        writeln!(f, "--> {}:{}:{}", self.file.name(), line, column)?;
        writeln!(f, " | {}", self.file.line_text(self.start))?;
        let width = self.text().chars().count().max(1);
        write!(f, " | {}{}", " ".repeat(column - 1), "^".repeat(width))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,  // e.g. "id", "Nat.zero", "1.5"
    Symbol, // e.g. "=>", "->", ";"
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_symbol(&self) -> bool {
        self.kind == TokenKind::Symbol
    }

    pub fn text(&self) -> &str {
        self.span.text()
    }
}

#[derive(Debug, Clone, Error)]
#[error("unrecognizable input at {span}")]
pub struct LexError {
    span: Span,
}

/// The scanner: a cursor over a file, yielding tokens and swallowing
/// whitespace and comments. Cloning is cheap, which is what the parser's
/// lookahead leans on; `offset`/`rewind` expose the cursor for
/// backtracking.
#[derive(Debug, Clone)]
pub struct Lex {
    file: Arc<File>,
    cursor: usize,
}

impl Lex {
    pub fn new(file: Arc<File>) -> Self {
        Self { file, cursor: 0 }
    }

    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    pub fn offset(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self, offset: usize) {
        self.cursor = offset;
    }

    pub fn is_eof(&self) -> bool {
        self.clone().next().is_none()
    }

    fn error_span(&self) -> Span {
        let start = self.cursor.min(self.file.len());
        let end = self.file.contents()[start..]
            .chars()
            .next()
            .map_or(start, |c| start + c.len_utf8());
        Span::new(Arc::clone(&self.file), start, end)
    }
}

impl Iterator for Lex {
    type Item = std::result::Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        // Alternatives are tried in order, so `:=` wins over `:`. Block
        // comments do not nest: the first `*/` closes.
        static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"^(?:(?P<blank>[ \t\r\n]+|//[^\n]*|/\*(?s:.*?)\*/)|(?P<ident>[A-Za-z0-9._]+)|(?P<symbol>=>|->|:=|[():;]))",
            )
            .unwrap()
        });

        loop {
            let rest = &self.file.contents()[self.cursor..];
            if rest.is_empty() {
                return None;
            }
            let Some(cap) = TOKEN.captures(rest) else {
                return Some(Err(LexError {
                    span: self.error_span(),
                }));
            };
            let len = cap.get(0).unwrap().len();
            let kind = if cap.name("blank").is_some() {
                None
            } else if cap.name("ident").is_some() {
                Some(TokenKind::Ident)
            } else {
                Some(TokenKind::Symbol)
            };
            let start = self.cursor;
            self.cursor += len;
            if let Some(kind) = kind {
                let span = Span::new(Arc::clone(&self.file), start, start + len);
                return Some(Ok(Token { kind, span }));
            }
        }
    }
}

impl FusedIterator for Lex {}
