//! Recursive-descent compiler from LNS script text to tokens.

use serde::{Deserialize, Serialize};

use super::binary::MAX_DEPTH;
use super::tags::{self, AttrKind, TagSpec};
use super::token::{Tag, TextBlock, Token};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Keep `;` comment lines as [`Token::Comment`] instead of dropping them.
    #[serde(default)]
    pub keep_comments: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn compile(&self, source: &str) -> Result<Vec<Token>> {
        let mut parser = Parser {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            line_start: true,
            depth: 0,
            keep_comments: self.options.keep_comments,
        };
        parser.sequence(None)
    }

    pub fn compile_block(&self, source: &str, version: u16) -> Result<TextBlock> {
        Ok(TextBlock {
            version,
            tokens: self.compile(source)?,
        })
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_start: bool,
    /// Number of paired tags currently open.
    depth: usize,
    keep_comments: bool,
}

/// One parsed `<...>` construct.
enum Markup {
    Token(Token),
    /// A paired tag opener; its content follows.
    Open(&'static TagSpec, Vec<(String, String)>),
    Close(String),
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, tag: Option<&str>, message: impl Into<String>) -> Error {
        Error::Syntax {
            line,
            tag: tag.map(str::to_string),
            message: message.into(),
        }
    }

    /// Parse tokens until end of input, or until the closing tag for
    /// `closing` when inside a paired tag.
    fn sequence(&mut self, closing: Option<&'static str>) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut text = String::new();

        fn flush(text: &mut String, tokens: &mut Vec<Token>) {
            if !text.is_empty() {
                tokens.push(Token::Text(std::mem::take(text)));
            }
        }

        while let Some(c) = self.peek() {
            let at_line_start = self.line_start;
            self.line_start = false;
            match c {
                '\n' => {
                    self.bump();
                    self.line_start = true;
                }
                '\r' => {
                    self.bump();
                    self.line_start = at_line_start;
                }
                ';' if at_line_start => {
                    self.bump();
                    let mut comment = String::new();
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                        if c != '\r' {
                            comment.push(c);
                        }
                    }
                    if self.keep_comments {
                        flush(&mut text, &mut tokens);
                        tokens.push(Token::Comment(comment));
                    }
                }
                '\\' => {
                    let line = self.line;
                    self.bump();
                    let escaped = match self.bump() {
                        Some(c @ ('\\' | '<' | '>' | ';')) => c,
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some(other) => return Err(self.error(line, None, format!("unknown escape \\{other}"))),
                        None => return Err(self.error(line, None, "dangling escape at end of input")),
                    };
                    text.push(escaped);
                }
                '<' => {
                    flush(&mut text, &mut tokens);
                    let line = self.line;
                    match self.markup()? {
                        Markup::Token(token) => tokens.push(token),
                        Markup::Open(spec, attrs) => {
                            if self.depth >= MAX_DEPTH {
                                return Err(self.error(line, Some(spec.name), "paired tags nested too deeply"));
                            }
                            self.depth += 1;
                            let content = self.sequence(Some(spec.name))?;
                            self.depth -= 1;
                            let mut tag = Tag::new(spec.name).with_content(content);
                            tag.attrs = attrs;
                            tokens.push(Token::Tag(tag));
                        }
                        Markup::Close(name) => {
                            return match closing {
                                Some(open) if open.eq_ignore_ascii_case(&name) => {
                                    flush(&mut text, &mut tokens);
                                    Ok(tokens)
                                }
                                Some(open) => Err(self.error(
                                    line,
                                    Some(&name),
                                    format!("closing tag does not match open <{open}>"),
                                )),
                                None => Err(self.error(line, Some(&name), "closing tag without an open tag")),
                            };
                        }
                    }
                }
                _ => {
                    self.bump();
                    text.push(c);
                }
            }
        }

        if let Some(open) = closing {
            return Err(self.error(self.line, Some(open), "tag is never closed"));
        }
        flush(&mut text, &mut tokens);
        Ok(tokens)
    }

    /// Parse one `<...>` construct; the cursor is on the `<`.
    fn markup(&mut self) -> Result<Markup> {
        let line = self.line;
        self.bump();
        let inner = self.tag_body(line)?;
        let mut cur = AttrCursor::new(&inner);

        if cur.eat('/') {
            let name = cur.word();
            cur.skip_ws();
            if name.is_empty() || !cur.at_end() {
                return Err(self.error(line, None, format!("malformed closing tag </{inner}")));
            }
            return Ok(Markup::Close(name.to_ascii_uppercase()));
        }

        let name = cur.word().to_ascii_uppercase();
        if name.is_empty() {
            return Err(self.error(line, None, format!("malformed tag <{inner}>")));
        }

        let mut raw = Vec::new();
        loop {
            cur.skip_ws();
            if cur.at_end() {
                break;
            }
            let key = cur.word().to_ascii_uppercase();
            if key.is_empty() || !cur.eat('=') {
                return Err(self.error(line, Some(&name), "expected NAME=value attribute"));
            }
            let value = cur
                .value()
                .map_err(|message| self.error(line, Some(&name), message))?;
            raw.push((key, value));
        }

        match name.as_str() {
            "BR" | "PG" => {
                if !raw.is_empty() {
                    return Err(self.error(line, Some(&name), "tag takes no attributes"));
                }
                return Ok(Markup::Token(if name == "BR" {
                    Token::LineBreak
                } else {
                    Token::PageBreak
                }));
            }
            _ => {}
        }

        let spec = tags::by_name(&name).ok_or_else(|| self.error(line, Some(&name), "unsupported tag"))?;
        let attrs = self.normalize_attrs(spec, raw, line)?;
        if spec.paired {
            Ok(Markup::Open(spec, attrs))
        } else {
            let mut tag = Tag::new(spec.name);
            tag.attrs = attrs;
            Ok(Markup::Token(Token::Tag(tag)))
        }
    }

    /// Everything between `<` and the matching `>`, honouring quotes.
    fn tag_body(&mut self, line: usize) -> Result<String> {
        let mut inner = String::new();
        let mut quoted = false;
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error(line, None, "unterminated tag"))?;
            match c {
                '>' if !quoted => return Ok(inner),
                '"' => quoted = !quoted,
                '\\' if quoted => {
                    inner.push(c);
                    match self.bump() {
                        Some(next) => inner.push(next),
                        None => return Err(self.error(line, None, "unterminated tag")),
                    }
                    continue;
                }
                _ => {}
            }
            inner.push(c);
        }
    }

    /// Check attributes against the tag table and put them in canonical
    /// order with canonical values.
    fn normalize_attrs(
        &self,
        spec: &'static TagSpec,
        raw: Vec<(String, String)>,
        line: usize,
    ) -> Result<Vec<(String, String)>> {
        let mut slots: Vec<Option<String>> = vec![None; spec.attrs.len()];
        for (key, value) in raw {
            let idx = spec
                .attr_index(&key)
                .ok_or_else(|| self.error(line, Some(spec.name), format!("unknown attribute {key}")))?;
            if slots[idx].is_some() {
                return Err(self.error(line, Some(spec.name), format!("duplicate attribute {key}")));
            }
            let attr = &spec.attrs[idx];
            let value = match attr.kind {
                AttrKind::Str => value,
                AttrKind::Int => value
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| {
                        self.error(line, Some(spec.name), format!("{key}={value:?} is not an integer"))
                    })?
                    .to_string(),
                AttrKind::Enum(words) => words
                    .iter()
                    .find(|w| w.eq_ignore_ascii_case(&value))
                    .ok_or_else(|| {
                        self.error(line, Some(spec.name), format!("{key}={value:?} is not one of {words:?}"))
                    })?
                    .to_string(),
            };
            slots[idx] = Some(value);
        }
        Ok(spec
            .attrs
            .iter()
            .zip(slots)
            .filter_map(|(attr, value)| value.map(|v| (attr.name.to_string(), v)))
            .collect())
    }
}

/// Cursor over the inside of one tag.
struct AttrCursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> AttrCursor<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            chars: s.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn eat(&mut self, want: char) -> bool {
        self.skip_ws();
        self.chars.next_if_eq(&want).is_some()
    }

    fn word(&mut self) -> String {
        self.skip_ws();
        let mut word = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
            word.push(c);
        }
        word
    }

    fn value(&mut self) -> std::result::Result<String, String> {
        self.skip_ws();
        let mut value = String::new();
        if self.chars.next_if_eq(&'"').is_some() {
            loop {
                match self.chars.next() {
                    Some('"') => return Ok(value),
                    Some('\\') => match self.chars.next() {
                        Some(c @ ('"' | '\\')) => value.push(c),
                        Some(c) => return Err(format!("unknown escape \\{c} in quoted value")),
                        None => return Err("unterminated quoted value".into()),
                    },
                    Some(c) => value.push(c),
                    None => return Err("unterminated quoted value".into()),
                }
            }
        }
        while let Some(c) = self.chars.next_if(|c| !c.is_whitespace() && *c != '"') {
            value.push(c);
        }
        if value.is_empty() {
            return Err("missing attribute value".into());
        }
        Ok(value)
    }
}
