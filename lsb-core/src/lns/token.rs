use serde::{Deserialize, Serialize};

/// One element of a scenario text block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Token {
    Text(String),
    Tag(Tag),
    LineBreak,
    PageBreak,
    /// Script comment. Only produced when compiling with comments kept, and
    /// never written to a binary block.
    Comment(String),
}

/// An inline formatting tag.
///
/// `attrs` holds canonical (upper-case) attribute names in the tag's
/// canonical order. `content` is `Some` exactly for paired tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Token>>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            content: None,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_content(mut self, content: Vec<Token>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl Token {
    pub fn text(s: impl Into<String>) -> Self {
        Token::Text(s.into())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Token::Text(_))
    }
}

/// Default TpWord format version written for new blocks.
pub const DEFAULT_BLOCK_VERSION: u16 = 104;

/// The text payload of a `TextIns` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub version: u16,
    pub tokens: Vec<Token>,
}

impl Default for TextBlock {
    fn default() -> Self {
        Self {
            version: DEFAULT_BLOCK_VERSION,
            tokens: Vec::new(),
        }
    }
}

impl TextBlock {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            ..Self::default()
        }
    }
}
