use serde::{Deserialize, Serialize};

use super::token::{Tag, TextBlock, Token};

/// Renders text blocks as LNS script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decompiler {
    /// Emit only displayed text, variable names and line breaks.
    #[serde(default)]
    pub text_only: bool,
}

impl Decompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text_only() -> Self {
        Self { text_only: true }
    }

    pub fn decompile(&self, block: &TextBlock) -> String {
        self.decompile_tokens(&block.tokens)
    }

    pub fn decompile_tokens(&self, tokens: &[Token]) -> String {
        let mut out = String::new();
        if self.text_only {
            write_text_only(tokens, &mut out);
        } else {
            write_script(tokens, &mut out);
        }
        out
    }
}

fn write_script(tokens: &[Token], out: &mut String) {
    for (i, token) in tokens.iter().enumerate() {
        let more = i + 1 < tokens.len();
        match token {
            Token::Text(run) => escape_text(run, out),
            Token::LineBreak => {
                out.push_str("<BR>");
                if more {
                    out.push('\n');
                }
            }
            Token::PageBreak => {
                out.push_str("<PG>");
                if more {
                    out.push('\n');
                }
            }
            Token::Comment(text) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push(';');
                out.extend(text.chars().filter(|c| !matches!(c, '\r' | '\n')));
                out.push('\n');
            }
            Token::Tag(tag) => write_tag(tag, out),
        }
    }
}

fn write_tag(tag: &Tag, out: &mut String) {
    out.push('<');
    out.push_str(&tag.name.to_ascii_uppercase());
    for (name, value) in &tag.attrs {
        out.push(' ');
        out.push_str(&name.to_ascii_uppercase());
        out.push('=');
        write_attr_value(value, out);
    }
    out.push('>');
    if let Some(content) = &tag.content {
        write_script(content, out);
        out.push_str("</");
        out.push_str(&tag.name.to_ascii_uppercase());
        out.push('>');
    }
}

fn is_bare(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.' | '/' | ':'))
}

fn write_attr_value(value: &str, out: &mut String) {
    if is_bare(value) {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn escape_text(run: &str, out: &mut String) {
    for c in run.chars() {
        match c {
            '\\' | '<' | '>' | ';' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

fn write_text_only(tokens: &[Token], out: &mut String) {
    for token in tokens {
        match token {
            Token::Text(run) => out.push_str(run),
            Token::LineBreak | Token::PageBreak => out.push('\n'),
            Token::Comment(_) => {}
            Token::Tag(tag) => match tag.name.to_ascii_uppercase().as_str() {
                "PS" | "CLR" => out.push('\n'),
                "VAR" => out.push_str(tag.attr("NAME").unwrap_or_default()),
                "HISTCHAR" => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(tag.attr("NAME").unwrap_or_default());
                    out.push('\n');
                }
                _ => {
                    if let Some(content) = &tag.content {
                        write_text_only(content, out);
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tags_and_breaks() {
        let tokens = vec![
            Token::text("Hello"),
            Token::Tag(Tag::new("WAIT").with_attr("TIME", "100")),
            Token::text(" world"),
            Token::LineBreak,
            Token::text("<x>;"),
            Token::PageBreak,
        ];
        assert_eq!(
            Decompiler::new().decompile_tokens(&tokens),
            "Hello<WAIT TIME=100> world<BR>\n\\<x\\>\\;<PG>"
        );
    }

    #[test]
    fn quotes_non_bare_values() {
        let tokens = vec![Token::Tag(
            Tag::new("A")
                .with_attr("ID", "3")
                .with_attr("NAME", "say \"hi\"")
                .with_content(vec![Token::text("link")]),
        )];
        assert_eq!(
            Decompiler::new().decompile_tokens(&tokens),
            r#"<A ID=3 NAME="say \"hi\"">link</A>"#
        );
    }

    #[test]
    fn text_only_keeps_variables() {
        let tokens = vec![
            Token::text("HP: "),
            Token::Tag(Tag::new("VAR").with_attr("NAME", "hp")),
            Token::Tag(Tag::new("WAIT").with_attr("TIME", "10")),
            Token::LineBreak,
            Token::Tag(Tag::new("STYLE").with_attr("ID", "1").with_content(vec![Token::text("bold")])),
        ];
        assert_eq!(Decompiler::text_only().decompile_tokens(&tokens), "HP: hp\nbold");
    }
}
