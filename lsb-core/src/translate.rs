//! Text extraction and reinsertion for translation tooling.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chart::Chart;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::lns::{CompileOptions, Compiler, Tag, TextBlock, Token};
use crate::opcode::CommandType;
use crate::value::Value;

const ID_PREFIX: &str = "lsb:text:";

/// Address of one translatable text segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextBlockId {
    /// Chart name, usually the file name inside the game archive.
    pub name: String,
    pub line: usize,
    pub index: usize,
}

impl fmt::Display for TextBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ID_PREFIX}{}:{}:{}", self.name, self.line, self.index)
    }
}

impl FromStr for TextBlockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::BadIdentifier(s.to_string());
        let rest = s.strip_prefix(ID_PREFIX).ok_or_else(bad)?;
        // The chart name may itself contain ':'.
        let mut parts = rest.rsplitn(3, ':');
        let index = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let line = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let name = parts.next().ok_or_else(bad)?;
        Ok(TextBlockId {
            name: name.to_string(),
            line,
            index,
        })
    }
}

/// One translatable run inside a text block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    /// Token indices of the enclosing paired tags, outermost first.
    path: Vec<usize>,
    range: Range<usize>,
}

fn is_segment_token(token: &Token) -> bool {
    matches!(token, Token::Text(_) | Token::LineBreak)
}

fn collect_segments(tokens: &[Token], path: &mut Vec<usize>, out: &mut Vec<Segment>) {
    let mut i = 0;
    while i < tokens.len() {
        if is_segment_token(&tokens[i]) {
            let mut end = i;
            while end < tokens.len() && is_segment_token(&tokens[end]) {
                end += 1;
            }
            let (mut s, mut e) = (i, end);
            while s < e && tokens[s] == Token::LineBreak {
                s += 1;
            }
            while e > s && tokens[e - 1] == Token::LineBreak {
                e -= 1;
            }
            if tokens[s..e].iter().any(Token::is_text) {
                out.push(Segment {
                    path: path.clone(),
                    range: s..e,
                });
            }
            i = end;
            continue;
        }
        if let Token::Tag(Tag {
            content: Some(children),
            ..
        }) = &tokens[i]
        {
            path.push(i);
            collect_segments(children, path, out);
            path.pop();
        }
        i += 1;
    }
}

fn segments(block: &TextBlock) -> Vec<Segment> {
    let mut out = Vec::new();
    collect_segments(&block.tokens, &mut Vec::new(), &mut out);
    out
}

fn tokens_at<'a>(tokens: &'a [Token], path: &[usize]) -> Option<&'a [Token]> {
    match path.split_first() {
        None => Some(tokens),
        Some((&i, rest)) => match tokens.get(i)? {
            Token::Tag(Tag {
                content: Some(children),
                ..
            }) => tokens_at(children, rest),
            _ => None,
        },
    }
}

fn tokens_at_mut<'a>(tokens: &'a mut Vec<Token>, path: &[usize]) -> Option<&'a mut Vec<Token>> {
    match path.split_first() {
        None => Some(tokens),
        Some((&i, rest)) => match tokens.get_mut(i)? {
            Token::Tag(Tag {
                content: Some(children),
                ..
            }) => tokens_at_mut(children, rest),
            _ => None,
        },
    }
}

fn segment_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(run) => out.push_str(run),
            Token::LineBreak => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Text and line-break tokens for `text`; `\n` (or `\r\n`) separates lines.
pub fn plain_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            tokens.push(Token::LineBreak);
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        if !line.is_empty() {
            tokens.push(Token::text(line));
        }
    }
    tokens
}

/// A text block together with the scenario it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Scenario<'a> {
    pub line: usize,
    /// Name of the `Label` command two lines above, if there is one.
    pub name: Option<&'a str>,
    pub block: &'a TextBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuChoice {
    pub line: usize,
    pub index: usize,
    pub text: String,
    pub jump: i32,
}

fn not_text(line: usize, cmd: &Command) -> Error {
    Error::NotTextCommand {
        line,
        opcode: cmd.name(),
    }
}

impl Chart {
    fn block(&self, line: usize) -> Result<&TextBlock> {
        let cmd = self.command(line)?;
        cmd.text_block().ok_or_else(|| not_text(line, cmd))
    }

    fn block_mut(&mut self, line: usize) -> Result<&mut TextBlock> {
        let opcode = self.command(line)?.name();
        self.command_mut(line)?
            .text_block_mut()
            .ok_or(Error::NotTextCommand { line, opcode })
    }

    /// Every translatable segment with its plain text, in chart order.
    pub fn text_blocks(&self, name: &str) -> Vec<(TextBlockId, String)> {
        let mut out = Vec::new();
        for (line, cmd) in self.commands().iter().enumerate() {
            let Some(block) = cmd.text_block() else { continue };
            for (index, seg) in segments(block).into_iter().enumerate() {
                let Some(tokens) = tokens_at(&block.tokens, &seg.path) else { continue };
                out.push((
                    TextBlockId {
                        name: name.to_string(),
                        line,
                        index,
                    },
                    segment_text(&tokens[seg.range]),
                ));
            }
        }
        out
    }

    /// Replace one segment's text, keeping every tag around it. An empty
    /// `text` removes the segment.
    pub fn replace_text(&mut self, id: &TextBlockId, text: &str) -> Result<()> {
        self.codec().check_encodable(text)?;
        let block = self.block_mut(id.line)?;
        let missing = Error::NoSuchSegment {
            line: id.line,
            index: id.index,
        };
        let seg = segments(block).into_iter().nth(id.index).ok_or(missing)?;
        let tokens = tokens_at_mut(&mut block.tokens, &seg.path).ok_or(Error::NoSuchSegment {
            line: id.line,
            index: id.index,
        })?;
        // A run may hold literal newlines that read back the same as line
        // breaks; unchanged text must leave the tokens alone.
        if segment_text(&tokens[seg.range.clone()]) == text {
            return Ok(());
        }
        tokens.splice(seg.range, plain_tokens(text));
        Ok(())
    }

    /// Apply several [`Chart::replace_text`] edits addressed against the
    /// chart as it is now. Edits run from the last segment backwards, so one
    /// that removes a segment does not renumber those still pending.
    pub fn replace_texts<'t>(&mut self, edits: impl IntoIterator<Item = (TextBlockId, &'t str)>) -> Result<usize> {
        let mut edits: Vec<_> = edits.into_iter().collect();
        edits.sort_by(|(a, _), (b, _)| (b.line, b.index).cmp(&(a.line, a.index)));
        for (id, text) in &edits {
            self.replace_text(id, text)?;
        }
        Ok(edits.len())
    }

    /// Replace a whole block with unformatted text.
    pub fn replace_block_plain(&mut self, line: usize, text: &str) -> Result<()> {
        self.codec().check_encodable(text)?;
        self.block_mut(line)?.tokens = plain_tokens(text);
        Ok(())
    }

    /// Compile `script` and use it as the block's new content. The block's
    /// TpWord version is kept.
    pub fn replace_block_script(&mut self, line: usize, script: &str, options: CompileOptions) -> Result<()> {
        let version = self.block(line)?.version;
        let block = Compiler::new(options).compile_block(script, version)?;
        // Reject anything that cannot be written back before touching the chart.
        block.to_bytes(&self.codec())?;
        *self.block_mut(line)? = block;
        Ok(())
    }

    pub fn text_scenarios(&self) -> Vec<Scenario<'_>> {
        let commands = self.commands();
        commands
            .iter()
            .enumerate()
            .filter_map(|(line, cmd)| {
                let block = cmd.text_block()?;
                let name = line
                    .checked_sub(2)
                    .map(|l| &commands[l])
                    .filter(|c| c.is(CommandType::Label))
                    .and_then(|c| c.field("Name").ok())
                    .and_then(Value::as_str);
                Some(Scenario { line, name, block })
            })
            .collect()
    }

    pub fn menu_choices(&self) -> Vec<MenuChoice> {
        let mut out = Vec::new();
        for (line, cmd) in self.commands().iter().enumerate() {
            if !cmd.is(CommandType::Menu) {
                continue;
            }
            let Some(body) = cmd.typed() else { continue };
            for (index, group) in body.tail.iter().enumerate() {
                let text = group.first().and_then(Value::as_str).unwrap_or_default();
                let jump = group.get(1).and_then(Value::as_int).unwrap_or_default();
                out.push(MenuChoice {
                    line,
                    index,
                    text: text.to_string(),
                    jump,
                });
            }
        }
        out
    }

    pub fn replace_menu_choice(&mut self, line: usize, index: usize, text: &str) -> Result<()> {
        self.codec().check_encodable(text)?;
        let cmd = self.command_mut(line)?;
        if !cmd.is(CommandType::Menu) {
            return Err(Error::NotMenuCommand {
                line,
                opcode: cmd.name(),
            });
        }
        cmd.set_field(&format!("Text[{index}]"), Value::Str(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsb_nls::{Encoding, NlsError};
    use pretty_assertions::assert_eq;

    fn text_ins(tokens: Vec<Token>) -> Command {
        let mut cmd = Command::new(
            CommandType::TextIns,
            vec![
                Value::Str("MessageBox".into()),
                Value::Flag(true),
                Value::Flag(true),
                Value::Flag(false),
            ],
        )
        .unwrap();
        *cmd.text_block_mut().unwrap() = TextBlock::new(tokens);
        cmd
    }

    fn chart() -> Chart {
        let mut chart = Chart::new(117, Encoding::Cp932).unwrap();
        chart.push_command(Command::new(CommandType::Label, vec![Value::Str("intro".into())]).unwrap());
        chart.push_command(Command::new(CommandType::TextClr, vec![Value::Str("MessageBox".into())]).unwrap());
        chart.push_command(text_ins(vec![
            Token::LineBreak,
            Token::text("Hello"),
            Token::LineBreak,
            Token::text("there"),
            Token::Tag(Tag::new("WAIT").with_attr("TIME", "100")),
            Token::Tag(
                Tag::new("STYLE")
                    .with_attr("ID", "1")
                    .with_content(vec![Token::text("bold")]),
            ),
            Token::PageBreak,
        ]));
        chart
    }

    fn id(line: usize, index: usize) -> TextBlockId {
        TextBlockId {
            name: "00000001.lsb".into(),
            line,
            index,
        }
    }

    #[test]
    fn identifiers_round_trip() {
        let id = TextBlockId {
            name: "dir:odd.lsb".into(),
            line: 12,
            index: 3,
        };
        assert_eq!(id.to_string(), "lsb:text:dir:odd.lsb:12:3");
        assert_eq!(id.to_string().parse::<TextBlockId>().unwrap(), id);
        assert!("lsb:text:x:1".parse::<TextBlockId>().is_err());
        assert!("pylm:text:x:1:2".parse::<TextBlockId>().is_err());
    }

    #[test]
    fn enumerates_segments() {
        let blocks = chart().text_blocks("00000001.lsb");
        assert_eq!(
            blocks,
            vec![(id(2, 0), "Hello\nthere".to_string()), (id(2, 1), "bold".to_string())]
        );
    }

    #[test]
    fn replace_keeps_tags() {
        let mut chart = chart();
        chart.replace_text(&id(2, 0), "Bonjour").unwrap();
        chart.replace_text(&id(2, 1), "gras").unwrap();
        let block = chart.command(2).unwrap().text_block().unwrap();
        assert_eq!(
            block.tokens,
            vec![
                Token::LineBreak,
                Token::text("Bonjour"),
                Token::Tag(Tag::new("WAIT").with_attr("TIME", "100")),
                Token::Tag(
                    Tag::new("STYLE")
                        .with_attr("ID", "1")
                        .with_content(vec![Token::text("gras")]),
                ),
                Token::PageBreak,
            ]
        );
        assert!(matches!(
            chart.replace_text(&id(2, 5), "x"),
            Err(Error::NoSuchSegment { line: 2, index: 5 })
        ));
        assert!(matches!(
            chart.replace_text(&id(1, 0), "x"),
            Err(Error::NotTextCommand { line: 1, .. })
        ));
    }

    #[test]
    fn unchanged_text_keeps_literal_newlines() {
        let mut chart = chart();
        *chart.command_mut(2).unwrap().text_block_mut().unwrap() = TextBlock::new(vec![Token::text("a\nb")]);
        let before = chart.to_bytes().unwrap();
        let (seg, text) = chart.text_blocks("00000001.lsb").remove(0);
        assert_eq!(text, "a\nb");
        chart.replace_text(&seg, &text).unwrap();
        assert_eq!(chart.to_bytes().unwrap(), before);
    }

    #[test]
    fn batched_edits_survive_segment_removal() {
        let mut chart = chart();
        *chart.command_mut(2).unwrap().text_block_mut().unwrap() = TextBlock::new(vec![
            Token::text("one"),
            Token::PageBreak,
            Token::text("two"),
            Token::PageBreak,
            Token::text("three"),
        ]);
        let applied = chart
            .replace_texts([(id(2, 0), "\n"), (id(2, 1), "deux"), (id(2, 2), "trois")])
            .unwrap();
        assert_eq!(applied, 3);
        let texts: Vec<_> = chart.text_blocks("00000001.lsb").into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, ["deux", "trois"]);
    }

    #[test]
    fn unencodable_text_is_rejected() {
        let mut chart = chart();
        let err = chart.replace_block_plain(2, "smile 😀").unwrap_err();
        assert!(matches!(err, Error::Nls(NlsError::Unencodable { ch: '😀', .. })));
    }

    #[test]
    fn plain_and_script_replacement() {
        let mut chart = chart();
        chart.replace_block_plain(2, "one\r\ntwo").unwrap();
        assert_eq!(
            chart.command(2).unwrap().text_block().unwrap().tokens,
            vec![Token::text("one"), Token::LineBreak, Token::text("two")]
        );

        chart
            .replace_block_script(2, "<VAR NAME=hp><PG>", CompileOptions::default())
            .unwrap();
        assert!(chart.text_blocks("x").is_empty());
        assert!(chart
            .replace_block_script(2, "<NOPE>", CompileOptions::default())
            .is_err());
    }

    #[test]
    fn scenarios_are_named_by_label() {
        let chart = chart();
        let scenarios = chart.text_scenarios();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].line, 2);
        assert_eq!(scenarios[0].name, Some("intro"));
    }

    #[test]
    fn menu_choices_can_be_replaced() {
        let mut chart = chart();
        let mut menu = Command::new(
            CommandType::Menu,
            vec![Value::Str("MessageBox".into()), Value::Flag(false)],
        )
        .unwrap();
        menu.push_tail_group(vec![Value::Str("Left".into()), Value::Int(0)]).unwrap();
        menu.push_tail_group(vec![Value::Str("Right".into()), Value::Int(1)]).unwrap();
        chart.push_command(menu);

        chart.replace_menu_choice(3, 1, "Droite").unwrap();
        let choices = chart.menu_choices();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[1].text, "Droite");
        assert_eq!(choices[1].jump, 1);
        assert!(chart.replace_menu_choice(3, 2, "x").is_err());
        assert!(matches!(
            chart.replace_menu_choice(2, 0, "x"),
            Err(Error::NotMenuCommand { line: 2, .. })
        ));
    }
}
