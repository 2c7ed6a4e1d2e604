//! Chart-level operations behind the subcommands.

use anyhow::{Context, Result, bail};
use log::warn;
use lsb_core::{Chart, CommandBody, Decompiler, Label, ScrambleParams, TextBlockId, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ChartInfo {
    pub version: u32,
    pub lm_version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scramble: Option<ScrambleParams>,
    pub commands: usize,
    pub opaque_commands: usize,
    pub text_blocks: usize,
    pub menus: usize,
    pub labels: usize,
}

pub fn info(chart: &Chart) -> ChartInfo {
    let commands = chart.commands();
    ChartInfo {
        version: chart.header.version,
        lm_version: chart.lm_version(),
        scramble: chart.header.scramble,
        commands: commands.len(),
        opaque_commands: commands.iter().filter(|c| c.is_opaque()).count(),
        text_blocks: commands.iter().filter(|c| c.text_block().is_some()).count(),
        menus: chart.menu_choices().iter().filter(|c| c.index == 0).count(),
        labels: chart.labels().len(),
    }
}

#[derive(Debug, Serialize)]
pub struct FieldDump<'a> {
    pub name: String,
    pub value: &'a Value,
}

#[derive(Debug, Serialize)]
pub struct CommandDump<'a> {
    pub line: usize,
    pub opcode: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub indent: u32,
    #[serde(skip_serializing_if = "is_zero_u8")]
    pub flags: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDump<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opaque_len: Option<usize>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u8(v: &u8) -> bool {
    *v == 0
}

#[derive(Debug, Serialize)]
pub struct ChartDump<'a> {
    pub info: ChartInfo,
    pub labels: &'a [Label],
    pub commands: Vec<CommandDump<'a>>,
}

pub fn dump<'a>(chart: &'a Chart, decompiler: &Decompiler) -> ChartDump<'a> {
    let commands = chart
        .commands()
        .iter()
        .enumerate()
        .map(|(line, cmd)| CommandDump {
            line,
            opcode: cmd.name(),
            indent: cmd.indent,
            flags: cmd.flags.bits(),
            fields: cmd
                .fields()
                .into_iter()
                .map(|(name, value)| FieldDump { name, value })
                .collect(),
            script: cmd.text_block().map(|b| decompiler.decompile(b)),
            opaque_len: match &cmd.body {
                CommandBody::Opaque(raw) => Some(raw.len()),
                CommandBody::Typed(_) => None,
            },
        })
        .collect();
    ChartDump {
        info: info(chart),
        labels: chart.labels(),
        commands,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntry {
    pub id: String,
    pub original: String,
    #[serde(default)]
    pub translation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceEntry {
    pub line: usize,
    pub index: usize,
    pub original: String,
    #[serde(default)]
    pub translation: String,
}

/// Translation sheet for one chart, as written by `extract` and read by
/// `insert`. Empty translations are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranslationFile {
    pub chart: String,
    #[serde(default)]
    pub texts: Vec<TextEntry>,
    #[serde(default)]
    pub choices: Vec<ChoiceEntry>,
}

pub fn extract(chart: &Chart, name: &str) -> TranslationFile {
    TranslationFile {
        chart: name.to_string(),
        texts: chart
            .text_blocks(name)
            .into_iter()
            .map(|(id, original)| TextEntry {
                id: id.to_string(),
                original,
                translation: String::new(),
            })
            .collect(),
        choices: chart
            .menu_choices()
            .into_iter()
            .map(|c| ChoiceEntry {
                line: c.line,
                index: c.index,
                original: c.text,
                translation: String::new(),
            })
            .collect(),
    }
}

/// Apply every non-empty translation. Entries whose original text no longer
/// matches the chart are skipped with a warning. Returns how many were
/// applied.
pub fn apply(chart: &mut Chart, sheet: &TranslationFile) -> Result<usize> {
    let current: Vec<(TextBlockId, String)> = chart.text_blocks(&sheet.chart);
    let mut edits = Vec::new();

    for entry in sheet.texts.iter().filter(|e| !e.translation.is_empty()) {
        let id: TextBlockId = entry.id.parse()?;
        if id.name != sheet.chart {
            bail!("{} does not belong to chart {}", entry.id, sheet.chart);
        }
        match current.iter().find(|(cur, _)| *cur == id) {
            Some((_, text)) if *text == entry.original => {}
            _ => {
                warn!("{}: original text changed, skipping", entry.id);
                continue;
            }
        }
        edits.push((id, entry.translation.as_str()));
    }
    // Every id above was checked against the chart before any edit.
    let mut applied = chart
        .replace_texts(edits)
        .with_context(|| format!("failed to insert translations into {}", sheet.chart))?;

    let choices = chart.menu_choices();
    for entry in sheet.choices.iter().filter(|e| !e.translation.is_empty()) {
        let unchanged = choices
            .iter()
            .any(|c| c.line == entry.line && c.index == entry.index && c.text == entry.original);
        if !unchanged {
            warn!("menu {}:{}: original text changed, skipping", entry.line, entry.index);
            continue;
        }
        chart
            .replace_menu_choice(entry.line, entry.index, &entry.translation)
            .with_context(|| format!("failed to insert menu choice {}:{}", entry.line, entry.index))?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsb_core::{Command, CommandType, Tag, TextBlock, Token};
    use lsb_nls::Encoding;
    use pretty_assertions::assert_eq;

    fn chart() -> Chart {
        let mut chart = Chart::new(110, Encoding::Cp932).unwrap();
        let mut text = Command::new(
            CommandType::TextIns,
            vec![
                Value::Str("MessageBox".into()),
                Value::Flag(true),
                Value::Flag(true),
                Value::Flag(false),
            ],
        )
        .unwrap();
        *text.text_block_mut().unwrap() = TextBlock::new(vec![
            Token::text("おはよう"),
            Token::Tag(Tag::new("WAIT").with_attr("TIME", "500")),
            Token::text("ございます"),
        ]);
        chart.push_command(text);
        let mut menu = Command::new(
            CommandType::Menu,
            vec![Value::Str("MessageBox".into()), Value::Flag(false)],
        )
        .unwrap();
        menu.push_tail_group(vec![Value::Str("はい".into()), Value::Int(2)]).unwrap();
        chart.push_command(menu);
        chart.push_command(Command::opaque(CommandType::BoxNew.id(), vec![0; 4]));
        chart
    }

    #[test]
    fn extract_then_apply() {
        let mut chart = chart();
        let mut sheet = extract(&chart, "00000002.lsb");
        assert_eq!(sheet.texts.len(), 2);
        assert_eq!(sheet.texts[1].id, "lsb:text:00000002.lsb:0:1");
        assert_eq!(sheet.choices[0].original, "はい");

        sheet.texts[0].translation = "Good".into();
        sheet.texts[1].translation = "morning".into();
        sheet.choices[0].translation = "Yes".into();
        assert_eq!(apply(&mut chart, &sheet).unwrap(), 3);

        let block = chart.command(0).unwrap().text_block().unwrap();
        assert_eq!(Decompiler::new().decompile(block), "Good<WAIT TIME=500>morning");
        assert_eq!(chart.menu_choices()[0].text, "Yes");
    }

    #[test]
    fn stale_entries_are_skipped() {
        let mut chart = chart();
        let mut sheet = extract(&chart, "a.lsb");
        sheet.texts[0].original = "something else".into();
        sheet.texts[0].translation = "x".into();
        assert_eq!(apply(&mut chart, &sheet).unwrap(), 0);
    }

    #[test]
    fn removing_a_segment_does_not_shift_later_entries() {
        let mut chart = chart();
        let mut sheet = extract(&chart, "00000002.lsb");
        sheet.texts[0].translation = "\n".into();
        sheet.texts[1].translation = "morning".into();
        assert_eq!(apply(&mut chart, &sheet).unwrap(), 2);
        let texts: Vec<_> = chart.text_blocks("00000002.lsb").into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, ["morning"]);
    }

    #[test]
    fn dump_renders_scripts() {
        let chart = chart();
        let dump = dump(&chart, &Decompiler::new());
        assert_eq!(dump.info.text_blocks, 1);
        assert_eq!(dump.info.menus, 1);
        assert_eq!(dump.info.opaque_commands, 1);
        assert_eq!(
            dump.commands[0].script.as_deref(),
            Some("おはよう<WAIT TIME=500>ございます")
        );
        assert_eq!(dump.commands[2].opaque_len, Some(4));
        let yaml = serde_yaml::to_string(&dump).unwrap();
        assert!(yaml.contains("opcode: Menu"));
    }
}
