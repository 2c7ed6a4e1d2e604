//! Per-scenario LNS script files and their `.lsbref` index.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use lsb_core::{Chart, CompileOptions, Decompiler};
use lsb_nls::Codec;

/// One line of a `.lsbref` index: a script file and the `TextIns` line it
/// was extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRef {
    pub file: String,
    pub line: usize,
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl FromStr for ScriptRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (file, line) = s
            .trim_end()
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("bad script reference {s:?}"))?;
        if file.is_empty() {
            bail!("script reference {s:?} has no file name");
        }
        let line = line
            .trim()
            .parse()
            .with_context(|| format!("bad line number in script reference {s:?}"))?;
        Ok(ScriptRef {
            file: file.to_string(),
            line,
        })
    }
}

pub fn ref_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.lsbref"))
}

/// Collapse every run of characters Windows forbids in file names to `_`.
pub fn escape_scenario_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn read_text(path: &Path, codec: &Codec) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = codec
        .decode_exact(&bytes)
        .with_context(|| format!("{} is not valid {}", path.display(), codec.encoding()))?;
    Ok(text.into_owned())
}

fn write_text(path: &Path, text: &str, codec: &Codec) -> Result<()> {
    let bytes = codec
        .encode(text)
        .with_context(|| format!("cannot write {} as {}", path.display(), codec.encoding()))?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Write one LNS script per text scenario of `chart` into `out_dir`, named
/// `<stem>-<scenario>.lns` (or `<stem>-line<N>.lns` for unnamed or clashing
/// scenarios), followed by the `<stem>.lsbref` index.
pub fn extract_scripts(
    chart: &Chart,
    stem: &str,
    out_dir: &Path,
    decompiler: &Decompiler,
    codec: &Codec,
) -> Result<Vec<ScriptRef>> {
    fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut refs: Vec<ScriptRef> = Vec::new();
    for scenario in chart.text_scenarios() {
        let mut file = match scenario.name {
            Some(name) if !name.is_empty() => format!("{stem}-{}.lns", escape_scenario_name(name)),
            _ => format!("{stem}-line{}.lns", scenario.line),
        };
        if refs.iter().any(|r| r.file == file) {
            file = format!("{stem}-line{}.lns", scenario.line);
        }
        let path = out_dir.join(&file);
        write_text(&path, &decompiler.decompile(scenario.block), codec)?;
        info!("wrote {}", path.display());
        refs.push(ScriptRef {
            file,
            line: scenario.line,
        });
    }

    let index: String = refs.iter().map(|r| format!("{r}\n")).collect();
    write_text(&ref_path(out_dir, stem), &index, codec)?;
    Ok(refs)
}

/// Compile the script at `path` into the `TextIns` block at `line`.
pub fn insert_script(chart: &mut Chart, line: usize, path: &Path, codec: &Codec, options: CompileOptions) -> Result<()> {
    let script = read_text(path, codec)?;
    chart
        .replace_block_script(line, &script, options)
        .with_context(|| format!("failed to insert {} at line {line}", path.display()))
}

/// Re-insert every script listed in `<stem>.lsbref` inside `dir`. Returns
/// how many blocks were replaced.
pub fn batch_insert(
    chart: &mut Chart,
    stem: &str,
    dir: &Path,
    codec: &Codec,
    options: CompileOptions,
    ignore_missing: bool,
) -> Result<usize> {
    let index = read_text(&ref_path(dir, stem), codec)?;
    let mut inserted = 0;
    for entry in index.lines().filter(|l| !l.trim().is_empty()) {
        let script_ref: ScriptRef = entry.parse()?;
        let path = dir.join(&script_ref.file);
        if !path.exists() {
            if ignore_missing {
                warn!("script {} is missing, skipped", path.display());
                continue;
            }
            bail!("script {} is missing", path.display());
        }
        insert_script(chart, script_ref.line, &path, codec, options)?;
        info!("replaced scenario at line {} with {}", script_ref.line, script_ref.file);
        inserted += 1;
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsb_core::{Command, CommandType, TextBlock, Token, Value};
    use lsb_nls::Encoding;
    use pretty_assertions::assert_eq;

    fn text_ins(text: &str) -> Command {
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
        *cmd.text_block_mut().unwrap() = TextBlock::new(vec![Token::text(text), Token::PageBreak]);
        cmd
    }

    fn label(name: &str) -> Command {
        Command::new(CommandType::Label, vec![Value::Str(name.into())]).unwrap()
    }

    fn clear() -> Command {
        Command::new(CommandType::TextClr, vec![Value::Str("MessageBox".into())]).unwrap()
    }

    /// Two scenarios named "a/b", one unnamed.
    fn chart() -> Chart {
        let mut chart = Chart::new(117, Encoding::Cp932).unwrap();
        for cmd in [
            label("a/b"),
            clear(),
            text_ins("一"),
            label("a/b"),
            clear(),
            text_ins("二"),
            text_ins("三"),
        ] {
            chart.push_command(cmd);
        }
        chart
    }

    #[test]
    fn scenario_names_are_escaped() {
        assert_eq!(escape_scenario_name("ch1: \"start\"?"), "ch1_ _start_");
        assert_eq!(escape_scenario_name("a\\b<>c"), "a_b_c");
        assert_eq!(escape_scenario_name("普通"), "普通");
    }

    #[test]
    fn references_parse() {
        let r: ScriptRef = "00000001-x:y.lns:12\r\n".parse().unwrap();
        assert_eq!(
            r,
            ScriptRef {
                file: "00000001-x:y.lns".into(),
                line: 12
            }
        );
        assert_eq!(r.to_string().parse::<ScriptRef>().unwrap(), r);
        assert!("no-line".parse::<ScriptRef>().is_err());
        assert!(":3".parse::<ScriptRef>().is_err());
        assert!("a.lns:x".parse::<ScriptRef>().is_err());
    }

    #[test]
    fn extract_names_files_and_writes_index() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Codec::new(Encoding::Utf8);
        let refs = extract_scripts(&chart(), "00000001", dir.path(), &Decompiler::new(), &codec).unwrap();
        let files: Vec<_> = refs.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(
            files,
            ["00000001-a_b.lns", "00000001-line5.lns", "00000001-line6.lns"]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("00000001-a_b.lns")).unwrap(),
            "一<PG>"
        );
        assert_eq!(
            fs::read_to_string(ref_path(dir.path(), "00000001")).unwrap(),
            "00000001-a_b.lns:2\n00000001-line5.lns:5\n00000001-line6.lns:6\n"
        );
    }

    #[test]
    fn batch_insert_replaces_listed_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let codec = Codec::new(Encoding::Cp932);
        let mut chart = chart();
        extract_scripts(&chart, "00000001", dir.path(), &Decompiler::new(), &codec).unwrap();
        fs::write(dir.path().join("00000001-line5.lns"), b"two<PG>").unwrap();
        fs::remove_file(dir.path().join("00000001-line6.lns")).unwrap();

        assert!(batch_insert(&mut chart, "00000001", dir.path(), &codec, CompileOptions::default(), false).is_err());

        let inserted =
            batch_insert(&mut chart, "00000001", dir.path(), &codec, CompileOptions::default(), true).unwrap();
        assert_eq!(inserted, 2);
        let texts: Vec<_> = chart.text_blocks("x").into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, ["一", "two", "三"]);
    }

    #[test]
    fn insert_requires_a_text_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.lns");
        fs::write(&path, "hi").unwrap();
        let codec = Codec::new(Encoding::Utf8);
        let mut chart = chart();
        assert!(insert_script(&mut chart, 1, &path, &codec, CompileOptions::default()).is_err());
        insert_script(&mut chart, 2, &path, &codec, CompileOptions::default()).unwrap();
        assert_eq!(chart.text_blocks("x")[0].1, "hi");
    }
}
