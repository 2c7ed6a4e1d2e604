use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use log::{error, info};
use lsb_core::{Chart, Validator, patch_chart};
use lsb_nls::{Codec, Encoding};

mod config;
mod ops;
mod scripts;
mod sink;

use crate::config::Config;
use crate::ops::TranslationFile;
use crate::sink::DirSink;

#[derive(ClapParser, Debug)]
#[command(version, about = "LiveMaker LSB chart tool")]
struct Args {
    /// TOML file with default settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Text encoding of the charts (cp932 or utf8).
    #[arg(short, long, global = true)]
    encoding: Option<Encoding>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print a summary of a chart.
    Info { input: PathBuf },
    /// Check that charts and their text blocks survive a round trip.
    Validate {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Write a YAML listing of every command.
    Dump {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Render text blocks as plain text only.
        #[arg(long)]
        text_only: bool,
    },
    /// Write one LNS script per text scenario plus a `.lsbref` index.
    Extract {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Defaults to the current directory.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Text encoding of the script files.
        #[arg(long, default_value = "utf8")]
        script_encoding: Encoding,
    },
    /// Compile an LNS script into the TextIns command at `line`.
    Insert {
        input: PathBuf,
        script: PathBuf,
        line: usize,
        #[arg(long, default_value = "utf8")]
        script_encoding: Encoding,
        /// Do not keep a .bak copy of the original chart.
        #[arg(long)]
        no_backup: bool,
    },
    /// Re-insert every script listed in the chart's `.lsbref` index.
    BatchInsert {
        input: PathBuf,
        script_dir: PathBuf,
        #[arg(long, default_value = "utf8")]
        script_encoding: Encoding,
        #[arg(long)]
        no_backup: bool,
        /// Skip scripts named in the index that no longer exist.
        #[arg(long)]
        ignore_missing: bool,
    },
    /// Write a YAML translation sheet with every text segment and menu choice.
    ExtractSheet {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Apply a translation sheet and write the chart back in place.
    InsertSheet {
        input: PathBuf,
        sheet: PathBuf,
        /// Do not keep a .bak copy of the original chart.
        #[arg(long)]
        no_backup: bool,
    },
}

fn load_chart(path: &Path, encoding: Encoding) -> Result<Chart> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Chart::from_bytes(&bytes, encoding).with_context(|| format!("failed to decode {}", path.display()))
}

fn entry_name(path: &Path) -> Result<String> {
    match path.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => bail!("{} has no file name", path.display()),
    }
}

fn entry_stem(path: &Path) -> Result<String> {
    match path.file_stem() {
        Some(stem) => Ok(stem.to_string_lossy().into_owned()),
        None => bail!("{} has no file name", path.display()),
    }
}

/// Overwrite the chart at `input`, keeping a `.bak` copy when `backup` is set.
fn write_back(input: &Path, chart: &Chart, backup: bool) -> Result<()> {
    let root = input.parent().unwrap_or_else(|| Path::new("."));
    let mut sink = DirSink::new(root, backup);
    patch_chart(&mut sink, &entry_name(input)?, chart)?;
    Ok(())
}

fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_yaml::to_writer(&mut writer, value)?;
    Ok(())
}

fn validate(paths: &[PathBuf], config: &Config) -> Result<()> {
    let validator = Validator {
        decompiler: config.decompiler,
        compile: config.compile,
    };
    let mut failed = 0;
    for path in paths {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let report = validator
            .validate(&bytes, config.encoding)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        if report.is_ok() {
            println!("{}: ok ({})", path.display(), report.original_sha256);
            continue;
        }
        failed += 1;
        println!(
            "{}: FAILED ({} -> {})",
            path.display(),
            report.original_sha256,
            report.rebuilt_sha256
        );
        for divergence in &report.divergences {
            println!("  chart differs at {divergence:?}");
        }
        for check in report.failed_blocks() {
            println!(
                "  text block at line {}: {}",
                check.line,
                check.error.as_deref().unwrap_or("mismatch")
            );
        }
    }
    if failed > 0 {
        bail!("{failed} of {} charts failed validation", paths.len());
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }

    match args.command {
        Cmd::Info { input } => {
            let chart = load_chart(&input, config.encoding)?;
            print!("{}", serde_yaml::to_string(&ops::info(&chart))?);
        }
        Cmd::Validate { inputs } => validate(&inputs, &config)?,
        Cmd::Dump {
            input,
            output,
            text_only,
        } => {
            let chart = load_chart(&input, config.encoding)?;
            let mut decompiler = config.decompiler;
            decompiler.text_only |= text_only;
            write_yaml(&output, &ops::dump(&chart, &decompiler))?;
            info!("wrote {}", output.display());
        }
        Cmd::Extract {
            inputs,
            output_dir,
            script_encoding,
        } => {
            let out_dir = output_dir.unwrap_or_else(|| PathBuf::from("."));
            let codec = Codec::new(script_encoding);
            for input in &inputs {
                let chart = load_chart(input, config.encoding)?;
                let refs = scripts::extract_scripts(&chart, &entry_stem(input)?, &out_dir, &config.decompiler, &codec)?;
                info!("extracted {} scripts from {}", refs.len(), input.display());
            }
        }
        Cmd::Insert {
            input,
            script,
            line,
            script_encoding,
            no_backup,
        } => {
            let mut chart = load_chart(&input, config.encoding)?;
            scripts::insert_script(&mut chart, line, &script, &Codec::new(script_encoding), config.compile)?;
            write_back(&input, &chart, config.backup && !no_backup)?;
            info!("inserted {} at line {line} of {}", script.display(), input.display());
        }
        Cmd::BatchInsert {
            input,
            script_dir,
            script_encoding,
            no_backup,
            ignore_missing,
        } => {
            let mut chart = load_chart(&input, config.encoding)?;
            let inserted = scripts::batch_insert(
                &mut chart,
                &entry_stem(&input)?,
                &script_dir,
                &Codec::new(script_encoding),
                config.compile,
                ignore_missing,
            )?;
            write_back(&input, &chart, config.backup && !no_backup)?;
            info!("inserted {inserted} scripts into {}", input.display());
        }
        Cmd::ExtractSheet { input, output } => {
            let chart = load_chart(&input, config.encoding)?;
            let sheet = ops::extract(&chart, &entry_name(&input)?);
            write_yaml(&output, &sheet)?;
            info!(
                "wrote {} text segments and {} menu choices to {}",
                sheet.texts.len(),
                sheet.choices.len(),
                output.display()
            );
        }
        Cmd::InsertSheet {
            input,
            sheet,
            no_backup,
        } => {
            let mut chart = load_chart(&input, config.encoding)?;
            let text = fs::read_to_string(&sheet).with_context(|| format!("failed to read {}", sheet.display()))?;
            let sheet: TranslationFile = serde_yaml::from_str(&text)?;
            let applied = ops::apply(&mut chart, &sheet)?;
            if applied == 0 {
                info!("nothing to insert");
                return Ok(());
            }
            write_back(&input, &chart, config.backup && !no_backup)?;
            info!("inserted {applied} translations into {}", input.display());
        }
    }
    Ok(())
}

fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
