//! Round-trip certification of charts and their text blocks.

use std::ops::Range;

use log::{debug, info};
use lsb_nls::Encoding;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chart::{Chart, Layout};
use crate::error::Result;
use crate::lns::{CompileOptions, Compiler, Decompiler, TextBlock};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Part of the plain chart image where a rebuilt chart differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "region", rename_all = "snake_case")]
pub enum Divergence {
    Header,
    Command { line: usize },
    CommandCount { original: usize, rebuilt: usize },
    Labels,
    /// The rebuilt image could not even be decoded again.
    Undecodable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlockCheck {
    pub line: usize,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub original_sha256: String,
    pub rebuilt_sha256: String,
    pub divergences: Vec<Divergence>,
    pub text_blocks: Vec<TextBlockCheck>,
}

impl ValidationReport {
    pub fn chart_identical(&self) -> bool {
        self.original_sha256 == self.rebuilt_sha256
    }

    pub fn is_ok(&self) -> bool {
        self.chart_identical() && self.text_blocks.iter().all(|c| c.ok)
    }

    pub fn failed_blocks(&self) -> impl Iterator<Item = &TextBlockCheck> {
        self.text_blocks.iter().filter(|c| !c.ok)
    }
}

/// Options for the text-block leg of validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    pub decompiler: Decompiler,
    pub compile: CompileOptions,
}

impl Validator {
    /// Decode `bytes`, re-encode, and check every text block through the
    /// script compiler.
    ///
    /// Malformed input is an error; a failed round trip is reported in the
    /// returned report instead.
    pub fn validate(&self, bytes: &[u8], encoding: Encoding) -> Result<ValidationReport> {
        let (chart, layout) = Chart::decode_layout(bytes, encoding)?;
        let rebuilt = chart.to_bytes()?;

        let original_sha256 = sha256_hex(bytes);
        let rebuilt_sha256 = sha256_hex(&rebuilt);
        let divergences = if original_sha256 == rebuilt_sha256 {
            Vec::new()
        } else {
            localize(&layout, &rebuilt, encoding)
        };

        let text_blocks = self.check_text_blocks(&chart, &layout)?;
        let report = ValidationReport {
            original_sha256,
            rebuilt_sha256,
            divergences,
            text_blocks,
        };
        if report.is_ok() {
            info!("round trip ok ({} text blocks)", report.text_blocks.len());
        } else {
            info!(
                "round trip failed: {} divergences, {} bad text blocks",
                report.divergences.len(),
                report.failed_blocks().count()
            );
        }
        Ok(report)
    }

    fn check_text_blocks(&self, chart: &Chart, layout: &Layout) -> Result<Vec<TextBlockCheck>> {
        let codec = chart.codec();
        let compiler = Compiler::new(self.compile);
        let mut checks = Vec::new();
        for (line, cmd) in chart.commands().iter().enumerate() {
            let Some(block) = cmd.text_block() else { continue };
            let Some(offset) = cmd.text_block_offset(&codec)? else { continue };
            let span = layout.records[line];
            let original = &layout.plain[span.body_start + offset..span.end];
            let script = self.decompiler.decompile(block);
            let rebuilt = compiler
                .compile(&script)
                .map(|tokens| TextBlock {
                    version: block.version,
                    tokens,
                })
                .and_then(|b| b.to_bytes(&codec));
            let check = match rebuilt {
                Ok(bytes) if bytes == original => TextBlockCheck {
                    line,
                    ok: true,
                    error: None,
                },
                Ok(_) => TextBlockCheck {
                    line,
                    ok: false,
                    error: Some("recompiled block differs from the original bytes".into()),
                },
                Err(e) => TextBlockCheck {
                    line,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            if !check.ok {
                debug!("text block at line {line}: {:?}", check.error);
            }
            checks.push(check);
        }
        Ok(checks)
    }
}

fn slice<'a>(plain: &'a [u8], range: &Range<usize>) -> &'a [u8] {
    &plain[range.clone()]
}

/// Compare two plain images part by part.
fn localize(original: &Layout, rebuilt: &[u8], encoding: Encoding) -> Vec<Divergence> {
    let rebuilt = match Chart::decode_layout(rebuilt, encoding) {
        Ok((_, layout)) => layout,
        Err(e) => {
            return vec![Divergence::Undecodable {
                message: e.to_string(),
            }];
        }
    };

    let mut out = Vec::new();
    if slice(&original.plain, &original.header) != slice(&rebuilt.plain, &rebuilt.header) {
        out.push(Divergence::Header);
    }
    if original.records.len() != rebuilt.records.len() {
        out.push(Divergence::CommandCount {
            original: original.records.len(),
            rebuilt: rebuilt.records.len(),
        });
    }
    for (line, (a, b)) in original.records.iter().zip(&rebuilt.records).enumerate() {
        if original.plain[a.start..a.end] != rebuilt.plain[b.start..b.end] {
            out.push(Divergence::Command { line });
        }
    }
    if slice(&original.plain, &original.labels) != slice(&rebuilt.plain, &rebuilt.labels) {
        out.push(Divergence::Labels);
    }
    out
}
