//! Whole-file LSB chart codec and command-sequence editing.

use std::ops::Range;

use bitflags::bitflags;
use log::{debug, warn};
use lsb_nls::{Codec, Encoding};
use serde::{Deserialize, Serialize};

use crate::command::{Command, RecordSpan};
use crate::error::{Error, FormatKind, Result};
use crate::io::{ByteReader, put_blob, put_i32_le, put_u8, put_u32_le};
use crate::scramble::{self, SCRAMBLE_HEADER_LEN, ScrambleParams};
use crate::value::decode_str;

pub const MIN_VERSION: u32 = 103;
pub const MAX_VERSION: u32 = 117;
/// First (and only) LiveMaker 3 chart version.
pub const LM3_VERSION: u32 = 117;

/// Smallest encoded record: opcode, indent, flags and an empty body.
const MIN_RECORD_LEN: usize = 1 + 4 + 1 + 4;
/// Smallest label entry: empty name and a target.
const MIN_LABEL_LEN: usize = 4 + 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ChartFlags: u8 {
        const SCRAMBLED = 0x01;
        const _ = !0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartHeader {
    pub version: u32,
    pub flags: ChartFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scramble: Option<ScrambleParams>,
}

impl ChartHeader {
    fn encoded_len(&self) -> usize {
        4 + 1 + if self.scramble.is_some() { SCRAMBLE_HEADER_LEN } else { 0 }
    }
}

/// A symbolic jump target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    /// Index into the command sequence. May equal the command count, which
    /// addresses the end of the chart.
    pub target: usize,
}

/// One decoded LSB file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub header: ChartHeader,
    #[serde(skip)]
    encoding: Encoding,
    commands: Vec<Command>,
    labels: Vec<Label>,
}

/// Where everything sits in a decoded chart's plain image.
///
/// `plain` is the file header followed by the unscrambled body, so for
/// unscrambled charts it is the file itself.
#[derive(Debug, Clone)]
pub struct Layout {
    pub plain: Vec<u8>,
    pub header: Range<usize>,
    pub records: Vec<RecordSpan>,
    pub labels: Range<usize>,
}

fn check_version(version: u32) -> Result<()> {
    if (MIN_VERSION..=MAX_VERSION).contains(&version) {
        Ok(())
    } else {
        Err(Error::format(None, 0, FormatKind::UnsupportedVersion(version)))
    }
}

impl Chart {
    pub fn new(version: u32, encoding: Encoding) -> Result<Chart> {
        check_version(version)?;
        Ok(Chart {
            header: ChartHeader {
                version,
                flags: ChartFlags::empty(),
                scramble: None,
            },
            encoding,
            commands: Vec::new(),
            labels: Vec::new(),
        })
    }

    pub fn from_bytes(bytes: &[u8], encoding: Encoding) -> Result<Chart> {
        Chart::decode_layout(bytes, encoding).map(|(chart, _)| chart)
    }

    /// Decode `bytes` and report the byte range of every part.
    pub fn decode_layout(bytes: &[u8], encoding: Encoding) -> Result<(Chart, Layout)> {
        let codec = Codec::new(encoding);
        let mut r = ByteReader::new(bytes);
        let version = r.read_u32()?;
        check_version(version)?;
        let flags = ChartFlags::from_bits_retain(r.read_u8()?);
        let scramble = if flags.contains(ChartFlags::SCRAMBLED) {
            Some(ScrambleParams {
                chunk_size: r.read_i32()?,
                seed: r.read_u32()?,
            })
        } else {
            None
        };
        let header_len = r.offset();

        let plain = match scramble {
            Some(params) => {
                warn!(
                    "chart is scrambled (chunk size {}, seed {:#010x})",
                    params.chunk_size, params.seed
                );
                let mut plain = bytes[..header_len].to_vec();
                plain.extend(scramble::unscramble(&bytes[header_len..], params, header_len)?);
                plain
            }
            None => bytes.to_vec(),
        };

        let (commands, records, labels, label_range) = decode_body(&plain, header_len, &codec)?;

        let opaque = commands.iter().filter(|c| c.is_opaque()).count();
        if opaque > 0 {
            warn!("{opaque} of {} commands have no schema and are kept opaque", commands.len());
        }
        debug!(
            "decoded chart v{version}: {} commands, {} labels, {} bytes",
            commands.len(),
            labels.len(),
            bytes.len()
        );

        let chart = Chart {
            header: ChartHeader {
                version,
                flags,
                scramble,
            },
            encoding,
            commands,
            labels,
        };
        let layout = Layout {
            plain,
            header: 0..header_len,
            records,
            labels: label_range,
        };
        Ok((chart, layout))
    }

    /// Header plus unscrambled body.
    pub fn to_plain_bytes(&self) -> Result<Vec<u8>> {
        let codec = self.codec();
        let mut out = Vec::new();
        put_u32_le(self.header.version, &mut out);
        let mut flags = self.header.flags;
        flags.set(ChartFlags::SCRAMBLED, self.header.scramble.is_some());
        put_u8(flags.bits(), &mut out);
        if let Some(params) = self.header.scramble {
            put_i32_le(params.chunk_size, &mut out);
            put_u32_le(params.seed, &mut out);
        }

        put_u32_le(self.commands.len() as u32, &mut out);
        let size_at = out.len();
        put_u32_le(0, &mut out);
        let stream_start = out.len();
        for cmd in &self.commands {
            cmd.encode(&codec, &mut out)?;
        }
        let stream_size = (out.len() - stream_start) as u32;
        out[size_at..size_at + 4].copy_from_slice(&stream_size.to_le_bytes());

        put_u32_le(self.labels.len() as u32, &mut out);
        for label in &self.labels {
            if label.target > self.commands.len() {
                return Err(Error::LabelOutOfRange {
                    name: label.name.clone(),
                    target: label.target,
                    len: self.commands.len(),
                });
            }
            put_blob(&codec.encode(&label.name)?, &mut out);
            put_u32_le(label.target as u32, &mut out);
        }
        Ok(out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = self.to_plain_bytes()?;
        if let Some(params) = self.header.scramble {
            let header_len = self.header.encoded_len();
            let body = scramble::scramble(&out[header_len..], params)?;
            out.truncate(header_len);
            out.extend(body);
        }
        Ok(out)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn codec(&self) -> Codec {
        Codec::new(self.encoding)
    }

    /// Major LiveMaker release that wrote this chart.
    pub fn lm_version(&self) -> u8 {
        if self.header.version >= LM3_VERSION { 3 } else { 2 }
    }

    pub fn set_scramble(&mut self, params: Option<ScrambleParams>) {
        self.header.flags.set(ChartFlags::SCRAMBLED, params.is_some());
        self.header.scramble = params;
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Commands can be edited in place; use the insert/remove methods to
    /// change their number so labels stay valid.
    pub fn commands_mut(&mut self) -> &mut [Command] {
        &mut self.commands
    }

    pub fn command(&self, line: usize) -> Result<&Command> {
        self.commands.get(line).ok_or(Error::NoSuchLine(line))
    }

    pub fn command_mut(&mut self, line: usize) -> Result<&mut Command> {
        self.commands.get_mut(line).ok_or(Error::NoSuchLine(line))
    }

    pub fn push_command(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }

    /// Insert before `index`. Labels at or after `index` move with the
    /// commands they point to.
    pub fn insert_command(&mut self, index: usize, cmd: Command) -> Result<()> {
        if index > self.commands.len() {
            return Err(Error::NoSuchLine(index));
        }
        self.commands.insert(index, cmd);
        for label in &mut self.labels {
            if label.target >= index {
                label.target += 1;
            }
        }
        Ok(())
    }

    /// Remove the command at `index`. Labels on it now address its successor.
    pub fn remove_command(&mut self, index: usize) -> Result<Command> {
        if index >= self.commands.len() {
            return Err(Error::NoSuchLine(index));
        }
        let cmd = self.commands.remove(index);
        for label in &mut self.labels {
            if label.target > index {
                label.target -= 1;
            }
        }
        Ok(cmd)
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn add_label(&mut self, name: impl Into<String>, target: usize) -> Result<()> {
        let name = name.into();
        if target > self.commands.len() {
            return Err(Error::LabelOutOfRange {
                name,
                target,
                len: self.commands.len(),
            });
        }
        self.labels.push(Label { name, target });
        Ok(())
    }

    pub fn label_target(&self, name: &str) -> Option<usize> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.target)
    }
}

type Body = (Vec<Command>, Vec<RecordSpan>, Vec<Label>, Range<usize>);

fn decode_body(plain: &[u8], start: usize, codec: &Codec) -> Result<Body> {
    let mut r = ByteReader::at(plain, start);
    let count_at = r.offset();
    let count = r.read_u32()?;
    let size_at = r.offset();
    let stream_size = r.read_u32()?;
    if (count as usize).saturating_mul(MIN_RECORD_LEN) > r.remaining() {
        return Err(r.error_at(count_at, FormatKind::Truncated));
    }

    let stream_start = r.offset();
    let mut commands = Vec::with_capacity(count as usize);
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (cmd, span) = Command::decode(&mut r, codec)?;
        commands.push(cmd);
        records.push(span);
    }
    let actual = r.offset() - stream_start;
    if actual != stream_size as usize {
        return Err(r.error_at(
            size_at,
            FormatKind::StreamSize {
                declared: stream_size,
                actual,
            },
        ));
    }

    let labels_start = r.offset();
    let label_count = r.read_u32()?;
    if (label_count as usize).saturating_mul(MIN_LABEL_LEN) > r.remaining() {
        return Err(r.error_at(labels_start, FormatKind::Truncated));
    }
    let mut labels = Vec::with_capacity(label_count as usize);
    for _ in 0..label_count {
        let at = r.offset();
        let name = decode_str(&mut r, codec)?;
        let target = r.read_u32()?;
        if target > count {
            return Err(r.error_at(at, FormatKind::BadLabel { name, target, count }));
        }
        labels.push(Label {
            name,
            target: target as usize,
        });
    }

    if !r.is_empty() {
        return Err(r.error(FormatKind::TrailingBytes(r.remaining())));
    }
    Ok((commands, records, labels, labels_start..r.offset()))
}
