use lsb_nls::NlsError;
use thiserror::Error;

use crate::opcode::CommandType;
use crate::value::ValueKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What exactly was wrong with a malformed chart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatKind {
    #[error("unexpected end of data")]
    Truncated,
    #[error("string length {len} exceeds the {remaining} remaining bytes")]
    StringOverrun { len: usize, remaining: usize },
    #[error("undecodable string: {0}")]
    BadString(NlsError),
    #[error("flag byte {0:#04x} is neither 0 nor 1")]
    BadFlag(u8),
    #[error("variable tail count {count} does not fit the remaining {remaining} bytes")]
    BadTailCount { count: i64, remaining: usize },
    #[error("{0} unconsumed trailing bytes")]
    TrailingBytes(usize),
    #[error("command stream is {actual} bytes but the header declares {declared}")]
    StreamSize { declared: u32, actual: usize },
    #[error("unsupported LSB version {0}")]
    UnsupportedVersion(u32),
    #[error("label {name:?} targets command {target} but the chart has {count} commands")]
    BadLabel { name: String, target: u32, count: u32 },
    #[error("bad text block: {0}")]
    BadTextBlock(String),
    #[error("bad scramble parameters: {0}")]
    BadScramble(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} at offset {offset:#x}{}", at_opcode(.opcode))]
    Format {
        opcode: Option<u8>,
        offset: usize,
        kind: FormatKind,
    },

    #[error("type mismatch for {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: ValueKind,
        found: &'static str,
    },

    #[error("{opcode}: {message}")]
    Schema { opcode: String, message: String },

    #[error("LNS syntax error on line {line}{}: {message}", in_tag(.tag))]
    Syntax {
        line: usize,
        tag: Option<String>,
        message: String,
    },

    #[error("tag <{tag}>: {message}")]
    Tag { tag: String, message: String },

    #[error(transparent)]
    Nls(#[from] NlsError),

    #[error("label {name:?} targets command {target} past the end of the chart ({len} commands)")]
    LabelOutOfRange { name: String, target: usize, len: usize },

    #[error("no command at line {0}")]
    NoSuchLine(usize),

    #[error("command at line {line} ({opcode}) does not carry a text block")]
    NotTextCommand { line: usize, opcode: String },

    #[error("command at line {line} ({opcode}) is not a choice menu")]
    NotMenuCommand { line: usize, opcode: String },

    #[error("{opcode} has no field {field:?}")]
    NoSuchField { opcode: String, field: String },

    #[error("text segment {index} does not exist at line {line}")]
    NoSuchSegment { line: usize, index: usize },

    #[error("bad text identifier: {0}")]
    BadIdentifier(String),

    #[error("could not write back {entry}")]
    WriteBack {
        entry: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn format(opcode: Option<u8>, offset: usize, kind: FormatKind) -> Self {
        Error::Format { opcode, offset, kind }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format { .. })
    }
}

fn at_opcode(opcode: &Option<u8>) -> String {
    match opcode {
        Some(op) => format!(" while decoding {}", CommandType::display_name(*op)),
        None => String::new(),
    }
}

fn in_tag(tag: &Option<String>) -> String {
    match tag {
        Some(tag) => format!(" in <{tag}>"),
        None => String::new(),
    }
}
