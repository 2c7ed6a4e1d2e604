//! LiveMaker LSB charts: decoding, editing and re-encoding compiled
//! scenario charts, and the LNS script form of their text blocks.

pub mod chart;
pub mod command;
pub mod error;
pub mod io;
pub mod lns;
pub mod opcode;
pub mod scramble;
pub mod sink;
pub mod translate;
pub mod validate;
pub mod value;

pub use chart::{Chart, ChartFlags, ChartHeader, Label, Layout};
pub use command::{Command, CommandBody, CommandFlags, RecordSpan, TypedBody};
pub use error::{Error, FormatKind, Result};
pub use lns::{CompileOptions, Compiler, Decompiler, Tag, TextBlock, Token};
pub use lsb_nls::Encoding;
pub use opcode::{CommandType, Field, Schema, schema_for};
pub use scramble::ScrambleParams;
pub use sink::{ChartSink, patch_chart};
pub use translate::{MenuChoice, Scenario, TextBlockId};
pub use validate::{Divergence, TextBlockCheck, ValidationReport, Validator};
pub use value::{Value, ValueKind};
