//! LNS scenario script: the token model, the TpWord binary form and the
//! script text compiler/decompiler.

mod binary;
mod compile;
mod decompile;
pub mod tags;
mod token;

pub use binary::{MAX_DEPTH, SIGNATURE};
pub use compile::{CompileOptions, Compiler};
pub use decompile::Decompiler;
pub use token::{DEFAULT_BLOCK_VERSION, Tag, TextBlock, Token};
