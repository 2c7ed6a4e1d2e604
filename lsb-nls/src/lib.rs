use encoding_rs::{Encoding as RsEncoding, SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NlsError {
    #[error("byte sequence is not valid {0}")]
    Malformed(Encoding),
    #[error("byte sequence does not re-encode identically in {0}")]
    NonCanonical(Encoding),
    #[error("'{ch}' is not a valid {encoding} character")]
    Unencodable { ch: char, encoding: Encoding },
}

/// Text encoding used for every string stored in a chart.
///
/// LiveMaker itself only ever writes CP932; UTF-8 exists for fan-made
/// re-targets of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Cp932,
    Utf8,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            // WHATWG "Shift_JIS" is the Windows-31J / CP932 superset.
            Encoding::Cp932 => SHIFT_JIS,
            Encoding::Utf8 => UTF_8,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Cp932 => f.write_str("CP932"),
            Encoding::Utf8 => f.write_str("UTF-8"),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cp932" | "sjis" | "shift_jis" | "shift-jis" => Ok(Encoding::Cp932),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            _ => Err(format!("unknown encoding: {s}")),
        }
    }
}

/// Strict codec bound to one encoding.
///
/// Unlike a display decoder this never substitutes replacement characters:
/// anything that would not survive a decode/encode cycle byte-for-byte is an
/// error, since charts must be written back bit-identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    enc: Encoding,
}

impl Codec {
    #[inline]
    pub fn new(enc: Encoding) -> Self {
        Self { enc }
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.enc
    }

    /// Decode `bytes`, failing on malformed input or on byte sequences that
    /// have more than one mapping (e.g. the NEC/IBM duplicates in CP932).
    pub fn decode_exact<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, NlsError> {
        match self.enc {
            Encoding::Utf8 => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| NlsError::Malformed(self.enc)),
            Encoding::Cp932 => {
                let text = SHIFT_JIS
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .ok_or(NlsError::Malformed(self.enc))?;
                let (round, _, had_errors) = SHIFT_JIS.encode(&text);
                if had_errors || round.as_ref() != bytes {
                    return Err(NlsError::NonCanonical(self.enc));
                }
                Ok(text)
            }
        }
    }

    /// Encode `s`, failing on the first character the encoding cannot represent.
    pub fn encode<'a>(&self, s: &'a str) -> Result<Cow<'a, [u8]>, NlsError> {
        match self.enc {
            Encoding::Utf8 => Ok(Cow::Borrowed(s.as_bytes())),
            Encoding::Cp932 => {
                let (bytes, _, had_errors) = SHIFT_JIS.encode(s);
                if had_errors {
                    let ch = self.first_unencodable(s).unwrap_or(char::REPLACEMENT_CHARACTER);
                    return Err(NlsError::Unencodable { ch, encoding: self.enc });
                }
                Ok(bytes)
            }
        }
    }

    pub fn first_unencodable(&self, s: &str) -> Option<char> {
        if self.enc == Encoding::Utf8 {
            return None;
        }
        let enc = self.enc.as_encoding_rs();
        let mut buf = [0u8; 4];
        s.chars().find(|ch| {
            let (_, _, had_errors) = enc.encode(ch.encode_utf8(&mut buf));
            had_errors
        })
    }

    pub fn check_encodable(&self, s: &str) -> Result<(), NlsError> {
        match self.first_unencodable(s) {
            Some(ch) => Err(NlsError::Unencodable { ch, encoding: self.enc }),
            None => Ok(()),
        }
    }
}
