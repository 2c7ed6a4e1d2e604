//! TpWord binary text block codec.

use lsb_nls::Codec;

use super::tags::{self, AttrKind, BREAK_LINE, BREAK_PAGE, TagCode, TagSpec};
use super::token::{Tag, TextBlock, Token};
use crate::error::{Error, FormatKind, Result};
use crate::io::{ByteReader, put_blob, put_i32_le, put_u8, put_u32_le};
use crate::value::decode_str;

pub const SIGNATURE: &[u8; 6] = b"TpWord";

const TOKEN_CHAR: u8 = 0x01;
const TOKEN_TAG: u8 = 0x02;
const TOKEN_BREAK: u8 = 0x03;

/// Deepest paired-tag nesting accepted by the compiler and both codec
/// directions.
pub const MAX_DEPTH: usize = 64;

impl TextBlock {
    /// Decode a block that occupies the rest of `r`.
    pub fn decode(r: &mut ByteReader<'_>, codec: &Codec) -> Result<TextBlock> {
        let at = r.offset();
        if &r.read_array::<6>()? != SIGNATURE {
            return Err(r.error_at(at, bad("missing TpWord signature")));
        }
        let at = r.offset();
        let digits = r.read_array::<3>()?;
        let version = parse_version(&digits).ok_or_else(|| r.error_at(at, bad("bad TpWord version")))?;
        let count = r.read_u32()?;
        let tokens = decode_tokens(r, count, 0, codec)?;
        Ok(TextBlock { version, tokens })
    }

    /// Decode a standalone block. All of `bytes` must be consumed.
    pub fn from_bytes(bytes: &[u8], codec: &Codec) -> Result<TextBlock> {
        let mut r = ByteReader::new(bytes);
        let block = TextBlock::decode(&mut r, codec)?;
        if !r.is_empty() {
            return Err(r.error(FormatKind::TrailingBytes(r.remaining())));
        }
        Ok(block)
    }

    pub fn encode(&self, codec: &Codec, out: &mut Vec<u8>) -> Result<()> {
        if self.version > 999 {
            return Err(Error::Tag {
                tag: "TpWord".into(),
                message: format!("block version {} does not fit three digits", self.version),
            });
        }
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(format!("{:03}", self.version).as_bytes());
        encode_counted(&self.tokens, 0, codec, out)
    }

    pub fn to_bytes(&self, codec: &Codec) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode(codec, &mut out)?;
        Ok(out)
    }
}

fn bad(message: &str) -> FormatKind {
    FormatKind::BadTextBlock(message.to_string())
}

fn parse_version(digits: &[u8; 3]) -> Option<u16> {
    digits.iter().try_fold(0u16, |acc, &d| {
        d.is_ascii_digit().then(|| acc * 10 + u16::from(d - b'0'))
    })
}

fn decode_tokens(r: &mut ByteReader<'_>, count: u32, depth: usize, codec: &Codec) -> Result<Vec<Token>> {
    if depth > MAX_DEPTH {
        return Err(r.error(bad("paired tags nested too deeply")));
    }
    // The smallest token is two bytes.
    if (count as usize).saturating_mul(2) > r.remaining() {
        return Err(r.error(FormatKind::Truncated));
    }
    let mut tokens: Vec<Token> = Vec::new();
    for _ in 0..count {
        let at = r.offset();
        match r.read_u8()? {
            TOKEN_CHAR => {
                let len = r.read_u8()? as usize;
                let bytes = r.read_bytes(len)?;
                let ch = codec
                    .decode_exact(bytes)
                    .map_err(|e| r.error_at(at, FormatKind::BadString(e)))?;
                if ch.chars().count() != 1 {
                    return Err(r.error_at(at, bad("char token must hold exactly one character")));
                }
                match tokens.last_mut() {
                    Some(Token::Text(run)) => run.push_str(&ch),
                    _ => tokens.push(Token::Text(ch.into_owned())),
                }
            }
            TOKEN_TAG => tokens.push(decode_tag(r, at, depth, codec)?),
            TOKEN_BREAK => {
                let kind = r.read_u8()?;
                tokens.push(match kind {
                    BREAK_LINE => Token::LineBreak,
                    BREAK_PAGE => Token::PageBreak,
                    other => {
                        let spec = tags::by_code(TagCode::Break(other))
                            .ok_or_else(|| r.error_at(at, bad(&format!("unknown break kind {other}"))))?;
                        Token::Tag(Tag::new(spec.name))
                    }
                });
            }
            other => return Err(r.error_at(at, bad(&format!("unknown token type {other:#04x}")))),
        }
    }
    Ok(tokens)
}

fn decode_tag(r: &mut ByteReader<'_>, at: usize, depth: usize, codec: &Codec) -> Result<Token> {
    let code = r.read_u8()?;
    let spec = tags::by_code(TagCode::Tag(code))
        .ok_or_else(|| r.error_at(at, bad(&format!("unknown tag code {code:#04x}"))))?;
    let mask = r.read_u8()?;
    if u32::from(mask) >> spec.attrs.len() != 0 {
        return Err(r.error_at(at, bad(&format!("attribute mask {mask:#04x} too wide for {}", spec.name))));
    }
    let mut tag = Tag::new(spec.name);
    for (i, attr) in spec.attrs.iter().enumerate() {
        if mask & (1 << i) == 0 {
            continue;
        }
        let value = match attr.kind {
            AttrKind::Int => r.read_i32()?.to_string(),
            AttrKind::Str => decode_str(r, codec)?,
            AttrKind::Enum(words) => {
                let idx = r.read_u8()? as usize;
                words
                    .get(idx)
                    .ok_or_else(|| r.error_at(at, bad(&format!("{} index {idx} out of range", attr.name))))?
                    .to_string()
            }
        };
        tag.attrs.push((attr.name.to_string(), value));
    }
    if spec.paired {
        let count = r.read_u32()?;
        tag.content = Some(decode_tokens(r, count, depth + 1, codec)?);
    }
    Ok(Token::Tag(tag))
}

/// Write a `u32` token count followed by the tokens.
fn encode_counted(tokens: &[Token], depth: usize, codec: &Codec, out: &mut Vec<u8>) -> Result<()> {
    let count_at = out.len();
    put_u32_le(0, out);
    let count = encode_tokens(tokens, depth, codec, out)?;
    out[count_at..count_at + 4].copy_from_slice(&count.to_le_bytes());
    Ok(())
}

fn encode_tokens(tokens: &[Token], depth: usize, codec: &Codec, out: &mut Vec<u8>) -> Result<u32> {
    let mut count = 0u32;
    for token in tokens {
        match token {
            Token::Text(run) => {
                let mut buf = [0u8; 4];
                for ch in run.chars() {
                    let bytes = codec.encode(ch.encode_utf8(&mut buf))?;
                    put_u8(TOKEN_CHAR, out);
                    put_u8(bytes.len() as u8, out);
                    out.extend_from_slice(&bytes);
                    count += 1;
                }
            }
            Token::LineBreak => {
                out.extend_from_slice(&[TOKEN_BREAK, BREAK_LINE]);
                count += 1;
            }
            Token::PageBreak => {
                out.extend_from_slice(&[TOKEN_BREAK, BREAK_PAGE]);
                count += 1;
            }
            Token::Comment(_) => {}
            Token::Tag(tag) => {
                encode_tag(tag, depth, codec, out)?;
                count += 1;
            }
        }
    }
    Ok(count)
}

fn tag_error(tag: &Tag, message: impl Into<String>) -> Error {
    Error::Tag {
        tag: tag.name.clone(),
        message: message.into(),
    }
}

fn encode_tag(tag: &Tag, depth: usize, codec: &Codec, out: &mut Vec<u8>) -> Result<()> {
    let spec: &TagSpec = tags::by_name(&tag.name).ok_or_else(|| tag_error(tag, "unsupported tag"))?;
    if spec.paired != tag.content.is_some() {
        return Err(tag_error(
            tag,
            if spec.paired {
                "paired tag without content"
            } else {
                "tag does not take content"
            },
        ));
    }

    let mut values: [Option<&str>; 8] = [None; 8];
    let mut mask = 0u8;
    for (name, value) in &tag.attrs {
        let idx = spec
            .attr_index(name)
            .ok_or_else(|| tag_error(tag, format!("unknown attribute {name}")))?;
        if mask & (1 << idx) != 0 {
            return Err(tag_error(tag, format!("duplicate attribute {name}")));
        }
        mask |= 1 << idx;
        values[idx] = Some(value.as_str());
    }

    let code = match spec.code {
        TagCode::Break(kind) => {
            if mask != 0 {
                return Err(tag_error(tag, "tag takes no attributes"));
            }
            out.extend_from_slice(&[TOKEN_BREAK, kind]);
            return Ok(());
        }
        TagCode::Tag(code) => code,
    };

    out.extend_from_slice(&[TOKEN_TAG, code, mask]);
    for (attr, value) in spec.attrs.iter().zip(values) {
        let Some(value) = value else { continue };
        match attr.kind {
            AttrKind::Int => {
                let v: i32 = value
                    .trim()
                    .parse()
                    .map_err(|_| tag_error(tag, format!("{}={value:?} is not an integer", attr.name)))?;
                put_i32_le(v, out);
            }
            AttrKind::Str => put_blob(&codec.encode(value)?, out),
            AttrKind::Enum(words) => {
                let idx = words
                    .iter()
                    .position(|w| w.eq_ignore_ascii_case(value))
                    .ok_or_else(|| tag_error(tag, format!("{}={value:?} is not one of {words:?}", attr.name)))?;
                put_u8(idx as u8, out);
            }
        }
    }
    if let Some(children) = &tag.content {
        if depth >= MAX_DEPTH {
            return Err(tag_error(tag, "paired tags nested too deeply"));
        }
        encode_counted(children, depth + 1, codec, out)?;
    }
    Ok(())
}
