//! One chart command record and its parameter codec.

use bitflags::bitflags;
use log::trace;
use lsb_nls::Codec;
use serde::{Deserialize, Serialize};

use crate::error::{Error, FormatKind, Result};
use crate::io::{ByteReader, put_i32_le, put_u8, put_u32_le};
use crate::lns::TextBlock;
use crate::opcode::{CommandType, Field, Schema, schema_for};
use crate::value::Value;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CommandFlags: u8 {
        const MUTE = 0x01;
        const NOT_UPDATE = 0x02;
        const _ = !0;
    }
}

/// Parameters of a command whose opcode has a schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TypedBody {
    pub params: Vec<Value>,
    /// Groups of the count-governed tail. The count is derived on encode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tail: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandBody {
    Typed(TypedBody),
    /// Raw parameter bytes of an opcode without a schema.
    Opaque(#[serde(with = "hex")] Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub opcode: u8,
    pub indent: u32,
    pub flags: CommandFlags,
    pub body: CommandBody,
}

/// Byte ranges of one encoded record, relative to the plain chart image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub start: usize,
    pub body_start: usize,
    pub end: usize,
}

impl Command {
    /// Build a typed command, checking `params` against the opcode schema.
    pub fn new(ty: CommandType, params: Vec<Value>) -> Result<Command> {
        let schema = ty.schema().ok_or_else(|| Error::Schema {
            opcode: ty.to_string(),
            message: "opcode has no parameter schema".into(),
        })?;
        check_values(ty.id(), schema.fields, &params)?;
        Ok(Command {
            opcode: ty.id(),
            indent: 0,
            flags: CommandFlags::empty(),
            body: CommandBody::Typed(TypedBody {
                params,
                tail: Vec::new(),
                text: schema.text_block.then(TextBlock::default),
            }),
        })
    }

    pub fn opaque(opcode: u8, bytes: Vec<u8>) -> Command {
        Command {
            opcode,
            indent: 0,
            flags: CommandFlags::empty(),
            body: CommandBody::Opaque(bytes),
        }
    }

    pub fn with_indent(mut self, indent: u32) -> Self {
        self.indent = indent;
        self
    }

    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::from_repr(self.opcode)
    }

    pub fn name(&self) -> String {
        CommandType::display_name(self.opcode)
    }

    pub fn is(&self, ty: CommandType) -> bool {
        self.opcode == ty.id()
    }

    pub fn schema(&self) -> Option<&'static Schema> {
        schema_for(self.opcode)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.body, CommandBody::Opaque(_))
    }

    pub fn typed(&self) -> Option<&TypedBody> {
        match &self.body {
            CommandBody::Typed(body) => Some(body),
            CommandBody::Opaque(_) => None,
        }
    }

    pub fn typed_mut(&mut self) -> Option<&mut TypedBody> {
        match &mut self.body {
            CommandBody::Typed(body) => Some(body),
            CommandBody::Opaque(_) => None,
        }
    }

    pub fn text_block(&self) -> Option<&TextBlock> {
        self.typed()?.text.as_ref()
    }

    pub fn text_block_mut(&mut self) -> Option<&mut TextBlock> {
        self.typed_mut()?.text.as_mut()
    }

    fn schema_error(&self, message: impl Into<String>) -> Error {
        Error::Schema {
            opcode: self.name(),
            message: message.into(),
        }
    }

    fn no_such_field(&self, field: &str) -> Error {
        Error::NoSuchField {
            opcode: self.name(),
            field: field.to_string(),
        }
    }

    fn typed_parts(&self) -> Result<(&'static Schema, &TypedBody)> {
        match (self.schema(), self.typed()) {
            (Some(schema), Some(body)) => Ok((schema, body)),
            _ => Err(self.schema_error("command is opaque")),
        }
    }

    fn typed_parts_mut(&mut self) -> Result<(&'static Schema, &mut TypedBody)> {
        let schema = self.schema();
        let name = self.name();
        match (schema, self.typed_mut()) {
            (Some(schema), Some(body)) => Ok((schema, body)),
            _ => Err(Error::Schema {
                opcode: name,
                message: "command is opaque".into(),
            }),
        }
    }

    /// Every parameter with its display name, fixed fields first and then
    /// tail fields as `Name[group]`.
    pub fn fields(&self) -> Vec<(String, &Value)> {
        let Ok((schema, body)) = self.typed_parts() else {
            return Vec::new();
        };
        let mut out: Vec<(String, &Value)> = schema
            .fields
            .iter()
            .zip(&body.params)
            .map(|(f, v)| (f.name.to_string(), v))
            .collect();
        if let Some(tail) = schema.tail {
            for (g, group) in body.tail.iter().enumerate() {
                for (f, v) in tail.iter().zip(group) {
                    out.push((format!("{}[{g}]", f.name), v));
                }
            }
        }
        out
    }

    /// Parameter by flat index, in the order of [`Command::fields`].
    pub fn field_at(&self, index: usize) -> Option<&Value> {
        let (schema, body) = self.typed_parts().ok()?;
        let (slot, _) = locate_flat(schema, body, index)?;
        resolve(body, slot)
    }

    /// Parameter by name, e.g. `Calc` or `Text[2]`.
    pub fn field(&self, name: &str) -> Result<&Value> {
        let (schema, body) = self.typed_parts()?;
        let (slot, _) = locate_named(schema, name).ok_or_else(|| self.no_such_field(name))?;
        resolve(body, slot).ok_or_else(|| self.no_such_field(name))
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        let schema = self.schema().ok_or_else(|| self.schema_error("command is opaque"))?;
        let (slot, field) = locate_named(schema, name).ok_or_else(|| self.no_such_field(name))?;
        self.store(slot, field, name, value)
    }

    pub fn set_field_at(&mut self, index: usize, value: Value) -> Result<()> {
        let (slot, field) = {
            let (schema, body) = self.typed_parts()?;
            locate_flat(schema, body, index).ok_or_else(|| self.no_such_field(&format!("#{index}")))?
        };
        self.store(slot, field, &format!("#{index}"), value)
    }

    fn store(&mut self, slot: Slot, field: Field, label: &str, value: Value) -> Result<()> {
        if !value.matches(field.kind) {
            return Err(Error::TypeMismatch {
                field: label.to_string(),
                expected: field.kind,
                found: value.kind_name(),
            });
        }
        let missing = self.no_such_field(label);
        let (_, body) = self.typed_parts_mut()?;
        let target = match slot {
            Slot::Fixed(i) => body.params.get_mut(i),
            Slot::Tail(g, i) => body.tail.get_mut(g).and_then(|group| group.get_mut(i)),
        };
        *target.ok_or(missing)? = value;
        Ok(())
    }

    pub fn tail_len(&self) -> usize {
        self.typed().map_or(0, |body| body.tail.len())
    }

    /// Append one variable-tail group, e.g. a menu choice.
    pub fn push_tail_group(&mut self, group: Vec<Value>) -> Result<()> {
        let opcode = self.opcode;
        let (schema, body) = self.typed_parts_mut()?;
        let tail = schema.tail.ok_or_else(|| Error::Schema {
            opcode: CommandType::display_name(opcode),
            message: "opcode has no variable tail".into(),
        })?;
        check_values(opcode, tail, &group)?;
        body.tail.push(group);
        Ok(())
    }

    pub fn remove_tail_group(&mut self, index: usize) -> Result<Vec<Value>> {
        let missing = self.no_such_field(&format!("group {index}"));
        let (_, body) = self.typed_parts_mut()?;
        if index >= body.tail.len() {
            return Err(missing);
        }
        Ok(body.tail.remove(index))
    }

    /// Decode one record at the reader's position.
    pub fn decode(r: &mut ByteReader<'_>, codec: &Codec) -> Result<(Command, RecordSpan)> {
        let start = r.offset();
        let opcode = r.read_u8()?;
        r.set_opcode(Some(opcode));
        let indent = r.read_u32()?;
        let flags = CommandFlags::from_bits_retain(r.read_u8()?);
        let body_len = r.read_u32()? as usize;
        let body_start = r.offset();
        let mut body_reader = r.sub_reader(body_len)?;

        let body = match schema_for(opcode) {
            Some(schema) => CommandBody::Typed(decode_typed(schema, &mut body_reader, codec)?),
            None => {
                trace!("{} at {start:#x}: {body_len} opaque bytes", CommandType::display_name(opcode));
                CommandBody::Opaque(body_reader.read_bytes(body_len)?.to_vec())
            }
        };
        r.set_opcode(None);

        let span = RecordSpan {
            start,
            body_start,
            end: r.offset(),
        };
        Ok((
            Command {
                opcode,
                indent,
                flags,
                body,
            },
            span,
        ))
    }

    /// Append this record's encoding.
    pub fn encode(&self, codec: &Codec, out: &mut Vec<u8>) -> Result<()> {
        put_u8(self.opcode, out);
        put_u32_le(self.indent, out);
        put_u8(self.flags.bits(), out);
        let len_at = out.len();
        put_u32_le(0, out);
        let body_start = out.len();

        match (&self.body, self.schema()) {
            (CommandBody::Opaque(bytes), _) => out.extend_from_slice(bytes),
            (CommandBody::Typed(body), Some(schema)) => self.encode_typed(schema, body, codec, out)?,
            (CommandBody::Typed(_), None) => return Err(self.schema_error("typed body on an opcode without schema")),
        }

        let body_len = (out.len() - body_start) as u32;
        out[len_at..len_at + 4].copy_from_slice(&body_len.to_le_bytes());
        Ok(())
    }

    fn encode_typed(&self, schema: &Schema, body: &TypedBody, codec: &Codec, out: &mut Vec<u8>) -> Result<()> {
        self.encode_params(schema, body, codec, out)?;
        match (&body.text, schema.text_block) {
            (Some(block), true) => block.encode(codec, out),
            (None, true) => Err(self.schema_error("missing text block")),
            (Some(_), false) => Err(self.schema_error("opcode does not carry a text block")),
            (None, false) => Ok(()),
        }
    }

    /// Encoded length of the parameters ahead of the text block, i.e. the
    /// block's offset inside the record body.
    pub fn text_block_offset(&self, codec: &Codec) -> Result<Option<usize>> {
        let Ok((schema, body)) = self.typed_parts() else {
            return Ok(None);
        };
        if body.text.is_none() {
            return Ok(None);
        }
        let mut out = Vec::new();
        self.encode_params(schema, body, codec, &mut out)?;
        Ok(Some(out.len()))
    }

    fn encode_params(&self, schema: &Schema, body: &TypedBody, codec: &Codec, out: &mut Vec<u8>) -> Result<()> {
        if body.params.len() != schema.fields.len() {
            return Err(self.schema_error(format!(
                "expected {} parameters, found {}",
                schema.fields.len(),
                body.params.len()
            )));
        }
        for (field, value) in schema.fields.iter().zip(&body.params) {
            value.encode(field.kind, field.name, codec, out)?;
        }

        match schema.tail {
            Some(tail) => {
                put_i32_le(body.tail.len() as i32, out);
                for (g, group) in body.tail.iter().enumerate() {
                    if group.len() != tail.len() {
                        return Err(self.schema_error(format!(
                            "tail group {g} has {} values, expected {}",
                            group.len(),
                            tail.len()
                        )));
                    }
                    for (field, value) in tail.iter().zip(group) {
                        value.encode(field.kind, &format!("{}[{g}]", field.name), codec, out)?;
                    }
                }
            }
            None if !body.tail.is_empty() => return Err(self.schema_error("opcode has no variable tail")),
            None => {}
        }
        Ok(())
    }
}

fn check_values(opcode: u8, fields: &[Field], values: &[Value]) -> Result<()> {
    if values.len() != fields.len() {
        return Err(Error::Schema {
            opcode: CommandType::display_name(opcode),
            message: format!("expected {} values, found {}", fields.len(), values.len()),
        });
    }
    for (field, value) in fields.iter().zip(values) {
        if !value.matches(field.kind) {
            return Err(Error::TypeMismatch {
                field: field.name.to_string(),
                expected: field.kind,
                found: value.kind_name(),
            });
        }
    }
    Ok(())
}

fn decode_typed(schema: &Schema, r: &mut ByteReader<'_>, codec: &Codec) -> Result<TypedBody> {
    let mut body = TypedBody::default();
    for field in schema.fields {
        body.params.push(Value::decode(field.kind, r, codec)?);
    }

    if let Some(tail) = schema.tail {
        let at = r.offset();
        let count = r.read_i32()?;
        let group_min: usize = tail.iter().map(|f| f.kind.min_size()).sum();
        if count < 0 || (count as usize).saturating_mul(group_min) > r.remaining() {
            return Err(r.error_at(
                at,
                FormatKind::BadTailCount {
                    count: i64::from(count),
                    remaining: r.remaining(),
                },
            ));
        }
        for _ in 0..count {
            let mut group = Vec::with_capacity(tail.len());
            for field in tail {
                group.push(Value::decode(field.kind, r, codec)?);
            }
            body.tail.push(group);
        }
    }

    if schema.text_block {
        body.text = Some(TextBlock::decode(r, codec)?);
    }

    if !r.is_empty() {
        return Err(r.error(FormatKind::TrailingBytes(r.remaining())));
    }
    Ok(body)
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Fixed(usize),
    Tail(usize, usize),
}

fn locate_named(schema: &Schema, name: &str) -> Option<(Slot, Field)> {
    if let Some(i) = schema.field_index(name) {
        return Some((Slot::Fixed(i), schema.fields[i]));
    }
    let (base, rest) = name.split_once('[')?;
    let group: usize = rest.strip_suffix(']')?.trim().parse().ok()?;
    let tail = schema.tail?;
    let i = schema.tail_index(base.trim())?;
    Some((Slot::Tail(group, i), tail[i]))
}

fn locate_flat(schema: &Schema, body: &TypedBody, index: usize) -> Option<(Slot, Field)> {
    if index < schema.fields.len() {
        return Some((Slot::Fixed(index), schema.fields[index]));
    }
    let tail = schema.tail?;
    let rel = index - schema.fields.len();
    let (group, i) = (rel / tail.len(), rel % tail.len());
    (group < body.tail.len()).then(|| (Slot::Tail(group, i), tail[i]))
}

fn resolve(body: &TypedBody, slot: Slot) -> Option<&Value> {
    match slot {
        Slot::Fixed(i) => body.params.get(i),
        Slot::Tail(g, i) => body.tail.get(g)?.get(i),
    }
}
