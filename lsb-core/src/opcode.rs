//! Command ids and the per-opcode parameter schemas.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr};

use crate::value::ValueKind;

/// LiveMaker command ids.
///
/// The numbering covers every command class the engine knows; only some of
/// them have a registered [`Schema`], the rest are carried as opaque bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, FromRepr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum CommandType {
    If = 0x00,
    Elseif = 0x01,
    Else = 0x02,
    Label = 0x03,
    Jump = 0x04,
    Call = 0x05,
    Exit = 0x06,
    Wait = 0x07,
    BoxNew = 0x08,
    ImgNew = 0x09,
    MesNew = 0x0A,
    Timer = 0x0B,
    Movie = 0x0C,
    Flip = 0x0D,
    Calc = 0x0E,
    VarNew = 0x0F,
    VarDel = 0x10,
    GetProp = 0x11,
    SetProp = 0x12,
    ObjDel = 0x13,
    TextIns = 0x14,
    MovieStop = 0x15,
    ClrHist = 0x16,
    Cinema = 0x17,
    Caption = 0x18,
    Menu = 0x19,
    MenuClose = 0x1A,
    Comment = 0x1B,
    TextClr = 0x1C,
    CallHist = 0x1D,
    Button = 0x1E,
    While = 0x1F,
    WhileInit = 0x20,
    WhileLoop = 0x21,
    Break = 0x22,
    Continue = 0x23,
    ParticleNew = 0x24,
    FireNew = 0x25,
    GameSave = 0x26,
    GameLoad = 0x27,
    PCReset = 0x28,
    Reset = 0x29,
    Sound = 0x2A,
    EditNew = 0x2B,
    MemoNew = 0x2C,
    Terminate = 0x2D,
    DoEvent = 0x2E,
    ClrRead = 0x2F,
    MapImgNew = 0x30,
    WaveNew = 0x31,
    TileNew = 0x32,
    SliderNew = 0x33,
    ScrollbarNew = 0x34,
    GaugeNew = 0x35,
    CGCaption = 0x36,
    MediaPlay = 0x37,
    PrevMenuNew = 0x38,
    PropMotion = 0x39,
    FormatHist = 0x3A,
    SaveCabinet = 0x3B,
    LoadCabinet = 0x3C,
    IFDEF = 0x3D,
    IFNDEF = 0x3E,
    ENDIF = 0x3F,
}

impl CommandType {
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Name of a raw opcode byte, including ids outside the known range.
    pub fn display_name(opcode: u8) -> String {
        match CommandType::from_repr(opcode) {
            Some(ty) => ty.to_string(),
            None => format!("Opaque({opcode:#04x})"),
        }
    }

    pub fn schema(self) -> Option<&'static Schema> {
        schema_for(self as u8)
    }
}

/// A named, typed parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: ValueKind,
}

const fn field(name: &'static str, kind: ValueKind) -> Field {
    Field { name, kind }
}

/// Parameter layout of one registered opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    /// Fixed parameters, in stream order.
    pub fields: &'static [Field],
    /// Group layout of the count-governed variable tail, if any. The count
    /// itself is an `Int` written right after the fixed fields.
    pub tail: Option<&'static [Field]>,
    /// Whether a TpWord text block follows the parameters.
    pub text_block: bool,
}

impl Schema {
    const fn fixed(fields: &'static [Field]) -> Self {
        Self {
            fields,
            tail: None,
            text_block: false,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn tail_index(&self, name: &str) -> Option<usize> {
        self.tail?.iter().position(|f| f.name.eq_ignore_ascii_case(name))
    }
}

const CALC: &[Field] = &[field("Calc", ValueKind::Str)];
const NAME: &[Field] = &[field("Name", ValueKind::Str)];
const TARGET: &[Field] = &[field("Target", ValueKind::Str)];
const TEXT: &[Field] = &[field("Text", ValueKind::Str)];
const CAPTION_FIELDS: &[Field] = &[field("Caption", ValueKind::Str)];
const JUMP_FIELDS: &[Field] = &[
    field("Page", ValueKind::Str),
    field("Label", ValueKind::Int),
    field("Calc", ValueKind::Str),
];
const CALL_FIELDS: &[Field] = &[
    field("Page", ValueKind::Str),
    field("Label", ValueKind::Int),
    field("Result", ValueKind::Str),
    field("Calc", ValueKind::Str),
    field("Params", ValueKind::Array(&ValueKind::Str)),
];
const WAIT_FIELDS: &[Field] = &[
    field("Calc", ValueKind::Str),
    field("Time", ValueKind::Int),
    field("StopEvent", ValueKind::Flag),
];
const VAR_NEW_FIELDS: &[Field] = &[
    field("Name", ValueKind::Str),
    field("Type", ValueKind::Int),
    field("InitVal", ValueKind::Str),
    field("Scope", ValueKind::Int),
];
const TEXT_INS_FIELDS: &[Field] = &[
    field("Target", ValueKind::Str),
    field("Hist", ValueKind::Flag),
    field("Wait", ValueKind::Flag),
    field("StopEvent", ValueKind::Flag),
];
const MENU_FIELDS: &[Field] = &[field("Target", ValueKind::Str), field("Cancel", ValueKind::Flag)];
const MENU_CHOICE: &[Field] = &[field("Text", ValueKind::Str), field("Jump", ValueKind::Int)];
const SOUND_FIELDS: &[Field] = &[
    field("Name", ValueKind::Str),
    field("Source", ValueKind::Str),
    field("Volume", ValueKind::Real),
    field("Repeat", ValueKind::Flag),
];

static IF: Schema = Schema::fixed(CALC);
static EMPTY: Schema = Schema::fixed(&[]);
static LABEL: Schema = Schema::fixed(NAME);
static JUMP: Schema = Schema::fixed(JUMP_FIELDS);
static CALL: Schema = Schema::fixed(CALL_FIELDS);
static WAIT: Schema = Schema::fixed(WAIT_FIELDS);
static VAR_NEW: Schema = Schema::fixed(VAR_NEW_FIELDS);
static VAR_DEL: Schema = Schema::fixed(NAME);
static TEXT_INS: Schema = Schema {
    fields: TEXT_INS_FIELDS,
    tail: None,
    text_block: true,
};
static CAPTION: Schema = Schema::fixed(CAPTION_FIELDS);
static MENU: Schema = Schema {
    fields: MENU_FIELDS,
    tail: Some(MENU_CHOICE),
    text_block: false,
};
static COMMENT: Schema = Schema::fixed(TEXT);
static TEXT_CLR: Schema = Schema::fixed(TARGET);
static SOUND: Schema = Schema::fixed(SOUND_FIELDS);

/// Look up the schema of a raw opcode. `None` means the command is opaque.
pub fn schema_for(opcode: u8) -> Option<&'static Schema> {
    use CommandType::*;

    let schema = match CommandType::from_repr(opcode)? {
        If | Elseif | Exit | Calc => &IF,
        Else | MenuClose | Terminate | ClrHist | PCReset => &EMPTY,
        Label => &LABEL,
        Jump => &JUMP,
        Call => &CALL,
        Wait => &WAIT,
        VarNew => &VAR_NEW,
        VarDel => &VAR_DEL,
        TextIns => &TEXT_INS,
        Caption => &CAPTION,
        Menu => &MENU,
        Comment => &COMMENT,
        TextClr => &TEXT_CLR,
        Sound => &SOUND,
        _ => return None,
    };
    Some(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn ids_are_dense() {
        for (i, ty) in CommandType::iter().enumerate() {
            assert_eq!(ty.id() as usize, i);
            assert_eq!(CommandType::from_repr(i as u8), Some(ty));
        }
        assert_eq!(CommandType::iter().count(), 0x40);
        assert_eq!(CommandType::from_repr(0x40), None);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("textins".parse::<CommandType>().unwrap(), CommandType::TextIns);
        assert_eq!(CommandType::display_name(0x19), "Menu");
        assert_eq!(CommandType::display_name(0x80), "Opaque(0x80)");
    }

    #[test]
    fn only_registered_opcodes_have_schemas() {
        assert!(schema_for(CommandType::BoxNew.id()).is_none());
        assert!(schema_for(0xFF).is_none());
        let menu = CommandType::Menu.schema().unwrap();
        assert_eq!(menu.tail_index("jump"), Some(1));
        assert!(CommandType::TextIns.schema().unwrap().text_block);
        assert_eq!(
            CommandType::Call.schema().unwrap().fields[4].kind.to_string(),
            "Array<Str>"
        );
    }
}
