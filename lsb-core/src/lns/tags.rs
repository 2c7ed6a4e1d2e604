//! The supported LNS tag subset and its binary codes.

/// How an attribute value is stored in the binary block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Int,
    Str,
    /// Stored as a `u8` index into the keyword list.
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec {
    pub name: &'static str,
    pub kind: AttrKind,
}

/// Binary representation of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCode {
    /// Written as a `0x03` break token of this kind.
    Break(u8),
    /// Written as a `0x02` tag token with this code.
    Tag(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpec {
    pub name: &'static str,
    pub code: TagCode,
    /// Canonical attribute order. At most eight, one presence bit each.
    pub attrs: &'static [AttrSpec],
    pub paired: bool,
}

impl TagSpec {
    pub fn attr_index(&self, name: &str) -> Option<usize> {
        self.attrs.iter().position(|a| a.name.eq_ignore_ascii_case(name))
    }
}

pub const BREAK_LINE: u8 = 0;
pub const BREAK_PAGE: u8 = 1;

const fn attr(name: &'static str, kind: AttrKind) -> AttrSpec {
    AttrSpec { name, kind }
}

const fn tag(name: &'static str, code: TagCode, attrs: &'static [AttrSpec], paired: bool) -> TagSpec {
    TagSpec {
        name,
        code,
        attrs,
        paired,
    }
}

const IMG_ALIGN: &[&str] = &["TOP", "CENTER", "BOTTOM"];
const DIV_ALIGN: &[&str] = &["LEFT", "CENTER", "RIGHT"];

const TIME: &[AttrSpec] = &[attr("TIME", AttrKind::Int)];
const NAME: &[AttrSpec] = &[attr("NAME", AttrKind::Str)];
const ID: &[AttrSpec] = &[attr("ID", AttrKind::Int)];
const IMG: &[AttrSpec] = &[
    attr("SRC", AttrKind::Str),
    attr("ALIGN", AttrKind::Enum(IMG_ALIGN)),
    attr("HOVERSRC", AttrKind::Str),
    attr("DOWNSRC", AttrKind::Str),
];
const LINK: &[AttrSpec] = &[attr("ID", AttrKind::Int), attr("NAME", AttrKind::Str)];
const DIV: &[AttrSpec] = &[
    attr("ALIGN", AttrKind::Enum(DIV_ALIGN)),
    attr("PADLEFT", AttrKind::Int),
    attr("PADRIGHT", AttrKind::Int),
];
const RUBY: &[AttrSpec] = &[attr("TEXT", AttrKind::Str)];

/// Every tag the compiler accepts other than `BR` and `PG`, which map to
/// dedicated break tokens.
pub static TAGS: &[TagSpec] = &[
    tag("PS", TagCode::Break(2), &[], false),
    tag("CLR", TagCode::Break(3), &[], false),
    tag("WAIT", TagCode::Tag(0x03), TIME, false),
    tag("TXSPD", TagCode::Tag(0x04), TIME, false),
    tag("TXSPF", TagCode::Tag(0x05), &[], false),
    tag("TXSPN", TagCode::Tag(0x06), &[], false),
    tag("TXSPS", TagCode::Tag(0x07), &[], false),
    tag("INDENT", TagCode::Tag(0x08), &[], false),
    tag("UNDENT", TagCode::Tag(0x09), &[], false),
    tag("EVENT", TagCode::Tag(0x0A), NAME, false),
    tag("VAR", TagCode::Tag(0x0B), NAME, false),
    tag("IMG", TagCode::Tag(0x0C), IMG, false),
    tag("HISTCHAR", TagCode::Tag(0x0D), NAME, false),
    tag("CONDITION", TagCode::Tag(0x0E), ID, false),
    tag("STYLE", TagCode::Tag(0x10), ID, true),
    tag("A", TagCode::Tag(0x11), LINK, true),
    tag("DIV", TagCode::Tag(0x12), DIV, true),
    tag("RUBY", TagCode::Tag(0x13), RUBY, true),
];

pub fn by_name(name: &str) -> Option<&'static TagSpec> {
    TAGS.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

pub fn by_code(code: TagCode) -> Option<&'static TagSpec> {
    TAGS.iter().find(|t| t.code == code)
}
