use lsb_core::lns::tags::{AttrKind, TAGS, TagCode};
use lsb_core::{
    Chart, Command, CommandType, CompileOptions, Compiler, Decompiler, Encoding, Error, FormatKind,
    ScrambleParams, Tag, TextBlock, Token, Validator, Value,
};
use pretty_assertions::assert_eq;

fn text_ins(tokens: Vec<Token>) -> Command {
    let mut cmd = Command::new(
        CommandType::TextIns,
        vec![
            Value::Str("MessageBox".into()),
            Value::Flag(true),
            Value::Flag(true),
            Value::Flag(false),
        ],
    )
    .unwrap();
    *cmd.text_block_mut().unwrap() = TextBlock::new(tokens);
    cmd
}

fn menu(choices: &[(&str, i32)]) -> Command {
    let mut cmd = Command::new(
        CommandType::Menu,
        vec![Value::Str("MessageBox".into()), Value::Flag(false)],
    )
    .unwrap();
    for (text, jump) in choices {
        cmd.push_tail_group(vec![Value::Str(text.to_string()), Value::Int(*jump)])
            .unwrap();
    }
    cmd
}

fn str_cmd(ty: CommandType, s: &str) -> Command {
    Command::new(ty, vec![Value::Str(s.into())]).unwrap()
}

fn example_tokens() -> Vec<Token> {
    vec![
        Token::text("Hello"),
        Token::Tag(Tag::new("WAIT").with_attr("TIME", "100")),
        Token::text(" world"),
        Token::PageBreak,
    ]
}

fn sample_chart() -> Chart {
    let mut chart = Chart::new(117, Encoding::Cp932).unwrap();
    chart.push_command(str_cmd(CommandType::Label, "opening"));
    chart.push_command(str_cmd(CommandType::TextClr, "MessageBox"));
    chart.push_command(text_ins(example_tokens()));
    // Choice jumps are label numbers: "yes" is label 2, "no" is label 3.
    chart.push_command(menu(&[("はい", 2), ("いいえ", 3)]));
    chart.push_command(Command::opaque(CommandType::ImgNew.id(), vec![0xDE, 0xAD]));
    chart.push_command(str_cmd(CommandType::Label, "yes"));
    chart.push_command(str_cmd(CommandType::Label, "no"));
    chart.push_command(Command::new(CommandType::Terminate, vec![]).unwrap());
    chart.add_label("opening", 0).unwrap();
    chart.add_label("menu", 3).unwrap();
    chart.add_label("yes", 5).unwrap();
    chart.add_label("no", 6).unwrap();
    chart
}

#[test]
fn example_text_block_script() {
    let block = TextBlock::new(example_tokens());
    let script = Decompiler::new().decompile(&block);
    assert_eq!(script, "Hello<WAIT TIME=100> world<PG>");
    assert_eq!(Compiler::default().compile(&script).unwrap(), example_tokens());
}

#[test]
fn chart_bytes_are_stable() {
    let bytes = sample_chart().to_bytes().unwrap();
    let chart = Chart::from_bytes(&bytes, Encoding::Cp932).unwrap();
    assert_eq!(chart.to_bytes().unwrap(), bytes);
    let report = Validator::default().validate(&bytes, Encoding::Cp932).unwrap();
    assert!(report.is_ok(), "{report:?}");
}

#[test]
fn scrambled_chart_bytes_are_stable() {
    let mut chart = sample_chart();
    chart.set_scramble(Some(ScrambleParams {
        chunk_size: 16,
        seed: 0x0BAD_F00D,
    }));
    let bytes = chart.to_bytes().unwrap();
    let back = Chart::from_bytes(&bytes, Encoding::Cp932).unwrap();
    assert_eq!(back, chart);
    assert_eq!(back.to_bytes().unwrap(), bytes);
    assert!(Validator::default().validate(&bytes, Encoding::Cp932).unwrap().is_ok());
}

#[test]
fn menu_edit_updates_count_and_keeps_labels() {
    let mut chart = Chart::from_bytes(&sample_chart().to_bytes().unwrap(), Encoding::Cp932).unwrap();
    chart
        .command_mut(3)
        .unwrap()
        .push_tail_group(vec![Value::Str("たぶん".into()), Value::Int(3)])
        .unwrap();

    let bytes = chart.to_bytes().unwrap();
    let back = Chart::from_bytes(&bytes, Encoding::Cp932).unwrap();
    let menu = back.command(3).unwrap();
    assert_eq!(menu.tail_len(), 3);
    assert_eq!(menu.field("Text[2]").unwrap(), &Value::Str("たぶん".into()));
    let targets: Vec<_> = back.labels().iter().map(|l| l.target).collect();
    assert_eq!(targets, [0, 3, 5, 6]);

    // Inserting before the menu shifts the labels at and after it only.
    let mut chart = back;
    chart
        .insert_command(3, str_cmd(CommandType::Comment, "inserted"))
        .unwrap();
    let targets: Vec<_> = chart.labels().iter().map(|l| l.target).collect();
    assert_eq!(targets, [0, 4, 6, 7]);
    assert!(chart.command(4).unwrap().is(CommandType::Menu));

    // Choices still reach the same commands through the label table.
    let reached: Vec<_> = chart
        .menu_choices()
        .iter()
        .map(|c| {
            let label = &chart.labels()[c.jump as usize];
            chart.command(label.target).unwrap().field("Name").unwrap().clone()
        })
        .collect();
    assert_eq!(
        reached,
        [Value::Str("yes".into()), Value::Str("no".into()), Value::Str("no".into())]
    );
}

/// A one-record chart with the given raw record body.
fn raw_chart(opcode: u8, body: &[u8]) -> Vec<u8> {
    let mut record = vec![opcode];
    record.extend_from_slice(&0u32.to_le_bytes());
    record.push(0);
    record.extend_from_slice(&(body.len() as u32).to_le_bytes());
    record.extend_from_slice(body);

    let mut out = Vec::new();
    out.extend_from_slice(&110u32.to_le_bytes());
    out.push(0);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(record.len() as u32).to_le_bytes());
    out.extend_from_slice(&record);
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

#[test]
fn truncated_known_opcode_is_a_format_error() {
    // A Str length needs four bytes; only three are present.
    let body = [1, 0, 0];
    let bytes = raw_chart(CommandType::TextClr.id(), &body);
    let err = Chart::from_bytes(&bytes, Encoding::Cp932).unwrap_err();
    assert!(err.to_string().contains("TextClr"), "{err}");
    match err {
        Error::Format { opcode, offset, kind } => {
            assert_eq!(opcode, Some(CommandType::TextClr.id()));
            // header(5) + count(4) + size(4) + record header(10)
            assert_eq!(offset, 23);
            assert_eq!(kind, FormatKind::Truncated);
        }
        other => panic!("expected a format error, got {other:?}"),
    }

    // The same bytes under an opcode without a schema are never parsed.
    let bytes = raw_chart(CommandType::BoxNew.id(), &body);
    let chart = Chart::from_bytes(&bytes, Encoding::Cp932).unwrap();
    assert!(chart.command(0).unwrap().is_opaque());
    assert_eq!(chart.to_bytes().unwrap(), bytes);
}

#[test]
fn record_overrunning_the_stream_is_truncated() {
    let mut bytes = raw_chart(CommandType::BoxNew.id(), &[1, 2, 3]);
    let len = bytes.len();
    bytes.truncate(len - 6);
    assert!(matches!(
        Chart::from_bytes(&bytes, Encoding::Cp932),
        Err(Error::Format { kind: FormatKind::Truncated, .. })
    ));
}

/// A script with every attribute of `tag` set.
fn full_tag_script(name: &str) -> (String, Vec<(String, String)>) {
    let spec = TAGS.iter().find(|t| t.name == name).unwrap();
    let mut attrs = Vec::new();
    for (i, attr) in spec.attrs.iter().enumerate() {
        let value = match attr.kind {
            AttrKind::Int => (i as i32 * 10 - 5).to_string(),
            AttrKind::Str => format!("v{i} x"),
            AttrKind::Enum(words) => words[words.len() - 1].to_string(),
        };
        attrs.push((attr.name.to_string(), value));
    }
    let mut script = format!("<{}", name.to_ascii_lowercase());
    // Reverse order on input; the compiler puts attributes back in order.
    for (k, v) in attrs.iter().rev() {
        script.push_str(&format!(" {k}=\"{v}\""));
    }
    script.push('>');
    if spec.paired {
        script.push_str(&format!("inner</{name}>"));
    }
    (script, attrs)
}

#[test]
fn every_tag_round_trips_with_all_attributes() {
    let codec = lsb_nls::Codec::new(Encoding::Cp932);
    for spec in TAGS {
        let (script, attrs) = full_tag_script(spec.name);
        let tokens = Compiler::default().compile(&script).unwrap();
        assert_eq!(tokens.len(), 1, "{script}");
        let Token::Tag(tag) = &tokens[0] else {
            panic!("{script} did not compile to a tag");
        };
        assert_eq!(tag.name, spec.name);
        assert_eq!(tag.attrs, attrs);

        let text = Decompiler::new().decompile_tokens(&tokens);
        assert_eq!(Compiler::default().compile(&text).unwrap(), tokens, "{text}");

        let block = TextBlock::new(tokens);
        let bytes = block.to_bytes(&codec).unwrap();
        assert_eq!(TextBlock::from_bytes(&bytes, &codec).unwrap(), block);
        if let TagCode::Break(kind) = spec.code {
            assert_eq!(bytes[13..], [0x03, kind]);
        }
    }
}

#[test]
fn decoded_blocks_recompile_to_identical_bytes() {
    let codec = lsb_nls::Codec::new(Encoding::Cp932);
    let source = concat!(
        "<DIV ALIGN=CENTER PADLEFT=2>「選択肢」<BR>\n",
        "<A ID=1 NAME=\"link one\"><STYLE ID=3>はい</STYLE></A><BR>\n",
        "<RUBY TEXT=\"かん\">漢</RUBY>\\\\path<TXSPD TIME=30>\\;<TXSPN>",
        "</DIV><VAR NAME=hp><PS><CLR><PG>",
    );
    let block = Compiler::default().compile_block(source, 104).unwrap();
    let bytes = block.to_bytes(&codec).unwrap();
    let decoded = TextBlock::from_bytes(&bytes, &codec).unwrap();
    assert_eq!(decoded, block);

    let script = Decompiler::new().decompile(&decoded);
    let again = Compiler::default().compile_block(&script, decoded.version).unwrap();
    assert_eq!(again.to_bytes(&codec).unwrap(), bytes);
}

#[test]
fn kept_comments_never_reach_the_binary() {
    let codec = lsb_nls::Codec::new(Encoding::Cp932);
    let keep = Compiler::new(CompileOptions { keep_comments: true });
    let src = "line one<BR>\n;translator note\nline two";
    let with = keep.compile_block(src, 104).unwrap();
    assert!(with.tokens.iter().any(|t| matches!(t, Token::Comment(_))));
    let without = Compiler::default().compile_block(src, 104).unwrap();
    assert_eq!(with.to_bytes(&codec).unwrap(), without.to_bytes(&codec).unwrap());
}

#[test]
fn translation_surface_round_trips_through_bytes() {
    let mut chart = sample_chart();
    let blocks = chart.text_blocks("00000001.lsb");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].1, "Hello");
    assert_eq!(blocks[1].1, " world");

    chart.replace_text(&blocks[0].0, "Bonjour").unwrap();
    let bytes = chart.to_bytes().unwrap();
    let back = Chart::from_bytes(&bytes, Encoding::Cp932).unwrap();
    assert_eq!(
        Decompiler::new().decompile(back.command(2).unwrap().text_block().unwrap()),
        "Bonjour<WAIT TIME=100> world<PG>"
    );
    assert_eq!(back.text_scenarios()[0].name, Some("opening"));
}
