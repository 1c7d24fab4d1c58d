//! Recursive-descent parser for the text scene format
//!
//! The grammar is line/section oriented at the top level and a balanced
//! delimiter scan inside values, so a single forward pass with one
//! character of lookahead is enough. Malformed input raises
//! [`ParseError::Syntax`] with the offending position; input that does not
//! even start with a section header is reported as
//! [`ParseError::BinaryFormat`] so tooling can give a useful hint.

use crate::error::ParseError;
use crate::section::{Document, Section, SectionHeader};
use crate::value::{Constructor, Value};

/// Parse a whole scene/resource file into a [`Document`].
pub fn parse(text: &str) -> Result<Document, ParseError> {
    let mut cur = Cursor::new(text);
    cur.eat('\u{feff}');
    cur.skip_blank();
    if cur.at_end() {
        return Ok(Document::new());
    }
    if cur.peek() != Some('[') {
        return Err(ParseError::BinaryFormat);
    }

    let mut doc = Document::new();
    while !cur.at_end() {
        let section = parse_section(&mut cur)?;
        doc.push_section(section);
        cur.skip_blank();
    }
    Ok(doc)
}

/// Parse a single value literal from the front of `text`, returning the
/// value and the unconsumed remainder.
pub fn parse_value(text: &str) -> Result<(Value, &str), ParseError> {
    let mut cur = Cursor::new(text);
    let value = value(&mut cur)?;
    Ok((value, &text[cur.pos..]))
}

fn parse_section(cur: &mut Cursor) -> Result<Section, ParseError> {
    cur.expect('[')?;
    cur.skip_spaces();
    let tag = ident(cur)?;
    let mut header = SectionHeader::new(tag);

    loop {
        cur.skip_spaces();
        if cur.eat(']') {
            break;
        }
        if cur.at_end() {
            return Err(cur.error("unterminated section header"));
        }
        let key = ident(cur)?;
        cur.skip_spaces();
        cur.expect('=')?;
        let attr = value(cur)?;
        header.set(key, attr);
    }
    cur.expect_line_end()?;

    let mut section = Section::new(header);
    loop {
        cur.skip_blank();
        match cur.peek() {
            None | Some('[') => break,
            _ => {}
        }
        let key = property_key(cur)?;
        cur.skip_spaces();
        cur.expect('=')?;
        let val = value(cur)?;
        cur.expect_line_end()?;
        if section.get(&key).is_some() {
            tracing::warn!(tag = section.tag(), key = key.as_str(), "duplicate property, keeping the last value");
        }
        section.set(key, val);
    }
    Ok(section)
}

/// A property key: a quoted string or a bare run of word characters
/// (slashes allowed, e.g. `tracks/0/keys`).
fn property_key(cur: &mut Cursor) -> Result<String, ParseError> {
    if cur.peek() == Some('"') {
        return string(cur);
    }
    let key = cur.scan(|c| c.is_alphanumeric() || c == '_' || c == '/');
    if key.is_empty() {
        return Err(cur.error("expected a property key"));
    }
    Ok(key)
}

fn value(cur: &mut Cursor) -> Result<Value, ParseError> {
    cur.skip_ws();
    match cur.peek() {
        None => Err(cur.error("unexpected end of input, expected a value")),
        Some('"') => string(cur).map(Value::String),
        Some('[') => array(cur),
        Some('{') => dict(cur),
        Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => number(cur),
        Some(c) if c.is_alphabetic() || c == '_' => ident_value(cur),
        Some(c) => Err(cur.error(format!("unexpected character {:?}", c))),
    }
}

fn string(cur: &mut Cursor) -> Result<String, ParseError> {
    cur.expect('"')?;
    let mut out = String::new();
    loop {
        match cur.bump() {
            None => return Err(cur.error("unterminated string")),
            Some('"') => return Ok(out),
            Some('\\') => match cur.bump() {
                None => return Err(cur.error("unterminated string escape")),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                // Unknown escapes pass through untouched so we never
                // corrupt content we do not understand.
                Some(c) => {
                    out.push('\\');
                    out.push(c);
                }
            },
            Some(c) => out.push(c),
        }
    }
}

fn array(cur: &mut Cursor) -> Result<Value, ParseError> {
    cur.expect('[')?;
    let mut items = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(']') {
            return Ok(Value::Array(items));
        }
        items.push(value(cur)?);
        cur.skip_ws();
        if cur.eat(',') {
            continue;
        }
        cur.expect(']')?;
        return Ok(Value::Array(items));
    }
}

fn dict(cur: &mut Cursor) -> Result<Value, ParseError> {
    cur.expect('{')?;
    let mut entries = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat('}') {
            return Ok(Value::Dict(entries));
        }
        let (key, separator_consumed) = dict_key(cur)?;
        if !separator_consumed {
            cur.skip_ws();
            cur.expect(':')?;
        }
        let val = value(cur)?;
        entries.push((key, val));
        cur.skip_ws();
        if cur.eat(',') {
            continue;
        }
        cur.expect('}')?;
        return Ok(Value::Dict(entries));
    }
}

/// Parse a dictionary key. Keys starting with an identifier character use
/// the bare-key rule: consume the longest run of word characters and
/// colons; a run ending in `:` supplies its own separator (`{a:b: 1}`
/// yields the key `"a:b"`). A run that turns out to be a constructor name
/// (next char `(`, or `[` for typed arrays) is re-parsed as a value.
/// Returns the key and whether the `:` separator was already consumed.
fn dict_key(cur: &mut Cursor) -> Result<(Value, bool), ParseError> {
    cur.skip_ws();
    match cur.peek() {
        Some(c) if c.is_alphabetic() || c == '_' => {
            let start = cur.pos;
            let run = cur.scan(|c| c.is_alphanumeric() || c == '_' || c == ':');
            if matches!(cur.peek(), Some('(') | Some('[')) {
                cur.pos = start;
                return Ok((value(cur)?, false));
            }
            if let Some(key) = run.strip_suffix(':') {
                if key.is_empty() {
                    return Err(cur.error("empty dictionary key"));
                }
                return Ok((Value::String(key.to_string()), true));
            }
            Ok((Value::String(run), false))
        }
        _ => Ok((value(cur)?, false)),
    }
}

fn number(cur: &mut Cursor) -> Result<Value, ParseError> {
    let start = cur.pos;
    let negative = match cur.peek() {
        Some('-') => {
            cur.bump();
            true
        }
        Some('+') => {
            cur.bump();
            false
        }
        _ => false,
    };
    // Godot writes non-finite floats as bare words
    if cur.starts_with("inf") {
        cur.advance(3);
        let inf = if negative { f64::NEG_INFINITY } else { f64::INFINITY };
        return Ok(Value::Float(inf));
    }

    let mut text = String::new();
    let mut exponent = false;
    while let Some(c) = cur.peek() {
        let take = c.is_ascii_digit()
            || c == '.'
            || c == 'e'
            || c == 'E'
            || ((c == '+' || c == '-') && exponent && matches!(text.chars().last(), Some('e') | Some('E')));
        if !take {
            break;
        }
        if c == 'e' || c == 'E' {
            exponent = true;
        }
        text.push(c);
        cur.bump();
    }
    if text.is_empty() {
        return Err(cur.error_at(start, "expected a number"));
    }

    if text.contains(['.', 'e', 'E']) {
        match text.parse::<f64>() {
            Ok(f) => Ok(Value::Float(if negative { -f } else { f })),
            Err(_) => Err(cur.error_at(start, format!("invalid float literal \"{}\"", text))),
        }
    } else {
        match text.parse::<i64>() {
            Ok(i) => Ok(Value::Int(if negative { -i } else { i })),
            // out-of-range integers degrade to floats instead of failing
            Err(_) => match text.parse::<f64>() {
                Ok(f) => Ok(Value::Float(if negative { -f } else { f })),
                Err(_) => Err(cur.error_at(start, format!("invalid integer literal \"{}\"", text))),
            },
        }
    }
}

fn ident_value(cur: &mut Cursor) -> Result<Value, ParseError> {
    let start = cur.pos;
    let name = cur.scan(|c| c.is_alphanumeric() || c == '_');
    match name.as_str() {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        "inf" => return Ok(Value::Float(f64::INFINITY)),
        "nan" => return Ok(Value::Float(f64::NAN)),
        _ => {}
    }

    // Typed array: Array[Inner]([ ... ])
    if name == "Array" && cur.peek() == Some('[') {
        cur.bump();
        cur.skip_ws();
        let inner = cur.scan(|c| c.is_alphanumeric() || c == '_');
        if inner.is_empty() {
            return Err(cur.error("expected an element type in Array[...]"));
        }
        cur.skip_ws();
        cur.expect(']')?;
        cur.skip_ws();
        cur.expect('(')?;
        let payload = value(cur)?;
        cur.skip_ws();
        cur.expect(')')?;
        let name = format!("Array[{}]", inner);
        return Ok(Value::Constructor(Constructor::new(name, vec![payload])));
    }

    if cur.peek() != Some('(') {
        return Err(cur.error_at(start, format!("unknown bare word \"{}\"", name)));
    }
    cur.bump();
    let mut args = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(')') {
            return Ok(Value::Constructor(Constructor::new(name, args)));
        }
        args.push(value(cur)?);
        cur.skip_ws();
        if cur.eat(',') {
            continue;
        }
        cur.expect(')')?;
        return Ok(Value::Constructor(Constructor::new(name, args)));
    }
}

fn ident(cur: &mut Cursor) -> Result<String, ParseError> {
    let name = cur.scan(|c| c.is_alphanumeric() || c == '_');
    if name.is_empty() {
        return Err(cur.error("expected an identifier"));
    }
    Ok(name)
}

/// Forward-only scanning cursor over the source text.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn advance(&mut self, bytes: usize) {
        self.pos += bytes;
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", expected)))
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn scan(&mut self, mut keep: impl FnMut(char) -> bool) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if keep(c)) {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    /// Skip spaces and tabs, staying on the current line.
    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
            self.bump();
        }
    }

    /// Skip any whitespace, including newlines.
    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Skip whitespace and `;` comment lines.
    fn skip_blank(&mut self) {
        loop {
            self.skip_ws();
            if self.peek() == Some(';') {
                while !matches!(self.peek(), None | Some('\n')) {
                    self.bump();
                }
            } else {
                return;
            }
        }
    }

    /// Require nothing but trailing whitespace before the next newline (or
    /// the end of input).
    fn expect_line_end(&mut self) -> Result<(), ParseError> {
        self.skip_spaces();
        match self.peek() {
            None => Ok(()),
            Some('\n') => {
                self.bump();
                Ok(())
            }
            _ => Err(self.error("expected end of line")),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        let consumed = &self.src[..offset.min(self.src.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = offset - consumed.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
        ParseError::Syntax {
            offset,
            line,
            column,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn value_of(text: &str) -> Value {
        let (value, rest) = parse_value(text).unwrap();
        assert_eq!(rest.trim(), "");
        value
    }

    #[test]
    fn test_primitives() {
        assert_eq!(value_of("null"), Value::Null);
        assert_eq!(value_of("true"), Value::Bool(true));
        assert_eq!(value_of("false"), Value::Bool(false));
        assert_eq!(value_of("42"), Value::Int(42));
        assert_eq!(value_of("-7"), Value::Int(-7));
        assert_eq!(value_of("1.5"), Value::Float(1.5));
        assert_eq!(value_of("-2.0"), Value::Float(-2.0));
        assert_eq!(value_of("1e3"), Value::Float(1000.0));
        assert_eq!(value_of("inf"), Value::Float(f64::INFINITY));
        assert_eq!(value_of("-inf"), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(value_of(r#""hello""#), Value::String("hello".to_string()));
        assert_eq!(
            value_of(r#""foo(\"bar\")""#),
            Value::String("foo(\"bar\")".to_string())
        );
        assert_eq!(value_of(r#""a\\b""#), Value::String("a\\b".to_string()));
        assert_eq!(value_of(r#""a\nb""#), Value::String("a\nb".to_string()));
        assert_eq!(value_of(r#""""#), Value::String(String::new()));
        // raw newline inside a string (multiline)
        assert_eq!(value_of("\"Hello\n\""), Value::String("Hello\n".to_string()));
        // unknown escapes survive untouched
        assert_eq!(value_of(r#""a\qb""#), Value::String("a\\qb".to_string()));
    }

    #[test]
    fn test_escape_fidelity() {
        for s in ["", "plain", "with \"quotes\"", "back\\slash", "mix \\\" end", "line\nbreak"] {
            let written = Value::String(s.to_string()).to_string();
            assert_eq!(value_of(&written), Value::String(s.to_string()));
        }
    }

    #[test]
    fn test_array_trailing_comma() {
        let plain = value_of("[1, 2, 3]");
        let trailing = value_of("[1, 2, 3,]");
        assert_eq!(plain, trailing);
        assert_eq!(
            plain,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(value_of("[]"), Value::Array(vec![]));
        assert_eq!(value_of("[ ]"), Value::Array(vec![]));
    }

    #[test]
    fn test_dict() {
        let v = value_of("{\n\"a\": 1,\n\"b\": [ 2 ]\n}");
        assert_eq!(
            v,
            Value::Dict(vec![
                (Value::String("a".to_string()), Value::Int(1)),
                (Value::String("b".to_string()), Value::Array(vec![Value::Int(2)])),
            ])
        );
        assert_eq!(value_of("{}"), Value::Dict(vec![]));
    }

    #[test]
    fn test_dict_bare_keys() {
        let v = value_of("{key: 1}");
        assert_eq!(
            v,
            Value::Dict(vec![(Value::String("key".to_string()), Value::Int(1))])
        );
        // spaced separator
        let v = value_of("{key : 1}");
        assert_eq!(
            v,
            Value::Dict(vec![(Value::String("key".to_string()), Value::Int(1))])
        );
    }

    #[test]
    fn test_dict_colon_in_bare_key() {
        // longest-bare-key-then-colon: the run "a:b:" ends with the
        // separator, so the key is literally "a:b"
        let v = value_of("{a:b: 1}");
        assert_eq!(
            v,
            Value::Dict(vec![(Value::String("a:b".to_string()), Value::Int(1))])
        );
    }

    #[test]
    fn test_dict_composite_keys() {
        let v = value_of("{Vector2( 1, 2 ): \"v\", 3: 4}");
        assert_eq!(
            v,
            Value::Dict(vec![
                (
                    Value::Constructor(Constructor::new(
                        "Vector2",
                        vec![Value::Int(1), Value::Int(2)]
                    )),
                    Value::String("v".to_string())
                ),
                (Value::Int(3), Value::Int(4)),
            ])
        );
    }

    #[test]
    fn test_constructors() {
        assert_eq!(
            value_of("Vector2( 1, 2 )"),
            Value::Constructor(Constructor::new("Vector2", vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(
            value_of("PackedStringArray()"),
            Value::Constructor(Constructor::new("PackedStringArray", vec![]))
        );
        assert_eq!(
            value_of(r#"NodePath("A/B")"#),
            Value::node_path("A/B")
        );
        assert_eq!(value_of("ExtResource( 1 )"), Value::ext_resource(1));
        // unknown constructor names parse generically
        assert_eq!(
            value_of("FutureThing( 1, \"x\" )"),
            Value::Constructor(Constructor::new(
                "FutureThing",
                vec![Value::Int(1), Value::String("x".to_string())]
            ))
        );
    }

    #[test]
    fn test_typed_array() {
        let v = value_of("Array[PackedInt32Array]([ PackedInt32Array( 0, 1 ) ])");
        let expected = Value::Constructor(Constructor::new(
            "Array[PackedInt32Array]",
            vec![Value::Array(vec![Value::Constructor(Constructor::new(
                "PackedInt32Array",
                vec![Value::Int(0), Value::Int(1)],
            ))])],
        ));
        assert_eq!(v, expected);
        // and it round-trips through the writer
        assert_eq!(value_of(&v.to_string()), expected);
    }

    #[test]
    fn test_malformed_value_has_position() {
        let err = parse_value("[1, ?]").unwrap_err();
        match err {
            ParseError::Syntax { offset, line, column, .. } => {
                assert_eq!(offset, 4);
                assert_eq!(line, 1);
                assert_eq!(column, 5);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_sections() {
        let doc = parse("[gd_scene load_steps=5 format=2]").unwrap();
        assert_eq!(doc.sections().len(), 1);
        let root = &doc.sections()[0];
        assert_eq!(root.tag(), "gd_scene");
        assert_eq!(root.header.get("load_steps"), Some(&Value::Int(5)));
        assert_eq!(root.header.get("format"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_parse_section_with_properties() {
        let doc = parse(concat!(
            "[sub_resource type=\"RectangleShape2D\" id=1]\n",
            "extents = Vector2( 12.7855, 17.0634 )\n",
            "other = null\n",
            "\"with spaces\" = 1\n",
        ))
        .unwrap();
        let section = &doc.sections()[0];
        assert_eq!(
            section.get("extents"),
            Some(&Value::Constructor(Constructor::new(
                "Vector2",
                vec![Value::Float(12.7855), Value::Float(17.0634)]
            )))
        );
        assert_eq!(section.get("other"), Some(&Value::Null));
        assert_eq!(section.get("with spaces"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_parse_slash_keys_and_multiline_dict() {
        let doc = parse(concat!(
            "[sub_resource type=\"Animation\" id=2]\n",
            "tracks/0/keys = {\n",
            "\"transitions\": PoolRealArray( 1, 1 ),\n",
            "\"update\": 0,\n",
            "\"values\": [ Vector2( 0, 0 ) ]\n",
            "}\n",
        ))
        .unwrap();
        let section = &doc.sections()[0];
        let keys = section.get("tracks/0/keys").unwrap();
        match keys {
            Value::Dict(entries) => assert_eq!(entries.len(), 3),
            other => panic!("expected dict, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_body_sections() {
        let doc = parse(concat!(
            "[gd_scene load_steps=1 format=2]\n",
            "\n",
            "[node name=\"Root\" type=\"Node2D\"]\n",
            "\n",
            "[node name=\"Child\" type=\"Area2D\" parent=\".\"]\n",
        ))
        .unwrap();
        assert_eq!(doc.sections().len(), 3);
        assert!(doc.sections()[1].properties.is_empty());
    }

    #[test]
    fn test_multiline_string_property() {
        let doc = parse("[node name=\"Label\" parent=\".\"]\ntext = \"Hello\n\"\n").unwrap();
        assert_eq!(
            doc.sections()[0].get("text"),
            Some(&Value::String("Hello\n".to_string()))
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").unwrap().sections().is_empty());
        assert!(parse("  \n\n").unwrap().sections().is_empty());
    }

    #[test]
    fn test_binary_input() {
        let err = parse("RSRC\u{1}\u{2}garbage").unwrap_err();
        assert_eq!(err, ParseError::BinaryFormat);
        // comments are skipped before the check
        let err = parse("; comment\nRSCC").unwrap_err();
        assert_eq!(err, ParseError::BinaryFormat);
        // but a commented file with a real header is fine
        assert!(parse("; comment\n[gd_scene format=2]").is_ok());
    }

    #[test]
    fn test_instance_attribute() {
        let doc = parse("[node name=\"Mid\" instance=ExtResource( 1 )]").unwrap();
        let section = &doc.sections()[0];
        assert_eq!(
            section.header.get("instance").and_then(Value::as_ext_resource),
            Some(1)
        );
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let err = parse("[node name=\"A\"]\nx = 1 garbage\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }
}
