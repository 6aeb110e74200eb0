use serde_json::{Map, Number, Value};

/// Parse one serialized nested-structure cell into a mapping.
///
/// Provider exports carry nested blocks either as Python literal reprs
/// (`{'x': 41, 'ok': True}`) or as JSON. Anything that is not a mapping, or
/// does not parse, becomes an empty mapping.
pub fn safe_parse(raw: &str) -> Map<String, Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Map::new();
    }
    match parse_literal(trimmed) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Parse a complete literal. Trailing garbage makes the whole input invalid.
pub fn parse_literal(raw: &str) -> Option<Value> {
    let mut parser = Parser {
        src: raw,
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != raw.len() {
        return None;
    }
    Some(value)
}

/// Python truthiness over a decoded value.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Nesting deeper than this is treated as malformed.
const MAX_DEPTH: usize = 128;

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            b'{' => self.nested(Self::mapping),
            b'[' => self.nested(|p| p.sequence(b'[', b']')),
            b'(' => self.nested(|p| p.sequence(b'(', b')')),
            b'\'' | b'"' => self.string().map(Value::String),
            b'-' | b'+' | b'.' | b'0'..=b'9' => self.number(),
            _ => self.word(),
        }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Option<Value>) -> Option<Value> {
        if self.depth >= MAX_DEPTH {
            return None;
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn mapping(&mut self) -> Option<Value> {
        self.pos += 1;
        let mut out = Map::new();
        loop {
            if self.eat(b'}') {
                return Some(Value::Object(out));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => if b { "True" } else { "False" }.to_string(),
                Value::Null => "None".to_string(),
                _ => return None,
            };
            if !self.eat(b':') {
                return None;
            }
            let value = self.value()?;
            out.insert(key, value);
            if !self.eat(b',') {
                return if self.eat(b'}') {
                    Some(Value::Object(out))
                } else {
                    None
                };
            }
        }
    }

    fn sequence(&mut self, open: u8, close: u8) -> Option<Value> {
        debug_assert_eq!(self.peek(), Some(open));
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            if self.eat(close) {
                return Some(Value::Array(out));
            }
            out.push(self.value()?);
            if !self.eat(b',') {
                return if self.eat(close) {
                    Some(Value::Array(out))
                } else {
                    None
                };
            }
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.peek()?;
        self.pos += 1;
        let mut out = String::new();
        let rest = &self.src[self.pos..];
        let mut chars = rest.char_indices();
        while let Some((idx, ch)) = chars.next() {
            if ch as u32 == quote as u32 {
                self.pos += idx + 1;
                return Some(out);
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            let (_, esc) = chars.next()?;
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' | '/' => out.push(esc),
                'x' | 'u' => {
                    let width = if esc == 'x' { 2 } else { 4 };
                    let mut code = 0u32;
                    for _ in 0..width {
                        let (_, digit) = chars.next()?;
                        code = code * 16 + digit.to_digit(16)?;
                    }
                    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                }
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
        None
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E' | b'_') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = self.src[start..self.pos].replace('_', "");
        let is_float = text.contains(['.', 'e', 'E']);
        if !is_float && let Ok(n) = text.parse::<i64>() {
            return Some(Value::Number(Number::from(n)));
        }
        let v = text.parse::<f64>().ok()?;
        Some(Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
    }

    fn word(&mut self) -> Option<Value> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphabetic() {
                self.pos += 1;
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            "None" | "null" => Some(Value::Null),
            _ => None,
        }
    }
}
