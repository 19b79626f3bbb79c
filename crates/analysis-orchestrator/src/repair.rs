//! Best-effort recovery of JSON written by a language model.
//!
//! `normalize` fixes the cheap textual problems (comments, trailing commas,
//! Python literals). `repair` is a tolerant decoder for the rest: unquoted
//! keys, single quotes, unescaped quotes inside strings, missing commas and
//! output cut off before the closing brackets. Both only touch text outside
//! string literals.

use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;

/// Strip comments, drop trailing commas and lowercase Python-style literals
pub fn normalize(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            '}' | ']' => {
                let trimmed = out.trim_end().len();
                if out[..trimmed].ends_with(',') {
                    out.truncate(trimmed - 1);
                }
                out.push(c);
                i += 1;
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    _ => word.as_str(),
                });
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Decode `input` as leniently as possible. `None` means nothing usable
/// could be recovered.
pub fn repair(input: &str) -> Option<Value> {
    let mut parser = LenientParser {
        chars: input.chars().collect(),
        pos: 0,
    };
    parser.skip_ws();
    let value = parser.parse_value(0)?;
    Some(value)
}

struct LenientParser {
    chars: Vec<char>,
    pos: usize,
}

impl LenientParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Next non-whitespace character after `from`, without consuming
    fn peek_significant(&self, from: usize) -> Option<char> {
        self.chars[from.min(self.chars.len())..]
            .iter()
            .copied()
            .find(|c| !c.is_whitespace())
    }

    fn parse_value(&mut self, depth: usize) -> Option<Value> {
        if depth > MAX_DEPTH {
            return None;
        }
        self.skip_ws();
        match self.peek()? {
            '{' => self.parse_object(depth + 1),
            '[' => self.parse_array(depth + 1),
            q @ ('"' | '\'') => Some(Value::String(self.parse_string(q))),
            c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => Some(self.parse_number()),
            c if c.is_alphabetic() => Some(self.parse_bare_word()),
            _ => None,
        }
    }

    fn parse_object(&mut self, depth: usize) -> Option<Value> {
        self.pos += 1;
        let mut map = Map::new();

        loop {
            self.skip_ws();
            match self.peek() {
                // Truncated output: close what we have
                None => break,
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            let key = self.parse_key()?;
            self.skip_ws();
            if self.peek() == Some(':') {
                self.pos += 1;
            }
            self.skip_ws();
            if self.peek().is_none() {
                map.insert(key, Value::Null);
                break;
            }
            let value = self.parse_value(depth)?;
            map.insert(key, value);
        }

        Some(Value::Object(map))
    }

    fn parse_array(&mut self, depth: usize) -> Option<Value> {
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            items.push(self.parse_value(depth)?);
        }

        Some(Value::Array(items))
    }

    fn parse_key(&mut self) -> Option<String> {
        match self.peek()? {
            q @ ('"' | '\'') => Some(self.parse_string(q)),
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == ':' || c.is_whitespace() || matches!(c, ',' | '{' | '}' | '[' | ']') {
                        break;
                    }
                    self.pos += 1;
                }
                if self.pos == start {
                    None
                } else {
                    Some(self.chars[start..self.pos].iter().collect())
                }
            }
        }
    }

    /// A closing quote only counts when the next significant character could
    /// follow a string; otherwise it is taken as an unescaped inner quote.
    fn parse_string(&mut self, quote: char) -> String {
        self.pos += 1;
        let mut buf = String::new();

        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => {
                    let Some(esc) = self.peek() else { break };
                    self.pos += 1;
                    match esc {
                        'n' => buf.push('\n'),
                        't' => buf.push('\t'),
                        'r' => buf.push('\r'),
                        'b' => buf.push('\u{8}'),
                        'f' => buf.push('\u{c}'),
                        'u' => {
                            let hex: String = self.chars[self.pos..(self.pos + 4).min(self.chars.len())]
                                .iter()
                                .collect();
                            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                Some(ch) if hex.len() == 4 => {
                                    buf.push(ch);
                                    self.pos += 4;
                                }
                                _ => buf.push('u'),
                            }
                        }
                        other => buf.push(other),
                    }
                }
                c if c == quote => match self.peek_significant(self.pos) {
                    None | Some(',' | '}' | ']' | ':' | '"' | '\'') => return buf,
                    Some(_) => buf.push(c),
                },
                c => buf.push(c),
            }
        }

        buf
    }

    fn parse_number(&mut self) -> Value {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let raw = raw.trim_start_matches('+');
        let at_boundary = matches!(self.peek(), None | Some(',' | '}' | ']'))
            || self.peek().is_some_and(char::is_whitespace);

        if at_boundary {
            if let Ok(n) = raw.parse::<i64>() {
                return Value::Number(n.into());
            }
            if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                return Value::Number(n);
            }
        }
        // Something like `1820元`: keep the rest of the token as text
        self.pos = start;
        self.parse_bare_word()
    }

    fn parse_bare_word(&mut self) -> Value {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ',' | '}' | ']' | '\n') {
                break;
            }
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.trim() {
            "true" | "True" => Value::Bool(true),
            "false" | "False" => Value::Bool(false),
            "null" | "None" => Value::Null,
            other => Value::String(other.to_string()),
        }
    }
}
