//! Parser for the Python literal notation embedded in the credits CSV.
//!
//! The `cast` and `crew` columns hold values such as
//! `[{'cast_id': 14, 'character': "Woody (voice)", 'profile_path': None}]`. Only literal
//! syntax is accepted: strings, numbers, `None`, `True`, `False`, lists, tuples, sets and
//! dicts. Names, calls and operators other than a leading sign are rejected, so nothing in
//! the input is ever evaluated.

use std::iter::Peekable;
use std::str::CharIndices;

const MAX_DEPTH: usize = 64;

/// A parsed literal value.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Lists, tuples and sets.
    List(Vec<Literal>),
    /// Dict entries in source order.
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    /// Looks up a string key in a dict. Returns `None` for non-dicts and missing keys.
    /// A repeated key resolves to its last entry.
    pub fn get(&self, key: &str) -> Option<&Literal> {
        let Literal::Dict(entries) = self else {
            return None;
        };
        entries
            .iter()
            .rev()
            .find(|(k, _)| matches!(k, Literal::Str(s) if s == key))
            .map(|(_, v)| v)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value if it fits in an `i32`. Integral floats are accepted.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Literal::Int(i) => i32::try_from(*i).ok(),
            Literal::Float(f) if f.fract() == 0.0 && f.abs() <= i32::MAX as f64 => Some(*f as i32),
            _ => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Literal::Dict(_))
    }

    pub fn as_list(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) => Some(items),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

/// Parses a single literal. Trailing input other than whitespace is an error.
pub fn parse(input: &str) -> Result<Literal, ParseError> {
    let mut parser = Parser::new(input);
    let value = parser.parse_value(0)?;
    parser.consume_whitespace();
    match parser.iter.peek() {
        None => Ok(value),
        Some(&(offset, c)) => Err(ParseError { message: format!("unexpected {c:?}"), offset }),
    }
}

struct Parser<'a> {
    input: &'a str,
    iter: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, iter: input.char_indices().peekable() }
    }

    fn offset(&mut self) -> usize {
        self.iter.peek().map(|&(i, _)| i).unwrap_or(self.input.len())
    }

    fn error<T>(&mut self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError { message: message.into(), offset: self.offset() })
    }

    fn peek(&mut self) -> Option<char> {
        self.iter.peek().map(|&(_, c)| c)
    }

    fn next_if<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        self.iter.next_if(|&(_, c)| predicate(c)).map(|(_, c)| c)
    }

    fn next_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> String {
        let mut value = String::new();
        while let Some(c) = self.next_if(&predicate) {
            value.push(c);
        }
        value
    }

    fn consume_whitespace(&mut self) {
        self.next_while(char::is_whitespace);
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        self.consume_whitespace();
        match self.next_if(|c| c == expected) {
            Some(_) => Ok(()),
            None => match self.peek() {
                Some(c) => self.error(format!("expected {expected:?}, found {c:?}")),
                None => self.error(format!("expected {expected:?}, found end of input")),
            },
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Literal, ParseError> {
        if depth > MAX_DEPTH {
            return self.error("nesting too deep");
        }
        self.consume_whitespace();
        match self.peek() {
            Some('[') => {
                self.iter.next();
                let items = self.parse_sequence(']', depth)?;
                Ok(Literal::List(items))
            },
            Some('(') => self.parse_paren(depth),
            Some('{') => self.parse_brace(depth),
            Some('\'' | '"') => self.parse_strings(String::new()),
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(false),
            Some('-') => {
                self.iter.next();
                self.consume_whitespace();
                self.parse_number(true)
            },
            Some('+') => {
                self.iter.next();
                self.consume_whitespace();
                self.parse_number(false)
            },
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_name(),
            Some(c) => self.error(format!("unexpected {c:?}")),
            None => self.error("unexpected end of input"),
        }
    }

    /// Comma separated values up to `close`, allowing a trailing comma.
    fn parse_sequence(&mut self, close: char, depth: usize) -> Result<Vec<Literal>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.consume_whitespace();
            if self.next_if(|c| c == close).is_some() {
                return Ok(items);
            }
            items.push(self.parse_value(depth + 1)?);
            self.consume_whitespace();
            if self.next_if(|c| c == ',').is_none() {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    /// `()` is an empty tuple, `(x)` is `x`, `(x,)` and `(x, y)` are tuples.
    fn parse_paren(&mut self, depth: usize) -> Result<Literal, ParseError> {
        self.iter.next();
        self.consume_whitespace();
        if self.next_if(|c| c == ')').is_some() {
            return Ok(Literal::List(Vec::new()));
        }
        let first = self.parse_value(depth + 1)?;
        self.consume_whitespace();
        if self.next_if(|c| c == ',').is_none() {
            self.expect(')')?;
            return Ok(first);
        }
        let mut items = vec![first];
        items.extend(self.parse_sequence(')', depth)?);
        Ok(Literal::List(items))
    }

    /// Dicts, or sets when the first element is not followed by a colon.
    fn parse_brace(&mut self, depth: usize) -> Result<Literal, ParseError> {
        self.iter.next();
        self.consume_whitespace();
        if self.next_if(|c| c == '}').is_some() {
            return Ok(Literal::Dict(Vec::new()));
        }
        let first = self.parse_value(depth + 1)?;
        self.consume_whitespace();
        if self.next_if(|c| c == ':').is_none() {
            let mut items = vec![first];
            if self.next_if(|c| c == ',').is_some() {
                items.extend(self.parse_sequence('}', depth)?);
            } else {
                self.expect('}')?;
            }
            return Ok(Literal::List(items));
        }

        let mut entries = vec![(first, self.parse_value(depth + 1)?)];
        loop {
            self.consume_whitespace();
            if self.next_if(|c| c == ',').is_none() {
                self.expect('}')?;
                return Ok(Literal::Dict(entries));
            }
            self.consume_whitespace();
            if self.next_if(|c| c == '}').is_some() {
                return Ok(Literal::Dict(entries));
            }
            let key = self.parse_value(depth + 1)?;
            self.expect(':')?;
            let value = self.parse_value(depth + 1)?;
            entries.push((key, value));
        }
    }

    fn parse_name(&mut self) -> Result<Literal, ParseError> {
        let start = self.offset();
        let name = self.next_while(|c| c.is_alphanumeric() || c == '_');
        match name.as_str() {
            "None" => return Ok(Literal::None),
            "True" => return Ok(Literal::Bool(true)),
            "False" => return Ok(Literal::Bool(false)),
            _ => {},
        }
        if matches!(self.peek(), Some('\'' | '"')) && is_string_prefix(&name) {
            return self.parse_strings(name);
        }
        Err(ParseError { message: format!("unexpected name {name:?}"), offset: start })
    }

    /// One string literal followed by any adjacent ones, which are concatenated.
    fn parse_strings(&mut self, prefix: String) -> Result<Literal, ParseError> {
        let mut value = self.parse_string(&prefix)?;
        loop {
            self.consume_whitespace();
            match self.peek() {
                Some('\'' | '"') => value.push_str(&self.parse_string("")?),
                Some(c) if c.is_alphabetic() => {
                    // Only a string prefix may follow a string; anything else ends the value.
                    let input = self.input;
                    let rest = &input[self.offset()..];
                    let prefix: String = rest.chars().take_while(|c| c.is_alphabetic()).collect();
                    let after = rest[prefix.len()..].chars().next();
                    if is_string_prefix(&prefix) && matches!(after, Some('\'' | '"')) {
                        for _ in 0..prefix.chars().count() {
                            self.iter.next();
                        }
                        value.push_str(&self.parse_string(&prefix)?);
                    } else {
                        return Ok(Literal::Str(value));
                    }
                },
                _ => return Ok(Literal::Str(value)),
            }
        }
    }

    fn parse_string(&mut self, prefix: &str) -> Result<String, ParseError> {
        let raw = prefix.chars().any(|c| c == 'r' || c == 'R');
        let Some(quote) = self.next_if(|c| c == '\'' || c == '"') else {
            return self.error("expected string");
        };
        let input = self.input;
        let triple = {
            let rest = &input[self.offset()..];
            let mut chars = rest.chars();
            chars.next() == Some(quote) && chars.next() == Some(quote)
        };
        if triple {
            self.iter.next();
            self.iter.next();
        }

        let mut s = String::new();
        loop {
            let Some((_, c)) = self.iter.next() else {
                return self.error("unterminated string");
            };
            match c {
                c if c == quote && !triple => return Ok(s),
                c if c == quote => {
                    let rest = &input[self.offset()..];
                    let mut chars = rest.chars();
                    if chars.next() == Some(quote) && chars.next() == Some(quote) {
                        self.iter.next();
                        self.iter.next();
                        return Ok(s);
                    }
                    s.push(c);
                },
                '\n' if !triple => return self.error("newline in string"),
                '\\' if raw => {
                    s.push('\\');
                    if let Some((_, next)) = self.iter.next() {
                        s.push(next);
                    }
                },
                '\\' => self.parse_escape(&mut s)?,
                c => s.push(c),
            }
        }
    }

    fn parse_escape(&mut self, s: &mut String) -> Result<(), ParseError> {
        let Some((_, c)) = self.iter.next() else {
            return self.error("unterminated string");
        };
        match c {
            '\n' => {},
            '\\' | '\'' | '"' => s.push(c),
            'n' => s.push('\n'),
            't' => s.push('\t'),
            'r' => s.push('\r'),
            'a' => s.push('\x07'),
            'b' => s.push('\x08'),
            'f' => s.push('\x0c'),
            'v' => s.push('\x0b'),
            'x' => s.push(self.parse_hex_escape(2)?),
            'u' => s.push(self.parse_hex_escape(4)?),
            'U' => s.push(self.parse_hex_escape(8)?),
            '0'..='7' => {
                let mut digits = c.to_string();
                while digits.len() < 3 {
                    match self.next_if(|c| ('0'..='7').contains(&c)) {
                        Some(d) => digits.push(d),
                        None => break,
                    }
                }
                let code = u32::from_str_radix(&digits, 8).unwrap_or(0);
                match char::from_u32(code) {
                    Some(ch) => s.push(ch),
                    None => return self.error("invalid octal escape"),
                }
            },
            other => {
                s.push('\\');
                s.push(other);
            },
        }
        Ok(())
    }

    fn parse_hex_escape(&mut self, len: usize) -> Result<char, ParseError> {
        let mut digits = String::with_capacity(len);
        for _ in 0..len {
            match self.next_if(|c| c.is_ascii_hexdigit()) {
                Some(d) => digits.push(d),
                None => return self.error("truncated escape sequence"),
            }
        }
        match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
            Some(ch) => Ok(ch),
            None => self.error("invalid escape sequence"),
        }
    }

    fn parse_number(&mut self, negative: bool) -> Result<Literal, ParseError> {
        let start = self.offset();
        let mut num = self.next_while(|c| c.is_ascii_digit() || c == '_');
        let mut float = false;
        if self.next_if(|c| c == '.').is_some() {
            float = true;
            num.push('.');
            num.push_str(&self.next_while(|c| c.is_ascii_digit() || c == '_'));
        }
        if let Some(exp) = self.next_if(|c| c == 'e' || c == 'E') {
            float = true;
            num.push(exp);
            if let Some(sign) = self.next_if(|c| c == '+' || c == '-') {
                num.push(sign);
            }
            num.push_str(&self.next_while(|c| c.is_ascii_digit()));
        }
        let num = num.replace('_', "");
        if num.is_empty() || num == "." {
            return self.error("expected number");
        }
        if matches!(self.peek(), Some(c) if c.is_alphanumeric()) {
            return self.error("invalid number");
        }

        let invalid = || ParseError { message: format!("invalid number {num:?}"), offset: start };
        if !float {
            if let Ok(i) = num.parse::<i64>() {
                return Ok(Literal::Int(if negative { -i } else { i }));
            }
        }
        let f: f64 = num.parse().map_err(|_| invalid())?;
        Ok(Literal::Float(if negative { -f } else { f }))
    }
}

fn is_string_prefix(name: &str) -> bool {
    matches!(name.to_ascii_lowercase().as_str(), "r" | "u" | "b" | "br" | "rb")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Literal {
        Literal::Str(v.to_string())
    }

    #[test]
    fn parses_cast_entry() {
        let value = parse(
            r#"[{'cast_id': 14, 'character': 'Woody (voice)', 'credit_id': '52fe4284c3a36847f8024f95', 'gender': 2, 'id': 31, 'name': 'Tom Hanks', 'order': 0, 'profile_path': '/pQFoyx7rp09CJTAb932F2g8Nlho.jpg'}]"#,
        )
        .unwrap();
        let list = value.as_list().unwrap();
        assert_eq!(list.len(), 1);
        let member = &list[0];
        assert_eq!(member.get("cast_id").and_then(Literal::as_i32), Some(14));
        assert_eq!(member.get("character").and_then(Literal::as_str), Some("Woody (voice)"));
        assert_eq!(member.get("order").and_then(Literal::as_i32), Some(0));
        assert_eq!(member.get("missing"), None);
    }

    #[test]
    fn parses_quotes_and_escapes() {
        assert_eq!(parse(r#""Buzz 'Lightyear'""#).unwrap(), s("Buzz 'Lightyear'"));
        assert_eq!(parse(r"'It\'s \\ ok\n'").unwrap(), s("It's \\ ok\n"));
        assert_eq!(parse(r"'caf\xe9 é\U0001F600'").unwrap(), s("café é😀"));
        assert_eq!(parse(r"r'a\d'").unwrap(), s("a\\d"));
        assert_eq!(parse(r"u'unicode'").unwrap(), s("unicode"));
        assert_eq!(parse(r"'one' 'two' u'three'").unwrap(), s("onetwothree"));
        assert_eq!(parse("'''triple ' quoted'''").unwrap(), s("triple ' quoted"));
        assert_eq!(parse(r"'\q'").unwrap(), s("\\q"));
    }

    #[test]
    fn parses_scalars() {
        assert_eq!(parse("None").unwrap(), Literal::None);
        assert_eq!(parse("True").unwrap(), Literal::Bool(true));
        assert_eq!(parse("False").unwrap(), Literal::Bool(false));
        assert_eq!(parse("-12").unwrap(), Literal::Int(-12));
        assert_eq!(parse("+7").unwrap(), Literal::Int(7));
        assert_eq!(parse("1_000").unwrap(), Literal::Int(1000));
        assert_eq!(parse("3.5e2").unwrap(), Literal::Float(350.0));
        assert_eq!(parse("- 0.25").unwrap(), Literal::Float(-0.25));
        assert_eq!(parse("99999999999999999999").unwrap(), Literal::Float(1e20));
    }

    #[test]
    fn parses_containers() {
        assert_eq!(parse("[]").unwrap(), Literal::List(vec![]));
        assert_eq!(parse("[1, 2,]").unwrap(), Literal::List(vec![Literal::Int(1), Literal::Int(2)]));
        assert_eq!(parse("()").unwrap(), Literal::List(vec![]));
        assert_eq!(parse("(1)").unwrap(), Literal::Int(1));
        assert_eq!(parse("(1,)").unwrap(), Literal::List(vec![Literal::Int(1)]));
        assert_eq!(parse("{1, 2}").unwrap(), Literal::List(vec![Literal::Int(1), Literal::Int(2)]));
        assert_eq!(parse("{}").unwrap(), Literal::Dict(vec![]));
        assert_eq!(
            parse("{'a': [None, True], 'b': {'c': 1},}").unwrap(),
            Literal::Dict(vec![
                (s("a"), Literal::List(vec![Literal::None, Literal::Bool(true)])),
                (s("b"), Literal::Dict(vec![(s("c"), Literal::Int(1))])),
            ])
        );
    }

    #[test]
    fn repeated_dict_key_resolves_to_last_entry() {
        let value = parse("{'name': 'Tim Allen', 'order': 1, 'name': 'Tom Hanks'}").unwrap();
        assert_eq!(value.get("name").and_then(Literal::as_str), Some("Tom Hanks"));
        assert_eq!(value.get("order").and_then(Literal::as_i32), Some(1));
    }

    #[test]
    fn rejects_non_literals() {
        assert!(parse("__import__('os').system('ls')").is_err());
        assert!(parse("[1, 2] + [3]").is_err());
        assert!(parse("open('x')").is_err());
        assert!(parse("[1, 2").is_err());
        assert!(parse("{'a' 1}").is_err());
        assert!(parse("'unterminated").is_err());
        assert!(parse("").is_err());
        assert!(parse("12abc").is_err());
    }

    #[test]
    fn rejects_deep_nesting() {
        let input = format!("{}{}", "[".repeat(200), "]".repeat(200));
        let err = parse(&input).unwrap_err();
        assert_eq!(err.message, "nesting too deep");
    }

    #[test]
    fn integral_floats_convert_to_i32() {
        assert_eq!(Literal::Float(3.0).as_i32(), Some(3));
        assert_eq!(Literal::Float(3.5).as_i32(), None);
        assert_eq!(Literal::Int(i64::MAX).as_i32(), None);
        assert_eq!(Literal::Str("3".into()).as_i32(), None);
    }
}
