//! The wire value model. Every response body the REST service sends back is
//! decoded into an [`Edn`] value, and [`Edn`]'s `Display` writes the literal
//! syntax back out when a value has to travel the other way.

// used to decode response bodies
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

// used for #inst literals
use chrono::{DateTime, SecondsFormat, Utc};
// used for arbitrary precision numbers (the M suffix)
use bigdecimal::BigDecimal;

use std::fmt;
use std::str::FromStr;

use crate::error::{DatorestError, Result};

#[derive(Parser)]
#[grammar = "edn.pest"]
struct EdnParser;

#[derive(Clone, Debug, PartialEq)]
pub enum Edn {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Char(char),
    Keyword(String), // kept without the leading colon
    Symbol(String),
    List(Vec<Edn>),
    Vector(Vec<Edn>),
    Set(Vec<Edn>),
    Map(Vec<(Edn, Edn)>), // pairs in the order they were read
    Inst(DateTime<Utc>),
    Uuid(String),
    Tagged(String, Box<Edn>),
}

impl Edn {
    pub fn keyword(name: &str) -> Edn {
        Edn::Keyword(name.trim_start_matches(':').to_string())
    }
    /// Looks up a keyword key in a map, with or without the leading colon.
    pub fn get(&self, key: &str) -> Option<&Edn> {
        let key = key.trim_start_matches(':');
        match self {
            Edn::Map(pairs) => pairs.iter().find_map(|(k, v)| match k {
                Edn::Keyword(name) if name == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Edn::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Edn::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Edn::Keyword(k) => Some(k),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Edn::Bool(b) => Some(*b),
            _ => None,
        }
    }
    /// Lists, vectors and sets all count as sequences.
    pub fn as_seq(&self) -> Option<&[Edn]> {
        match self {
            Edn::List(items) | Edn::Vector(items) | Edn::Set(items) => Some(items),
            _ => None,
        }
    }
    pub fn is_nil(&self) -> bool {
        matches!(self, Edn::Nil)
    }
    /// The identifier of a reference-shaped value, i.e. a map carrying `:db/id`.
    pub fn reference(&self) -> Option<i64> {
        self.get("db/id").and_then(Edn::as_i64)
    }
}

// ------------- Decoding -------------
pub fn parse(text: &str) -> Result<Edn> {
    let document = EdnParser::parse(Rule::edn, text)?
        .next()
        .ok_or_else(|| DatorestError::UnexpectedResponse("empty EDN document".into()))?;
    match document.into_inner().find(|p| p.as_rule() != Rule::EOI) {
        Some(pair) => decode(pair),
        None => Ok(Edn::Nil),
    }
}

fn decode(pair: Pair<Rule>) -> Result<Edn> {
    let text = pair.as_str();
    let value = match pair.as_rule() {
        Rule::nil => Edn::Nil,
        Rule::boolean => Edn::Bool(text == "true"),
        Rule::integer => decode_integer(text)?,
        Rule::float => decode_float(text)?,
        Rule::string => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Edn::String(unescape(inner))
        }
        Rule::character => Edn::Char(decode_character(text)?),
        Rule::keyword => Edn::Keyword(text[1..].to_string()),
        Rule::symbol => Edn::Symbol(text.to_string()),
        Rule::list => Edn::List(decode_all(pair)?),
        Rule::vector => Edn::Vector(decode_all(pair)?),
        Rule::set => Edn::Set(decode_all(pair)?),
        Rule::map => {
            let mut items = decode_all(pair)?.into_iter();
            let mut pairs = Vec::new();
            while let (Some(k), Some(v)) = (items.next(), items.next()) {
                pairs.push((k, v));
            }
            Edn::Map(pairs)
        }
        Rule::tagged => {
            let mut inner = pair.into_inner();
            let tag = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let tagged = match inner.next() {
                Some(p) => decode(p)?,
                None => Edn::Nil,
            };
            decode_tagged(tag, tagged)?
        }
        rule => {
            return Err(DatorestError::UnexpectedResponse(format!(
                "unexpected EDN element {:?}: {}",
                rule, text
            )));
        }
    };
    Ok(value)
}

fn decode_all(pair: Pair<Rule>) -> Result<Vec<Edn>> {
    pair.into_inner().map(decode).collect()
}

fn decode_integer(text: &str) -> Result<Edn> {
    let digits = text.trim_end_matches('N').trim_start_matches('+');
    match digits.parse::<i64>() {
        Ok(i) => Ok(Edn::Integer(i)),
        // does not fit, keep it exact anyway
        Err(_) => BigDecimal::from_str(digits)
            .map(Edn::Decimal)
            .map_err(|e| number_error(text, e)),
    }
}

fn decode_float(text: &str) -> Result<Edn> {
    match text {
        "##Inf" => return Ok(Edn::Float(f64::INFINITY)),
        "##-Inf" => return Ok(Edn::Float(f64::NEG_INFINITY)),
        "##NaN" => return Ok(Edn::Float(f64::NAN)),
        _ => (),
    }
    if let Some(exact) = text.strip_suffix('M') {
        return BigDecimal::from_str(exact.trim_start_matches('+'))
            .map(Edn::Decimal)
            .map_err(|e| number_error(text, e));
    }
    text.trim_start_matches('+')
        .parse::<f64>()
        .map(Edn::Float)
        .map_err(|e| number_error(text, e))
}

fn number_error(text: &str, e: impl fmt::Display) -> DatorestError {
    DatorestError::Parse { message: format!("bad number {}: {}", text, e), line: None, col: None }
}

fn decode_character(text: &str) -> Result<char> {
    let name = &text[1..];
    let c = match name {
        "newline" => '\n',
        "space" => ' ',
        "tab" => '\t',
        "return" => '\r',
        "formfeed" => '\u{c}',
        "backspace" => '\u{8}',
        _ if name.len() == 5 && name.starts_with('u') => u32::from_str_radix(&name[1..], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| DatorestError::Parse {
                message: format!("bad character literal {}", text),
                line: None,
                col: None,
            })?,
        _ => name.chars().next().unwrap_or(' '),
    };
    Ok(c)
}

fn decode_tagged(tag: String, value: Edn) -> Result<Edn> {
    match (tag.as_str(), value) {
        ("inst", Edn::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Edn::Inst(t.with_timezone(&Utc)))
            .map_err(|e| DatorestError::Parse {
                message: format!("bad #inst {}: {}", s, e),
                line: None,
                col: None,
            }),
        ("uuid", Edn::String(s)) => Ok(Edn::Uuid(s)),
        (_, value) => Ok(Edn::Tagged(tag, Box::new(value))),
    }
}

fn unescape(raw: &str) -> String {
    let mut s = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            s.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => s.push('\n'),
            Some('t') => s.push('\t'),
            Some('r') => s.push('\r'),
            Some('b') => s.push('\u{8}'),
            Some('f') => s.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(u) => s.push(u),
                    None => {
                        s.push_str("\\u");
                        s.push_str(&hex);
                    }
                }
            }
            Some(other) => s.push(other),
            None => s.push('\\'),
        }
    }
    s
}

// ------------- Encoding -------------
fn write_seq(f: &mut fmt::Formatter, open: &str, items: &[Edn], close: &str) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

pub(crate) fn write_float(f: &mut fmt::Formatter, x: f64) -> fmt::Result {
    if x.is_nan() {
        write!(f, "##NaN")
    } else if x.is_infinite() {
        write!(f, "{}", if x > 0. { "##Inf" } else { "##-Inf" })
    } else {
        // Debug keeps the decimal point on whole numbers
        write!(f, "{:?}", x)
    }
}

pub(crate) fn write_string(f: &mut fmt::Formatter, s: &str) -> fmt::Result {
    let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
    write!(f, "{}", quoted)
}

impl fmt::Display for Edn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Edn::Nil => write!(f, "nil"),
            Edn::Bool(b) => write!(f, "{}", b),
            Edn::Integer(i) => write!(f, "{}", i),
            Edn::Float(x) => write_float(f, *x),
            Edn::Decimal(d) => write!(f, "{}M", d),
            Edn::String(s) => write_string(f, s),
            Edn::Char(c) => match c {
                '\n' => write!(f, "\\newline"),
                ' ' => write!(f, "\\space"),
                '\t' => write!(f, "\\tab"),
                '\r' => write!(f, "\\return"),
                c => write!(f, "\\{}", c),
            },
            Edn::Keyword(k) => write!(f, ":{}", k),
            Edn::Symbol(s) => write!(f, "{}", s),
            Edn::List(items) => write_seq(f, "(", items, ")"),
            Edn::Vector(items) => write_seq(f, "[", items, "]"),
            Edn::Set(items) => write_seq(f, "#{", items, "}"),
            Edn::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                write!(f, "}}")
            }
            Edn::Inst(t) => write!(f, "#inst \"{}\"", t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Edn::Uuid(u) => write!(f, "#uuid \"{}\"", u),
            Edn::Tagged(tag, value) => write!(f, "#{} {}", tag, value),
        }
    }
}
