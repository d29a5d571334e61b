// used for #inst values
use chrono::{DateTime, Utc};
// used for decimal numbers
use bigdecimal::BigDecimal;

// used when parsing a string to a Decimal
use std::str::FromStr;
// used to print out the literal form of a value
use std::fmt;
// used to let Decimal stand in for the number it wraps
use std::ops;

use crate::construct::Entity;
use crate::edn::{self, Edn};
use crate::error::{DatorestError, Result};

// ------------- Keyword -------------
// Attribute names and enum idents. The colon is added when written out, so
// "person/name" and ":person/name" name the same attribute.
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct Keyword(String);

impl Keyword {
    pub fn new(name: &str) -> Result<Keyword> {
        let name = name.trim().trim_start_matches(':');
        if name.is_empty() || name.ends_with('/') || name.chars().any(|c| c.is_whitespace() || "[](){}\"".contains(c)) {
            return Err(DatorestError::InvalidArgument(format!("not an attribute name: {:?}", name)));
        }
        Ok(Keyword(name.to_string()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn namespace(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(ns, _)| ns)
    }
    pub fn name(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, n)| n).unwrap_or(&self.0)
    }
}
impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

// ------------- Decimal -------------
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal(decimal)),
            _ => None,
        }
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}M", self.0)
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ------------- Value -------------
/// Anything that can be written as an attribute value or bound as a query input.
///
/// `Absent` is the explicit "no value" marker: writes carrying it are skipped,
/// which is what `Option::None` converts into. `false`, `0` and `""` are all
/// real values.
#[derive(Clone, Debug)]
pub enum Value {
    Absent,
    Nil,
    Bool(bool),
    Long(i64),
    Double(f64),
    Decimal(Decimal),
    Str(String),
    Keyword(Keyword),
    Instant(DateTime<Utc>),
    Uuid(String),
    Entity(Entity),
    Many(Vec<Value>),
    Tuple(Vec<Value>),
    Edn(Edn),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }
    pub fn keyword(name: &str) -> Result<Value> {
        Keyword::new(name).map(Value::Keyword)
    }
    /// The literal syntax the REST service reads.
    pub fn literal(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Absent | Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(i) => write!(f, "{}", i),
            Value::Double(x) => edn::write_float(f, *x),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Str(s) => edn::write_string(f, s),
            Value::Keyword(k) => write!(f, "{}", k),
            Value::Instant(t) => write!(f, "{}", Edn::Inst(*t)),
            Value::Uuid(u) => write!(f, "#uuid \"{}\"", u),
            Value::Entity(e) => write!(f, "{}", e.literal()),
            Value::Many(items) | Value::Tuple(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Edn(e) => write!(f, "{}", e),
        }
    }
}

// ------------- Conversions -------------
impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}
impl From<&String> for Value {
    fn from(s: &String) -> Value {
        Value::Str(s.clone())
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Long(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Long(i as i64)
    }
}
impl From<u32> for Value {
    fn from(i: u32) -> Value {
        Value::Long(i as i64)
    }
}
impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Double(x)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}
impl From<Keyword> for Value {
    fn from(k: Keyword) -> Value {
        Value::Keyword(k)
    }
}
impl From<Decimal> for Value {
    fn from(d: Decimal) -> Value {
        Value::Decimal(d)
    }
}
impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Value {
        Value::Decimal(Decimal(d))
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Value {
        Value::Instant(t)
    }
}
impl From<Entity> for Value {
    fn from(e: Entity) -> Value {
        Value::Entity(e)
    }
}
impl From<&Entity> for Value {
    fn from(e: &Entity) -> Value {
        Value::Entity(e.clone())
    }
}
impl From<Edn> for Value {
    fn from(e: Edn) -> Value {
        Value::Edn(e)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Value {
        o.map(Into::into).unwrap_or(Value::Absent)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Value {
        Value::Many(items.into_iter().map(Into::into).collect())
    }
}
impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Value {
        Value::Tuple(vec![a.into(), b.into()])
    }
}
impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for Value {
    fn from((a, b, c): (A, B, C)) -> Value {
        Value::Tuple(vec![a.into(), b.into(), c.into()])
    }
}
