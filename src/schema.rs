//! Attribute declarations, compiled into the statements that install them.
//!
//! A schema is written as rows: a namespace row followed by the attributes
//! in that namespace.
//!
//! ```
//! use datorest::schema::{Property, Row, Schema, ValueType};
//!
//! let schema = Schema::new(vec![
//!     Row::namespace("person"),
//!     Row::attribute("name", vec![Property::Unique(datorest::schema::Unique::Identity)]),
//!     Row::attribute("city", vec![Property::Type(ValueType::Ref)]),
//!     Row::attribute("kind", vec![Property::Enum(vec!["human".into(), "robot".into()])]),
//! ]).unwrap();
//! assert!(schema.is_ref("person/city"));
//! assert_eq!(schema.statements().len(), 5);
//! ```

use std::fmt;

use crate::datatype::Value;
use crate::error::{DatorestError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Keyword,
    Boolean,
    Long,
    BigInt,
    Float,
    Double,
    BigDec,
    Ref,
    Instant,
    Uuid,
    Uri,
    Bytes,
}

impl ValueType {
    pub fn ident(&self) -> &'static str {
        match self {
            ValueType::String => "db.type/string",
            ValueType::Keyword => "db.type/keyword",
            ValueType::Boolean => "db.type/boolean",
            ValueType::Long => "db.type/long",
            ValueType::BigInt => "db.type/bigint",
            ValueType::Float => "db.type/float",
            ValueType::Double => "db.type/double",
            ValueType::BigDec => "db.type/bigdec",
            ValueType::Ref => "db.type/ref",
            ValueType::Instant => "db.type/instant",
            ValueType::Uuid => "db.type/uuid",
            ValueType::Uri => "db.type/uri",
            ValueType::Bytes => "db.type/bytes",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn ident(&self) -> &'static str {
        match self {
            Cardinality::One => "db.cardinality/one",
            Cardinality::Many => "db.cardinality/many",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unique {
    Value,
    Identity,
}

impl Unique {
    pub fn ident(&self) -> &'static str {
        match self {
            Unique::Value => "db.unique/value",
            Unique::Identity => "db.unique/identity",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Property {
    Type(ValueType),
    Cardinality(Cardinality),
    Unique(Unique),
    Index,
    Fulltext,
    Component,
    NoHistory,
    Doc(String),
    Enum(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Row {
    Namespace(String),
    Attribute(String, Vec<Property>),
}

impl Row {
    pub fn namespace(name: &str) -> Row {
        Row::Namespace(name.to_string())
    }
    pub fn attribute(name: &str, properties: Vec<Property>) -> Row {
        Row::Attribute(name.to_string(), properties)
    }
}

/// One declared attribute with its defaults filled in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub ident: String,
    pub value_type: ValueType,
    pub cardinality: Cardinality,
    pub unique: Option<Unique>,
    pub index: bool,
    pub fulltext: bool,
    pub component: bool,
    pub no_history: bool,
    pub doc: Option<String>,
    pub options: Vec<String>,
}

impl Attribute {
    fn build(namespace: &str, name: &str, properties: &[Property]) -> Result<Attribute> {
        let ident = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", namespace, name)
        };
        let conflict = |what: &str| DatorestError::InvalidArgument(format!("conflicting {} for :{}", what, ident));
        let mut value_type = None;
        let mut cardinality = None;
        let mut attribute = Attribute {
            ident: ident.clone(),
            value_type: ValueType::String,
            cardinality: Cardinality::One,
            unique: None,
            index: false,
            fulltext: false,
            component: false,
            no_history: false,
            doc: None,
            options: Vec::new(),
        };
        for property in properties {
            match property {
                Property::Type(t) => match value_type {
                    Some(previous) if previous != *t => return Err(conflict("value types")),
                    _ => value_type = Some(*t),
                },
                Property::Cardinality(c) => match cardinality {
                    Some(previous) if previous != *c => return Err(conflict("cardinalities")),
                    _ => cardinality = Some(*c),
                },
                Property::Unique(u) => attribute.unique = Some(*u),
                Property::Index => attribute.index = true,
                Property::Fulltext => attribute.fulltext = true,
                Property::Component => attribute.component = true,
                Property::NoHistory => attribute.no_history = true,
                Property::Doc(doc) => attribute.doc = Some(doc.clone()),
                Property::Enum(options) => attribute.options.extend(options.iter().cloned()),
            }
        }
        attribute.value_type = value_type.unwrap_or(ValueType::String);
        attribute.cardinality = cardinality.unwrap_or(Cardinality::One);
        Ok(attribute)
    }
    fn statement(&self, partition: &str) -> String {
        let mut pairs = vec![
            format!(":db/id #db/id[:db.part/{}]", partition),
            format!(":db/ident :{}", self.ident),
            format!(":db/valueType :{}", self.value_type.ident()),
            format!(":db/cardinality :{}", self.cardinality.ident()),
        ];
        if let Some(unique) = self.unique {
            pairs.push(format!(":db/unique :{}", unique.ident()));
        }
        if self.index {
            pairs.push(":db/index true".into());
        }
        if self.fulltext {
            pairs.push(":db/fulltext true".into());
        }
        if self.component {
            pairs.push(":db/isComponent true".into());
        }
        if self.no_history {
            pairs.push(":db/noHistory true".into());
        }
        if let Some(doc) = &self.doc {
            pairs.push(format!(":db/doc {}", Value::Str(doc.clone())));
        }
        pairs.push(":db.install/_attribute :db.part/db".into());
        format!("{{{}}}", pairs.join(" "))
    }
    /// `ns.name/option` idents, one per enum option.
    pub fn enum_idents(&self) -> Vec<String> {
        let prefix = self.ident.replacen('/', ".", 1);
        self.options.iter().map(|o| format!("{}/{}", prefix, o)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    partition: String,
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(rows: Vec<Row>) -> Result<Schema> {
        let mut namespace: Option<String> = None;
        let mut attributes = Vec::new();
        for row in rows {
            match row {
                Row::Namespace(name) => namespace = Some(name.trim_start_matches(':').to_string()),
                Row::Attribute(name, properties) => {
                    let Some(ns) = &namespace else {
                        return Err(DatorestError::InvalidArgument(format!(
                            "invalid schema definition at row {}: no namespace declared",
                            name
                        )));
                    };
                    attributes.push(Attribute::build(ns, &name, &properties)?);
                }
            }
        }
        Ok(Schema {
            partition: "db".into(),
            attributes,
        })
    }
    /// Installs attributes into another partition than `db`.
    pub fn with_partition(mut self, partition: &str) -> Schema {
        self.partition = partition.trim_start_matches(":db.part/").to_string();
        self
    }
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
    pub fn attribute(&self, ident: &str) -> Option<&Attribute> {
        let ident = ident.trim_start_matches(':');
        self.attributes.iter().find(|a| a.ident == ident)
    }
    pub fn is_ref(&self, ident: &str) -> bool {
        self.attribute(ident).map_or(false, |a| a.value_type == ValueType::Ref)
    }
    pub fn is_many(&self, ident: &str) -> bool {
        self.attribute(ident).map_or(false, |a| a.cardinality == Cardinality::Many)
    }
    /// One map per attribute followed by its enum idents.
    pub fn statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        for attribute in &self.attributes {
            statements.push(attribute.statement(&self.partition));
            for ident in attribute.enum_idents() {
                statements.push(format!("[:db/add #db/id[:db.part/user] :db/ident :{}]", ident));
            }
        }
        statements
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[ {} ]", self.statements().join("\n  "))
    }
}
