//! Chainable construction of queries.
//!
//! A [`Query`] is a plain value: clauses and inputs are recorded as given and
//! only turned into query text by [`Query::compile`], which can be called any
//! number of times with the same result.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::construct::Entity;
use crate::database::Database;
use crate::datatype::Value;
use crate::edn::Edn;
use crate::error::{DatorestError, Result};

lazy_static! {
    static ref VARIABLE: Regex = Regex::new(r#"\?[^\s\[\]\(\)\{\}"]+"#).expect("variable pattern");
}

/// How an input is declared after `:in`, decided by the shape of its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// `?x`
    Scalar,
    /// `[?x ...]`, any one of the values
    Collection,
    /// `[[?x ?y]]`, a set of rows
    Relation,
    /// `[?x ?y]`, one row spread over several variables
    Tuple,
}

impl Binding {
    fn infer(value: &Value) -> Binding {
        match value {
            Value::Many(items) => match items.first() {
                Some(Value::Many(_)) | Some(Value::Tuple(_)) => Binding::Relation,
                _ => Binding::Collection,
            },
            Value::Tuple(_) => Binding::Tuple,
            _ => Binding::Scalar,
        }
    }
    fn declare(&self, pattern: &str) -> String {
        match self {
            Binding::Scalar => pattern.to_string(),
            Binding::Collection => format!("[{} ...]", pattern),
            Binding::Relation => format!("[[{}]]", pattern),
            Binding::Tuple => format!("[{}]", pattern),
        }
    }
}

#[derive(Clone, Debug)]
struct Input {
    pattern: String,
    binding: Binding,
    value: Value,
}

#[derive(Clone, Debug, PartialEq)]
enum Clause {
    One(String),
    Group(Vec<String>),
}

impl Clause {
    fn compile(&self) -> String {
        match self {
            Clause::One(text) => format!("[{}]", text.trim()),
            Clause::Group(texts) => texts.iter().map(|t| format!("[{}]", t.trim())).collect::<Vec<_>>().join(" "),
        }
    }
}

#[derive(Clone)]
pub struct Query {
    db: Database,
    // empty means every variable found in the clauses
    find: Vec<String>,
    clauses: Vec<Clause>,
    inputs: Vec<Input>,
    limit: Option<usize>,
    offset: Option<usize>,
    history: bool,
}

impl Query {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            find: Vec::new(),
            clauses: Vec::new(),
            inputs: Vec::new(),
            limit: None,
            offset: None,
            history: false,
        }
    }
    /// Adds whitespace separated result variables, e.g. `"?e ?name"`.
    pub fn find(mut self, variables: &str) -> Self {
        self.find.extend(variables.split_whitespace().map(str::to_string));
        self
    }
    /// Returns every variable that occurs in the clauses, in order of first
    /// occurrence.
    pub fn find_all(mut self) -> Self {
        self.find.clear();
        self
    }
    /// One clause without its brackets, e.g. `"?e :person/name ?n"`.
    pub fn clause(mut self, clause: &str) -> Self {
        self.clauses.push(Clause::One(clause.to_string()));
        self
    }
    pub fn clauses(mut self, clauses: &[&str]) -> Self {
        self.clauses.push(Clause::Group(clauses.iter().map(|c| c.to_string()).collect()));
        self
    }
    /// Binds an input. A vector of values binds any one of them, a vector of
    /// tuples binds a relation and a tuple binds one value per variable:
    ///
    /// ```ignore
    /// db.find("?e").clause("?e :person/name ?n").bind("?n", vec!["Ann", "Bo"]);
    /// db.find("?e").clause("?e :person/name ?n").clause("?e :person/age ?a")
    ///     .bind("?n ?a", vec![("Ann", 25), ("Bo", 31)]);
    /// ```
    pub fn bind(mut self, pattern: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let binding = Binding::infer(&value);
        self.inputs.push(Input {
            pattern: pattern.trim().to_string(),
            binding,
            value,
        });
        self
    }
    /// Full text search on `attribute` for `term`, binding matches to
    /// `entity` and the matched text to `value`.
    pub fn fulltext(mut self, attribute: &str, search: &str, term: &str, entity: &str, value: &str) -> Self {
        let attribute = attribute.trim_start_matches(':');
        self.clauses.push(Clause::One(format!(
            "(fulltext $ :{} {}) [[{} {}]]",
            attribute, search, entity, value
        )));
        self.bind(search, term)
    }
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
    pub fn history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    // --------- compilation ---------
    fn compile_clauses(&self) -> String {
        self.clauses.iter().map(Clause::compile).collect::<Vec<_>>().join(" ")
    }
    /// The result variables, either as given or collected from the clauses.
    pub fn find_variables(&self) -> Vec<String> {
        if !self.find.is_empty() {
            return self.find.clone();
        }
        let clauses = self.compile_clauses();
        let mut variables: Vec<String> = Vec::new();
        for found in VARIABLE.find_iter(&clauses) {
            if !variables.iter().any(|v| v == found.as_str()) {
                variables.push(found.as_str().to_string());
            }
        }
        variables
    }
    /// Query text and one literal per input, in declaration order.
    pub fn compile(&self) -> (String, Vec<String>) {
        let mut parts = vec![":find".to_string(), self.find_variables().join(" ")];
        if !self.inputs.is_empty() {
            parts.push(":in $".to_string());
            parts.extend(self.inputs.iter().map(|i| i.binding.declare(&i.pattern)));
        }
        parts.push(":where".to_string());
        parts.push(self.compile_clauses());
        let arguments = self.inputs.iter().map(|i| i.value.literal()).collect();
        (format!("[{}]", parts.join(" ")), arguments)
    }

    // --------- execution ---------
    fn run(&self, limit: Option<usize>) -> Result<Vec<Vec<Edn>>> {
        let (query, arguments) = self.compile();
        debug!(%query, inputs = arguments.len(), "running query");
        self.db.q(&query, &arguments, limit, self.offset, self.history)
    }
    /// Every row, each aligned with [`Query::find_variables`].
    pub fn all(&self) -> Result<Vec<Vec<Edn>>> {
        self.run(self.limit)
    }
    /// The first row, if there is one.
    pub fn one(&self) -> Result<Option<Vec<Edn>>> {
        Ok(self.run(Some(1))?.into_iter().next())
    }
    /// The first row keyed by variable name without the `?`. Empty when
    /// nothing matched.
    pub fn hash_one(&self) -> Result<BTreeMap<String, Edn>> {
        let Some(row) = self.one()? else {
            return Ok(BTreeMap::new());
        };
        Ok(self
            .find_variables()
            .into_iter()
            .map(|v| v.trim_start_matches('?').to_string())
            .zip(row)
            .collect())
    }
    /// The column of `variable` as entity handles.
    pub fn entities(&self, variable: &str) -> Result<Vec<Entity>> {
        let column = self
            .find_variables()
            .iter()
            .position(|v| v == variable)
            .ok_or_else(|| DatorestError::InvalidArgument(format!("{} is not a result variable", variable)))?;
        self.all()?
            .iter()
            .map(|row| {
                let value = row.get(column);
                value
                    .and_then(|v| v.as_i64().or_else(|| v.reference()))
                    .map(|eid| self.db.entity(eid))
                    .ok_or_else(|| {
                        DatorestError::UnexpectedResponse(format!("{} is not an entity id: {:?}", variable, value))
                    })
            })
            .collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.compile().0)
    }
}
