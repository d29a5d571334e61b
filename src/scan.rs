use std::collections::VecDeque;
use std::time::Instant;

use tracing::debug;

use crate::connection::Method;
use crate::construct::{Eid, Fact, Index, Version};
use crate::database::Database;
use crate::datatype::{Keyword, Value};
use crate::edn::Edn;
use crate::error::{DatorestError, Result};

pub const DEFAULT_CHUNK: usize = 100;

/// Lazy walk over one index, fetched `chunk` facts at a time.
///
/// The offset advances by a full chunk after every request, whatever the
/// server returned, and the walk ends on an empty chunk or once a request at
/// or past the limit has been made. No more than `limit` less the starting
/// offset facts are yielded. A failed request is yielded once and ends the
/// walk.
pub struct FactScan {
    db: Database,
    index: Index,
    entity: Option<Eid>,
    attribute: Option<Keyword>,
    value: Option<Value>,
    start: Option<String>,
    end: Option<String>,
    as_of: Option<Version>,
    since: Option<Version>,
    history: bool,
    offset: usize,
    first: usize,
    chunk: usize,
    limit: Option<usize>,
    kept: usize,
    buffer: VecDeque<Edn>,
    requests: usize,
    done: bool,
}

impl FactScan {
    pub fn new(db: Database, index: Index) -> Self {
        Self {
            db,
            index,
            entity: None,
            attribute: None,
            value: None,
            start: None,
            end: None,
            as_of: None,
            since: None,
            history: false,
            offset: 0,
            first: 0,
            chunk: DEFAULT_CHUNK,
            limit: None,
            kept: 0,
            buffer: VecDeque::new(),
            requests: 0,
            done: false,
        }
    }
    pub fn entity(mut self, eid: Eid) -> Self {
        self.entity = Some(eid);
        self
    }
    pub fn attribute(mut self, attribute: Keyword) -> Self {
        self.attribute = Some(attribute);
        self
    }
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
    /// Lower bound of a range scan, as a literal.
    pub fn start(mut self, start: &str) -> Self {
        self.start = Some(start.to_string());
        self
    }
    pub fn end(mut self, end: &str) -> Self {
        self.end = Some(end.to_string());
        self
    }
    pub fn as_of(mut self, version: Version) -> Self {
        self.as_of = Some(version);
        self
    }
    pub fn since(mut self, version: Version) -> Self {
        self.since = Some(version);
        self
    }
    pub fn history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self.first = offset;
        self
    }
    /// Facts asked for per request. Zero is taken as one.
    pub fn chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }
    /// Stop requesting once the offset has reached `limit`, and yield no
    /// fact past it. Zero means no limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = if limit == 0 { None } else { Some(limit) };
        self
    }
    pub fn index(&self) -> Index {
        self.index
    }
    /// Where the next request would start.
    pub fn current_offset(&self) -> usize {
        self.offset
    }
    /// Requests made so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let optional = |v: Option<String>| v.unwrap_or_default();
        vec![
            ("index", self.index.to_string()),
            ("e", optional(self.entity.map(|e| e.to_string()))),
            ("a", optional(self.attribute.as_ref().map(Keyword::to_string))),
            ("v", optional(self.value.as_ref().map(Value::literal))),
            ("offset", self.offset.to_string()),
            ("limit", self.chunk.to_string()),
            ("start", optional(self.start.clone())),
            ("end", optional(self.end.clone())),
            ("history", if self.history { "true".into() } else { String::new() }),
            ("as-of", optional(self.as_of.map(|t| t.to_string()))),
            ("since", optional(self.since.map(|t| t.to_string()))),
        ]
    }
    fn fetch(&mut self) -> Result<()> {
        let started = Instant::now();
        let path = format!("{}-/datoms", self.db.uri_db());
        let body = self.db.rest(Method::Get, &path, self.fields(), &[200, 201])?;
        self.requests += 1;
        let facts = match body {
            Edn::Nil => Vec::new(),
            Edn::Vector(facts) | Edn::List(facts) | Edn::Set(facts) => facts,
            other => {
                return Err(DatorestError::UnexpectedResponse(format!("datoms are not a collection: {}", other)));
            }
        };
        debug!(
            index = %self.index,
            offset = self.offset,
            fetched = facts.len(),
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "datoms fetched"
        );
        if facts.is_empty() || self.limit.map_or(false, |limit| self.offset >= limit) {
            self.done = true;
        }
        self.offset += self.chunk;
        let room = match self.limit {
            Some(limit) => limit.saturating_sub(self.first).saturating_sub(self.kept),
            None => facts.len(),
        };
        let taken = facts.len().min(room);
        self.kept += taken;
        self.buffer.extend(facts.into_iter().take(taken));
        Ok(())
    }
}

impl Iterator for FactScan {
    type Item = Result<Fact>;

    fn next(&mut self) -> Option<Result<Fact>> {
        loop {
            if let Some(fact) = self.buffer.pop_front() {
                return Some(Fact::from_edn(&fact));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
