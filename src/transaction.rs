//! Accumulates writes, submits them as one request, and resolves tempids.
//!
//! Every write names an entity. Passing `None` mints a placeholder handle
//! (tempid `-1`, `-2`, … per builder) that can be used as a value in later
//! writes of the same builder, long before the server has assigned it a real
//! identifier:
//!
//! ```ignore
//! let mut tx = db.tx();
//! let person = tx.write(None, "person/name", "Ann")?;
//! let city = tx.write(None, "city/name", "NYC")?;
//! tx.write(Some(&person), "person/city", &city)?;
//! tx.submit()?;
//! assert!(person.eid() >= 0 && city.eid() >= 0);
//! ```
//!
//! Submission sends one map literal per entity. The server answers with a
//! `:tempids` map from the tempids it was given to the identifiers it
//! assigned, which is looked up directly for every placeholder.

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasherDefault;

// placeholder lookups are keyed by plain identifiers
use seahash::SeaHasher;
use tracing::{debug, info};

use crate::construct::{Eid, Entity, TransactionId, Version};
use crate::database::Database;
use crate::datatype::{Keyword, Value};
use crate::edn::Edn;
use crate::error::{DatorestError, Result};

pub type EidHasher = BuildHasherDefault<SeaHasher>;
pub type TempidMap = HashMap<Eid, Eid, EidHasher>;

/// What the server reported for a committed transaction.
#[derive(Clone, Debug)]
pub struct TxReport {
    pub version: Version,
    pub tempids: TempidMap,
    pub response: Edn,
}

#[derive(Debug)]
enum Outcome {
    Committed(TxReport),
    Failed,
}

#[derive(Debug)]
struct Write {
    entity: Entity,
    attribute: Keyword,
    value: Value,
}

pub struct Transaction {
    id: TransactionId,
    db: Database,
    writes: Vec<Write>,
    // distinct handles in first-seen order
    placeholders: Vec<Entity>,
    existing: Vec<Entity>,
    // one per id, written to or not
    rebound: Vec<Entity>,
    next_tempid: Eid,
    outcome: Option<Outcome>,
}

impl Transaction {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            id: TransactionId::generate(),
            db,
            writes: Vec::new(),
            placeholders: Vec::new(),
            existing: Vec::new(),
            rebound: Vec::new(),
            next_tempid: -1,
            outcome: None,
        }
    }
    pub fn id(&self) -> TransactionId {
        self.id
    }
    pub fn len(&self) -> usize {
        self.writes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
    pub fn is_submitted(&self) -> bool {
        self.outcome.is_some()
    }
    pub fn placeholders(&self) -> &[Entity] {
        &self.placeholders
    }
    pub fn existing(&self) -> &[Entity] {
        &self.existing
    }
    /// The report of a successful submission.
    pub fn report(&self) -> Option<&TxReport> {
        match &self.outcome {
            Some(Outcome::Committed(report)) => Some(report),
            _ => None,
        }
    }
    fn guard(&self) -> Result<()> {
        match self.outcome {
            Some(_) => Err(DatorestError::AlreadySubmitted),
            None => Ok(()),
        }
    }

    // --------- entities ---------
    fn mint(&mut self) -> Entity {
        let entity = Entity::new(self.db.clone(), self.next_tempid, None, Some(self.id));
        self.next_tempid -= 1;
        entity
    }
    fn owns(&self, entity: &Entity) -> bool {
        entity.origin() == Some(self.id)
    }
    // Resolves the entity a write is about. Resolved handles from elsewhere are
    // rebound to a handle of this builder, placeholders from elsewhere are
    // refused since their tempid means nothing here.
    fn target(&mut self, entity: Option<&Entity>) -> Result<Entity> {
        let Some(entity) = entity else {
            return Ok(self.mint());
        };
        if self.owns(entity) {
            return Ok(entity.clone());
        }
        if !entity.is_resolved() {
            return Err(DatorestError::InvalidArgument(format!(
                "placeholder {} belongs to another transaction",
                entity.eid()
            )));
        }
        let eid = entity.eid();
        if let Some(rebound) = self.rebound.iter().find(|e| e.eid() == eid) {
            return Ok(rebound.clone());
        }
        let rebound = Entity::new(self.db.clone(), eid, entity.version(), Some(self.id));
        self.rebound.push(rebound.clone());
        Ok(rebound)
    }
    fn check_value(&self, value: &Value) -> Result<()> {
        match value {
            Value::Entity(e) if !e.is_resolved() && !self.owns(e) => Err(DatorestError::InvalidArgument(format!(
                "placeholder {} belongs to another transaction",
                e.eid()
            ))),
            Value::Many(items) | Value::Tuple(items) => items.iter().try_for_each(|v| self.check_value(v)),
            _ => Ok(()),
        }
    }
    fn register(&mut self, entity: &Entity) {
        let known = if entity.is_resolved() { &mut self.existing } else { &mut self.placeholders };
        if !known.iter().any(|e| e.same_handle(entity)) {
            known.push(entity.clone());
        }
    }
    // placeholders referenced anywhere inside a value
    fn register_value(&mut self, value: &Value) {
        match value {
            Value::Entity(e) if !e.is_resolved() => self.register(e),
            Value::Many(items) | Value::Tuple(items) => items.iter().for_each(|v| self.register_value(v)),
            _ => (),
        }
    }

    // --------- writes ---------
    fn push(&mut self, entity: &Entity, attribute: &Keyword, value: Value) {
        match value {
            Value::Absent => (),
            // one write per element, i.e. cardinality many
            Value::Many(items) => {
                for item in items {
                    self.push(entity, attribute, item);
                }
            }
            value => {
                self.register(entity);
                self.register_value(&value);
                self.writes.push(Write {
                    entity: entity.clone(),
                    attribute: attribute.clone(),
                    value,
                });
            }
        }
    }
    fn push_all(&mut self, entity: Option<&Entity>, pairs: Vec<(Keyword, Value)>) -> Result<Entity> {
        self.guard()?;
        for (_, value) in &pairs {
            self.check_value(value)?;
        }
        let target = self.target(entity)?;
        for (attribute, value) in pairs {
            self.push(&target, &attribute, value);
        }
        Ok(target)
    }
    /// Writes one attribute value and returns the entity written to. An
    /// absent value (`None`) is skipped, the entity is still returned.
    pub fn write(&mut self, entity: Option<&Entity>, attribute: &str, value: impl Into<Value>) -> Result<Entity> {
        self.guard()?;
        let attribute = Keyword::new(attribute)?;
        self.push_all(entity, vec![(attribute, value.into())])
    }
    /// Writes several attributes sharing a namespace, e.g.
    /// `write_ns(None, "person/", [("name", "Ann".into()), ("age", 25.into())])`.
    pub fn write_ns<I, K, V>(&mut self, entity: Option<&Entity>, namespace: &str, pairs: I) -> Result<Entity>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.guard()?;
        let namespace = namespace.trim_start_matches(':').trim_end_matches('/');
        let pairs = pairs
            .into_iter()
            .map(|(name, value)| Ok((Keyword::new(&format!("{}/{}", namespace, name.as_ref()))?, value.into())))
            .collect::<Result<Vec<_>>>()?;
        self.push_all(entity, pairs)
    }
    /// Positional form: attribute, value, attribute, value, … An attribute
    /// ending in `/` takes a list of name/value pairs in that namespace.
    pub fn add(&mut self, entity: Option<&Entity>, av: Vec<Value>) -> Result<Entity> {
        self.guard()?;
        if av.len() % 2 != 0 {
            return Err(DatorestError::InvalidArgument(format!(
                "imbalanced attribute/value list of {} items",
                av.len()
            )));
        }
        let mut pairs = Vec::new();
        let mut items = av.into_iter();
        while let (Some(attribute), Some(value)) = (items.next(), items.next()) {
            let name = attribute_name(&attribute)?;
            if !name.ends_with('/') {
                pairs.push((Keyword::new(&name)?, value));
                continue;
            }
            match value {
                Value::Many(nested) | Value::Tuple(nested) if nested.len() % 2 == 0 => {
                    let mut nested = nested.into_iter();
                    while let (Some(a), Some(v)) = (nested.next(), nested.next()) {
                        let full = format!("{}{}", name, attribute_name(&a)?);
                        pairs.push((Keyword::new(&full)?, v));
                    }
                }
                other => {
                    return Err(DatorestError::InvalidArgument(format!("invalid pair: {} : {}", name, other)));
                }
            }
        }
        self.push_all(entity, pairs)
    }

    // --------- submission ---------
    /// One map literal per entity, in first-seen order. Repeated attributes of
    /// an entity are collapsed into one vector value.
    pub fn statements(&self) -> Vec<String> {
        let mut groups: Vec<(&Entity, Vec<(&Keyword, Vec<&Value>)>)> = Vec::new();
        for write in &self.writes {
            let position = groups.iter().position(|(e, _)| e.same_handle(&write.entity));
            let i = match position {
                Some(i) => i,
                None => {
                    groups.push((&write.entity, Vec::new()));
                    groups.len() - 1
                }
            };
            let attributes = &mut groups[i].1;
            match attributes.iter().position(|(a, _)| *a == &write.attribute) {
                Some(j) => attributes[j].1.push(&write.value),
                None => attributes.push((&write.attribute, vec![&write.value])),
            }
        }
        groups
            .into_iter()
            .map(|(entity, attributes)| {
                let mut literal = format!("{{:db/id {}", entity.literal());
                for (attribute, values) in attributes {
                    let value = match values.as_slice() {
                        [single] => single.literal(),
                        many => format!("[{}]", many.iter().map(|v| v.literal()).collect::<Vec<_>>().join(" ")),
                    };
                    literal.push_str(&format!(" {} {}", attribute, value));
                }
                literal.push('}');
                literal
            })
            .collect()
    }
    /// The `tx-data` literal exactly as it is (or was) sent.
    pub fn tx_data(&self) -> String {
        format!("[ {} ]", self.statements().join(" "))
    }
    /// Sends every write as one request and resolves the placeholders. Can
    /// only be called once; a failed builder must be replaced by a new one.
    pub fn submit(&mut self) -> Result<TxReport> {
        self.guard()?;
        let statements = self.statements();
        debug!(tx = ?self.id, writes = self.writes.len(), entities = statements.len(), "submitting");
        let resolved = self.db.transact(&statements).and_then(|response| self.resolve(response));
        match resolved {
            Ok(report) => {
                self.outcome = Some(Outcome::Committed(report.clone()));
                Ok(report)
            }
            Err(e) => {
                self.outcome = Some(Outcome::Failed);
                Err(e)
            }
        }
    }
    fn resolve(&self, response: Edn) -> Result<TxReport> {
        let version = response
            .get("tx-data")
            .and_then(Edn::as_seq)
            .and_then(|facts| facts.first())
            .and_then(|fact| fact.get("tx"))
            .and_then(Edn::as_i64)
            .or_else(|| response.get("db-after").and_then(|db| db.get("basis-t")).and_then(Edn::as_i64))
            .ok_or_else(|| DatorestError::UnexpectedResponse(format!("transaction report without a version: {}", response)))?;
        let mut tempids = TempidMap::default();
        if let Some(Edn::Map(pairs)) = response.get("tempids") {
            for (wire, assigned) in pairs {
                if let (Some(wire), Some(assigned)) = (wire.as_i64(), assigned.as_i64()) {
                    tempids.insert(wire, assigned);
                }
            }
        }
        // check everything before touching any handle
        let mut assignments = Vec::with_capacity(self.placeholders.len());
        for placeholder in &self.placeholders {
            let wire = placeholder.eid();
            match tempids.get(&wire) {
                Some(&assigned) if assigned >= 0 => assignments.push((placeholder, assigned)),
                Some(&assigned) => {
                    return Err(DatorestError::Resolution(format!(
                        "tempid {} was assigned the negative id {}",
                        wire, assigned
                    )));
                }
                None => {
                    return Err(DatorestError::Resolution(format!("tempid {} was not assigned an id", wire)));
                }
            }
        }
        for (placeholder, assigned) in assignments {
            placeholder.resolve(assigned, version);
        }
        for entity in &self.existing {
            entity.stamp(version);
        }
        self.db.observe(version);
        info!(version, resolved = self.placeholders.len(), existing = self.existing.len(), "transaction committed");
        Ok(TxReport { version, tempids, response })
    }
}

fn attribute_name(value: &Value) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s.trim_start_matches(':').to_string()),
        Value::Keyword(k) => Ok(k.as_str().to_string()),
        other => Err(DatorestError::InvalidArgument(format!("not an attribute name: {}", other))),
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<datorest tx, {} pending>", self.writes.len())
    }
}
