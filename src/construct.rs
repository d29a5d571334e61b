use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

// other lookups use BTreeMap so that views come out in a stable order
use std::collections::BTreeMap;

// custom made ordering for entities
use std::cmp::Ordering;

// used to print out readable forms of a construct
use std::fmt;
use std::str::FromStr;

use tracing::debug;

// our own stuff that we need
use crate::database::Database;
use crate::datatype::{Keyword, Value};
use crate::edn::Edn;
use crate::error::{DatorestError, Result};

// ------------- Identifiers -------------
/// Entity identifier. Negative values are placeholders (tempids) that only
/// mean something inside the transaction that minted them.
pub type Eid = i64;
/// The transaction stamp a handle's state is valid at.
pub type Version = i64;

/// Identifies one transaction builder, so a handle can tell which builder
/// minted it without holding on to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    pub(crate) fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

// ------------- Entity -------------
#[derive(Debug)]
struct EntityState {
    eid: Eid,
    version: Option<Version>, // None until resolved
    attributes: Option<Vec<(String, Edn)>>,
}

struct EntityCell {
    db: Database,
    origin: Option<TransactionId>,
    state: Mutex<EntityState>,
}

/// A handle to a remote record, possibly one that does not exist yet.
///
/// Clones share the same cell, so when a transaction resolves a placeholder
/// every clone (including ones sitting in collections) sees the new
/// identifier. Equality looks at `(eid, version)`; ordering only at the
/// version, with unresolved handles counting as version 0.
#[derive(Clone)]
pub struct Entity(Arc<EntityCell>);

impl Entity {
    pub(crate) fn new(db: Database, eid: Eid, version: Option<Version>, origin: Option<TransactionId>) -> Self {
        Self(Arc::new(EntityCell {
            db,
            origin,
            state: Mutex::new(EntityState { eid, version, attributes: None }),
        }))
    }
    fn state(&self) -> MutexGuard<'_, EntityState> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn eid(&self) -> Eid {
        self.state().eid
    }
    pub fn version(&self) -> Option<Version> {
        self.state().version
    }
    pub fn is_resolved(&self) -> bool {
        self.eid() >= 0
    }
    pub fn origin(&self) -> Option<TransactionId> {
        self.0.origin
    }
    pub fn database(&self) -> &Database {
        &self.0.db
    }
    /// True when both are clones of the very same handle.
    pub fn same_handle(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
    pub(crate) fn resolve(&self, eid: Eid, version: Version) {
        let mut state = self.state();
        state.eid = eid;
        state.version = Some(version);
    }
    pub(crate) fn stamp(&self, version: Version) {
        self.state().version = Some(version);
    }
    /// Placeholders are written as tempids, resolved entities as their id.
    pub fn literal(&self) -> String {
        let eid = self.eid();
        if eid < 0 {
            format!("#db/id[:db.part/user {}]", eid)
        } else {
            eid.to_string()
        }
    }
    fn version_key(&self) -> Version {
        self.version().unwrap_or(0)
    }
    /// Total order: placeholders first, then by version.
    pub fn cmp_version(&self, other: &Entity) -> Ordering {
        (self.is_resolved(), self.version_key()).cmp(&(other.is_resolved(), other.version_key()))
    }

    // --------- attributes ---------
    fn load(&self) -> Result<Vec<(String, Edn)>> {
        let eid = {
            let state = self.state();
            if state.eid < 0 {
                return Ok(Vec::new()); // nothing committed yet
            }
            if let Some(attributes) = &state.attributes {
                return Ok(attributes.clone());
            }
            state.eid
        };
        let fetched = self.0.db.fetch_entity(eid)?;
        let attributes: Vec<(String, Edn)> = match fetched {
            Edn::Map(pairs) => pairs
                .into_iter()
                .filter_map(|(k, v)| match k {
                    Edn::Keyword(name) => Some((name, v)),
                    _ => None,
                })
                .collect(),
            Edn::Nil => Vec::new(),
            other => {
                return Err(DatorestError::UnexpectedResponse(format!(
                    "entity {} is not a map: {}",
                    eid, other
                )));
            }
        };
        debug!(eid, attributes = attributes.len(), "entity cached");
        self.state().attributes = Some(attributes.clone());
        Ok(attributes)
    }
    /// Drops the cached attributes; the next read fetches them again.
    pub fn refresh(&self) {
        self.state().attributes = None;
    }
    fn convert(&self, attribute: &str, value: &Edn) -> Attr {
        if let Some(items) = value.as_seq() {
            return Attr::Many(items.iter().map(|v| self.convert(attribute, v)).collect());
        }
        let referenced = value.reference().or_else(|| {
            let declared_ref = self.0.db.schema().map_or(false, |s| s.is_ref(attribute));
            if declared_ref { value.as_i64() } else { None }
        });
        match referenced {
            Some(eid) => Attr::Entity(Entity::new(self.0.db.clone(), eid, self.version(), None)),
            None => Attr::Value(value.clone()),
        }
    }
    /// All attributes of the entity, fetched on first use. Unresolved
    /// entities have none.
    pub fn attributes(&self) -> Result<BTreeMap<String, Attr>> {
        Ok(self
            .load()?
            .iter()
            .map(|(name, value)| (name.clone(), self.convert(name, value)))
            .collect())
    }
    /// A single attribute, `None` when the entity does not have it (or is
    /// still a placeholder).
    pub fn attribute(&self, name: &str) -> Result<Option<Attr>> {
        let name = name.trim_start_matches(':');
        Ok(self
            .load()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(k, v)| self.convert(k, v)))
    }
    /// The attributes in one namespace, keyed without the `ns/` prefix.
    pub fn namespace(&self, ns: &str) -> Result<BTreeMap<String, Attr>> {
        let prefix = format!("{}/", ns.trim_start_matches(':').trim_end_matches('/'));
        let mut view: BTreeMap<String, Attr> = BTreeMap::new();
        for (name, value) in self.load()?.iter() {
            let Some(stripped) = name.strip_prefix(&prefix) else { continue };
            let converted = self.convert(name, value);
            match view.remove(stripped) {
                None => {
                    view.insert(stripped.to_string(), converted);
                }
                Some(Attr::Many(mut items)) => {
                    items.push(converted);
                    view.insert(stripped.to_string(), Attr::Many(items));
                }
                Some(previous) => {
                    view.insert(stripped.to_string(), Attr::Many(vec![previous, converted]));
                }
            }
        }
        Ok(view)
    }
    /// Retracts one value right away. The cache is left alone, call
    /// [`Entity::refresh`] to observe the change.
    pub fn retract(&self, attribute: &str, value: impl Into<Value>) -> Result<Edn> {
        let eid = self.eid();
        if eid < 0 {
            return Err(DatorestError::InvalidState(format!(
                "entity {} is unresolved, cannot issue retractions",
                eid
            )));
        }
        self.0.db.retract(eid, attribute, value)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        if self.same_handle(other) {
            return true;
        }
        let (a, b) = (self.state(), other.state());
        a.eid == b.eid && a.version == b.version
    }
}
impl Eq for Entity {}
impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.cmp_version(other) {
            Ordering::Equal if self != other => None,
            ordering => Some(ordering),
        }
    }
}
impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state();
        write!(f, "{{:db/id {} :version {:?}}}", state.eid, state.version)
    }
}
impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.literal())
    }
}

// ------------- Attr -------------
/// An attribute value as seen through an entity: references become handles
/// and collections keep their elements in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Attr {
    Value(Edn),
    Entity(Entity),
    Many(Vec<Attr>),
}
impl Attr {
    pub fn as_value(&self) -> Option<&Edn> {
        match self {
            Attr::Value(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Attr::Entity(e) => Some(e),
            _ => None,
        }
    }
    pub fn as_many(&self) -> Option<&[Attr]> {
        match self {
            Attr::Many(items) => Some(items),
            _ => None,
        }
    }
}

// ------------- Fact -------------
#[derive(Clone, Debug, PartialEq)]
pub struct Fact {
    pub e: Eid,
    pub a: Keyword,
    pub v: Edn,
    pub tx: Version,
    pub added: bool,
}
impl Fact {
    pub fn from_edn(edn: &Edn) -> Result<Fact> {
        let missing = |field: &str| DatorestError::UnexpectedResponse(format!("fact without {}: {}", field, edn));
        let e = edn.get("e").and_then(Edn::as_i64).ok_or_else(|| missing(":e"))?;
        let a = match edn.get("a") {
            Some(Edn::Keyword(k)) => Keyword::new(k)?,
            // some indexes report the attribute by its id
            Some(Edn::Integer(i)) => Keyword::new(&i.to_string())?,
            _ => return Err(missing(":a")),
        };
        let v = edn.get("v").cloned().ok_or_else(|| missing(":v"))?;
        let tx = edn.get("tx").and_then(Edn::as_i64).ok_or_else(|| missing(":tx"))?;
        let added = edn.get("added").and_then(Edn::as_bool).unwrap_or(true);
        Ok(Fact { e, a, v, tx, added })
    }
}
impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{} {} {} {} {}]", self.e, self.a, self.v, self.tx, self.added)
    }
}

// ------------- Index -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Index {
    Aevt,
    Eavt,
    Avet,
    Vaet,
}
impl Index {
    pub fn as_str(&self) -> &'static str {
        match self {
            Index::Aevt => "aevt",
            Index::Eavt => "eavt",
            Index::Avet => "avet",
            Index::Vaet => "vaet",
        }
    }
}
impl FromStr for Index {
    type Err = DatorestError;
    fn from_str(s: &str) -> Result<Index> {
        match s {
            "aevt" => Ok(Index::Aevt),
            "eavt" => Ok(Index::Eavt),
            "avet" => Ok(Index::Avet),
            "vaet" => Ok(Index::Vaet),
            other => Err(DatorestError::InvalidArgument(format!("non-existent index: {}", other))),
        }
    }
}
impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
