use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, warn};

// our own stuff that we need
use crate::connection::{Connection, HttpConnection, Method};
use crate::construct::{Eid, Entity, Index, Version};
use crate::datatype::{Keyword, Value};
use crate::edn::Edn;
use crate::error::{DatorestError, Result};
use crate::query::Query;
use crate::scan::FactScan;
use crate::schema::Schema;
use crate::settings::Settings;
use crate::transaction::Transaction;

const SUCCESS: &[u16] = &[200, 201];

struct DatabaseInner {
    connection: Arc<dyn Connection>,
    store: String,
    name: String,
    schema: Option<Schema>,
    // latest transaction version seen through this database
    latest: Mutex<Version>,
}

/// One remote database. Cloning is cheap and clones share the connection.
#[derive(Clone)]
pub struct Database(Arc<DatabaseInner>);

impl Database {
    pub fn new(connection: Arc<dyn Connection>, store: &str, name: &str) -> Self {
        Self::build(connection, store, name, None)
    }
    pub fn with_schema(connection: Arc<dyn Connection>, store: &str, name: &str, schema: Schema) -> Self {
        Self::build(connection, store, name, Some(schema))
    }
    fn build(connection: Arc<dyn Connection>, store: &str, name: &str, schema: Option<Schema>) -> Self {
        Self(Arc::new(DatabaseInner {
            connection,
            store: store.to_string(),
            name: name.to_string(),
            schema,
            latest: Mutex::new(0),
        }))
    }
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let connection = HttpConnection::from_settings(settings)?;
        Ok(Self::new(Arc::new(connection), &settings.store, &settings.db))
    }
    // functions to access what the database was set up with
    pub fn store(&self) -> &str {
        &self.0.store
    }
    pub fn name(&self) -> &str {
        &self.0.name
    }
    pub fn alias(&self) -> String {
        format!("{}/{}", self.0.store, self.0.name)
    }
    pub fn schema(&self) -> Option<&Schema> {
        self.0.schema.as_ref()
    }
    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.0.connection)
    }
    pub fn latest_version(&self) -> Version {
        *self.0.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub(crate) fn observe(&self, version: Version) {
        let mut latest = self.0.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if version > *latest {
            *latest = version;
        }
    }
    fn uri_store(&self) -> String {
        format!("/data/{}/", self.0.store)
    }
    pub(crate) fn uri_db(&self) -> String {
        format!("/data/{}/{}/", self.0.store, self.0.name)
    }

    // --------- requests ---------
    pub(crate) fn rest(&self, method: Method, path: &str, fields: Vec<(&str, String)>, status_codes: &[u16]) -> Result<Edn> {
        let fields: Vec<(String, String)> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let started = Instant::now();
        let response = self.0.connection.request(method, path, &fields)?;
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        if !status_codes.contains(&response.status) {
            let body = match response.body {
                Edn::String(text) => text,
                other => other.to_string(),
            };
            warn!(%method, path, status = response.status, ms, "request failed");
            return Err(DatorestError::Transport { status: response.status, body });
        }
        debug!(%method, path, status = response.status, ms, "request complete");
        Ok(response.body)
    }
    /// Creates the database. Already existing databases are fine too.
    pub fn create(&self) -> Result<bool> {
        self.rest(Method::Post, &self.uri_store(), vec![("db-name", self.0.name.clone())], SUCCESS)?;
        Ok(true)
    }
    /// The current database state, e.g. `{:db/alias "mem/test" :basis-t 1000}`.
    pub fn info(&self) -> Result<Edn> {
        self.rest(Method::Get, &format!("{}-/", self.uri_db()), Vec::new(), SUCCESS)
    }
    /// Transacts raw statements as one request and returns the raw report.
    pub fn transact<S: AsRef<str>>(&self, statements: &[S]) -> Result<Edn> {
        let body: Vec<&str> = statements.iter().map(AsRef::as_ref).collect();
        let tx_data = format!("[ {} ]", body.join(" "));
        self.rest(Method::Post, &self.uri_db(), vec![("tx-data", tx_data)], SUCCESS)
    }
    pub fn tx(&self) -> Transaction {
        Transaction::new(self.clone())
    }
    /// Installs every attribute and enum of the attached schema in one go.
    pub fn tx_schema(&self) -> Result<Edn> {
        let schema = self
            .schema()
            .ok_or_else(|| DatorestError::InvalidState("no schema attached to the database".into()))?;
        self.transact(&schema.statements())
    }
    pub fn fetch_entity(&self, eid: Eid) -> Result<Edn> {
        let path = format!("{}-/entity", self.uri_db());
        self.rest(Method::Get, &path, vec![("e", eid.to_string())], SUCCESS)
    }
    /// A handle on an existing entity. Nothing is fetched until an attribute
    /// is read.
    pub fn entity(&self, eid: Eid) -> Entity {
        Entity::new(self.clone(), eid, Some(self.latest_version()), None)
    }
    pub fn retract(&self, eid: Eid, attribute: &str, value: impl Into<Value>) -> Result<Edn> {
        let attribute = Keyword::new(attribute)?;
        let value = value.into();
        let statement = format!("[:db/retract {} {} {}]", eid, attribute, value);
        let report = self.transact(&[statement])?;
        debug!(eid, %attribute, %value, "retracted");
        Ok(report)
    }
    /// A lazy scan over one of the four indexes. Fails before any request is
    /// made when the index name is unknown.
    pub fn datoms(&self, index: &str) -> Result<FactScan> {
        let index = Index::from_str(index)?;
        Ok(FactScan::new(self.clone(), index))
    }
    /// Runs query text with already encoded inputs.
    pub fn q(&self, query: &str, inputs: &[String], limit: Option<usize>, offset: Option<usize>, history: bool) -> Result<Vec<Vec<Edn>>> {
        let query = query.trim();
        let query = if query.starts_with('[') { query.to_string() } else { format!("[ {} ]", query) };
        let alias = Edn::String(self.alias());
        let args = format!(
            "[{{:db/alias {}{}}} {}]",
            alias,
            if history { " :history true" } else { "" },
            inputs.join(" ")
        );
        let fields = vec![
            ("q", query),
            ("args", args),
            ("offset", offset.map(|o| o.to_string()).unwrap_or_default()),
            ("limit", limit.map(|l| l.to_string()).unwrap_or_default()),
        ];
        let body = self.rest(Method::Get, "/api/query", fields, SUCCESS)?;
        let rows = body
            .as_seq()
            .ok_or_else(|| DatorestError::UnexpectedResponse(format!("query result is not a collection: {}", body)))?;
        rows.iter()
            .map(|row| {
                row.as_seq()
                    .map(|values| values.to_vec())
                    .ok_or_else(|| DatorestError::UnexpectedResponse(format!("query row is not a collection: {}", row)))
            })
            .collect()
    }
    /// New query builder, e.g. `db.find("?e ?n")`.
    pub fn find(&self, variables: &str) -> Query {
        Query::new(self.clone()).find(variables)
    }
    /// New query builder that returns every variable of its clauses.
    pub fn find_all(&self) -> Query {
        Query::new(self.clone())
    }
}
