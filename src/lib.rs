//! Datorest – a client for immutable fact databases spoken to over REST and EDN.
//!
//! The remote service stores *facts*: `(entity, attribute, value, tx)`
//! quadruples. This crate keeps the client side bookkeeping around them:
//! * An [`construct::Entity`] is a shared handle to a remote record. It may be a
//!   placeholder (negative tempid) that a transaction resolves in place.
//! * A [`transaction::Transaction`] batches writes into one request and maps the
//!   server's tempid assignments back onto the placeholder handles.
//! * A [`query::Query`] chains clauses and inputs and compiles them to query
//!   text plus positional arguments.
//! * A [`scan::FactScan`] lazily walks an index one chunk at a time.
//!
//! ## Modules
//! * [`construct`] – Identifiers, entity handles, facts and indexes.
//! * [`datatype`] – Keywords and the values that can be written.
//! * [`edn`] – The wire value model and its parser (grammar in `edn.pest`).
//! * [`connection`] – The transport trait plus the HTTP implementation.
//! * [`database`] – One remote database and the requests it issues.
//! * [`transaction`] – Write batching and tempid resolution.
//! * [`query`] – The query builder.
//! * [`scan`] – Chunked fact scans.
//! * [`schema`] – Attribute declarations.
//! * [`settings`] – Layered configuration.
//!
//! ## Quick Start
//! ```no_run
//! use datorest::{database::Database, settings::Settings};
//!
//! let db = Database::from_settings(&Settings::load(None)?)?;
//! let mut tx = db.tx();
//! let person = tx.write(None, "person/name", "Ann")?;
//! let city = tx.write(None, "city/name", "NYC")?;
//! tx.write(Some(&person), "person/city", &city)?;
//! tx.submit()?;
//!
//! let names = db.find("?n").clause("?e :person/name ?n").all()?;
//! println!("{} is entity {}, found {} names", "Ann", person.eid(), names.len());
//! # Ok::<(), datorest::error::DatorestError>(())
//! ```
//!
//! ## Logging
//! Requests are logged through `tracing`: failures at `warn`, commits at
//! `info`, every request at `debug`. Install a subscriber to see them.

pub mod connection;
pub mod construct;
pub mod database;
pub mod datatype;
pub mod edn;
pub mod error;
pub mod query;
pub mod scan;
pub mod schema;
pub mod settings;
pub mod transaction;

pub use construct::{Attr, Eid, Entity, Fact, Index, Version};
pub use database::Database;
pub use datatype::{Keyword, Value};
pub use edn::Edn;
pub use error::{DatorestError, Result};
pub use query::Query;
pub use transaction::{Transaction, TxReport};
