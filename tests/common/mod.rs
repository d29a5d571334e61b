#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use datorest::connection::{Connection, Method, Response};
use datorest::database::Database;
use datorest::edn::{self, Edn};
use datorest::schema::Schema;

#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub fields: Vec<(String, String)>,
}

impl Request {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// Records every request and answers with whatever was queued, or an empty
/// 200 once the queue has run dry.
#[derive(Default)]
pub struct StubConnection {
    requests: Mutex<Vec<Request>>,
    replies: Mutex<VecDeque<Response>>,
}

impl StubConnection {
    pub fn reply(&self, status: u16, body: &str) {
        let body = if body.trim().is_empty() {
            Edn::Nil
        } else {
            edn::parse(body).unwrap_or_else(|_| Edn::String(body.to_string()))
        };
        self.replies.lock().unwrap().push_back(Response { status, body });
    }
    pub fn ok(&self, body: &str) {
        self.reply(200, body);
    }
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
    pub fn last(&self) -> Request {
        self.requests.lock().unwrap().last().cloned().expect("no request was made")
    }
}

impl Connection for StubConnection {
    fn request(&self, method: Method, path: &str, fields: &[(String, String)]) -> datorest::Result<Response> {
        self.requests.lock().unwrap().push(Request {
            method,
            path: path.to_string(),
            fields: fields.to_vec(),
        });
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or(Response { status: 200, body: Edn::Nil }))
    }
}

pub fn database() -> (Arc<StubConnection>, Database) {
    let stub = Arc::new(StubConnection::default());
    let db = Database::new(stub.clone(), "mem", "test");
    (stub, db)
}

pub fn database_with(schema: Schema) -> (Arc<StubConnection>, Database) {
    let stub = Arc::new(StubConnection::default());
    let db = Database::with_schema(stub.clone(), "mem", "test", schema);
    (stub, db)
}
