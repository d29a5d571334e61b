mod common;

use datorest::construct::Index;
use datorest::datatype::Keyword;
use datorest::error::DatorestError;

fn chunk(from: i64, n: i64) -> String {
    let facts: Vec<String> = (from..from + n)
        .map(|e| format!("{{:e {} :a :person/name :v \"p{}\" :tx 9 :added true}}", e, e))
        .collect();
    format!("[{}]", facts.join(" "))
}

#[test]
fn chunked_scan_stops_at_the_limit() {
    let (stub, db) = common::database();
    stub.ok(&chunk(1, 2));
    stub.ok(&chunk(3, 2));
    stub.ok(&chunk(5, 1));
    stub.ok("[]");
    let facts: Vec<_> = db
        .datoms("aevt")
        .expect("index ok")
        .chunk(2)
        .limit(5)
        .collect::<Result<_, _>>()
        .expect("scan ok");
    assert_eq!(facts.len(), 5);
    assert_eq!(facts.iter().map(|f| f.e).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

    let requests = stub.requests();
    assert_eq!(requests.len(), 4);
    let offsets: Vec<&str> = requests.iter().filter_map(|r| r.field("offset")).collect();
    assert_eq!(offsets, vec!["0", "2", "4", "6"]);
    assert!(requests.iter().all(|r| r.path == "/data/mem/test/-/datoms"));
    assert!(requests.iter().all(|r| r.field("index") == Some("aevt") && r.field("limit") == Some("2")));
}

#[test]
fn full_chunks_are_cut_at_the_limit() {
    let (stub, db) = common::database();
    for from in 0..10 {
        stub.ok(&chunk(from * 2 + 1, 2));
    }
    let facts: Vec<_> = db
        .datoms("aevt")
        .expect("index ok")
        .chunk(2)
        .limit(5)
        .collect::<Result<_, _>>()
        .expect("scan ok");
    assert_eq!(facts.iter().map(|f| f.e).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    let offsets: Vec<String> = stub
        .requests()
        .iter()
        .filter_map(|r| r.field("offset").map(str::to_string))
        .collect();
    assert_eq!(offsets, vec!["0", "2", "4", "6"]);
}

#[test]
fn limit_counts_from_the_starting_offset() {
    let (stub, db) = common::database();
    stub.ok(&chunk(5, 2));
    stub.ok(&chunk(7, 2));
    let facts: Vec<_> = db
        .datoms("aevt")
        .expect("index ok")
        .offset(4)
        .chunk(2)
        .limit(5)
        .collect::<Result<_, _>>()
        .expect("scan ok");
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].e, 5);
    assert_eq!(stub.count(), 2);
}

#[test]
fn unknown_index_fails_before_any_request() {
    let (stub, db) = common::database();
    assert!(matches!(db.datoms("teav"), Err(DatorestError::InvalidArgument(_))));
    assert_eq!(stub.count(), 0);
}

#[test]
fn nothing_is_fetched_until_pulled() {
    let (stub, db) = common::database();
    let mut scan = db.datoms("eavt").expect("index ok").chunk(2);
    assert_eq!(stub.count(), 0);
    stub.ok(&chunk(1, 2));
    stub.ok(&chunk(3, 2));
    stub.ok("[]");
    assert_eq!(scan.next().expect("a fact").expect("fact ok").e, 1);
    assert_eq!(stub.count(), 1);
    assert_eq!(scan.current_offset(), 2);
    assert_eq!(scan.by_ref().count(), 3);
    // without a limit only the empty chunk ends the scan
    assert_eq!(scan.requests(), 3);
    assert!(scan.next().is_none());
}

#[test]
fn empty_index_takes_one_request() {
    let (stub, db) = common::database();
    stub.ok("[]");
    let scan = db.datoms("avet").expect("index ok");
    assert_eq!(scan.index(), Index::Avet);
    assert_eq!(scan.count(), 0);
    assert_eq!(stub.count(), 1);
    assert_eq!(stub.last().field("limit"), Some("100"));
}

#[test]
fn filters_are_sent() {
    let (stub, db) = common::database();
    stub.ok("[]");
    let scan = db
        .datoms("eavt")
        .expect("index ok")
        .entity(17)
        .attribute(Keyword::new("person/name").expect("keyword ok"))
        .value("Ann")
        .as_of(1000)
        .since(900)
        .history(true)
        .offset(10)
        .chunk(5);
    assert_eq!(scan.count(), 0);
    let request = stub.last();
    assert_eq!(request.field("e"), Some("17"));
    assert_eq!(request.field("a"), Some(":person/name"));
    assert_eq!(request.field("v"), Some("\"Ann\""));
    assert_eq!(request.field("as-of"), Some("1000"));
    assert_eq!(request.field("since"), Some("900"));
    assert_eq!(request.field("history"), Some("true"));
    assert_eq!(request.field("offset"), Some("10"));
    assert_eq!(request.field("limit"), Some("5"));
    assert_eq!(request.field("start"), Some(""));
}

#[test]
fn a_failed_chunk_ends_the_scan() {
    let (stub, db) = common::database();
    stub.ok(&chunk(1, 1));
    stub.reply(503, "");
    let mut scan = db.datoms("aevt").expect("index ok").chunk(1);
    assert!(scan.next().expect("a fact").is_ok());
    assert!(matches!(scan.next(), Some(Err(DatorestError::Transport { status: 503, .. }))));
    assert!(scan.next().is_none());
    assert_eq!(stub.count(), 2);
}

#[test]
fn malformed_facts_are_reported() {
    let (stub, db) = common::database();
    stub.ok("[{:e 1 :a :person/name :tx 9}]");
    let mut scan = db.datoms("aevt").expect("index ok");
    assert!(matches!(scan.next(), Some(Err(DatorestError::UnexpectedResponse(_)))));
}
