mod common;

use std::collections::HashSet;

use datorest::connection::Method;
use datorest::datatype::Value;
use datorest::error::DatorestError;

const REPORT: &str = "{:db-before {:basis-t 1000} :db-after {:basis-t 1001} \
    :tx-data [{:e 13194139534313 :a 50 :v 1 :tx 9 :added true}] \
    :tempids {-1 100 -2 101}}";

#[test]
fn person_and_city_resolve_together() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    let p = tx.write(None, "person/name", "Ann").expect("write ok");
    let c = tx.write(None, "city/name", "NYC").expect("write ok");
    tx.write(Some(&p), "person/city", &c).expect("write ok");
    assert_eq!(p.eid(), -1);
    assert_eq!(c.eid(), -2);

    stub.ok(REPORT);
    let report = tx.submit().expect("submit ok");
    assert_eq!(report.version, 9);
    assert_eq!(p.eid(), 100);
    assert_eq!(c.eid(), 101);
    assert_eq!(p.version(), Some(9));
    assert_eq!(c.version(), Some(9));

    // one request, one literal per entity, person first
    assert_eq!(stub.count(), 1);
    let request = stub.last();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path, "/data/mem/test/");
    assert_eq!(
        request.field("tx-data"),
        Some(
            "[ {:db/id #db/id[:db.part/user -1] :person/name \"Ann\" :person/city #db/id[:db.part/user -2]} \
             {:db/id #db/id[:db.part/user -2] :city/name \"NYC\"} ]"
        )
    );
}

#[test]
fn clones_observe_resolution() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    let p = tx.write(None, "person/name", "Ann").expect("write ok");
    let held = vec![p.clone(), p.clone()];
    stub.ok("{:tx-data [{:e 100 :a 50 :v \"Ann\" :tx 9 :added true}] :tempids {-1 100}}");
    tx.submit().expect("submit ok");
    assert!(held.iter().all(|h| h.eid() == 100 && h.version() == Some(9)));
    assert!(held[0].same_handle(&p));
}

#[test]
fn every_placeholder_gets_a_unique_id() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    let mut people = Vec::new();
    for name in ["Ann", "Bo", "Cy", "Di", "Ed"] {
        people.push(tx.write(None, "person/name", name).expect("write ok"));
    }
    tx.write(Some(&people[0]), "person/friend", &people[4]).expect("write ok");
    assert_eq!(tx.placeholders().len(), 5);
    stub.ok("{:tx-data [{:tx 12}] :tempids {-5 204 -3 202 -1 200 -4 203 -2 201}}");
    tx.submit().expect("submit ok");
    let ids: HashSet<i64> = people.iter().map(|p| p.eid()).collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.iter().all(|id| *id >= 0));
    // keyed, not positional
    assert_eq!(people[2].eid(), 202);
    assert_eq!(people[4].eid(), 204);
}

#[test]
fn submit_twice_fails_without_a_request() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    tx.write(None, "person/name", "Ann").expect("write ok");
    stub.ok(REPORT);
    tx.submit().expect("submit ok");
    assert!(tx.is_submitted());
    assert!(tx.report().is_some());
    assert!(matches!(tx.submit(), Err(DatorestError::AlreadySubmitted)));
    assert!(matches!(
        tx.write(None, "person/name", "Bo"),
        Err(DatorestError::AlreadySubmitted)
    ));
    assert_eq!(stub.count(), 1);
}

#[test]
fn failed_submit_is_terminal() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    let p = tx.write(None, "person/name", "Ann").expect("write ok");
    stub.reply(500, "server on fire");
    match tx.submit() {
        Err(DatorestError::Transport { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "server on fire");
        }
        other => panic!("expected a transport error, got {:?}", other.map(|r| r.version)),
    }
    assert!(tx.is_submitted());
    assert!(tx.report().is_none());
    assert_eq!(p.eid(), -1);
    assert!(matches!(tx.submit(), Err(DatorestError::AlreadySubmitted)));
    assert_eq!(stub.count(), 1);
}

#[test]
fn missing_tempid_leaves_handles_alone() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    let p = tx.write(None, "person/name", "Ann").expect("write ok");
    let c = tx.write(None, "city/name", "NYC").expect("write ok");
    stub.ok("{:tx-data [{:tx 9}] :tempids {-1 100}}");
    assert!(matches!(tx.submit(), Err(DatorestError::Resolution(_))));
    assert_eq!(p.eid(), -1);
    assert_eq!(c.eid(), -2);
    assert_eq!(db.latest_version(), 0);
}

#[test]
fn version_falls_back_to_basis() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    let p = tx.write(None, "person/name", "Ann").expect("write ok");
    stub.ok("{:db-after {:basis-t 1001} :tempids {-1 5}}");
    assert_eq!(tx.submit().expect("submit ok").version, 1001);
    assert_eq!(p.version(), Some(1001));
    assert_eq!(db.latest_version(), 1001);
}

#[test]
fn absent_values_are_skipped() {
    let (_stub, db) = common::database();
    let mut tx = db.tx();
    let p = tx.write(None, "person/nick", None::<&str>).expect("write ok");
    assert!(tx.is_empty());
    // false and zero are values
    tx.write(Some(&p), "person/active", false).expect("write ok");
    tx.write(Some(&p), "person/age", 0).expect("write ok");
    assert_eq!(tx.len(), 2);
    assert_eq!(
        tx.tx_data(),
        "[ {:db/id #db/id[:db.part/user -1] :person/active false :person/age 0} ]"
    );
}

#[test]
fn many_values_share_one_literal() {
    let (_stub, db) = common::database();
    let mut tx = db.tx();
    tx.write(None, "person/alias", vec!["a", "b"]).expect("write ok");
    assert_eq!(tx.len(), 2);
    assert_eq!(
        tx.tx_data(),
        "[ {:db/id #db/id[:db.part/user -1] :person/alias [\"a\" \"b\"]} ]"
    );
}

#[test]
fn namespaced_and_positional_writes() {
    let (_stub, db) = common::database();
    let mut tx = db.tx();
    let p = tx
        .write_ns(None, "person/", [("name", Value::from("Ann")), ("age", Value::from(25))])
        .expect("write ok");
    tx.add(
        Some(&p),
        vec![
            Value::from(":person/email"),
            Value::from("ann@example.com"),
            Value::from("address/"),
            Value::from(vec![Value::from("street"), Value::from("Main St")]),
        ],
    )
    .expect("add ok");
    assert_eq!(
        tx.tx_data(),
        "[ {:db/id #db/id[:db.part/user -1] :person/name \"Ann\" :person/age 25 \
         :person/email \"ann@example.com\" :address/street \"Main St\"} ]"
    );
}

#[test]
fn odd_positional_list_is_rejected() {
    let (_stub, db) = common::database();
    let mut tx = db.tx();
    let result = tx.add(None, vec![Value::from("person/name"), Value::from("Ann"), Value::from("person/age")]);
    assert!(matches!(result, Err(DatorestError::InvalidArgument(_))));
    assert!(tx.is_empty());
}

#[test]
fn existing_entities_are_rebound_and_stamped() {
    let (stub, db) = common::database();
    let fetched = db.entity(42);
    let mut tx = db.tx();
    let bound = tx.write(Some(&fetched), "person/name", "Ann").expect("write ok");
    let again = tx.write(Some(&fetched), "person/age", 30).expect("write ok");
    assert_eq!(bound.eid(), 42);
    assert!(!bound.same_handle(&fetched));
    assert!(bound.same_handle(&again));
    assert_eq!(bound.origin(), Some(tx.id()));
    assert_eq!(tx.existing().len(), 1);
    assert!(tx.placeholders().is_empty());
    assert_eq!(tx.tx_data(), "[ {:db/id 42 :person/name \"Ann\" :person/age 30} ]");

    stub.ok("{:tx-data [{:e 42 :a 50 :v \"Ann\" :tx 9 :added true}] :tempids {}}");
    tx.submit().expect("submit ok");
    assert_eq!(bound.version(), Some(9));
    // the read-only handle keeps what it was fetched at
    assert_eq!(fetched.version(), Some(0));
}

#[test]
fn absent_writes_leave_existing_entities_unstamped() {
    let (stub, db) = common::database();
    let fetched = db.entity(42);
    let mut tx = db.tx();
    let bound = tx.write(Some(&fetched), "person/nick", None::<&str>).expect("write ok");
    assert_eq!(bound.eid(), 42);
    assert!(tx.existing().is_empty());
    assert!(tx.is_empty());
    // the same handle comes back for the id
    let again = tx.write(Some(&fetched), "person/nick", None::<&str>).expect("write ok");
    assert!(again.same_handle(&bound));

    let p = tx.write(None, "person/name", "Bo").expect("write ok");
    stub.ok("{:tx-data [{:tx 9}] :tempids {-1 100}}");
    tx.submit().expect("submit ok");
    assert_eq!(p.version(), Some(9));
    assert_eq!(bound.version(), Some(0));
}

#[test]
fn placeholders_inside_tuples_resolve() {
    let (stub, db) = common::database();
    let mut tx = db.tx();
    // nothing written about the city itself
    let city = tx.write(None, "city/name", None::<&str>).expect("write ok");
    let ann = tx.write(None, "person/visit", (&city, 2024)).expect("write ok");
    assert_eq!(tx.placeholders().len(), 2);
    assert!(tx.placeholders().iter().any(|e| e.same_handle(&city)));
    assert_eq!(
        tx.tx_data(),
        "[ {:db/id #db/id[:db.part/user -2] :person/visit [#db/id[:db.part/user -1] 2024]} ]"
    );

    stub.ok("{:tx-data [{:tx 9}] :tempids {-1 100 -2 101}}");
    tx.submit().expect("submit ok");
    assert_eq!(city.eid(), 100);
    assert_eq!(city.version(), Some(9));
    assert_eq!(ann.eid(), 101);
}

#[test]
fn placeholders_of_other_transactions_are_rejected() {
    let (_stub, db) = common::database();
    let mut first = db.tx();
    let foreign = first.write(None, "city/name", "NYC").expect("write ok");
    let mut second = db.tx();
    assert!(matches!(
        second.write(Some(&foreign), "city/name", "Oslo"),
        Err(DatorestError::InvalidArgument(_))
    ));
    assert!(matches!(
        second.write(None, "person/city", &foreign),
        Err(DatorestError::InvalidArgument(_))
    ));
    assert!(second.is_empty());
    assert!(second.placeholders().is_empty());
}

#[test]
fn resolved_values_are_written_as_ids() {
    let (_stub, db) = common::database();
    let city = db.entity(7);
    let mut tx = db.tx();
    tx.write(None, "person/city", &city).expect("write ok");
    assert_eq!(tx.tx_data(), "[ {:db/id #db/id[:db.part/user -1] :person/city 7} ]");
    assert!(tx.existing().is_empty());
}

#[test]
fn bad_attribute_names_are_rejected() {
    let (_stub, db) = common::database();
    let mut tx = db.tx();
    assert!(matches!(tx.write(None, "", "Ann"), Err(DatorestError::InvalidArgument(_))));
    assert!(tx.placeholders().is_empty());
    // nothing was minted, so the next placeholder is still -1
    assert_eq!(tx.write(None, "person/name", "Ann").expect("write ok").eid(), -1);
}
