//! Decoder Equivalence Tests
//!
//! The structured and streamed decoders must agree: the same logical batch
//! leaves the same final state and fails with the same error kind.

mod common;

use std::io::Cursor;
use std::mem::discriminant;

use litebridge::{BatchPayload, Database, Error};
use serde_json::{json, Value as Json};

type Rows = Vec<(String, Option<i64>)>;

fn apply_both(batch: &Json) -> (Result<(), Error>, Rows, Result<(), Error>, Rows) {
    let operations = batch.as_array().expect("batch is an array").clone();

    let (mut structured, _) = common::memory_db();
    let s = structured.run_batch(BatchPayload::Structured(&operations)).map(|_| ());

    let (mut streamed, _) = common::memory_db();
    let text = batch.to_string();
    let j = streamed.run_batch(BatchPayload::Streamed(&text)).map(|_| ());

    (s, common::rows(&structured), j, common::rows(&streamed))
}

fn assert_equivalent(batch: Json) {
    let (s, s_rows, j, j_rows) = apply_both(&batch);

    assert_eq!(s_rows, j_rows, "final state differs for {batch}");
    match (&s, &j) {
        (Ok(()), Ok(())) => {}
        (Err(a), Err(b)) => assert_eq!(
            discriminant(a),
            discriminant(b),
            "error kinds differ for {batch}: {a:?} vs {b:?}"
        ),
        _ => panic!("outcomes differ for {batch}: {s:?} vs {j:?}"),
    }
}

#[test]
fn successful_batches_agree() {
    assert_equivalent(json!([
        [0, "t", "INSERT INTO t(id, n) VALUES (?, ?)", [["a", 1], ["b", 2], ["c", null]]],
        [1, "t", "UPDATE t SET n = n * ? WHERE id = ?", [[10, "a"], [10, "b"]]],
        [2, "t", "DELETE FROM t WHERE id = ?", [["c"]]]
    ]));
}

#[test]
fn empty_shapes_agree() {
    assert_equivalent(json!([]));
    assert_equivalent(json!([[0, "t", "INSERT INTO t(id) VALUES (?)", []]]));
    assert_equivalent(json!([[0, "t", "not even sql", []]]));
}

#[test]
fn failures_agree() {
    let cases = vec![
        // compile
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [["a"]]], [0, "t", "INSERT INTO x VALUES (?)", [["b"]]]]),
        // arity
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [["a"], []]]]),
        // unsupported argument
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [[{"id": "a"}]]]]),
        // execution
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [["a"], ["a"]]]]),
        // shape
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [["a"]]], [0, "t"]]),
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", "not batches"]]),
        json!([[0, "t", 17, [["a"]]]]),
        // argument shape checked before compiling bad SQL
        json!([[0, "t", "bad sql", [[["nested"]]]]]),
        json!([[0, "t", "bad sql", ["scalar"]]]),
        // statements that would end the batch transaction
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [["a"]]], [0, "", "COMMIT", [[]]], [0, "t", "INSERT INTO t(id) VALUES (?)", [["b"], ["b"]]]]),
        json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [["x"]]], [0, "", "ROLLBACK", [[]]], [0, "t", "INSERT INTO t(id) VALUES (?)", [["y"]]]]),
    ];

    for case in cases {
        let (s, s_rows, j, j_rows) = apply_both(&case);
        assert!(s.is_err() && j.is_err(), "{case} should fail");
        assert!(s_rows.is_empty() && j_rows.is_empty(), "{case} left rows behind");
        assert_equivalent(case);
    }
}

#[test]
fn reader_payload_matches_str_payload() {
    let payload = r#"[[0, "t", "INSERT INTO t(id, n) VALUES (?, ?)", [["r", 1], ["s", 2]]]]"#;

    let (mut from_str, _) = common::memory_db();
    from_str.batch_json(payload).unwrap();

    let (mut from_reader, _) = common::memory_db();
    let stats = from_reader
        .batch_json_reader(Cursor::new(payload.as_bytes()))
        .unwrap();

    assert_eq!(stats.executions, 2);
    assert_eq!(common::rows(&from_str), common::rows(&from_reader));
}

#[test]
fn streamed_compiles_once_structured_reuses_cache() {
    let batch = json!([[0, "t", "INSERT INTO t(id) VALUES (?)", [["a"], ["b"], ["c"], ["d"]]]]);
    let operations = batch.as_array().unwrap().clone();

    let mut db = Database::open_in_memory().unwrap();
    db.execute(common::CREATE_T, &[]).unwrap();
    let structured = db.batch(&operations).unwrap();
    db.execute("DELETE FROM t", &[]).unwrap();
    let streamed = db.batch_json(&batch.to_string()).unwrap();

    assert_eq!(structured.compiled, 1);
    assert_eq!(structured.cache_hits, 3);
    assert_eq!(streamed.compiled, 1);
    assert_eq!(streamed.cache_hits, 0);
    assert_eq!(structured.executions, streamed.executions);
}
