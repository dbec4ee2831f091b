//! # Value and Parameter Integration Tests
//!
//! Round trips for every column type, and binding of positional, anonymous
//! and named parameter markers.

use chrono::{Datelike, TimeZone, Timelike, Utc};
use emberdb::{named_params, params, Database, DbError, ErrorKind, Params, Value};

fn create_test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.execute(
        "CREATE TABLE samples (
             id INTEGER PRIMARY KEY,
             i INTEGER,
             f FLOAT,
             t TEXT,
             b BOOLEAN,
             ts TIMESTAMP,
             j JSON,
             v VECTOR(2)
         )",
        (),
    )
    .unwrap();
    db
}

mod round_trips {
    use super::*;

    #[test]
    fn every_kind_reads_back_as_written() {
        let db = create_test_db();
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap();
        db.execute(
            "INSERT INTO samples VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            params![1, i64::MAX, 2.5, "héllo", true, ts, serde_json::json!({"k": [1, 2]}), vec![1.0f32, -1.0]],
        )
        .unwrap();

        let row = db.query_one("SELECT * FROM samples", ()).unwrap().unwrap();
        assert_eq!(row.get_i64("i").unwrap(), i64::MAX);
        assert_eq!(row.get_f64("f").unwrap(), 2.5);
        assert_eq!(row.get_str("t").unwrap(), "héllo");
        assert!(row.get_bool("b").unwrap());
        assert_eq!(row.get_timestamp("ts").unwrap(), ts);
        assert_eq!(row.get_str("j").unwrap(), r#"{"k":[1,2]}"#);
        assert_eq!(row.get_vector("v").unwrap(), vec![1.0, -1.0]);
    }

    #[test]
    fn booleans_stay_booleans() {
        let db = create_test_db();
        db.execute("INSERT INTO samples (id, b) VALUES (1, $1), (2, FALSE)", params![true]).unwrap();
        let raw = db.query_raw("SELECT b FROM samples ORDER BY id", ()).unwrap();
        assert_eq!(raw.rows, vec![vec![Value::Boolean(true)], vec![Value::Boolean(false)]]);
        assert!(db.query_one("SELECT i FROM samples WHERE id = 1", ()).unwrap().unwrap().is_null("i").unwrap());
    }

    #[test]
    fn timestamps_normalize_to_utc() {
        let db = create_test_db();
        db.execute(
            "INSERT INTO samples (id, ts) VALUES (1, '2024-06-15T17:30:45+05:00')",
            (),
        )
        .unwrap();
        let ts = db
            .query_one("SELECT ts FROM samples", ())
            .unwrap()
            .unwrap()
            .get_timestamp("ts")
            .unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 6, 15));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (12, 30, 45));
    }

    #[test]
    fn json_text_is_canonicalized() {
        let db = create_test_db();
        db.execute(r#"INSERT INTO samples (id, j) VALUES (1, '{"b": 1, "a": "x"}')"#, ())
            .unwrap();
        let raw = db.query_raw("SELECT j FROM samples", ()).unwrap();
        assert_eq!(raw.rows[0][0], Value::Json(r#"{"a":"x","b":1}"#.into()));
        assert!(db
            .execute("INSERT INTO samples (id, j) VALUES (2, '{not json')", ())
            .is_err());
    }

    #[test]
    fn integers_widen_into_float_columns() {
        let db = create_test_db();
        db.execute("INSERT INTO samples (id, f) VALUES (1, 3)", ()).unwrap();
        let raw = db.query_raw("SELECT f FROM samples", ()).unwrap();
        assert_eq!(raw.rows[0][0], Value::Float(3.0));
    }

    #[test]
    fn uncoercible_values_are_type_errors() {
        let db = create_test_db();
        for sql in [
            "INSERT INTO samples (id, i) VALUES (1, 'twelve')",
            "INSERT INTO samples (id, b) VALUES (1, 7)",
            "INSERT INTO samples (id, ts) VALUES (1, 'yesterday')",
        ] {
            let err = db.execute(sql, ()).unwrap_err();
            assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Type), "{}", sql);
        }
    }

    #[test]
    fn not_null_violation_is_schema_error() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", ()).unwrap();
        db.execute("INSERT INTO t VALUES (1, 'a')", ()).unwrap();
        let err = db.execute("INSERT INTO t (id) VALUES (2)", ()).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
        let err = db.execute("UPDATE t SET name = NULL", ()).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
        assert_eq!(db.query("SELECT * FROM t WHERE name = 'a'", ()).unwrap().len(), 1);
    }

    #[test]
    fn null_primary_key_is_schema_error() {
        let db = Database::open_in_memory().unwrap();
        db.exec(
            "CREATE TABLE p (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE pair (a INTEGER, b INTEGER, PRIMARY KEY (a, b));
             INSERT INTO p VALUES (1, 'kept');",
        )
        .unwrap();

        for sql in [
            "INSERT INTO p VALUES (NULL, 'x')",
            "INSERT INTO p (name) VALUES ('y')",
            "UPDATE p SET id = NULL WHERE id = 1",
            "INSERT INTO pair VALUES (1, NULL)",
        ] {
            let err = db.execute(sql, ()).unwrap_err();
            assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema), "{}", sql);
        }

        let raw = db.query_raw("SELECT id, name FROM p", ()).unwrap();
        assert_eq!(raw.rows, vec![vec![Value::Integer(1), Value::Text("kept".into())]]);
        assert!(db.query("SELECT * FROM pair", ()).unwrap().is_empty());
    }
}

mod binding {
    use super::*;

    fn seeded() -> Database {
        let db = create_test_db();
        db.execute(
            "INSERT INTO samples (id, t) VALUES (1, 'one'), (2, 'two'), (3, 'three')",
            (),
        )
        .unwrap();
        db
    }

    fn names(db: &Database, sql: &str, params: Params) -> Vec<String> {
        db.query(sql, params)
            .unwrap()
            .iter()
            .map(|row| row.get_str("t").unwrap().to_string())
            .collect()
    }

    #[test]
    fn dollar_markers_bind_by_number() {
        let db = seeded();
        assert_eq!(
            names(&db, "SELECT t FROM samples WHERE id = $2 OR id = $1 ORDER BY id", params![3, 1]),
            vec!["one", "three"]
        );
    }

    #[test]
    fn question_marks_number_left_to_right() {
        let db = seeded();
        assert_eq!(
            names(&db, "SELECT t FROM samples WHERE id >= ? AND id < ? ORDER BY id", params![2, 4]),
            vec!["two", "three"]
        );
    }

    #[test]
    fn wrong_positional_count_is_an_error() {
        let db = seeded();
        assert!(db.query("SELECT t FROM samples WHERE id = $1", params![1, 2]).is_err());
        assert!(db.query("SELECT t FROM samples WHERE id = $1", ()).is_err());
    }

    #[test]
    fn named_markers_bind_bare_keys() {
        let db = seeded();
        assert_eq!(
            names(&db, "SELECT t FROM samples WHERE id = :id", named_params! { "id" => 2 }),
            vec!["two"]
        );
        assert_eq!(
            names(&db, "SELECT t FROM samples WHERE t = @name", named_params! { "name" => "three" }),
            vec!["three"]
        );
    }

    #[test]
    fn named_keys_may_carry_the_marker_sigil() {
        let db = seeded();
        assert_eq!(
            names(&db, "SELECT t FROM samples WHERE id = :id", named_params! { ":id" => 1 }),
            vec!["one"]
        );
        assert!(db
            .query("SELECT t FROM samples WHERE id = :id", named_params! { "@id" => 1 })
            .is_err());
        assert!(db
            .query("SELECT t FROM samples WHERE id = :id", named_params! { "ID" => 1 })
            .is_err());
    }

    #[test]
    fn repeated_named_marker_binds_once() {
        let db = seeded();
        assert_eq!(
            names(
                &db,
                "SELECT t FROM samples WHERE id = :n OR LENGTH(t) = :n ORDER BY id",
                named_params! { "n" => 3 }
            ),
            vec!["one", "two", "three"]
        );
    }

    #[test]
    fn missing_named_binding_is_an_error() {
        let db = seeded();
        let err = db
            .query("SELECT t FROM samples WHERE id = :id", named_params! { "other" => 1 })
            .unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Type));
    }

    #[test]
    fn params_in_dml_and_limit() {
        let db = seeded();
        let n = db
            .execute("UPDATE samples SET t = :t WHERE id > :min", named_params! { "t" => "big", "min" => 1 })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            names(&db, "SELECT t FROM samples ORDER BY id LIMIT $1", params![1]),
            vec!["one"]
        );
    }
}

mod parsing {
    use super::*;

    #[test]
    fn malformed_sql_is_a_parse_error() {
        let db = create_test_db();
        for sql in ["SELEC 1", "SELECT * FROM", "INSERT INTO samples VALUES (1", "SELECT 'open"] {
            let err = db.query(sql, ()).unwrap_err();
            assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Parse), "{}", sql);
        }
    }

    #[test]
    fn unknown_names_are_schema_errors() {
        let db = create_test_db();
        for sql in ["SELECT * FROM nowhere", "SELECT missing FROM samples"] {
            let err = db.query(sql, ()).unwrap_err();
            assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema), "{}", sql);
        }
    }

    #[test]
    fn scripts_split_on_semicolons_outside_strings() {
        let db = create_test_db();
        db.exec(
            "INSERT INTO samples (id, t) VALUES (1, 'a;b'); -- comment; with semicolon
             /* block ; */ INSERT INTO samples (id, t) VALUES (2, 'c');",
        )
        .unwrap();
        let raw = db.query_raw("SELECT t FROM samples ORDER BY id", ()).unwrap();
        assert_eq!(
            raw.rows,
            vec![vec![Value::Text("a;b".into())], vec![Value::Text("c".into())]]
        );
    }
}
