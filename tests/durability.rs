//! # Durability Integration Tests
//!
//! File-backed databases: reopen after close, reopen without close,
//! rolled-back work staying absent, index rebuild, checkpoints, torn WAL
//! tails and sync-mode configuration.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use emberdb::{params, Database, DbError, ErrorKind, SyncMode, Value};
use tempfile::{tempdir, TempDir};

fn create_test_db() -> (TempDir, Database) {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    db.exec(
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL, score FLOAT);
         CREATE INDEX notes_score ON notes(score);",
    )
    .unwrap();
    (dir, db)
}

fn open(path: &Path) -> Database {
    Database::open(path.to_str().unwrap()).unwrap()
}

fn snapshot(db: &Database) -> Vec<Vec<Value>> {
    db.query_raw("SELECT id, body, score FROM notes ORDER BY id", ())
        .unwrap()
        .rows
}

fn wal_size(db: &Database) -> i64 {
    db.query_one("PRAGMA wal_size", ())
        .unwrap()
        .unwrap()
        .get_i64("wal_size")
        .unwrap()
}

mod reopen {
    use super::*;

    #[test]
    fn committed_rows_survive_close() {
        let (dir, db) = create_test_db();
        for i in 0..20 {
            db.execute(
                "INSERT INTO notes VALUES ($1, $2, $3)",
                params![i, format!("note {}", i), i as f64 / 2.0],
            )
            .unwrap();
        }
        db.execute("UPDATE notes SET body = 'edited' WHERE id = 3", ()).unwrap();
        db.execute("DELETE FROM notes WHERE id >= 15", ()).unwrap();
        let before = snapshot(&db);
        db.close().unwrap();

        let db = open(dir.path());
        assert_eq!(snapshot(&db), before);
        assert_eq!(
            db.query_raw("SHOW TABLES", ()).unwrap().rows,
            vec![vec![Value::Text("notes".into())]]
        );
    }

    #[test]
    fn rolled_back_work_is_absent_after_reopen() {
        let (dir, db) = create_test_db();
        db.execute("INSERT INTO notes VALUES (1, 'kept', 1.0)", ()).unwrap();
        {
            let mut tx = db.begin().unwrap();
            tx.execute("INSERT INTO notes VALUES (2, 'discarded', 2.0)", ()).unwrap();
            tx.execute("UPDATE notes SET body = 'changed' WHERE id = 1", ()).unwrap();
            tx.rollback().unwrap();
        }
        {
            let mut tx = db.begin().unwrap();
            tx.execute("INSERT INTO notes VALUES (3, 'committed', 3.0)", ()).unwrap();
            tx.commit().unwrap();
        }
        db.close().unwrap();

        let db = open(dir.path());
        assert_eq!(
            snapshot(&db),
            vec![
                vec![Value::Integer(1), Value::Text("kept".into()), Value::Float(1.0)],
                vec![Value::Integer(3), Value::Text("committed".into()), Value::Float(3.0)],
            ]
        );
    }

    #[test]
    fn wal_alone_recovers_without_clean_close() {
        let (dir, db) = create_test_db();
        db.execute("INSERT INTO notes VALUES (1, 'one', 0.5), (2, 'two', 1.5)", ()).unwrap();
        db.execute("DELETE FROM notes WHERE id = 1", ()).unwrap();
        let before = snapshot(&db);
        // No close and no Drop: nothing but the WAL reaches disk.
        std::mem::forget(db);

        let db = open(dir.path());
        assert_eq!(snapshot(&db), before);
    }

    #[test]
    fn indexes_are_rebuilt_and_used() {
        let (dir, db) = create_test_db();
        db.execute("INSERT INTO notes VALUES (1, 'a', 9.0), (2, 'b', 1.0), (3, 'c', 5.0)", ())
            .unwrap();
        db.close().unwrap();

        let db = open(dir.path());
        let plan: Vec<String> = db
            .query_raw("EXPLAIN SELECT id FROM notes WHERE score > 4.0", ())
            .unwrap()
            .rows
            .into_iter()
            .map(|r| r[0].to_string())
            .collect();
        assert!(plan.join("\n").contains("using notes_score"));
        let ids = db
            .query_raw("SELECT id FROM notes WHERE score > 4.0 ORDER BY score", ())
            .unwrap()
            .rows;
        assert_eq!(ids, vec![vec![Value::Integer(3)], vec![Value::Integer(1)]]);

        let err = db.execute("INSERT INTO notes VALUES (1, 'dup', 0.0)", ()).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
    }

    #[test]
    fn dropped_table_stays_dropped() {
        let (dir, db) = create_test_db();
        db.execute("CREATE TABLE scratch (id INTEGER)", ()).unwrap();
        db.execute("INSERT INTO scratch VALUES (1)", ()).unwrap();
        db.execute("DROP TABLE scratch", ()).unwrap();
        db.close().unwrap();

        let db = open(dir.path());
        assert!(db.query("SELECT * FROM scratch", ()).is_err());
        db.execute("CREATE TABLE scratch (id INTEGER)", ()).unwrap();
        assert!(db.query("SELECT * FROM scratch", ()).unwrap().is_empty());
    }

    #[test]
    fn row_ids_are_not_reused_after_reopen() {
        let (dir, db) = create_test_db();
        db.execute("INSERT INTO notes VALUES (1, 'a', 0.0), (2, 'b', 0.0)", ()).unwrap();
        let last = db
            .query_one("SELECT MAX(rowid) AS r FROM notes", ())
            .unwrap()
            .unwrap()
            .get_i64("r")
            .unwrap();
        db.close().unwrap();

        let db = open(dir.path());
        db.execute("INSERT INTO notes VALUES (3, 'c', 0.0)", ()).unwrap();
        let fresh = db
            .query_one("SELECT rowid AS r FROM notes WHERE id = 3", ())
            .unwrap()
            .unwrap()
            .get_i64("r")
            .unwrap();
        assert!(fresh > last);
    }
}

mod checkpoint {
    use super::*;

    #[test]
    fn checkpoint_truncates_wal_and_keeps_data() {
        let (dir, db) = create_test_db();
        db.execute("INSERT INTO notes VALUES (1, 'x', 1.0)", ()).unwrap();
        assert!(wal_size(&db) > 0);

        let folded = db
            .query_one("PRAGMA wal_checkpoint", ())
            .unwrap()
            .unwrap()
            .get_i64("wal_checkpoint")
            .unwrap();
        assert!(folded > 0);
        assert_eq!(wal_size(&db), 0);
        assert!(dir.path().join("snapshot.edb").exists());

        db.execute("INSERT INTO notes VALUES (2, 'y', 2.0)", ()).unwrap();
        let before = snapshot(&db);
        db.close().unwrap();

        let db = open(dir.path());
        assert_eq!(snapshot(&db), before);
    }

    #[test]
    fn small_threshold_checkpoints_automatically() {
        let dir = tempdir().unwrap();
        let db = Database::builder()
            .path(dir.path())
            .checkpoint_threshold(256)
            .open()
            .unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, body TEXT)", ()).unwrap();
        for i in 0..50 {
            db.execute("INSERT INTO t VALUES ($1, 'some padding text')", params![i]).unwrap();
        }
        assert!(wal_size(&db) < 256 + 512);
        db.close().unwrap();

        let db = open(dir.path());
        let n = db.query_one("SELECT COUNT(*) AS n FROM t", ()).unwrap().unwrap();
        assert_eq!(n.get_i64("n").unwrap(), 50);
    }

    #[test]
    fn in_memory_checkpoint_is_a_no_op() {
        let db = Database::open_in_memory().unwrap();
        db.checkpoint().unwrap();
        assert_eq!(wal_size(&db), 0);
    }
}

mod torn_tail {
    use super::*;

    #[test]
    fn garbage_after_last_frame_is_discarded() {
        let (dir, db) = create_test_db();
        db.execute("INSERT INTO notes VALUES (1, 'survivor', 1.0)", ()).unwrap();
        let before = snapshot(&db);
        std::mem::forget(db);

        let mut wal = OpenOptions::new()
            .append(true)
            .open(dir.path().join("wal.log"))
            .unwrap();
        wal.write_all(&[0xAB; 45]).unwrap();
        drop(wal);

        let db = open(dir.path());
        assert_eq!(snapshot(&db), before);
        db.execute("INSERT INTO notes VALUES (2, 'after recovery', 2.0)", ()).unwrap();
        db.close().unwrap();

        let db = open(dir.path());
        assert_eq!(snapshot(&db).len(), 2);
    }

    #[test]
    fn truncated_last_frame_loses_only_that_commit() {
        let (dir, db) = create_test_db();
        db.execute("INSERT INTO notes VALUES (1, 'first', 1.0)", ()).unwrap();
        db.execute("INSERT INTO notes VALUES (2, 'second', 2.0)", ()).unwrap();
        std::mem::forget(db);

        let path = dir.path().join("wal.log");
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();
        drop(file);

        let db = open(dir.path());
        let rows = snapshot(&db);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Value::Text("first".into()));
    }
}

mod configuration {
    use super::*;

    #[test]
    fn dsn_options_set_sync_mode() {
        let dir = tempdir().unwrap();
        let dsn = format!("file://{}?sync=normal", dir.path().display());
        let db = Database::open(&dsn).unwrap();
        assert_eq!(db.config().sync_mode, SyncMode::Normal);
        assert_eq!(db.path(), Some(dir.path()));
    }

    #[test]
    fn unknown_dsn_option_is_rejected() {
        let dir = tempdir().unwrap();
        let dsn = format!("{}?turbo=yes", dir.path().display());
        assert!(Database::open(&dsn).is_err());
    }

    #[test]
    fn pragma_synchronous_round_trips() {
        let (dir, db) = create_test_db();
        let mode = |db: &Database, sql: &str| {
            db.query_one(sql, ())
                .unwrap()
                .unwrap()
                .get_str("synchronous")
                .unwrap()
                .to_string()
        };
        assert_eq!(mode(&db, "PRAGMA synchronous"), "FULL");
        assert_eq!(mode(&db, "PRAGMA synchronous = OFF"), "OFF");
        assert_eq!(db.config().sync_mode, SyncMode::Off);

        db.execute("INSERT INTO notes VALUES (1, 'buffered', 0.0)", ()).unwrap();
        db.close().unwrap();
        let db = open(dir.path());
        assert_eq!(snapshot(&db).len(), 1);
    }

    #[test]
    fn unknown_pragma_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.execute("PRAGMA page_size", ()).is_err());
        assert!(db.execute("PRAGMA wal_size = 3", ()).is_err());
    }

    #[test]
    fn closed_database_refuses_work() {
        let (_dir, db) = create_test_db();
        let other = db.clone();
        db.close().unwrap();
        let err = other.query("SELECT * FROM notes", ()).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::TransactionState));
        assert!(other.is_closed());
    }
}
