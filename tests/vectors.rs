//! # Vector Search Integration Tests
//!
//! `VECTOR(n)` columns, distance functions, exact k-nearest-neighbor
//! queries and HNSW-backed approximate search.

use emberdb::{params, Database, DbError, ErrorKind, Value};
use tempfile::tempdir;

const EPS: f64 = 1e-5;

fn create_test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.exec(
        "CREATE TABLE docs (id INTEGER PRIMARY KEY, title TEXT, emb VECTOR(3));
         INSERT INTO docs VALUES (1, 'x axis', '[1, 0, 0]');
         INSERT INTO docs VALUES (2, 'y axis', '[0, 1, 0]');
         INSERT INTO docs VALUES (3, 'near x', '[0.9, 0.1, 0]');
         INSERT INTO docs VALUES (4, 'z axis', '[0, 0, 1]');",
    )
    .unwrap();
    db
}

fn float(db: &Database, sql: &str) -> f64 {
    match db.query_raw(sql, ()).unwrap().rows[0][0] {
        Value::Float(f) => f,
        ref other => panic!("expected float, got {:?}", other),
    }
}

fn ids(db: &Database, sql: &str, params: emberdb::Params) -> Vec<i64> {
    db.query(sql, params)
        .unwrap()
        .iter()
        .map(|row| row.get_i64("id").unwrap())
        .collect()
}

/// Deterministic pseudo-random unit-ish vectors.
fn synthetic_vectors(n: usize, dims: usize) -> Vec<Vec<f32>> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..n)
        .map(|_| {
            (0..dims)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    ((state % 2000) as f32 / 1000.0) - 1.0
                })
                .collect()
        })
        .collect()
}

mod storage {
    use super::*;

    #[test]
    fn vectors_round_trip_as_floats() {
        let db = create_test_db();
        db.execute("INSERT INTO docs VALUES ($1, $2, $3)", params![5, "native", vec![0.5f32, 0.25, -1.0]])
            .unwrap();
        let row = db.query_one("SELECT emb FROM docs WHERE id = 5", ()).unwrap().unwrap();
        assert_eq!(row.get_vector("emb").unwrap(), vec![0.5, 0.25, -1.0]);

        let row = db.query_one("SELECT emb FROM docs WHERE id = 3", ()).unwrap().unwrap();
        assert_eq!(row.get_vector("emb").unwrap(), vec![0.9, 0.1, 0.0]);
    }

    #[test]
    fn dimension_mismatch_is_type_error() {
        let db = create_test_db();
        let err = db
            .execute("INSERT INTO docs VALUES (9, 'bad', '[1, 2]')", ())
            .unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Type));

        let err = db
            .execute("INSERT INTO docs VALUES ($1, 'bad', $2)", params![9, vec![1.0f32; 4]])
            .unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Type));
    }

    #[test]
    fn malformed_literal_is_rejected() {
        let db = create_test_db();
        assert!(db.execute("INSERT INTO docs VALUES (9, 'bad', '[1, two, 3]')", ()).is_err());
    }
}

mod functions {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let db = create_test_db();
        assert!(float(&db, "SELECT VEC_DISTANCE_L2(emb, emb) FROM docs WHERE id = 3").abs() < EPS);
        assert!(float(&db, "SELECT VEC_DISTANCE_COSINE(emb, emb) FROM docs WHERE id = 3").abs() < EPS);
    }

    #[test]
    fn orthogonal_unit_vectors() {
        let db = create_test_db();
        assert!((float(&db, "SELECT VEC_DISTANCE_COSINE('[1,0,0]', '[0,1,0]')") - 1.0).abs() < EPS);
        assert!((float(&db, "SELECT VEC_DISTANCE_L2('[1,0,0]', '[0,1,0]')") - 2f64.sqrt()).abs() < EPS);
        assert!(float(&db, "SELECT VEC_DISTANCE_IP('[1,0,0]', '[0,1,0]')").abs() < EPS);
        assert!((float(&db, "SELECT VEC_DISTANCE_IP('[1,2,0]', '[3,1,0]')") + 5.0).abs() < EPS);
    }

    #[test]
    fn dims_norm_and_text() {
        let db = create_test_db();
        let row = db
            .query_one(
                "SELECT VEC_DIMS(emb) AS d, VEC_NORM('[3, 4, 0]') AS n, VEC_DIMS(VEC_TO_TEXT(emb)) AS t
                 FROM docs WHERE id = 1",
                (),
            )
            .unwrap()
            .unwrap();
        assert_eq!(row.get_i64("d").unwrap(), 3);
        assert!((row.get_f64("n").unwrap() - 5.0).abs() < EPS);
        assert_eq!(row.get_i64("t").unwrap(), 3);
    }

    #[test]
    fn mismatched_dimensions_in_function() {
        let db = create_test_db();
        let err = db.query("SELECT VEC_DISTANCE_L2(emb, '[1, 0]') FROM docs", ()).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Type));
    }
}

mod knn {
    use super::*;

    const KNN: &str = "SELECT id FROM docs ORDER BY VEC_DISTANCE_COSINE(emb, $1) LIMIT 2";

    #[test]
    fn exact_scan_returns_nearest_first() {
        let db = create_test_db();
        assert_eq!(ids(&db, KNN, params!["[1, 0, 0]"]), vec![1, 3]);
        assert_eq!(
            ids(&db, "SELECT id FROM docs ORDER BY VEC_DISTANCE_L2(emb, $1) LIMIT 3", params![vec![0.0f32, 0.9, 0.1]]),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn hnsw_index_agrees_on_small_sets() {
        let db = create_test_db();
        db.execute("CREATE INDEX docs_emb ON docs(emb) USING HNSW WITH (metric = 'cosine')", ())
            .unwrap();
        let plan: Vec<String> = db
            .query_raw(
                "EXPLAIN SELECT id FROM docs ORDER BY VEC_DISTANCE_COSINE(emb, '[1,0,0]') LIMIT 2",
                (),
            )
            .unwrap()
            .rows
            .into_iter()
            .map(|r| r[0].to_string())
            .collect();
        assert!(plan.join("\n").contains("VectorSearch on docs using docs_emb"));
        assert_eq!(ids(&db, KNN, params!["[1, 0, 0]"]), vec![1, 3]);
    }

    #[test]
    fn index_sees_later_writes_and_deletes() {
        let db = create_test_db();
        db.execute("CREATE INDEX docs_emb ON docs(emb) USING HNSW WITH (metric = 'cosine')", ())
            .unwrap();
        db.execute("INSERT INTO docs VALUES (10, 'exact y', '[0, 2, 0]')", ()).unwrap();
        db.execute("DELETE FROM docs WHERE id = 2", ()).unwrap();
        db.execute("UPDATE docs SET emb = '[0, 0.1, 1]' WHERE id = 4", ()).unwrap();

        assert_eq!(ids(&db, KNN, params!["[0, 1, 0]"]), vec![10, 3]);
        assert_eq!(ids(&db, "SELECT id FROM docs ORDER BY VEC_DISTANCE_COSINE(emb, $1) LIMIT 1", params!["[0, 0, 1]"]), vec![4]);
    }

    #[test]
    fn uncommitted_vectors_stay_private() {
        let db = create_test_db();
        db.execute("CREATE INDEX docs_emb ON docs(emb) USING HNSW WITH (metric = 'l2')", ())
            .unwrap();
        let mut tx = db.begin().unwrap();
        tx.execute("INSERT INTO docs VALUES (20, 'hidden', '[5, 5, 5]')", ()).unwrap();
        let q = "SELECT id FROM docs ORDER BY VEC_DISTANCE_L2(emb, '[5, 5, 5]') LIMIT 1";
        assert_eq!(tx.query_one(q, ()).unwrap().unwrap().get_i64("id").unwrap(), 20);
        assert_ne!(db.query_one(q, ()).unwrap().unwrap().get_i64("id").unwrap(), 20);
        tx.rollback().unwrap();
    }

    #[test]
    fn approximate_search_has_high_recall() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE pts (id INTEGER PRIMARY KEY, v VECTOR(8))", ()).unwrap();
        let vectors = synthetic_vectors(400, 8);
        let sets: Vec<emberdb::Params> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| params![i as i64, v.clone()])
            .collect();
        db.execute_batch("INSERT INTO pts VALUES ($1, $2)", &sets).unwrap();

        let query = vec![0.1f32, -0.2, 0.3, 0.0, 0.5, -0.5, 0.2, 0.1];
        let sql = "SELECT id FROM pts ORDER BY VEC_DISTANCE_L2(v, $1) LIMIT 10";
        let exact = ids(&db, sql, params![query.clone()]);

        db.execute("CREATE INDEX pts_v ON pts(v) USING HNSW WITH (metric = 'l2')", ()).unwrap();
        db.execute("PRAGMA hnsw_ef_search = 64", ()).unwrap();
        let approx = ids(&db, sql, params![query.clone()]);
        let hits = approx.iter().filter(|id| exact.contains(id)).count();
        assert!(hits >= 8, "recall {}/10", hits);

        db.execute("PRAGMA vector_index_scan = OFF", ()).unwrap();
        assert_eq!(ids(&db, sql, params![query]), exact);
    }

    #[test]
    fn null_vectors_rank_the_same_with_and_without_index() {
        let db = Database::open_in_memory().unwrap();
        db.exec(
            "CREATE TABLE v (id INTEGER PRIMARY KEY, e VECTOR(2));
             INSERT INTO v VALUES (1, '[1, 0]'), (2, '[0, 1]'), (3, NULL), (4, '[0.5, 0.5]');
             CREATE INDEX v_e ON v(e) USING HNSW WITH (metric = 'l2');",
        )
        .unwrap();
        db.execute("INSERT INTO v VALUES (5, NULL)", ()).unwrap();

        let queries = [
            "SELECT id FROM v ORDER BY VEC_DISTANCE_L2(e, '[1, 0]') LIMIT 3",
            "SELECT id FROM v ORDER BY VEC_DISTANCE_L2(e, '[1, 0]') LIMIT 1",
            "SELECT id FROM v ORDER BY VEC_DISTANCE_L2(e, '[1, 0]') LIMIT 10",
            "SELECT id FROM v ORDER BY VEC_DISTANCE_L2(e, '[1, 0]') LIMIT 2 OFFSET 1",
            "SELECT id FROM v ORDER BY VEC_DISTANCE_L2(e, NULL) LIMIT 3",
        ];
        let indexed: Vec<Vec<i64>> = queries.iter().map(|q| ids(&db, q, params![])).collect();

        let mut tx = db.begin().unwrap();
        tx.execute("UPDATE v SET e = NULL WHERE id = 4", ()).unwrap();
        let q = "SELECT id FROM v ORDER BY VEC_DISTANCE_L2(e, '[0.5, 0.5]') LIMIT 4";
        let staged: Vec<i64> = tx
            .query(q, ())
            .unwrap()
            .iter()
            .map(|row| row.get_i64("id").unwrap())
            .collect();
        assert_eq!(staged, vec![3, 4, 5, 1]);
        tx.rollback().unwrap();

        db.execute("PRAGMA vector_index_scan = OFF", ()).unwrap();
        let exact: Vec<Vec<i64>> = queries.iter().map(|q| ids(&db, q, params![])).collect();
        assert_eq!(indexed, exact);
        assert_eq!(exact[0], vec![3, 5, 1]);
        assert_eq!(exact[2], vec![3, 5, 1, 4, 2]);
    }

    #[test]
    fn hnsw_index_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        {
            let db = Database::open(&path).unwrap();
            db.exec(
                "CREATE TABLE docs (id INTEGER PRIMARY KEY, emb VECTOR(3));
                 CREATE INDEX docs_emb ON docs(emb) USING HNSW WITH (metric = 'cosine');
                 INSERT INTO docs VALUES (1, '[1,0,0]'), (2, '[0,1,0]'), (3, '[0.9,0.1,0]');",
            )
            .unwrap();
            db.close().unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(ids(&db, KNN, params!["[1, 0, 0]"]), vec![1, 3]);
    }
}
