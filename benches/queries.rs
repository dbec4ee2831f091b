//! Query and write-path benchmarks.
//!
//! ```bash
//! cargo bench --bench queries
//! cargo bench --bench queries -- "knn"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use emberdb::{params, Database, Params, SyncMode};
use tempfile::tempdir;

const ROWS: usize = 10_000;
const DIMS: usize = 32;

fn vector(seed: usize) -> Vec<f32> {
    (0..DIMS)
        .map(|d| (((seed * 31 + d * 17) % 97) as f32 / 48.5) - 1.0)
        .collect()
}

fn populated(rows: usize) -> Database {
    let db = Database::open_in_memory().unwrap();
    db.exec(&format!(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER, score FLOAT, emb VECTOR({}));
         CREATE INDEX users_age ON users(age);",
        DIMS
    ))
    .unwrap();
    let sets: Vec<Params> = (0..rows)
        .map(|i| params![i as i64, format!("user{}", i), (20 + i % 60) as i64, i as f64 * 0.1, vector(i)])
        .collect();
    db.execute_batch("INSERT INTO users VALUES ($1, $2, $3, $4, $5)", &sets)
        .unwrap();
    db
}

fn bench_point_reads(c: &mut Criterion) {
    let db = populated(ROWS);
    let stmt = db.prepare("SELECT name FROM users WHERE id = $1").unwrap();
    let mut group = c.benchmark_group("point_read");
    group.throughput(Throughput::Elements(1));

    group.bench_function("prepared_pk_lookup", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i = (i + 7919) % ROWS as i64;
            black_box(stmt.query_one(params![i]).unwrap())
        })
    });
    group.bench_function("unprepared_pk_lookup", |b| {
        b.iter(|| black_box(db.query_one("SELECT name FROM users WHERE id = 4242", ()).unwrap()))
    });
    group.finish();
}

fn bench_scans(c: &mut Criterion) {
    let db = populated(ROWS);
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.sample_size(20);

    group.bench_function("full_scan_filter", |b| {
        b.iter(|| black_box(db.query_raw("SELECT id FROM users WHERE score > 500.0", ()).unwrap()))
    });
    group.bench_function("index_range", |b| {
        b.iter(|| black_box(db.query_raw("SELECT id FROM users WHERE age BETWEEN 30 AND 32", ()).unwrap()))
    });
    group.bench_function("group_by", |b| {
        b.iter(|| {
            black_box(
                db.query_raw("SELECT age, COUNT(*), AVG(score) FROM users GROUP BY age", ())
                    .unwrap(),
            )
        })
    });
    group.finish();
}

fn bench_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &batch in &[100usize, 1_000] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("memory_batch", batch), &batch, |b, &batch| {
            b.iter_with_setup(
                || {
                    let db = Database::open_in_memory().unwrap();
                    db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", ()).unwrap();
                    let sets: Vec<Params> = (0..batch).map(|i| params![i as i64, "x"]).collect();
                    (db, sets)
                },
                |(db, sets)| {
                    let mut tx = db.begin().unwrap();
                    tx.execute_batch("INSERT INTO t VALUES ($1, $2)", &sets).unwrap();
                    tx.commit().unwrap();
                },
            )
        });
    }

    group.throughput(Throughput::Elements(100));
    group.bench_function("wal_sync_off_autocommit", |b| {
        b.iter_with_setup(
            || {
                let dir = tempdir().unwrap();
                let db = Database::builder()
                    .path(dir.path())
                    .sync_mode(SyncMode::Off)
                    .open()
                    .unwrap();
                db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", ()).unwrap();
                (dir, db)
            },
            |(_dir, db)| {
                for i in 0..100 {
                    db.execute("INSERT INTO t VALUES ($1, 'x')", params![i]).unwrap();
                }
            },
        )
    });
    group.finish();
}

fn bench_knn(c: &mut Criterion) {
    let db = populated(ROWS);
    let sql = "SELECT id FROM users ORDER BY VEC_DISTANCE_L2(emb, $1) LIMIT 10";
    let query = vector(12345);
    let mut group = c.benchmark_group("knn");
    group.sample_size(20);

    group.bench_function("exact", |b| {
        b.iter(|| black_box(db.query_raw(sql, params![query.clone()]).unwrap()))
    });

    db.execute("CREATE INDEX users_emb ON users(emb) USING HNSW WITH (metric = 'l2')", ())
        .unwrap();
    group.bench_function("hnsw", |b| {
        b.iter(|| black_box(db.query_raw(sql, params![query.clone()]).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_point_reads, bench_scans, bench_inserts, bench_knn);
criterion_main!(benches);
