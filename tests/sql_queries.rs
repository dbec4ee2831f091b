//! # SQL Query Integration Tests
//!
//! End-to-end checks of the query surface through the public `Database`
//! API: DDL, DML, filtering, joins, grouping, window functions, CTEs,
//! subqueries, set operations and scalar functions.
//!
//! ```sh
//! cargo test --test sql_queries
//! ```

use emberdb::{params, Database, ExecuteResult, Value};

fn create_test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.exec(
        "CREATE TABLE employees (
             id INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             dept TEXT,
             salary INTEGER,
             manager_id INTEGER
         );
         INSERT INTO employees VALUES (1, 'Ada', 'eng', 300, NULL);
         INSERT INTO employees VALUES (2, 'Brian', 'eng', 200, 1);
         INSERT INTO employees VALUES (3, 'Chloe', 'eng', 200, 1);
         INSERT INTO employees VALUES (4, 'Dmitri', 'sales', 150, 1);
         INSERT INTO employees VALUES (5, 'Emma', 'sales', 120, 4);
         INSERT INTO employees VALUES (6, 'Farid', NULL, 90, NULL);
         CREATE TABLE depts (code TEXT PRIMARY KEY, title TEXT);
         INSERT INTO depts VALUES ('eng', 'Engineering'), ('sales', 'Sales'), ('ops', 'Operations');",
    )
    .unwrap();
    db
}

fn ints(db: &Database, sql: &str) -> Vec<Option<i64>> {
    db.query_raw(sql, ())
        .unwrap()
        .rows
        .into_iter()
        .map(|row| match &row[0] {
            Value::Integer(i) => Some(*i),
            Value::Null => None,
            other => panic!("expected integer, got {:?}", other),
        })
        .collect()
}

fn texts(db: &Database, sql: &str) -> Vec<String> {
    db.query_raw(sql, ())
        .unwrap()
        .rows
        .into_iter()
        .map(|row| row[0].to_string())
        .collect()
}

fn scalar(db: &Database, sql: &str) -> Value {
    let result = db.query_raw(sql, ()).unwrap();
    assert_eq!(result.rows.len(), 1, "expected one row from {}", sql);
    result.rows[0][0].clone()
}

mod ddl {
    use super::*;

    #[test]
    fn create_table_reports_whether_it_created() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(
            db.run("CREATE TABLE t (id INTEGER PRIMARY KEY)", ()).unwrap(),
            ExecuteResult::CreateTable { created: true }
        );
        assert_eq!(
            db.run("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY)", ()).unwrap(),
            ExecuteResult::CreateTable { created: false }
        );
        assert!(db.execute("CREATE TABLE t (id INTEGER)", ()).is_err());
    }

    #[test]
    fn drop_table_and_index() {
        let db = create_test_db();
        db.execute("CREATE INDEX emp_dept ON employees(dept)", ()).unwrap();
        assert_eq!(
            db.run("DROP INDEX emp_dept", ()).unwrap(),
            ExecuteResult::DropIndex { dropped: true }
        );
        assert_eq!(
            db.run("DROP INDEX IF EXISTS emp_dept", ()).unwrap(),
            ExecuteResult::DropIndex { dropped: false }
        );
        assert_eq!(
            db.run("DROP TABLE depts", ()).unwrap(),
            ExecuteResult::DropTable { dropped: true }
        );
        assert!(db.query("SELECT * FROM depts", ()).is_err());
        assert_eq!(
            db.run("DROP TABLE IF EXISTS depts", ()).unwrap(),
            ExecuteResult::DropTable { dropped: false }
        );
    }

    #[test]
    fn show_tables_lists_names_sorted() {
        let db = create_test_db();
        assert_eq!(texts(&db, "SHOW TABLES"), vec!["depts", "employees"]);
        let result = db.query_raw("SHOW TABLES", ()).unwrap();
        assert_eq!(result.columns, vec!["table_name".to_string()]);
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let db = create_test_db();
        db.execute("CREATE UNIQUE INDEX emp_name ON employees(name)", ()).unwrap();
        assert!(db
            .execute("INSERT INTO employees (id, name) VALUES (7, 'Ada')", ())
            .is_err());
        assert!(db
            .execute("CREATE UNIQUE INDEX emp_salary ON employees(salary)", ())
            .is_err());
    }
}

mod dml {
    use super::*;

    #[test]
    fn omitted_columns_use_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, qty INTEGER DEFAULT 5, note TEXT)",
            (),
        )
        .unwrap();
        db.execute("INSERT INTO items (id) VALUES (1), (2)", ()).unwrap();
        let row = db.query_one("SELECT qty, note FROM items WHERE id = 2", ()).unwrap().unwrap();
        assert_eq!(row.get_i64("qty").unwrap(), 5);
        assert!(row.is_null("note").unwrap());
    }

    #[test]
    fn update_and_delete_report_affected_rows() {
        let db = create_test_db();
        let updated = db
            .execute("UPDATE employees SET salary = salary + 10 WHERE dept = 'eng'", ())
            .unwrap();
        assert_eq!(updated, 3);
        assert_eq!(ints(&db, "SELECT salary FROM employees WHERE id = 2"), vec![Some(210)]);

        let deleted = db.execute("DELETE FROM employees WHERE salary < 100", ()).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(ints(&db, "SELECT COUNT(*) FROM employees"), vec![Some(5)]);
    }

    #[test]
    fn insert_select_copies_rows() {
        let db = create_test_db();
        db.execute("CREATE TABLE archive (id INTEGER PRIMARY KEY, name TEXT)", ()).unwrap();
        let copied = db
            .execute("INSERT INTO archive SELECT id, name FROM employees WHERE dept = 'sales'", ())
            .unwrap();
        assert_eq!(copied, 2);
        assert_eq!(texts(&db, "SELECT name FROM archive ORDER BY id"), vec!["Dmitri", "Emma"]);
    }

    #[test]
    fn failed_statement_leaves_data_untouched() {
        let db = create_test_db();
        let err = db
            .execute("INSERT INTO employees (id, name) VALUES (10, 'Gia'), (1, 'Dup')", ())
            .unwrap_err();
        assert_eq!(
            emberdb::DbError::kind_of(&err),
            Some(emberdb::ErrorKind::Schema)
        );
        assert_eq!(ints(&db, "SELECT COUNT(*) FROM employees WHERE id = 10"), vec![Some(0)]);
    }

    #[test]
    fn rowid_is_stable_across_updates() {
        let db = create_test_db();
        let before = scalar(&db, "SELECT rowid FROM employees WHERE id = 3");
        db.execute("UPDATE employees SET name = 'Chloé' WHERE id = 3", ()).unwrap();
        let after = scalar(&db, "SELECT rowid FROM employees WHERE id = 3");
        assert_eq!(before, after);
        let all = db.query_raw("SELECT * FROM employees", ()).unwrap();
        assert!(!all.columns.iter().any(|c| c == "rowid"));
    }
}

mod filtering {
    use super::*;

    #[test]
    fn null_comparisons_are_unknown() {
        let db = create_test_db();
        assert_eq!(ints(&db, "SELECT id FROM employees WHERE dept = NULL"), Vec::<Option<i64>>::new());
        assert_eq!(ints(&db, "SELECT id FROM employees WHERE dept IS NULL"), vec![Some(6)]);
        assert_eq!(
            ints(&db, "SELECT COUNT(*) FROM employees WHERE dept IS NOT NULL"),
            vec![Some(5)]
        );
        assert_eq!(
            ints(&db, "SELECT id FROM employees WHERE NOT (dept = 'eng') ORDER BY id"),
            vec![Some(4), Some(5)]
        );
    }

    #[test]
    fn like_between_and_in() {
        let db = create_test_db();
        assert_eq!(texts(&db, "SELECT name FROM employees WHERE name LIKE '_mm%'"), vec!["Emma"]);
        assert_eq!(
            ints(&db, "SELECT id FROM employees WHERE name NOT LIKE '%a%' ORDER BY id"),
            vec![Some(3), Some(4)]
        );
        assert_eq!(
            ints(&db, "SELECT id FROM employees WHERE salary BETWEEN 120 AND 200 ORDER BY id"),
            vec![Some(2), Some(3), Some(4), Some(5)]
        );
        assert_eq!(
            ints(&db, "SELECT id FROM employees WHERE salary NOT BETWEEN 120 AND 200 ORDER BY id"),
            vec![Some(1), Some(6)]
        );
        assert_eq!(
            ints(&db, "SELECT id FROM employees WHERE id IN (2, 5, 99) ORDER BY id"),
            vec![Some(2), Some(5)]
        );
    }

    #[test]
    fn index_lookup_matches_full_scan() {
        let db = create_test_db();
        let scanned = ints(&db, "SELECT id FROM employees WHERE dept = 'eng' ORDER BY id");
        db.execute("CREATE INDEX emp_dept ON employees(dept)", ()).unwrap();
        let indexed = ints(&db, "SELECT id FROM employees WHERE dept = 'eng' ORDER BY id");
        assert_eq!(scanned, indexed);

        let plan = texts(&db, "EXPLAIN SELECT id FROM employees WHERE dept = 'eng'").join("\n");
        assert!(plan.contains("IndexScan on employees using emp_dept"), "{}", plan);
    }

    #[test]
    fn primary_key_range_uses_index() {
        let db = create_test_db();
        assert_eq!(
            ints(&db, "SELECT id FROM employees WHERE id >= 2 AND id < 5 ORDER BY id"),
            vec![Some(2), Some(3), Some(4)]
        );
    }
}

mod joins {
    use super::*;

    #[test]
    fn inner_join_drops_unmatched() {
        let db = create_test_db();
        let rows = db
            .query_raw(
                "SELECT e.name, d.title FROM employees e JOIN depts d ON e.dept = d.code ORDER BY e.id",
                (),
            )
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.rows[3], vec![Value::Text("Dmitri".into()), Value::Text("Sales".into())]);
    }

    #[test]
    fn left_join_pads_with_nulls() {
        let db = create_test_db();
        let rows = db
            .query_raw(
                "SELECT d.code, e.id FROM depts d LEFT JOIN employees e ON e.dept = d.code
                 WHERE e.id IS NULL",
                (),
            )
            .unwrap();
        assert_eq!(rows.rows, vec![vec![Value::Text("ops".into()), Value::Null]]);
    }

    #[test]
    fn self_join_finds_managers() {
        let db = create_test_db();
        assert_eq!(
            texts(
                &db,
                "SELECT m.name FROM employees e JOIN employees m ON e.manager_id = m.id
                 WHERE e.name = 'Emma'"
            ),
            vec!["Dmitri"]
        );
    }

    #[test]
    fn cross_join_multiplies() {
        let db = create_test_db();
        assert_eq!(
            ints(&db, "SELECT COUNT(*) FROM employees CROSS JOIN depts"),
            vec![Some(18)]
        );
    }
}

mod aggregation {
    use super::*;

    #[test]
    fn group_by_with_having() {
        let db = create_test_db();
        let result = db
            .query_raw(
                "SELECT dept, COUNT(*) AS n, SUM(salary) AS total FROM employees
                 GROUP BY dept HAVING COUNT(*) > 1 ORDER BY dept",
                (),
            )
            .unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![Value::Text("eng".into()), Value::Integer(3), Value::Integer(700)],
                vec![Value::Text("sales".into()), Value::Integer(2), Value::Integer(270)],
            ]
        );
    }

    #[test]
    fn nulls_group_together() {
        let db = create_test_db();
        db.execute("INSERT INTO employees (id, name, salary) VALUES (7, 'Gia', 10)", ()).unwrap();
        let row = db
            .query_one("SELECT COUNT(*) AS n FROM employees WHERE dept IS NULL GROUP BY dept", ())
            .unwrap()
            .unwrap();
        assert_eq!(row.get_i64("n").unwrap(), 2);
    }

    #[test]
    fn distinct_aggregates_and_averages() {
        let db = create_test_db();
        assert_eq!(
            ints(&db, "SELECT COUNT(DISTINCT salary) FROM employees WHERE dept = 'eng'"),
            vec![Some(2)]
        );
        assert_eq!(
            scalar(&db, "SELECT AVG(salary) FROM employees WHERE dept = 'sales'"),
            Value::Float(135.0)
        );
        assert_eq!(ints(&db, "SELECT MIN(salary) FROM employees"), vec![Some(90)]);
        assert_eq!(ints(&db, "SELECT MAX(salary) FROM employees"), vec![Some(300)]);
        assert_eq!(ints(&db, "SELECT COUNT(dept) FROM employees"), vec![Some(5)]);
    }

    #[test]
    fn aggregate_over_empty_input() {
        let db = create_test_db();
        let result = db
            .query_raw("SELECT COUNT(*), SUM(salary) FROM employees WHERE id > 100", ())
            .unwrap();
        assert_eq!(result.rows, vec![vec![Value::Integer(0), Value::Null]]);
    }
}

mod ordering {
    use super::*;

    #[test]
    fn multiple_keys_with_directions() {
        let db = create_test_db();
        assert_eq!(
            ints(&db, "SELECT id FROM employees WHERE dept = 'eng' ORDER BY salary DESC, name ASC"),
            vec![Some(1), Some(2), Some(3)]
        );
    }

    #[test]
    fn order_by_alias_and_ordinal() {
        let db = create_test_db();
        assert_eq!(
            texts(&db, "SELECT name AS who FROM employees ORDER BY who DESC LIMIT 2"),
            vec!["Farid", "Emma"]
        );
        assert_eq!(
            texts(&db, "SELECT name, salary FROM employees ORDER BY 2 LIMIT 1"),
            vec!["Farid"]
        );
    }

    #[test]
    fn limit_offset_apply_after_sort() {
        let db = create_test_db();
        assert_eq!(
            ints(&db, "SELECT id FROM employees ORDER BY id DESC LIMIT 2 OFFSET 1"),
            vec![Some(5), Some(4)]
        );
    }

    #[test]
    fn distinct_dedups_rows() {
        let db = create_test_db();
        assert_eq!(
            texts(&db, "SELECT DISTINCT dept FROM employees WHERE dept IS NOT NULL ORDER BY dept"),
            vec!["eng", "sales"]
        );
    }
}

mod windows {
    use super::*;

    #[test]
    fn row_number_and_rank_per_partition() {
        let db = create_test_db();
        let result = db
            .query_raw(
                "SELECT id,
                        ROW_NUMBER() OVER (PARTITION BY dept ORDER BY salary DESC, id) AS rn,
                        RANK() OVER (PARTITION BY dept ORDER BY salary DESC) AS rk
                 FROM employees WHERE dept = 'eng' ORDER BY id",
                (),
            )
            .unwrap();
        assert_eq!(
            result.rows,
            vec![
                vec![Value::Integer(1), Value::Integer(1), Value::Integer(1)],
                vec![Value::Integer(2), Value::Integer(2), Value::Integer(2)],
                vec![Value::Integer(3), Value::Integer(3), Value::Integer(2)],
            ]
        );
    }

    #[test]
    fn lag_reads_previous_row() {
        let db = create_test_db();
        assert_eq!(
            ints(
                &db,
                "SELECT LAG(salary) OVER (ORDER BY id) FROM employees WHERE dept = 'sales' ORDER BY id"
            ),
            vec![None, Some(150)]
        );
    }

    #[test]
    fn sliding_frame_sum() {
        let db = create_test_db();
        assert_eq!(
            ints(
                &db,
                "SELECT SUM(salary) OVER (ORDER BY id ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING)
                 FROM employees WHERE id <= 4 ORDER BY id"
            ),
            vec![Some(500), Some(700), Some(550), Some(350)]
        );
    }
}

mod subqueries {
    use super::*;

    #[test]
    fn scalar_subquery_and_empty_result() {
        let db = create_test_db();
        assert_eq!(
            texts(&db, "SELECT name FROM employees WHERE salary = (SELECT MAX(salary) FROM employees)"),
            vec!["Ada"]
        );
        assert_eq!(
            scalar(&db, "SELECT (SELECT id FROM employees WHERE id = 99)"),
            Value::Null
        );
        assert!(db
            .query("SELECT (SELECT id FROM employees)", ())
            .is_err());
    }

    #[test]
    fn in_and_not_in_subquery() {
        let db = create_test_db();
        assert_eq!(
            texts(&db, "SELECT code FROM depts WHERE code IN (SELECT dept FROM employees) ORDER BY code"),
            vec!["eng", "sales"]
        );
        assert_eq!(
            texts(
                &db,
                "SELECT code FROM depts WHERE code NOT IN
                 (SELECT dept FROM employees WHERE dept IS NOT NULL)"
            ),
            vec!["ops"]
        );
    }

    #[test]
    fn correlated_exists() {
        let db = create_test_db();
        assert_eq!(
            texts(
                &db,
                "SELECT m.name FROM employees m
                 WHERE EXISTS (SELECT 1 FROM employees e WHERE e.manager_id = m.id)
                 ORDER BY m.id"
            ),
            vec!["Ada", "Dmitri"]
        );
        assert_eq!(
            texts(
                &db,
                "SELECT d.code FROM depts d
                 WHERE NOT EXISTS (SELECT 1 FROM employees e WHERE e.dept = d.code)"
            ),
            vec!["ops"]
        );
    }

    #[test]
    fn correlated_scalar_subquery_per_row() {
        let db = create_test_db();
        assert_eq!(
            ints(
                &db,
                "SELECT (SELECT COUNT(*) FROM employees e WHERE e.dept = d.code) FROM depts d ORDER BY d.code"
            ),
            vec![Some(3), Some(0), Some(2)]
        );
    }
}

mod ctes_and_sets {
    use super::*;

    #[test]
    fn ctes_reference_earlier_ctes() {
        let db = create_test_db();
        assert_eq!(
            texts(
                &db,
                "WITH eng AS (SELECT * FROM employees WHERE dept = 'eng'),
                      top AS (SELECT name FROM eng WHERE salary > 250)
                 SELECT name FROM top"
            ),
            vec!["Ada"]
        );
    }

    #[test]
    fn union_all_keeps_duplicates_union_removes_them() {
        let db = create_test_db();
        assert_eq!(
            ints(
                &db,
                "SELECT COUNT(*) FROM (SELECT dept FROM employees UNION ALL SELECT code FROM depts) AS u"
            ),
            vec![Some(9)]
        );
        assert_eq!(
            texts(
                &db,
                "SELECT dept FROM employees WHERE dept IS NOT NULL UNION SELECT code FROM depts ORDER BY 1"
            ),
            vec!["eng", "ops", "sales"]
        );
    }
}

mod functions {
    use super::*;

    #[test]
    fn string_functions() {
        let db = create_test_db();
        assert_eq!(scalar(&db, "SELECT UPPER('ember') || '-' || LOWER('DB')"), Value::Text("EMBER-db".into()));
        assert_eq!(scalar(&db, "SELECT LENGTH('héllo')"), Value::Integer(5));
        assert_eq!(scalar(&db, "SELECT SUBSTR('database', 1, 4)"), Value::Text("data".into()));
        assert_eq!(scalar(&db, "SELECT TRIM('  x  ')"), Value::Text("x".into()));
    }

    #[test]
    fn numeric_functions_and_arithmetic() {
        let db = create_test_db();
        assert_eq!(scalar(&db, "SELECT ABS(-4)"), Value::Integer(4));
        assert_eq!(scalar(&db, "SELECT ROUND(2.567, 2)"), Value::Float(2.57));
        assert_eq!(scalar(&db, "SELECT 7 / 2"), Value::Integer(3));
        assert_eq!(scalar(&db, "SELECT -7 / 2"), Value::Integer(-3));
        assert_eq!(scalar(&db, "SELECT 1 / 0"), Value::Null);
        assert_eq!(scalar(&db, "SELECT SQRT(16)"), Value::Float(4.0));
    }

    #[test]
    fn conditional_expressions() {
        let db = create_test_db();
        assert_eq!(
            texts(
                &db,
                "SELECT CASE WHEN salary >= 200 THEN 'high' ELSE 'low' END FROM employees
                 WHERE id IN (1, 5) ORDER BY id"
            ),
            vec!["high", "low"]
        );
        assert_eq!(
            texts(&db, "SELECT COALESCE(dept, 'none') FROM employees WHERE id = 6"),
            vec!["none"]
        );
        assert_eq!(scalar(&db, "SELECT NULLIF(3, 3)"), Value::Null);
        assert_eq!(scalar(&db, "SELECT CAST('42' AS INTEGER)"), Value::Integer(42));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let db = create_test_db();
        assert!(db.query("SELECT NO_SUCH_FN(1)", ()).is_err());
    }
}

mod prepared {
    use super::*;

    #[test]
    fn prepared_statement_reuses_plan() {
        let db = create_test_db();
        let stmt = db.prepare("SELECT name FROM employees WHERE id = $1").unwrap();
        assert_eq!(stmt.sql(), "SELECT name FROM employees WHERE id = $1");
        for (id, name) in [(1, "Ada"), (4, "Dmitri")] {
            let row = stmt.query_one(params![id]).unwrap().unwrap();
            assert_eq!(row.get_str("name").unwrap(), name);
        }
        assert!(stmt.query_one(params![42]).unwrap().is_none());
    }

    #[test]
    fn prepared_statement_sees_new_indexes() {
        let db = create_test_db();
        let stmt = db.prepare("SELECT id FROM employees WHERE dept = $1 ORDER BY id").unwrap();
        let before = stmt.query_raw(params!["sales"]).unwrap();
        db.execute("CREATE INDEX emp_dept ON employees(dept)", ()).unwrap();
        let after = stmt.query_raw(params!["sales"]).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn prepared_statement_fails_after_table_dropped() {
        let db = create_test_db();
        let stmt = db.prepare("SELECT title FROM depts").unwrap();
        db.execute("DROP TABLE depts", ()).unwrap();
        assert!(stmt.query(()).is_err());
    }
}
