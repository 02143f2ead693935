#![cfg(feature = "sqlite")]
use serde_json::json;
use sql_guard::prelude::*;
use sql_guard::sqlite::SqliteConnector;

fn open(path: Option<&str>) -> Database<SqliteConnector> {
    let mut config = ConnectionConfig::new("localhost", "", "").with_charset("utf8");
    if let Some(path) = path {
        config = config.with_database(path);
    }
    Database::new(SqliteConnector::new(), config)
}

#[test]
fn round_trip_through_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open(None);
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL, avatar BLOB)")?;

    db.insert(
        "users",
        SetPayload::new()
            .set("name", "O'Brien")
            .set("score", 9.5)
            .set("avatar", vec![0xde_u8, 0xad]),
        None,
    )?;
    assert_eq!(db.last_insert_id(), 1);
    db.insert("users", SetPayload::new().set("name", "ann"), None)?;
    assert_eq!(db.last_insert_id(), 2);

    let rows = db.query(
        "SELECT ?n, name, score, avatar FROM ?n WHERE name IN (?a) ORDER BY id",
        &sql_args!["id", "users", vec!["O'Brien", "ann"]],
    )?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.results[0].get("name"), Some(&SqlValue::Text("O'Brien".into())));
    assert_eq!(rows.results[0].get("score"), Some(&SqlValue::Float(9.5)));
    assert_eq!(rows.results[0].get("avatar"), Some(&SqlValue::Blob(vec![0xde, 0xad])));
    assert_eq!(rows.results[1].get("score"), Some(&SqlValue::Null));

    assert_eq!(
        serde_json::to_value(&rows.results[0])?,
        json!({"id": 1, "name": "O'Brien", "score": 9.5, "avatar": "dead"})
    );
    Ok(())
}

#[test]
fn quotes_and_backslashes_stay_inside_the_literal() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open(None);
    assert_eq!(db.dialect(), Dialect::Sqlite);
    db.execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)")?;
    for name in ["O'Brien", "ann", "bob"] {
        db.query("INSERT INTO people (name) VALUES (?s)", &sql_args![name])?;
    }

    let found = db.get_col("SELECT name FROM people WHERE name=?s", &sql_args!["O'Brien"])?;
    assert_eq!(found, vec![SqlValue::Text("O'Brien".into())]);

    for hostile in ["' OR 1=1 -- ", r"\' OR 1=1 -- ", "x' OR 'a'='a"] {
        let rows = db.query("SELECT id FROM people WHERE name=?s", &sql_args![hostile])?;
        assert!(rows.is_empty(), "{hostile} matched rows");
    }
    let rows = db.query("SELECT id FROM people WHERE name IN (?a)", &sql_args![vec!["' OR 1=1 -- "]])?;
    assert!(rows.is_empty());

    let stored = r#"back\slash 'quoted' and "double""#;
    db.insert("people", SetPayload::new().set("name", stored), None)?;
    let id = db.last_insert_id();
    assert_eq!(
        db.get_one("SELECT name FROM people WHERE id=?i", &sql_args![id])?,
        Some(SqlValue::Text(stored.into()))
    );
    assert_eq!(db.get_one("SELECT COUNT(*) FROM people", &[])?, Some(SqlValue::Int(4)));
    Ok(())
}

#[test]
fn fetch_helpers_against_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open(None);
    db.execute("CREATE TABLE cities (id INTEGER PRIMARY KEY, name TEXT)")?;
    db.execute("INSERT INTO cities (id, name) VALUES (2, 'bern'), (1, 'oslo')")?;

    let row = db.get_row("SELECT * FROM cities WHERE id=?i", &sql_args![1])?.ok_or("no row")?;
    assert_eq!(row.get("name"), Some(&SqlValue::Text("oslo".into())));
    assert!(db.get_row("SELECT * FROM cities WHERE id=?i", &sql_args![9])?.is_none());
    assert_eq!(db.get_all("SELECT * FROM cities ORDER BY id", &[])?.len(), 2);

    let by_id = db.get_ind_col("id", "SELECT id, name FROM cities ORDER BY id", &[])?;
    assert_eq!(
        by_id,
        vec![
            ("1".to_string(), SqlValue::Text("oslo".into())),
            ("2".to_string(), SqlValue::Text("bern".into())),
        ]
    );
    let by_name = db.get_ind("name", "SELECT * FROM cities ORDER BY name", &[])?;
    assert_eq!(by_name[0].0, "bern");
    Ok(())
}

#[test]
fn batch_insert_into_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open(None);
    db.execute("CREATE TABLE tags (id INTEGER PRIMARY KEY, tag TEXT)")?;
    let mut batch = BatchInsert::new("tags", &["id", "tag"])?
        .with_ignore(true)
        .with_size_limit(64);
    for id in 1..=10 {
        batch.add(&mut db, &[SqlValue::Int(id), SqlValue::Text(format!("it's #{id}"))])?;
    }
    batch.add(&mut db, &[SqlValue::Int(1), SqlValue::from("duplicate")])?;
    batch.flush(&mut db)?;

    assert_eq!(db.get_one("SELECT COUNT(*) FROM tags", &[])?, Some(SqlValue::Int(10)));
    assert_eq!(
        db.get_one("SELECT tag FROM tags WHERE id=?i", &sql_args![1])?,
        Some(SqlValue::Text("it's #1".into()))
    );
    assert!(db.stats().len() > 1);
    Ok(())
}

#[test]
fn update_reports_affected_rows() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open(None);
    db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, n INTEGER)")?;
    db.execute("INSERT INTO t (n) VALUES (1), (2), (3)")?;
    let condition = db.compile("n >= ?i", &sql_args![2])?;
    db.update("t", SetPayload::new().raw("n", "n + 10"), Some(&condition), None)?;
    assert_eq!(db.affected_rows(), 2);

    let total = db.execute("SELECT SUM(n) AS total FROM t")?;
    assert_eq!(total.first_value(), Some(&SqlValue::Int(26)));
    Ok(())
}

#[test]
fn sqlite_errors_surface_as_query_errors() {
    let mut db = open(None);
    let err = db.execute("SELECT * FROM missing").unwrap_err();
    match err {
        SqlGuardError::QueryError { code, message } => {
            assert_eq!(code, Some(1));
            assert!(message.contains("missing"));
        }
        other => panic!("expected query error, got {other:?}"),
    }
    assert!(db.last_error().is_some());
    assert_eq!(db.stats().len(), 1);
}

#[test]
fn transactions_commit_and_roll_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tx.db");
    let path = path.to_str().ok_or("non-utf8 temp path")?;
    let mut db = open(Some(path));
    db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)")?;

    db.begin_transaction()?;
    db.execute("INSERT INTO t (id) VALUES (1)")?;
    db.rollback()?;

    db.begin_transaction()?;
    db.execute("INSERT INTO t (id) VALUES (2)")?;
    db.commit()?;
    db.disconnect();

    let rows = db.execute("SELECT id FROM t")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.first_value(), Some(&SqlValue::Int(2)));
    Ok(())
}

#[test]
fn file_database_survives_reconnect() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data.db");
    let path = path.to_str().ok_or("non-utf8 temp path")?;

    let mut db = open(Some(path));
    db.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)")?;
    db.insert("kv", SetPayload::new().set("k", "a").set("v", "1"), None)?;
    db.disconnect();
    assert_eq!(db.state(), ConnectionState::Unconnected);

    let rows = db.query("SELECT v FROM kv WHERE k=?s", &sql_args!["a"])?;
    assert_eq!(rows.first_value(), Some(&SqlValue::Text("1".into())));
    assert_eq!(db.counters().connects, 2);
    Ok(())
}

#[test]
fn unknown_charset_fails_the_connect() {
    let config = ConnectionConfig::new("localhost", "", "").with_charset("latin1");
    let mut db = Database::new(SqliteConnector::new(), config);
    assert!(matches!(db.connect(), Err(SqlGuardError::ConnectError(_))));
}
