mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Author, User, post_record, record, setup, setup_with, user_record};
use sqorm::{DatabaseConfig, Fragment, LogFlags, SqlError, SqlResult, Value, args};

#[tokio::test]
async fn find_decodes_rows() {
    let (db, conn, logs) = setup();
    conn.push_rows(vec![user_record(1, "ann", 30), user_record(2, "bob", 41)]);

    let users: Vec<User> = db
        .query()
        .where_("age > ?", args![18_i64])
        .order_by(["id"])
        .find()
        .await
        .unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[1].name, "bob");
    assert_eq!(users[1].age, 41);
    assert_eq!(
        conn.statements(),
        vec![r#"SELECT "id","name","age" FROM "user" WHERE (age > $1) ORDER BY "id""#]
    );

    let entry = logs.last();
    assert_eq!(entry.flags, LogFlags::QUERY);
    assert_eq!(entry.args, args![18_i64]);
    assert!(!entry.is_error());
}

#[tokio::test]
async fn get_without_rows_reports_not_found() {
    let (db, _conn, logs) = setup();
    let mut user = User::new("keep", 1);
    let found = db
        .query()
        .where_("id = ?", args![404_i64])
        .get(&mut user)
        .await
        .unwrap();
    assert!(!found);
    assert_eq!(user, User::new("keep", 1));
    assert_eq!(logs.last().flags, LogFlags::QUERY_ROW);
}

#[tokio::test]
async fn get_fills_the_target() {
    let (db, conn, _logs) = setup();
    conn.push_rows(vec![user_record(9, "cat", 5)]);
    let mut user = User::default();
    assert!(db
        .query()
        .where_("id = ?", args![9_i64])
        .get(&mut user)
        .await
        .unwrap());
    assert_eq!(user.id, 9);
    assert_eq!(user.name, "cat");
}

#[tokio::test]
async fn preload_loads_children_by_parent_id() {
    let (db, conn, logs) = setup();
    conn.push_rows(vec![user_record(1, "ann", 30), user_record(2, "bob", 41)]);
    conn.push_rows(vec![
        post_record(10, 2, "hello"),
        post_record(11, 1, "first"),
        post_record(12, 2, "again"),
    ]);

    let authors: Vec<Author> = db.query().preload("post").find().await.unwrap();

    assert_eq!(authors[0].posts.len(), 1);
    assert_eq!(authors[0].posts[0].title, "first");
    assert_eq!(
        authors[1].posts.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![10, 12]
    );
    assert_eq!(
        conn.statements()[1],
        r#"SELECT "id","user_id","title" FROM "post" WHERE ("user_id" IN ($1,$2))"#
    );
    assert_eq!(logs.last().args, args![1_i64, 2_i64]);
}

#[tokio::test]
async fn preload_with_extra_predicates() {
    let (db, conn, _logs) = setup();
    conn.push_rows(vec![user_record(1, "ann", 30)]);

    let mut author = Author::default();
    db.query()
        .where_("id = ?", args![1_i64])
        .preload_where(
            "post",
            vec![sqorm::fragment::expr("title <> ?", args![""]).shared()],
        )
        .get(&mut author)
        .await
        .unwrap();

    assert_eq!(
        conn.statements()[1],
        r#"SELECT "id","user_id","title" FROM "post" WHERE ("user_id" IN ($1)) AND (title <> $2)"#
    );
}

#[tokio::test]
async fn unknown_preload_is_a_build_error() {
    let (db, conn, logs) = setup();
    conn.push_rows(vec![user_record(1, "ann", 30)]);

    let err = db.query().preload("comment").find::<Author>().await.unwrap_err();
    assert_eq!(err.to_string(), "user can not preload comment");

    let entry = logs.last();
    assert_eq!(entry.flags, LogFlags::BUILD);
    assert_eq!(entry.error.as_deref(), Some("user can not preload comment"));
}

#[tokio::test]
async fn orphan_child_rows_fail_population() {
    let (db, conn, _logs) = setup();
    conn.push_rows(vec![user_record(1, "ann", 30)]);
    conn.push_rows(vec![post_record(10, 7, "stray")]);

    let err = db.query().preload("post").find::<Author>().await.unwrap_err();
    assert_eq!(err.to_string(), "can not populate id 7");
}

#[tokio::test]
async fn count_reads_first_cell() {
    let (db, conn, _logs) = setup();
    conn.push_rows(vec![record(&["count"], vec![Value::Int(3)])]);

    let n = db
        .query()
        .where_("age > ?", args![18_i64])
        .count::<User>()
        .await
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(
        conn.statements(),
        vec![r#"SELECT COUNT(*) FROM "user" WHERE (age > $1)"#]
    );
}

#[tokio::test]
async fn scan_one_returns_first_row() {
    let (db, conn, _logs) = setup();
    conn.push_rows(vec![record(&["now"], vec![Value::Text("noon".into())])]);

    let row = db.query().sql("SELECT now()", args![]).scan_one().await.unwrap();
    assert_eq!(row, Some(vec![Value::Text("noon".into())]));

    let row = db.query().sql("SELECT now()", args![]).scan_one().await.unwrap();
    assert_eq!(row, None);
}

#[tokio::test]
async fn build_errors_are_logged_with_build_flag() {
    let (db, conn, logs) = setup();

    let err = db.query().delete::<User>().await.unwrap_err();
    assert!(err.is_missing_where());
    assert!(conn.statements().is_empty());

    let entry = logs.last();
    assert_eq!(entry.flags, LogFlags::BUILD);
    assert_eq!(entry.error.as_deref(), Some("DELETE must have WHERE"));
    assert_eq!(entry.query, "");

    let tx = db.begin().await.unwrap();
    let err = tx.query().update(&User::new("x", 1)).await.unwrap_err();
    assert!(err.is_missing_where());
    assert_eq!(logs.last().flags, LogFlags::BUILD | LogFlags::TX);
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn update_map_runs_the_rendered_statement() {
    let (db, conn, logs) = setup();
    let map = BTreeMap::from([("primary".to_string(), Value::Bool(false))]);

    let n = db
        .query()
        .table("mytable")
        .where_("foo = ? AND bar = ?", args![1_i64, 2_i64])
        .update_map(&map)
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(
        conn.statements(),
        vec![r#"UPDATE "mytable" SET "primary" = $1 WHERE (foo = $2 AND bar = $3)"#]
    );
    assert_eq!(logs.last().flags, LogFlags::EXEC);
    assert_eq!(logs.last().args, args![false, 1_i64, 2_i64]);
}

#[tokio::test]
async fn commit_flushes_statements_once() {
    let (db, conn, logs) = setup();

    let tx = db.begin().await.unwrap();
    tx.query().insert(&User::new("ann", 30)).await.unwrap();
    tx.exec("UPDATE counters SET n = n + 1", &[]).await.unwrap();
    assert_eq!(tx.statements().len(), 2);

    tx.commit().await.unwrap();
    assert!(tx.is_finished());

    let entries = logs.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].flags, LogFlags::EXEC | LogFlags::TX);
    assert_eq!(entries[1].flags, LogFlags::EXEC | LogFlags::TX);

    let flush = &entries[2];
    assert_eq!(flush.flags, LogFlags::COMMIT | LogFlags::TX);
    assert_eq!(flush.tx_queries.len(), 2);
    assert!(flush.time <= entries[0].time);
    assert!(tx.statements().is_empty());

    // Finishing twice neither runs nor logs anything.
    assert!(tx.commit().await.unwrap_err().is_tx_done());
    assert!(tx.rollback().await.unwrap_err().is_tx_done());
    assert!(tx.exec("SELECT 1", &[]).await.unwrap_err().is_tx_done());
    assert_eq!(logs.entries().len(), 3);

    assert_eq!(
        conn.statements(),
        vec![
            "BEGIN",
            r#"INSERT INTO "user" ("id","name","age") VALUES ($1,$2,$3)"#,
            "UPDATE counters SET n = n + 1",
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn rollback_logs_the_statements_run() {
    let (db, conn, logs) = setup();

    let tx = db.begin().await.unwrap();
    tx.exec("DELETE FROM sessions", &[]).await.unwrap();
    tx.rollback().await.unwrap();

    let flush = logs.last();
    assert_eq!(flush.flags, LogFlags::ROLLBACK | LogFlags::TX);
    assert_eq!(flush.tx_queries[0].query, "DELETE FROM sessions");
    assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
    let (db, conn, logs) = setup();
    {
        let tx = db.begin().await.unwrap();
        tx.exec("INSERT INTO t VALUES (1)", &[]).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
    let flush = logs.last();
    assert_eq!(flush.flags, LogFlags::ROLLBACK | LogFlags::TX);
    assert_eq!(flush.tx_queries.len(), 1);
}

#[tokio::test]
async fn insert_many_runs_in_one_transaction() {
    let (db, conn, logs) = setup();
    let users = vec![User::new("ann", 30), User::new("bob", 41)];

    let n = db.query().insert_many(&users).await.unwrap();
    assert_eq!(n, 2);
    let statements = conn.statements();
    assert_eq!(statements.len(), 4);
    assert_eq!(statements[0], "BEGIN");
    assert_eq!(statements[3], "COMMIT");
    assert_eq!(logs.last().tx_queries.len(), 2);
}

#[tokio::test]
async fn insert_many_rolls_back_on_failure() {
    let (db, conn, logs) = setup();
    conn.fail_on("INSERT");
    let users = vec![User::new("ann", 30), User::new("bob", 41)];

    let err = db.query().insert_many(&users).await.unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
    assert_eq!(logs.last().flags, LogFlags::ROLLBACK | LogFlags::TX);
}

#[tokio::test]
async fn insert_many_inside_transaction_joins_it() {
    let (db, conn, _logs) = setup();
    let tx = db.begin().await.unwrap();
    tx.query()
        .insert_many(&[User::new("ann", 30), User::new("bob", 41), User::new("cy", 2)])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let statements = conn.statements();
    assert_eq!(statements.iter().filter(|s| *s == "BEGIN").count(), 1);
    assert_eq!(statements.len(), 5);
}

#[tokio::test]
async fn error_mapper_sees_original_error() {
    let seen = Arc::new(Mutex::new(None));
    let seen_in_mapper = seen.clone();
    let config = DatabaseConfig::new().error_mapper(move |err, entry| {
        *seen_in_mapper.lock().unwrap() = entry.error.clone();
        SqlError::Other(format!("mapped: {err}"))
    });
    let (db, conn, logs) = setup_with(config);
    conn.fail_on("DELETE");

    let err = db
        .query()
        .where_("id = ?", args![1_i64])
        .delete::<User>()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "mapped: boom");
    assert_eq!(seen.lock().unwrap().as_deref(), Some("boom"));

    let entry = logs.last();
    assert_eq!(entry.orig_error.as_deref(), Some("boom"));
    assert_eq!(entry.error.as_deref(), Some("mapped: boom"));
}

#[tokio::test]
async fn query_timeout_applies_by_default() {
    let config = DatabaseConfig::new().with_query_timeout(Duration::from_millis(10));
    let (db, conn, logs) = setup_with(config);
    conn.delay(Duration::from_secs(5));

    let err = db.exec("SELECT pg_sleep(5)", &[]).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(logs.last().is_error());
}

#[tokio::test]
async fn tag_is_carried_into_entries() {
    let (db, _conn, logs) = setup();
    db.query()
        .tag("users.list")
        .find::<User>()
        .await
        .unwrap();
    assert_eq!(logs.last().tag.as_deref(), Some("users.list"));
}

async fn transfer(db: &sqorm::Database<Arc<common::Scripted>>, fail: bool) -> SqlResult<i64> {
    sqorm::transaction!(db, tx, {
        tx.exec("UPDATE account SET balance = balance - 1 WHERE id = 1", &[])
            .await?;
        if fail {
            return Err(SqlError::Other("insufficient funds".into()));
        }
        tx.exec("UPDATE account SET balance = balance + 1 WHERE id = 2", &[])
            .await?;
        Ok::<_, SqlError>(2)
    })
}

#[tokio::test]
async fn transaction_macro_commits_or_rolls_back() {
    let (db, conn, _logs) = setup();
    assert_eq!(transfer(&db, false).await.unwrap(), 2);
    assert_eq!(conn.statements().last().map(String::as_str), Some("COMMIT"));

    let err = transfer(&db, true).await.unwrap_err();
    assert_eq!(err.to_string(), "insufficient funds");
    assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
}
