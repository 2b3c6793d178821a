//! Round trips against a live server. Skipped unless `DATABASE_URL` is set (a `.env` file works).

mod common;

use common::User;
use sqorm::{Database, DatabaseConfig, LogFlags, PoolOptions, args};

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL").ok()
}

#[tokio::test]
async fn insert_find_update_delete() {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let pool = sqorm::create_pool(&url, &PoolOptions::new().max_size(2)).unwrap();
    let logs = common::Captured::default();
    let db = Database::new(pool, DatabaseConfig::new().logger(logs.clone()));

    // Temp tables live on one connection; the transaction pins it.
    let tx = db.begin().await.unwrap();
    tx.exec(
        r#"CREATE TEMP TABLE IF NOT EXISTS "user" (id BIGSERIAL PRIMARY KEY, name TEXT, age INT)"#,
        &[],
    )
    .await
    .unwrap();
    tx.query()
        .insert_many(&[User::new("ann", 30), User::new("bob", 41)])
        .await
        .unwrap();

    let adults: Vec<User> = tx
        .query()
        .where_("age > ?", args![35_i64])
        .find()
        .await
        .unwrap();
    assert_eq!(adults.len(), 1);
    assert_eq!(adults[0].name, "bob");

    let mut bob = adults[0].clone();
    bob.age = 42;
    let n = tx
        .query()
        .where_("id = ?", args![bob.id])
        .update(&bob)
        .await
        .unwrap();
    assert_eq!(n, 1);

    let total = tx.query().count::<User>().await.unwrap();
    assert_eq!(total, 2);

    tx.rollback().await.unwrap();
    assert_eq!(logs.last().flags, LogFlags::ROLLBACK | LogFlags::TX);
}
