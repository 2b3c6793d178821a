use super::*;

fn rewrite(style: MarkerStyle, quote: char, input: &str) -> String {
    let mut w = SqlWriter::with_style(style, quote).schema("schema");
    w.write_query(input);
    w.finish().0
}

#[test]
fn rewrites_raw_fragments_per_dialect() {
    let cases = [
        ("sample", "sample", "sample"),
        (
            "foo = ? AND bar = ?",
            "foo = ? AND bar = ?",
            "foo = $1 AND bar = $2",
        ),
        (
            r#""foo" = ? AND "bar" = ?"#,
            "`foo` = ? AND `bar` = ?",
            r#""foo" = $1 AND "bar" = $2"#,
        ),
        (
            r#"INSERT INTO "user"("id", "name") VALUES (?,?)"#,
            "INSERT INTO `user`(`id`, `name`) VALUES (?,?)",
            r#"INSERT INTO "user"("id", "name") VALUES ($1,$2)"#,
        ),
        (
            "$.deleted_at IS NULL",
            "schema.deleted_at IS NULL",
            "schema.deleted_at IS NULL",
        ),
        (
            r#"INSERT INTO $."user"("id", "name") VALUES (?,?)"#,
            "INSERT INTO schema.`user`(`id`, `name`) VALUES (?,?)",
            r#"INSERT INTO schema."user"("id", "name") VALUES ($1,$2)"#,
        ),
    ];

    for (input, mysql, postgres) in cases {
        assert_eq!(rewrite(MarkerStyle::Sequential, '`', input), mysql, "{input}");
        assert_eq!(rewrite(MarkerStyle::Numbered, '"', input), postgres, "{input}");
    }
}

#[test]
fn schema_token_dropped_without_schema() {
    let mut w = SqlWriter::new(Dialect::Postgres);
    w.write_query("$.deleted_at IS NULL AND price > $5");
    assert_eq!(w.as_str(), "deleted_at IS NULL AND price > $5");
}

#[test]
fn prefix_overrides_schema_token() {
    let mut w = SqlWriter::new(Dialect::Postgres).schema("public");
    w.write_query_with_prefix("u", "$.id = ?");
    assert_eq!(w.as_str(), "u.id = $1");
}

#[test]
fn counter_continues_across_calls() {
    let mut w = SqlWriter::new(Dialect::Postgres);
    w.write_query("a = ? AND b = ?");
    w.write_raw(" AND c IN (");
    w.write_markers(3);
    w.write_raw(") AND d = ");
    w.write_marker();
    assert_eq!(w.as_str(), "a = $1 AND b = $2 AND c IN ($3,$4,$5) AND d = $6");
    assert_eq!(w.marker_count(), 6);
}

#[test]
fn sequential_markers_are_not_numbered() {
    let mut w = SqlWriter::new(Dialect::MySql);
    w.write_markers(3);
    w.write_byte(b' ');
    w.write_marker();
    assert_eq!(w.as_str(), "?,?,? ?");
    assert_eq!(w.marker_count(), 0);
}

#[test]
fn quotes_names() {
    let mut w = SqlWriter::new(Dialect::MySql);
    w.write_name("user");
    w.write_byte(b',');
    w.write_prefixed_name("u", "id");
    w.write_byte(b',');
    w.write_prefixed_name("", "name");
    assert_eq!(w.as_str(), "`user`,u.`id`,`name`");
}

#[test]
fn query_name_quotes_only_identifiers() {
    let mut w = SqlWriter::new(Dialect::Postgres);
    w.write_query_name("created_at");
    w.write_byte(b',');
    w.write_query_name(r#""a"."b" DESC"#);
    w.write_byte(b',');
    w.write_query_name("COUNT(*)");
    assert_eq!(w.as_str(), r#""created_at","a"."b" DESC,COUNT(*)"#);

    assert!(is_simple_name("_id2"));
    assert!(!is_simple_name("2id"));
    assert!(!is_simple_name(""));
    assert!(!is_simple_name("a.b"));
}

#[test]
fn trim_last_retracts_separator() {
    let mut w = SqlWriter::new(Dialect::Postgres);
    for name in ["a", "b"] {
        w.write_name(name);
        w.write_byte(b',');
    }
    w.trim_last(1);
    assert_eq!(w.as_str(), r#""a","b""#);

    w.trim_last(100);
    assert!(w.is_empty());
}

#[test]
fn trim_last_snaps_to_char_boundary() {
    let mut w = SqlWriter::new(Dialect::Postgres);
    w.write_raw("name = 'é'");
    w.trim_last(2);
    assert_eq!(w.as_str(), "name = '");
}

#[test]
fn finish_returns_args_in_order() {
    let mut w = SqlWriter::new(Dialect::Postgres);
    w.write_query("a = ? AND b = ?");
    w.write_arg(1_i64);
    w.write_arg("x");
    let (sql, args) = w.finish();
    assert_eq!(sql, "a = $1 AND b = $2");
    assert_eq!(args, vec![Value::Int(1), Value::Text("x".into())]);
}

#[test]
fn pooled_buffers_are_emptied() {
    let pool = BufferPool::default();
    let mut w = pool.writer(Dialect::Postgres);
    w.write_raw("SELECT 1");
    let (sql, _) = w.finish();
    pool.put(sql);
    assert_eq!(pool.idle(), 1);

    let mut w = pool.writer(Dialect::Postgres);
    assert!(w.is_empty());
    w.write_marker();
    assert_eq!(w.as_str(), "$1");
    assert_eq!(pool.idle(), 0);
}

#[test]
fn pool_drops_oversized_buffers() {
    let pool = BufferPool::new(4, 16);
    pool.put(String::with_capacity(1024));
    assert_eq!(pool.idle(), 0);
}
