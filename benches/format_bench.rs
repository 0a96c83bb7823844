use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tsqlfmt::{format_string, FormatterKind, Mode};

fn medium_sql() -> String {
    let mut sql = String::new();
    sql.push_str("CREATE PROCEDURE dbo.usp_order_rollup @from DATETIME, @to DATETIME AS\nBEGIN\n");
    for i in 0..20 {
        sql.push_str(&format!(
            "SELECT o.order_id, o.customer_id, SUM(l.qty * l.unit_price) AS total_{i}, \
             CASE WHEN o.status = 'open' THEN 1 ELSE 0 END AS is_open \
             FROM dbo.orders o JOIN dbo.order_lines l ON l.order_id = o.order_id \
             WHERE o.placed_at BETWEEN @from AND @to AND o.region IN ('na', 'emea', 'apac') \
             GROUP BY o.order_id, o.customer_id;\n"
        ));
    }
    sql.push_str("END\nGO\n");
    sql
}

fn bench_format_small(c: &mut Criterion) {
    let sql = "SELECT a, b, c FROM my_table WHERE x = 1 AND y > 2 ORDER BY a\n";
    let mode = Mode::default();
    c.bench_function("format_small", |b| {
        b.iter(|| format_string(black_box(sql), black_box(&mode)).unwrap())
    });
}

fn bench_format_medium(c: &mut Criterion) {
    let sql = medium_sql();
    let mode = Mode::default();
    c.bench_function("format_medium", |b| {
        b.iter(|| format_string(black_box(&sql), black_box(&mode)).unwrap())
    });
}

fn bench_tokenize_only(c: &mut Criterion) {
    let sql = medium_sql();
    c.bench_function("tokenize_only", |b| {
        b.iter(|| tsqlfmt::tokenizer::tokenize(black_box(&sql)))
    });
}

fn bench_parse_only(c: &mut Criterion) {
    let sql = medium_sql();
    let tokens = tsqlfmt::tokenizer::tokenize(&sql);
    c.bench_function("parse_only", |b| {
        b.iter(|| tsqlfmt::parser::parse(black_box(&tokens)))
    });
}

fn bench_identity(c: &mut Criterion) {
    let sql = medium_sql();
    let mode = Mode {
        formatter: FormatterKind::Identity,
        ..Mode::default()
    };
    c.bench_function("format_identity", |b| {
        b.iter(|| format_string(black_box(&sql), black_box(&mode)).unwrap())
    });
}

/// Formatting already-formatted output, which is a near-no-op layout pass.
fn bench_format_idempotent(c: &mut Criterion) {
    let sql = medium_sql();
    let mode = Mode::default();
    let formatted = format_string(&sql, &mode).unwrap();

    c.bench_function("format_idempotent", |b| {
        b.iter(|| format_string(black_box(&formatted), black_box(&mode)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_format_small,
    bench_format_medium,
    bench_tokenize_only,
    bench_parse_only,
    bench_identity,
    bench_format_idempotent
);
criterion_main!(benches);
