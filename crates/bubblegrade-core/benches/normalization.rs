use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bubblegrade_core::recognition::{extract_json, normalize_response};

fn plain_reply() -> String {
    let fields: Vec<String> = (1..=60)
        .map(|q| {
            let value = match q % 7 {
                0 => "N/A",
                3 => "MULTIPLE",
                n => ["A", "B", "C", "D", "E", "A", "B"][n as usize],
            };
            format!("\"{q}\": \"{value}\"")
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}

fn located_reply() -> String {
    let fields: Vec<String> = (1..=60)
        .map(|q| {
            format!(
                "\"{q}\": {{\"value\": \"C\", \"coordinates\": {{\"x\": {}, \"y\": {}}}}}",
                (q - 1) / 15 * 25 + 10,
                (q - 1) % 15 * 6 + 5
            )
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_response");

    let plain = plain_reply();
    let fenced = format!("Here are the answers:\n```json\n{plain}\n```\n");
    let located = located_reply();
    let messy = r#"{"1": "a", "02": " b ", "3": "Z", "4": null, "99": "A", "note": "x"}"#;

    group.bench_function("plain", |b| {
        b.iter(|| normalize_response(black_box(&plain), 60))
    });
    group.bench_function("fenced", |b| {
        b.iter(|| normalize_response(black_box(&fenced), 60))
    });
    group.bench_function("with_locations", |b| {
        b.iter(|| normalize_response(black_box(&located), 60))
    });
    group.bench_function("messy", |b| {
        b.iter(|| normalize_response(black_box(messy), 60))
    });
    group.finish();
}

fn bench_extract_json(c: &mut Criterion) {
    let plain = plain_reply();
    let fenced = format!("```json\n{plain}\n```");
    c.bench_function("extract_json_fenced", |b| {
        b.iter(|| extract_json(black_box(&fenced)))
    });
}

criterion_group!(benches, bench_normalize, bench_extract_json);
criterion_main!(benches);
