use chrono::{Local, TimeZone};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use santa_tracker_lib::prompts::defaults::DEFAULT_TEMPLATES;
use santa_tracker_lib::prompts::{interpolate, santa_message_context, santa_time_context, validate_template, LiveStats};

fn bench_render(c: &mut Criterion) {
    let template = DEFAULT_TEMPLATES[1].1;
    let now = Local.with_ymd_and_hms(2025, 12, 24, 21, 0, 0).unwrap();
    let stats = LiveStats {
        distance: Some(1_500.0),
        gifts_delivered: Some(1_234_567_890),
        status: Some("Out for delivery!".into()),
    };
    let context = santa_message_context(&santa_time_context(now), Some(&stats), None);

    c.bench_function("prompts.interpolate.delivering", |b| {
        b.iter(|| interpolate(black_box(template), black_box(&context)))
    });

    let nested = match json!({ "user": { "location": { "city": "Rovaniemi" } }, "count": 3 }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    c.bench_function("prompts.interpolate.nested", |b| {
        b.iter(|| interpolate(black_box("{{user.location.city}} gets {{count}} gifts, {{missing}}"), &nested))
    });

    c.bench_function("prompts.validate.delivering", |b| b.iter(|| validate_template(black_box(template))));
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
