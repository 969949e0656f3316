use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::seq::SliceRandom;
use shopsignal_aggregator::{extract_heuristics, normalize_text, Aggregator, PageSnapshot};
use shopsignal_core::config::AggregatorConfig;
use std::time::Duration;
use tokio::time::Instant;

const LINES: &[&str] = &[
    "Here are three kettles worth a look:",
    "Kettle Pro 1.7L, ₹1,299.00 on Amazon",
    "Rated 4.3 out of 5 with 2,104 reviews",
    "Spend ₹499 for free delivery",
    "Share",
    "Steel body, auto shut-off, boil-dry protection",
    "https://amazon.in/dp/B0KETTLE",
    "ChatGPT can make mistakes. Check important info.",
];

fn messages(n: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| {
            let mut lines = LINES.to_vec();
            lines.shuffle(&mut rng);
            lines.join("\n")
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let page = PageSnapshot {
        url_path: "/c/bench-conversation".into(),
        assistant_messages: messages(40),
    };
    c.bench_function("aggregate_40_messages", |b| {
        let start = Instant::now();
        let mut step = 0u64;
        let mut agg = Aggregator::new(&AggregatorConfig::default());
        b.iter(|| {
            step += 1;
            let now = start + Duration::from_secs(step * 120);
            black_box(agg.aggregate(&page, now));
        })
    });

    let text = normalize_text(&messages(10).join("\n\n"));
    c.bench_function("extract_heuristics", |b| {
        b.iter(|| black_box(extract_heuristics(&text)))
    });
}

criterion_group!(benches, bench_aggregate);
criterion_main!(benches);
