use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use serde_json::json;
use shopsignal_patch::{apply_all, Document, PatchKind, PatchOp};

fn streamed_ops(n: usize) -> Vec<PatchOp> {
    let mut rng = rand::thread_rng();
    let mut ops = vec![PatchOp::new("", PatchKind::Append, json!({"type": "product_entity", "data": []}))];
    for i in 0..n {
        let slot = rng.gen_range(0..8);
        let op = match i % 4 {
            0 => PatchOp::new(format!("/data/{slot}/title"), PatchKind::Add, json!("Item ")),
            1 => PatchOp::new(format!("/data/{slot}/title"), PatchKind::Append, json!("text chunk ")),
            2 => PatchOp::new(format!("/data/{slot}/offers"), PatchKind::Append, json!([{"price": rng.gen_range(1..5000)}])),
            _ => PatchOp::new(format!("/data/{slot}/offers"), PatchKind::Truncate, json!(2)),
        };
        ops.push(op);
    }
    ops
}

fn bench_apply(c: &mut Criterion) {
    let ops = streamed_ops(1000);
    c.bench_function("apply_1000_streamed_ops", |b| {
        b.iter(|| {
            let mut doc = Document::new();
            doc.apply_all(ops.iter());
            black_box(doc);
        })
    });

    let deep = PatchOp::new("/a/0/b/1/c/2/d", PatchKind::Add, json!(true));
    c.bench_function("apply_deep_path_1000", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                let mut doc = json!({});
                apply_all(&mut doc, [&deep]);
                black_box(doc);
            }
        })
    });
}

criterion_group!(benches, bench_apply);
criterion_main!(benches);
