//! Performance benchmarks for cart-engine

use cart_engine::{reconcile, stabilize_values, to_wire, Cart, CartLine, StoredCart};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

fn raw_lines(size: usize) -> Vec<Value> {
    (0..size)
        .map(|i| {
            json!({
                "product": {"id": format!("p{}", i % (size / 2 + 1)), "title": format!("Product {}", i)},
                "variant": {"id": format!("v{}", i % 7), "size": "m", "inventoryQuantity": 50},
                "quantity": 1 + i % 3,
                "price": "19.90",
            })
        })
        .collect()
}

fn bench_cart_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("cart_operations");

    group.bench_function("ingest_line", |b| {
        let raw = raw_lines(1).remove(0);
        b.iter(|| CartLine::from_value(black_box(&raw)))
    });

    group.bench_function("add_to_populated_cart", |b| {
        let lines = stabilize_values(&raw_lines(100));
        let incoming = CartLine::new("p3", "v3", 2).with_size("M");
        b.iter(|| {
            let mut cart = Cart::from_lines(lines.clone());
            cart.add(black_box(incoming.clone()))
        })
    });

    group.finish();
}

fn bench_stabilize(c: &mut Criterion) {
    let mut group = c.benchmark_group("stabilize");

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("stabilize_values", size), size, |b, &size| {
            let raw = raw_lines(size);
            b.iter(|| stabilize_values(black_box(&raw)))
        });
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("reconcile", size), size, |b, &size| {
            let local = stabilize_values(&raw_lines(size));
            // Half overlapping, half remote-only
            let remote: Vec<CartLine> = stabilize_values(&raw_lines(size))
                .into_iter()
                .skip(size / 4)
                .map(|mut line| {
                    line.quantity += 1;
                    line
                })
                .collect();

            b.iter(|| reconcile(black_box(&local), black_box(&remote)))
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    for size in [100, 500].iter() {
        let lines = stabilize_values(&raw_lines(*size));

        group.bench_with_input(BenchmarkId::new("stored_to_json", size), &lines, |b, lines| {
            let stored = StoredCart::new(lines.clone());
            b.iter(|| stored.to_json())
        });

        group.bench_with_input(BenchmarkId::new("stored_from_json", size), &lines, |b, lines| {
            let json = StoredCart::new(lines.clone()).to_json().unwrap();
            b.iter(|| StoredCart::from_json(black_box(&json)))
        });

        group.bench_with_input(BenchmarkId::new("wire_fingerprint", size), &lines, |b, lines| {
            b.iter(|| to_wire(black_box(lines)).fingerprint())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cart_operations,
    bench_stabilize,
    bench_reconciliation,
    bench_serialization,
);
criterion_main!(benches);
