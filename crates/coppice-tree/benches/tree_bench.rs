//! Criterion benchmarks for coppice-tree: induction, tuning and forests.

use criterion::{Criterion as Bench, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use coppice_tree::{Column, ForestConfig, Table, TreeConfig};

fn make_classification(n_rows: usize, n_numeric: usize, n_classes: usize, seed: u64) -> Table {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let labels: Vec<String> = (0..n_rows).map(|i| format!("c{}", i % n_classes)).collect();
    let mut columns = vec![Column::categorical_from_strs("class", &labels)];
    for f in 0..n_numeric {
        let values = (0..n_rows)
            .map(|i| {
                let base = if f < 3 { (i % n_classes) as f64 * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 4.0
            })
            .collect();
        columns.push(Column::numeric(format!("f{f}"), values));
    }
    let groups: Vec<String> = (0..n_rows).map(|_| format!("g{}", rng.gen_range(0..6))).collect();
    columns.push(Column::categorical_from_strs("group", &groups));
    Table::new(columns).unwrap()
}

fn bench_tree_grow(c: &mut Bench) {
    let table = make_classification(500, 20, 5, 42);
    let config = TreeConfig::new();

    c.bench_function("tree_grow_500x21_5class", |b| {
        b.iter(|| config.grow(&table).unwrap());
    });
}

fn bench_tree_fit_cv(c: &mut Bench) {
    let table = make_classification(500, 20, 5, 42);
    let config = TreeConfig::new().with_folds(10);

    c.bench_function("tree_fit_500x21_5class_10fold", |b| {
        b.iter(|| config.fit(&table).unwrap());
    });
}

fn bench_forest_train(c: &mut Bench) {
    let table = make_classification(500, 20, 5, 42);
    let config = ForestConfig::new(50).unwrap().with_seed(42);

    c.bench_function("forest_train_500x21_5class_50trees", |b| {
        b.iter(|| config.fit(&table).unwrap());
    });
}

fn bench_forest_predict(c: &mut Bench) {
    let table = make_classification(500, 20, 5, 42);
    let forest = ForestConfig::new(50).unwrap().with_seed(42).fit(&table).unwrap();

    c.bench_function("forest_predict_500x21_50trees", |b| {
        b.iter(|| forest.predict(&table).unwrap());
    });
}

criterion_group!(
    benches,
    bench_tree_grow,
    bench_tree_fit_cv,
    bench_forest_train,
    bench_forest_predict
);
criterion_main!(benches);
