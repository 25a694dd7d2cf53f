//! Benchmarks for fitting and confidence-limit searches.
//!
//! Each search refits the remaining parameters at every trial value, so its
//! cost is dominated by the engine; the groups below show both.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, ArrayView1};
use specfit_rs::confidence::{ConfidenceSearch, LimitRequest, SearchConfig};
use specfit_rs::error::Result;
use specfit_rs::fit::{FitData, FitEnvironment, ModelEvaluator};
use specfit_rs::parameters::{ParameterDefaults, ParameterTable};

/// Gaussian line on a linear continuum.
fn line_model() -> Box<dyn ModelEvaluator> {
    Box::new(|x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
        Ok(x.mapv(|e| {
            let z = (e - p[0]) / p[1];
            p[2] * (-0.5 * z * z).exp() + p[3] + p[4] * e
        }))
    })
}

fn table() -> ParameterTable {
    let mut table = ParameterTable::new();
    let defaults = vec![
        ParameterDefaults::new("LineE", 6.3).with_bounds(5.0, 8.0),
        ParameterDefaults::new("Sigma", 0.2).with_bounds(0.01, 2.0),
        ParameterDefaults::new("norm", 5.0).with_bounds(0.0, 1e3),
        ParameterDefaults::new("const", 1.0).with_bounds(-100.0, 100.0),
        ParameterDefaults::new("slope", 0.0).with_bounds(-10.0, 10.0),
    ];
    table.register("gaussline", 1, 1, 5, &defaults).unwrap();
    table
}

fn data(n: usize) -> FitData {
    let x = Array1::<f64>::linspace(4.0, 9.0, n);
    // deterministic ripple standing in for noise
    let y = x.mapv(|e| {
        let z: f64 = (e - 6.4) / 0.15;
        8.0 * (-0.5 * z * z).exp() + 2.0 - 0.1 * e + 0.05 * (37.0 * e).sin()
    });
    FitData::with_errors(x, y, &Array1::from_elem(n, 0.05)).unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    let env = FitEnvironment::with_defaults();

    for &n in &[100, 1000] {
        let data = data(n);
        group.bench_with_input(BenchmarkId::new("leven_chi", n), &data, |b, data| {
            b.iter(|| {
                let mut table = table();
                let mut fit = env.open("leven", "chi", line_model(), None, data.len()).unwrap();
                let result = fit.run_on_table(&mut table, data).unwrap();
                fit.close();
                black_box(result)
            })
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("confidence_search");
    group.sample_size(10); // every trial is a full refit

    let env = FitEnvironment::with_defaults();
    let data = data(200);
    let mut best_table = table();
    let best = {
        let mut fit = env.open("leven", "chi", line_model(), None, data.len()).unwrap();
        let result = fit.run_on_table(&mut best_table, &data).unwrap();
        fit.close();
        result
    };
    let search = ConfidenceSearch::new(SearchConfig::default());

    for (name, index) in [("LineE", 1), ("norm", 3)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut table = best_table.clone();
                let mut fit = env.open("leven", "chi", line_model(), None, data.len()).unwrap();
                let request = LimitRequest::new(index, best.statistic);
                let result = search.run(&mut table, &mut fit.bind(&data), &request).unwrap();
                fit.close();
                black_box(result)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_search);
criterion_main!(benches);
