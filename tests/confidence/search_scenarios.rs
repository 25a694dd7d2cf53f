//! Confidence searches refitting through the `leven` engine and `chi`.

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, ArrayView1};
use specfit_rs::confidence::{ConfidenceSearch, LimitRequest, SearchConfig, SearchState};
use specfit_rs::fit::{FitData, FitEnvironment, ModelEvaluator};
use specfit_rs::parameters::{ParameterDefaults, ParameterTable};
use specfit_rs::Result;

/// `p + q x` on centred abscissae with unit total weight, so that with `q`
/// refitted the statistic is exactly `S0 + (p - p0)^2`.
fn line() -> Box<dyn ModelEvaluator> {
    Box::new(|x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
        Ok(x.mapv(|v| p[0] + p[1] * v))
    })
}

fn line_data() -> FitData {
    let x = array![-1.5, -0.5, 0.5, 1.5];
    let y = array![0.7, 2.2, 2.9, 4.6];
    FitData::with_errors(x, y, &Array1::from_elem(4, 2.0)).unwrap()
}

fn line_table() -> ParameterTable {
    let mut table = ParameterTable::new();
    let defaults = vec![
        ParameterDefaults::new("const", 0.0).with_bounds(-20.0, 20.0),
        ParameterDefaults::new("slope", 0.0).with_bounds(-20.0, 20.0),
    ];
    table.register("line", 1, 1, 2, &defaults).unwrap();
    table
}

fn value(table: &ParameterTable, index: usize) -> f64 {
    table.find_by_index(index).unwrap().value()
}

#[test]
fn test_quadratic_statistic_converges_to_unit_offsets() {
    let env = FitEnvironment::with_defaults();
    let data = line_data();
    let mut table = line_table();
    let mut fit = env.open("leven", "chi", line(), None, data.len()).unwrap();
    let best = fit.run_on_table(&mut table, &data).unwrap();
    assert!(best.is_success());
    let p0 = value(&table, 1);
    assert_abs_diff_eq!(p0, 2.6, epsilon = 1e-6);
    assert_abs_diff_eq!(best.statistic, 0.043, epsilon = 1e-6);

    let search = ConfidenceSearch::new(SearchConfig::default());
    let request = LimitRequest::new(1, best.statistic)
        .with_delta(1.0)
        .with_range(p0 - 10.0, p0 + 10.0);
    let result = search.run(&mut table, &mut fit.bind(&data), &request).unwrap();
    fit.close();

    assert_eq!(result.lower.state, SearchState::Converged);
    assert_eq!(result.upper.state, SearchState::Converged);
    assert_abs_diff_eq!(result.lower.value, p0 - 1.0, epsilon = 0.01);
    assert_abs_diff_eq!(result.upper.value, p0 + 1.0, epsilon = 0.01);
    assert!(result.lower.iterations < 5);
    assert!(result.upper.iterations < 5);
    let (minus, plus) = result.errors();
    assert_abs_diff_eq!(minus, 1.0, epsilon = 0.01);
    assert_abs_diff_eq!(plus, 1.0, epsilon = 0.01);

    // the best fit is back in place, slope included
    assert_eq!(value(&table, 1), p0);
    assert_abs_diff_eq!(value(&table, 2), 1.24, epsilon = 1e-6);
    assert!(!table.find_by_index(1).unwrap().is_frozen());
}

#[test]
fn test_unreachable_threshold_reports_range_end() {
    let env = FitEnvironment::with_defaults();
    let data = line_data();
    let mut table = line_table();
    let mut fit = env.open("leven", "chi", line(), None, data.len()).unwrap();
    let best = fit.run_on_table(&mut table, &data).unwrap();
    let p0 = value(&table, 1);

    let search = ConfidenceSearch::new(SearchConfig::default());
    let request = LimitRequest::new(1, best.statistic)
        .with_delta(1.0)
        .with_range(p0 - 0.5, p0 + 0.5);
    let result = search.run(&mut table, &mut fit.bind(&data), &request).unwrap();

    assert_eq!(result.lower.state, SearchState::Invalid);
    assert_eq!(result.upper.state, SearchState::Invalid);
    assert_eq!(result.lower.value, p0 - 0.5);
    assert_eq!(result.upper.value, p0 + 0.5);
    assert!(!result.is_valid());
    assert_eq!(value(&table, 1), p0);
}

#[test]
fn test_poor_fit_is_refused() {
    let env = FitEnvironment::with_defaults();
    let data = line_data();
    let mut table = line_table();
    let mut fit = env.open("leven", "chi", line(), None, data.len()).unwrap();
    let best = fit.run_on_table(&mut table, &data).unwrap();

    // 0.043 over two degrees of freedom
    let strict = ConfidenceSearch::new(SearchConfig::default().with_max_reduced_statistic(0.01));
    let request = LimitRequest::new(1, best.statistic);
    let err = strict
        .run(&mut table, &mut fit.bind(&data), &request)
        .unwrap_err();
    assert!(err.is_configuration());

    let relaxed = ConfidenceSearch::new(SearchConfig::default().with_max_reduced_statistic(0.05));
    assert!(relaxed.run(&mut table, &mut fit.bind(&data), &request).unwrap().is_valid());
}

/// Residuals `p (p - 4) / 4` and `(p - 4) / 4`: a shallow local minimum near
/// 0.29 and the global minimum, zero, at 4.
fn double_well() -> Box<dyn ModelEvaluator> {
    Box::new(|_x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
        let v = p[0];
        Ok(array![v * (v - 4.0) / 4.0, 0.25 * (v - 4.0)])
    })
}

#[test]
fn test_deeper_minimum_is_reported_as_improved_fit() {
    let env = FitEnvironment::with_defaults();
    let data = FitData::unweighted(array![0.0, 1.0], array![0.0, 0.0]).unwrap();
    let mut table = ParameterTable::new();
    let defaults = vec![ParameterDefaults::new("center", 0.0).with_bounds(-10.0, 10.0)];
    table.register("well", 1, 1, 1, &defaults).unwrap();

    let mut fit = env.open("leven", "chi", double_well(), None, data.len()).unwrap();
    let local = fit.run_on_table(&mut table, &data).unwrap();
    assert!(local.is_success());
    let p_local = value(&table, 1);
    assert_abs_diff_eq!(p_local, 1.0 - 0.5_f64.sqrt(), epsilon = 1e-4);

    let search = ConfidenceSearch::new(SearchConfig::default());
    let request = LimitRequest::new(1, local.statistic).with_delta(1.0);
    let result = search.run(&mut table, &mut fit.bind(&data), &request).unwrap();

    assert_eq!(result.upper.state, SearchState::ImprovedFit);
    assert_ne!(result.upper.state, SearchState::Converged);
    let improved = result.improved.as_ref().unwrap();
    assert!(improved.statistic < local.statistic);
    assert!(improved.parameter_value > 2.0);
    assert_eq!(value(&table, 1), improved.parameter_value);
    assert_eq!(improved.snapshot.value(1), Some(improved.parameter_value));

    // refitting from the improved point reaches the global minimum
    let global = fit.run_on_table(&mut table, &data).unwrap();
    fit.close();
    assert!(global.statistic < 1e-8);
    assert_abs_diff_eq!(value(&table, 1), 4.0, epsilon = 1e-3);
}
