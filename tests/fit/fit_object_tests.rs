use approx::assert_relative_eq;
use ndarray::{Array1, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use specfit_rs::fit::{
    ConstraintFn, Engine, EngineReport, FitData, FitEnvironment, FitStatus, ModelEvaluator,
    Objective,
};
use specfit_rs::parameters::{PackedParameters, ParameterDefaults, ParameterTable};
use specfit_rs::{FitError, Result};

fn decay() -> Box<dyn ModelEvaluator> {
    Box::new(|x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
        Ok(x.mapv(|t| p[0] * (-p[1] * t).exp() + p[2]))
    })
}

fn decay_table() -> ParameterTable {
    let mut table = ParameterTable::new();
    let defaults = vec![
        ParameterDefaults::new("amplitude", 1.0).with_bounds(0.0, 100.0),
        ParameterDefaults::new("rate", 0.1).with_bounds(0.0, 10.0),
        ParameterDefaults::new("offset", 0.0).with_bounds(-10.0, 10.0),
    ];
    table.register("decay", 1, 1, 3, &defaults).unwrap();
    table
}

/// `5 exp(-0.3 t) + 1` with uniform noise of half-width `noise`.
fn decay_data(seed: u64, noise: f64) -> FitData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array1::<f64>::linspace(0.0, 20.0, 60);
    let y = x.mapv(|t| 5.0 * (-0.3 * t).exp() + 1.0 + rng.gen_range(-noise..noise));
    let sigma = Array1::from_elem(x.len(), noise / 3.0_f64.sqrt());
    FitData::with_errors(x, y, &sigma).unwrap()
}

#[test]
fn test_noisy_decay_is_recovered() {
    let env = FitEnvironment::with_defaults();
    let data = decay_data(7, 0.05);
    let mut table = decay_table();

    let mut fit = env.open("leven", "chi", decay(), None, data.len()).unwrap();
    let result = fit.run_on_table(&mut table, &data).unwrap();
    fit.close();

    assert!(result.is_success(), "{}", result);
    assert_relative_eq!(table.find_by_index(1).unwrap().value(), 5.0, epsilon = 0.1);
    assert_relative_eq!(table.find_by_index(2).unwrap().value(), 0.3, epsilon = 0.02);
    assert_relative_eq!(table.find_by_index(3).unwrap().value(), 1.0, epsilon = 0.05);
    // close to one per degree of freedom
    assert!(result.statistic < 2.0 * data.len() as f64);
    assert_eq!(result.params, table.pack_variable().unwrap().values);
}

#[test]
fn test_frozen_parameter_keeps_its_value() {
    let env = FitEnvironment::with_defaults();
    let data = decay_data(11, 0.05);
    let mut table = decay_table();
    table.set_value(3, 1.0).unwrap();
    table.set_freeze(3, true).unwrap();

    let mut fit = env.open("", "", decay(), None, data.len()).unwrap();
    let result = fit.run_on_table(&mut table, &data).unwrap();
    assert!(result.is_success());
    assert_eq!(result.params.len(), 2);
    assert_eq!(table.find_by_index(3).unwrap().value(), 1.0);
    assert_relative_eq!(table.find_by_index(2).unwrap().value(), 0.3, epsilon = 0.02);
}

#[test]
fn test_engine_options_reach_the_engine() {
    let env = FitEnvironment::with_defaults();
    let data = decay_data(3, 0.05);
    let mut table = decay_table();

    let mut fit = env.open("leven;iterations=1", "", decay(), None, data.len()).unwrap();
    assert_eq!(fit.engine_name(), "leven");
    assert_eq!(fit.statistic_name(), "chi");
    let result = fit.run_on_table(&mut table, &data).unwrap();
    assert!(result.iterations <= 1);
    assert!(!result.is_converged());
    fit.close();

    let err = env
        .open("leven;restarts=4", "", decay(), None, data.len())
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(!env.is_fit_in_progress());
}

#[test]
fn test_unit_weighting_ignores_errors() {
    let env = FitEnvironment::with_defaults();
    let x = Array1::<f64>::linspace(0.0, 4.0, 5);
    let y = Array1::from_elem(5, 2.0);
    let data = FitData::with_errors(x, y, &Array1::from_elem(5, 0.1)).unwrap();
    let flat: Box<dyn ModelEvaluator> =
        Box::new(|x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.len(), p[0]))
        });

    let mut fit = env.open("leven", "chi;weight=unit", flat, None, data.len()).unwrap();
    let eval = fit.evaluate(&data, &ndarray::array![1.0]).unwrap();
    assert_relative_eq!(eval.statistic, 5.0, epsilon = 1e-12);
    fit.close();

    let flat: Box<dyn ModelEvaluator> =
        Box::new(|x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.len(), p[0]))
        });
    let mut fit = env.open("leven", "chi", flat, None, data.len()).unwrap();
    let eval = fit.evaluate(&data, &ndarray::array![1.0]).unwrap();
    assert_relative_eq!(eval.statistic, 500.0, epsilon = 1e-9);
}

#[test]
fn test_constrained_fit_on_table() {
    let env = FitEnvironment::with_defaults();
    let data = decay_data(5, 0.05);
    let mut table = decay_table();

    // hold the offset near zero
    let penalty: ConstraintFn = Box::new(|raw, p| raw + 1e8 * p[2] * p[2]);
    let mut fit = env.open("leven", "chi", decay(), Some(penalty), data.len()).unwrap();
    let constrained = fit.run_on_table(&mut table, &data).unwrap();
    assert!(constrained.is_success());
    assert!(table.find_by_index(3).unwrap().value().abs() < 0.05);

    let statistic = fit.close();
    assert_eq!(statistic.name(), "chi");
}

/// Evaluates once and reports convergence without moving.
struct Probe;

impl Engine for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    fn optimize(
        &mut self,
        objective: &mut dyn Objective,
        _packed: &PackedParameters,
        params: &mut Array1<f64>,
    ) -> Result<EngineReport> {
        let eval = objective.evaluate(params)?;
        Ok(EngineReport {
            statistic: eval.statistic,
            iterations: 0,
            evaluations: objective.n_evaluations(),
            converged: true,
            message: "probed".to_string(),
        })
    }
}

#[test]
fn test_registered_engine_and_default_statistic() {
    let mut env = FitEnvironment::with_defaults();
    env.engines.register("probe", "chi", || Box::new(Probe));
    assert_eq!(env.engines.names(), vec!["leven".to_string(), "probe".to_string()]);
    env.engines.set_default("probe").unwrap();

    let data = decay_data(1, 0.05);
    let mut table = decay_table();
    let before = table.values_all();
    let mut fit = env.open("default", "default", decay(), None, data.len()).unwrap();
    assert_eq!(fit.engine_name(), "probe");
    let result = fit.run_on_table(&mut table, &data).unwrap();
    assert_eq!(result.status, FitStatus::Converged);
    assert_eq!(result.evaluations, 1);
    assert_eq!(table.values_all(), before);
}

#[test]
fn test_one_fit_at_a_time() {
    let env = FitEnvironment::with_defaults();
    let data = decay_data(2, 0.05);
    let first = env.open("leven", "chi", decay(), None, data.len()).unwrap();
    assert!(matches!(
        env.open("leven", "chi", decay(), None, data.len()),
        Err(FitError::FitInProgress)
    ));
    drop(first);
    let second = env.open("leven", "chi", decay(), None, data.len()).unwrap();
    second.close();
    assert!(!env.is_fit_in_progress());
}
