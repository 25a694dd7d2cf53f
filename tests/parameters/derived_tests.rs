use approx::assert_relative_eq;
use specfit_rs::parameters::{
    DerivedExpression, ParameterDefaults, ParameterLookup, ParameterTable, Severity,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn lines() -> ParameterTable {
    let mut table = ParameterTable::new();
    let defaults = vec![
        ParameterDefaults::new("LineE", 6.4).with_bounds(0.0, 100.0),
        ParameterDefaults::new("norm", 1.0).with_bounds(0.0, 1e6),
    ];
    table.register("gaussian", 1, 1, 2, &defaults).unwrap();
    table.register("gaussian", 2, 1, 2, &defaults).unwrap();
    table
}

#[test]
fn test_self_reading_callable_runs_once_per_pass() {
    let mut table = lines();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let expr = DerivedExpression::callable(move |lookup: &dyn ParameterLookup| {
        counter.fetch_add(1, Ordering::SeqCst);
        // reads its own value: the nested attempt must not recurse
        Ok(lookup.value_by_name("gaussian(2).norm")? * 0.5 + lookup.value_by_index(2)?)
    });
    table.set_derived_expression(4, Some(expr)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // stored 1.0 read back by the nested attempt
    assert_relative_eq!(table.find_by_index(4).unwrap().value(), 1.5);

    table.sync_derived(Severity::Strict).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_relative_eq!(table.find_by_index(4).unwrap().value(), 1.75);
}

#[test]
fn test_formula_across_blocks() {
    let mut table = lines();
    table
        .set_derived_expression(
            3,
            Some(DerivedExpression::formula("{gaussian(1).LineE} * 1.1").unwrap()),
        )
        .unwrap();
    assert!(table.find_by_index(3).unwrap().is_frozen());
    assert_relative_eq!(table.find_by_index(3).unwrap().value(), 7.04, epsilon = 1e-12);

    // every sync point follows the source
    let packed = table.pack_variable().unwrap();
    assert_eq!(packed.global_index, vec![1, 2, 4]);
    table.unpack_variable(&ndarray::array![5.0, 2.0, 3.0]).unwrap();
    assert_relative_eq!(table.find_by_index(3).unwrap().value(), 5.5, epsilon = 1e-12);

    table.set_derived_expression(3, None).unwrap();
    assert!(!table.find_by_index(3).unwrap().is_frozen());
}

#[test]
fn test_strict_pack_rejects_out_of_range_derived() {
    let mut table = lines();
    table
        .set_derived_expression(2, Some(DerivedExpression::formula("p1 - 10").unwrap()))
        .unwrap();
    // lenient install kept the old value
    assert_relative_eq!(table.find_by_index(2).unwrap().value(), 1.0);
    assert!(table.pack_variable().is_err());
}
