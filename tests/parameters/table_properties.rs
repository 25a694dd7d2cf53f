//! Invariants of the parameter table checked over seeded random tables.

use crate::test_helpers::{is_nested, random_table, state};
use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use specfit_rs::parameters::{ParameterDefaults, ParameterTable};
use specfit_rs::FitError;

const SEEDS: u64 = 64;

#[test]
fn test_pack_unpack_all_round_trip() {
    for seed in 0..SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut table = random_table(&mut rng);
        let before = table.snapshot();

        let packed = table.pack_all().unwrap();
        assert_eq!(packed.len(), table.count_params().in_use);
        table.unpack_all(&packed.values).unwrap();

        for (entry, record) in before.entries.iter().zip(table.iter()) {
            assert_eq!(entry.global_index, record.global_index());
            assert_eq!(entry.value.to_bits(), record.value().to_bits(), "seed {}", seed);
        }
    }
}

#[test]
fn test_unpack_variable_round_trip() {
    for seed in 0..SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut table = random_table(&mut rng);
        let Ok(packed) = table.pack_variable() else {
            continue;
        };
        let before = table.values_all();
        table.unpack_variable(&packed.values).unwrap();
        assert_eq!(table.values_all(), before);
    }
}

#[test]
fn test_pack_variable_excludes_frozen_and_tied() {
    for seed in 0..SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut table = random_table(&mut rng);
        let n = table.count_params().in_use;

        for _ in 0..rng.gen_range(0..=n) {
            let a = rng.gen_range(1..=n);
            let b = rng.gen_range(1..=n);
            // self ties and cycles are refused; either way the table stays consistent
            let _ = table.set_tie(a, b);
        }

        let free = table.count_params().free;
        match table.pack_variable() {
            Ok(packed) => {
                assert_eq!(packed.len(), free, "seed {}", seed);
                for (vary, &index) in packed.global_index.iter().enumerate() {
                    let record = table.find_by_index(index).unwrap();
                    assert!(!record.is_frozen());
                    assert!(!record.is_tied());
                    assert_eq!(record.vary_index(), Some(vary));
                    assert_eq!(table.find_by_vary_index(vary).unwrap().global_index(), index);
                }
            }
            Err(FitError::NoFreeParameters) => assert_eq!(free, 0),
            Err(e) => panic!("seed {}: unexpected {}", seed, e),
        }
    }
}

#[test]
fn test_bounds_stay_nested() {
    for seed in 0..SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut table = random_table(&mut rng);
        let n = table.count_params().in_use;

        for _ in 0..50 {
            let index = rng.gen_range(1..=n);
            let before = state(&table, index);
            let min = rng.gen_range(-1500.0..1500.0);
            let max = rng.gen_range(-1500.0..1500.0);

            if table.set_bounds(index, min, max).is_err() {
                assert_eq!(state(&table, index), before, "seed {}", seed);
            }
            if rng.gen_bool(0.5) {
                let value = rng.gen_range(-1500.0..1500.0);
                let before = state(&table, index);
                if table.set_value(index, value).is_err() {
                    assert_eq!(state(&table, index), before);
                }
            }
            assert!(table.iter().all(is_nested), "seed {}", seed);
        }
    }
}

#[test]
fn test_register_rejects_unnested_defaults() {
    let mut table = ParameterTable::new();
    let outside = vec![ParameterDefaults::new("kT", 50.0)
        .with_bounds(0.0, 100.0)
        .with_hard_limits(0.0, 20.0)];
    assert!(table.register("bbody", 1, 1, 1, &outside).unwrap_err().is_configuration());
    assert!(table.is_empty());

    // swapped hard limits are repaired
    let swapped = vec![ParameterDefaults::new("kT", 5.0).with_hard_limits(20.0, 0.0)];
    table.register("bbody", 1, 1, 1, &swapped).unwrap();
    let record = table.find_by_index(1).unwrap();
    assert_eq!((record.hard_min(), record.hard_max()), (0.0, 20.0));
    assert!(is_nested(record));
}

#[test]
fn test_tie_follows_target_only() {
    let mut table = ParameterTable::new();
    let defaults = vec![
        ParameterDefaults::new("nH", 0.1).with_bounds(0.0, 10.0),
        ParameterDefaults::new("nH2", 3.0).with_bounds(0.0, 100.0),
    ];
    table.register("absorb", 1, 1, 2, &defaults).unwrap();

    // A = p2 tied to B = p1
    table.set_tie(2, 1).unwrap();
    table.sync_tied().unwrap();
    assert_eq!(state(&table, 2), state(&table, 1));

    table.set_value(1, 4.0).unwrap();
    table.set_bounds(1, 1.0, 8.0).unwrap();
    table.sync_tied().unwrap();
    assert_eq!(state(&table, 2), (4.0, 1.0, 8.0));

    table.set_value(2, 2.0).unwrap();
    table.sync_tied().unwrap();
    assert_eq!(state(&table, 1), (4.0, 1.0, 8.0));
    assert_relative_eq!(table.find_by_index(2).unwrap().value(), 4.0);
}

#[test]
fn test_tie_across_blocks_and_untie() {
    let mut table = ParameterTable::new();
    let defaults = vec![ParameterDefaults::new("Sigma", 0.2).with_bounds(0.0, 1.0)];
    table.register("gaussian", 1, 1, 1, &defaults).unwrap();
    table.register("gaussian", 2, 1, 1, &defaults).unwrap();

    table.set_tie(2, 1).unwrap();
    assert!(table.find_by_index(2).unwrap().is_frozen());
    assert_eq!(table.find_by_index(2).unwrap().tie_target(), Some("gaussian(1).Sigma"));
    assert_eq!(table.count_params().free, 1);

    table.set_tie(2, 0).unwrap();
    assert!(!table.find_by_index(2).unwrap().is_tied());
    assert_eq!(table.count_params().free, 2);
}
