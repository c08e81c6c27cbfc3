//! Property tests for the buffer and for mode equivalence

use cranelift::prelude::*;
use duet_core::jit::JitCompiler;
use duet_core::{
    BitsetTable, Catalog, Comparison, ExecutionMode, Executor, ExecutorConfig, JitConfig, PodVec,
    PodVecHandle, QueryPlan, Relation, Selection,
};
use proptest::prelude::*;

fn execute(
    mode: ExecutionMode,
    catalog: &Catalog,
    plan: &QueryPlan<'_>,
) -> duet_core::QueryResult {
    Executor::new(ExecutorConfig {
        mode,
        ..ExecutorConfig::default()
    })
    .execute(catalog, plan)
    .unwrap()
    .result
}

/// Capacity after `n` pushes onto a fresh buffer of capacity `init`
fn expected_capacity(init: usize, n: usize) -> usize {
    let mut capacity = init;
    while capacity < n {
        capacity *= 2;
    }
    capacity
}

proptest! {
    #[test]
    fn prop_push_preserves_order_and_doubles(
        values in prop::collection::vec(any::<u32>(), 0..600),
    ) {
        let mut vec = PodVec::<u32, 4>::new();
        for &v in &values {
            vec.push_back(v);
        }
        prop_assert_eq!(vec.len(), values.len());
        prop_assert_eq!(vec.as_slice(), values.as_slice());
        prop_assert_eq!(vec.capacity(), expected_capacity(4, values.len()));
    }

    #[test]
    fn prop_equality_ignores_capacity(
        values in prop::collection::vec(any::<u64>(), 1..200),
        index in any::<prop::sample::Index>(),
        delta in 1u64..,
    ) {
        let mut small: PodVec<u64, 1> = values.iter().copied().collect();
        let large: PodVec<u64, 512> = values.iter().copied().collect();
        prop_assert!(small == large);

        let i = index.index(values.len());
        small[i] = small[i].wrapping_add(delta);
        prop_assert!(small != large);
    }

    #[test]
    fn prop_semi_join_count_and_order(
        members in prop::collection::btree_set(0u64..256, 0..64),
        probes in prop::collection::vec(0u64..300, 0..200),
    ) {
        let catalog = Catalog::new(vec![Relation::new(0, vec![probes.clone()]).unwrap()]).unwrap();
        let index = BitsetTable::from_values(members.iter().copied(), 1 << 16).unwrap();
        let plan = QueryPlan::new([0])
            .semi_join(Selection::new(0, 0), &index)
            .collect_rows(0)
            .project(Selection::new(0, 0));

        let expected_rows: Vec<u64> = probes
            .iter()
            .enumerate()
            .filter(|(_, v)| members.contains(v))
            .map(|(row, _)| row as u64)
            .collect();

        for mode in [ExecutionMode::Interpret, ExecutionMode::Compile] {
            let result = execute(mode, &catalog, &plan);
            prop_assert_eq!(result.amount(), expected_rows.len() as u64);
            prop_assert_eq!(result.rows(), Some(expected_rows.as_slice()));
        }
    }

    #[test]
    fn prop_modes_agree(
        left in prop::collection::vec((any::<u64>(), 0u64..50), 0..40),
        right in prop::collection::vec(0u64..50, 0..20),
        op in prop_oneof![
            Just(Comparison::Less),
            Just(Comparison::Greater),
            Just(Comparison::Equal),
        ],
        constant in 0u64..50,
    ) {
        let (values, keys): (Vec<u64>, Vec<u64>) = left.into_iter().unzip();
        let catalog = Catalog::new(vec![
            Relation::new(0, vec![values, keys]).unwrap(),
            Relation::new(1, vec![right]).unwrap(),
        ])
        .unwrap();
        let index = catalog.build_membership(1, 0, 1 << 16).unwrap();
        let plan = QueryPlan::new([0, 1])
            .filter(Selection::new(1, 0), op, constant)
            .semi_join(Selection::new(0, 1), &index)
            .collect_rows(1)
            .project(Selection::new(0, 0))
            .project(Selection::new(1, 0));

        let interpreted = execute(ExecutionMode::Interpret, &catalog, &plan);
        let compiled = execute(ExecutionMode::Compile, &catalog, &plan);
        prop_assert_eq!(interpreted, compiled);
    }

    #[test]
    fn prop_generated_push_back_mirrors_host(
        values in prop::collection::vec(any::<u64>(), 0..300),
    ) {
        let mut host = PodVec::<u64, 4>::new();
        host.extend(values.iter().copied());

        let mut generated = PodVec::<u64, 4>::new();
        let target = &mut generated as *mut PodVec<u64, 4>;
        let base = values.as_ptr();
        let len = values.len() as u64;

        let mut jit = JitCompiler::new(JitConfig::default());
        let function = jit
            .build_function("mirror", |fb, _results| {
                let handle = PodVecHandle::<u64>::from_host(fb, target);
                let zero = fb.iconst(0);
                let i = fb.declare_var(types::I64, zero);
                let end = fb.iconst(len);
                let base = fb.embed_ptr(base);
                fb.for_range(i, end, |fb| {
                    let idx = fb.use_var(i);
                    let off = fb.builder().ins().ishl_imm(idx, 3);
                    let addr = fb.builder().ins().iadd(base, off);
                    let value = fb.load(types::I64, addr, 0);
                    handle.push_back(fb, value)
                })?;
                Ok(handle.size(fb))
            })
            .unwrap();
        let mut unused = PodVec::<u64>::new();
        let size = unsafe { function.call(&mut unused) };
        drop(function);

        prop_assert_eq!(size, len);
        prop_assert_eq!(generated.capacity(), host.capacity());
        prop_assert!(generated == host);
    }
}
