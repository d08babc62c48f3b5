use crate::unit_tests::fixtures::{
    block_params, Counter, Diffusion, Diffusivity, Failing, Leaky, LinearSegments, Pin, Scaled, SolutionReducer,
};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use strata::objects::{ObjectWarehouse, Reduction};
use strata::properties::{BlockRestriction, PropertyLayout, PropertyRegistry, SpatialClass, StatefulStorage};
use strata::scheduler::{ElementLoopScheduler, Evaluation, SchedulerSettings, SharedAccumulator};
use strata::tags::{assemble_pattern, TagRegistry, TagSelection, TaggedStorage, NONTIME_TAG, SYSTEM_TAG, TIME_TAG};
use util::assert_panics;

fn scheduler(num_threads: usize) -> ElementLoopScheduler<f64> {
    ElementLoopScheduler::new(SchedulerSettings {
        num_threads,
        min_chunk_len: 1,
    })
    .unwrap()
}

/// Storage with the NONTIME residual and the SYSTEM matrix allocated.
fn storage(tags: &TagRegistry, mesh: &LinearSegments) -> TaggedStorage<f64> {
    let mut storage = TaggedStorage::new(tags, mesh.num_dofs());
    storage.allocate_vector(tags.vector_tag_id(NONTIME_TAG).unwrap());
    storage.allocate_matrix(tags.matrix_tag_id(SYSTEM_TAG).unwrap(), assemble_pattern(mesh));
    storage
}

/// A diffusion problem with diffusivity `base * (1 + slope * u)`.
fn diffusion_problem(tags: &TagRegistry, base: f64, slope: f64) -> (ObjectWarehouse<f64>, Arc<PropertyLayout>) {
    let mut registry = PropertyRegistry::new();
    // The kernel is constructed before the material that supplies its property
    let kernel = Diffusion::new(&mut registry, block_params("diffusion"), TagSelection::default(), "diffusivity").unwrap();
    let material = Diffusivity::new(&mut registry, block_params("diffusivity"), base, slope).unwrap();
    let layout = registry.resolve(3).unwrap();

    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse.add_material(Box::new(material)).unwrap();
    warehouse.add_kernel(Box::new(kernel), tags).unwrap();
    (warehouse, layout)
}

fn residual_and_jacobian(
    scheduler: &ElementLoopScheduler<f64>,
    mesh: &LinearSegments,
    slope: f64,
) -> (DVector<f64>, DMatrix<f64>) {
    let tags = TagRegistry::with_standard_tags();
    let (warehouse, layout) = diffusion_problem(&tags, 1.0, slope);
    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, mesh);
    let summary = scheduler
        .execute(mesh, &warehouse, &mut stateful, &mut storage, Evaluation::ResidualAndJacobian)
        .unwrap();
    assert_eq!(summary.num_entities, mesh.num_dofs() - 1);

    let residual = storage
        .vector(tags.vector_tag_id(NONTIME_TAG).unwrap())
        .unwrap()
        .clone();
    let jacobian = DMatrix::from(storage.matrix(tags.matrix_tag_id(SYSTEM_TAG).unwrap()).unwrap());
    (residual, jacobian)
}

#[test]
fn chunks_cover_all_entities() {
    let scheduler = ElementLoopScheduler::<f64>::new(SchedulerSettings {
        num_threads: 4,
        min_chunk_len: 1,
    })
    .unwrap();
    assert_eq!(scheduler.num_threads(), 4);
    assert_eq!(scheduler.chunk_ranges(10), vec![0..3, 3..6, 6..9, 9..10]);
    assert_eq!(scheduler.chunk_ranges(2), vec![0..1, 1..2]);
    assert!(scheduler.chunk_ranges(0).is_empty());

    let scheduler = ElementLoopScheduler::<f64>::new(SchedulerSettings {
        num_threads: 4,
        min_chunk_len: 8,
    })
    .unwrap();
    assert_eq!(scheduler.chunk_ranges(10), vec![0..8, 8..10]);
}

#[test]
fn settings_deserialize_with_defaults() {
    let settings: SchedulerSettings = serde_json::from_str(r#"{ "num_threads": 3 }"#).unwrap();
    assert_eq!(
        settings,
        SchedulerSettings {
            num_threads: 3,
            min_chunk_len: 1
        }
    );
}

#[test]
fn linear_solution_has_boundary_flux_residual() {
    let mesh = LinearSegments::new(8, |x| 2.0 * x);
    let (residual, jacobian) = residual_and_jacobian(&scheduler(2), &mesh, 0.0);

    // Interior residuals of a linear field vanish, the boundary ones carry the flux
    let mut expected = DVector::zeros(9);
    expected[0] = -2.0;
    expected[8] = 2.0;
    assert_matrix_eq!(residual, expected, comp = abs, tol = 1e-12);

    // The problem is linear in u
    assert_matrix_eq!(&jacobian * mesh.solution(), residual, comp = abs, tol = 1e-12);
    assert_matrix_eq!(jacobian.transpose(), jacobian, comp = abs, tol = 1e-12);
}

#[test]
fn thread_count_does_not_change_results() {
    let mesh = LinearSegments::new(37, |x| (3.0 * x).sin());
    let (residual_1, jacobian_1) = residual_and_jacobian(&scheduler(1), &mesh, 0.5);
    for num_threads in [2, 3, 8] {
        let (residual, jacobian) = residual_and_jacobian(&scheduler(num_threads), &mesh, 0.5);
        assert_matrix_eq!(residual, residual_1, comp = abs, tol = 1e-12);
        assert_matrix_eq!(jacobian, jacobian_1, comp = abs, tol = 1e-12);
    }
}

#[test]
fn evaluation_selects_residual_or_jacobian() {
    let mesh = LinearSegments::new(4, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let (warehouse, layout) = diffusion_problem(&tags, 1.0, 0.0);
    let mut stateful = StatefulStorage::new(layout);
    let scheduler = scheduler(2);
    let nontime = tags.vector_tag_id(NONTIME_TAG).unwrap();
    let system = tags.matrix_tag_id(SYSTEM_TAG).unwrap();

    let mut residual_only = storage(&tags, &mesh);
    scheduler
        .execute(&mesh, &warehouse, &mut stateful, &mut residual_only, Evaluation::Residual)
        .unwrap();
    assert!(residual_only.vector(nontime).unwrap().norm() > 0.0);
    assert_eq!(residual_only.matrix(system).unwrap().values().iter().sum::<f64>(), 0.0);

    let mut jacobian_only = storage(&tags, &mesh);
    scheduler
        .execute(&mesh, &warehouse, &mut stateful, &mut jacobian_only, Evaluation::Jacobian)
        .unwrap();
    assert_eq!(jacobian_only.vector(nontime).unwrap().norm(), 0.0);
    assert!(jacobian_only.matrix(system).unwrap().values().iter().any(|&v| v != 0.0));

    let mut untouched = storage(&tags, &mesh);
    scheduler
        .execute(&mesh, &warehouse, &mut stateful, &mut untouched, Evaluation::ReductionsOnly)
        .unwrap();
    assert_eq!(untouched.vector(nontime).unwrap().norm(), 0.0);
}

#[test]
fn contributions_accumulate_across_loops() {
    let mesh = LinearSegments::new(4, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let (warehouse, layout) = diffusion_problem(&tags, 1.0, 0.0);
    let mut stateful = StatefulStorage::new(layout);
    let scheduler = scheduler(2);
    let nontime = tags.vector_tag_id(NONTIME_TAG).unwrap();

    let mut storage = storage(&tags, &mesh);
    for _ in 0..2 {
        scheduler
            .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
            .unwrap();
    }
    assert_eq!(storage.vector(nontime).unwrap()[4], 2.0);

    storage.zero();
    scheduler
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .unwrap();
    assert_eq!(storage.vector(nontime).unwrap()[4], 1.0);
}

#[test]
fn assignments_win_over_sums() {
    let mesh = LinearSegments::new(6, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let mut registry = PropertyRegistry::new();
    let kernel = Diffusion::new(&mut registry, block_params("diffusion"), TagSelection::default(), "diffusivity").unwrap();
    let material = Diffusivity::new(&mut registry, block_params("diffusivity"), 1.0, 0.0).unwrap();
    let layout = registry.resolve(2).unwrap();

    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse.add_material(Box::new(material)).unwrap();
    // The pin is added first, so its assignment is recorded before the sums of the same entity
    warehouse
        .add_kernel(Box::new(Pin::new(block_params("pin"), TagSelection::default(), 0, 42.0)), &tags)
        .unwrap();
    warehouse.add_kernel(Box::new(kernel), &tags).unwrap();

    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);
    scheduler(3)
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .unwrap();
    let residual = storage.vector(tags.vector_tag_id(NONTIME_TAG).unwrap()).unwrap();
    assert_eq!(residual[0], 42.0);
    assert!((residual[6] - 1.0).abs() < 1e-12);
}

#[test]
fn materials_are_evaluated_in_dependency_order() {
    let mesh = LinearSegments::new(5, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let mut registry = PropertyRegistry::new();
    // Registered in reverse: diffusivity -> doubled -> tripled -> kernel
    let kernel = Diffusion::new(&mut registry, block_params("diffusion"), TagSelection::default(), "tripled").unwrap();
    let tripled = Scaled::new(&mut registry, block_params("tripled"), "doubled", "tripled", 3.0).unwrap();
    let doubled = Scaled::new(&mut registry, block_params("doubled"), "diffusivity", "doubled", 2.0).unwrap();
    let diffusivity = Diffusivity::new(&mut registry, block_params("diffusivity"), 1.0, 0.0).unwrap();
    let layout = registry.resolve(2).unwrap();
    assert_eq!(layout.evaluation_order(SpatialClass::Block), ["diffusivity", "doubled", "tripled"]);

    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse.add_material(Box::new(tripled)).unwrap();
    warehouse.add_material(Box::new(doubled)).unwrap();
    warehouse.add_material(Box::new(diffusivity)).unwrap();
    warehouse.add_kernel(Box::new(kernel), &tags).unwrap();
    let names: Vec<_> = warehouse
        .materials(SpatialClass::Block, 0)
        .map(|material| material.params().name.clone())
        .collect();
    assert_eq!(names, ["diffusivity", "doubled", "tripled"]);

    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);
    scheduler(2)
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .unwrap();
    // Out of order evaluation would read zero or stale values
    let residual = storage.vector(tags.vector_tag_id(NONTIME_TAG).unwrap()).unwrap();
    assert!((residual[0] + 6.0).abs() < 1e-12);
    assert!((residual[5] - 6.0).abs() < 1e-12);
}

#[test]
fn unregistered_materials_are_rejected() {
    let mut registry = PropertyRegistry::new();
    let material = Diffusivity::new(&mut registry, block_params("diffusivity"), 1.0, 0.0).unwrap();
    let layout = registry.resolve(2).unwrap();

    let mut other = PropertyRegistry::new();
    let stranger = Diffusivity::new(&mut other, block_params("stranger"), 1.0, 0.0).unwrap();

    let mut warehouse = ObjectWarehouse::<f64>::new(layout);
    assert!(warehouse.add_material(Box::new(material)).is_ok());
    assert!(warehouse.add_material(Box::new(stranger)).is_err());
}

#[test]
fn objects_are_restricted_to_their_blocks() {
    let mesh = LinearSegments::new(4, |x| 4.0 * x).with_subdomains(vec![0, 0, 1, 1]);
    let tags = TagRegistry::with_standard_tags();
    let mut registry = PropertyRegistry::new();
    let kernel = Diffusion::new(
        &mut registry,
        block_params("diffusion").with_blocks(BlockRestriction::blocks([0])),
        TagSelection::default(),
        "diffusivity",
    )
    .unwrap();
    let material = Diffusivity::new(&mut registry, block_params("diffusivity"), 1.0, 0.0).unwrap();
    let layout = registry.resolve(2).unwrap();
    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse.add_material(Box::new(material)).unwrap();
    warehouse.add_kernel(Box::new(kernel), &tags).unwrap();
    warehouse.add_reducer(Box::new(SolutionReducer::new(
        block_params("upper_integral").with_blocks(BlockRestriction::blocks([1])),
        Reduction::Sum,
    )));

    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);
    let summary = scheduler(2)
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .unwrap();

    // Only the first two segments contribute, so the flux leaves through node 2
    let residual = storage.vector(tags.vector_tag_id(NONTIME_TAG).unwrap()).unwrap();
    let expected = DVector::from_column_slice(&[-4.0, 0.0, 4.0, 0.0, 0.0]);
    assert_matrix_eq!(residual.clone(), expected, comp = abs, tol = 1e-12);

    // The integral of 4x over [0.5, 1]
    let integral = summary.reductions["upper_integral"].unwrap();
    assert!((integral - 1.5).abs() < 1e-12);
}

#[test]
fn reductions_combine_across_chunks() {
    let mesh = LinearSegments::new(10, |x| x * x);
    let tags = TagRegistry::with_standard_tags();
    let (mut warehouse, layout) = diffusion_problem(&tags, 1.0, 0.0);
    warehouse.add_reducer(Box::new(SolutionReducer::new(block_params("integral"), Reduction::Sum)));
    warehouse.add_reducer(Box::new(SolutionReducer::new(block_params("min"), Reduction::Min)));
    warehouse.add_reducer(Box::new(SolutionReducer::new(block_params("max"), Reduction::Max)));
    warehouse.add_reducer(Box::new(SolutionReducer::new(
        block_params("nowhere").with_blocks(BlockRestriction::blocks([7])),
        Reduction::Sum,
    )));

    let mut stateful = StatefulStorage::new(layout);
    let mut summaries = Vec::new();
    for num_threads in [1, 4] {
        let mut storage = storage(&tags, &mesh);
        let summary = scheduler(num_threads)
            .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::ReductionsOnly)
            .unwrap();
        summaries.push(summary);
    }

    for summary in &summaries {
        // The piecewise linear interpolant of x^2 overestimates its integral by h^2 / 6
        let integral = summary.reductions["integral"].unwrap();
        assert!((integral - (1.0 / 3.0 + 0.01 / 6.0)).abs() < 1e-12);
        assert!(summary.reductions["min"].unwrap() > 0.0);
        assert!(summary.reductions["max"].unwrap() < 1.0);
        assert_eq!(summary.reductions["nowhere"], None);
    }
    assert_eq!(summaries[0].reductions["min"], summaries[1].reductions["min"]);
    assert_eq!(summaries[0].reductions["max"], summaries[1].reductions["max"]);
}

#[test]
fn stateful_properties_advance_with_shift() {
    let mesh = LinearSegments::new(6, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let mut registry = PropertyRegistry::new();
    let counter = Counter::new(&mut registry, block_params("counter"), 10.0, 1.0).unwrap();
    let current = counter.current.reader();
    let layout = registry.resolve(2).unwrap();
    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse.add_material(Box::new(counter)).unwrap();

    let scheduler = scheduler(3);
    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);

    // Without initial values there is no history to read from
    assert!(scheduler
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .is_err());

    scheduler
        .initialize_stateful(&mesh, &warehouse, &mut stateful)
        .unwrap();
    assert_eq!(stateful.len(), 6);

    for step in 1..=3 {
        // Repeated evaluations within a time step read the same Old values
        for _ in 0..2 {
            scheduler
                .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
                .unwrap();
        }
        for entity in 0..6 {
            let history = stateful.history(SpatialClass::Block, entity).unwrap();
            let expected = 10.0 + step as f64;
            assert_eq!(history.values(&current), Some(&[expected, expected][..]));
        }
        stateful.shift();
    }

    let checkpoint = stateful.checkpoint().unwrap();
    let mut restarted = StatefulStorage::new(Arc::clone(warehouse.layout()));
    restarted.restore_checkpoint(&checkpoint).unwrap();
    scheduler
        .execute(&mesh, &warehouse, &mut restarted, &mut storage, Evaluation::Residual)
        .unwrap();
    let history = restarted.history(SpatialClass::Block, 5).unwrap();
    assert_eq!(history.values(&current), Some(&[14.0, 14.0][..]));
}

#[test]
fn errors_name_the_failing_entity_and_object() {
    let mesh = LinearSegments::new(6, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let mut registry = PropertyRegistry::new();
    let failing = Failing::new(&mut registry, block_params("jacobian_check"), 4).unwrap();
    let layout = registry.resolve(2).unwrap();
    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse.add_material(Box::new(failing)).unwrap();

    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);
    let report = scheduler(2)
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .unwrap_err();
    let messages: Vec<_> = report.chain().map(|error| error.to_string()).collect();
    assert_eq!(
        messages,
        [
            "element loop failed on entity 4",
            "material `jacobian_check` failed",
            "negative volume"
        ]
    );
}

#[test]
fn too_many_quadrature_points_is_an_error() {
    let mesh = LinearSegments::new(3, |x| x).with_num_qp(3);
    let tags = TagRegistry::with_standard_tags();
    let (warehouse, layout) = diffusion_problem(&tags, 1.0, 0.0);
    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);

    // The layout was resolved for at most three points
    assert!(scheduler(1)
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .is_ok());

    let mut registry = PropertyRegistry::new();
    let material = Diffusivity::new(&mut registry, block_params("diffusivity"), 1.0, 0.0).unwrap();
    let layout = registry.resolve(2).unwrap();
    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse.add_material(Box::new(material)).unwrap();
    let mut stateful = StatefulStorage::new(layout);
    let report = scheduler(1)
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .unwrap_err();
    assert!(format!("{report:?}").contains("more than the maximum of 2"));
}

#[test]
fn unflushed_local_contributions_panic() {
    let mesh = LinearSegments::new(2, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let mut registry = PropertyRegistry::new();
    let layout = registry.resolve(2).unwrap();
    let mut warehouse = ObjectWarehouse::new(Arc::clone(&layout));
    warehouse
        .add_kernel(Box::new(Leaky::new(block_params("leaky"))), &tags)
        .unwrap();

    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);
    let scheduler = scheduler(1);
    assert_panics!(scheduler.execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual));
}

#[test]
fn shared_accumulator_collects_concurrent_updates() {
    use rayon::prelude::*;

    let accumulator = SharedAccumulator::<f64>::new(4);
    (0..1000usize).into_par_iter().for_each(|i| {
        accumulator.add(i % 4, 1.0);
    });
    accumulator.normalize(0, 250.0);
    accumulator.normalize(1, 0.0);
    accumulator.set(3, -1.0);
    assert_eq!(accumulator.get(0), 1.0);
    assert_eq!(accumulator.get(1), 250.0);
    assert_eq!(accumulator.len(), 4);
    assert_eq!(accumulator.into_inner(), DVector::from_column_slice(&[1.0, 250.0, 250.0, -1.0]));
}

#[test]
fn time_tags_are_untouched_by_nontime_kernels() {
    let mesh = LinearSegments::new(3, |x| x);
    let tags = TagRegistry::with_standard_tags();
    let (warehouse, layout) = diffusion_problem(&tags, 1.0, 0.0);
    let mut stateful = StatefulStorage::new(layout);
    let mut storage = storage(&tags, &mesh);
    let time = tags.vector_tag_id(TIME_TAG).unwrap();
    storage.allocate_vector(time);
    scheduler(2)
        .execute(&mesh, &warehouse, &mut stateful, &mut storage, Evaluation::Residual)
        .unwrap();
    assert_eq!(storage.vector(time), Some(&DVector::zeros(4)));
}
