use proptest::prelude::*;
use std::collections::BTreeSet;
use strata::error::{ConfigurationError, InternalError};
use strata::properties::{
    BlockRestriction, Dual, ObjectParameters, PropertyRegistry, PropertyStore, RepresentationKind, SpatialClass,
    TimeState,
};
use util::assert_panics;

fn params(name: &str) -> ObjectParameters {
    ObjectParameters::new(name, SpatialClass::Block)
}

fn configuration_error(report: eyre::Report) -> ConfigurationError {
    report
        .downcast_ref::<ConfigurationError>()
        .cloned()
        .unwrap_or_else(|| panic!("expected a configuration error, got: {report:?}"))
}

#[test]
fn declared_property_is_readable_by_consumer() {
    let mut registry = PropertyRegistry::new();
    let output = registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    let input = registry
        .resolver(params("consumer"))
        .unwrap()
        .get::<f64>("density")
        .unwrap();
    let layout = registry.resolve(4).unwrap();

    assert_eq!(input.id(), output.id());
    assert_eq!(layout.property_name(input.id()), "density");
    assert_eq!(layout.property_class(input.id()), SpatialClass::Block);
    assert!(layout.is_produced(input.id()));
    assert!(!layout.is_stateful(input.id()));

    let mut store = PropertyStore::new(layout, SpatialClass::Block);
    store.resize(3);
    store.get_mut(&output).copy_from_slice(&[1.0, 2.0, 3.0]);
    assert_eq!(&*store.get(&input), &[1.0, 2.0, 3.0]);
}

#[test]
fn requests_may_precede_declarations() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("consumer"))
        .unwrap()
        .get::<f64>("density")
        .unwrap();
    registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    assert!(registry.resolve(1).is_ok());
}

#[test]
fn missing_property_is_reported_at_resolution() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("consumer"))
        .unwrap()
        .get::<f64>("density")
        .unwrap();
    let error = configuration_error(registry.resolve(1).unwrap_err());
    assert_eq!(
        error,
        ConfigurationError::MissingProperty {
            object: "consumer".to_string(),
            property: "density".to_string(),
            class: SpatialClass::Block,
        }
    );
    insta::assert_snapshot!(error.to_string(), @"object `consumer` requests property `density` (Block), but no object declares it");
}

#[test]
fn spatial_classes_have_separate_namespaces() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    registry
        .resolver(ObjectParameters::new("boundary", SpatialClass::Boundary))
        .unwrap()
        .get::<f64>("density")
        .unwrap();
    let error = configuration_error(registry.resolve(1).unwrap_err());
    assert!(matches!(error, ConfigurationError::MissingProperty { class: SpatialClass::Boundary, .. }));
}

#[test]
fn overlapping_declarations_are_rejected() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("a").with_blocks(BlockRestriction::blocks([0, 1])))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    let error = registry
        .resolver(params("b").with_blocks(BlockRestriction::blocks([1, 2])))
        .unwrap()
        .declare::<f64>("density")
        .unwrap_err();
    assert_eq!(
        configuration_error(error),
        ConfigurationError::DuplicateDeclaration {
            object: "b".to_string(),
            property: "density".to_string(),
            class: SpatialClass::Block,
            existing: "a".to_string(),
        }
    );
}

#[test]
fn disjoint_declarations_jointly_cover_consumer() {
    let mut registry = PropertyRegistry::new();
    for (name, block) in [("a", 0), ("b", 1)] {
        registry
            .resolver(params(name).with_blocks(BlockRestriction::blocks([block])))
            .unwrap()
            .declare::<f64>("density")
            .unwrap();
    }
    registry
        .resolver(params("consumer").with_blocks(BlockRestriction::blocks([0, 1])))
        .unwrap()
        .get::<f64>("density")
        .unwrap();
    assert!(registry.resolve(1).is_ok());
}

#[test]
fn partially_covered_request_is_rejected() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer").with_blocks(BlockRestriction::blocks([0])))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    registry
        .resolver(params("consumer"))
        .unwrap()
        .get::<f64>("density")
        .unwrap();
    let error = configuration_error(registry.resolve(1).unwrap_err());
    assert_eq!(
        error,
        ConfigurationError::BlockRestrictionMismatch {
            object: "consumer".to_string(),
            property: "density".to_string(),
        }
    );
}

#[test]
fn type_mismatch_is_rejected() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    let error = registry
        .resolver(params("consumer"))
        .unwrap()
        .get::<u32>("density")
        .unwrap_err();
    assert!(matches!(
        configuration_error(error),
        ConfigurationError::TypeMismatch { requested: "u32", declared: "f64", .. }
    ));
}

#[test]
fn representation_mismatch_is_rejected() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer"))
        .unwrap()
        .declare_with_derivatives::<f64>("density")
        .unwrap();
    let mut resolver = registry.resolver(params("consumer")).unwrap();
    let plain = resolver.get::<f64>("density").unwrap_err();
    assert!(matches!(
        configuration_error(plain),
        ConfigurationError::RepresentationMismatch { .. }
    ));
    assert!(resolver.get_with_derivatives::<f64>("density").is_ok());
}

#[test]
fn derivatives_are_stored_with_values() {
    let mut registry = PropertyRegistry::new();
    let output = registry
        .resolver(params("producer"))
        .unwrap()
        .declare_with_derivatives::<f64>("density")
        .unwrap();
    let layout = registry.resolve(2).unwrap();
    assert_eq!(layout.representation(output.id()), RepresentationKind::WithDerivatives);

    let mut store = PropertyStore::new(layout, SpatialClass::Block);
    store.resize(2);
    store.get_mut(&output)[1] = Dual::new(3.0, vec![1.0, -1.0]);
    let values = store.get(&output.reader());
    assert_eq!(values[0], Dual::default());
    assert_eq!(values[1].value, 3.0);
    assert_eq!(values[1].derivatives, vec![1.0, -1.0]);
}

#[test]
fn history_requests_respect_object_settings() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer"))
        .unwrap()
        .declare_with_derivatives::<f64>("density")
        .unwrap();

    let mut resolver = registry
        .resolver(params("stateless").with_stateful(false))
        .unwrap();
    let error = resolver.get_old::<f64>("density").unwrap_err();
    assert!(matches!(
        configuration_error(error),
        ConfigurationError::StatefulnessDisabled { state: TimeState::Old, .. }
    ));

    let mut resolver = registry.resolver(params("consumer")).unwrap();
    let error = resolver
        .get_generic::<f64, strata::properties::WithDerivatives>("density", TimeState::Older)
        .unwrap_err();
    assert!(matches!(
        configuration_error(error),
        ConfigurationError::DerivativesOfHistoryRequested { state: TimeState::Older, .. }
    ));
}

#[test]
fn history_depth_is_the_oldest_requested_state() {
    let mut registry = PropertyRegistry::new();
    let mut resolver = registry.resolver(params("producer")).unwrap();
    let output = resolver.declare::<f64>("strain").unwrap();
    resolver.declare::<f64>("stress").unwrap();
    resolver.get_old::<f64>("strain").unwrap();
    registry
        .resolver(params("consumer"))
        .unwrap()
        .get_older::<f64>("strain")
        .unwrap();
    assert!(registry.is_stateful("strain", SpatialClass::Block));
    assert!(!registry.is_stateful("stress", SpatialClass::Block));

    let layout = registry.resolve(1).unwrap();
    assert_eq!(layout.oldest_state(output.id()), TimeState::Older);
    let stateful: Vec<_> = layout.stateful_properties(SpatialClass::Block).collect();
    assert_eq!(stateful, vec![output.id()]);
}

#[test]
fn declare_suffix_is_appended() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer").with_declare_suffix("water"))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    registry
        .resolver(params("consumer"))
        .unwrap()
        .get::<f64>("density_water")
        .unwrap();
    assert_eq!(
        registry.supplied_properties("producer").unwrap(),
        BTreeSet::from(["density_water".to_string()])
    );
    assert!(registry.resolve(1).is_ok());
}

#[test]
fn supplied_and_requested_properties_are_tracked() {
    let mut registry = PropertyRegistry::new();
    let mut resolver = registry.resolver(params("material")).unwrap();
    resolver.declare::<f64>("b").unwrap();
    resolver.declare::<f64>("a").unwrap();
    resolver.get::<f64>("c").unwrap();
    resolver.get_optional::<f64>("d", TimeState::Current).unwrap();

    let supplied: Vec<_> = registry
        .supplied_properties("material")
        .unwrap()
        .into_iter()
        .collect();
    let requested: Vec<_> = registry
        .requested_properties("material")
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(supplied, ["a", "b"]);
    assert_eq!(requested, ["c", "d"]);

    let error = registry.supplied_properties("unknown").unwrap_err();
    assert!(matches!(configuration_error(error), ConfigurationError::UnknownObject { .. }));
}

#[test]
fn registry_is_frozen_after_resolution() {
    let mut registry = PropertyRegistry::new();
    registry.resolver(params("a")).unwrap();
    let error = registry.resolver(params("a")).unwrap_err();
    assert!(matches!(configuration_error(error), ConfigurationError::DuplicateObject { .. }));

    registry.resolve(1).unwrap();
    assert!(registry.is_resolved());
    let error = registry.resolver(params("b")).unwrap_err();
    assert!(matches!(configuration_error(error), ConfigurationError::OutsideConstruction { .. }));

    let error = registry.resolve(1).unwrap_err();
    assert_eq!(error.downcast_ref::<InternalError>(), Some(&InternalError::AlreadyResolved));
}

#[test]
fn evaluation_order_follows_current_reads() {
    let mut registry = PropertyRegistry::new();
    let mut consumer = registry.resolver(params("consumer")).unwrap();
    consumer.get::<f64>("b").unwrap();
    consumer.declare::<f64>("c").unwrap();
    let mut middle = registry.resolver(params("middle")).unwrap();
    middle.get::<f64>("a").unwrap();
    middle.declare::<f64>("b").unwrap();
    registry
        .resolver(params("source"))
        .unwrap()
        .declare::<f64>("a")
        .unwrap();
    registry
        .resolver(params("independent"))
        .unwrap()
        .declare::<f64>("d")
        .unwrap();

    let layout = registry.resolve(1).unwrap();
    assert_eq!(layout.evaluation_order(SpatialClass::Block), ["source", "middle", "consumer", "independent"]);
    assert_eq!(layout.evaluation_rank(SpatialClass::Block, "consumer"), Some(2));
    assert_eq!(layout.evaluation_rank(SpatialClass::Block, "nobody"), None);
    assert!(layout.evaluation_order(SpatialClass::Boundary).is_empty());
}

#[test]
fn history_reads_do_not_constrain_order() {
    let mut registry = PropertyRegistry::new();
    let mut a = registry.resolver(params("a")).unwrap();
    a.declare::<f64>("x").unwrap();
    a.get_old::<f64>("y").unwrap();
    let mut b = registry.resolver(params("b")).unwrap();
    b.declare::<f64>("y").unwrap();
    b.get::<f64>("x").unwrap();

    let layout = registry.resolve(1).unwrap();
    assert_eq!(layout.evaluation_order(SpatialClass::Block), ["a", "b"]);
}

#[test]
fn dependency_cycles_are_reported() {
    let mut registry = PropertyRegistry::new();
    let mut a = registry.resolver(params("a")).unwrap();
    a.declare::<f64>("x").unwrap();
    a.get::<f64>("y").unwrap();
    let mut b = registry.resolver(params("b")).unwrap();
    b.declare::<f64>("y").unwrap();
    b.get::<f64>("x").unwrap();
    registry
        .resolver(params("c"))
        .unwrap()
        .declare::<f64>("z")
        .unwrap();

    let error = configuration_error(registry.resolve(1).unwrap_err());
    assert_eq!(
        error,
        ConfigurationError::DependencyCycle {
            class: SpatialClass::Block,
            objects: vec!["a".to_string(), "b".to_string()],
        }
    );
    insta::assert_snapshot!(error.to_string(), @r###"materials on Block have a cyclic property dependency: ["a", "b"]"###);
}

#[test]
fn optional_property_binds_to_producer() {
    let mut registry = PropertyRegistry::new();
    let output = registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("porosity")
        .unwrap();
    let optional = registry
        .resolver(params("consumer"))
        .unwrap()
        .get_optional::<f64>("porosity", TimeState::Current)
        .unwrap();
    assert!(!optional.is_resolved());

    let layout = registry.resolve(2).unwrap();
    assert!(optional.is_resolved());
    assert!(!optional.is_zero());
    assert_eq!(optional.property().map(|p| p.id()), Some(output.id()));
    // Objects that produce nothing take no part in the evaluation order
    assert_eq!(layout.evaluation_order(SpatialClass::Block), ["producer"]);

    let mut store = PropertyStore::new(layout, SpatialClass::Block);
    store.resize(2);
    store.get_mut(&output).copy_from_slice(&[0.25, 0.5]);
    assert_eq!(&*optional.values(&store), &[0.25, 0.5]);
}

#[test]
fn unavailable_optional_properties_read_zero() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer").with_blocks(BlockRestriction::blocks([0])))
        .unwrap()
        .declare::<f64>("porosity")
        .unwrap();
    let mut consumer = registry.resolver(params("consumer")).unwrap();
    let partial = consumer
        .get_optional::<f64>("porosity", TimeState::Current)
        .unwrap();
    let missing = consumer
        .get_optional::<f64>("saturation", TimeState::Old)
        .unwrap();
    let other_type = consumer
        .get_optional::<[f64; 2]>("velocity", TimeState::Current)
        .unwrap();

    let layout = registry.resolve(3).unwrap();
    assert!(partial.is_zero());
    assert!(missing.is_zero());
    assert!(other_type.is_zero());
    assert!(!registry.is_stateful("saturation", SpatialClass::Block));

    let mut store = PropertyStore::new(layout, SpatialClass::Block);
    store.resize(2);
    assert_eq!(&*partial.values(&store), &[0.0, 0.0]);
    assert_eq!(&*missing.values(&store), &[0.0, 0.0]);
    assert_eq!(&*other_type.values(&store), &[[0.0, 0.0], [0.0, 0.0]]);
}

#[test]
fn optional_history_request_makes_property_stateful() {
    let mut registry = PropertyRegistry::new();
    let output = registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("saturation")
        .unwrap();
    registry
        .resolver(params("consumer"))
        .unwrap()
        .get_optional::<f64>("saturation", TimeState::Old)
        .unwrap();
    // Not known until the request is bound
    assert!(!registry.is_stateful("saturation", SpatialClass::Block));

    let layout = registry.resolve(1).unwrap();
    assert!(layout.is_stateful(output.id()));
    assert_eq!(layout.oldest_state(output.id()), TimeState::Old);
}

#[test]
fn optional_property_type_mismatch_is_rejected() {
    let mut registry = PropertyRegistry::new();
    registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("porosity")
        .unwrap();
    registry
        .resolver(params("consumer"))
        .unwrap()
        .get_optional::<u32>("porosity", TimeState::Current)
        .unwrap();
    let error = configuration_error(registry.resolve(1).unwrap_err());
    assert!(matches!(error, ConfigurationError::TypeMismatch { .. }));
}

#[test]
fn optional_property_read_before_resolution_panics() {
    let mut registry = PropertyRegistry::new();
    let optional = registry
        .resolver(params("consumer"))
        .unwrap()
        .get_optional::<f64>("porosity", TimeState::Current)
        .unwrap();
    assert_panics!(optional.is_zero());
    assert_panics!(optional.property());
}

#[test]
fn conflicting_store_access_panics() {
    let mut registry = PropertyRegistry::new();
    let output = registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    let layout = registry.resolve(2).unwrap();
    let mut store = PropertyStore::new(layout, SpatialClass::Block);
    store.resize(2);

    {
        let _first = store.get(&output.reader());
        let _second = store.get(&output.reader());
        assert_panics!(store.get_mut(&output));
    }
    {
        let _writer = store.get_mut(&output);
        assert_panics!(store.get(&output.reader()));
    }
    assert_panics!(store.resize(3));
}

#[test]
fn store_resize_keeps_existing_values() {
    let mut registry = PropertyRegistry::new();
    let output = registry
        .resolver(params("producer"))
        .unwrap()
        .declare::<f64>("density")
        .unwrap();
    let layout = registry.resolve(4).unwrap();
    let mut store = PropertyStore::new(layout, SpatialClass::Block);
    store.resize(2);
    store.get_mut(&output).copy_from_slice(&[1.0, 2.0]);
    store.resize(4);
    assert_eq!(&*store.get(&output.reader()), &[1.0, 2.0, 0.0, 0.0]);
    store.resize(1);
    assert_eq!(store.num_qp(), 1);
    assert_eq!(&*store.get(&output.reader()), &[1.0]);
}

/// A set of objects where object `i` produces `p{i}` and reads some `p{j}` with `j < i`.
fn acyclic_objects() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1..8usize)
        .prop_flat_map(|n| {
            let reads = (0..n)
                .map(|i| proptest::collection::btree_set(0..i.max(1), 0..=i).prop_map(move |set| {
                    set.into_iter().filter(|&j| j < i).collect::<Vec<_>>()
                }))
                .collect::<Vec<_>>();
            let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
            (reads, order)
        })
}

proptest! {
    #[test]
    fn evaluation_order_respects_dependencies((reads, registration_order) in acyclic_objects()) {
        let mut registry = PropertyRegistry::new();
        for &i in &registration_order {
            let mut resolver = registry.resolver(params(&format!("m{i}"))).unwrap();
            resolver.declare::<f64>(&format!("p{i}")).unwrap();
            for j in &reads[i] {
                resolver.get::<f64>(&format!("p{j}")).unwrap();
            }
        }
        let layout = registry.resolve(1).unwrap();
        let order = layout.evaluation_order(SpatialClass::Block);
        prop_assert_eq!(order.len(), reads.len());

        let rank = |i: usize| layout.evaluation_rank(SpatialClass::Block, &format!("m{i}")).unwrap();
        for (i, dependencies) in reads.iter().enumerate() {
            for &j in dependencies {
                prop_assert!(rank(j) < rank(i));
            }
        }
    }
}
