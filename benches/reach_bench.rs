//! Reachability benchmarks using Criterion.
//!
//! Run with: `cargo bench`
//!
//! Measures the full fixed-point analysis on logistics-style worlds of
//! growing size: one truck, two packages, and a chain of locations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relreach::bindings::{Bindings, Unify};
use relreach::dtg::{DtgBuilder, DtgGraph, ExternalDep, NodeId};
use relreach::engine::ReachabilityEngine;
use relreach::model::{Atom, GroundFact, Model, ObjectId, PatternTerm::Var, PredicateId};

struct World {
    model: Model,
    bindings: Bindings,
    graph: DtgGraph,
    p1: ObjectId,
    p2: ObjectId,
    truck: ObjectId,
    locations: Vec<ObjectId>,
    at: PredicateId,
    inside: PredicateId,
}

fn build_world(num_locations: usize) -> World {
    let mut model = Model::new();
    let object = model.add_type("object", None);
    let locatable = model.add_type("locatable", Some(object));
    let package = model.add_type("package", Some(locatable));
    let truck_ty = model.add_type("truck", Some(locatable));
    let location_ty = model.add_type("location", Some(object));

    let p1 = model.add_object("p1", package);
    let p2 = model.add_object("p2", package);
    let truck = model.add_grounded_object("t", truck_ty);
    let locations: Vec<ObjectId> = (0..num_locations)
        .map(|i| model.add_grounded_object(&format!("l{}", i + 1), location_ty))
        .collect();

    let at = model.add_predicate("at", [locatable, location_ty], Some(0));
    let inside = model.add_predicate("in", [package, truck_ty], Some(0));

    let mut bindings = Bindings::new();
    let vars: Vec<[relreach::model::VarId; 8]> = locations
        .iter()
        .map(|&loc| {
            let v = [
                bindings.declare_var(package, &model),
                bindings.declare_var(location_ty, &model),
                bindings.declare_var(truck_ty, &model),
                bindings.declare_var(package, &model),
                bindings.declare_var(truck_ty, &model),
                bindings.declare_var(location_ty, &model),
                bindings.declare_var(truck_ty, &model),
                bindings.declare_var(location_ty, &model),
            ];
            bindings.set_domain(v[1], &[loc]);
            bindings.set_domain(v[5], &[loc]);
            bindings.set_domain(v[7], &[loc]);
            v
        })
        .collect();

    let mut builder = DtgBuilder::new(&model, &bindings);
    let mut node_at: Vec<NodeId> = Vec::new();
    let mut node_in: Vec<NodeId> = Vec::new();
    let mut node_truck: Vec<NodeId> = Vec::new();
    for v in &vars {
        let [a_p, a_l, _a_t, b_p, b_t, b_l, t_t, t_l] = *v;
        node_at.push(
            builder
                .add_node(vec![Atom::new(at, [Var(a_p), Var(a_l)])])
                .unwrap(),
        );
        node_in.push(
            builder
                .add_node(vec![
                    Atom::new(inside, [Var(b_p), Var(b_t)]),
                    Atom::new(at, [Var(b_t), Var(b_l)]),
                ])
                .unwrap(),
        );
        node_truck.push(
            builder
                .add_node(vec![Atom::new(at, [Var(t_t), Var(t_l)])])
                .unwrap(),
        );
    }
    for (k, v) in vars.iter().enumerate() {
        let [a_p, a_l, a_t, b_p, b_t, b_l, _t_t, _t_l] = *v;
        builder
            .add_transition(
                node_at[k],
                node_in[k],
                vec![
                    Atom::new(at, [Var(a_p), Var(a_l)]),
                    Atom::new(at, [Var(a_t), Var(a_l)]),
                ],
                vec![
                    Atom::new(inside, [Var(a_p), Var(a_t)]),
                    Atom::new(at, [Var(a_t), Var(a_l)]),
                ],
            )
            .unwrap();
        builder
            .add_transition_with_deps(
                node_in[k],
                node_at[k],
                vec![
                    Atom::new(inside, [Var(b_p), Var(b_t)]),
                    Atom::new(at, [Var(b_t), Var(b_l)]),
                ],
                vec![Atom::new(at, [Var(b_p), Var(b_l)])],
                vec![ExternalDep { atom: 1, term: 1 }],
            )
            .unwrap();
    }
    for k in 0..num_locations.saturating_sub(1) {
        let [.., here_t, here_l] = vars[k];
        let [.., there_t, there_l] = vars[k + 1];
        builder
            .add_transition(
                node_truck[k],
                node_truck[k + 1],
                vec![Atom::new(at, [Var(here_t), Var(here_l)])],
                vec![Atom::new(at, [Var(here_t), Var(there_l)])],
            )
            .unwrap();
        builder
            .add_transition(
                node_truck[k + 1],
                node_truck[k],
                vec![Atom::new(at, [Var(there_t), Var(there_l)])],
                vec![Atom::new(at, [Var(there_t), Var(here_l)])],
            )
            .unwrap();
    }
    let graph = builder.build();

    World {
        model,
        bindings,
        graph,
        p1,
        p2,
        truck,
        locations,
        at,
        inside,
    }
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for locations in [2usize, 4, 8] {
        let world = build_world(locations);
        let initial = vec![
            GroundFact::new(world.at, [world.p1, world.locations[0]]),
            GroundFact::new(world.at, [world.p2, world.locations[0]]),
            GroundFact::new(world.at, [world.truck, world.locations[0]]),
        ];
        group.bench_with_input(
            BenchmarkId::from_parameter(locations),
            &locations,
            |b, _| {
                b.iter(|| {
                    let mut engine = ReachabilityEngine::new(
                        &world.model,
                        &world.graph,
                        world.bindings.clone(),
                    );
                    let report = engine.analyze(black_box(&initial)).unwrap();
                    black_box(report.num_equivalence_classes())
                })
            },
        );
    }
    group.finish();
}

fn bench_carry(c: &mut Criterion) {
    let world = build_world(6);
    let initial = vec![
        GroundFact::new(world.inside, [world.p1, world.truck]),
        GroundFact::new(world.at, [world.truck, world.locations[0]]),
    ];
    c.bench_function("analyze_carry_6_locations", |b| {
        b.iter(|| {
            let mut engine =
                ReachabilityEngine::new(&world.model, &world.graph, world.bindings.clone());
            let report = engine.analyze(black_box(&initial)).unwrap();
            black_box(report.all_reachable_facts().len())
        })
    });
}

criterion_group!(benches, bench_analyze, bench_carry);
criterion_main!(benches);
