use crate::bindings::{Bindings, Unify};
use crate::dtg::{DtgBuilder, DtgGraph, ExternalDep, NodeId};
use crate::model::{Atom, GroundFact, Model, ObjectId, PatternTerm::*, PredicateId, VarId};

/// Shared logistics fixture: two packages, one grounded truck, and a chain
/// of grounded locations. Locations are grounded, so the graph carries one
/// node per location for each state fragment:
///
/// - `node_at[k]`:   (at package lk)
/// - `node_in[k]`:   (in package truck) together with (at truck lk)
/// - `node_truck[k]`: (at truck lk)
///
/// Load and unload connect `node_at[k]` and `node_in[k]`; drives connect
/// consecutive truck nodes. Unload carries an external dependency on the
/// truck-location position, which is owned by the truck's space.
pub(crate) struct Logistics {
    pub model: Model,
    pub bindings: Bindings,
    pub graph: DtgGraph,
    pub p1: ObjectId,
    pub p2: ObjectId,
    pub truck: ObjectId,
    pub locations: Vec<ObjectId>,
    pub at: PredicateId,
    pub inside: PredicateId,
    pub node_at: Vec<NodeId>,
    pub node_in: Vec<NodeId>,
    pub node_truck: Vec<NodeId>,
}

struct LocationVars {
    a_p: VarId,
    a_l: VarId,
    a_t: VarId,
    b_p: VarId,
    b_t: VarId,
    b_l: VarId,
    t_t: VarId,
    t_l: VarId,
}

pub(crate) fn logistics(num_locations: usize) -> Logistics {
    assert!(num_locations >= 1);
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
    let vars: Vec<LocationVars> = locations
        .iter()
        .map(|&loc| {
            let v = LocationVars {
                a_p: bindings.declare_var(package, &model),
                a_l: bindings.declare_var(location_ty, &model),
                a_t: bindings.declare_var(truck_ty, &model),
                b_p: bindings.declare_var(package, &model),
                b_t: bindings.declare_var(truck_ty, &model),
                b_l: bindings.declare_var(location_ty, &model),
                t_t: bindings.declare_var(truck_ty, &model),
                t_l: bindings.declare_var(location_ty, &model),
            };
            for lv in [v.a_l, v.b_l, v.t_l] {
                bindings.set_domain(lv, &[loc]);
            }
            v
        })
        .collect();

    let mut builder = DtgBuilder::new(&model, &bindings);
    let mut node_at = Vec::new();
    let mut node_in = Vec::new();
    let mut node_truck = Vec::new();
    for v in &vars {
        node_at.push(
            builder
                .add_node(vec![Atom::new(at, [Var(v.a_p), Var(v.a_l)])])
                .unwrap(),
        );
        node_in.push(
            builder
                .add_node(vec![
                    Atom::new(inside, [Var(v.b_p), Var(v.b_t)]),
                    Atom::new(at, [Var(v.b_t), Var(v.b_l)]),
                ])
                .unwrap(),
        );
        node_truck.push(
            builder
                .add_node(vec![Atom::new(at, [Var(v.t_t), Var(v.t_l)])])
                .unwrap(),
        );
    }
    for (k, v) in vars.iter().enumerate() {
        builder
            .add_transition(
                node_at[k],
                node_in[k],
                vec![
                    Atom::new(at, [Var(v.a_p), Var(v.a_l)]),
                    Atom::new(at, [Var(v.a_t), Var(v.a_l)]),
                ],
                vec![
                    Atom::new(inside, [Var(v.a_p), Var(v.a_t)]),
                    Atom::new(at, [Var(v.a_t), Var(v.a_l)]),
                ],
            )
            .unwrap();
        builder
            .add_transition_with_deps(
                node_in[k],
                node_at[k],
                vec![
                    Atom::new(inside, [Var(v.b_p), Var(v.b_t)]),
                    Atom::new(at, [Var(v.b_t), Var(v.b_l)]),
                ],
                vec![Atom::new(at, [Var(v.b_p), Var(v.b_l)])],
                vec![ExternalDep { atom: 1, term: 1 }],
            )
            .unwrap();
    }
    for k in 0..num_locations.saturating_sub(1) {
        let here = &vars[k];
        let there = &vars[k + 1];
        builder
            .add_transition(
                node_truck[k],
                node_truck[k + 1],
                vec![Atom::new(at, [Var(here.t_t), Var(here.t_l)])],
                vec![Atom::new(at, [Var(here.t_t), Var(there.t_l)])],
            )
            .unwrap();
        builder
            .add_transition(
                node_truck[k + 1],
                node_truck[k],
                vec![Atom::new(at, [Var(there.t_t), Var(there.t_l)])],
                vec![Atom::new(at, [Var(there.t_t), Var(here.t_l)])],
            )
            .unwrap();
    }
    let graph = builder.build();

    Logistics {
        model,
        bindings,
        graph,
        p1,
        p2,
        truck,
        locations,
        at,
        inside,
        node_at,
        node_in,
        node_truck,
    }
}

pub(crate) fn ground(
    predicate: PredicateId,
    objects: impl IntoIterator<Item = ObjectId>,
) -> GroundFact {
    GroundFact::new(predicate, objects)
}

/// Intern ground facts by hand and seed the group manager, the way the
/// engine does before its first iteration.
pub(crate) fn seed_store(
    eogs: &mut crate::eog::EogManager,
    store: &mut crate::fact::FactStore,
    facts: &[GroundFact],
) -> Vec<crate::fact::FactId> {
    let mut ids = Vec::new();
    for fact in facts {
        let terms: Vec<crate::eog::EogId> = fact
            .objects
            .iter()
            .map(|&o| eogs.initial_eog_of(o))
            .collect();
        let (id, _) = store.intern(fact.predicate, &terms, eogs).unwrap();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    eogs.initialise(&ids, store);
    ids
}
