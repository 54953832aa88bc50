use super::*;
use crate::bindings::Unify;
use crate::eog::EogManager;
use crate::fact::FactStore;
use crate::model::PatternTerm::{Const, Var};
use crate::test_utils::{ground, logistics, seed_store, Logistics};

fn seeded(facts: &[(usize, usize)]) -> (Logistics, EogManager, FactStore) {
    // (package_index, location_index) placements plus the truck at l1.
    let fix = logistics(2);
    let mut eogs = EogManager::new(&fix.model, &fix.graph);
    let mut store = FactStore::new();
    let mut initial = vec![ground(fix.at, [fix.truck, fix.locations[0]])];
    for &(p, l) in facts {
        let package = if p == 0 { fix.p1 } else { fix.p2 };
        initial.push(ground(fix.at, [package, fix.locations[l]]));
    }
    seed_store(&mut eogs, &mut store, &initial);
    (fix, eogs, store)
}

#[test]
fn tuples_come_out_in_intern_order() {
    let (fix, eogs, store) = seeded(&[(0, 0), (1, 0)]);
    let node = fix.graph.node(fix.node_at[0]);
    let solutions = find_supports(
        &node.atoms,
        &VarAssignment::new(),
        &fix.bindings,
        &store,
        &eogs,
    );
    assert_eq!(solutions.len(), 2);
    // The truck fact was interned first but is not a package, so the
    // package placements follow in their intern order.
    let first = store.render(solutions[0].facts[0], &fix.model, &eogs);
    let second = store.render(solutions[1].facts[0], &fix.model, &eogs);
    assert_eq!(first, "(at p1 l1)");
    assert_eq!(second, "(at p2 l1)");
}

#[test]
fn typed_variables_reject_foreign_facts() {
    let (fix, eogs, store) = seeded(&[(0, 0)]);
    // node_at's package variable must not unify with the truck placement.
    let node = fix.graph.node(fix.node_at[0]);
    let solutions = find_supports(
        &node.atoms,
        &VarAssignment::new(),
        &fix.bindings,
        &store,
        &eogs,
    );
    assert_eq!(solutions.len(), 1);
    assert_eq!(
        store.render(solutions[0].facts[0], &fix.model, &eogs),
        "(at p1 l1)"
    );
}

#[test]
fn seed_constraints_narrow_the_search() {
    let (fix, eogs, store) = seeded(&[(0, 0), (1, 0)]);
    let node = fix.graph.node(fix.node_at[0]);
    let var = match node.atoms[0].terms[0] {
        Var(v) => v,
        Const(_) => unreachable!(),
    };
    let mut seed = VarAssignment::new();
    seed.insert(var, vec![fix.p2]);
    let solutions = find_supports(&node.atoms, &seed, &fix.bindings, &store, &eogs);
    assert_eq!(solutions.len(), 1);
    assert_eq!(
        store.render(solutions[0].facts[0], &fix.model, &eogs),
        "(at p2 l1)"
    );
}

#[test]
fn shared_variables_keep_a_running_intersection() {
    // node_in pairs (in p t) with (at t l1); a truck placement at l2 must
    // not support the l1 node even though it unifies with the atom alone.
    let fix = logistics(2);
    let mut eogs = EogManager::new(&fix.model, &fix.graph);
    let mut store = FactStore::new();
    seed_store(
        &mut eogs,
        &mut store,
        &[
            ground(fix.inside, [fix.p1, fix.truck]),
            ground(fix.at, [fix.truck, fix.locations[1]]),
        ],
    );
    let l1_node = fix.graph.node(fix.node_in[0]);
    let solutions = find_supports(
        &l1_node.atoms,
        &VarAssignment::new(),
        &fix.bindings,
        &store,
        &eogs,
    );
    assert!(
        solutions.is_empty(),
        "truck-at-l2 cannot support the l1 fragment"
    );

    let l2_node = fix.graph.node(fix.node_in[1]);
    let solutions = find_supports(
        &l2_node.atoms,
        &VarAssignment::new(),
        &fix.bindings,
        &store,
        &eogs,
    );
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].facts.len(), 2);
}

#[test]
fn constants_must_be_inside_the_candidate_group() {
    let (fix, eogs, store) = seeded(&[(0, 0)]);
    let atoms = [crate::model::Atom::new(
        fix.at,
        [
            Const(fix.truck),
            Var(match fix.graph.node(fix.node_at[0]).atoms[0].terms[1] {
                Var(v) => v,
                Const(_) => unreachable!(),
            }),
        ],
    )];
    let solutions = find_supports(&atoms, &VarAssignment::new(), &fix.bindings, &store, &eogs);
    assert_eq!(solutions.len(), 1, "only the truck placement matches");
    assert_eq!(
        store.render(solutions[0].facts[0], &fix.model, &eogs),
        "(at t l1)"
    );
}

#[test]
fn narrowed_assignment_is_reported_back() {
    let (fix, eogs, store) = seeded(&[(0, 0)]);
    let node = fix.graph.node(fix.node_at[0]);
    let var = match node.atoms[0].terms[0] {
        Var(v) => v,
        Const(_) => unreachable!(),
    };
    let solutions = find_supports(
        &node.atoms,
        &VarAssignment::new(),
        &fix.bindings,
        &store,
        &eogs,
    );
    assert_eq!(solutions[0].assignment.get(var), Some(&[fix.p1][..]));
    assert!(fix.bindings.domain(var).len() > 1, "declared domain untouched");
}

#[test]
fn empty_atom_list_yields_one_empty_tuple() {
    let (fix, eogs, store) = seeded(&[]);
    let solutions = find_supports(&[], &VarAssignment::new(), &fix.bindings, &store, &eogs);
    assert_eq!(solutions.len(), 1);
    assert!(solutions[0].facts.is_empty());
}

#[test]
fn first_support_agrees_with_enumeration_head() {
    let (fix, eogs, store) = seeded(&[(0, 0), (1, 0)]);
    let node = fix.graph.node(fix.node_at[0]);
    let all = find_supports(
        &node.atoms,
        &VarAssignment::new(),
        &fix.bindings,
        &store,
        &eogs,
    );
    let first = first_support(
        &node.atoms,
        &VarAssignment::new(),
        &fix.bindings,
        &store,
        &eogs,
    )
    .expect("a support exists");
    assert_eq!(first.facts, all[0].facts);
}
