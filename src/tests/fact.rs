use super::*;
use crate::bindings::Bindings;
use crate::dtg::DtgBuilder;
use crate::eog::EogManager;
use crate::model::Model;
use crate::test_utils::{ground, logistics, seed_store, Logistics};

fn setup() -> (Logistics, EogManager, FactStore) {
    let fix = logistics(2);
    let eogs = EogManager::new(&fix.model, &fix.graph);
    (fix, eogs, FactStore::new())
}

#[test]
fn intern_dedups_identical_facts() {
    let (fix, eogs, mut store) = setup();
    let p1 = eogs.initial_eog_of(fix.p1);
    let l1 = eogs.initial_eog_of(fix.locations[0]);
    let (a, created_a) = store.intern(fix.at, &[p1, l1], &eogs).unwrap();
    let (b, created_b) = store.intern(fix.at, &[p1, l1], &eogs).unwrap();
    assert!(created_a);
    assert!(!created_b);
    assert_eq!(a, b);
    assert_eq!(store.len(), 1);
}

#[test]
fn intern_resolves_terms_to_roots() {
    let (fix, mut eogs, mut store) = setup();
    let p1 = eogs.initial_eog_of(fix.p1);
    let p2 = eogs.initial_eog_of(fix.p2);
    let l1 = eogs.initial_eog_of(fix.locations[0]);
    eogs.merge_for_test(p1, p2, 1, &mut store);

    let (via_p2, _) = store.intern(fix.inside, &[p2, l1], &eogs).unwrap();
    assert_eq!(store.terms(via_p2)[0], p1, "terms are rooted at intern time");
    let (via_p1, created) = store.intern(fix.inside, &[p1, l1], &eogs).unwrap();
    assert!(!created);
    assert_eq!(via_p1, via_p2);
}

#[test]
fn redirect_is_idempotent_and_resolve_follows_chains() {
    let (fix, eogs, mut store) = setup();
    let p1 = eogs.initial_eog_of(fix.p1);
    let p2 = eogs.initial_eog_of(fix.p2);
    let l1 = eogs.initial_eog_of(fix.locations[0]);
    let (a, _) = store.intern(fix.at, &[p1, l1], &eogs).unwrap();
    let (b, _) = store.intern(fix.at, &[p2, l1], &eogs).unwrap();
    let (c, _) = store.intern(fix.at, &[p1, p1], &eogs).unwrap();

    store.redirect(b, a);
    store.redirect(a, c);
    assert!(store.is_live(c));
    assert!(!store.is_live(a));
    assert!(!store.is_live(b));
    assert_eq!(store.resolve(b), c, "resolution follows the full chain");

    // A second redirect of the same fact is a no-op.
    store.redirect(b, c);
    assert_eq!(store.resolve(b), c);
}

#[test]
#[should_panic(expected = "cycle")]
fn redirect_cycle_aborts() {
    let (fix, eogs, mut store) = setup();
    let p1 = eogs.initial_eog_of(fix.p1);
    let p2 = eogs.initial_eog_of(fix.p2);
    let l1 = eogs.initial_eog_of(fix.locations[0]);
    let (a, _) = store.intern(fix.at, &[p1, l1], &eogs).unwrap();
    let (b, _) = store.intern(fix.at, &[p2, l1], &eogs).unwrap();
    store.redirect(a, b);
    store.redirect(b, a);
}

#[test]
fn update_terms_to_root_is_idempotent() {
    let (fix, mut eogs, mut store) = setup();
    let p1 = eogs.initial_eog_of(fix.p1);
    let p2 = eogs.initial_eog_of(fix.p2);
    let t = eogs.initial_eog_of(fix.truck);
    let (fact, _) = store.intern(fix.inside, &[p2, t], &eogs).unwrap();

    eogs.merge_for_test(p1, p2, 1, &mut store);
    assert!(store.update_terms_to_root(fact, &eogs), "first call rewrites");
    assert_eq!(store.terms(fact), &[p1, t]);
    assert!(
        !store.update_terms_to_root(fact, &eogs),
        "second call is a no-op"
    );
}

#[test]
fn equivalence_frees_only_the_invariable_position() {
    let (fix, mut eogs, mut store) = setup();
    let facts = seed_store(
        &mut eogs,
        &mut store,
        &[
            ground(fix.at, [fix.p1, fix.locations[0]]),
            ground(fix.at, [fix.p2, fix.locations[0]]),
            ground(fix.at, [fix.p1, fix.locations[1]]),
        ],
    );
    let (p1_l1, p2_l1, p1_l2) = (facts[0], facts[1], facts[2]);

    assert!(store.is_equivalent(p1_l1, p2_l1, &fix.model, &eogs));
    assert!(!store.is_identical(p1_l1, p2_l1, &eogs));
    assert!(
        !store.is_equivalent(p1_l1, p1_l2, &fix.model, &eogs),
        "a non-invariable position that differs blocks equivalence"
    );
    assert!(store.is_identical(p1_l1, p1_l1, &eogs));
}

#[test]
fn zero_arity_facts_intern_under_one_record() {
    let mut model = Model::new();
    let ready = model.add_predicate("ready", [], None);
    let bindings = Bindings::new();
    let graph = DtgBuilder::new(&model, &bindings).build();
    let eogs = EogManager::new(&model, &graph);
    let mut store = FactStore::new();

    let (a, created) = store.intern(ready, &[], &eogs).unwrap();
    let (b, again) = store.intern(ready, &[], &eogs).unwrap();
    assert!(created && !again);
    assert_eq!(a, b);
    assert!(store.terms(a).is_empty());
}

#[test]
fn rebuild_index_redirects_facts_collapsed_by_merges() {
    let (fix, mut eogs, mut store) = setup();
    let p1 = eogs.initial_eog_of(fix.p1);
    let p2 = eogs.initial_eog_of(fix.p2);
    let l1 = eogs.initial_eog_of(fix.locations[0]);
    let (a, _) = store.intern(fix.at, &[p1, l1], &eogs).unwrap();
    let (b, _) = store.intern(fix.at, &[p2, l1], &eogs).unwrap();

    eogs.merge_for_test(p1, p2, 1, &mut store);
    store.update_terms_to_root(b, &eogs);
    store.rebuild_index(&eogs);

    assert!(store.is_live(a));
    assert!(!store.is_live(b), "collapsed twin is redirected, not deleted");
    assert_eq!(store.resolve(b), a);
    assert_eq!(store.live_ids().count(), 1);
}

#[test]
fn render_shows_group_members() {
    let (fix, mut eogs, mut store) = setup();
    let facts = seed_store(
        &mut eogs,
        &mut store,
        &[
            ground(fix.at, [fix.p1, fix.locations[0]]),
            ground(fix.at, [fix.p2, fix.locations[0]]),
        ],
    );
    assert_eq!(store.render(facts[0], &fix.model, &eogs), "(at p1 l1)");

    let p1 = eogs.initial_eog_of(fix.p1);
    let p2 = eogs.initial_eog_of(fix.p2);
    eogs.merge_for_test(p1, p2, 1, &mut store);
    assert_eq!(store.render(facts[0], &fix.model, &eogs), "(at {p1 p2} l1)");
}
