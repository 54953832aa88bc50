//! Solver - Support-tuple enumeration.
//!
//! Given a list of lifted atoms and a pre-seeded variable assignment, the
//! solver enumerates tuples of reachable facts that jointly support the
//! atoms: each fact unifies with its atom and the running intersection of
//! every shared variable domain stays non-empty. Depth-first backtracking
//! over atom positions; candidates are drawn in intern order and tuples come
//! out in discovery order.

use smallvec::SmallVec;

use crate::bindings::{ResolvedAtom, Unify, VarAssignment};
use crate::eog::EogManager;
use crate::fact::{FactId, FactStore};
use crate::model::{Atom, ObjectId, PatternTerm};

/// One supporting tuple together with the narrowed variable assignment that
/// admitted it.
#[derive(Debug, Clone)]
pub struct Solution {
    pub facts: SmallVec<[FactId; 4]>,
    pub assignment: VarAssignment,
}

/// Enumerate every supporting tuple for `atoms`.
pub fn find_supports<U: Unify>(
    atoms: &[Atom],
    seed: &VarAssignment,
    unifier: &U,
    store: &FactStore,
    eogs: &EogManager,
) -> Vec<Solution> {
    let mut out = Vec::new();
    let mut chosen = SmallVec::new();
    extend(
        atoms, 0, seed, &mut chosen, &mut out, usize::MAX, unifier, store, eogs,
    );
    out
}

/// First supporting tuple in discovery order, if any.
pub fn first_support<U: Unify>(
    atoms: &[Atom],
    seed: &VarAssignment,
    unifier: &U,
    store: &FactStore,
    eogs: &EogManager,
) -> Option<Solution> {
    let mut out = Vec::new();
    let mut chosen = SmallVec::new();
    extend(atoms, 0, seed, &mut chosen, &mut out, 1, unifier, store, eogs);
    out.pop()
}

#[allow(clippy::too_many_arguments)]
fn extend<U: Unify>(
    atoms: &[Atom],
    position: usize,
    assignment: &VarAssignment,
    chosen: &mut SmallVec<[FactId; 4]>,
    out: &mut Vec<Solution>,
    limit: usize,
    unifier: &U,
    store: &FactStore,
    eogs: &EogManager,
) -> bool {
    if position == atoms.len() {
        out.push(Solution {
            facts: chosen.clone(),
            assignment: assignment.clone(),
        });
        return out.len() >= limit;
    }
    let atom = &atoms[position];
    for fact in store.live_ids() {
        if store.predicate(fact) != atom.predicate {
            continue;
        }
        if !unifier.can_unify(
            &resolve_atom(atom, assignment, unifier),
            &resolve_fact(fact, store, eogs),
        ) {
            continue;
        }

        // Narrow the running intersection; prune on the first empty domain.
        let mut next = assignment.clone();
        let mut consistent = true;
        for (j, term) in atom.terms.iter().enumerate() {
            let group = eogs.root_of(store.terms(fact)[j]);
            let members = eogs.members_sorted(group);
            match term {
                PatternTerm::Var(v) => {
                    if !next.narrow(*v, members, unifier.domain(*v)) {
                        consistent = false;
                        break;
                    }
                }
                PatternTerm::Const(o) => {
                    if members.binary_search(o).is_err() {
                        consistent = false;
                        break;
                    }
                }
            }
        }
        if !consistent {
            continue;
        }

        chosen.push(fact);
        let done = extend(
            atoms,
            position + 1,
            &next,
            chosen,
            out,
            limit,
            unifier,
            store,
            eogs,
        );
        chosen.pop();
        if done {
            return true;
        }
    }
    false
}

/// View of a lifted atom under the running assignment.
fn resolve_atom<'a, U: Unify>(
    atom: &'a Atom,
    assignment: &'a VarAssignment,
    unifier: &'a U,
) -> ResolvedAtom<'a> {
    let terms = atom.terms.iter().map(|t| match t {
        PatternTerm::Var(v) => assignment.get(*v).unwrap_or_else(|| unifier.domain(*v)),
        PatternTerm::Const(o) => std::slice::from_ref(o),
    });
    ResolvedAtom::new(atom.predicate, terms)
}

/// View of a reachable fact: each term is its root group's member set.
pub(crate) fn resolve_fact<'a>(
    fact: FactId,
    store: &'a FactStore,
    eogs: &'a EogManager,
) -> ResolvedAtom<'a> {
    let terms: SmallVec<[&[ObjectId]; 4]> = store
        .terms(fact)
        .iter()
        .map(|&t| eogs.members_sorted(eogs.root_of(t)))
        .collect();
    ResolvedAtom {
        predicate: store.predicate(fact),
        terms,
    }
}

#[cfg(test)]
#[path = "tests/solver.rs"]
mod tests;
