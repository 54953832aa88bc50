//! Fact - The reachable-fact store.
//!
//! A reachable fact is a lifted atom whose terms are equivalence-group
//! references instead of concrete objects. Facts are interned: identical
//! facts (same predicate, same root group per position) share one record.
//! Facts are never freed; a fact subsumed after a merge is redirected to its
//! replacement and queries follow the chain.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::eog::{EogId, EogManager};
use crate::model::{Model, ModelError, PredicateId};
use crate::pool::{ArrayPool, ArrayRef, Slab};

/// Unique identifier for a reachable fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactId(pub u32);

type FactKey = (PredicateId, SmallVec<[EogId; 4]>);

/// A lifted fact after object abstraction.
#[derive(Debug)]
pub struct ReachableFact {
    pub predicate: PredicateId,
    terms: ArrayRef,
    replaced_by: Option<FactId>,
}

/// Arena-backed store of reachable facts with an intern index keyed by the
/// canonical (root-resolved) term signature.
pub struct FactStore {
    facts: Slab<ReachableFact>,
    arrays: ArrayPool<EogId>,
    index: FxHashMap<FactKey, FactId>,
}

impl FactStore {
    pub fn new() -> Self {
        Self {
            facts: Slab::new(),
            arrays: ArrayPool::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn predicate(&self, id: FactId) -> PredicateId {
        self.facts.get(id.0).predicate
    }

    pub fn terms(&self, id: FactId) -> &[EogId] {
        self.arrays.slice(self.facts.get(id.0).terms)
    }

    pub fn is_live(&self, id: FactId) -> bool {
        self.facts.get(id.0).replaced_by.is_none()
    }

    /// Follow the replacement chain to the terminal fact.
    pub fn resolve(&self, id: FactId) -> FactId {
        let mut current = id;
        let mut steps = 0usize;
        while let Some(next) = self.facts.get(current.0).replaced_by {
            current = next;
            steps += 1;
            assert!(steps <= self.len(), "cycle in fact replacement chain");
        }
        current
    }

    /// All fact ids in intern order.
    pub fn iter_ids(&self) -> impl Iterator<Item = FactId> {
        (0..self.facts.len()).map(FactId)
    }

    /// Live (non-replaced) fact ids in intern order.
    pub fn live_ids(&self) -> impl Iterator<Item = FactId> + '_ {
        self.iter_ids().filter(move |&id| self.is_live(id))
    }

    /// Intern a fact, resolving every term to its root group first. Returns
    /// the fact id and whether a new record was created.
    pub fn intern(
        &mut self,
        predicate: PredicateId,
        terms: &[EogId],
        eogs: &EogManager,
    ) -> Result<(FactId, bool), ModelError> {
        let rooted: SmallVec<[EogId; 4]> = terms.iter().map(|&t| eogs.root_of(t)).collect();
        let key = (predicate, rooted.clone());
        if let Some(&existing) = self.index.get(&key) {
            return Ok((self.resolve(existing), false));
        }
        let array = self.arrays.alloc(&rooted)?;
        let id = FactId(self.facts.alloc(ReachableFact {
            predicate,
            terms: array,
            replaced_by: None,
        })?);
        self.index.insert(key, id);
        Ok((id, true))
    }

    /// Mark `fact` as subsumed by `replacement`. Idempotent; a cycle in the
    /// chain is a programming bug and aborts.
    pub fn redirect(&mut self, fact: FactId, replacement: FactId) {
        if fact == replacement {
            return;
        }
        let terminal = self.resolve(replacement);
        assert!(terminal != fact, "fact replacement would form a cycle");
        let record = self.facts.get_mut(fact.0);
        if record.replaced_by.is_some() {
            return;
        }
        record.replaced_by = Some(terminal);
    }

    /// Rewrite every term of `fact` to its root group, in place.
    /// Returns true iff any term changed. Idempotent.
    pub fn update_terms_to_root(&mut self, fact: FactId, eogs: &EogManager) -> bool {
        let array = self.facts.get(fact.0).terms;
        let mut changed = false;
        for slot in self.arrays.slice_mut(array) {
            let root = eogs.root_of(*slot);
            if root != *slot {
                *slot = root;
                changed = true;
            }
        }
        changed
    }

    /// Identity: same predicate and termwise identical root groups.
    pub fn is_identical(&self, a: FactId, b: FactId, eogs: &EogManager) -> bool {
        if self.predicate(a) != self.predicate(b) {
            return false;
        }
        let ta = self.terms(a);
        let tb = self.terms(b);
        ta.len() == tb.len()
            && ta
                .iter()
                .zip(tb.iter())
                .all(|(&x, &y)| eogs.root_of(x) == eogs.root_of(y))
    }

    /// Equivalence: same predicate, and every position other than the
    /// predicate's invariable index refers to the same root group. The
    /// invariable position is the object under comparison and may differ.
    pub fn is_equivalent(&self, a: FactId, b: FactId, model: &Model, eogs: &EogManager) -> bool {
        if self.predicate(a) != self.predicate(b) {
            return false;
        }
        let invariable = model.predicate(self.predicate(a)).invariable;
        let ta = self.terms(a);
        let tb = self.terms(b);
        if ta.len() != tb.len() {
            return false;
        }
        ta.iter().zip(tb.iter()).enumerate().all(|(i, (&x, &y))| {
            if invariable == Some(i) {
                true
            } else {
                eogs.root_of(x) == eogs.root_of(y)
            }
        })
    }

    /// Rebuild the intern index against current roots. Called after each
    /// equivalence-refinement pass; checks that every live fact already
    /// references roots, and redirects facts that have collapsed into an
    /// earlier identical one.
    pub fn rebuild_index(&mut self, eogs: &EogManager) {
        self.index.clear();
        let ids: Vec<FactId> = self.live_ids().collect();
        for id in ids {
            let rooted: SmallVec<[EogId; 4]> = self.terms(id).iter().map(|&t| eogs.root_of(t)).collect();
            debug_assert!(
                rooted.as_slice() == self.terms(id),
                "live fact with non-root term after refinement"
            );
            let key = (self.predicate(id), rooted);
            match self.index.get(&key).copied() {
                Some(earlier) => self.redirect(id, earlier),
                None => {
                    self.index.insert(key, id);
                }
            }
        }
    }

    /// Render a fact for diagnostics and report snapshots.
    pub fn render(&self, id: FactId, model: &Model, eogs: &EogManager) -> String {
        let id = self.resolve(id);
        let mut out = String::new();
        out.push('(');
        out.push_str(model.predicate_name(self.predicate(id)));
        for &term in self.terms(id) {
            out.push(' ');
            let members = eogs.members_sorted(eogs.root_of(term));
            if members.len() == 1 {
                out.push_str(model.object_name(members[0]));
            } else {
                out.push('{');
                for (i, &obj) in members.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(model.object_name(obj));
                }
                out.push('}');
            }
        }
        out.push(')');
        out
    }
}

impl Default for FactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/fact.rs"]
mod tests;
