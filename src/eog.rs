//! Eog - Equivalent object groups and their manager.
//!
//! Two objects land in the same group when their initial reachable-fact
//! signatures are symmetric: whatever one can reach, the other can reach
//! too. Groups merge through a union-find link; a non-root group is frozen
//! at the moment it merged, which is what lets the partition be queried as
//! it stood at any past iteration.

use smallvec::SmallVec;

use crate::dtg::DtgGraph;
use crate::fact::{FactId, FactStore};
use crate::model::{Model, ObjectId};

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Unique identifier for an equivalent object group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EogId(pub u32);

/// Sentinel for `merged_at` while a group is still a root.
const NEVER_MERGED: u32 = u32::MAX;

/// Bit vector over all DTG node atom term positions. Bit i is set iff the
/// group's objects are type-eligible to occupy position i. Groups may only
/// merge when their fingerprints are bit-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    bits: SmallVec<[u64; 4]>,
}

impl Fingerprint {
    fn with_positions(n: usize) -> Self {
        Self {
            bits: smallvec::smallvec![0u64; (n + 63) / 64],
        }
    }

    fn set(&mut self, i: usize) {
        self.bits[i / 64] |= 1u64 << (i % 64);
    }
}

/// One object together with the interned facts it appears in initially.
#[derive(Debug, Clone)]
struct EquivalentObject {
    object: ObjectId,
    initial_facts: Vec<FactId>,
}

/// A set of objects assumed interchangeable so far.
struct Eog {
    /// Insertion order defines identity for historical queries.
    members: Vec<EquivalentObject>,
    /// Same objects, sorted, for domain intersections.
    members_sorted: Vec<ObjectId>,
    fingerprint: Fingerprint,
    /// None iff this group is a root. All externally visible operations act
    /// on the root.
    link: Option<EogId>,
    /// Grounded groups are frozen singletons and never merge.
    grounded: bool,
    /// Facts in which at least one member appears as a term.
    reachable_facts: Vec<FactId>,
    merged_at: u32,
    /// Entry k is the member count at the end of iteration k.
    size_history: Vec<u32>,
}

impl Eog {
    fn is_root(&self) -> bool {
        self.link.is_none()
    }
}

/// Owns every group and drives the refinement pass.
pub struct EogManager {
    eogs: Vec<Eog>,
    object_to_eog: Vec<EogId>,
    /// Holder of zero-arity facts; grounded, memberless, never merges.
    sentinel: EogId,
}

impl EogManager {
    /// One group per object, fingerprinted against the full graph, plus the
    /// zero-arity sentinel.
    pub fn new(model: &Model, graph: &DtgGraph) -> Self {
        let num_positions: usize = graph
            .nodes()
            .flat_map(|(_, n)| n.atoms.iter())
            .map(|a| a.terms.len())
            .sum();

        let mut eogs = Vec::with_capacity(model.num_objects() + 1);
        let mut object_to_eog = Vec::with_capacity(model.num_objects());
        for (oid, object) in model.objects() {
            let mut fingerprint = Fingerprint::with_positions(num_positions);
            let mut idx = 0;
            for (_, node) in graph.nodes() {
                for atom in &node.atoms {
                    let pred = model.predicate(atom.predicate);
                    for j in 0..atom.terms.len() {
                        if model.is_subtype_of(object.ty, pred.params[j]) {
                            fingerprint.set(idx);
                        }
                        idx += 1;
                    }
                }
            }
            let id = EogId(eogs.len() as u32);
            eogs.push(Eog {
                members: vec![EquivalentObject {
                    object: oid,
                    initial_facts: Vec::new(),
                }],
                members_sorted: vec![oid],
                fingerprint,
                link: None,
                grounded: object.grounded,
                reachable_facts: Vec::new(),
                merged_at: NEVER_MERGED,
                size_history: Vec::new(),
            });
            object_to_eog.push(id);
        }

        let sentinel = EogId(eogs.len() as u32);
        eogs.push(Eog {
            members: Vec::new(),
            members_sorted: Vec::new(),
            fingerprint: Fingerprint::with_positions(num_positions),
            link: None,
            grounded: true,
            reachable_facts: Vec::new(),
            merged_at: NEVER_MERGED,
            size_history: Vec::new(),
        });

        Self {
            eogs,
            object_to_eog,
            sentinel,
        }
    }

    pub fn num_groups(&self) -> usize {
        self.eogs.len()
    }

    pub fn sentinel(&self) -> EogId {
        self.sentinel
    }

    pub fn is_root(&self, e: EogId) -> bool {
        self.eogs[e.0 as usize].is_root()
    }

    pub fn is_grounded(&self, e: EogId) -> bool {
        self.eogs[e.0 as usize].grounded
    }

    /// Non-mutating chase to the root. Path compression happens only inside
    /// the refinement pass.
    pub fn root_of(&self, e: EogId) -> EogId {
        let mut current = e;
        let mut steps = 0usize;
        while let Some(next) = self.eogs[current.0 as usize].link {
            current = next;
            steps += 1;
            assert!(steps <= self.eogs.len(), "cycle in equivalence links");
        }
        current
    }

    /// The group a fresh object was assigned to (pre-merge identity).
    pub fn initial_eog_of(&self, object: ObjectId) -> EogId {
        self.object_to_eog[object.0 as usize]
    }

    /// The current root group of an object.
    pub fn eog_of(&self, object: ObjectId) -> EogId {
        self.root_of(self.initial_eog_of(object))
    }

    /// Sorted member objects of a group (callers normally pass a root).
    pub fn members_sorted(&self, e: EogId) -> &[ObjectId] {
        &self.eogs[e.0 as usize].members_sorted
    }

    /// Member objects in insertion order.
    pub fn members(&self, e: EogId) -> impl Iterator<Item = ObjectId> + '_ {
        self.eogs[e.0 as usize].members.iter().map(|m| m.object)
    }

    pub fn reachable_facts(&self, e: EogId) -> &[FactId] {
        &self.eogs[e.0 as usize].reachable_facts
    }

    /// Root groups that hold at least one object. The sentinel is
    /// bookkeeping, not an equivalence class.
    pub fn num_equivalence_classes(&self) -> usize {
        self.eogs
            .iter()
            .filter(|e| e.is_root() && !e.members.is_empty())
            .count()
    }

    /// Seed the groups from the interned initial facts: record each fact on
    /// the initial-fact list of every member of every term group, and on the
    /// groups' reachable lists. Also records the iteration-0 partition.
    pub fn initialise(&mut self, initial: &[FactId], store: &FactStore) {
        for &fact in initial {
            let terms: SmallVec<[EogId; 4]> = store.terms(fact).iter().copied().collect();
            if terms.is_empty() {
                let sentinel = &mut self.eogs[self.sentinel.0 as usize];
                if !sentinel.reachable_facts.contains(&fact) {
                    sentinel.reachable_facts.push(fact);
                }
                continue;
            }
            for &term in &terms {
                self.add_initial_fact(term, fact);
            }
        }
        // Iteration 0 is the untouched partition.
        for eog in &mut self.eogs {
            eog.size_history.push(eog.members.len() as u32);
        }
    }

    fn add_initial_fact(&mut self, e: EogId, fact: FactId) {
        let eog = &mut self.eogs[e.0 as usize];
        let mut added = false;
        for member in &mut eog.members {
            if !member.initial_facts.contains(&fact) {
                member.initial_facts.push(fact);
                added = true;
            }
        }
        if added && !eog.reachable_facts.contains(&fact) {
            eog.reachable_facts.push(fact);
        }
    }

    /// Record a newly interned fact on each distinct term root's reachable
    /// list (the sentinel for zero-arity facts).
    pub fn add_fact_to_terms(&mut self, fact: FactId, store: &FactStore) {
        let terms: SmallVec<[EogId; 4]> = store.terms(fact).iter().copied().collect();
        if terms.is_empty() {
            let sentinel = &mut self.eogs[self.sentinel.0 as usize];
            if !sentinel.reachable_facts.contains(&fact) {
                sentinel.reachable_facts.push(fact);
            }
            return;
        }
        for &term in &terms {
            let root = self.root_of(term);
            let eog = &mut self.eogs[root.0 as usize];
            if !eog.reachable_facts.contains(&fact) {
                eog.reachable_facts.push(fact);
            }
        }
    }

    /// Does the group contain `object` as the partition stood at the end of
    /// `iteration`? Forwarded to the link for iterations at or after the
    /// merge; answered from the frozen history otherwise.
    pub fn contains(&self, e: EogId, object: ObjectId, iteration: u32) -> bool {
        let eog = &self.eogs[e.0 as usize];
        if eog.merged_at <= iteration {
            let link = eog.link.expect("merged group without link");
            return self.contains(link, object, iteration);
        }
        let history = &eog.size_history;
        assert!(
            (iteration as usize) < history.len(),
            "iteration {} beyond recorded history",
            iteration
        );
        let visible = history[iteration as usize] as usize;
        eog.members[..visible].iter().any(|m| m.object == object)
    }

    /// Member objects of the group as the partition stood at the end of
    /// `iteration`, in insertion order.
    pub fn members_at(&self, e: EogId, iteration: u32) -> Vec<ObjectId> {
        let eog = &self.eogs[e.0 as usize];
        if eog.merged_at <= iteration {
            let link = eog.link.expect("merged group without link");
            return self.members_at(link, iteration);
        }
        let history = &eog.size_history;
        assert!(
            (iteration as usize) < history.len(),
            "iteration {} beyond recorded history",
            iteration
        );
        let visible = history[iteration as usize] as usize;
        eog.members[..visible].iter().map(|m| m.object).collect()
    }

    /// Every initial fact of `member` must be equivalent to some fact the
    /// group has already reached.
    fn initial_state_reachable(
        &self,
        member: &EquivalentObject,
        reachable: &[FactId],
        store: &FactStore,
        model: &Model,
    ) -> bool {
        member.initial_facts.iter().all(|&init| {
            reachable
                .iter()
                .any(|&f| store.is_equivalent(init, f, model, self))
        })
    }

    /// Try to merge `b` into `a` at `iteration`. Returns true when the two
    /// already share a root or the merge succeeded.
    pub fn try_merge(
        &mut self,
        a: EogId,
        b: EogId,
        iteration: u32,
        affected: &mut Vec<EogId>,
        store: &mut FactStore,
        model: &Model,
    ) -> bool {
        if self.eogs[a.0 as usize].grounded || self.eogs[b.0 as usize].grounded {
            return false;
        }
        let a = self.root_of(a);
        let b = self.root_of(b);
        if a == b {
            return true;
        }
        if self.eogs[a.0 as usize].fingerprint != self.eogs[b.0 as usize].fingerprint {
            return false;
        }

        // Bidirectional reachability: some member of each side must have its
        // whole initial state covered by the other side's reachable facts.
        let b_covered = self.eogs[b.0 as usize].members.iter().any(|m| {
            self.initial_state_reachable(m, &self.eogs[a.0 as usize].reachable_facts, store, model)
        });
        if !b_covered {
            return false;
        }
        let a_covered = self.eogs[a.0 as usize].members.iter().any(|m| {
            self.initial_state_reachable(m, &self.eogs[b.0 as usize].reachable_facts, store, model)
        });
        if !a_covered {
            return false;
        }

        self.merge(a, b, iteration, affected, store);
        true
    }

    /// Link `b` under `a` and fold `b`'s facts into `a`'s list, collapsing
    /// facts that have become identical. Affected sibling groups are pushed
    /// onto the worklist and swept after the whole pass.
    fn merge(
        &mut self,
        a: EogId,
        b: EogId,
        iteration: u32,
        affected: &mut Vec<EogId>,
        store: &mut FactStore,
    ) {
        debug_assert!(self.is_root(a) && self.is_root(b) && a != b);
        debug_assert_eq!(
            self.eogs[a.0 as usize].fingerprint,
            self.eogs[b.0 as usize].fingerprint
        );

        #[cfg(feature = "tracing")]
        trace!(from = b.0, into = a.0, iteration, "merge_groups");

        // The non-root keeps its members and history frozen; the root gets
        // copies.
        let b_members = self.eogs[b.0 as usize].members.clone();
        let b_facts = self.eogs[b.0 as usize].reachable_facts.clone();
        {
            let eog_b = &mut self.eogs[b.0 as usize];
            eog_b.link = Some(a);
            eog_b.merged_at = iteration;
        }
        {
            let eog_a = &mut self.eogs[a.0 as usize];
            eog_a.members.extend(b_members);
            let sorted: Vec<ObjectId> = eog_a.members.iter().map(|m| m.object).collect();
            eog_a.members_sorted = sorted;
            eog_a.members_sorted.sort_unstable();
        }

        // Facts already replaced, or still referencing a group merged away
        // earlier this pass, have an up-to-date twin in the combined list.
        let a_list = std::mem::take(&mut self.eogs[a.0 as usize].reachable_facts);
        let mut combined: Vec<FactId> = Vec::with_capacity(a_list.len() + b_facts.len());
        for fact in a_list {
            let stale = !store.is_live(fact)
                || store.terms(fact).iter().any(|&t| !self.is_root(t));
            if stale {
                for &t in store.terms(fact) {
                    let root = self.root_of(t);
                    if root != a && !affected.contains(&root) {
                        affected.push(root);
                    }
                }
            } else {
                combined.push(fact);
            }
        }

        for fact in b_facts {
            if !store.is_live(fact) {
                continue;
            }
            store.update_terms_to_root(fact, self);
            if let Some(&twin) = combined
                .iter()
                .find(|&&g| g != fact && store.is_identical(g, fact, self))
            {
                store.redirect(fact, twin);
                for &t in store.terms(fact) {
                    let root = self.root_of(t);
                    if !affected.contains(&root) {
                        affected.push(root);
                    }
                }
            } else {
                combined.push(fact);
            }
        }
        self.eogs[a.0 as usize].reachable_facts = combined;
    }

    /// One refinement pass: every root attempts to absorb every other root,
    /// all roots record their size for this iteration, affected groups are
    /// swept, and links are path-compressed. Returns the number of merges.
    pub fn update_equivalences(
        &mut self,
        iteration: u32,
        store: &mut FactStore,
        model: &Model,
    ) -> usize {
        let mut affected: Vec<EogId> = Vec::new();
        let mut merges = 0usize;
        let n = self.eogs.len();
        for i in 0..n {
            let a = EogId(i as u32);
            if !self.is_root(a) {
                continue;
            }
            for j in 0..n {
                let b = EogId(j as u32);
                if i == j || !self.is_root(b) {
                    continue;
                }
                let was_root = self.is_root(b);
                self.try_merge(a, b, iteration, &mut affected, store, model);
                if was_root && !self.is_root(b) {
                    merges += 1;
                }
            }
        }

        // Roots record the partition for this iteration; non-roots froze
        // their history when they stopped being roots.
        for eog in &mut self.eogs {
            if eog.is_root() {
                eog.size_history.push(eog.members.len() as u32);
            }
        }

        // Drop replaced facts from every affected root's list.
        for e in affected {
            let root = self.root_of(e);
            let list = std::mem::take(&mut self.eogs[root.0 as usize].reachable_facts);
            self.eogs[root.0 as usize].reachable_facts =
                list.into_iter().filter(|&f| store.is_live(f)).collect();
        }

        // Path compression; the only place links are rewritten.
        for i in 0..n {
            if let Some(link) = self.eogs[i].link {
                let root = self.root_of(link);
                self.eogs[i].link = Some(root);
            }
        }

        merges
    }

    #[cfg(test)]
    pub(crate) fn merge_for_test(
        &mut self,
        a: EogId,
        b: EogId,
        iteration: u32,
        store: &mut FactStore,
    ) -> Vec<EogId> {
        let mut affected = Vec::new();
        self.merge(a, b, iteration, &mut affected, store);
        affected
    }

    #[cfg(test)]
    pub(crate) fn fingerprint_of(&self, e: EogId) -> &Fingerprint {
        &self.eogs[e.0 as usize].fingerprint
    }
}

#[cfg(test)]
#[path = "tests/eog.rs"]
mod tests;
