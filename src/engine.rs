//! Engine - Top-level fixed-point loop for relaxed reachability.
//!
//! The engine seeds the initial state, then repeats four phases until
//! quiescence: close node reachability under transitivity, fire transitions
//! whose preconditions are supported, refine the object equivalence
//! partition, and chase externally-dependent transitions. Everything grows
//! monotonically; the loop terminates because every productive iteration
//! adds a fact, a support tuple, an achieved transition, or a merge.

use std::collections::VecDeque;

use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::bindings::{ResolvedAtom, Unify, VarAssignment};
use crate::dtg::{resolve_pattern, DtgGraph, NodeId, Transition, TransitionId};
use crate::eog::{EogId, EogManager};
use crate::fact::{FactId, FactStore};
use crate::model::{Atom, GroundFact, Model, ModelError, ObjectId, PatternTerm, PredicateId};
use crate::solver;

#[cfg(feature = "tracing")]
use crate::trace::{debug, debug_span, trace};

/// An ordered assignment of reachable facts to the atoms of a DTG node.
#[derive(Debug, Clone)]
pub struct SupportTuple {
    pub facts: SmallVec<[FactId; 4]>,
}

/// Relaxed reachability analysis over a domain transition graph.
///
/// The model and graph are borrowed and must outlive the engine; all facts,
/// groups, and support tuples are owned by the engine and live until it is
/// dropped.
pub struct ReachabilityEngine<'m, U: Unify> {
    model: &'m Model,
    graph: &'m DtgGraph,
    unifier: U,
    facts: FactStore,
    eogs: EogManager,
    supports: Vec<Vec<SupportTuple>>,
    reachable: Vec<Vec<NodeId>>,
    achieved: HashSet<TransitionId>,
    iteration: u32,
}

impl<'m, U: Unify> ReachabilityEngine<'m, U> {
    pub fn new(model: &'m Model, graph: &'m DtgGraph, unifier: U) -> Self {
        Self {
            model,
            graph,
            unifier,
            facts: FactStore::new(),
            eogs: EogManager::new(model, graph),
            supports: vec![Vec::new(); graph.num_nodes()],
            reachable: vec![Vec::new(); graph.num_nodes()],
            achieved: HashSet::new(),
            iteration: 0,
        }
    }

    /// Run the analysis to fixed point and return a queryable report.
    ///
    /// The engine state is rebuilt from scratch, so repeated calls with the
    /// same input produce identical reports.
    pub fn analyze(&mut self, initial: &[GroundFact]) -> Result<Report<'_, 'm, U>, ModelError> {
        #[cfg(feature = "tracing")]
        let _span = debug_span!("analyze", facts = initial.len()).entered();

        self.reset();
        self.seed_initial_state(initial)?;

        loop {
            self.iteration += 1;
            let mut progress = false;

            progress |= self.seed_supports();
            self.propagate_reachable_nodes();
            progress |= self.sweep_transitions()?;

            let merges = self
                .eogs
                .update_equivalences(self.iteration, &mut self.facts, self.model);
            self.facts.rebuild_index(&self.eogs);
            self.dedup_supports();
            progress |= merges > 0;

            progress |= self.handle_external_dependencies()?;

            #[cfg(feature = "tracing")]
            debug!(
                iteration = self.iteration,
                facts = self.facts.len(),
                achieved = self.achieved.len(),
                merges,
                "iteration_done"
            );

            if cfg!(debug_assertions) {
                self.check_invariants();
            }
            if !progress {
                break;
            }
        }

        Ok(Report { engine: self })
    }

    fn reset(&mut self) {
        self.facts = FactStore::new();
        self.eogs = EogManager::new(self.model, self.graph);
        self.supports = vec![Vec::new(); self.graph.num_nodes()];
        self.reachable = vec![Vec::new(); self.graph.num_nodes()];
        self.achieved.clear();
        self.iteration = 0;
    }

    /// Intern the initial facts and seed the equivalence groups.
    fn seed_initial_state(&mut self, initial: &[GroundFact]) -> Result<(), ModelError> {
        let mut seeded: Vec<FactId> = Vec::new();
        for ground in initial {
            self.model.check_ground_fact(ground)?;
            let terms: SmallVec<[EogId; 4]> = ground
                .objects
                .iter()
                .map(|&o| self.eogs.initial_eog_of(o))
                .collect();
            let (id, _) = self.facts.intern(ground.predicate, &terms, &self.eogs)?;
            if !seeded.contains(&id) {
                seeded.push(id);
            }
        }
        self.eogs.initialise(&seeded, &self.facts);
        Ok(())
    }

    /// Find support tuples for every node against the current fact pool.
    fn seed_supports(&mut self) -> bool {
        let graph = self.graph;
        let mut progress = false;
        for (id, node) in graph.nodes() {
            let solutions = solver::find_supports(
                &node.atoms,
                &VarAssignment::new(),
                &self.unifier,
                &self.facts,
                &self.eogs,
            );
            for solution in solutions {
                progress |= self.make_reachable(id, solution.facts);
            }
        }
        progress
    }

    /// Close `reachable` under transitivity. A node whose set grew is
    /// re-enqueued together with its predecessors so they see the growth.
    fn propagate_reachable_nodes(&mut self) {
        let n = self.graph.num_nodes();
        let mut queue: VecDeque<usize> = (0..n).collect();
        let mut queued = vec![true; n];
        while let Some(m) = queue.pop_front() {
            queued[m] = false;
            let mut additions: Vec<NodeId> = Vec::new();
            for &x in &self.reachable[m] {
                for &y in &self.reachable[x.0 as usize] {
                    if !self.reachable[m].contains(&y) && !additions.contains(&y) {
                        additions.push(y);
                    }
                }
            }
            if additions.is_empty() {
                continue;
            }
            self.reachable[m].extend(additions);
            for p in 0..n {
                if !queued[p] && self.reachable[p].contains(&NodeId(m as u32)) {
                    queue.push_back(p);
                    queued[p] = true;
                }
            }
            if !queued[m] {
                queue.push_back(m);
                queued[m] = true;
            }
        }
    }

    /// Fire every not-yet-achieved transition whose from-node tuples admit a
    /// full precondition support.
    fn sweep_transitions(&mut self) -> Result<bool, ModelError> {
        let graph = self.graph;
        let mut progress = false;
        for (from, _) in graph.nodes() {
            for &tid in graph.outgoing(from) {
                if self.achieved.contains(&tid) {
                    continue;
                }
                let transition = graph.transition(tid);
                let tuples: Vec<SmallVec<[FactId; 4]>> = self.supports[from.0 as usize]
                    .iter()
                    .map(|t| t.facts.clone())
                    .collect();
                let mut fired = false;
                for tuple in tuples {
                    let Some(seed) = self.seed_assignment(from, &tuple) else {
                        continue;
                    };
                    let Some(solution) = solver::first_support(
                        &transition.preconditions,
                        &seed,
                        &self.unifier,
                        &self.facts,
                        &self.eogs,
                    ) else {
                        continue;
                    };
                    fired = true;
                    progress |= self.apply_effects(transition, &solution.assignment)?;
                }
                if fired {
                    #[cfg(feature = "tracing")]
                    trace!(transition = tid.0, "transition_achieved");
                    self.achieved.insert(tid);
                    progress = true;
                    if !self.reachable[from.0 as usize].contains(&transition.to) {
                        self.reachable[from.0 as usize].push(transition.to);
                    }
                }
            }
        }
        Ok(progress)
    }

    /// Seed the variable assignment of a transition from one support tuple
    /// of its from-node. Returns None when the tuple no longer fits the
    /// node's structure.
    fn seed_assignment(&self, from: NodeId, tuple: &[FactId]) -> Option<VarAssignment> {
        let node = self.graph.node(from);
        if node.atoms.len() != tuple.len() {
            return None;
        }
        let mut assignment = VarAssignment::new();
        for (atom, &fact) in node.atoms.iter().zip(tuple) {
            let fact = self.facts.resolve(fact);
            for (j, term) in atom.terms.iter().enumerate() {
                let group = self.eogs.root_of(self.facts.terms(fact)[j]);
                let members = self.eogs.members_sorted(group);
                match term {
                    PatternTerm::Var(v) => {
                        if !assignment.narrow(*v, members, self.unifier.domain(*v)) {
                            return None;
                        }
                    }
                    PatternTerm::Const(o) => {
                        if members.binary_search(o).is_err() {
                            return None;
                        }
                    }
                }
            }
        }
        Some(assignment)
    }

    /// Bind the transition's effect atoms under the solved assignment,
    /// intern the resulting facts, and record the achieved tuples on the
    /// to-node.
    fn apply_effects(
        &mut self,
        transition: &Transition,
        assignment: &VarAssignment,
    ) -> Result<bool, ModelError> {
        let mut progress = false;
        let mut per_atom: Vec<Vec<FactId>> = Vec::with_capacity(transition.effects.len());
        for atom in &transition.effects {
            // Distinct root groups covering each position's final domain,
            // in first-seen order.
            let mut groups_per_position: Vec<Vec<EogId>> = Vec::with_capacity(atom.terms.len());
            for term in &atom.terms {
                let objects: &[ObjectId] = match term {
                    PatternTerm::Var(v) => assignment
                        .get(*v)
                        .unwrap_or_else(|| self.unifier.domain(*v)),
                    PatternTerm::Const(o) => std::slice::from_ref(o),
                };
                let mut groups: Vec<EogId> = Vec::new();
                for &object in objects {
                    let root = self.eogs.eog_of(object);
                    if !groups.contains(&root) {
                        groups.push(root);
                    }
                }
                groups_per_position.push(groups);
            }

            let mut facts_for_atom: Vec<FactId> = Vec::new();
            for combo in cartesian(&groups_per_position) {
                let (id, created) = self.facts.intern(atom.predicate, &combo, &self.eogs)?;
                if created {
                    self.eogs.add_fact_to_terms(id, &self.facts);
                    progress = true;
                    #[cfg(feature = "tracing")]
                    trace!(fact = id.0, "fact_established");
                }
                if !facts_for_atom.contains(&id) {
                    facts_for_atom.push(id);
                }
            }
            per_atom.push(facts_for_atom);
        }

        for combo in cartesian(&per_atom) {
            progress |= self.make_reachable(transition.to, combo);
        }
        Ok(progress)
    }

    /// Record a support tuple for a node unless an identical one (termwise
    /// root-group signature) is already present.
    fn make_reachable(&mut self, node: NodeId, facts: SmallVec<[FactId; 4]>) -> bool {
        if facts.len() != self.graph.node(node).atoms.len() {
            return false;
        }
        let resolved: SmallVec<[FactId; 4]> =
            facts.iter().map(|&f| self.facts.resolve(f)).collect();
        let existing = &self.supports[node.0 as usize];
        for tuple in existing {
            if tuple.facts.len() == resolved.len()
                && tuple
                    .facts
                    .iter()
                    .zip(&resolved)
                    .all(|(&a, &b)| self.facts.is_identical(self.facts.resolve(a), b, &self.eogs))
            {
                return false;
            }
        }
        self.supports[node.0 as usize].push(SupportTuple { facts: resolved });
        true
    }

    /// After merges, tuples that collapsed onto the same signature are
    /// reduced to their first representative.
    fn dedup_supports(&mut self) {
        for node in 0..self.supports.len() {
            let tuples = std::mem::take(&mut self.supports[node]);
            let mut kept: Vec<SupportTuple> = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                let resolved: SmallVec<[FactId; 4]> =
                    tuple.facts.iter().map(|&f| self.facts.resolve(f)).collect();
                let duplicate = kept.iter().any(|k| {
                    k.facts.len() == resolved.len()
                        && k.facts
                            .iter()
                            .zip(&resolved)
                            .all(|(&a, &b)| self.facts.is_identical(a, b, &self.eogs))
                });
                if !duplicate {
                    kept.push(SupportTuple { facts: resolved });
                }
            }
            self.supports[node] = kept;
        }
    }

    /// Chase transitions whose from-node carries grounded terms owned by a
    /// different property space. For every node structurally matching the
    /// from-node away from those positions, the goal facts needed to reach
    /// the match are built from the match's bindings at dependent positions
    /// and the from-tuple's bindings elsewhere; when every goal is already
    /// unifiable with an established fact, the match becomes reachable with
    /// the mixed tuple.
    fn handle_external_dependencies(&mut self) -> Result<bool, ModelError> {
        let graph = self.graph;
        let mut progress = false;
        for (_, transition) in graph.transitions() {
            if transition.external_deps.is_empty() {
                continue;
            }
            let from = transition.from;
            let from_node = graph.node(from);
            let matches =
                graph.matching_nodes(from, &transition.external_deps, &self.unifier, self.model);

            let dep_atoms: Vec<bool> = (0..from_node.atoms.len())
                .map(|i| transition.external_deps.iter().any(|d| d.atom == i))
                .collect();
            let tuples: Vec<SmallVec<[FactId; 4]>> = self.supports[from.0 as usize]
                .iter()
                .map(|t| t.facts.clone())
                .collect();

            for &matched in &matches {
                let match_node = graph.node(matched);
                for tuple in &tuples {
                    let mut mixed: SmallVec<[FactId; 4]> = SmallVec::new();
                    let mut all_reached = true;
                    for (i, atom) in from_node.atoms.iter().enumerate() {
                        if !dep_atoms[i] {
                            mixed.push(tuple[i]);
                            continue;
                        }
                        let goal = self.external_goal(
                            transition, i, atom, &match_node.atoms[i], tuple[i],
                        );
                        match goal.and_then(|g| self.find_established(&g)) {
                            Some(found) => mixed.push(found),
                            None => {
                                all_reached = false;
                                break;
                            }
                        }
                    }
                    if all_reached {
                        progress |= self.make_reachable(matched, mixed);
                        if !self.reachable[from.0 as usize].contains(&matched) {
                            self.reachable[from.0 as usize].push(matched);
                            progress = true;
                        }
                    }
                }
            }
        }
        Ok(progress)
    }

    /// The fact that must already be established for `atom` of the match
    /// node: dependent positions take the match's declared bindings, the
    /// rest take the supporting fact's groups.
    fn external_goal<'a>(
        &'a self,
        transition: &Transition,
        atom_index: usize,
        from_atom: &Atom,
        match_atom: &'a Atom,
        support: FactId,
    ) -> Option<ResolvedAtom<'a>> {
        let support = self.facts.resolve(support);
        if self.facts.terms(support).len() != from_atom.terms.len() {
            return None;
        }
        let mut terms: SmallVec<[&[ObjectId]; 4]> = SmallVec::new();
        for j in 0..from_atom.terms.len() {
            let dependent = transition
                .external_deps
                .iter()
                .any(|d| d.atom == atom_index && d.term == j);
            if dependent {
                terms.push(resolve_pattern(&match_atom.terms[j], &self.unifier, self.model));
            } else {
                let group = self.eogs.root_of(self.facts.terms(support)[j]);
                terms.push(self.eogs.members_sorted(group));
            }
        }
        Some(ResolvedAtom {
            predicate: from_atom.predicate,
            terms,
        })
    }

    /// First established fact, in intern order, unifiable with the goal.
    fn find_established(&self, goal: &ResolvedAtom<'_>) -> Option<FactId> {
        self.facts.live_ids().find(|&f| {
            self.unifier
                .can_unify(goal, &solver::resolve_fact(f, &self.facts, &self.eogs))
        })
    }

    /// Cross-checks the per-iteration invariants; debug builds run this at
    /// every iteration boundary.
    fn check_invariants(&self) {
        for fact in self.facts.live_ids() {
            for &term in self.facts.terms(fact) {
                debug_assert!(
                    self.eogs.is_root(self.eogs.root_of(term)),
                    "fact term does not resolve to a root"
                );
            }
        }
        for node in 0..self.supports.len() {
            let tuples = &self.supports[node];
            for (i, a) in tuples.iter().enumerate() {
                for b in &tuples[i + 1..] {
                    let identical = a.facts.len() == b.facts.len()
                        && a.facts.iter().zip(&b.facts).all(|(&x, &y)| {
                            self.facts.is_identical(
                                self.facts.resolve(x),
                                self.facts.resolve(y),
                                &self.eogs,
                            )
                        });
                    debug_assert!(!identical, "duplicate support tuple on node {}", node);
                }
            }
        }
    }
}

/// Odometer-style cartesian product over per-position choice lists.
fn cartesian<T: Copy>(lists: &[Vec<T>]) -> Vec<SmallVec<[T; 4]>> {
    let mut out = Vec::new();
    if lists.iter().any(|l| l.is_empty()) {
        return out;
    }
    let mut idx = vec![0usize; lists.len()];
    'outer: loop {
        out.push(lists.iter().zip(&idx).map(|(l, &i)| l[i]).collect());
        let mut k = lists.len();
        while k > 0 {
            k -= 1;
            idx[k] += 1;
            if idx[k] < lists[k].len() {
                continue 'outer;
            }
            idx[k] = 0;
        }
        return out;
    }
}

/// Queryable result of a completed analysis. Borrows the quiesced engine.
pub struct Report<'e, 'm, U: Unify> {
    engine: &'e ReachabilityEngine<'m, U>,
}

impl<'e, 'm, U: Unify> Report<'e, 'm, U> {
    /// Every live reachable fact, in intern order.
    pub fn all_reachable_facts(&self) -> Vec<FactId> {
        self.engine.facts.live_ids().collect()
    }

    /// Support tuples recorded for a node, in discovery order.
    pub fn supports(&self, node: NodeId) -> &[SupportTuple] {
        &self.engine.supports[node.0 as usize]
    }

    /// Nodes reachable from `node` through achieved transitions.
    pub fn reachable_nodes(&self, node: NodeId) -> &[NodeId] {
        &self.engine.reachable[node.0 as usize]
    }

    /// The root group an object belongs to after the fixed point.
    pub fn eog_of(&self, object: ObjectId) -> EogId {
        self.engine.eogs.eog_of(object)
    }

    /// Members of a group as the partition stood at the end of `iteration`.
    pub fn eog_membership(&self, eog: EogId, iteration: u32) -> Vec<ObjectId> {
        self.engine.eogs.members_at(eog, iteration)
    }

    pub fn num_equivalence_classes(&self) -> usize {
        self.engine.eogs.num_equivalence_classes()
    }

    /// Number of outer iterations the fixed point took.
    pub fn iterations(&self) -> u32 {
        self.engine.iteration
    }

    /// Is a concrete ground fact covered by some reachable fact?
    pub fn holds(&self, predicate: PredicateId, objects: &[ObjectId]) -> bool {
        self.engine.facts.live_ids().any(|f| {
            if self.engine.facts.predicate(f) != predicate {
                return false;
            }
            let terms = self.engine.facts.terms(f);
            terms.len() == objects.len()
                && terms.iter().zip(objects).all(|(&t, o)| {
                    self.engine
                        .eogs
                        .members_sorted(self.engine.eogs.root_of(t))
                        .binary_search(o)
                        .is_ok()
                })
        })
    }

    pub fn render_fact(&self, fact: FactId) -> String {
        self.engine
            .facts
            .render(fact, self.engine.model, &self.engine.eogs)
    }

    /// Deterministic snapshot of the reachable set, sorted for comparison
    /// across runs.
    pub fn fact_table(&self) -> Vec<String> {
        let mut rows: Vec<String> = self
            .engine
            .facts
            .live_ids()
            .map(|f| self.render_fact(f))
            .collect();
        rows.sort();
        rows
    }
}

#[cfg(test)]
#[path = "tests/engine.rs"]
mod tests;
