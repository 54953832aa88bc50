//! Dtg - Read-only domain transition graphs.
//!
//! A DTG node is an invariant state fragment: an ordered list of lifted
//! atoms. A transition rewrites the from-node's fragment into the to-node's,
//! subject to extra precondition atoms drawn from the same variable
//! namespace. The graph is produced by the host planner and validated here
//! once, before any analysis runs.

use smallvec::SmallVec;

use crate::bindings::{Bindings, Unify};
use crate::model::{Atom, Model, ModelError, ObjectId, PatternTerm};

/// Unique identifier for a DTG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Unique identifier for a DTG transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub u32);

/// A term position of a from-node atom whose value is controlled by another
/// property space (for example a vehicle's location as seen by its cargo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalDep {
    pub atom: usize,
    pub term: usize,
}

/// An invariant state fragment.
#[derive(Debug, Clone)]
pub struct DtgNode {
    pub atoms: Vec<Atom>,
}

/// An edge of the graph, derived from an operator schema.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: NodeId,
    pub to: NodeId,
    /// Full precondition set, sharing variables with the from-node atoms.
    pub preconditions: Vec<Atom>,
    /// Instances of the to-node atoms in this transition's namespace,
    /// aligned with the to-node atom list.
    pub effects: Vec<Atom>,
    /// Externally-dependent from-node positions; empty for ordinary edges.
    pub external_deps: Vec<ExternalDep>,
}

/// The validated, immutable graph the engine runs over.
pub struct DtgGraph {
    nodes: Vec<DtgNode>,
    transitions: Vec<Transition>,
    outgoing: Vec<SmallVec<[TransitionId; 4]>>,
}

impl DtgGraph {
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DtgNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn node(&self, id: NodeId) -> &DtgNode {
        &self.nodes[id.0 as usize]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0 as usize]
    }

    pub fn num_transitions(&self) -> usize {
        self.transitions.len()
    }

    pub fn outgoing(&self, node: NodeId) -> &[TransitionId] {
        &self.outgoing[node.0 as usize]
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions
            .iter()
            .enumerate()
            .map(|(i, t)| (TransitionId(i as u32), t))
    }

    /// Nodes structurally matching `from`, ignoring the given dependent
    /// positions: same shape, same predicates, and unifiable declared
    /// domains everywhere else. The from-node itself is excluded.
    pub fn matching_nodes<U: Unify>(
        &self,
        from: NodeId,
        deps: &[ExternalDep],
        unifier: &U,
        model: &Model,
    ) -> Vec<NodeId> {
        let from_node = self.node(from);
        let mut matches = Vec::new();
        for (id, node) in self.nodes() {
            if id == from {
                continue;
            }
            if node.atoms.len() != from_node.atoms.len() {
                continue;
            }
            let structural = from_node.atoms.iter().enumerate().all(|(i, fa)| {
                let na = &node.atoms[i];
                if na.predicate != fa.predicate {
                    return false;
                }
                fa.terms.iter().enumerate().all(|(j, ft)| {
                    if deps.iter().any(|d| d.atom == i && d.term == j) {
                        return true;
                    }
                    let fd = resolve_pattern(ft, unifier, model);
                    let nd = resolve_pattern(&na.terms[j], unifier, model);
                    crate::bindings::intersects_sorted(fd, nd)
                })
            });
            if structural {
                matches.push(id);
            }
        }
        matches
    }
}

/// Resolve a pattern term to its declared object set.
pub fn resolve_pattern<'a, U: Unify>(
    term: &'a PatternTerm,
    unifier: &'a U,
    model: &Model,
) -> &'a [ObjectId] {
    match term {
        PatternTerm::Var(v) => unifier.domain(*v),
        PatternTerm::Const(o) => {
            debug_assert!((o.0 as usize) < model.num_objects());
            std::slice::from_ref(o)
        }
    }
}

/// Incremental graph builder with fail-fast validation.
pub struct DtgBuilder<'m> {
    model: &'m Model,
    bindings: &'m Bindings,
    nodes: Vec<DtgNode>,
    transitions: Vec<Transition>,
}

impl<'m> DtgBuilder<'m> {
    pub fn new(model: &'m Model, bindings: &'m Bindings) -> Self {
        Self {
            model,
            bindings,
            nodes: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn add_node(&mut self, atoms: Vec<Atom>) -> Result<NodeId, ModelError> {
        for atom in &atoms {
            self.check_atom(atom)?;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(DtgNode { atoms });
        Ok(id)
    }

    pub fn add_transition(
        &mut self,
        from: NodeId,
        to: NodeId,
        preconditions: Vec<Atom>,
        effects: Vec<Atom>,
    ) -> Result<TransitionId, ModelError> {
        self.add_transition_with_deps(from, to, preconditions, effects, Vec::new())
    }

    pub fn add_transition_with_deps(
        &mut self,
        from: NodeId,
        to: NodeId,
        preconditions: Vec<Atom>,
        effects: Vec<Atom>,
        external_deps: Vec<ExternalDep>,
    ) -> Result<TransitionId, ModelError> {
        self.check_node(from)?;
        self.check_node(to)?;
        for atom in preconditions.iter().chain(effects.iter()) {
            self.check_atom(atom)?;
        }
        let to_atoms = &self.nodes[to.0 as usize].atoms;
        if effects.len() != to_atoms.len() {
            return Err(ModelError::EffectMismatch {
                expected: to_atoms.len(),
                found: effects.len(),
            });
        }
        for (i, effect) in effects.iter().enumerate() {
            if effect.predicate != to_atoms[i].predicate {
                return Err(ModelError::EffectPredicate { index: i });
            }
        }
        let from_node = &self.nodes[from.0 as usize];
        for dep in &external_deps {
            let in_range = from_node
                .atoms
                .get(dep.atom)
                .is_some_and(|atom| dep.term < atom.terms.len());
            if !in_range {
                return Err(ModelError::BadDependency {
                    atom: dep.atom,
                    term: dep.term,
                });
            }
        }
        let id = TransitionId(self.transitions.len() as u32);
        self.transitions.push(Transition {
            from,
            to,
            preconditions,
            effects,
            external_deps,
        });
        Ok(id)
    }

    pub fn build(self) -> DtgGraph {
        let mut outgoing: Vec<SmallVec<[TransitionId; 4]>> =
            vec![SmallVec::new(); self.nodes.len()];
        for (i, t) in self.transitions.iter().enumerate() {
            outgoing[t.from.0 as usize].push(TransitionId(i as u32));
        }
        DtgGraph {
            nodes: self.nodes,
            transitions: self.transitions,
            outgoing,
        }
    }

    fn check_node(&self, id: NodeId) -> Result<(), ModelError> {
        if (id.0 as usize) < self.nodes.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownNode(id.0))
        }
    }

    fn check_atom(&self, atom: &Atom) -> Result<(), ModelError> {
        self.model.check_predicate(atom.predicate)?;
        let pred = self.model.predicate(atom.predicate);
        if pred.arity() != atom.terms.len() {
            return Err(ModelError::ArityMismatch {
                predicate: self.model.predicate_name(atom.predicate).to_string(),
                expected: pred.arity(),
                found: atom.terms.len(),
            });
        }
        for term in &atom.terms {
            match term {
                PatternTerm::Var(v) => {
                    if v.0 as usize >= self.bindings.num_vars() {
                        return Err(ModelError::UnknownVar(v.0));
                    }
                }
                PatternTerm::Const(o) => self.model.check_object(*o)?,
            }
        }
        Ok(())
    }
}
