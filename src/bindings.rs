//! Bindings - the unifier facade over variable domains.
//!
//! Every lifted atom position resolves to a set of candidate objects: the
//! declared (possibly narrowed) domain of its variable, the singleton of its
//! constant, or the member set of an equivalence group. Unification between
//! two atoms is positionwise non-empty intersection of those sets, and
//! equivalence is positionwise equality. All operations are total.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::model::{Model, ObjectId, PredicateId, TypeId, VarId};

/// An atom with every position resolved to a sorted object set.
#[derive(Debug, Clone)]
pub struct ResolvedAtom<'a> {
    pub predicate: PredicateId,
    pub terms: SmallVec<[&'a [ObjectId]; 4]>,
}

impl<'a> ResolvedAtom<'a> {
    pub fn new(predicate: PredicateId, terms: impl IntoIterator<Item = &'a [ObjectId]>) -> Self {
        Self {
            predicate,
            terms: terms.into_iter().collect(),
        }
    }
}

/// The capability interface the engine consumes for variable bindings.
pub trait Unify {
    /// Pairwise compatibility: same predicate and every positionwise
    /// intersection non-empty.
    fn can_unify(&self, a: &ResolvedAtom<'_>, b: &ResolvedAtom<'_>) -> bool;

    /// Stronger than unification: termwise domain equality.
    fn are_equivalent(&self, a: &ResolvedAtom<'_>, b: &ResolvedAtom<'_>) -> bool;

    /// The declared (possibly narrowed) domain of a variable, sorted.
    fn domain(&self, var: VarId) -> &[ObjectId];

    /// Narrow a variable domain to the given objects.
    fn set_domain(&mut self, var: VarId, objects: &[ObjectId]);
}

#[derive(Clone)]
struct VarInfo {
    #[allow(dead_code)]
    ty: TypeId,
    domain: Vec<ObjectId>,
}

/// Concrete variable-domain store implementing [`Unify`].
#[derive(Clone)]
pub struct Bindings {
    vars: Vec<VarInfo>,
}

impl Bindings {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Declare a variable of the given type. Its initial domain is every
    /// object whose type is a subtype of `ty`, in id order (sorted).
    pub fn declare_var(&mut self, ty: TypeId, model: &Model) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo {
            ty,
            domain: model.objects_of_type(ty),
        });
        id
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

impl Unify for Bindings {
    fn can_unify(&self, a: &ResolvedAtom<'_>, b: &ResolvedAtom<'_>) -> bool {
        if a.predicate != b.predicate || a.terms.len() != b.terms.len() {
            return false;
        }
        a.terms
            .iter()
            .zip(b.terms.iter())
            .all(|(x, y)| intersects_sorted(x, y))
    }

    fn are_equivalent(&self, a: &ResolvedAtom<'_>, b: &ResolvedAtom<'_>) -> bool {
        if a.predicate != b.predicate || a.terms.len() != b.terms.len() {
            return false;
        }
        a.terms.iter().zip(b.terms.iter()).all(|(x, y)| x == y)
    }

    fn domain(&self, var: VarId) -> &[ObjectId] {
        &self.vars[var.0 as usize].domain
    }

    fn set_domain(&mut self, var: VarId, objects: &[ObjectId]) {
        let mut narrowed = objects.to_vec();
        narrowed.sort_unstable();
        narrowed.dedup();
        self.vars[var.0 as usize].domain = narrowed;
    }
}

/// Running variable assignment used by the support-tuple solver. Maps a
/// variable-domain identity to the intersection accumulated so far.
#[derive(Debug, Clone, Default)]
pub struct VarAssignment {
    inner: FxHashMap<VarId, Vec<ObjectId>>,
}

impl VarAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: VarId) -> Option<&[ObjectId]> {
        self.inner.get(&var).map(|v| v.as_slice())
    }

    pub fn insert(&mut self, var: VarId, objects: Vec<ObjectId>) {
        self.inner.insert(var, objects);
    }

    /// Intersect the running domain for `var` with `with`, starting from
    /// `fallback` when the variable is still unassigned. Returns false when
    /// the intersection is empty (the assignment is left untouched).
    pub fn narrow(&mut self, var: VarId, with: &[ObjectId], fallback: &[ObjectId]) -> bool {
        let base = self.inner.get(&var).map(|v| v.as_slice()).unwrap_or(fallback);
        let inter = intersect_sorted(base, with);
        if inter.is_empty() {
            return false;
        }
        self.inner.insert(var, inter);
        true
    }
}

/// Intersection of two sorted object slices.
pub fn intersect_sorted(a: &[ObjectId], b: &[ObjectId]) -> Vec<ObjectId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Non-empty intersection test for two sorted object slices.
pub fn intersects_sorted(a: &[ObjectId], b: &[ObjectId]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}
