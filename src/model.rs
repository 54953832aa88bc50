//! Model - Read-only planning domain inputs.
//!
//! Types, objects, and predicates are produced by the host planner's
//! grounding pipeline and borrowed by the engine for the duration of the
//! analysis. Nothing in here is mutated once the DTG graph is built.

use smallvec::SmallVec;
use thiserror::Error;

use crate::symbol::{NameId, SymbolStore};

/// Unique identifier for a type in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Unique identifier for an object in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// Unique identifier for a predicate in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateId(pub u32);

/// Identifier of a shared variable domain. Two atom positions carrying the
/// same VarId are constrained together wherever both appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Errors raised while assembling the model or seeding the engine.
///
/// These are all fail-fast input errors; invariant violations inside the
/// engine are programming bugs and abort via assertions instead.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown type id {0}")]
    UnknownType(u32),
    #[error("unknown object id {0}")]
    UnknownObject(u32),
    #[error("unknown predicate id {0}")]
    UnknownPredicate(u32),
    #[error("unknown variable id {0}")]
    UnknownVar(u32),
    #[error("unknown DTG node id {0}")]
    UnknownNode(u32),
    #[error("predicate {predicate} expects {expected} terms, got {found}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        found: usize,
    },
    #[error("object {object} is not a subtype of {expected}")]
    TypeMismatch { object: String, expected: String },
    #[error("transition effects must instance the to-node ({expected} atoms, got {found})")]
    EffectMismatch { expected: usize, found: usize },
    #[error("effect {index} does not instance the to-node atom's predicate")]
    EffectPredicate { index: usize },
    #[error("external dependency names position ({atom}, {term}) outside the from-node")]
    BadDependency { atom: usize, term: usize },
    #[error("{resource} pool exhausted")]
    Capacity { resource: &'static str },
}

/// A declared type with an optional parent. Subtyping is the
/// reflexive-transitive closure of the parent relation.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: NameId,
    pub parent: Option<TypeId>,
}

/// An immutable domain object.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: NameId,
    pub ty: TypeId,
    /// Grounded objects are frozen constants (locations, vehicles); their
    /// equivalence groups never merge.
    pub grounded: bool,
}

/// A predicate with typed parameters.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub name: NameId,
    pub params: SmallVec<[TypeId; 4]>,
    /// Term position that is the invariant parameter of the property space
    /// this predicate encodes, if any. Fact equivalence lets this position
    /// differ while all others must be identical.
    pub invariable: Option<usize>,
}

impl Predicate {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// One term position of a lifted atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTerm {
    Var(VarId),
    Const(ObjectId),
}

/// A lifted atom as it appears in DTG nodes and transition conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub predicate: PredicateId,
    pub terms: SmallVec<[PatternTerm; 4]>,
}

impl Atom {
    pub fn new(predicate: PredicateId, terms: impl IntoIterator<Item = PatternTerm>) -> Self {
        Self {
            predicate,
            terms: terms.into_iter().collect(),
        }
    }
}

/// A fully ground fact, as supplied in the initial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundFact {
    pub predicate: PredicateId,
    pub objects: SmallVec<[ObjectId; 4]>,
}

impl GroundFact {
    pub fn new(predicate: PredicateId, objects: impl IntoIterator<Item = ObjectId>) -> Self {
        Self {
            predicate,
            objects: objects.into_iter().collect(),
        }
    }
}

/// The read-only domain model: names, types, objects, and predicates.
pub struct Model {
    pub names: SymbolStore,
    types: Vec<TypeDecl>,
    objects: Vec<Object>,
    predicates: Vec<Predicate>,
}

impl Model {
    pub fn new() -> Self {
        Self {
            names: SymbolStore::new(),
            types: Vec::new(),
            objects: Vec::new(),
            predicates: Vec::new(),
        }
    }

    pub fn add_type(&mut self, name: &str, parent: Option<TypeId>) -> TypeId {
        let name = self.names.intern(name);
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDecl { name, parent });
        id
    }

    pub fn add_object(&mut self, name: &str, ty: TypeId) -> ObjectId {
        self.push_object(name, ty, false)
    }

    /// Add a grounded object (a frozen constant that never merges).
    pub fn add_grounded_object(&mut self, name: &str, ty: TypeId) -> ObjectId {
        self.push_object(name, ty, true)
    }

    fn push_object(&mut self, name: &str, ty: TypeId, grounded: bool) -> ObjectId {
        let name = self.names.intern(name);
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object { name, ty, grounded });
        id
    }

    pub fn add_predicate(
        &mut self,
        name: &str,
        params: impl IntoIterator<Item = TypeId>,
        invariable: Option<usize>,
    ) -> PredicateId {
        let name = self.names.intern(name);
        let id = PredicateId(self.predicates.len() as u32);
        self.predicates.push(Predicate {
            name,
            params: params.into_iter().collect(),
            invariable,
        });
        id
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    pub fn predicate(&self, id: PredicateId) -> &Predicate {
        &self.predicates[id.0 as usize]
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn num_predicates(&self) -> usize {
        self.predicates.len()
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjectId(i as u32), o))
    }

    /// Reflexive-transitive subtype test.
    pub fn is_subtype_of(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(ty) = current {
            if ty == sup {
                return true;
            }
            current = self.types[ty.0 as usize].parent;
        }
        false
    }

    /// All objects whose type is a subtype of `ty`, in id order.
    pub fn objects_of_type(&self, ty: TypeId) -> Vec<ObjectId> {
        self.objects()
            .filter(|(_, o)| self.is_subtype_of(o.ty, ty))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn object_name(&self, id: ObjectId) -> &str {
        self.names.resolve(self.objects[id.0 as usize].name).unwrap_or("?")
    }

    pub fn predicate_name(&self, id: PredicateId) -> &str {
        self.names
            .resolve(self.predicates[id.0 as usize].name)
            .unwrap_or("?")
    }

    pub(crate) fn check_object(&self, id: ObjectId) -> Result<(), ModelError> {
        if (id.0 as usize) < self.objects.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownObject(id.0))
        }
    }

    pub(crate) fn check_predicate(&self, id: PredicateId) -> Result<(), ModelError> {
        if (id.0 as usize) < self.predicates.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownPredicate(id.0))
        }
    }

    /// Validate a ground fact against the predicate signature.
    pub fn check_ground_fact(&self, fact: &GroundFact) -> Result<(), ModelError> {
        self.check_predicate(fact.predicate)?;
        let pred = self.predicate(fact.predicate);
        if pred.arity() != fact.objects.len() {
            return Err(ModelError::ArityMismatch {
                predicate: self.predicate_name(fact.predicate).to_string(),
                expected: pred.arity(),
                found: fact.objects.len(),
            });
        }
        for (i, &obj) in fact.objects.iter().enumerate() {
            self.check_object(obj)?;
            let expected = pred.params[i];
            if !self.is_subtype_of(self.object(obj).ty, expected) {
                return Err(ModelError::TypeMismatch {
                    object: self.object_name(obj).to_string(),
                    expected: self
                        .names
                        .resolve(self.types[expected.0 as usize].name)
                        .unwrap_or("?")
                        .to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}
