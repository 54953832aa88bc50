use lasso::{Rodeo, Spur};

/// A unique identifier for an interned name (predicate, object, or type).
/// This is an interned string ID for fast equality comparison.
pub type NameId = Spur;

/// Symbol store for interning the names that appear in a planning domain.
///
/// Guarantees:
/// - Same string always produces same NameId
/// - Different strings always produce different NameIds
/// - NameId can be resolved back to the original string
///
/// The engine is single-threaded, so a plain rodeo suffices.
pub struct SymbolStore {
    rodeo: Rodeo,
}

impl SymbolStore {
    /// Create a new empty symbol store.
    pub fn new() -> Self {
        Self {
            rodeo: Rodeo::new(),
        }
    }

    /// Intern a name, returning its unique NameId.
    /// If the name was already interned, returns the existing NameId.
    pub fn intern(&mut self, name: &str) -> NameId {
        self.rodeo.get_or_intern(name)
    }

    /// Resolve a NameId back to its string representation.
    /// Returns None if the NameId was not created by this store.
    pub fn resolve(&self, id: NameId) -> Option<&str> {
        self.rodeo.try_resolve(&id)
    }

    /// Get the NameId for a name if it exists, without interning.
    pub fn get(&self, name: &str) -> Option<NameId> {
        self.rodeo.get(name)
    }

    /// Check if a name has already been interned.
    pub fn contains(&self, name: &str) -> bool {
        self.rodeo.contains(name)
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}
