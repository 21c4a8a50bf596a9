//! Results of dataflow analysis for one function.

use indexmap::IndexMap;

use cryo_ir::{MemoryLocation, TermId};

use crate::reaching::ReachingDefinitions;
use crate::value::Value;

/// Per-term dataflow tables: values, resolved memory locations, reaching
/// definitions of reads, and use lists of writes.
///
/// The tables are keyed by term handles and never extend IR lifetimes.
#[derive(Debug, Default)]
pub struct Dataflow {
    values: IndexMap<TermId, Value>,
    memory_locations: IndexMap<TermId, MemoryLocation>,
    definitions: IndexMap<TermId, ReachingDefinitions>,
    uses: IndexMap<TermId, Vec<TermId>>,
}

impl Dataflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value computed for a term; the default value if none was yet.
    pub fn value(&self, term: TermId) -> Value {
        self.values.get(&term).copied().unwrap_or_default()
    }

    /// Mutable access to a term's value, created on first use.
    pub fn value_mut(&mut self, term: TermId) -> &mut Value {
        self.values.entry(term).or_default()
    }

    /// The memory location a term resolved to.
    pub fn memory_location(&self, term: TermId) -> Option<&MemoryLocation> {
        self.memory_locations.get(&term)
    }

    pub fn set_memory_location(&mut self, term: TermId, location: MemoryLocation) {
        self.memory_locations.insert(term, location);
    }

    pub fn unset_memory_location(&mut self, term: TermId) {
        self.memory_locations.shift_remove(&term);
    }

    /// The definitions reaching a read term.
    pub fn definitions(&self, term: TermId) -> Option<&ReachingDefinitions> {
        self.definitions.get(&term)
    }

    /// True if any definition reaches the term.
    pub fn has_definitions(&self, term: TermId) -> bool {
        self.definitions
            .get(&term)
            .is_some_and(|defs| !defs.is_empty())
    }

    pub fn set_definitions(&mut self, term: TermId, definitions: ReachingDefinitions) {
        self.definitions.insert(term, definitions);
    }

    pub fn clear_definitions(&mut self, term: TermId) {
        self.definitions.shift_remove(&term);
    }

    /// The reads a defining term reaches.
    pub fn uses(&self, term: TermId) -> &[TermId] {
        self.uses.get(&term).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn add_use(&mut self, definition: TermId, use_term: TermId) {
        let uses = self.uses.entry(definition).or_default();
        if !uses.contains(&use_term) {
            uses.push(use_term);
        }
    }

    pub fn clear_uses(&mut self, term: TermId) {
        self.uses.shift_remove(&term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_value::AbstractValue;
    use cryo_ir::MemoryDomain;

    #[test]
    fn test_value_defaults() {
        let mut df = Dataflow::new();
        assert_eq!(df.value(TermId(0)).abstract_value().size(), 0);

        df.value_mut(TermId(0))
            .set_abstract_value(AbstractValue::concrete(32, 7));
        assert_eq!(
            df.value(TermId(0)).abstract_value().as_concrete().unwrap().value(),
            7
        );
    }

    #[test]
    fn test_memory_location_set_unset() {
        let mut df = Dataflow::new();
        let loc = MemoryLocation::new(MemoryDomain::Register, 0, 64);
        df.set_memory_location(TermId(3), loc);
        assert_eq!(df.memory_location(TermId(3)), Some(&loc));
        df.unset_memory_location(TermId(3));
        assert_eq!(df.memory_location(TermId(3)), None);
    }

    #[test]
    fn test_uses_deduplicate() {
        let mut df = Dataflow::new();
        df.add_use(TermId(1), TermId(2));
        df.add_use(TermId(1), TermId(2));
        assert_eq!(df.uses(TermId(1)), &[TermId(2)]);
        df.clear_uses(TermId(1));
        assert!(df.uses(TermId(1)).is_empty());
    }
}
