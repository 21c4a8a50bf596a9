//! Reaching-definitions maps.

use cryo_ir::{MemoryLocation, TermId};

/// Maps memory locations to the set of write terms that may reach a point.
///
/// The map is kept in a canonical form (chunks sorted by location, term
/// sets sorted and deduplicated) so that structural equality is the map
/// equality the fixpoint loop needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachingDefinitions {
    chunks: Vec<(MemoryLocation, Vec<TermId>)>,
}

impl ReachingDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Iterates over `(defined location, defining terms)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&MemoryLocation, &[TermId])> {
        self.chunks
            .iter()
            .map(|(location, terms)| (location, terms.as_slice()))
    }

    /// Records `term` as the definition of `location`.
    ///
    /// Existing definitions fully covered by `location` are killed; ones
    /// overlapping it only partially survive on their remaining slices.
    pub fn add_definition(&mut self, location: MemoryLocation, term: TermId) {
        self.carve(&location);
        self.chunks.push((location, vec![term]));
        self.normalize();
    }

    /// Kills all definitions overlapping `location`.
    pub fn kill_definitions(&mut self, location: MemoryLocation) {
        self.carve(&location);
        self.normalize();
    }

    /// The definitions visible through `location`: every overlapping chunk,
    /// narrowed to its intersection with `location`.
    pub fn get_definitions(&self, location: MemoryLocation) -> ReachingDefinitions {
        let mut result = ReachingDefinitions::new();
        for (chunk, terms) in &self.chunks {
            if let Some(intersection) = chunk.intersect(&location) {
                result.chunks.push((intersection, terms.clone()));
            }
        }
        result.normalize();
        result
    }

    /// Pointwise union with `other`, used at control-flow merge points.
    pub fn merge(&mut self, other: &ReachingDefinitions) {
        self.chunks.extend(other.chunks.iter().cloned());
        self.normalize();
    }

    /// Removes the parts of existing chunks that `location` overlaps.
    fn carve(&mut self, location: &MemoryLocation) {
        let mut survivors = Vec::with_capacity(self.chunks.len());
        for (chunk, terms) in self.chunks.drain(..) {
            if !chunk.overlaps(location) {
                survivors.push((chunk, terms));
                continue;
            }
            if chunk.addr < location.addr {
                let left =
                    MemoryLocation::new(chunk.domain, chunk.addr, location.addr - chunk.addr);
                survivors.push((left, terms.clone()));
            }
            if chunk.end_addr() > location.end_addr() {
                let right = MemoryLocation::new(
                    chunk.domain,
                    location.end_addr(),
                    chunk.end_addr() - location.end_addr(),
                );
                survivors.push((right, terms));
            }
        }
        self.chunks = survivors;
    }

    /// Restores the canonical form: chunks sorted by location, equal
    /// locations unioned, term sets sorted and deduplicated.
    fn normalize(&mut self) {
        self.chunks.sort_by_key(|(location, _)| *location);
        let mut normalized: Vec<(MemoryLocation, Vec<TermId>)> = Vec::new();
        for (location, mut terms) in self.chunks.drain(..) {
            match normalized.last_mut() {
                Some((last, last_terms)) if *last == location => {
                    last_terms.append(&mut terms);
                }
                _ => normalized.push((location, terms)),
            }
        }
        for (_, terms) in &mut normalized {
            terms.sort();
            terms.dedup();
        }
        self.chunks = normalized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryo_ir::MemoryDomain;

    fn reg(addr: i64, size: i64) -> MemoryLocation {
        MemoryLocation::new(MemoryDomain::Register, addr, size)
    }

    #[test]
    fn test_add_then_get() {
        let mut defs = ReachingDefinitions::new();
        defs.add_definition(reg(0, 32), TermId(1));

        let visible = defs.get_definitions(reg(0, 32));
        let chunks: Vec<_> = visible.iter().collect();
        assert_eq!(chunks, vec![(&reg(0, 32), &[TermId(1)][..])]);
    }

    #[test]
    fn test_add_kills_covered() {
        let mut defs = ReachingDefinitions::new();
        defs.add_definition(reg(0, 32), TermId(1));
        defs.add_definition(reg(0, 64), TermId(2));

        let visible = defs.get_definitions(reg(0, 32));
        let chunks: Vec<_> = visible.iter().collect();
        assert_eq!(chunks, vec![(&reg(0, 32), &[TermId(2)][..])]);
    }

    #[test]
    fn test_partial_overlap_splits() {
        let mut defs = ReachingDefinitions::new();
        defs.add_definition(reg(0, 64), TermId(1));
        defs.add_definition(reg(0, 32), TermId(2));

        // The old definition survives on its upper half only.
        let upper = defs.get_definitions(reg(32, 32));
        assert_eq!(
            upper.iter().collect::<Vec<_>>(),
            vec![(&reg(32, 32), &[TermId(1)][..])]
        );
        let lower = defs.get_definitions(reg(0, 32));
        assert_eq!(
            lower.iter().collect::<Vec<_>>(),
            vec![(&reg(0, 32), &[TermId(2)][..])]
        );
    }

    #[test]
    fn test_kill_then_empty() {
        let mut defs = ReachingDefinitions::new();
        defs.add_definition(reg(0, 32), TermId(1));
        defs.kill_definitions(reg(0, 32));
        assert!(defs.is_empty());
        assert!(defs.get_definitions(reg(0, 32)).is_empty());
    }

    #[test]
    fn test_kill_respects_domain() {
        let mut defs = ReachingDefinitions::new();
        defs.add_definition(reg(0, 32), TermId(1));
        defs.kill_definitions(MemoryLocation::new(MemoryDomain::Stack, 0, 32));
        assert!(!defs.is_empty());
    }

    #[test]
    fn test_merge_is_union() {
        let mut a = ReachingDefinitions::new();
        a.add_definition(reg(0, 32), TermId(1));
        let mut b = ReachingDefinitions::new();
        b.add_definition(reg(0, 32), TermId(2));
        b.add_definition(reg(64, 32), TermId(3));

        a.merge(&b);
        let visible = a.get_definitions(reg(0, 32));
        assert_eq!(
            visible.iter().collect::<Vec<_>>(),
            vec![(&reg(0, 32), &[TermId(1), TermId(2)][..])]
        );
        assert!(!a.get_definitions(reg(64, 32)).is_empty());
    }

    #[test]
    fn test_merge_idempotent_and_commutative() {
        let mut a = ReachingDefinitions::new();
        a.add_definition(reg(0, 32), TermId(1));
        a.add_definition(reg(32, 16), TermId(2));

        let mut twice = a.clone();
        twice.merge(&a);
        assert_eq!(twice, a);

        let mut b = ReachingDefinitions::new();
        b.add_definition(reg(16, 32), TermId(3));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_merge_preserves_overlapping_chunks() {
        // Merging keeps both the wide and the narrow definition.
        let mut a = ReachingDefinitions::new();
        a.add_definition(reg(0, 64), TermId(1));
        let mut b = ReachingDefinitions::new();
        b.add_definition(reg(0, 32), TermId(2));

        a.merge(&b);
        assert_eq!(a.iter().count(), 2);
        let visible = a.get_definitions(reg(0, 32));
        assert_eq!(
            visible.iter().collect::<Vec<_>>(),
            vec![(&reg(0, 32), &[TermId(1), TermId(2)][..])]
        );
    }
}
