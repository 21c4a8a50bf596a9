//! Per-switch synthesis state.

use indexmap::IndexMap;

use cryo_ir::BasicBlockId;

use crate::likec::CType;

/// State carried while emitting the body of a `switch`: the integer type of
/// the switch value, the mapping from target addresses to case values, and
/// the default basic block.
#[derive(Debug, Clone)]
pub struct SwitchContext {
    value_type: CType,
    case_values: IndexMap<u64, Vec<u64>>,
    default_block: Option<BasicBlockId>,
}

impl SwitchContext {
    pub fn new() -> Self {
        Self {
            value_type: CType::integer(32, false),
            case_values: IndexMap::new(),
            default_block: None,
        }
    }

    pub fn value_type(&self) -> &CType {
        &self.value_type
    }

    pub fn set_value_type(&mut self, ty: CType) {
        self.value_type = ty;
    }

    /// Maps a jump-table target address to a case value.
    pub fn add_case_value(&mut self, address: u64, value: u64) {
        self.case_values.entry(address).or_default().push(value);
    }

    /// The case values whose target is `address`.
    pub fn case_values(&self, address: u64) -> &[u64] {
        self.case_values
            .get(&address)
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }

    /// Consumes the case values for `address` once their labels were
    /// emitted.
    pub fn erase_case_values(&mut self, address: u64) {
        self.case_values.shift_remove(&address);
    }

    pub fn default_block(&self) -> Option<BasicBlockId> {
        self.default_block
    }

    pub fn set_default_block(&mut self, block: BasicBlockId) {
        self.default_block = Some(block);
    }

    /// The `(address, case values)` pairs no emitted block consumed.
    pub fn remaining(&self) -> impl Iterator<Item = (u64, &[u64])> {
        self.case_values
            .iter()
            .map(|(address, values)| (*address, values.as_slice()))
    }
}

impl Default for SwitchContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_values_lifecycle() {
        let mut context = SwitchContext::new();
        context.add_case_value(0x100, 0);
        context.add_case_value(0x100, 3);
        context.add_case_value(0x200, 1);

        assert_eq!(context.case_values(0x100), &[0, 3]);
        context.erase_case_values(0x100);
        assert!(context.case_values(0x100).is_empty());
        assert_eq!(context.remaining().count(), 1);
    }
}
