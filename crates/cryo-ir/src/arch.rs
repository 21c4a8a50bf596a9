//! Architecture descriptor consumed by analysis and synthesis.

use crate::memory::{MemoryDomain, MemoryLocation};

/// Byte order of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    Little,
    Big,
}

/// A named register backed by a memory location in the register domain.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterInfo {
    /// Lowercase register name, e.g. "rax".
    pub name: String,
    pub location: MemoryLocation,
}

/// Static properties of the target architecture.
///
/// This is a value object filled in by the per-architecture frontend; the
/// analysis core only ever reads it.
#[derive(Debug, Clone)]
pub struct Architecture {
    byte_order: ByteOrder,
    instruction_pointer: Option<MemoryLocation>,
    stack_pointer: MemoryLocation,
    pointer_size: u32,
    int_size: u32,
    registers: Vec<RegisterInfo>,
}

impl Architecture {
    /// Creates a descriptor with the given byte order and pointer/int sizes
    /// in bits.
    pub fn new(
        byte_order: ByteOrder,
        stack_pointer: MemoryLocation,
        pointer_size: u32,
        int_size: u32,
    ) -> Self {
        Self {
            byte_order,
            instruction_pointer: None,
            stack_pointer,
            pointer_size,
            int_size,
            registers: Vec::new(),
        }
    }

    /// Sets the instruction pointer location.
    pub fn with_instruction_pointer(mut self, location: MemoryLocation) -> Self {
        self.instruction_pointer = Some(location);
        self
    }

    /// Adds a named register.
    pub fn with_register(mut self, name: impl Into<String>, location: MemoryLocation) -> Self {
        self.registers.push(RegisterInfo {
            name: name.into(),
            location,
        });
        self
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Location of the instruction pointer, if the architecture exposes one.
    pub fn instruction_pointer(&self) -> Option<&MemoryLocation> {
        self.instruction_pointer.as_ref()
    }

    /// Location of the stack pointer register.
    pub fn stack_pointer(&self) -> &MemoryLocation {
        &self.stack_pointer
    }

    /// Pointer size in bits.
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// Natural integer size in bits.
    pub fn int_size(&self) -> u32 {
        self.int_size
    }

    /// Looks up the register occupying exactly the given location.
    pub fn register_at(&self, location: &MemoryLocation) -> Option<&RegisterInfo> {
        self.registers.iter().find(|r| &r.location == location)
    }

    /// Returns true if the location lives in memory shared beyond the
    /// function (reads from it have unknown definitions).
    pub fn is_global_memory(&self, location: &MemoryLocation) -> bool {
        location.domain == MemoryDomain::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup() {
        let sp = MemoryLocation::new(MemoryDomain::Register, 0, 64);
        let ip = MemoryLocation::new(MemoryDomain::Register, 64, 64);
        let arch = Architecture::new(ByteOrder::Little, sp, 64, 32)
            .with_instruction_pointer(ip)
            .with_register("rsp", sp)
            .with_register("rip", ip);

        assert_eq!(arch.register_at(&sp).unwrap().name, "rsp");
        assert_eq!(arch.instruction_pointer(), Some(&ip));
        let other = MemoryLocation::new(MemoryDomain::Register, 128, 64);
        assert!(arch.register_at(&other).is_none());
    }

    #[test]
    fn test_global_memory_predicate() {
        let sp = MemoryLocation::new(MemoryDomain::Register, 0, 64);
        let arch = Architecture::new(ByteOrder::Little, sp, 64, 32);

        assert!(arch.is_global_memory(&MemoryLocation::new(MemoryDomain::Memory, 0x1000, 8)));
        assert!(!arch.is_global_memory(&MemoryLocation::new(MemoryDomain::Stack, -8, 8)));
        assert!(!arch.is_global_memory(&sp));
    }
}
