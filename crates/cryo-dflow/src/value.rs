//! Per-term dataflow values.

use crate::abstract_value::AbstractValue;

/// Whether a term's value is a displacement from the entry stack pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackOffset {
    #[default]
    Unknown,
    /// A signed byte offset from the stack pointer at function entry.
    Offset(i64),
    NotOffset,
}

/// Whether a term's value is a product (multiplication or left shift).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Product {
    #[default]
    Unknown,
    Product,
    NotProduct,
}

/// The dataflow value of a term: an abstract value plus two orthogonal
/// three-state flags tracked alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Value {
    abstract_value: AbstractValue,
    stack_offset: StackOffset,
    product: Product,
}

impl Value {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abstract_value(&self) -> &AbstractValue {
        &self.abstract_value
    }

    pub fn set_abstract_value(&mut self, value: AbstractValue) {
        self.abstract_value = value;
    }

    pub fn stack_offset(&self) -> StackOffset {
        self.stack_offset
    }

    pub fn is_stack_offset(&self) -> bool {
        matches!(self.stack_offset, StackOffset::Offset(_))
    }

    pub fn is_not_stack_offset(&self) -> bool {
        self.stack_offset == StackOffset::NotOffset
    }

    /// The concrete offset, when the value is known to be one.
    pub fn stack_offset_value(&self) -> Option<i64> {
        match self.stack_offset {
            StackOffset::Offset(offset) => Some(offset),
            _ => None,
        }
    }

    pub fn make_stack_offset(&mut self, offset: i64) {
        self.stack_offset = StackOffset::Offset(offset);
    }

    pub fn make_not_stack_offset(&mut self) {
        self.stack_offset = StackOffset::NotOffset;
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn is_product(&self) -> bool {
        self.product == Product::Product
    }

    pub fn is_not_product(&self) -> bool {
        self.product == Product::NotProduct
    }

    pub fn make_product(&mut self) {
        self.product = Product::Product;
    }

    pub fn make_not_product(&mut self) {
        self.product = Product::NotProduct;
    }

    /// Copies both flags from another value.
    pub fn copy_flags(&mut self, other: &Value) {
        self.stack_offset = other.stack_offset;
        self.product = other.product;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_start_unknown() {
        let value = Value::new();
        assert!(!value.is_stack_offset());
        assert!(!value.is_not_stack_offset());
        assert!(!value.is_product());
        assert!(!value.is_not_product());
    }

    #[test]
    fn test_stack_offset_transitions() {
        let mut value = Value::new();
        value.make_stack_offset(-8);
        assert_eq!(value.stack_offset_value(), Some(-8));

        value.make_stack_offset(-16);
        assert_eq!(value.stack_offset_value(), Some(-16));

        value.make_not_stack_offset();
        assert!(value.is_not_stack_offset());
        assert_eq!(value.stack_offset_value(), None);
    }

    #[test]
    fn test_default_abstract_value_is_unit() {
        let value = Value::new();
        assert_eq!(value.abstract_value().size(), 0);
    }
}
