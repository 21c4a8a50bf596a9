//! Shared builders for synthesis tests.

use std::collections::HashMap;

use cryo_cgen::{Liveness, Signature, Signatures, Ty, Types, VarId, Variable, Variables};
use cryo_dflow::Dataflow;
use cryo_ir::{Architecture, ByteOrder, Function, MemoryDomain, MemoryLocation, StmtId, TermId};

pub fn test_arch() -> Architecture {
    let sp = MemoryLocation::new(MemoryDomain::Register, 0, 64);
    Architecture::new(ByteOrder::Little, sp, 64, 32)
}

/// A register location for tests; slot 0 is reserved for the stack pointer.
pub fn reg(slot: i64, size: i64) -> MemoryLocation {
    MemoryLocation::new(MemoryDomain::Register, 64 + slot * 64, size)
}

/// Everything is live.
pub struct AllLive;

impl Liveness for AllLive {
    fn is_live(&self, _term: TermId) -> bool {
        true
    }
}

/// Everything is live except the listed terms.
pub struct AllLiveExcept(pub Vec<TermId>);

impl Liveness for AllLiveExcept {
    fn is_live(&self, term: TermId) -> bool {
        !self.0.contains(&term)
    }
}

/// Groups accessed terms into one variable per distinct memory location.
pub struct AutoVariables {
    vars: Vec<Variable>,
    by_term: HashMap<TermId, VarId>,
}

impl AutoVariables {
    pub fn build(function: &Function, dataflow: &Dataflow) -> Self {
        let mut index: HashMap<MemoryLocation, usize> = HashMap::new();
        let mut vars: Vec<Variable> = Vec::new();
        let mut by_term = HashMap::new();

        for term in function.term_ids() {
            let Some(&location) = dataflow.memory_location(term) else {
                continue;
            };
            let slot = *index.entry(location).or_insert_with(|| {
                vars.push(Variable {
                    global: location.domain == MemoryDomain::Memory,
                    location,
                    terms_and_locations: Vec::new(),
                });
                vars.len() - 1
            });
            vars[slot].terms_and_locations.push((term, location));
            by_term.insert(term, VarId(slot as u32));
        }

        Self { vars, by_term }
    }
}

impl Variables for AutoVariables {
    fn variable_of(&self, term: TermId) -> Option<VarId> {
        self.by_term.get(&term).copied()
    }

    fn get(&self, var: VarId) -> &Variable {
        &self.vars[var.0 as usize]
    }
}

/// Types every term as an unsigned integer of its size, with overrides.
pub struct SizeTypes<'a> {
    function: &'a Function,
    overrides: HashMap<TermId, Ty>,
}

impl<'a> SizeTypes<'a> {
    pub fn new(function: &'a Function) -> Self {
        Self {
            function,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, term: TermId, ty: Ty) -> Self {
        self.overrides.insert(term, ty);
        self
    }
}

impl Types for SizeTypes<'_> {
    fn type_of(&self, term: TermId) -> Ty {
        self.overrides
            .get(&term)
            .cloned()
            .unwrap_or_else(|| Ty::integer(self.function.term(term).size, true))
    }
}

/// No signatures are known.
pub struct NoSignatures;

impl Signatures for NoSignatures {
    fn function_signature(&self, _function: &Function) -> Option<&Signature> {
        None
    }

    fn call_signature(&self, _call: StmtId) -> Option<&Signature> {
        None
    }

    fn signature_at(&self, _address: u64) -> Option<&Signature> {
        None
    }
}

/// A fixed signature for the function itself, one for every call, and one
/// per callee address.
pub struct MapSignatures {
    pub function: Option<Signature>,
    pub calls: Option<Signature>,
    pub by_address: HashMap<u64, Signature>,
}

impl Signatures for MapSignatures {
    fn function_signature(&self, _function: &Function) -> Option<&Signature> {
        self.function.as_ref()
    }

    fn call_signature(&self, _call: StmtId) -> Option<&Signature> {
        self.calls.as_ref()
    }

    fn signature_at(&self, address: u64) -> Option<&Signature> {
        self.by_address.get(&address)
    }
}
