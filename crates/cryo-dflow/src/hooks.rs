//! Calling-convention hooks.
//!
//! A calling-convention model plugs into analysis and synthesis through
//! this trait. Hook-owned terms (injected argument and return-value
//! definitions) are pre-allocated in the function's arena before analysis
//! starts; the accessors below hand their ids back to the generator so it
//! can bind signature slots to them.

use cryo_ir::{Function, StmtId, TermId};

use crate::context::SimulationContext;
use crate::dataflow::Dataflow;

/// Hooks invoked by the dataflow analyzer and queried by the code
/// synthesizer. All methods default to doing nothing.
pub trait ConventionHooks {
    /// Runs at the entry block on every fixpoint iteration; lets the model
    /// inject argument definitions into the flowing context.
    fn simulate_enter(
        &mut self,
        function: &Function,
        dataflow: &mut Dataflow,
        context: &mut SimulationContext<'_>,
    ) {
        let _ = (function, dataflow, context);
    }

    /// Runs after a call statement's target was simulated.
    fn simulate_call(
        &mut self,
        call: StmtId,
        function: &Function,
        dataflow: &mut Dataflow,
        context: &mut SimulationContext<'_>,
    ) {
        let _ = (call, function, dataflow, context);
    }

    /// Runs for every return statement.
    fn simulate_return(
        &mut self,
        ret: StmtId,
        function: &Function,
        dataflow: &mut Dataflow,
        context: &mut SimulationContext<'_>,
    ) {
        let _ = (ret, function, dataflow, context);
    }

    /// Records that a call's target resolved to a concrete address.
    fn called_address(&mut self, call: StmtId, address: u64) {
        let _ = (call, address);
    }

    /// The term bound to the n-th signature argument at function entry.
    fn entry_argument_term(&self, index: usize) -> Option<TermId> {
        let _ = index;
        None
    }

    /// The term bound to the n-th signature argument of a call.
    fn call_argument_term(&self, call: StmtId, index: usize) -> Option<TermId> {
        let _ = (call, index);
        None
    }

    /// The term receiving a call's return value.
    fn call_return_term(&self, call: StmtId) -> Option<TermId> {
        let _ = call;
        None
    }

    /// The term carrying the function's return value at a return statement.
    fn return_value_term(&self, ret: StmtId) -> Option<TermId> {
        let _ = ret;
        None
    }
}
