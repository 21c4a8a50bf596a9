//! Per-basic-block simulation state.

use cryo_ir::Function;

use crate::reaching::ReachingDefinitions;

/// State flowing through one basic block during simulation.
pub struct SimulationContext<'a> {
    definitions: ReachingDefinitions,
    function: &'a Function,
    fixpoint_reached: bool,
}

impl<'a> SimulationContext<'a> {
    pub fn new(function: &'a Function, fixpoint_reached: bool) -> Self {
        Self {
            definitions: ReachingDefinitions::new(),
            function,
            fixpoint_reached,
        }
    }

    /// The reaching definitions at the current simulation point.
    pub fn definitions(&self) -> &ReachingDefinitions {
        &self.definitions
    }

    pub fn definitions_mut(&mut self) -> &mut ReachingDefinitions {
        &mut self.definitions
    }

    pub fn function(&self) -> &'a Function {
        self.function
    }

    /// True during the final pass after the outer iteration stabilized;
    /// hooks may produce their strongest information then.
    pub fn fixpoint_reached(&self) -> bool {
        self.fixpoint_reached
    }
}
