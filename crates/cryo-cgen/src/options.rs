//! Generator configuration.

/// Toggles of the code synthesizer. Everything defaults to off.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratorOptions {
    /// Replace a read whose reaching value is concrete by that constant.
    pub prefer_constants_to_expressions: bool,
    /// Render pointer-to-byte constants addressing NUL-terminated ASCII in
    /// an allocated section as string literals.
    pub prefer_cstrings_to_constants: bool,
    /// Render pointer constants with a sized pointee as `&global`.
    pub prefer_global_variables_to_constants: bool,
    /// Name locals after the register backing them.
    pub register_variable_names: bool,
    /// Inline single-assignment intermediate variables at their use sites.
    /// Off by default; the heuristic has miscompiled real binaries.
    pub inline_intermediate_variables: bool,
}

impl GeneratorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefer_constants_to_expressions(mut self, enabled: bool) -> Self {
        self.prefer_constants_to_expressions = enabled;
        self
    }

    pub fn with_prefer_cstrings_to_constants(mut self, enabled: bool) -> Self {
        self.prefer_cstrings_to_constants = enabled;
        self
    }

    pub fn with_prefer_global_variables_to_constants(mut self, enabled: bool) -> Self {
        self.prefer_global_variables_to_constants = enabled;
        self
    }

    pub fn with_register_variable_names(mut self, enabled: bool) -> Self {
        self.register_variable_names = enabled;
        self
    }

    pub fn with_inline_intermediate_variables(mut self, enabled: bool) -> Self {
        self.inline_intermediate_variables = enabled;
        self
    }
}
