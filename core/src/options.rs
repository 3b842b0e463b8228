//! Configuration options for compiling and running garnet programs.

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use garnet_core::CompilerOptions;
///
/// let options = CompilerOptions {
///     interactive: true,
///     ..CompilerOptions::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Compile for an interactive session.
    ///
    /// Every local variable is treated as captured so that it survives
    /// between successive inputs.
    ///
    /// Default: false
    pub interactive: bool,

    /// Name reported in diagnostics and in emitted native source.
    ///
    /// Default: `"main"`
    pub file_name: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            file_name: "main".to_string(),
        }
    }
}

/// Configuration options for program execution.
///
/// # Example
///
/// ```
/// use garnet_core::ExecutionOptions;
///
/// let options = ExecutionOptions {
///     max_depth: 500,
///     max_iterations: Some(10_000),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Maximum call-frame depth (for recursion protection).
    ///
    /// Default: 1000
    pub max_depth: usize,

    /// Maximum number of loop iterations (if Some).
    ///
    /// Set to `None` for unlimited iterations (be careful with untrusted code!).
    ///
    /// Default: None
    pub max_iterations: Option<usize>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            max_iterations: None,
        }
    }
}

/// Defaults for compilation and execution, overridable per call.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Default options for compilation.
    pub default_compiler_options: CompilerOptions,

    /// Default options for execution.
    pub default_execution_options: ExecutionOptions,
}
