use menagerie_abi::InstanceLayout;
use thiserror::Error;

/// Failures reported by the plugin factory. None of them are fatal to the
/// host; the caller decides whether to continue with other modules.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The name did not resolve to a loadable module
    #[error("plugin module `{module}` not found: {reason}")]
    ModuleNotFound { module: String, reason: String },

    /// The module loaded but lacks the entry point a strategy needs
    #[error("plugin module `{module}` does not export `{symbol}`")]
    SymbolNotFound {
        module: String,
        symbol: &'static str,
    },

    /// A caller-supplied buffer cannot hold the module's instance type
    #[error("plugin module `{module}` needs {required} but the buffer offers {available}")]
    LayoutMismatch {
        module: String,
        required: InstanceLayout,
        available: InstanceLayout,
    },

    /// The entry point ran but produced no instance
    #[error("plugin module `{module}` failed to construct an instance")]
    ConstructionFailed { module: String },

    /// Stack-scoped instances only exist inside the constructor call
    #[error("stack-scoped instances of `{module}` cannot leave the constructor; use a scoped visit")]
    ScopedStrategy { module: String },
}

impl FactoryError {
    /// Module the error refers to
    #[must_use]
    pub fn module(&self) -> &str {
        match self {
            Self::ModuleNotFound { module, .. }
            | Self::SymbolNotFound { module, .. }
            | Self::LayoutMismatch { module, .. }
            | Self::ConstructionFailed { module }
            | Self::ScopedStrategy { module } => module,
        }
    }

    /// Whether the failure happened while resolving the module or its
    /// symbols, as opposed to during construction
    #[must_use]
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. } | Self::SymbolNotFound { .. }
        )
    }
}
