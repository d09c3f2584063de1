//! Symbol table of compiled kernels.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::kernel::Kernel;
use crate::kernels;

/// Kernels addressable by entry symbol.
///
/// Stands in for the generator's compiled output: a manifest entry names
/// a symbol, and the registry resolves it here at load time.
#[derive(Clone, Default)]
pub struct KernelLibrary {
    kernels: IndexMap<String, Arc<dyn Kernel>>,
}

impl KernelLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding every built-in kernel.
    pub fn builtin() -> Self {
        let mut lib = Self::new();
        kernels::register_builtins(&mut lib);
        lib
    }

    /// Register `kernel` under its own name, replacing any previous one.
    pub fn register(&mut self, kernel: impl Kernel) -> &mut Self {
        let kernel: Arc<dyn Kernel> = Arc::new(kernel);
        self.kernels.insert(kernel.name().to_string(), kernel);
        self
    }

    /// Register a shared kernel under `symbol`.
    pub fn register_as(&mut self, symbol: impl Into<String>, kernel: Arc<dyn Kernel>) -> &mut Self {
        self.kernels.insert(symbol.into(), kernel);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kernel: impl Kernel) -> Self {
        self.register(kernel);
        self
    }

    /// Look up a symbol.
    pub fn resolve(&self, symbol: &str) -> Option<Arc<dyn Kernel>> {
        self.kernels.get(symbol).cloned()
    }

    /// Registered symbols in insertion order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(String::as_str)
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl fmt::Debug for KernelLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.symbols()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_library_resolves_known_symbols() {
        let lib = KernelLibrary::builtin();
        for symbol in [
            "negate_f32",
            "negate_f64",
            "add_f32",
            "dot_f32",
            "copy",
            "normalize_vec3_u8",
        ] {
            let kernel = lib.resolve(symbol).unwrap_or_else(|| panic!("missing {symbol}"));
            assert_eq!(kernel.name(), symbol);
        }
        assert!(lib.resolve("fused_attention").is_none());
    }

    #[test]
    fn register_as_aliases_a_kernel() {
        let mut lib = KernelLibrary::builtin();
        let negate = lib.resolve("negate_f32").unwrap();
        lib.register_as("neg", negate);
        assert_eq!(lib.resolve("neg").unwrap().name(), "negate_f32");
    }
}
