//! Reusable kernel test fixtures.
//!
//! - [`RecordingKernel`]: counts invocations and fills its output.
//! - [`FailingKernel`]: fails deterministically after N calls.
//! - [`OverrunKernel`]: reports a bounds violation, which halts a session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weir_core::KernelError;
use weir_registry::{Kernel, KernelContext};

/// Counts calls and fills the output with a marker byte.
///
/// Clones share the counter, so a test can keep one clone and register
/// the other.
#[derive(Clone)]
pub struct RecordingKernel {
    pub name: String,
    pub marker: u8,
    calls: Arc<AtomicUsize>,
}

impl RecordingKernel {
    pub fn new(name: impl Into<String>, marker: u8) -> Self {
        Self {
            name: name.into(),
            marker,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times `execute` has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Kernel for RecordingKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.output_bytes().fill(self.marker);
        Ok(())
    }
}

/// Succeeds `succeed_count` times, then fails with `ExecutionFailed`.
pub struct FailingKernel {
    pub name: String,
    succeed_count: usize,
    calls: AtomicUsize,
}

impl FailingKernel {
    pub fn new(name: impl Into<String>, succeed_count: usize) -> Self {
        Self {
            name: name.into(),
            succeed_count,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Kernel for FailingKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, _ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.succeed_count {
            Err(KernelError::failed(format!(
                "failed on call {n} (succeed_count={})",
                self.succeed_count
            )))
        } else {
            Ok(())
        }
    }
}

/// Claims to have reached past its views. Always fatal.
pub struct OverrunKernel;

impl Kernel for OverrunKernel {
    fn name(&self) -> &str {
        "overrun"
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        let len = ctx.output_bytes().len();
        Err(KernelError::out_of_bounds(format!(
            "write at byte {len} of a {len}-byte output"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_kernel_clones_share_the_counter() {
        let a = RecordingKernel::new("rec", 0xAB);
        let b = a.clone();
        b.calls.fetch_add(2, Ordering::SeqCst);
        assert_eq!(a.calls(), 2);
        assert_eq!(a.name(), "rec");
    }

    #[test]
    fn overrun_kernel_name() {
        assert_eq!(OverrunKernel.name(), "overrun");
    }
}
