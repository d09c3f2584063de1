//! The [`Kernel`] trait and its execution context.

use weir_arena::IoViews;
use weir_core::{ElementKind, KernelError, SlotDescriptor};

use crate::contract::ShapeContract;

/// A compiled routine invoked by op id.
///
/// # Contract
///
/// - `execute()` reads only the input views and writes only the output
///   view in `ctx`. The views are already bounds-checked and the output
///   overlaps no input.
/// - Slots in `ctx` have passed the operation's shape contract. A kernel
///   that still finds its views inconsistent must return
///   [`KernelError::BoundsViolation`]; the dispatcher treats that as a
///   validation gap and halts.
/// - `&self`: kernels are stateless and shared across the session.
///
/// # Examples
///
/// ```
/// use weir_core::KernelError;
/// use weir_registry::{Kernel, KernelContext};
///
/// struct Zero;
///
/// impl Kernel for Zero {
///     fn name(&self) -> &str { "zero" }
///
///     fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
///         ctx.output_bytes().fill(0);
///         Ok(())
///     }
/// }
///
/// assert_eq!(Zero.name(), "zero");
/// ```
pub trait Kernel: Send + Sync + 'static {
    /// Entry symbol, used for logging and library lookup.
    fn name(&self) -> &str;

    /// Run against the views in `ctx`.
    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError>;

    /// Whether this kernel can serve an operation declared with these
    /// contracts. Checked once when the operation is registered.
    ///
    /// The default accepts any declaration.
    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        let _ = (inputs, output);
        true
    }
}

/// Borrowed arena views for one kernel invocation.
///
/// Input accessors return slices with the context's full lifetime, so a
/// kernel can hold typed inputs while it writes the output.
pub struct KernelContext<'a> {
    inputs: &'a [SlotDescriptor],
    output: &'a SlotDescriptor,
    views: IoViews<'a>,
}

impl<'a> KernelContext<'a> {
    /// Construct a context from validated descriptors and their views.
    ///
    /// Typically called by the dispatcher; tests build one from
    /// [`Arena::split_io`](weir_arena::Arena::split_io).
    pub fn new(
        inputs: &'a [SlotDescriptor],
        output: &'a SlotDescriptor,
        views: IoViews<'a>,
    ) -> Self {
        Self {
            inputs,
            output,
            views,
        }
    }

    /// Number of input slots.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Descriptor of input `index`.
    pub fn input_descriptor(&self, index: usize) -> Option<&'a SlotDescriptor> {
        self.inputs.get(index)
    }

    /// Descriptor of the output.
    pub fn output_descriptor(&self) -> &'a SlotDescriptor {
        self.output
    }

    /// Raw bytes of input `index`.
    pub fn input_bytes(&self, index: usize) -> Result<&'a [u8], KernelError> {
        self.views
            .inputs
            .get(index)
            .copied()
            .ok_or_else(|| KernelError::out_of_bounds(format!("no input {index}")))
    }

    /// Input `index` as a slice of `T`.
    pub fn input<T: bytemuck::Pod>(&self, index: usize) -> Result<&'a [T], KernelError> {
        let bytes = self.input_bytes(index)?;
        bytemuck::try_cast_slice(bytes).map_err(|e| {
            KernelError::out_of_bounds(format!(
                "input {index} is not a slice of the kernel type: {e}"
            ))
        })
    }

    /// Raw bytes of the output.
    pub fn output_bytes(&mut self) -> &mut [u8] {
        &mut *self.views.output
    }

    /// The output as a mutable slice of `T`.
    pub fn output<T: bytemuck::Pod>(&mut self) -> Result<&mut [T], KernelError> {
        bytemuck::try_cast_slice_mut(&mut *self.views.output).map_err(|e| {
            KernelError::out_of_bounds(format!("output is not a slice of the kernel type: {e}"))
        })
    }
}

/// Whether the contracts declare exactly `want_inputs` (in order) and
/// `want_output` as element kinds.
pub fn declares_kinds(
    inputs: &[ShapeContract],
    output: &ShapeContract,
    want_inputs: &[ElementKind],
    want_output: ElementKind,
) -> bool {
    output.kind == want_output
        && inputs.len() == want_inputs.len()
        && inputs.iter().zip(want_inputs).all(|(c, &k)| c.kind == k)
}

/// Fail with a bounds violation unless `actual == expected`.
pub fn ensure_len(what: &str, expected: usize, actual: usize) -> Result<(), KernelError> {
    if expected != actual {
        return Err(KernelError::out_of_bounds(format!(
            "{what}: expected {expected} elements, found {actual}"
        )));
    }
    Ok(())
}
