//! Element-wise negation.

use weir_core::{ElementKind, KernelError};

use crate::contract::ShapeContract;
use crate::kernel::{declares_kinds, ensure_len, Kernel, KernelContext};

/// `out[i] = -in[i]` for one signed element kind.
///
/// Floats flip the sign bit; integers use wrapping negation, so
/// `negate(MIN) == MIN`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Negate {
    kind: ElementKind,
}

impl Negate {
    /// The negate kernel for `kind`, or `None` for unsigned kinds.
    pub fn for_kind(kind: ElementKind) -> Option<Self> {
        match kind {
            ElementKind::U8 => None,
            _ => Some(Self { kind }),
        }
    }

    /// Element kind this kernel operates on.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }
}

fn apply<T: bytemuck::Pod>(
    ctx: &mut KernelContext<'_>,
    op: impl Fn(T) -> T,
) -> Result<(), KernelError> {
    let input = ctx.input::<T>(0)?;
    let out = ctx.output::<T>()?;
    ensure_len("negate", input.len(), out.len())?;
    for (o, &x) in out.iter_mut().zip(input) {
        *o = op(x);
    }
    Ok(())
}

impl Kernel for Negate {
    fn name(&self) -> &str {
        match self.kind {
            ElementKind::F32 => "negate_f32",
            ElementKind::F64 => "negate_f64",
            ElementKind::I32 => "negate_i32",
            ElementKind::I64 => "negate_i64",
            ElementKind::U8 => "negate_u8",
        }
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        match self.kind {
            ElementKind::F32 => apply::<f32>(ctx, |x| -x),
            ElementKind::F64 => apply::<f64>(ctx, |x| -x),
            ElementKind::I32 => apply::<i32>(ctx, i32::wrapping_neg),
            ElementKind::I64 => apply::<i64>(ctx, i64::wrapping_neg),
            ElementKind::U8 => Err(KernelError::failed("u8 has no negation")),
        }
    }

    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        declares_kinds(inputs, output, &[self.kind], self.kind)
    }
}
