//! Element-wise kernels over one or two inputs.

use weir_core::{ElementKind, KernelError};

use crate::contract::ShapeContract;
use crate::kernel::{declares_kinds, ensure_len, Kernel, KernelContext};

/// Byte copy of input 0 into the output. Any element kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopySlot;

impl Kernel for CopySlot {
    fn name(&self) -> &str {
        "copy"
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        let input = ctx.input_bytes(0)?;
        let out = ctx.output_bytes();
        ensure_len("copy", input.len(), out.len())?;
        out.copy_from_slice(input);
        Ok(())
    }

    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        matches!(inputs, [input] if input.kind == output.kind)
    }
}

/// `out[i] = a[i] + b[i]` over `f32`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddF32;

impl Kernel for AddF32 {
    fn name(&self) -> &str {
        "add_f32"
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        let a = ctx.input::<f32>(0)?;
        let b = ctx.input::<f32>(1)?;
        let out = ctx.output::<f32>()?;
        ensure_len("add_f32 rhs", a.len(), b.len())?;
        ensure_len("add_f32 output", a.len(), out.len())?;
        for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
            *o = x + y;
        }
        Ok(())
    }

    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        use ElementKind::F32;
        declares_kinds(inputs, output, &[F32, F32], F32)
    }
}

/// `out[i] = a[i].saturating_add(b[i])` over `u8`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaturatingAddU8;

impl Kernel for SaturatingAddU8 {
    fn name(&self) -> &str {
        "saturating_add_u8"
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        if ctx.output_descriptor().kind != ElementKind::U8 {
            return Err(KernelError::failed("saturating_add_u8 writes u8 only"));
        }
        let a = ctx.input_bytes(0)?;
        let b = ctx.input_bytes(1)?;
        let out = ctx.output_bytes();
        ensure_len("saturating_add_u8 rhs", a.len(), b.len())?;
        ensure_len("saturating_add_u8 output", a.len(), out.len())?;
        for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
            *o = x.saturating_add(y);
        }
        Ok(())
    }

    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        use ElementKind::U8;
        declares_kinds(inputs, output, &[U8, U8], U8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::testing::run;

    #[test]
    fn declared_kinds_are_checked() {
        let u8s = ShapeContract::fixed(ElementKind::U8, &[4]);
        let i64s = ShapeContract::fixed(ElementKind::I64, &[4]);
        assert!(CopySlot.accepts(&[i64s.clone()], &i64s));
        assert!(!CopySlot.accepts(&[u8s.clone()], &i64s));
        assert!(!CopySlot.accepts(&[], &i64s));
        assert!(SaturatingAddU8.accepts(&[u8s.clone(), u8s.clone()], &u8s));
        assert!(!SaturatingAddU8.accepts(&[u8s.clone()], &u8s));
        assert!(!AddF32.accepts(&[u8s.clone(), u8s.clone()], &u8s));
    }

    #[test]
    fn copy_duplicates_bytes() {
        let out: Vec<i64> = run(
            &CopySlot,
            &[(&[7i64, -8, 9][..], ElementKind::I64, &[3])],
            (ElementKind::I64, &[3]),
        )
        .unwrap();
        assert_eq!(out, vec![7, -8, 9]);
    }

    #[test]
    fn add_f32_sums_pairwise() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [0.5f32, -2.0, 10.0];
        let out: Vec<f32> = run(
            &AddF32,
            &[(&a[..], ElementKind::F32, &[3]), (&b[..], ElementKind::F32, &[3])],
            (ElementKind::F32, &[3]),
        )
        .unwrap();
        assert_eq!(out, vec![1.5, 0.0, 13.0]);
    }

    #[test]
    fn add_f32_rejects_ragged_inputs() {
        let err = run::<f32, f32>(
            &AddF32,
            &[
                (&[1.0f32; 3][..], ElementKind::F32, &[3]),
                (&[1.0f32; 2][..], ElementKind::F32, &[2]),
            ],
            (ElementKind::F32, &[3]),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn saturating_add_clamps_at_255() {
        let out: Vec<u8> = run(
            &SaturatingAddU8,
            &[
                (&[10u8, 200, 255][..], ElementKind::U8, &[3]),
                (&[5u8, 100, 1][..], ElementKind::U8, &[3]),
            ],
            (ElementKind::U8, &[3]),
        )
        .unwrap();
        assert_eq!(out, vec![15, 255, 255]);
    }
}
