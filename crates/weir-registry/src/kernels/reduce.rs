//! Reductions producing a single element.

use weir_core::{ElementKind, KernelError};

use crate::contract::ShapeContract;
use crate::kernel::{declares_kinds, ensure_len, Kernel, KernelContext};

/// `out[0] = sum(a[i] * b[i])` over `f32`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DotF32;

impl Kernel for DotF32 {
    fn name(&self) -> &str {
        "dot_f32"
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        let a = ctx.input::<f32>(0)?;
        let b = ctx.input::<f32>(1)?;
        let out = ctx.output::<f32>()?;
        ensure_len("dot_f32 rhs", a.len(), b.len())?;
        ensure_len("dot_f32 output", 1, out.len())?;
        out[0] = a.iter().zip(b).map(|(x, y)| x * y).sum();
        Ok(())
    }

    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        use ElementKind::F32;
        declares_kinds(inputs, output, &[F32, F32], F32)
    }
}

/// `out[0] = sum(a[i] * b[i])` over `u8` inputs with a wrapping `i32`
/// accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DotU8I32;

impl Kernel for DotU8I32 {
    fn name(&self) -> &str {
        "dot_u8_i32"
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        let a = ctx.input_bytes(0)?;
        let b = ctx.input_bytes(1)?;
        let out = ctx.output::<i32>()?;
        ensure_len("dot_u8_i32 rhs", a.len(), b.len())?;
        ensure_len("dot_u8_i32 output", 1, out.len())?;
        out[0] = a
            .iter()
            .zip(b)
            .fold(0i32, |acc, (&x, &y)| acc.wrapping_add(i32::from(x) * i32::from(y)));
        Ok(())
    }

    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        use ElementKind::{I32, U8};
        declares_kinds(inputs, output, &[U8, U8], I32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::testing::run;

    #[test]
    fn dot_f32() {
        let out: Vec<f32> = run(
            &DotF32,
            &[
                (&[1.0f32, 2.0, 3.0][..], ElementKind::F32, &[3]),
                (&[4.0f32, 5.0, 6.0][..], ElementKind::F32, &[3]),
            ],
            (ElementKind::F32, &[1]),
        )
        .unwrap();
        assert_eq!(out, vec![32.0]);
    }

    #[test]
    fn dot_u8_widens_before_multiplying() {
        let out: Vec<i32> = run(
            &DotU8I32,
            &[
                (&[255u8, 255, 2][..], ElementKind::U8, &[3]),
                (&[255u8, 1, 3][..], ElementKind::U8, &[3]),
            ],
            (ElementKind::I32, &[1]),
        )
        .unwrap();
        assert_eq!(out, vec![255 * 255 + 255 + 6]);
    }

    #[test]
    fn dot_u8_accumulator_wraps() {
        let n = 40_000u32;
        let ones = vec![255u8; n as usize];
        let out: Vec<i32> = run(
            &DotU8I32,
            &[
                (&ones[..], ElementKind::U8, &[n]),
                (&ones[..], ElementKind::U8, &[n]),
            ],
            (ElementKind::I32, &[1]),
        )
        .unwrap_or_else(|e| panic!("{e}"));
        let expected = (0..n).fold(0i32, |acc, _| acc.wrapping_add(255 * 255));
        assert_eq!(out, vec![expected]);
    }
}
