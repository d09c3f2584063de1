//! Normalization of packed `u8` 3-vectors.

use weir_core::{ElementKind, KernelError};

use crate::contract::ShapeContract;
use crate::kernel::{declares_kinds, ensure_len, Kernel, KernelContext};

/// Scale each `(x, y, z)` byte triple to unit length and map every
/// component `c` in `[0, 1]` to the byte `c * 100 + 100`.
///
/// A zero vector maps to `(100, 100, 100)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizeVec3U8;

fn encode(c: f64) -> u8 {
    // Float-to-int `as` saturates.
    (c * 100.0 + 100.0) as u8
}

impl Kernel for NormalizeVec3U8 {
    fn name(&self) -> &str {
        "normalize_vec3_u8"
    }

    fn execute(&self, ctx: &mut KernelContext<'_>) -> Result<(), KernelError> {
        if ctx.output_descriptor().kind != ElementKind::U8 {
            return Err(KernelError::failed("normalize_vec3_u8 writes u8 only"));
        }
        let input = ctx.input_bytes(0)?;
        let out = ctx.output_bytes();
        ensure_len("normalize_vec3_u8 output", input.len(), out.len())?;
        if input.len() % 3 != 0 {
            return Err(KernelError::out_of_bounds(format!(
                "normalize_vec3_u8: {} bytes is not a whole number of triples",
                input.len()
            )));
        }
        for (src, dst) in input.chunks_exact(3).zip(out.chunks_exact_mut(3)) {
            let v = [f64::from(src[0]), f64::from(src[1]), f64::from(src[2])];
            let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            let scale = if len > 0.0 { len.recip() } else { 1.0 };
            for (d, c) in dst.iter_mut().zip(v) {
                *d = encode(c * scale);
            }
        }
        Ok(())
    }

    fn accepts(&self, inputs: &[ShapeContract], output: &ShapeContract) -> bool {
        use ElementKind::U8;
        declares_kinds(inputs, output, &[U8], U8)
    }
}
