//! Built-in kernels.
//!
//! These stand in for generator output so the bridge can be exercised end
//! to end. Each is addressed by the entry symbol returned from its
//! [`Kernel::name`](crate::Kernel::name).
//!
//! | Symbol | Contract |
//! |---|---|
//! | `negate_f32` / `negate_f64` / `negate_i32` / `negate_i64` | `[..] -> same` |
//! | `copy` | any kind, same shape |
//! | `add_f32` | `[n] x [n] -> [n]` |
//! | `saturating_add_u8` | `u8[n] x u8[n] -> u8[n]` |
//! | `dot_f32` | `[n] x [n] -> [1]` |
//! | `dot_u8_i32` | `u8[n] x u8[n] -> i32[1]` |
//! | `normalize_vec3_u8` | `u8[n, 3] -> u8[n, 3]` |

pub mod elementwise;
pub mod negate;
pub mod normalize;
pub mod reduce;

pub use elementwise::{AddF32, CopySlot, SaturatingAddU8};
pub use negate::Negate;
pub use normalize::NormalizeVec3U8;
pub use reduce::{DotF32, DotU8I32};

use weir_core::ElementKind;

use crate::library::KernelLibrary;

/// Add every built-in kernel to `lib`.
pub fn register_builtins(lib: &mut KernelLibrary) {
    for kind in ElementKind::ALL {
        if let Some(negate) = Negate::for_kind(kind) {
            lib.register(negate);
        }
    }
    lib.register(CopySlot)
        .register(AddF32)
        .register(SaturatingAddU8)
        .register(DotF32)
        .register(DotU8I32)
        .register(NormalizeVec3U8);
}
