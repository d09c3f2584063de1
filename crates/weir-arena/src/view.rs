//! Disjoint input/output views handed to a kernel.

use smallvec::SmallVec;
use weir_core::MAX_INPUTS;

/// Shared views of every input slot plus one exclusive view of the output.
///
/// Produced by [`Arena::split_io`](crate::Arena::split_io), which has
/// already checked bounds and that the output overlaps no input.
#[derive(Debug)]
pub struct IoViews<'a> {
    /// Input bytes, in command order.
    pub inputs: SmallVec<[&'a [u8]; MAX_INPUTS]>,
    /// Output bytes.
    pub output: &'a mut [u8],
}

impl<'a> IoViews<'a> {
    /// Typed view of input `index`. `None` if out of range or not a whole,
    /// aligned run of `T`.
    pub fn input_as<T: bytemuck::Pod>(&self, index: usize) -> Option<&'a [T]> {
        let bytes: &'a [u8] = *self.inputs.get(index)?;
        bytemuck::try_cast_slice(bytes).ok()
    }

    /// Typed view of the output.
    pub fn output_as<T: bytemuck::Pod>(&mut self) -> Option<&mut [T]> {
        bytemuck::try_cast_slice_mut(&mut *self.output).ok()
    }
}
