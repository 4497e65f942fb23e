use std::fmt;
use std::ops::Deref;

use crate::memory;

/// Contiguous f32 storage backing one or more tensors.
///
/// Tensors hold the buffer behind an `Arc`, so detached views share it
/// without copying. Creation and drop are reported to the [`memory`] ledger.
pub struct Buffer {
    data: Vec<f32>,
}

impl Buffer {
    pub fn new(data: Vec<f32>) -> Self {
        memory::record_alloc(Self::bytes_for(data.len()));
        Buffer { data }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the buffer as counted by the memory ledger.
    pub fn size_in_bytes(&self) -> usize {
        Self::bytes_for(self.data.len())
    }

    fn bytes_for(len: usize) -> usize {
        len * std::mem::size_of::<f32>()
    }
}

impl Deref for Buffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        memory::record_free(self.size_in_bytes());
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Feature maps are large; print a prefix only.
        const PREVIEW: usize = 8;
        let shown = &self.data[..self.data.len().min(PREVIEW)];
        f.debug_struct("Buffer")
            .field("len", &self.data.len())
            .field("head", &shown)
            .finish()
    }
}
