use crate::traits::Scalar;
use std::fmt::Debug;
use std::marker::PhantomData;

/// A growable, typed buffer owned by a [`crate::device::Device`].
pub trait DeviceBuffer: Debug {
    /// Number of elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Scalar> DeviceBuffer for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Typed wrapper around a `wgpu::Buffer`.
///
/// The allocation is never smaller than `wgpu::COPY_BUFFER_ALIGNMENT`, so an
/// empty buffer can still be bound and copied.
#[derive(Debug)]
pub struct GpuBuffer<T: Scalar> {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) len: usize,
    pub(crate) label: String,
    _marker: PhantomData<T>,
}

impl<T: Scalar> GpuBuffer<T> {
    pub(crate) fn new_internal(buffer: wgpu::Buffer, len: usize, label: String) -> Self {
        Self {
            buffer,
            len,
            label,
            _marker: PhantomData,
        }
    }

    /// Bytes backing `len` elements, padded to the copy alignment.
    pub(crate) fn allocation_size(len: usize) -> u64 {
        let bytes = (len * std::mem::size_of::<T>()) as u64;
        wgpu::util::align_to(bytes.max(wgpu::COPY_BUFFER_ALIGNMENT), wgpu::COPY_BUFFER_ALIGNMENT)
    }

    pub(crate) fn usage() -> wgpu::BufferUsages {
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
    }

    /// Use with caution, prefer the `DeviceCsrMatrix` API.
    pub fn inner(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Size of the logical contents in bytes.
    pub fn size_bytes(&self) -> u64 {
        (self.len * std::mem::size_of::<T>()) as u64
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

impl<T: Scalar> DeviceBuffer for GpuBuffer<T> {
    fn len(&self) -> usize {
        self.len
    }
}
