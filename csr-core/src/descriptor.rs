//! Opaque descriptors handed to sparse linear-algebra backends.
//!
//! Every descriptor carries a process-unique [`DescriptorId`], so a rebuilt
//! handle is always distinguishable from the one it replaced.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Element-type tag of a value buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    F32,
    F64,
    I32,
    U32,
}

impl ValueType {
    pub fn size_bytes(self) -> usize {
        match self {
            ValueType::F64 => 8,
            ValueType::F32 | ValueType::I32 | ValueType::U32 => 4,
        }
    }
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexBase {
    Zero,
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixType {
    General,
    Symmetric,
    Hermitian,
    Triangular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagType {
    NonUnit,
    Unit,
}

/// Shape and encoding of a CSR matrix as seen by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrLayout {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    pub row_offset_type: IndexType,
    pub col_index_type: IndexType,
    pub index_base: IndexBase,
    pub value_type: ValueType,
}

impl CsrLayout {
    /// Zero-based layout with `u32` indices.
    pub fn new(rows: usize, cols: usize, nnz: usize, value_type: ValueType) -> Self {
        Self {
            rows,
            cols,
            nnz,
            row_offset_type: IndexType::U32,
            col_index_type: IndexType::U32,
            index_base: IndexBase::Zero,
            value_type,
        }
    }
}

/// Matrix-type descriptor in the legacy style: matrix kind, index base and
/// diagonal kind, with no reference to buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixDescriptor {
    pub matrix_type: MatrixType,
    pub index_base: IndexBase,
    pub diag_type: DiagType,
}

impl Default for MatrixDescriptor {
    fn default() -> Self {
        Self {
            matrix_type: MatrixType::General,
            index_base: IndexBase::Zero,
            diag_type: DiagType::NonUnit,
        }
    }
}

/// Process-unique handle identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(u64);

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

impl DescriptorId {
    pub fn next() -> Self {
        Self(NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Address and element count of a host buffer at descriptor creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBufferInfo {
    pub(crate) addr: usize,
    pub(crate) len: usize,
}

impl HostBufferInfo {
    pub(crate) fn of<T>(buffer: &[T]) -> Self {
        Self {
            addr: buffer.as_ptr() as usize,
            len: buffer.len(),
        }
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Descriptor of a host-resident CSR matrix.
///
/// Records the three buffers it was built over; a descriptor whose records no
/// longer match the matrix buffers is stale.
#[derive(Debug, PartialEq, Eq)]
pub struct HostCsrDescriptor {
    pub(crate) id: DescriptorId,
    pub(crate) layout: CsrLayout,
    pub(crate) row_offsets: HostBufferInfo,
    pub(crate) col_indices: HostBufferInfo,
    pub(crate) values: HostBufferInfo,
}

impl HostCsrDescriptor {
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn layout(&self) -> &CsrLayout {
        &self.layout
    }

    pub fn row_offsets(&self) -> HostBufferInfo {
        self.row_offsets
    }

    pub fn col_indices(&self) -> HostBufferInfo {
        self.col_indices
    }

    pub fn values(&self) -> HostBufferInfo {
        self.values
    }
}

/// Legacy matrix descriptor of a host-resident matrix.
#[derive(Debug, PartialEq, Eq)]
pub struct HostMatrixDescriptor {
    pub(crate) id: DescriptorId,
    pub(crate) descr: MatrixDescriptor,
}

impl HostMatrixDescriptor {
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn descr(&self) -> &MatrixDescriptor {
        &self.descr
    }
}

// Uniform block read by CSR compute kernels, bound at binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct CsrParams {
    pub(crate) rows: u32,
    pub(crate) cols: u32,
    pub(crate) nnz: u32,
    pub(crate) index_base: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct MatrixDescriptorParams {
    pub(crate) matrix_type: u32,
    pub(crate) index_base: u32,
    pub(crate) diag_type: u32,
    _padding: u32,
}

impl From<&MatrixDescriptor> for MatrixDescriptorParams {
    fn from(descr: &MatrixDescriptor) -> Self {
        Self {
            matrix_type: descr.matrix_type as u32,
            index_base: descr.index_base as u32,
            diag_type: descr.diag_type as u32,
            _padding: 0,
        }
    }
}

/// Descriptor of a wgpu-resident CSR matrix: a bind group exposing
/// `params`, `row_offsets`, `col_indices` and `values` at bindings 0..=3.
#[derive(Debug)]
pub struct GpuCsrDescriptor {
    pub(crate) id: DescriptorId,
    pub(crate) layout: CsrLayout,
    pub(crate) params: wgpu::Buffer,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) bind_group: wgpu::BindGroup,
}

impl GpuCsrDescriptor {
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn layout(&self) -> &CsrLayout {
        &self.layout
    }

    pub fn params_buffer(&self) -> &wgpu::Buffer {
        &self.params
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

impl Drop for GpuCsrDescriptor {
    fn drop(&mut self) {
        log::trace!("Destroying GPU CSR descriptor {:?}", self.id);
        self.params.destroy();
    }
}

/// Legacy matrix descriptor of a wgpu-resident matrix, uploaded as a uniform
/// block.
#[derive(Debug)]
pub struct GpuMatrixDescriptor {
    pub(crate) id: DescriptorId,
    pub(crate) descr: MatrixDescriptor,
    pub(crate) uniform: wgpu::Buffer,
}

impl GpuMatrixDescriptor {
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn descr(&self) -> &MatrixDescriptor {
        &self.descr
    }

    pub fn uniform_buffer(&self) -> &wgpu::Buffer {
        &self.uniform
    }
}

impl Drop for GpuMatrixDescriptor {
    fn drop(&mut self) {
        log::trace!("Destroying GPU matrix descriptor {:?}", self.id);
        self.uniform.destroy();
    }
}
