use crate::buffer::{DeviceBuffer, GpuBuffer};
use crate::config::GpuDeviceConfig;
use crate::context::GpuContext;
use crate::descriptor::{
    CsrLayout, CsrParams, DescriptorId, GpuCsrDescriptor, GpuMatrixDescriptor, HostBufferInfo,
    HostCsrDescriptor, HostMatrixDescriptor, MatrixDescriptor, MatrixDescriptorParams, ValueType,
};
use crate::error::CsrCoreError;
use crate::traits::Scalar;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

/// Borrowed buffers and layout from which a backend builds a descriptor.
pub struct CsrParts<'a, D: Device, T: Scalar> {
    pub layout: CsrLayout,
    pub row_offsets: &'a D::Buffer<u32>,
    pub col_indices: &'a D::Buffer<u32>,
    pub values: &'a D::Buffer<T>,
}

/// Execution device owning CSR buffers and building descriptors over them.
///
/// Descriptors are released by dropping them.
pub trait Device: Clone + Debug {
    type Buffer<T: Scalar>: DeviceBuffer;
    type Descriptor: Debug;
    type LegacyDescriptor: Debug;

    /// Allocates a zero-filled buffer of `len` elements.
    fn alloc<T: Scalar>(&self, label: &str, len: usize) -> Self::Buffer<T>;

    /// Resizes `buffer`, keeping the leading `min(old, new)` elements and
    /// zero-filling the rest. May reallocate.
    fn resize<T: Scalar>(&self, buffer: &mut Self::Buffer<T>, len: usize);

    /// Allocates a new buffer holding a copy of `buffer`.
    fn duplicate<T: Scalar>(&self, buffer: &Self::Buffer<T>) -> Self::Buffer<T>;

    /// Replaces the contents of `buffer` with `data`, resizing as needed.
    fn upload<T: Scalar>(&self, buffer: &mut Self::Buffer<T>, data: &[T]) -> Result<(), CsrCoreError>;

    /// Copies the contents of `buffer` back to the host.
    fn download<T: Scalar>(
        &self,
        buffer: &Self::Buffer<T>,
    ) -> impl Future<Output = Result<Vec<T>, CsrCoreError>>;

    fn create_descriptor<T: Scalar>(
        &self,
        parts: CsrParts<'_, Self, T>,
    ) -> Result<Self::Descriptor, CsrCoreError>;

    fn create_legacy_descriptor(
        &self,
        descr: &MatrixDescriptor,
    ) -> Result<Self::LegacyDescriptor, CsrCoreError>;
}

/// Host execution device; buffers are plain vectors.
#[derive(Debug, Clone, Default)]
pub struct CpuDevice {}

impl CpuDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Device for CpuDevice {
    type Buffer<T: Scalar> = Vec<T>;
    type Descriptor = HostCsrDescriptor;
    type LegacyDescriptor = HostMatrixDescriptor;

    fn alloc<T: Scalar>(&self, _label: &str, len: usize) -> Self::Buffer<T> {
        vec![T::zero(); len]
    }

    fn resize<T: Scalar>(&self, buffer: &mut Self::Buffer<T>, len: usize) {
        buffer.resize(len, T::zero());
    }

    fn duplicate<T: Scalar>(&self, buffer: &Self::Buffer<T>) -> Self::Buffer<T> {
        buffer.clone()
    }

    fn upload<T: Scalar>(&self, buffer: &mut Self::Buffer<T>, data: &[T]) -> Result<(), CsrCoreError> {
        buffer.clear();
        buffer.extend_from_slice(data);
        Ok(())
    }

    fn download<T: Scalar>(
        &self,
        buffer: &Self::Buffer<T>,
    ) -> impl Future<Output = Result<Vec<T>, CsrCoreError>> {
        std::future::ready(Ok(buffer.clone()))
    }

    fn create_descriptor<T: Scalar>(
        &self,
        parts: CsrParts<'_, Self, T>,
    ) -> Result<Self::Descriptor, CsrCoreError> {
        let id = DescriptorId::next();
        log::debug!("Creating host CSR descriptor {:?} for {:?}", id, parts.layout);
        Ok(HostCsrDescriptor {
            id,
            layout: parts.layout,
            row_offsets: HostBufferInfo::of(parts.row_offsets),
            col_indices: HostBufferInfo::of(parts.col_indices),
            values: HostBufferInfo::of(parts.values),
        })
    }

    fn create_legacy_descriptor(
        &self,
        descr: &MatrixDescriptor,
    ) -> Result<Self::LegacyDescriptor, CsrCoreError> {
        Ok(HostMatrixDescriptor {
            id: DescriptorId::next(),
            descr: *descr,
        })
    }
}

/// GPU execution device, holding the WGPU context.
#[derive(Debug, Clone)]
pub struct GpuDevice {
    pub(crate) context: Arc<GpuContext>,
}

impl GpuDevice {
    /// Creates a new GpuDevice with the default configuration.
    pub async fn new() -> Result<Self, CsrCoreError> {
        Self::with_config(&GpuDeviceConfig::default()).await
    }

    pub async fn with_config(config: &GpuDeviceConfig) -> Result<Self, CsrCoreError> {
        let context = GpuContext::new(config).await?;
        log::info!("GpuDevice created successfully");
        Ok(Self {
            context: Arc::new(context),
        })
    }

    /// Blocking variant of [`GpuDevice::new`] for native callers.
    #[cfg(feature = "native")]
    pub fn new_blocking() -> Result<Self, CsrCoreError> {
        pollster::block_on(Self::new())
    }

    pub fn supports_f64(&self) -> bool {
        self.context.supports_f64()
    }

    /// Returns the current GPU transfer statistics.
    pub fn get_transfer_stats(&self) -> TransferStats {
        let (bytes_to_gpu, bytes_from_gpu) = self.context.get_transfer_stats();
        TransferStats {
            bytes_to_gpu,
            bytes_from_gpu,
        }
    }

    /// Resets the GPU transfer statistics counters to zero.
    pub fn reset_transfer_stats(&self) {
        self.context.reset_transfer_stats();
    }

    fn check_binding_size(&self, label: &str, size: u64) -> Result<(), CsrCoreError> {
        let limit = self.context.max_storage_binding_size();
        if size > limit {
            return Err(CsrCoreError::DescriptorError(format!(
                "{} buffer of {} bytes exceeds the storage binding limit of {} bytes",
                label, size, limit
            )));
        }
        Ok(())
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Device for GpuDevice {
    type Buffer<T: Scalar> = GpuBuffer<T>;
    type Descriptor = GpuCsrDescriptor;
    type LegacyDescriptor = GpuMatrixDescriptor;

    fn alloc<T: Scalar>(&self, label: &str, len: usize) -> Self::Buffer<T> {
        let buffer = self.context.create_empty_buffer(
            label,
            GpuBuffer::<T>::allocation_size(len),
            GpuBuffer::<T>::usage(),
        );
        GpuBuffer::new_internal(buffer, len, label.to_string())
    }

    fn resize<T: Scalar>(&self, buffer: &mut Self::Buffer<T>, len: usize) {
        if buffer.len == len {
            return;
        }
        let replacement = self.context.create_empty_buffer(
            &buffer.label,
            GpuBuffer::<T>::allocation_size(len),
            GpuBuffer::<T>::usage(),
        );
        let kept = (buffer.len.min(len) * std::mem::size_of::<T>()) as u64;
        self.context.copy_buffer(&buffer.buffer, &replacement, kept);
        log::debug!(
            "Resized GPU buffer '{}' from {} to {} elements",
            buffer.label,
            buffer.len,
            len
        );
        buffer.buffer = replacement;
        buffer.len = len;
    }

    fn duplicate<T: Scalar>(&self, buffer: &Self::Buffer<T>) -> Self::Buffer<T> {
        let copy = self.alloc::<T>(&buffer.label, buffer.len);
        self.context
            .copy_buffer(&buffer.buffer, &copy.buffer, buffer.size_bytes());
        copy
    }

    fn upload<T: Scalar>(&self, buffer: &mut Self::Buffer<T>, data: &[T]) -> Result<(), CsrCoreError> {
        self.resize(buffer, data.len());
        self.context.write_buffer(&buffer.buffer, data)
    }

    fn download<T: Scalar>(
        &self,
        buffer: &Self::Buffer<T>,
    ) -> impl Future<Output = Result<Vec<T>, CsrCoreError>> {
        let context = Arc::clone(&self.context);
        async move { context.read_buffer_to_cpu(&buffer.buffer, buffer.len).await }
    }

    fn create_descriptor<T: Scalar>(
        &self,
        parts: CsrParts<'_, Self, T>,
    ) -> Result<Self::Descriptor, CsrCoreError> {
        let layout = parts.layout;
        if layout.value_type == ValueType::F64 && !self.context.supports_f64() {
            return Err(CsrCoreError::UnsupportedOperation(
                "f64 values require the SHADER_F64 device feature".to_string(),
            ));
        }
        let to_u32 = |name: &str, v: usize| {
            u32::try_from(v).map_err(|_| {
                CsrCoreError::DescriptorError(format!("{} ({}) does not fit in u32", name, v))
            })
        };
        let params = CsrParams {
            rows: to_u32("rows", layout.rows)?,
            cols: to_u32("cols", layout.cols)?,
            nnz: to_u32("nnz", layout.nnz)?,
            index_base: layout.index_base as u32,
        };
        self.check_binding_size("row offsets", parts.row_offsets.buffer.size())?;
        self.check_binding_size("column indices", parts.col_indices.buffer.size())?;
        self.check_binding_size("values", parts.values.buffer.size())?;

        let id = DescriptorId::next();
        log::debug!("Creating GPU CSR descriptor {:?} for {:?}", id, layout);

        let params_buffer = self.context.create_gpu_buffer_with_data(
            "csr descriptor params",
            bytemuck::bytes_of(&params),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );

        let device = &self.context.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CSR Descriptor Bind Group Layout"),
            entries: &[
                // params
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<CsrParams>() as u64
                        ),
                    },
                    count: None,
                },
                storage_entry(1), // row_offsets (u32)
                storage_entry(2), // col_indices (u32)
                storage_entry(3), // values
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CSR Descriptor Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: parts.row_offsets.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: parts.col_indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: parts.values.as_entire_binding(),
                },
            ],
        });

        Ok(GpuCsrDescriptor {
            id,
            layout,
            params: params_buffer,
            bind_group_layout,
            bind_group,
        })
    }

    fn create_legacy_descriptor(
        &self,
        descr: &MatrixDescriptor,
    ) -> Result<Self::LegacyDescriptor, CsrCoreError> {
        let params = MatrixDescriptorParams::from(descr);
        let uniform = self.context.create_gpu_buffer_with_data(
            "csr legacy matrix descriptor",
            bytemuck::bytes_of(&params),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        Ok(GpuMatrixDescriptor {
            id: DescriptorId::next(),
            descr: *descr,
            uniform,
        })
    }
}

pub struct TransferStats {
    pub bytes_to_gpu: u64,
    pub bytes_from_gpu: u64,
}
