use crate::config::GpuDeviceConfig;
use crate::error::CsrCoreError;
use bytemuck::Pod;
use cfg_if::cfg_if;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use wgpu::{util::DeviceExt, PollType};

/// Wrapper for WGPU device and queue, including transfer counters.
/// Internal to the crate; `GpuDevice` is the public entry point.
#[derive(Debug, Clone)]
pub(crate) struct GpuContext {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
    /// Tracks bytes transferred from CPU to GPU via instrumented methods.
    pub(crate) bytes_to_gpu: Arc<AtomicU64>,
    /// Tracks bytes transferred from GPU to CPU via instrumented methods.
    pub(crate) bytes_from_gpu: Arc<AtomicU64>,
}

impl GpuContext {
    /// Initializes the WGPU context asynchronously.
    pub(crate) async fn new(config: &GpuDeviceConfig) -> Result<Self, CsrCoreError> {
        cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                log::info!("Initializing WASM WGPU context");
                let backends = wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL;
            } else {
                log::info!("Initializing native WGPU context");
                let backends = wgpu::Backends::PRIMARY;
            }
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        log::debug!("Requesting adapter");
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None, // No surface needed for compute
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| CsrCoreError::WgpuInitError("No suitable adapter found".to_string()))?;

        log::info!("Selected adapter: {:?}", adapter.get_info());

        let adapter_features = adapter.features();
        let mut required_features = wgpu::Features::empty();
        if adapter_features.contains(wgpu::Features::SHADER_F64) {
            required_features |= wgpu::Features::SHADER_F64;
        } else if config.require_f64 {
            return Err(CsrCoreError::WgpuInitError(
                "Adapter does not support SHADER_F64".to_string(),
            ));
        } else {
            log::warn!("SHADER_F64 not available; f64 matrices cannot be described on this device");
        }

        cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let base_limits = wgpu::Limits::downlevel_webgl2_defaults();
            } else {
                let base_limits = wgpu::Limits::default();
            }
        }
        let mut limits = base_limits.using_resolution(adapter.limits());
        limits.max_storage_buffers_per_shader_stage = limits
            .max_storage_buffers_per_shader_stage
            .max(config.min_storage_buffers);
        log::debug!("Adjusted limits: {:?}", limits);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(config.label.as_str()),
                trace: wgpu::Trace::Off,
                memory_hints: wgpu::MemoryHints::Performance,
                required_features,
                required_limits: limits,
            })
            .await
            .map_err(|e| CsrCoreError::WgpuInitError(format!("Failed to request device: {}", e)))?;

        log::info!("Device features: {:?}", device.features());

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            bytes_to_gpu: Arc::new(AtomicU64::new(0)),
            bytes_from_gpu: Arc::new(AtomicU64::new(0)),
        })
    }

    pub(crate) fn supports_f64(&self) -> bool {
        self.device.features().contains(wgpu::Features::SHADER_F64)
    }

    pub(crate) fn max_storage_binding_size(&self) -> u64 {
        u64::from(self.device.limits().max_storage_buffer_binding_size)
    }

    /// Creates a buffer initialised with `contents` and counts the upload.
    pub(crate) fn create_gpu_buffer_with_data(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let byte_len = contents.len() as u64;
        log::debug!("Creating GPU buffer '{}' with {} bytes", label, byte_len);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        self.count_upload(byte_len);
        buffer
    }

    /// Creates a zero-initialised buffer. No transfer is counted.
    pub(crate) fn create_empty_buffer(
        &self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        log::debug!("Creating empty GPU buffer '{}' of size {}", label, size);
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Writes `data` to the start of `buffer` through the queue.
    pub(crate) fn write_buffer<T: Pod>(
        &self,
        buffer: &wgpu::Buffer,
        data: &[T],
    ) -> Result<(), CsrCoreError> {
        let byte_len = std::mem::size_of_val(data) as u64;
        if byte_len == 0 {
            log::debug!("Skipping write for 0 bytes");
            return Ok(());
        }
        if buffer.size() < byte_len {
            return Err(CsrCoreError::Internal(format!(
                "Target buffer size ({}) is smaller than data size ({})",
                buffer.size(),
                byte_len
            )));
        }
        if !buffer.usage().contains(wgpu::BufferUsages::COPY_DST) {
            return Err(CsrCoreError::Internal(
                "Target buffer must have COPY_DST usage".to_string(),
            ));
        }

        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(data));
        self.count_upload(byte_len);
        Ok(())
    }

    /// Copies the first `size` bytes of `src` into `dst` and waits for the copy
    /// on native targets.
    pub(crate) fn copy_buffer(&self, src: &wgpu::Buffer, dst: &wgpu::Buffer, size: u64) {
        if size == 0 {
            return;
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("csr buffer copy encoder"),
            });
        encoder.copy_buffer_to_buffer(src, 0, dst, 0, size);
        self.queue.submit(Some(encoder.finish()));

        cfg_if! {
            if #[cfg(not(target_arch = "wasm32"))] {
                if let Err(e) = self.device.poll(PollType::Wait) {
                    log::warn!("Device poll after buffer copy failed: {:?}", e);
                }
            }
        }
    }

    /// Reads `element_count` elements of `T` back from `buffer`.
    ///
    /// # Errors
    /// Returns `CsrCoreError` if the buffer is too small or mapping fails.
    pub(crate) async fn read_buffer_to_cpu<T: Pod>(
        &self,
        buffer: &wgpu::Buffer,
        element_count: usize,
    ) -> Result<Vec<T>, CsrCoreError> {
        let size_bytes = (element_count * std::mem::size_of::<T>()) as u64;
        if size_bytes == 0 {
            return Ok(Vec::new());
        }
        if buffer.size() < size_bytes {
            return Err(CsrCoreError::Internal(format!(
                "GPU buffer size ({}) is smaller than expected read size ({})",
                buffer.size(),
                size_bytes
            )));
        }

        let staging = self.create_empty_buffer(
            "csr readback staging buffer",
            size_bytes,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("csr readback encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size_bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            if sender.send(result).is_err() {
                log::error!("Readback receiver dropped before mapping completed");
            }
        });
        self.bytes_from_gpu.fetch_add(size_bytes, Ordering::Relaxed);

        cfg_if! {
            if #[cfg(not(target_arch = "wasm32"))] {
                if let Err(e) = self.device.poll(PollType::Wait) {
                    log::warn!("Device poll during readback failed: {:?}", e);
                }
            }
        }

        match receiver.await {
            Ok(Ok(())) => {
                let result = {
                    let data = slice.get_mapped_range();
                    bytemuck::cast_slice::<u8, T>(&data).to_vec()
                };
                staging.unmap();
                log::trace!("Read back {} bytes", size_bytes);
                Ok(result)
            }
            Ok(Err(e)) => Err(CsrCoreError::WgpuError(format!(
                "Buffer mapping failed: {}",
                e
            ))),
            Err(_) => Err(CsrCoreError::Internal(
                "Channel receive error during buffer mapping".to_string(),
            )),
        }
    }

    fn count_upload(&self, byte_len: u64) {
        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_to_gpu incremented by {}, now: {}",
            byte_len,
            self.bytes_to_gpu.load(Ordering::Relaxed)
        );
    }

    pub(crate) fn get_transfer_stats(&self) -> (u64, u64) {
        (
            self.bytes_to_gpu.load(Ordering::Relaxed),
            self.bytes_from_gpu.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn reset_transfer_stats(&self) {
        self.bytes_to_gpu.store(0, Ordering::Relaxed);
        self.bytes_from_gpu.store(0, Ordering::Relaxed);
        log::info!("GPU transfer counters reset.");
    }
}
