/// Parameters used when opening a [`crate::GpuDevice`].
#[derive(Debug, Clone)]
pub struct GpuDeviceConfig {
    pub power_preference: wgpu::PowerPreference,
    pub label: String,
    /// Fail device creation instead of degrading when `SHADER_F64` is missing.
    pub require_f64: bool,
    /// Storage buffers a CSR kernel binds per stage (row offsets, columns, values, output).
    pub min_storage_buffers: u32,
}

impl Default for GpuDeviceConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            label: "csr_core device".to_string(),
            require_f64: false,
            min_storage_buffers: 4,
        }
    }
}

impl GpuDeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(
        power_preference: wgpu::PowerPreference,
        require_f64: bool,
        min_storage_buffers: u32,
    ) -> Self {
        Self {
            power_preference,
            require_f64,
            min_storage_buffers,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}
