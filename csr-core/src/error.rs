use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsrCoreError {
    #[error("WGPU initialization failed: {0}")]
    WgpuInitError(String),

    #[error("WGPU error: {0}")]
    WgpuError(String),

    #[error("Invalid matrix dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The backend refused to build a descriptor for the current buffers.
    #[error("Descriptor construction failed: {0}")]
    DescriptorError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "wasm")]
impl From<CsrCoreError> for wasm_bindgen::JsValue {
    fn from(err: CsrCoreError) -> Self {
        Self::from_str(&err.to_string())
    }
}
