//! # CSR Core Library
//!
//! Bounds-checked views over Compressed Sparse Row matrices, and
//! device-resident CSR matrices that lazily build backend descriptors
//! (wgpu bind groups on [`GpuDevice`], plain records on [`CpuDevice`]).

pub mod buffer;
pub mod check;
pub mod config;
mod context;
pub mod descriptor;
pub mod device;
pub mod device_matrix;
pub mod error;
pub mod rows;
pub mod sparse_matrix;
pub mod traits;
pub mod viewer;

pub use buffer::{DeviceBuffer, GpuBuffer};
pub use check::{ViewerViolation, CHECKED};
pub use config::GpuDeviceConfig;
pub use descriptor::{
    CsrLayout, DescriptorId, GpuCsrDescriptor, GpuMatrixDescriptor, HostBufferInfo,
    HostCsrDescriptor, HostMatrixDescriptor, MatrixDescriptor, ValueType,
};
pub use device::{CpuDevice, CsrParts, Device, GpuDevice, TransferStats};
pub use device_matrix::DeviceCsrMatrix;
pub use error::CsrCoreError;
pub use rows::{CsrRowMut, CsrRowsMut};
pub use sparse_matrix::{CsrMatrix, Triplet};
pub use traits::{Matrix, Scalar};
pub use viewer::{CsrElem, CsrElemMut, CsrView, CsrViewMut, CsrViewer};

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
use wasm_bindgen::prelude::*;

/// Routes `log` output to the browser console and panics to `console.error`.
#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
#[wasm_bindgen(start)]
pub fn init_wasm_logging() {
    static START: std::sync::Once = std::sync::Once::new();
    START.call_once(|| {
        wasm_logger::init(wasm_logger::Config::new(log::Level::Info));
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));
        log::info!("csr-core WASM module initialized.");
    });
}
