//! Device-resident CSR matrix with lazily built backend descriptors.
//!
//! A [`DeviceCsrMatrix`] owns three growable buffers on a [`Device`] and caches
//! two independent descriptors over them. A cached descriptor always describes
//! the current shape and buffers: every reshape, resize or upload that can
//! replace a buffer drops both caches first.

use crate::buffer::DeviceBuffer;
use crate::descriptor::{CsrLayout, MatrixDescriptor};
use crate::device::{CsrParts, Device};
use crate::error::CsrCoreError;
#[cfg(feature = "rayon")]
use crate::rows::CsrRowMut;
use crate::rows::CsrRowsMut;
use crate::sparse_matrix::CsrMatrix;
use crate::traits::{Matrix, Scalar};
use crate::viewer::{CsrView, CsrViewMut};
use std::cell::OnceCell;
use std::fmt;

#[cfg(feature = "rayon")]
use rayon::prelude::{IndexedParallelIterator, IntoParallelIterator};

pub struct DeviceCsrMatrix<D: Device, T: Scalar> {
    device: D,
    rows: usize,
    cols: usize,
    row_offsets: D::Buffer<u32>,
    col_indices: D::Buffer<u32>,
    values: D::Buffer<T>,
    descr: OnceCell<D::Descriptor>,
    legacy_descr: OnceCell<D::LegacyDescriptor>,
}

impl<D: Device, T: Scalar> DeviceCsrMatrix<D, T> {
    /// Empty 0x0 matrix: a single zero row offset and no entries.
    pub fn new(device: D) -> Self {
        let row_offsets = device.alloc::<u32>("csr row offsets", 1);
        let col_indices = device.alloc::<u32>("csr column indices", 0);
        let values = device.alloc::<T>("csr values", 0);
        Self {
            device,
            rows: 0,
            cols: 0,
            row_offsets,
            col_indices,
            values,
            descr: OnceCell::new(),
            legacy_descr: OnceCell::new(),
        }
    }

    /// Uploads a host matrix into a new device matrix.
    pub fn from_host(device: D, host: &CsrMatrix<T>) -> Result<Self, CsrCoreError> {
        let mut matrix = Self::new(device);
        matrix.upload(host)?;
        Ok(matrix)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn nnz(&self) -> usize {
        DeviceBuffer::len(&self.values)
    }

    pub fn row_offsets(&self) -> &D::Buffer<u32> {
        &self.row_offsets
    }

    pub fn col_indices(&self) -> &D::Buffer<u32> {
        &self.col_indices
    }

    pub fn values(&self) -> &D::Buffer<T> {
        &self.values
    }

    /// Zero-based layout of the current shape.
    pub fn layout(&self) -> CsrLayout {
        CsrLayout::new(self.rows, self.cols, self.nnz(), T::VALUE_TYPE)
    }

    /// Sets the shape and resizes the row offsets to `rows + 1` entries.
    /// Column indices and values are left alone.
    pub fn reshape(&mut self, rows: usize, cols: usize) {
        self.invalidate_descriptors();
        self.device.resize(&mut self.row_offsets, rows + 1);
        self.rows = rows;
        self.cols = cols;
        log::debug!("Reshaped CSR matrix to {}x{}", rows, cols);
    }

    /// Resizes the column-index and value buffers to `nnz` entries.
    pub fn resize_nnz(&mut self, nnz: usize) {
        self.invalidate_descriptors();
        self.device.resize(&mut self.col_indices, nnz);
        self.device.resize(&mut self.values, nnz);
        log::debug!("Resized CSR matrix storage to {} entries", nnz);
    }

    /// Returns the cached backend descriptor, building it on first use.
    ///
    /// On error nothing is cached, so a later call retries.
    pub fn descriptor(&self) -> Result<&D::Descriptor, CsrCoreError> {
        if let Some(descr) = self.descr.get() {
            return Ok(descr);
        }
        let built = self.device.create_descriptor(CsrParts {
            layout: self.layout(),
            row_offsets: &self.row_offsets,
            col_indices: &self.col_indices,
            values: &self.values,
        })?;
        Ok(self.descr.get_or_init(|| built))
    }

    /// Returns the cached legacy matrix descriptor (general, zero-based,
    /// non-unit diagonal), building it on first use.
    pub fn legacy_descriptor(&self) -> Result<&D::LegacyDescriptor, CsrCoreError> {
        if let Some(descr) = self.legacy_descr.get() {
            return Ok(descr);
        }
        let built = self
            .device
            .create_legacy_descriptor(&MatrixDescriptor::default())?;
        Ok(self.legacy_descr.get_or_init(|| built))
    }

    pub fn has_descriptor(&self) -> bool {
        self.descr.get().is_some()
    }

    pub fn has_legacy_descriptor(&self) -> bool {
        self.legacy_descr.get().is_some()
    }

    /// Drops both cached descriptors.
    pub fn invalidate_descriptors(&mut self) {
        if let Some(descr) = self.descr.take() {
            log::trace!("Invalidating CSR descriptor {:?}", descr);
        }
        if let Some(descr) = self.legacy_descr.take() {
            log::trace!("Invalidating legacy matrix descriptor {:?}", descr);
        }
    }

    /// Moves the buffers and cached descriptors into a new owner, leaving
    /// `self` as an empty 0x0 matrix on the same device.
    ///
    /// Move-assignment is `*dst = src.take()`; the old contents of `dst`
    /// are dropped along with their descriptors.
    pub fn take(&mut self) -> Self {
        let empty = Self::new(self.device.clone());
        std::mem::replace(self, empty)
    }

    /// Replaces shape and contents with `host`.
    pub fn upload(&mut self, host: &CsrMatrix<T>) -> Result<(), CsrCoreError> {
        self.invalidate_descriptors();
        self.device.upload(&mut self.row_offsets, host.row_ptr())?;
        self.device.upload(&mut self.col_indices, host.col_indices())?;
        self.device.upload(&mut self.values, host.values())?;
        self.rows = host.rows();
        self.cols = host.cols();
        log::debug!(
            "Uploaded {}x{} CSR matrix with {} entries",
            self.rows,
            self.cols,
            self.nnz()
        );
        Ok(())
    }

    /// Copies the matrix back to the host, validating the pattern.
    pub async fn download(&self) -> Result<CsrMatrix<T>, CsrCoreError> {
        let row_ptr = self.device.download(&self.row_offsets).await?;
        let col_indices = self.device.download(&self.col_indices).await?;
        let values = self.device.download(&self.values).await?;
        CsrMatrix::from_csr(self.rows, self.cols, values, col_indices, row_ptr)
    }

    /// Runs `f` over a read-write view of a host copy of the buffers and
    /// writes the result back. Works on every backend.
    pub async fn with_viewer<R>(
        &mut self,
        f: impl FnOnce(CsrViewMut<'_, T>) -> R,
    ) -> Result<R, CsrCoreError> {
        let mut row_ptr = self.device.download(&self.row_offsets).await?;
        let mut col_indices = self.device.download(&self.col_indices).await?;
        let mut values = self.device.download(&self.values).await?;

        let result = f(CsrViewMut::new(
            &mut row_ptr,
            &mut col_indices,
            &mut values,
            self.rows,
            self.cols,
        ));

        // lengths are unchanged, so buffers are written in place
        self.device.upload(&mut self.row_offsets, &row_ptr)?;
        self.device.upload(&mut self.col_indices, &col_indices)?;
        self.device.upload(&mut self.values, &values)?;
        Ok(result)
    }
}

impl<D, T> DeviceCsrMatrix<D, T>
where
    D: Device,
    T: Scalar,
    D::Buffer<u32>: AsRef<[u32]> + AsMut<[u32]>,
    D::Buffer<T>: AsRef<[T]> + AsMut<[T]>,
{
    /// Read-write view over host-accessible buffers.
    pub fn viewer(&mut self) -> CsrViewMut<'_, T> {
        CsrViewMut::new(
            self.row_offsets.as_mut(),
            self.col_indices.as_mut(),
            self.values.as_mut(),
            self.rows,
            self.cols,
        )
    }

    pub fn view(&self) -> CsrView<'_, T> {
        CsrView::new(
            self.row_offsets.as_ref(),
            self.col_indices.as_ref(),
            self.values.as_ref(),
            self.rows,
            self.cols,
        )
    }

    /// Disjoint per-row access over sealed row offsets.
    pub fn rows_mut(&mut self) -> CsrRowsMut<'_, T> {
        CsrRowsMut::new(
            self.row_offsets.as_ref(),
            self.col_indices.as_mut(),
            self.values.as_mut(),
        )
    }

    #[cfg(feature = "rayon")]
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = CsrRowMut<'_, T>> {
        self.rows_mut().collect::<Vec<_>>().into_par_iter()
    }
}

impl<D: Device, T: Scalar> Clone for DeviceCsrMatrix<D, T> {
    /// Duplicates the buffers. The copy starts with no descriptors.
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            rows: self.rows,
            cols: self.cols,
            row_offsets: self.device.duplicate(&self.row_offsets),
            col_indices: self.device.duplicate(&self.col_indices),
            values: self.device.duplicate(&self.values),
            descr: OnceCell::new(),
            legacy_descr: OnceCell::new(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.invalidate_descriptors();
        self.device = source.device.clone();
        self.rows = source.rows;
        self.cols = source.cols;
        self.row_offsets = source.device.duplicate(&source.row_offsets);
        self.col_indices = source.device.duplicate(&source.col_indices);
        self.values = source.device.duplicate(&source.values);
    }
}

impl<D: Device, T: Scalar> Drop for DeviceCsrMatrix<D, T> {
    fn drop(&mut self) {
        // descriptors reference the buffers, release them first
        self.invalidate_descriptors();
    }
}

impl<D: Device, T: Scalar> fmt::Debug for DeviceCsrMatrix<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCsrMatrix")
            .field("device", &self.device)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("nnz", &self.nnz())
            .field("descriptor", &self.descr.get())
            .field("legacy_descriptor", &self.legacy_descr.get())
            .finish()
    }
}

impl<D: Device, T: Scalar> Matrix for DeviceCsrMatrix<D, T> {
    type Value = T;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CpuDevice;
    use crate::sparse_matrix::Triplet;

    fn scenario_matrix() -> DeviceCsrMatrix<CpuDevice, f32> {
        let mut m = DeviceCsrMatrix::new(CpuDevice::new());
        m.reshape(3, 3);
        m.resize_nnz(5);
        let viewer = m.viewer();
        viewer.place_row(0, 0);
        viewer.place_row(1, 2);
        viewer.place_row(2, 3);
        viewer.place_tail();
        viewer.place_col_value(0, 0, 0, 1.0);
        viewer.place_col_value(0, 1, 2, 2.0);
        viewer.place_col_value(1, 0, 1, 3.0);
        viewer.place_col_value(2, 0, 0, 4.0);
        viewer.place_col_value(2, 1, 2, 5.0);
        m
    }

    #[test]
    fn test_new_is_empty() {
        let m = DeviceCsrMatrix::<CpuDevice, f64>::new(CpuDevice::new());
        assert_eq!(m.dims(), (0, 0));
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.row_offsets(), &vec![0u32]);
        assert!(!m.has_descriptor());
        assert!(!m.has_legacy_descriptor());
    }

    #[test]
    fn test_reshape_sizes_row_offsets() {
        let mut m = DeviceCsrMatrix::<CpuDevice, f32>::new(CpuDevice::new());
        m.reshape(4, 2);
        assert_eq!(m.dims(), (4, 2));
        assert_eq!(m.row_offsets().len(), 5);
        assert_eq!(m.nnz(), 0);
    }

    #[test]
    fn test_scenario_through_resource() {
        let m = scenario_matrix();
        let view = m.view();
        assert_eq!(view.at(1, 1), 3.0);
        assert_eq!(view.at(0, 1), 0.0);
        assert_eq!(view.row_nnz(2), 2);
        assert_eq!(m.row_offsets(), &vec![0, 2, 3, 5]);
        assert_eq!(m.col_indices(), &vec![0, 2, 1, 0, 2]);
    }

    #[test]
    fn test_descriptor_is_cached_until_reshape() {
        let mut m = scenario_matrix();
        let first = m.descriptor().unwrap().id();
        assert_eq!(m.descriptor().unwrap().id(), first);
        assert_eq!(m.descriptor().unwrap().layout().nnz, 5);
        assert!(!m.has_legacy_descriptor());

        m.reshape(3, 4);
        assert!(!m.has_descriptor());
        let rebuilt = m.descriptor().unwrap();
        assert_ne!(rebuilt.id(), first);
        assert_eq!(rebuilt.layout().cols, 4);
    }

    #[test]
    fn test_legacy_descriptor_is_independent() {
        let mut m = scenario_matrix();
        let legacy = m.legacy_descriptor().unwrap().id();
        assert!(!m.has_descriptor());
        assert_eq!(m.legacy_descriptor().unwrap().id(), legacy);
        assert_eq!(
            m.legacy_descriptor().unwrap().descr(),
            &MatrixDescriptor::default()
        );

        m.descriptor().unwrap();
        m.resize_nnz(6);
        assert!(!m.has_descriptor());
        assert!(!m.has_legacy_descriptor());
    }

    #[test]
    fn test_clone_duplicates_buffers_without_descriptors() {
        let m = scenario_matrix();
        m.descriptor().unwrap();
        let mut copy = m.clone();
        assert!(!copy.has_descriptor());
        copy.viewer().rw_elem(0, 0).set(10.0);
        assert_eq!(m.view().at(0, 0), 1.0);
        assert_eq!(copy.view().at(0, 0), 10.0);
    }

    #[test]
    fn test_clone_from_drops_destination_descriptors() {
        let source = scenario_matrix();
        let mut dst = DeviceCsrMatrix::<CpuDevice, f32>::new(CpuDevice::new());
        dst.descriptor().unwrap();
        dst.legacy_descriptor().unwrap();

        dst.clone_from(&source);
        assert!(!dst.has_descriptor());
        assert!(!dst.has_legacy_descriptor());
        assert_eq!(dst.dims(), (3, 3));
        assert_eq!(dst.view().at(2, 2), 5.0);
    }

    #[test]
    fn test_take_moves_descriptors_and_resets_source() {
        let mut src = scenario_matrix();
        let id = src.descriptor().unwrap().id();

        let moved = src.take();
        assert_eq!(moved.dims(), (3, 3));
        assert!(moved.has_descriptor());
        assert_eq!(moved.descriptor().unwrap().id(), id);

        assert_eq!(src.dims(), (0, 0));
        assert_eq!(src.nnz(), 0);
        assert_eq!(src.row_offsets(), &vec![0u32]);
        assert!(!src.has_descriptor());
        assert!(!src.has_legacy_descriptor());
    }

    #[test]
    fn test_taken_source_rebuilds_descriptor_from_empty_state() {
        let mut src = scenario_matrix();
        let id = src.descriptor().unwrap().id();
        let moved = src.take();

        let rebuilt = src.descriptor().unwrap();
        assert_ne!(rebuilt.id(), id);
        assert_ne!(rebuilt.id(), moved.descriptor().unwrap().id());
        assert_eq!(rebuilt.layout().rows, 0);
        assert_eq!(rebuilt.layout().cols, 0);
        assert_eq!(rebuilt.layout().nnz, 0);
        assert_eq!(rebuilt.row_offsets().len(), 1);
        assert!(rebuilt.values().is_empty());
    }

    #[test]
    fn test_row_nnz_during_assembly() {
        let mut m = DeviceCsrMatrix::<CpuDevice, f32>::new(CpuDevice::new());
        m.reshape(3, 3);
        m.resize_nnz(5);
        let viewer = m.viewer();
        viewer.place_row(0, 0);
        viewer.place_row(1, 2);
        assert_eq!(viewer.row_nnz(0), 2);
        // row 2 has not been placed yet
        assert_eq!(viewer.row_nnz(1), 0);

        viewer.place_row(2, 3);
        viewer.place_tail();
        assert_eq!(viewer.row_nnz(1), 1);
        assert_eq!(viewer.row_nnz(2), 2);
    }

    #[test]
    fn test_host_descriptor_tracks_buffers() {
        let mut m = scenario_matrix();
        let descr = m.descriptor().unwrap();
        assert_eq!(descr.row_offsets().len(), 4);
        assert_eq!(descr.row_offsets().addr(), m.row_offsets().as_ptr() as usize);
        assert_eq!(descr.col_indices().len(), 5);
        assert_eq!(descr.col_indices().addr(), m.col_indices().as_ptr() as usize);
        assert_eq!(descr.values().len(), 5);
        assert_eq!(descr.values().addr(), m.values().as_ptr() as usize);

        m.reshape(6, 3);
        m.resize_nnz(40);
        let descr = m.descriptor().unwrap();
        assert_eq!(descr.row_offsets().len(), 7);
        assert_eq!(descr.col_indices().len(), 40);
        assert_eq!(descr.values().len(), 40);
        assert_eq!(descr.values().addr(), m.values().as_ptr() as usize);
    }

    #[test]
    fn test_rows_mut_fills_placed_rows() {
        let mut m = DeviceCsrMatrix::<CpuDevice, f32>::new(CpuDevice::new());
        m.reshape(3, 3);
        m.resize_nnz(5);
        {
            let viewer = m.viewer();
            viewer.place_row(0, 0);
            viewer.place_row(1, 2);
            viewer.place_row(2, 3);
            viewer.place_tail();
        }
        let id = m.descriptor().unwrap().id();

        std::thread::scope(|s| {
            for mut row in m.rows_mut() {
                s.spawn(move || {
                    let r = row.row();
                    for local in 0..row.len() {
                        let col = if r == 1 { 1 } else { 2 * local };
                        row.place(local, col, (row.global_begin() + local + 1) as f32);
                    }
                });
            }
        });

        let reference = scenario_matrix();
        assert_eq!(m.col_indices(), reference.col_indices());
        assert_eq!(m.values(), reference.values());
        assert_eq!(m.descriptor().unwrap().id(), id);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_rows_mut_scales_rows() {
        use rayon::prelude::ParallelIterator;

        let mut m = scenario_matrix();
        m.par_rows_mut().for_each(|mut row| {
            let scale = (row.row() + 1) as f32;
            row.values_mut().iter_mut().for_each(|v| *v *= scale);
        });
        assert_eq!(m.values(), &vec![1.0, 2.0, 6.0, 12.0, 15.0]);
    }

    #[test]
    fn test_upload_download_round_trip() {
        let host = CsrMatrix::from_triplets(
            2,
            3,
            &[Triplet::new(0, 1, 2.0f64), Triplet::new(1, 2, -1.0)],
        )
        .unwrap();
        let mut m = DeviceCsrMatrix::from_host(CpuDevice::new(), &host).unwrap();
        m.descriptor().unwrap();
        assert_eq!(m.dims(), (2, 3));
        assert_eq!(m.layout().nnz, 2);

        let back = pollster::block_on(m.download()).unwrap();
        assert_eq!(back, host);

        m.upload(&CsrMatrix::new(1, 1)).unwrap();
        assert!(!m.has_descriptor());
        assert_eq!(m.nnz(), 0);
    }

    #[test]
    fn test_with_viewer_writes_back() {
        let mut m = scenario_matrix();
        let id = m.descriptor().unwrap().id();
        let old = pollster::block_on(m.with_viewer(|v| {
            let e = v.rw_elem(2, 1);
            let old = e.get();
            e.add(1.5);
            old
        }))
        .unwrap();
        assert_eq!(old, 5.0);
        assert_eq!(m.view().at(2, 2), 6.5);
        // in-place writes keep the descriptor
        assert_eq!(m.descriptor().unwrap().id(), id);
    }

    #[test]
    fn test_download_rejects_unsealed_pattern() {
        let mut m = DeviceCsrMatrix::<CpuDevice, f32>::new(CpuDevice::new());
        m.reshape(2, 2);
        m.resize_nnz(1);
        assert!(pollster::block_on(m.download()).is_err());
    }
}
