//! Non-owning accessor over the three CSR arrays.
//!
//! A [`CsrViewer`] is a `Copy` handle over a row-offset slice (`rows + 1`
//! entries), a column-index slice and a value slice (`nnz` entries each). It
//! offers dense-style reads, row-local element proxies and the placement
//! operations used while a sparsity pattern is being assembled.
//!
//! Two access modes share the implementation:
//! - [`CsrView`] reads through plain shared slices.
//! - [`CsrViewMut`] reads and writes through `Cell` slots, so every copy of the
//!   view can place entries or write values while the underlying storage stays
//!   mutably borrowed for `'a`. Cell slots make the read-write view `!Sync`.
//!
//! ```text
//!      0   1   2
//!  0 [ 1   .   2 ]     row_ptr = [0, 2, 3, 5]
//!  1 [ .   3   . ]     col_idx = [0, 2, 1, 0, 2]
//!  2 [ 4   .   5 ]     values  = [1, 2, 3, 4, 5]
//! ```
//!
//! Bounds diagnostics follow [`crate::check::CHECKED`].

use crate::check;
use crate::traits::Scalar;
use std::cell::Cell;
use std::fmt;
use std::ops::Range;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ReadOnly {}
    impl Sealed for super::ReadWrite {}
}

/// Access mode of a [`CsrViewer`].
pub trait Access: sealed::Sealed + Copy + Default + fmt::Debug + 'static {
    /// Storage slot for one array element.
    type Slot<V: Copy + 'static>: 'static;

    fn load<V: Copy + 'static>(slot: &Self::Slot<V>) -> V;
}

/// Read-only access through shared slices.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnly;

/// Read-write access through `Cell` slots.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadWrite;

impl Access for ReadOnly {
    type Slot<V: Copy + 'static> = V;

    #[inline(always)]
    fn load<V: Copy + 'static>(slot: &Self::Slot<V>) -> V {
        *slot
    }
}

impl Access for ReadWrite {
    type Slot<V: Copy + 'static> = Cell<V>;

    #[inline(always)]
    fn load<V: Copy + 'static>(slot: &Self::Slot<V>) -> V {
        slot.get()
    }
}

/// A CSR accessor in access mode `A`.
pub struct CsrViewer<'a, A: Access, T: Scalar> {
    row_ptr: &'a [A::Slot<u32>],
    col_idx: &'a [A::Slot<u32>],
    values: &'a [A::Slot<T>],
    rows: usize,
    cols: usize,
}

/// Read-only CSR accessor.
pub type CsrView<'a, T> = CsrViewer<'a, ReadOnly, T>;

/// Read-write CSR accessor used for pattern placement and value writes.
pub type CsrViewMut<'a, T> = CsrViewer<'a, ReadWrite, T>;

impl<A: Access, T: Scalar> Clone for CsrViewer<'_, A, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Access, T: Scalar> Copy for CsrViewer<'_, A, T> {}

impl<A: Access, T: Scalar> fmt::Debug for CsrViewer<'_, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrViewer")
            .field("access", &A::default())
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("nnz", &self.nnz())
            .finish()
    }
}

#[inline(always)]
#[track_caller]
fn to_index(value: usize) -> u32 {
    check::check_index(value);
    value as u32
}

impl<'a, T: Scalar> CsrViewer<'a, ReadOnly, T> {
    /// Creates a read-only view. `nnz` is `values.len()`.
    #[track_caller]
    pub fn new(
        row_ptr: &'a [u32],
        col_idx: &'a [u32],
        values: &'a [T],
        rows: usize,
        cols: usize,
    ) -> Self {
        check::check_layout(rows, row_ptr.len(), col_idx.len(), values.len());
        Self {
            row_ptr,
            col_idx,
            values,
            rows,
            cols,
        }
    }
}

impl<'a, T: Scalar> CsrViewer<'a, ReadWrite, T> {
    /// Creates a read-write view over mutably borrowed arrays. `nnz` is
    /// `values.len()`.
    #[track_caller]
    pub fn new(
        row_ptr: &'a mut [u32],
        col_idx: &'a mut [u32],
        values: &'a mut [T],
        rows: usize,
        cols: usize,
    ) -> Self {
        check::check_layout(rows, row_ptr.len(), col_idx.len(), values.len());
        Self {
            row_ptr: Cell::from_mut(row_ptr).as_slice_of_cells(),
            col_idx: Cell::from_mut(col_idx).as_slice_of_cells(),
            values: Cell::from_mut(values).as_slice_of_cells(),
            rows,
            cols,
        }
    }

    /// Read-write proxy for the `local_offset`-th entry of `row`.
    #[track_caller]
    pub fn rw_elem(&self, row: usize, local_offset: usize) -> CsrElemMut<'a, T> {
        let global_offset = self.check_all(row, local_offset);
        CsrElemMut {
            view: *self,
            row,
            col: self.col_at(global_offset),
            global_offset,
        }
    }

    /// Sets the starting offset of `row`. Rows must be placed in increasing
    /// order with non-decreasing offsets.
    #[track_caller]
    pub fn place_row(&self, row: usize, global_offset: usize) {
        check::check_row(row, self.rows);
        self.row_ptr[row].set(to_index(global_offset));
    }

    /// Seals the pattern: `row_ptr[rows] = nnz`.
    pub fn place_tail(&self) {
        self.row_ptr[self.rows].set(to_index(self.nnz()));
    }

    /// Writes column `col` at `(row, local_offset)` and returns its global offset.
    #[track_caller]
    pub fn place_col(&self, row: usize, local_offset: usize, col: usize) -> usize {
        check::check_row(row, self.rows);
        let global_offset = self.row_begin(row) + local_offset;
        check::check_global_offset(global_offset, self.nnz());
        self.col_idx[global_offset].set(to_index(col));
        global_offset
    }

    /// Writes column `col` and `value` at `(row, local_offset)` and returns the
    /// global offset.
    #[track_caller]
    pub fn place_col_value(&self, row: usize, local_offset: usize, col: usize, value: T) -> usize {
        let global_offset = self.place_col(row, local_offset, col);
        self.values[global_offset].set(value);
        global_offset
    }

    /// Writes column `col` and `value` directly at `global_offset`.
    #[track_caller]
    pub fn place_col_at(&self, global_offset: usize, col: usize, value: T) -> usize {
        check::check_global_offset(global_offset, self.nnz());
        self.col_idx[global_offset].set(to_index(col));
        self.values[global_offset].set(value);
        global_offset
    }
}

impl<'a, A: Access, T: Scalar> CsrViewer<'a, A, T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    #[inline(always)]
    fn row_begin(&self, row: usize) -> usize {
        A::load(&self.row_ptr[row]) as usize
    }

    #[inline(always)]
    fn col_at(&self, global_offset: usize) -> usize {
        A::load(&self.col_idx[global_offset]) as usize
    }

    #[inline(always)]
    fn value_at(&self, global_offset: usize) -> T {
        A::load(&self.values[global_offset])
    }

    /// Number of stored entries in `row`.
    #[track_caller]
    pub fn row_nnz(&self, row: usize) -> usize {
        check::check_row(row, self.rows);
        // zero while row + 1 has not been placed yet
        self.row_begin(row + 1).saturating_sub(self.row_begin(row))
    }

    /// Global offsets covered by `row`.
    #[track_caller]
    pub fn row_range(&self, row: usize) -> Range<usize> {
        check::check_row(row, self.rows);
        self.row_begin(row)..self.row_begin(row + 1)
    }

    /// `(col, value)` pairs of `row` in storage order.
    #[track_caller]
    pub fn row_iter(&self, row: usize) -> impl Iterator<Item = (usize, T)> + 'a {
        let view = *self;
        self.row_range(row)
            .map(move |g| (view.col_at(g), view.value_at(g)))
    }

    /// Dense-style read: the stored value at `(row, col)` or zero.
    ///
    /// Column indices within a row carry no ordering guarantee, so this is a
    /// linear scan costing O(row length). Meant for tests and debugging.
    #[track_caller]
    pub fn at(&self, row: usize, col: usize) -> T {
        check::check_range(row, col, self.rows, self.cols);
        for g in self.row_begin(row)..self.row_begin(row + 1) {
            if self.col_at(g) == col {
                return self.value_at(g);
            }
        }
        T::zero()
    }

    /// Read-only proxy for the `local_offset`-th entry of `row`.
    #[track_caller]
    pub fn ro_elem(&self, row: usize, local_offset: usize) -> CsrElem<'a, A, T> {
        let global_offset = self.check_all(row, local_offset);
        CsrElem {
            view: *self,
            row,
            col: self.col_at(global_offset),
            global_offset,
        }
    }

    #[inline(always)]
    #[track_caller]
    fn check_all(&self, row: usize, local_offset: usize) -> usize {
        check::check_row(row, self.rows);
        let row_begin = self.row_begin(row);
        check::check_local_offset(row, local_offset, row_begin, self.row_begin(row + 1));
        let global_offset = row_begin + local_offset;
        check::check_global_offset(global_offset, self.nnz());
        global_offset
    }
}

/// Read-only element proxy.
pub struct CsrElem<'a, A: Access, T: Scalar> {
    view: CsrViewer<'a, A, T>,
    row: usize,
    col: usize,
    global_offset: usize,
}

impl<A: Access, T: Scalar> Clone for CsrElem<'_, A, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Access, T: Scalar> Copy for CsrElem<'_, A, T> {}

impl<A: Access, T: Scalar> CsrElem<'_, A, T> {
    pub fn get(&self) -> T {
        self.view.value_at(self.global_offset)
    }

    /// `(row, col)` of the entry.
    pub fn pos(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn global_offset(&self) -> usize {
        self.global_offset
    }
}

impl<A: Access, T: Scalar> fmt::Debug for CsrElem<'_, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrElem")
            .field("row", &self.row)
            .field("col", &self.col)
            .field("global_offset", &self.global_offset)
            .field("value", &self.get())
            .finish()
    }
}

/// Read-write element proxy. Writes land in `values[global_offset]`; the stored
/// column is left untouched.
#[derive(Clone, Copy)]
pub struct CsrElemMut<'a, T: Scalar> {
    view: CsrViewMut<'a, T>,
    row: usize,
    col: usize,
    global_offset: usize,
}

impl<T: Scalar> CsrElemMut<'_, T> {
    pub fn get(&self) -> T {
        self.view.value_at(self.global_offset)
    }

    pub fn set(&self, value: T) {
        self.view.values[self.global_offset].set(value);
    }

    /// Accumulates `value` into the slot.
    pub fn add(&self, value: T) {
        let slot = &self.view.values[self.global_offset];
        let mut current = slot.get();
        current += value;
        slot.set(current);
    }

    pub fn pos(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn global_offset(&self) -> usize {
        self.global_offset
    }
}

impl<T: Scalar> fmt::Debug for CsrElemMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrElemMut")
            .field("row", &self.row)
            .field("col", &self.col)
            .field("global_offset", &self.global_offset)
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // [ 1 0 2 ]
    // [ 0 3 0 ]
    // [ 4 0 5 ]
    fn scenario() -> (Vec<u32>, Vec<u32>, Vec<f32>) {
        (
            vec![0, 2, 3, 5],
            vec![0, 2, 1, 0, 2],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        )
    }

    #[test]
    fn test_dense_reads_on_scenario() {
        let (row_ptr, col_idx, values) = scenario();
        let view = CsrView::new(&row_ptr, &col_idx, &values, 3, 3);

        assert_eq!(view.rows(), 3);
        assert_eq!(view.cols(), 3);
        assert_eq!(view.nnz(), 5);
        assert_eq!(view.at(1, 1), 3.0);
        assert_eq!(view.at(0, 1), 0.0);
        assert_eq!(view.at(2, 2), 5.0);
        assert_eq!(view.row_nnz(2), 2);
        assert_eq!(view.row_nnz(1), 1);
        assert_eq!(view.row_range(2), 3..5);
    }

    #[test]
    fn test_ro_elem_resolves_column_and_offset() {
        let (row_ptr, col_idx, values) = scenario();
        let view = CsrView::new(&row_ptr, &col_idx, &values, 3, 3);

        let e = view.ro_elem(2, 1);
        assert_eq!(e.pos(), (2, 2));
        assert_eq!(e.global_offset(), 4);
        assert_eq!(e.get(), 5.0);
    }

    #[test]
    fn test_pattern_assembly_matches_scenario() {
        let mut row_ptr = vec![0u32; 4];
        let mut col_idx = vec![0u32; 5];
        let mut values = vec![0.0f32; 5];
        {
            let viewer = CsrViewMut::new(&mut row_ptr, &mut col_idx, &mut values, 3, 3);
            viewer.place_row(0, 0);
            viewer.place_row(1, 2);
            viewer.place_row(2, 3);
            viewer.place_tail();

            viewer.place_col_value(0, 0, 0, 1.0);
            viewer.place_col_value(0, 1, 2, 2.0);
            viewer.place_col_value(1, 0, 1, 3.0);
            viewer.place_col_value(2, 0, 0, 4.0);
            viewer.place_col_value(2, 1, 2, 5.0);
        }
        let (expected_ptr, expected_cols, expected_values) = scenario();
        assert_eq!(row_ptr, expected_ptr);
        assert_eq!(col_idx, expected_cols);
        assert_eq!(values, expected_values);
    }

    #[test]
    fn test_row_nnz_is_zero_for_partially_placed_rows() {
        let mut row_ptr = vec![0u32; 4];
        let mut col_idx = vec![0u32; 5];
        let mut values = vec![0.0f32; 5];
        let viewer = CsrViewMut::new(&mut row_ptr, &mut col_idx, &mut values, 3, 3);
        viewer.place_row(0, 0);
        viewer.place_row(1, 2);

        assert_eq!(viewer.row_nnz(0), 2);
        assert_eq!(viewer.row_nnz(1), 0);
        assert_eq!(viewer.row_nnz(2), 0);
    }

    #[test]
    fn test_place_col_returns_row_relative_offset() {
        let (mut row_ptr, mut col_idx, mut values) = scenario();
        let viewer = CsrViewMut::new(&mut row_ptr, &mut col_idx, &mut values, 3, 3);

        let g = viewer.place_col(2, 1, 1);
        assert_eq!(g, 3 + 1);
        assert_eq!(viewer.ro_elem(2, 1).pos(), (2, 1));

        // addressing the same slot by global offset updates the identical entry
        viewer.place_col_at(g, 0, 9.0);
        let e = viewer.ro_elem(2, 1);
        assert_eq!(e.pos(), (2, 0));
        assert_eq!(e.get(), 9.0);
    }

    #[test]
    fn test_rw_elem_writes_through() {
        let (mut row_ptr, mut col_idx, mut values) = scenario();
        {
            let viewer = CsrViewMut::new(&mut row_ptr, &mut col_idx, &mut values, 3, 3);
            let e = viewer.rw_elem(1, 0);
            assert_eq!(e.pos(), (1, 1));
            e.set(30.0);
            assert_eq!(viewer.at(1, 1), 30.0);

            e.add(0.5);
            assert_eq!(viewer.ro_elem(1, 0).get(), 30.5);
            // column pattern is untouched by value writes
            assert_eq!(viewer.ro_elem(1, 0).pos(), (1, 1));
        }
        assert_eq!(values[2], 30.5);
    }

    #[test]
    fn test_copies_share_storage() {
        let (mut row_ptr, mut col_idx, mut values) = scenario();
        let viewer = CsrViewMut::new(&mut row_ptr, &mut col_idx, &mut values, 3, 3);
        let other = viewer;

        other.rw_elem(0, 1).set(-2.0);
        assert_eq!(viewer.at(0, 2), -2.0);
    }

    #[test]
    fn test_row_iter_follows_storage_order() {
        // unsorted columns are allowed
        let row_ptr = vec![0u32, 3];
        let col_idx = vec![4u32, 0, 2];
        let values = vec![1i32, 2, 3];
        let view = CsrView::new(&row_ptr, &col_idx, &values, 1, 5);

        let entries: Vec<_> = view.row_iter(0).collect();
        assert_eq!(entries, vec![(4, 1), (0, 2), (2, 3)]);
        assert_eq!(view.at(0, 2), 3);
        assert_eq!(view.at(0, 3), 0);
    }

    #[test]
    fn test_empty_rows() {
        let row_ptr = vec![0u32, 0, 0];
        let col_idx: Vec<u32> = Vec::new();
        let values: Vec<f64> = Vec::new();
        let view = CsrView::new(&row_ptr, &col_idx, &values, 2, 2);

        assert_eq!(view.row_nnz(0), 0);
        assert_eq!(view.at(1, 1), 0.0);
        assert_eq!(view.row_iter(1).count(), 0);
    }

    #[test]
    #[cfg(all(debug_assertions, not(feature = "unchecked-viewer")))]
    #[should_panic(expected = "local offset out of range")]
    fn test_ro_elem_rejects_offset_past_row_end() {
        let (row_ptr, col_idx, values) = scenario();
        let view = CsrView::new(&row_ptr, &col_idx, &values, 3, 3);
        // row 1 holds a single entry; offset 1 would alias row 2
        view.ro_elem(1, 1);
    }

    #[test]
    #[cfg(all(debug_assertions, not(feature = "unchecked-viewer")))]
    #[should_panic(expected = "row/col index out of range")]
    fn test_at_rejects_column_out_of_range() {
        let (row_ptr, col_idx, values) = scenario();
        let view = CsrView::new(&row_ptr, &col_idx, &values, 3, 3);
        view.at(0, 3);
    }

    #[test]
    #[cfg(all(debug_assertions, not(feature = "unchecked-viewer")))]
    #[should_panic(expected = "global offset out of range")]
    fn test_place_col_at_rejects_offset_past_nnz() {
        let (mut row_ptr, mut col_idx, mut values) = scenario();
        let viewer = CsrViewMut::new(&mut row_ptr, &mut col_idx, &mut values, 3, 3);
        viewer.place_col_at(5, 0, 1.0);
    }

    #[test]
    #[cfg(all(debug_assertions, not(feature = "unchecked-viewer")))]
    #[should_panic(expected = "inconsistent layout")]
    fn test_new_rejects_short_row_ptr() {
        let row_ptr = vec![0u32, 1];
        let col_idx = vec![0u32];
        let values = vec![1.0f32];
        CsrView::new(&row_ptr, &col_idx, &values, 2, 2);
    }

    #[test]
    fn test_debug_output_names_access_mode() {
        let (row_ptr, col_idx, values) = scenario();
        let view = CsrView::new(&row_ptr, &col_idx, &values, 3, 3);
        let dbg = format!("{:?}", view);
        assert!(dbg.contains("ReadOnly"));
        assert!(dbg.contains("nnz: 5"));
    }
}
