//! Row-partitioned mutable access to a placed CSR pattern.
//!
//! Once the row offsets are sealed, [`CsrRowsMut`] splits the column-index and
//! value arrays into one disjoint [`CsrRowMut`] per row. Each part owns its
//! `row_ptr[row]..row_ptr[row + 1]` range and is `Send`, so rows can be filled
//! by different workers.
//!
//! ```text
//! row_ptr = [0, 2, 3, 5]
//! col_idx = [a a | b | c c]    row 0 -> [0, 2), row 1 -> [2, 3), row 2 -> [3, 5)
//! ```

use crate::check;
use crate::traits::Scalar;

/// Mutable column indices and values of a single row.
#[derive(Debug)]
pub struct CsrRowMut<'a, T: Scalar> {
    row: usize,
    global_begin: usize,
    col_idx: &'a mut [u32],
    values: &'a mut [T],
}

impl<T: Scalar> CsrRowMut<'_, T> {
    pub fn row(&self) -> usize {
        self.row
    }

    /// Number of entries reserved for the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Global offset of the row's first entry.
    pub fn global_begin(&self) -> usize {
        self.global_begin
    }

    /// Writes `col` and `value` at `local_offset` and returns the global offset.
    #[track_caller]
    pub fn place(&mut self, local_offset: usize, col: usize, value: T) -> usize {
        check::check_local_offset(
            self.row,
            local_offset,
            self.global_begin,
            self.global_begin + self.len(),
        );
        check::check_index(col);
        self.col_idx[local_offset] = col as u32;
        self.values[local_offset] = value;
        self.global_begin + local_offset
    }

    pub fn col_indices(&self) -> &[u32] {
        self.col_idx
    }

    pub fn values(&self) -> &[T] {
        self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        self.values
    }
}

/// Iterator handing out one [`CsrRowMut`] per row, in row order.
#[derive(Debug)]
pub struct CsrRowsMut<'a, T: Scalar> {
    row_ptr: &'a [u32],
    col_idx: &'a mut [u32],
    values: &'a mut [T],
    nnz: usize,
    row: usize,
    // global offset of col_idx[0]
    cursor: usize,
}

impl<'a, T: Scalar> CsrRowsMut<'a, T> {
    /// Splits `col_idx` and `values` along the sealed offsets in `row_ptr`
    /// (`rows + 1` entries).
    #[track_caller]
    pub fn new(row_ptr: &'a [u32], col_idx: &'a mut [u32], values: &'a mut [T]) -> Self {
        let rows = row_ptr.len().saturating_sub(1);
        check::check_layout(rows, row_ptr.len(), col_idx.len(), values.len());
        let nnz = values.len();
        Self {
            row_ptr,
            col_idx,
            values,
            nnz,
            row: 0,
            cursor: 0,
        }
    }

    fn rows(&self) -> usize {
        self.row_ptr.len().saturating_sub(1)
    }
}

impl<'a, T: Scalar> Iterator for CsrRowsMut<'a, T> {
    type Item = CsrRowMut<'a, T>;

    #[track_caller]
    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.rows() {
            return None;
        }
        let row = self.row;
        let begin = self.row_ptr[row] as usize;
        let end = self.row_ptr[row + 1] as usize;
        check::check_row_span(row, begin, end, self.nnz);

        // unchecked builds clamp a bad span to what is left
        let remaining_end = self.cursor + self.values.len();
        let start = begin.clamp(self.cursor, remaining_end);
        let stop = end.clamp(start, remaining_end);
        let skip = start - self.cursor;
        let len = stop - start;

        let (_, col_rest) = std::mem::take(&mut self.col_idx).split_at_mut(skip);
        let (col_idx, col_tail) = col_rest.split_at_mut(len);
        self.col_idx = col_tail;

        let (_, value_rest) = std::mem::take(&mut self.values).split_at_mut(skip);
        let (values, value_tail) = value_rest.split_at_mut(len);
        self.values = value_tail;

        self.cursor = stop;
        self.row += 1;
        Some(CsrRowMut {
            row,
            global_begin: start,
            col_idx,
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows() - self.row;
        (left, Some(left))
    }
}

impl<T: Scalar> ExactSizeIterator for CsrRowsMut<'_, T> {}
