use crate::error::CsrCoreError;
#[cfg(feature = "rayon")]
use crate::rows::CsrRowMut;
use crate::rows::CsrRowsMut;
use crate::traits::{Matrix, Scalar};
use crate::viewer::{CsrView, CsrViewMut};
#[cfg(feature = "rayon")]
use rayon::prelude::{IndexedParallelIterator, IntoParallelIterator};
use serde::{Deserialize, Serialize};

/// Represents a sparse matrix in Compressed Sparse Row (CSR) format on the host.
///
/// Used as the staging format for [`crate::DeviceCsrMatrix`] uploads and
/// downloads. Deserialization goes through [`CsrMatrix::from_csr`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "CsrMatrixRepr<T>",
    bound(deserialize = "T: Deserialize<'de>")
)]
pub struct CsrMatrix<T: Scalar> {
    rows: usize,
    cols: usize,
    /// Non-zero values, `nnz` entries.
    pub(crate) values: Vec<T>,
    /// Column index of each value.
    pub(crate) col_indices: Vec<u32>,
    /// `rows + 1` entries. `row_ptr[i]` is the offset of row `i` in `values`
    /// and `row_ptr[rows]` equals nnz.
    pub(crate) row_ptr: Vec<u32>,
}

// Unvalidated wire form of `CsrMatrix`.
#[derive(Deserialize)]
struct CsrMatrixRepr<T> {
    rows: usize,
    cols: usize,
    values: Vec<T>,
    col_indices: Vec<u32>,
    row_ptr: Vec<u32>,
}

impl<T: Scalar> TryFrom<CsrMatrixRepr<T>> for CsrMatrix<T> {
    type Error = CsrCoreError;

    fn try_from(repr: CsrMatrixRepr<T>) -> Result<Self, Self::Error> {
        Self::from_csr(repr.rows, repr.cols, repr.values, repr.col_indices, repr.row_ptr)
    }
}

fn index_fits(name: &str, value: usize) -> Result<(), CsrCoreError> {
    if u32::try_from(value).is_err() {
        return Err(CsrCoreError::InvalidDimensions(format!(
            "{} ({}) does not fit in a u32 index",
            name, value
        )));
    }
    Ok(())
}

impl<T: Scalar> CsrMatrix<T> {
    /// Creates a new empty CsrMatrix with given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptr: vec![0; rows + 1],
        }
    }

    /// Assembles a matrix from `(row, col, value)` entries.
    ///
    /// Entries are ordered by row, then column. Duplicates are kept as
    /// separate stored entries.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[Triplet<T>],
    ) -> Result<Self, CsrCoreError> {
        for t in triplets {
            if t.row >= rows {
                return Err(CsrCoreError::InvalidDimensions(format!(
                    "Row index out of bounds: {} >= {}",
                    t.row, rows
                )));
            }
            if t.col >= cols {
                return Err(CsrCoreError::InvalidDimensions(format!(
                    "Column index out of bounds: {} >= {}",
                    t.col, cols
                )));
            }
        }
        let mut coords = triplets.to_vec();
        coords.sort_by_key(|t| (t.row, t.col));

        let mut row_counts = vec![0usize; rows];
        for t in &coords {
            row_counts[t.row] += 1;
        }

        let mut matrix = Self::with_row_counts(rows, cols, &row_counts)?;
        let viewer = matrix.view_mut();
        let mut local = 0;
        let mut current_row = 0;
        for t in &coords {
            if t.row != current_row {
                current_row = t.row;
                local = 0;
            }
            viewer.place_col_value(t.row, local, t.col, t.value);
            local += 1;
        }

        log::debug!(
            "Assembled {}x{} CSR matrix with {} entries",
            rows,
            cols,
            matrix.nnz()
        );
        Ok(matrix)
    }

    /// Creates a matrix whose row offsets are sealed from per-row entry
    /// counts, with zeroed columns and values ready to be filled through
    /// [`CsrMatrix::rows_mut`] or [`CsrMatrix::view_mut`].
    pub fn with_row_counts(
        rows: usize,
        cols: usize,
        row_counts: &[usize],
    ) -> Result<Self, CsrCoreError> {
        if row_counts.len() != rows {
            return Err(CsrCoreError::InvalidDimensions(format!(
                "expected {} row counts, got {}",
                rows,
                row_counts.len()
            )));
        }
        let nnz: usize = row_counts.iter().sum();
        index_fits("nnz", nnz)?;
        index_fits("cols", cols)?;

        let mut matrix = Self {
            rows,
            cols,
            values: vec![T::zero(); nnz],
            col_indices: vec![0; nnz],
            row_ptr: vec![0; rows + 1],
        };
        let viewer = matrix.view_mut();
        let mut offset = 0;
        for (row, count) in row_counts.iter().enumerate() {
            viewer.place_row(row, offset);
            offset += count;
        }
        viewer.place_tail();
        Ok(matrix)
    }

    /// Creates a CsrMatrix from CSR components, validating the layout.
    pub fn from_csr(
        rows: usize,
        cols: usize,
        values: Vec<T>,
        col_indices: Vec<u32>,
        row_ptr: Vec<u32>,
    ) -> Result<Self, CsrCoreError> {
        if rows.checked_add(1) != Some(row_ptr.len()) {
            return Err(CsrCoreError::InvalidDimensions(
                "row_ptr length must be rows + 1".to_string(),
            ));
        }
        if values.len() != col_indices.len() {
            return Err(CsrCoreError::InvalidDimensions(
                "values and col_indices must have the same length".to_string(),
            ));
        }
        if row_ptr[0] != 0 {
            return Err(CsrCoreError::InvalidDimensions(
                "First element of row_ptr must be zero".to_string(),
            ));
        }
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(CsrCoreError::InvalidDimensions(
                "row_ptr must be non-decreasing".to_string(),
            ));
        }
        if row_ptr[rows] as usize != values.len() {
            return Err(CsrCoreError::InvalidDimensions(
                "Last element of row_ptr must equal the number of non-zero values".to_string(),
            ));
        }
        if col_indices.iter().any(|&c| c as usize >= cols) {
            return Err(CsrCoreError::InvalidDimensions(
                "Column index out of bounds".to_string(),
            ));
        }

        Ok(Self {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        })
    }

    /// Creates a CsrMatrix from a dense row-major grid, storing the entries
    /// that differ from zero.
    pub fn from_dense(dense: &[Vec<T>]) -> Result<Self, CsrCoreError> {
        let rows = dense.len();
        let cols = dense.first().map_or(0, |row| row.len());
        if dense.iter().any(|row| row.len() != cols) {
            return Err(CsrCoreError::InvalidDimensions(
                "Input dense matrix must be rectangular".to_string(),
            ));
        }
        index_fits("cols", cols)?;

        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptr = Vec::with_capacity(rows + 1);
        row_ptr.push(0);
        for row_vec in dense {
            for (c, &val) in row_vec.iter().enumerate() {
                if !val.is_zero() {
                    values.push(val);
                    col_indices.push(c as u32);
                }
            }
            index_fits("nnz", values.len())?;
            row_ptr.push(values.len() as u32);
        }
        Self::from_csr(rows, cols, values, col_indices, row_ptr)
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the number of non-zero elements.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Gets the value at a specific row and column, `None` when it is not
    /// stored or out of bounds. Linear in the row length.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.view()
            .row_iter(row)
            .find(|&(c, _)| c == col)
            .map(|(_, v)| v)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn col_indices(&self) -> &[u32] {
        &self.col_indices
    }

    pub fn row_ptr(&self) -> &[u32] {
        &self.row_ptr
    }

    pub fn view(&self) -> CsrView<'_, T> {
        CsrView::new(
            &self.row_ptr,
            &self.col_indices,
            &self.values,
            self.rows,
            self.cols,
        )
    }

    pub fn view_mut(&mut self) -> CsrViewMut<'_, T> {
        CsrViewMut::new(
            &mut self.row_ptr,
            &mut self.col_indices,
            &mut self.values,
            self.rows,
            self.cols,
        )
    }

    /// One disjoint mutable part per row, each `Send`.
    pub fn rows_mut(&mut self) -> CsrRowsMut<'_, T> {
        CsrRowsMut::new(&self.row_ptr, &mut self.col_indices, &mut self.values)
    }

    /// Parallel iterator over the rows, for multi-threaded assembly.
    #[cfg(feature = "rayon")]
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = CsrRowMut<'_, T>> {
        self.rows_mut().collect::<Vec<_>>().into_par_iter()
    }

    /// Stored entries in row-major storage order.
    pub fn iter(&self) -> impl Iterator<Item = Triplet<T>> + '_ {
        let view = self.view();
        (0..self.rows).flat_map(move |row| {
            view.row_iter(row)
                .map(move |(col, value)| Triplet { row, col, value })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triplet<T: Scalar> {
    row: usize,
    col: usize,
    value: T,
}

impl<T: Scalar> Triplet<T> {
    pub fn new(row: usize, col: usize, value: T) -> Self {
        Triplet { row, col, value }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn value(&self) -> T {
        self.value
    }
}

impl<T: Scalar> Matrix for CsrMatrix<T> {
    type Value = T;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}
