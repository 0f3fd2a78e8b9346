//! Bounds diagnostics for the CSR viewer.
//!
//! All viewer checks funnel through [`CHECKED`]. Debug builds keep them, release
//! builds compile them out unless the `checked-viewer` feature is enabled, and
//! `unchecked-viewer` strips them everywhere. A violation is a programming error:
//! it is logged and the current unit of work panics.

use thiserror::Error;

/// Whether viewer bounds diagnostics are compiled in.
pub const CHECKED: bool = cfg!(all(
    any(debug_assertions, feature = "checked-viewer"),
    not(feature = "unchecked-viewer")
));

/// A violated viewer bound, with the observed values.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerViolation {
    #[error("csr: row/col index out of range: index=({row},{col}) dim=({rows},{cols})")]
    RowColOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("csr: row index out of range: index={row} rows={rows}")]
    RowOutOfRange { row: usize, rows: usize },

    #[error(
        "csr: local offset out of range: row={row}, offset={offset}, \
         row_ptr[row]={row_begin}, row_ptr[row+1]={row_end}"
    )]
    LocalOffsetOutOfRange {
        row: usize,
        offset: usize,
        row_begin: usize,
        row_end: usize,
    },

    #[error("csr: global offset out of range: global_offset={global_offset}, nnz={nnz}")]
    GlobalOffsetOutOfRange { global_offset: usize, nnz: usize },

    #[error(
        "csr: inconsistent layout: rows={rows}, row_ptr.len()={row_ptr_len}, \
         col_idx.len()={col_idx_len}, values.len()={values_len}"
    )]
    LayoutMismatch {
        rows: usize,
        row_ptr_len: usize,
        col_idx_len: usize,
        values_len: usize,
    },

    #[error("csr: index does not fit in u32: value={value}")]
    IndexOverflow { value: usize },

    #[error(
        "csr: invalid row span: row={row}, row_ptr[row]={row_begin}, \
         row_ptr[row+1]={row_end}, nnz={nnz}"
    )]
    RowSpanOutOfRange {
        row: usize,
        row_begin: usize,
        row_end: usize,
        nnz: usize,
    },
}

#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn report(violation: ViewerViolation) -> ! {
    log::error!("{}", violation);
    panic!("{}", violation);
}

#[inline(always)]
#[track_caller]
pub(crate) fn check_row(row: usize, rows: usize) {
    if CHECKED && row >= rows {
        report(ViewerViolation::RowOutOfRange { row, rows });
    }
}

#[inline(always)]
#[track_caller]
pub(crate) fn check_range(row: usize, col: usize, rows: usize, cols: usize) {
    if CHECKED && (row >= rows || col >= cols) {
        report(ViewerViolation::RowColOutOfRange {
            row,
            col,
            rows,
            cols,
        });
    }
}

#[inline(always)]
#[track_caller]
pub(crate) fn check_local_offset(row: usize, offset: usize, row_begin: usize, row_end: usize) {
    if CHECKED && offset >= row_end.saturating_sub(row_begin) {
        report(ViewerViolation::LocalOffsetOutOfRange {
            row,
            offset,
            row_begin,
            row_end,
        });
    }
}

#[inline(always)]
#[track_caller]
pub(crate) fn check_global_offset(global_offset: usize, nnz: usize) {
    if CHECKED && global_offset >= nnz {
        report(ViewerViolation::GlobalOffsetOutOfRange { global_offset, nnz });
    }
}

#[inline(always)]
#[track_caller]
pub(crate) fn check_layout(rows: usize, row_ptr_len: usize, col_idx_len: usize, values_len: usize) {
    if CHECKED && (row_ptr_len != rows + 1 || col_idx_len != values_len) {
        report(ViewerViolation::LayoutMismatch {
            rows,
            row_ptr_len,
            col_idx_len,
            values_len,
        });
    }
}

#[inline(always)]
#[track_caller]
pub(crate) fn check_index(value: usize) {
    if CHECKED && u32::try_from(value).is_err() {
        report(ViewerViolation::IndexOverflow { value });
    }
}

/// A sealed row must satisfy `row_begin <= row_end <= nnz`.
#[inline(always)]
#[track_caller]
pub(crate) fn check_row_span(row: usize, row_begin: usize, row_end: usize, nnz: usize) {
    if CHECKED && (row_begin > row_end || row_end > nnz) {
        report(ViewerViolation::RowSpanOutOfRange {
            row,
            row_begin,
            row_end,
            nnz,
        });
    }
}
