use csr_core::{CpuDevice, CsrMatrix, CsrView, CsrViewMut, DeviceCsrMatrix, Matrix, Triplet};
use std::collections::HashMap;

/// Random pattern with unique columns per row, as `(row, col) -> value`.
fn random_entries(rng: &mut fastrand::Rng, rows: usize, cols: usize) -> HashMap<(usize, usize), i32> {
    let mut entries = HashMap::new();
    for row in 0..rows {
        for col in 0..cols {
            if rng.u8(..) < 64 {
                entries.insert((row, col), rng.i32(1..1000));
            }
        }
    }
    entries
}

/// Places the entries row by row, in a shuffled column order per row.
fn assemble(
    rng: &mut fastrand::Rng,
    rows: usize,
    cols: usize,
    entries: &HashMap<(usize, usize), i32>,
) -> (Vec<u32>, Vec<u32>, Vec<i32>) {
    let mut by_row: Vec<Vec<(usize, i32)>> = vec![Vec::new(); rows];
    for (&(row, col), &value) in entries {
        by_row[row].push((col, value));
    }
    for row in &mut by_row {
        rng.shuffle(row);
    }

    let nnz = entries.len();
    let mut row_ptr = vec![0u32; rows + 1];
    let mut col_idx = vec![0u32; nnz];
    let mut values = vec![0i32; nnz];
    {
        let viewer = CsrViewMut::new(&mut row_ptr, &mut col_idx, &mut values, rows, cols);
        let mut offset = 0;
        for (row, row_entries) in by_row.iter().enumerate() {
            viewer.place_row(row, offset);
            offset += row_entries.len();
        }
        viewer.place_tail();
        for (row, row_entries) in by_row.iter().enumerate() {
            for (local, &(col, value)) in row_entries.iter().enumerate() {
                let g = viewer.place_col_value(row, local, col, value);
                assert_eq!(g, viewer.row_range(row).start + local);
            }
        }
    }
    (row_ptr, col_idx, values)
}

#[test]
fn test_random_assembly_properties() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = fastrand::Rng::with_seed(0x5eed);

    for _ in 0..50 {
        let rows = rng.usize(0..12);
        let cols = rng.usize(1..12);
        let entries = random_entries(&mut rng, rows, cols);
        let (row_ptr, col_idx, values) = assemble(&mut rng, rows, cols, &entries);

        // row offsets are monotone and sealed at nnz
        assert_eq!(row_ptr[0], 0);
        assert!(row_ptr.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(row_ptr[rows] as usize, entries.len());

        let view = CsrView::new(&row_ptr, &col_idx, &values, rows, cols);
        for row in 0..rows {
            let expected = entries.keys().filter(|&&(r, _)| r == row).count();
            assert_eq!(view.row_nnz(row), expected);

            // proxies agree with the raw arrays
            for local in 0..view.row_nnz(row) {
                let e = view.ro_elem(row, local);
                let g = row_ptr[row] as usize + local;
                assert_eq!(e.global_offset(), g);
                assert_eq!(e.pos(), (row, col_idx[g] as usize));
                assert_eq!(e.get(), values[g]);
            }

            // dense reads match the source pattern
            for col in 0..cols {
                let expected = entries.get(&(row, col)).copied().unwrap_or(0);
                assert_eq!(view.at(row, col), expected, "at({}, {})", row, col);
            }
        }
    }
}

#[test]
fn test_random_write_through() {
    let mut rng = fastrand::Rng::with_seed(42);
    let rows = 8;
    let cols = 8;
    let entries = random_entries(&mut rng, rows, cols);
    let triplets: Vec<_> = entries
        .iter()
        .map(|(&(r, c), &v)| Triplet::new(r, c, v as f64))
        .collect();
    let host = CsrMatrix::from_triplets(rows, cols, &triplets).unwrap();
    let mut m = DeviceCsrMatrix::from_host(CpuDevice::new(), &host).unwrap();

    let viewer = m.viewer();
    for row in 0..rows {
        for local in 0..viewer.row_nnz(row) {
            let e = viewer.rw_elem(row, local);
            e.set(e.get() * 2.0);
        }
    }

    for (&(r, c), &v) in &entries {
        assert_eq!(m.view().at(r, c), 2.0 * v as f64);
    }
    assert_eq!(m.dims(), (rows, cols));
}

#[test]
fn test_threaded_row_assembly_matches_triplets() {
    let mut rng = fastrand::Rng::with_seed(7);
    let rows = 24;
    let cols = 16;
    let entries = random_entries(&mut rng, rows, cols);

    let mut by_row: Vec<Vec<(usize, i32)>> = vec![Vec::new(); rows];
    for (&(row, col), &value) in &entries {
        by_row[row].push((col, value));
    }
    for row in &mut by_row {
        row.sort_unstable();
    }
    let counts: Vec<usize> = by_row.iter().map(Vec::len).collect();

    let mut assembled = CsrMatrix::with_row_counts(rows, cols, &counts).unwrap();
    let mut parts: Vec<_> = assembled.rows_mut().collect();
    std::thread::scope(|s| {
        for chunk in parts.chunks_mut(5) {
            let by_row = &by_row;
            s.spawn(move || {
                for row in chunk {
                    for (local, &(col, value)) in by_row[row.row()].iter().enumerate() {
                        row.place(local, col, value);
                    }
                }
            });
        }
    });
    drop(parts);

    let triplets: Vec<_> = entries
        .iter()
        .map(|(&(r, c), &v)| Triplet::new(r, c, v))
        .collect();
    let expected = CsrMatrix::from_triplets(rows, cols, &triplets).unwrap();
    assert_eq!(assembled, expected);
}
