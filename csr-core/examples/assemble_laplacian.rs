use csr_core::{
    CpuDevice, CsrCoreError, CsrMatrix, Device, DeviceCsrMatrix, GpuDevice, Matrix,
};
use std::time::Instant;

/// Assembles the 2D five-point Laplacian on an `n x n` grid through the
/// placement API: sizes first, then row offsets, then columns and values.
async fn assemble<D: Device>(device: D, n: usize) -> Result<DeviceCsrMatrix<D, f32>, CsrCoreError> {
    let rows = n * n;
    let row_len = |i: usize, j: usize| {
        1 + usize::from(i > 0) + usize::from(i + 1 < n) + usize::from(j > 0) + usize::from(j + 1 < n)
    };
    let nnz: usize = (0..n).flat_map(|i| (0..n).map(move |j| (i, j))).map(|(i, j)| row_len(i, j)).sum();

    let mut m = DeviceCsrMatrix::new(device);
    m.reshape(rows, rows);
    m.resize_nnz(nnz);

    m.with_viewer(|viewer| {
        let mut offset = 0;
        for i in 0..n {
            for j in 0..n {
                viewer.place_row(i * n + j, offset);
                offset += row_len(i, j);
            }
        }
        viewer.place_tail();

        for i in 0..n {
            for j in 0..n {
                let row = i * n + j;
                let mut neighbours = vec![(row, 4.0)];
                if i > 0 {
                    neighbours.push((row - n, -1.0));
                }
                if i + 1 < n {
                    neighbours.push((row + n, -1.0));
                }
                if j > 0 {
                    neighbours.push((row - 1, -1.0));
                }
                if j + 1 < n {
                    neighbours.push((row + 1, -1.0));
                }
                for (local, (col, value)) in neighbours.into_iter().enumerate() {
                    viewer.place_col_value(row, local, col, value);
                }
            }
        }
    })
    .await?;

    Ok(m)
}

fn main() -> Result<(), CsrCoreError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu", log::LevelFilter::Off)
        .init();

    let n = 64;

    let start = Instant::now();
    let cpu = pollster::block_on(assemble(CpuDevice::new(), n))?;
    let descr = cpu.descriptor()?;
    log::info!(
        "CPU: assembled {}x{} Laplacian with {} entries in {:?} (descriptor {:?})",
        cpu.rows(),
        cpu.cols(),
        cpu.nnz(),
        start.elapsed(),
        descr.id()
    );
    let view = cpu.view();
    log::info!("A[0,0]={} A[0,1]={} A[0,2]={}", view.at(0, 0), view.at(0, 1), view.at(0, 2));

    match GpuDevice::new_blocking() {
        Ok(gpu) => {
            let start = Instant::now();
            let m = pollster::block_on(assemble(gpu.clone(), n))?;
            let layout = *m.descriptor()?.layout();
            let host: CsrMatrix<f32> = pollster::block_on(m.download())?;
            let stats = gpu.get_transfer_stats();
            log::info!(
                "GPU: {:?} in {:?}, matches CPU: {}",
                layout,
                start.elapsed(),
                host.values() == cpu.values().as_slice()
            );
            log::info!(
                "Transfers: {} bytes to GPU, {} bytes from GPU",
                stats.bytes_to_gpu,
                stats.bytes_from_gpu
            );
        }
        Err(e) => log::warn!("No GPU available, skipping device run: {}", e),
    }

    Ok(())
}
