//! Block pipeline driver.
//!
//! One pass per image: the macroblock grid is walked in row-major order, each
//! cell is sampled into a triple-block and transformed, and the quantized
//! result is committed to the [`JpegData`] at the cell's block index.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::backend::stream::{BlockReader, BlockWriter, RetryPolicy, StreamError};
use crate::backend::{Backend, BlockTransform, StreamTransformEngine};
use crate::block::{MacroblockGrid, TripleBlock};
use crate::config::StreamTopology;
use crate::constants::*;
use crate::data::JpegData;
use crate::errors::*;
use crate::poll::{CancellationFlag, CancellationToken};
use crate::quantization::{ReciprocalTable, DEFAULT_QUANT_TABLE};

/// Checks the raster before anything is allocated or sent to a backend.
pub fn validate(rgb: &[u8], width: usize, height: usize) -> Result<()> {
    if width >= MAX_DIMENSION || height >= MAX_DIMENSION {
        return Err(EncodeError::InvalidDimensions { width, height }.into());
    }

    let expected = NUM_COMPONENTS * width * height;
    if rgb.len() != expected {
        return Err(EncodeError::BufferSizeMismatch {
            expected,
            actual: rgb.len(),
        }
        .into());
    }

    Ok(())
}

/// Encodes with the identity (all ones) quantization table.
pub fn encode_rgb_to_jpeg(
    rgb: &[u8],
    width: usize,
    height: usize,
    backend: Backend,
) -> Result<JpegData> {
    encode_rgb_to_jpeg_with_quant(rgb, width, height, &DEFAULT_QUANT_TABLE, backend)
}

/// Encodes an interleaved RGB raster into quantized coefficients.
///
/// 'quant' holds 64 steps for each of the Y, Cb and Cr components. The
/// backend is consumed: the streaming engine closes its write stream once the
/// last block of the image has been sent.
pub fn encode_rgb_to_jpeg_with_quant(
    rgb: &[u8],
    width: usize,
    height: usize,
    quant: &[i32],
    backend: Backend,
) -> Result<JpegData> {
    validate(rgb, width, height)?;
    let table = ReciprocalTable::new(quant)?;

    debug!(
        "Encoding {}x{} image with the {} backend",
        width,
        height,
        backend.name()
    );

    match backend {
        Backend::Software(mut engine) => encode_blocks(rgb, width, height, &table, &mut engine),
        Backend::Dma(mut engine) => encode_blocks(rgb, width, height, &table, &mut engine),
        Backend::Stream { engine, topology } => {
            encode_streaming(rgb, width, height, &table, engine, topology)
        }
    }
}

fn new_jpeg_data(width: usize, height: usize, table: &ReciprocalTable) -> JpegData {
    let mut jpg = JpegData::for_yuv444(width, height);
    jpg.add_app0_data();
    for (c, q) in jpg.quant.iter_mut().enumerate() {
        q.values = *table.steps(c);
    }

    jpg
}

/// Dispatches and commits every cell in turn through a synchronous
/// transform.
pub fn encode_blocks<T: BlockTransform>(
    rgb: &[u8],
    width: usize,
    height: usize,
    table: &ReciprocalTable,
    transform: &mut T,
) -> Result<JpegData> {
    validate(rgb, width, height)?;

    let grid = MacroblockGrid::new(width, height);
    let mut jpg = new_jpeg_data(width, height, table);

    let mut block = TripleBlock::zero();
    for cell in grid.cells() {
        grid.sample_cell(rgb, &cell, &mut block);
        transform.transform(&mut block)?;
        table.quantize_block(&mut block);
        jpg.set_triple_block(cell.index, &block);
    }

    Ok(jpg)
}

/// First stage of the streaming pipeline: samples every cell and sends it to
/// the transform engine.
pub fn produce_blocks<W: Write>(
    grid: &MacroblockGrid,
    rgb: &[u8],
    writer: &mut BlockWriter<W>,
) -> Result<()> {
    let mut block = TripleBlock::zero();
    for cell in grid.cells() {
        grid.sample_cell(rgb, &cell, &mut block);
        writer.write_block(&block)?;
    }

    Ok(())
}

/// Second stage of the streaming pipeline: receives one transformed block per
/// cell, in grid order, and commits it.
pub fn consume_blocks<R: Read>(
    grid: &MacroblockGrid,
    reader: &mut BlockReader<R>,
    table: &ReciprocalTable,
    jpg: &mut JpegData,
) -> Result<()> {
    let mut block = TripleBlock::zero();
    for cell in grid.cells() {
        reader.read_block(&mut block)?;
        table.quantize_block(&mut block);
        jpg.set_triple_block(cell.index, &block);
    }

    Ok(())
}

/// Runs the two stages of the streaming pipeline concurrently.
pub fn encode_streaming<W: Write + Send, R: Read + Send>(
    rgb: &[u8],
    width: usize,
    height: usize,
    table: &ReciprocalTable,
    engine: StreamTransformEngine<W, R>,
    topology: StreamTopology,
) -> Result<JpegData> {
    validate(rgb, width, height)?;

    let grid = MacroblockGrid::new(width, height);
    let mut jpg = new_jpeg_data(width, height, table);
    let (writer, reader) = engine.into_parts();

    match topology {
        StreamTopology::Threads => run_threads(&grid, rgb, table, writer, reader, &mut jpg)?,
        StreamTopology::Processes => run_processes(&grid, rgb, table, writer, reader, &mut jpg)?,
    }

    Ok(jpg)
}

fn with_cancellation(retry: &RetryPolicy, flag: &CancellationFlag) -> RetryPolicy {
    RetryPolicy {
        max_zero_transfers: retry.max_zero_transfers,
        cancel: Some(Arc::new(flag.clone())),
    }
}

fn is_cancellation(err: &Error) -> bool {
    match err.downcast_ref::<StreamError>() {
        Some(StreamError::Cancelled { .. }) => true,
        _ => false,
    }
}

fn run_threads<W: Write + Send, R: Read + Send>(
    grid: &MacroblockGrid,
    rgb: &[u8],
    table: &ReciprocalTable,
    mut writer: BlockWriter<W>,
    mut reader: BlockReader<R>,
    jpg: &mut JpegData,
) -> Result<()> {
    // Raised by whichever stage fails first. The other stage notices it at its
    // next retry point, or sooner once the failed stage's stream is closed.
    let failed = CancellationFlag::new();
    writer.set_policy(with_cancellation(writer.policy(), &failed));
    reader.set_policy(with_cancellation(reader.policy(), &failed));

    let (produced, consumed) = std::thread::scope(|scope| {
        let producer = scope.spawn(|| {
            let result = produce_blocks(grid, rgb, &mut writer);
            if result.is_err() {
                failed.cancel();
            }

            // Closes the write stream so the engine sees the end of the image.
            drop(writer);
            result
        });

        let consumed = {
            let result = consume_blocks(grid, &mut reader, table, jpg);
            if result.is_err() {
                failed.cancel();
            }

            drop(reader);
            result
        };

        let produced = producer
            .join()
            .unwrap_or_else(|_| Err(err_msg("Producer thread panicked")));

        (produced, consumed)
    });

    match (produced, consumed) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => Err(e),
        (Ok(()), Err(e)) => Err(e),
        (Err(p), Err(c)) => {
            if is_cancellation(&c) {
                Err(p)
            } else {
                Err(c)
            }
        }
    }
}

/// Forked producer process as seen from the consuming parent.
///
/// Acts as the cancellation token of the parent's reader: it is cancelled
/// once the child has ended unsuccessfully. The child is reaped at most once
/// and its status kept for the final check.
struct ProducerProcess {
    pid: Pid,
    status: Mutex<Option<WaitStatus>>,
}

impl ProducerProcess {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            status: Mutex::new(None),
        }
    }

    /// Non-blocking check for the child's exit.
    fn poll(&self) -> Option<WaitStatus> {
        let mut status = match self.status.lock() {
            Ok(v) => v,
            Err(e) => e.into_inner(),
        };
        if status.is_none() {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {}
                Ok(s) => *status = Some(s),
                Err(e) => {
                    error!("Failed to check producer {}: {}", self.pid, e);
                }
            }
        }

        *status
    }

    /// Blocks until the child has exited.
    fn wait(&self) -> Result<WaitStatus> {
        if let Some(status) = self.poll() {
            return Ok(status);
        }

        Ok(waitpid(self.pid, None)?)
    }

    fn kill(&self) {
        if self.poll().is_none() {
            // The child may exit in between.
            let _ = kill(self.pid, Signal::SIGKILL);
        }
    }
}

impl CancellationToken for ProducerProcess {
    fn is_cancelled(&self) -> bool {
        match self.poll() {
            None | Some(WaitStatus::Exited(_, 0)) => false,
            Some(_) => true,
        }
    }
}

fn producer_status_error(status: WaitStatus) -> Option<Error> {
    match status {
        WaitStatus::Exited(_, 0) => None,
        WaitStatus::Exited(_, code) => Some(format_err!(
            "Producer process exited with status {}",
            code
        )),
        other => Some(format_err!("Producer process ended abnormally: {:?}", other)),
    }
}

fn run_processes<W: Write, R: Read>(
    grid: &MacroblockGrid,
    rgb: &[u8],
    table: &ReciprocalTable,
    mut writer: BlockWriter<W>,
    mut reader: BlockReader<R>,
    jpg: &mut JpegData,
) -> Result<()> {
    let fork_result = unsafe { fork() }.map_err(|e| {
        error!("Failed to fork producer process: {}", e);
        e
    })?;

    let child = match fork_result {
        ForkResult::Child => {
            drop(reader);

            let code = match produce_blocks(grid, rgb, &mut writer) {
                Ok(()) => 0,
                Err(e) => {
                    error!("Producer failed: {}", e);
                    1
                }
            };

            drop(writer);
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => Arc::new(ProducerProcess::new(child)),
    };

    drop(writer);

    // A failed producer stops the consumer at its next retry point.
    let producer_failed: Arc<dyn CancellationToken> = child.clone();
    reader.set_policy(RetryPolicy {
        max_zero_transfers: reader.policy().max_zero_transfers,
        cancel: Some(producer_failed),
    });

    let consumed = consume_blocks(grid, &mut reader, table, jpg);
    drop(reader);

    if let Err(e) = &consumed {
        if !is_cancellation(e) {
            error!("Consumer failed: {}. Stopping producer {}", e, child.pid);
            child.kill();
        }
    }

    let status = child.wait()?;
    match (producer_status_error(status), consumed) {
        (None, consumed) => consumed,
        (Some(p), Ok(())) => Err(p),
        (Some(p), Err(c)) => {
            if is_cancellation(&c) {
                Err(p)
            } else {
                Err(c)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareTransform;

    #[test]
    fn rejects_bad_dimensions() {
        let rgb = vec![0u8; 3 * 70000 * 10];
        let err = encode_rgb_to_jpeg(&rgb, 70000, 10, Backend::Software(SoftwareTransform::new()))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EncodeError>(),
            Some(&EncodeError::InvalidDimensions {
                width: 70000,
                height: 10
            })
        );

        assert!(validate(&[], 0, 65536).is_err());
    }

    #[test]
    fn rejects_buffer_size_mismatch() {
        let rgb = vec![0u8; 3 * 8 * 8 - 1];
        let err = encode_rgb_to_jpeg(&rgb, 8, 8, Backend::Software(SoftwareTransform::new()))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EncodeError>(),
            Some(&EncodeError::BufferSizeMismatch {
                expected: 192,
                actual: 191
            })
        );
    }

    #[test]
    fn rejects_bad_quant_table() {
        let rgb = vec![0u8; 3 * 8 * 8];
        let result = encode_rgb_to_jpeg_with_quant(
            &rgb,
            8,
            8,
            &[1; 64],
            Backend::Software(SoftwareTransform::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_image_has_no_blocks() {
        let jpg = encode_rgb_to_jpeg(&[], 0, 0, Backend::Software(SoftwareTransform::new()))
            .unwrap();
        assert_eq!(jpg.num_blocks(), 0);
        assert!(jpg.components.iter().all(|c| c.coeffs.is_empty()));
    }

    #[test]
    fn quant_table_is_recorded() {
        let mut quant = [1; TRIPLE_BLOCK_SIZE];
        quant[64] = 7;
        let rgb = vec![128u8; 3 * 8 * 8];
        let jpg = encode_rgb_to_jpeg_with_quant(
            &rgb,
            8,
            8,
            &quant,
            Backend::Software(SoftwareTransform::new()),
        )
        .unwrap();

        assert_eq!(jpg.quant[0].values[0], 1);
        assert_eq!(jpg.quant[1].values[0], 7);
        assert_eq!(jpg.app_data.len(), 1);
    }

    #[test]
    fn mid_gray_is_all_zero() {
        let rgb = vec![128u8; 3 * 8 * 8];
        let jpg = encode_rgb_to_jpeg(&rgb, 8, 8, Backend::Software(SoftwareTransform::new()))
            .unwrap();
        for comp in &jpg.components {
            assert!(comp.block(0).iter().all(|v| *v == 0));
        }
    }
}
