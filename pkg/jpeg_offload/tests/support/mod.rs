//! In-process stand-in for a streaming transform engine.
//!
//! The engine runs on its own thread behind two OS pipes so the pipeline sees
//! the same blocking byte streams it gets from the real character devices.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::FromRawFd;
use std::thread::JoinHandle;

use jpeg_offload::backend::stream::{decode_block, encode_block};
use jpeg_offload::backend::{BlockTransform, SoftwareTransform, StreamTransformEngine};
use jpeg_offload::block::TripleBlock;
use jpeg_offload::errors::*;

fn pipe_files() -> Result<(File, File)> {
    let (read_fd, write_fd) = nix::unistd::pipe()?;
    Ok(unsafe { (File::from_raw_fd(read_fd), File::from_raw_fd(write_fd)) })
}

pub struct LoopbackEngine {
    thread: JoinHandle<Result<usize>>,
}

impl LoopbackEngine {
    /// Starts an engine applying 'f' to every block it receives. Runs until the
    /// write side of its input is closed.
    pub fn spawn<F>(f: F) -> Result<(Self, StreamTransformEngine)>
    where
        F: FnMut(&mut TripleBlock) + Send + 'static,
    {
        Self::spawn_limited(None, f)
    }

    /// Like spawn() but the engine hangs up on both streams after transforming
    /// 'limit' blocks.
    pub fn spawn_limited<F>(limit: Option<usize>, mut f: F) -> Result<(Self, StreamTransformEngine)>
    where
        F: FnMut(&mut TripleBlock) + Send + 'static,
    {
        let (to_engine_r, to_engine_w) = pipe_files()?;
        let (from_engine_r, from_engine_w) = pipe_files()?;

        let thread = std::thread::spawn(move || -> Result<usize> {
            let mut input = to_engine_r;
            let mut output = from_engine_w;

            let mut data = [0u8; TripleBlock::BYTE_SIZE];
            let mut block = TripleBlock::zero();
            let mut count = 0;
            while Some(count) != limit {
                match input.read_exact(&mut data) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e.into()),
                }

                decode_block(&data, &mut block);
                f(&mut block);
                encode_block(&block, &mut data);
                output.write_all(&data)?;
                count += 1;
            }

            Ok(count)
        });

        Ok((
            Self { thread },
            StreamTransformEngine::from_streams(to_engine_w, from_engine_r),
        ))
    }

    /// Engine computing the real transform.
    pub fn software() -> Result<(Self, StreamTransformEngine)> {
        let mut transform = SoftwareTransform::new();
        Self::spawn(move |block| {
            // The software transform never fails.
            let _ = transform.transform(block);
        })
    }

    /// Engine that upscales each value by 16 like the transform does but
    /// otherwise returns the samples unchanged.
    pub fn scaling() -> Result<(Self, StreamTransformEngine)> {
        Self::spawn(|block| {
            for v in block.iter_mut() {
                *v *= 16;
            }
        })
    }

    /// Waits for the engine to drain and returns the number of blocks it
    /// transformed.
    pub fn join(self) -> Result<usize> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(err_msg("Loopback engine panicked")))
    }
}

/// Stream whose every read or write fails as if the engine had gone away.
pub struct DeadStream;

impl Read for DeadStream {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(ErrorKind::Other, "engine gone"))
    }
}

impl Write for DeadStream {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(ErrorKind::Other, "engine gone"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Deterministic interleaved RGB image.
pub fn random_image(width: usize, height: usize) -> Vec<u8> {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(width as u64 * 31 + height as u64);
    (0..(3 * width * height)).map(|_| rng.gen_range(0, 256) as u8).collect()
}
