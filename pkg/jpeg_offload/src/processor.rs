use std::time::Instant;

use crate::backend::{Backend, DmaTransformEngine, SoftwareTransform, StreamTransformEngine};
use crate::config::{BackendKind, EncoderConfig};
use crate::data::JpegData;
use crate::errors::*;
use crate::pipeline::encode_rgb_to_jpeg_with_quant;

/// Sets up the transform backend selected by 'config'.
///
/// The hardware DMA backend falls back to the software transform if the
/// device can't be set up. The streaming backend has no fallback.
pub fn build_backend(config: &EncoderConfig) -> Result<Backend> {
    Ok(match config.backend {
        BackendKind::Software => Backend::Software(SoftwareTransform::new()),
        BackendKind::Dma => match DmaTransformEngine::open(&config.dma) {
            Ok(engine) => Backend::Dma(engine),
            Err(e) => {
                warn!("Hardware transform unavailable ({}). Using software transform", e);
                Backend::Software(SoftwareTransform::new())
            }
        },
        BackendKind::Stream => Backend::Stream {
            engine: StreamTransformEngine::open(&config.stream)?,
            topology: config.stream.topology,
        },
    })
}

/// Encodes an RGB raster with an already built backend and checks the
/// result.
pub fn process_rgb_with_backend(
    config: &EncoderConfig,
    backend: Backend,
    rgb: &[u8],
    width: usize,
    height: usize,
) -> Result<JpegData> {
    let quant = config.quant_table();

    let start = Instant::now();
    let jpg = encode_rgb_to_jpeg_with_quant(rgb, width, height, &quant, backend).map_err(|e| {
        error!("Could not create jpg data from rgb pixels: {}", e);
        e
    })?;
    info!(
        "Took {} seconds to encode JPEG",
        start.elapsed().as_secs_f64()
    );

    if !jpg.check_sanity() {
        return Err(err_msg("Encoded coefficients are out of range"));
    }

    Ok(jpg)
}

/// Encodes an RGB raster using the backend and quantization described by
/// 'config'.
pub fn process_rgb(
    config: &EncoderConfig,
    rgb: &[u8],
    width: usize,
    height: usize,
) -> Result<JpegData> {
    let backend = build_backend(config)?;
    process_rgb_with_backend(config, backend, rgb, width, height)
}
