//! Conversion of raw RGB rasters into quantized JPEG coefficients where the
//! 8x8 forward DCT is executed by an external transform engine.
//!
//! The pipeline walks the macroblock grid of the image in row-major order,
//! converts every cell to a Y/Cb/Cr triple-block, hands it to a
//! [`backend::BlockTransform`] (or to the two-stage streaming pipeline) and
//! quantizes the returned coefficients into a [`data::JpegData`].

#[macro_use]
extern crate failure;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate arrayref;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate tracing;

pub mod errors;

pub mod backend;
pub mod block;
pub mod color;
pub mod config;
pub mod constants;
pub mod data;
pub mod dct;
pub mod output_image;
pub mod pipeline;
pub mod poll;
pub mod processor;
pub mod quantization;

pub use backend::{Backend, BlockTransform};
pub use config::EncoderConfig;
pub use data::JpegData;
pub use pipeline::{encode_rgb_to_jpeg, encode_rgb_to_jpeg_with_quant};
pub use processor::process_rgb;
