pub use failure::err_msg;
pub use failure::format_err;
pub use failure::Error;
pub use failure::Fail;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Reasons an encode request is rejected before any block is dispatched.
///
/// None of these leave a partially written coefficient object behind.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum EncodeError {
    #[fail(display = "Invalid image dimensions: {}x{}", width, height)]
    InvalidDimensions { width: usize, height: usize },

    #[fail(
        display = "Pixel buffer size mismatch: expected {}, got {}",
        expected, actual
    )]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[fail(display = "Quantization table must have 192 entries, got {}", len)]
    InvalidQuantTable { len: usize },

    #[fail(display = "Quantization step at index {} is not positive", index)]
    ZeroQuantStep { index: usize },
}
