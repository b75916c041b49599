extern crate clap;
extern crate jpeg_offload;
#[macro_use]
extern crate tracing;

use std::fs::File;
use std::io::{BufWriter, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use clap::{App, Arg};

use jpeg_offload::config::{parse_quant_table, BackendKind};
use jpeg_offload::errors::*;
use jpeg_offload::{process_rgb, EncoderConfig, JpegData};

/// Writes every component's coefficients in turn as little endian i16 values.
fn write_coefficients<W: Write>(jpg: &JpegData, out: &mut W) -> Result<()> {
    for comp in &jpg.components {
        for v in &comp.coeffs {
            out.write_i16::<LittleEndian>(*v)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let matches = App::new("jpeg_offload")
        .about("Converts raw RGB images to quantized JPEG coefficients")
        .arg(
            Arg::with_name("INPUT_FILE")
                .help("Raw interleaved 8-bit RGB pixels")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("width")
                .long("width")
                .value_name("PIXELS")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("height")
                .long("height")
                .value_name("PIXELS")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG_FILE")
                .help("Path to a json file describing the encoder setup")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("backend")
                .short("b")
                .long("backend")
                .value_name("BACKEND")
                .possible_values(&["software", "dma", "stream"])
                .help("Overrides the transform backend of the config")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("quant")
                .short("q")
                .long("quant")
                .value_name("QUANT_FILE")
                .help("File with 192 quantization steps (Y, Cb then Cr)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("quality")
                .long("quality")
                .value_name("QUALITY")
                .help("Uses the standard tables scaled to this quality (1-100)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("OUTPUT_FILE")
                .help("Where to write the coefficient dump")
                .required(true)
                .takes_value(true),
        )
        .get_matches();

    let mut config = if let Some(path) = matches.value_of("config") {
        EncoderConfig::load(path)?
    } else {
        EncoderConfig::default()
    };

    if let Some(backend) = matches.value_of("backend") {
        config.backend = backend.parse::<BackendKind>()?;
    }

    if let Some(path) = matches.value_of("quant") {
        let text = std::fs::read_to_string(path)?;
        config.quant = Some(parse_quant_table(&text)?);
    }

    if let Some(quality) = matches.value_of("quality") {
        config.quality = Some(quality.parse()?);
    }

    // Presence of required arguments is enforced by clap.
    let width: usize = matches.value_of("width").unwrap_or_default().parse()?;
    let height: usize = matches.value_of("height").unwrap_or_default().parse()?;

    let input = matches.value_of("INPUT_FILE").unwrap_or_default();
    let rgb = std::fs::read(input)?;

    info!("Encoding {} ({}x{})", input, width, height);
    let jpg = process_rgb(&config, &rgb, width, height)?;

    let output = matches.value_of("output").unwrap_or_default();
    let mut out = BufWriter::new(File::create(output)?);
    write_coefficients(&jpg, &mut out)?;

    info!("Wrote {} blocks per component to {}", jpg.num_blocks(), output);
    Ok(())
}
