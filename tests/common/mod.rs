//! Shared test utilities for integration tests.
//!
//! Fixtures under `tests/data/` were produced by XZ Utils (see
//! `generate.py`). [`XzBuilder`] crafts small streams with stored LZMA2
//! chunks for tests that need exact control over headers and sizes.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::Path;

use xzstream::checksum::{Checksum, Crc32, Crc64};
use xzstream::{Action, DecoderConfig, InputCursor, OutputCursor, Status, StreamDecoder};

/// Reads a fixture from `tests/data/`.
pub fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

/// Result of a scheduled decode.
#[derive(Debug)]
pub struct Decoded {
    /// Everything the decoder wrote.
    pub data: Vec<u8>,
    /// Every status returned, in order.
    pub statuses: Vec<Status>,
    /// Input bytes consumed.
    pub consumed: usize,
}

/// Decodes `data` with input and output windows sized by the two closures.
///
/// The input window grows by `in_step()` bytes per call until it reaches
/// the end of `data`; from then on every call passes [`Action::Finish`] with
/// the rest of the input. Stops at the first `StreamEnd` in single-stream
/// mode, or at a `StreamEnd` with no input left when concatenated.
pub fn decode_scheduled(
    data: &[u8],
    config: &DecoderConfig,
    mut in_step: impl FnMut() -> usize,
    mut out_step: impl FnMut() -> usize,
) -> xzstream::Result<Decoded> {
    let mut decoder = StreamDecoder::new(config.clone())?;
    let mut pos = 0;
    let mut finishing = false;
    let mut plain = Vec::new();
    let mut statuses = Vec::new();
    let mut buf = Vec::new();

    loop {
        let end = if finishing {
            data.len()
        } else {
            (pos + in_step().max(1)).min(data.len())
        };
        finishing = end == data.len();
        let action = if finishing { Action::Finish } else { Action::Run };

        buf.clear();
        buf.resize(out_step().max(1), 0);
        let mut input = InputCursor::new(&data[pos..end]);
        let mut output = OutputCursor::new(&mut buf);
        let status = decoder.decode(&mut input, &mut output, action)?;

        // The windows never grow and never move backwards.
        assert!(input.position() <= end - pos);
        pos += input.position();
        plain.extend_from_slice(output.filled());
        statuses.push(status);

        if status == Status::StreamEnd
            && (!config.concatenated || (finishing && pos == data.len()))
        {
            return Ok(Decoded {
                data: plain,
                statuses,
                consumed: pos,
            });
        }
        assert!(
            statuses.len() < 4 * (data.len() + plain.len()) + 64,
            "decoder is not making progress"
        );
    }
}

/// Decodes `data` with fixed window sizes.
pub fn decode_chunked(
    data: &[u8],
    config: &DecoderConfig,
    in_chunk: usize,
    out_chunk: usize,
) -> xzstream::Result<Vec<u8>> {
    decode_scheduled(data, config, || in_chunk, || out_chunk).map(|d| d.data)
}

/// Encodes a variable-length integer.
pub fn put_vli(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push(value as u8 | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Appends the CRC32 of `buf[from..]`.
pub fn push_crc32(buf: &mut Vec<u8>, from: usize) {
    let crc = Crc32::compute(&buf[from..]);
    buf.extend_from_slice(&crc.to_le_bytes());
}

#[derive(Debug, Clone)]
struct BlockSpec {
    data: Vec<u8>,
    dict_prop: u8,
    declare_sizes: bool,
}

/// Builds .xz streams whose blocks hold stored (uncompressed) LZMA2 chunks.
///
/// ```ignore
/// let stream = XzBuilder::new(0x01).block(b"hello").build();
/// ```
#[derive(Debug, Clone)]
pub struct XzBuilder {
    check_id: u8,
    blocks: Vec<BlockSpec>,
}

impl XzBuilder {
    /// Starts a stream with the given check ID.
    pub fn new(check_id: u8) -> Self {
        Self {
            check_id,
            blocks: Vec::new(),
        }
    }

    /// Adds a block decoding to `data`, with a 4 KiB dictionary.
    pub fn block(mut self, data: &[u8]) -> Self {
        self.blocks.push(BlockSpec {
            data: data.to_vec(),
            dict_prop: 0,
            declare_sizes: false,
        });
        self
    }

    /// Sets the LZMA2 dictionary property of the last block.
    pub fn dict_prop(mut self, prop: u8) -> Self {
        if let Some(block) = self.blocks.last_mut() {
            block.dict_prop = prop;
        }
        self
    }

    /// Stores both sizes in the header of the last block.
    pub fn declare_sizes(mut self) -> Self {
        if let Some(block) = self.blocks.last_mut() {
            block.declare_sizes = true;
        }
        self
    }

    fn check_value(&self, data: &[u8]) -> Vec<u8> {
        match self.check_id {
            0x00 => Vec::new(),
            0x01 => Crc32::compute(data).to_le_bytes().to_vec(),
            0x04 => Crc64::compute(data).to_le_bytes().to_vec(),
            #[cfg(feature = "sha256")]
            0x0A => xzstream::checksum::Sha256::compute(data).to_vec(),
            id => vec![0xA5; xzstream::CheckKind::from_id(id).map_or(0, |k| k.size())],
        }
    }

    fn lzma2_stored(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, chunk) in data.chunks(1 << 16).enumerate() {
            out.push(if i == 0 { 0x01 } else { 0x02 });
            out.extend_from_slice(&((chunk.len() - 1) as u16).to_be_bytes());
            out.extend_from_slice(chunk);
        }
        out.push(0x00);
        out
    }

    /// Serializes the stream.
    pub fn build(&self) -> Vec<u8> {
        let flags = [0x00, self.check_id];
        let mut out = vec![0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
        out.extend_from_slice(&flags);
        push_crc32(&mut out, 6);

        let mut records = Vec::new();
        for block in &self.blocks {
            let compressed = Self::lzma2_stored(&block.data);

            let start = out.len();
            let mut header = vec![0x00, if block.declare_sizes { 0xC0 } else { 0x00 }];
            if block.declare_sizes {
                put_vli(&mut header, compressed.len() as u64);
                put_vli(&mut header, block.data.len() as u64);
            }
            header.extend_from_slice(&[0x21, 0x01, block.dict_prop]);
            while (header.len() + 4) % 4 != 0 {
                header.push(0x00);
            }
            header[0] = ((header.len() + 4) / 4 - 1) as u8;
            out.extend_from_slice(&header);
            push_crc32(&mut out, start);
            let header_size = out.len() - start;

            out.extend_from_slice(&compressed);
            while (out.len() - start) % 4 != 0 {
                out.push(0x00);
            }
            let check = self.check_value(&block.data);
            out.extend_from_slice(&check);

            let unpadded = header_size + compressed.len() + check.len();
            records.push((unpadded as u64, block.data.len() as u64));
        }

        let index_start = out.len();
        out.push(0x00);
        put_vli(&mut out, records.len() as u64);
        for &(unpadded, uncompressed) in &records {
            put_vli(&mut out, unpadded);
            put_vli(&mut out, uncompressed);
        }
        while (out.len() - index_start) % 4 != 0 {
            out.push(0x00);
        }
        push_crc32(&mut out, index_start);
        let index_size = out.len() - index_start;

        let footer_start = out.len();
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&((index_size / 4 - 1) as u32).to_le_bytes());
        out.extend_from_slice(&flags);
        let crc = Crc32::compute(&out[footer_start + 4..]);
        out[footer_start..footer_start + 4].copy_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(b"YZ");
        out
    }
}
