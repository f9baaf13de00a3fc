//! Posting-list helpers around the codec
//!
//! The codec itself works on d-gaps. These helpers do what index code usually
//! does around it: turn absolute doc ids into gaps before encoding, undo the
//! transform with a SIMD cumulative sum after decoding, and wrap a stream in
//! a small framed container for callers that persist it standalone (the raw
//! stream stores neither its byte length nor its integer count).

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::decoder::DECODE_SLACK_INTS;
use crate::encoder::{QmxCodec, ENCODE_SLACK_BYTES};
use crate::error::Result;
use crate::simd;

/// Encode a non-decreasing doc-id list as compressed d-gaps.
///
/// The first gap is the first doc id itself.
pub fn encode_postings(codec: &mut QmxCodec, doc_ids: &[u32]) -> Result<Vec<u8>> {
    let mut gaps = Vec::with_capacity(doc_ids.len());
    let mut prev = 0u32;
    for &doc_id in doc_ids {
        gaps.push(doc_id.wrapping_sub(prev));
        prev = doc_id;
    }

    let mut out = vec![0u8; doc_ids.len() * 4 + ENCODE_SLACK_BYTES];
    let written = codec.encode(&mut out, &gaps)?;
    out.truncate(written);
    Ok(out)
}

/// Decode `count` doc ids from a stream produced by [`encode_postings`].
pub fn decode_postings(codec: &QmxCodec, src: &[u8], count: usize) -> Vec<u32> {
    let mut out = vec![0u32; count + DECODE_SLACK_INTS];
    codec.decode(&mut out, count, src);
    simd::cumulative_sum(&mut out, count);
    out.truncate(count);
    out
}

/// Write a stream with its integer count and byte length up front.
pub fn write_framed<W: Write>(writer: &mut W, count: u32, stream: &[u8]) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(count)?;
    writer.write_u32::<LittleEndian>(stream.len() as u32)?;
    writer.write_all(stream)
}

/// Read a framed stream back; returns the integer count and the bytes.
pub fn read_framed<R: Read>(reader: &mut R) -> io::Result<(u32, Vec<u8>)> {
    let count = reader.read_u32::<LittleEndian>()?;
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut stream = vec![0u8; len];
    reader.read_exact(&mut stream)?;
    Ok((count, stream))
}
