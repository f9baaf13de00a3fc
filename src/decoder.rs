//! QMX-Improved decoder
//!
//! The stream has no header: payload words sit at the front, selector bytes
//! at the back in reverse reading order. Decoding walks two cursors toward
//! each other — payload forward from byte 0, selectors backward from the last
//! byte — and stops once the payload cursor passes the selector cursor. Each
//! selector names a width class and a batch of 1..=16 blocks; the block body
//! dispatches into the SIMD layer.

use crate::encoder::QmxCodec;
use crate::selector::{split_selector, INTS_PER_BLOCK, PAYLOAD_BYTES, WIDTH_CLASSES};
use crate::simd;

/// Extra u32 slots the decode output must carry beyond `expected_count`:
/// the final block writes at full block granularity, up to 255 integers past
/// the last valid one.
pub const DECODE_SLACK_INTS: usize = 256;

impl QmxCodec {
    /// Decompress `src` into `out[..expected_count]`.
    ///
    /// `expected_count` is the integer count handed to the matching
    /// [`encode`](QmxCodec::encode) call — the stream does not store it.
    /// `out` must hold at least `expected_count + DECODE_SLACK_INTS` slots.
    ///
    /// The decoder trusts its input: a corrupt stream yields unspecified
    /// output (impossible selectors are skipped, truncated payloads end the
    /// walk early), never a panic.
    pub fn decode(&self, out: &mut [u32], expected_count: usize, src: &[u8]) {
        debug_assert!(out.len() >= expected_count + DECODE_SLACK_INTS);

        let mut input = 0usize;
        let mut keys = src.len() as isize - 1;
        let mut decoded = 0usize;

        // <= and not <: a final width-0 selector at byte 0 consumes no
        // payload and must still execute once.
        while (input as isize) <= keys {
            let key = src[keys as usize];
            keys -= 1;
            let (width_id, batch) = split_selector(key);
            let width_id = width_id as usize;
            if width_id >= WIDTH_CLASSES {
                log::warn!("impossible selector byte {:#04x}, skipping", key);
                input += 1;
                continue;
            }

            let ints = INTS_PER_BLOCK[width_id];
            let bytes = PAYLOAD_BYTES[width_id];
            for _ in 0..batch {
                if input + bytes > src.len() || decoded + ints > out.len() {
                    return;
                }
                simd::unpack_block(width_id, &src[input..], &mut out[decoded..decoded + ints]);
                input += bytes;
                decoded += ints;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ENCODE_SLACK_BYTES;
    use crate::selector::selector_byte;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn round_trip(src: &[u32]) -> Vec<u32> {
        let mut codec = QmxCodec::new();
        let mut encoded = vec![0u8; src.len() * 4 + ENCODE_SLACK_BYTES];
        let written = codec.encode(&mut encoded, src).unwrap();
        let mut decoded = vec![0u32; src.len() + DECODE_SLACK_INTS];
        codec.decode(&mut decoded, src.len(), &encoded[..written]);
        decoded.truncate(src.len());
        decoded
    }

    fn assert_round_trip(src: &[u32]) {
        assert_eq!(round_trip(src), src, "round trip failed for len {}", src.len());
    }

    #[test]
    fn test_empty_stream_is_a_noop() {
        let codec = QmxCodec::new();
        let mut out = vec![9u32; 256];
        codec.decode(&mut out, 0, &[]);
        assert!(out.iter().all(|&v| v == 9));
    }

    #[test]
    fn test_round_trip_scenarios() {
        assert_round_trip(&[0, 0, 0, 0]);
        assert_round_trip(&[127, 128, 129, 130]);
        assert_round_trip(&[1; 256]);
        assert_round_trip(&[1; 300]);
        assert_round_trip(&[0x1F_FFFF, 0x20_0000, 0x1, 0x1]);
        let ascending: Vec<u32> = (0..16).collect();
        assert_round_trip(&ascending);
    }

    #[test]
    fn test_round_trip_single_values() {
        for &v in &[0u32, 1, 2, 127, 128, 0xFFFF, 0x10000, 0x1F_FFFF, u32::MAX] {
            assert_round_trip(&[v]);
        }
    }

    #[test]
    fn test_round_trip_every_width() {
        // alternate the width's maximum with a smaller value so every group
        // promotes to exactly this width
        for &bits in &[1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 16, 21, 32] {
            let max = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
            for len in [1usize, 4, 17, 64, 300] {
                let src: Vec<u32> = (0..len)
                    .map(|i| if i % 2 == 0 { max } else { max / 2 })
                    .collect();
                assert_round_trip(&src);
            }
        }
    }

    #[test]
    fn test_round_trip_width_transitions() {
        // small values, one spike, back to small: exercises promotion
        // boundaries and multi-run streams
        let mut src = vec![3u32; 500];
        src[128] = u32::MAX;
        src[129] = 0x1F_FFFF;
        assert_round_trip(&src);

        let mut src = vec![1u32; 600];
        for (i, slot) in src.iter_mut().enumerate().skip(256) {
            *slot = (i % 7) as u32;
        }
        assert_round_trip(&src);
    }

    #[test]
    fn test_round_trip_ones_tail() {
        // trailing ones shorter than a width-0 block
        for len in [257usize, 260, 271, 512, 513] {
            assert_round_trip(&vec![1u32; len]);
        }
    }

    #[test]
    fn test_round_trip_long_batches() {
        // more than 16 blocks of one width forces multiple selectors
        let src: Vec<u32> = (0..16 * 20 * 4).map(|i| (i % 250) as u32).collect();
        assert_round_trip(&src);
    }

    #[test]
    fn test_round_trip_random_gaps() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..40 {
            let len = rng.random_range(1..3000);
            let magnitudes = [1u32, 3, 60, 1000, 0xFFFF, 0xFF_FFFF, u32::MAX];
            let magnitude = magnitudes[rng.random_range(0..magnitudes.len())];
            let src: Vec<u32> = (0..len)
                .map(|_| rng.random_range(0..=u64::from(magnitude)) as u32)
                .collect();
            assert_round_trip(&src);
        }
    }

    #[test]
    fn test_round_trip_posting_shaped() {
        // d-gap-like distribution: mostly small gaps with occasional jumps
        let mut rng = StdRng::seed_from_u64(1234);
        let src: Vec<u32> = (0..10_000)
            .map(|_| {
                if rng.random_range(0..100) < 95 {
                    rng.random_range(1..32)
                } else {
                    rng.random_range(1000..100_000)
                }
            })
            .collect();
        assert_round_trip(&src);
    }

    #[test]
    fn test_impossible_selector_is_skipped() {
        // a lone id-15 selector decodes nothing and must not panic
        let codec = QmxCodec::new();
        let mut out = vec![0u32; 512];
        codec.decode(&mut out, 0, &[0xFF]);
        codec.decode(&mut out, 0, &[0xF0, 0xF7, 0xFF]);
    }

    #[test]
    fn test_truncated_payload_ends_walk() {
        // selector promises a 16-byte width-8 block but only 3 payload bytes
        // exist; the decoder must stop, not read past the stream
        let codec = QmxCodec::new();
        let mut out = vec![0u32; 512];
        let stream = [1u8, 2, 3, selector_byte(8, 1)];
        codec.decode(&mut out, 0, &stream);
    }

    #[test]
    fn test_decode_overwrites_only_block_extent() {
        let mut codec = QmxCodec::new();
        let src = [5u32, 6, 7, 8];
        let mut encoded = vec![0u8; 64 + ENCODE_SLACK_BYTES];
        let written = codec.encode(&mut encoded, &src).unwrap();
        // the group promotes to width 4 (one block of 32); the rest of the
        // block decodes as zero padding and nothing past it is touched
        let mut out = vec![77u32; 400];
        codec.decode(&mut out, src.len(), &encoded[..written]);
        assert_eq!(&out[..4], &src);
        assert!(out[4..32].iter().all(|&v| v == 0));
        assert!(out[32..].iter().all(|&v| v == 77));
    }
}
