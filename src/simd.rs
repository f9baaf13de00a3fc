//! SIMD kernels for QMX block decoding
//!
//! One function per width class, operating on whole blocks:
//! - **Lane extraction**: mask and shift a 128-bit register to peel four
//!   integers at a time out of packed 32-bit lanes (widths 1-6, 10), with a
//!   straddle combine across the word pair for the 64-bit-lane widths
//!   (7, 9, 12, 21)
//! - **Zero extension**: widen packed bytes / half-words to u32 (widths 8, 16)
//! - **Copy**: width 32 passes through verbatim; width 0 fills ones
//!
//! Also hosts the in-place cumulative sum used to turn decoded d-gaps back
//! into absolute values.
//!
//! Supports:
//! - **NEON** on aarch64 (Apple Silicon, ARM servers)
//! - **SSE2/SSE4.1** on x86_64 (Intel/AMD)
//! - **Scalar fallback** with bit-identical output for other architectures

use crate::selector::{INTS_PER_BLOCK, PAYLOAD_BYTES, WIDTH_CLASSES};

// ============================================================================
// SSE intrinsics for x86_64 (Intel/AMD)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod sse {
    use std::arch::x86_64::*;

    /// Decode one block of the given width class.
    ///
    /// SAFETY: caller guarantees `input` holds the block's payload bytes and
    /// `output` holds the block's integer count.
    #[target_feature(enable = "sse2", enable = "sse4.1")]
    pub unsafe fn unpack_block(width_id: usize, input: &[u8], output: &mut [u32]) {
        match width_id {
            0 => unpack_ones(output),
            1 => unpack_1bit(input, output),
            2 => unpack_2bit(input, output),
            3 => unpack_3bit(input, output),
            4 => unpack_4bit(input, output),
            5 => unpack_5bit(input, output),
            6 => unpack_6bit(input, output),
            7 => unpack_7bit(input, output),
            8 => unpack_8bit(input, output),
            9 => unpack_9bit(input, output),
            10 => unpack_10bit(input, output),
            11 => unpack_12bit(input, output),
            12 => unpack_16bit(input, output),
            13 => unpack_21bit(input, output),
            _ => unpack_32bit(input, output),
        }
    }

    /// Width 0 consumes no payload: 256 copies of the constant 1
    #[target_feature(enable = "sse2")]
    unsafe fn unpack_ones(output: &mut [u32]) {
        let ones = _mm_set1_epi32(1);
        let out = output.as_mut_ptr();
        for k in 0..64 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, ones);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_1bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x1);
        let mut reg = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        for k in 0..32 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 1);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_2bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x3);
        let mut reg = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        for k in 0..16 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 2);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_3bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x7);
        let mut reg = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        for k in 0..10 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 3);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_4bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0xF);
        let mut reg = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        for k in 0..8 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 4);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_5bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x1F);
        let mut reg = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        for k in 0..6 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 5);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_6bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x3F);
        let mut reg = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        for k in 0..5 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 6);
        }
    }

    /// 36 integers across two words; the fifth extraction straddles the pair
    #[target_feature(enable = "sse2")]
    unsafe fn unpack_7bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x7F);
        let word0 = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let word1 = _mm_loadu_si128(input.as_ptr().add(16) as *const __m128i);
        let out = output.as_mut_ptr();
        let mut reg = word0;
        for k in 0..4 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 7);
        }
        // low 4 bits from word 0, high 3 from word 1
        let straddle = _mm_or_si128(reg, _mm_slli_epi32(word1, 4));
        _mm_storeu_si128(out.add(16) as *mut __m128i, _mm_and_si128(straddle, mask));
        let mut reg = _mm_srli_epi32(word1, 3);
        for k in 5..9 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 7);
        }
    }

    #[target_feature(enable = "sse2", enable = "sse4.1")]
    unsafe fn unpack_8bit(input: &[u8], output: &mut [u32]) {
        let bytes = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        _mm_storeu_si128(out as *mut __m128i, _mm_cvtepu8_epi32(bytes));
        _mm_storeu_si128(
            out.add(4) as *mut __m128i,
            _mm_cvtepu8_epi32(_mm_srli_si128(bytes, 4)),
        );
        _mm_storeu_si128(
            out.add(8) as *mut __m128i,
            _mm_cvtepu8_epi32(_mm_srli_si128(bytes, 8)),
        );
        _mm_storeu_si128(
            out.add(12) as *mut __m128i,
            _mm_cvtepu8_epi32(_mm_srli_si128(bytes, 12)),
        );
    }

    /// 28 integers across two words; the fourth extraction straddles the pair
    #[target_feature(enable = "sse2")]
    unsafe fn unpack_9bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x1FF);
        let word0 = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let word1 = _mm_loadu_si128(input.as_ptr().add(16) as *const __m128i);
        let out = output.as_mut_ptr();
        let mut reg = word0;
        for k in 0..3 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 9);
        }
        // low 5 bits from word 0, high 4 from word 1
        let straddle = _mm_or_si128(reg, _mm_slli_epi32(word1, 5));
        _mm_storeu_si128(out.add(12) as *mut __m128i, _mm_and_si128(straddle, mask));
        let mut reg = _mm_srli_epi32(word1, 4);
        for k in 4..7 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 9);
        }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_10bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x3FF);
        let mut reg = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        for k in 0..3 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 10);
        }
    }

    /// 20 integers across two words; the third extraction straddles the pair
    #[target_feature(enable = "sse2")]
    unsafe fn unpack_12bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0xFFF);
        let word0 = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let word1 = _mm_loadu_si128(input.as_ptr().add(16) as *const __m128i);
        let out = output.as_mut_ptr();
        let mut reg = word0;
        for k in 0..2 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 12);
        }
        // low 8 bits from word 0, high 4 from word 1
        let straddle = _mm_or_si128(reg, _mm_slli_epi32(word1, 8));
        _mm_storeu_si128(out.add(8) as *mut __m128i, _mm_and_si128(straddle, mask));
        let mut reg = _mm_srli_epi32(word1, 4);
        for k in 3..5 {
            _mm_storeu_si128(out.add(k * 4) as *mut __m128i, _mm_and_si128(reg, mask));
            reg = _mm_srli_epi32(reg, 12);
        }
    }

    #[target_feature(enable = "sse2", enable = "sse4.1")]
    unsafe fn unpack_16bit(input: &[u8], output: &mut [u32]) {
        let vals = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let out = output.as_mut_ptr();
        _mm_storeu_si128(out as *mut __m128i, _mm_cvtepu16_epi32(vals));
        _mm_storeu_si128(
            out.add(4) as *mut __m128i,
            _mm_cvtepu16_epi32(_mm_srli_si128(vals, 8)),
        );
    }

    /// 12 integers across two words; the second extraction straddles the pair
    #[target_feature(enable = "sse2")]
    unsafe fn unpack_21bit(input: &[u8], output: &mut [u32]) {
        let mask = _mm_set1_epi32(0x1F_FFFF);
        let word0 = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        let word1 = _mm_loadu_si128(input.as_ptr().add(16) as *const __m128i);
        let out = output.as_mut_ptr();
        _mm_storeu_si128(out as *mut __m128i, _mm_and_si128(word0, mask));
        // low 11 bits from word 0, high 10 from word 1
        let straddle = _mm_or_si128(_mm_srli_epi32(word0, 21), _mm_slli_epi32(word1, 11));
        _mm_storeu_si128(out.add(4) as *mut __m128i, _mm_and_si128(straddle, mask));
        _mm_storeu_si128(
            out.add(8) as *mut __m128i,
            _mm_and_si128(_mm_srli_epi32(word1, 10), mask),
        );
    }

    #[target_feature(enable = "sse2")]
    unsafe fn unpack_32bit(input: &[u8], output: &mut [u32]) {
        let vals = _mm_loadu_si128(input.as_ptr() as *const __m128i);
        _mm_storeu_si128(output.as_mut_ptr() as *mut __m128i, vals);
    }

    /// SIMD prefix sum for 4 u32 values
    /// Input:  [a, b, c, d]
    /// Output: [a, a+b, a+b+c, a+b+c+d]
    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn prefix_sum_4(v: __m128i) -> __m128i {
        let shifted1 = _mm_slli_si128(v, 4);
        let sum1 = _mm_add_epi32(v, shifted1);
        let shifted2 = _mm_slli_si128(sum1, 8);
        _mm_add_epi32(sum1, shifted2)
    }

    /// In-place inclusive prefix sum over the first `count` values
    #[target_feature(enable = "sse2", enable = "sse4.1")]
    pub unsafe fn cumulative_sum(values: &mut [u32], count: usize) {
        let mut carry = _mm_setzero_si128();
        let chunks = count / 4;

        for chunk in 0..chunks {
            let ptr = values.as_mut_ptr().add(chunk * 4);
            let v = _mm_loadu_si128(ptr as *const __m128i);
            let result = _mm_add_epi32(prefix_sum_4(v), carry);
            _mm_storeu_si128(ptr as *mut __m128i, result);
            // broadcast lane 3 for the next group
            carry = _mm_shuffle_epi32(result, 0xFF);
        }

        let base = chunks * 4;
        let mut sum = _mm_extract_epi32(carry, 0) as u32;
        for value in values[base..count].iter_mut() {
            sum = sum.wrapping_add(*value);
            *value = sum;
        }
    }

    /// Check if SSE4.1 is available at runtime
    #[inline]
    pub fn is_available() -> bool {
        is_x86_feature_detected!("sse4.1")
    }
}

// ============================================================================
// NEON intrinsics for aarch64 (Apple Silicon, ARM servers)
// ============================================================================

#[cfg(target_arch = "aarch64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod neon {
    use std::arch::aarch64::*;

    /// Decode one block of the given width class.
    ///
    /// SAFETY: caller guarantees `input` holds the block's payload bytes and
    /// `output` holds the block's integer count.
    #[target_feature(enable = "neon")]
    pub unsafe fn unpack_block(width_id: usize, input: &[u8], output: &mut [u32]) {
        match width_id {
            0 => unpack_ones(output),
            1 => unpack_1bit(input, output),
            2 => unpack_2bit(input, output),
            3 => unpack_3bit(input, output),
            4 => unpack_4bit(input, output),
            5 => unpack_5bit(input, output),
            6 => unpack_6bit(input, output),
            7 => unpack_7bit(input, output),
            8 => unpack_8bit(input, output),
            9 => unpack_9bit(input, output),
            10 => unpack_10bit(input, output),
            11 => unpack_12bit(input, output),
            12 => unpack_16bit(input, output),
            13 => unpack_21bit(input, output),
            _ => unpack_32bit(input, output),
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_ones(output: &mut [u32]) {
        let ones = vdupq_n_u32(1);
        let out = output.as_mut_ptr();
        for k in 0..64 {
            vst1q_u32(out.add(k * 4), ones);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_1bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x1);
        let mut reg = vld1q_u32(input.as_ptr() as *const u32);
        let out = output.as_mut_ptr();
        for k in 0..32 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 1);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_2bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x3);
        let mut reg = vld1q_u32(input.as_ptr() as *const u32);
        let out = output.as_mut_ptr();
        for k in 0..16 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 2);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_3bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x7);
        let mut reg = vld1q_u32(input.as_ptr() as *const u32);
        let out = output.as_mut_ptr();
        for k in 0..10 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 3);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_4bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0xF);
        let mut reg = vld1q_u32(input.as_ptr() as *const u32);
        let out = output.as_mut_ptr();
        for k in 0..8 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 4);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_5bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x1F);
        let mut reg = vld1q_u32(input.as_ptr() as *const u32);
        let out = output.as_mut_ptr();
        for k in 0..6 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 5);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_6bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x3F);
        let mut reg = vld1q_u32(input.as_ptr() as *const u32);
        let out = output.as_mut_ptr();
        for k in 0..5 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 6);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_7bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x7F);
        let word0 = vld1q_u32(input.as_ptr() as *const u32);
        let word1 = vld1q_u32(input.as_ptr().add(16) as *const u32);
        let out = output.as_mut_ptr();
        let mut reg = word0;
        for k in 0..4 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 7);
        }
        // low 4 bits from word 0, high 3 from word 1
        let straddle = vorrq_u32(reg, vshlq_n_u32(word1, 4));
        vst1q_u32(out.add(16), vandq_u32(straddle, mask));
        let mut reg = vshrq_n_u32(word1, 3);
        for k in 5..9 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 7);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_8bit(input: &[u8], output: &mut [u32]) {
        let bytes = vld1q_u8(input.as_ptr());
        let low16 = vmovl_u8(vget_low_u8(bytes));
        let high16 = vmovl_u8(vget_high_u8(bytes));
        let out = output.as_mut_ptr();
        vst1q_u32(out, vmovl_u16(vget_low_u16(low16)));
        vst1q_u32(out.add(4), vmovl_u16(vget_high_u16(low16)));
        vst1q_u32(out.add(8), vmovl_u16(vget_low_u16(high16)));
        vst1q_u32(out.add(12), vmovl_u16(vget_high_u16(high16)));
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_9bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x1FF);
        let word0 = vld1q_u32(input.as_ptr() as *const u32);
        let word1 = vld1q_u32(input.as_ptr().add(16) as *const u32);
        let out = output.as_mut_ptr();
        let mut reg = word0;
        for k in 0..3 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 9);
        }
        // low 5 bits from word 0, high 4 from word 1
        let straddle = vorrq_u32(reg, vshlq_n_u32(word1, 5));
        vst1q_u32(out.add(12), vandq_u32(straddle, mask));
        let mut reg = vshrq_n_u32(word1, 4);
        for k in 4..7 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 9);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_10bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x3FF);
        let mut reg = vld1q_u32(input.as_ptr() as *const u32);
        let out = output.as_mut_ptr();
        for k in 0..3 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 10);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_12bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0xFFF);
        let word0 = vld1q_u32(input.as_ptr() as *const u32);
        let word1 = vld1q_u32(input.as_ptr().add(16) as *const u32);
        let out = output.as_mut_ptr();
        let mut reg = word0;
        for k in 0..2 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 12);
        }
        // low 8 bits from word 0, high 4 from word 1
        let straddle = vorrq_u32(reg, vshlq_n_u32(word1, 8));
        vst1q_u32(out.add(8), vandq_u32(straddle, mask));
        let mut reg = vshrq_n_u32(word1, 4);
        for k in 3..5 {
            vst1q_u32(out.add(k * 4), vandq_u32(reg, mask));
            reg = vshrq_n_u32(reg, 12);
        }
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_16bit(input: &[u8], output: &mut [u32]) {
        let vals = vld1q_u16(input.as_ptr() as *const u16);
        let out = output.as_mut_ptr();
        vst1q_u32(out, vmovl_u16(vget_low_u16(vals)));
        vst1q_u32(out.add(4), vmovl_u16(vget_high_u16(vals)));
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_21bit(input: &[u8], output: &mut [u32]) {
        let mask = vdupq_n_u32(0x1F_FFFF);
        let word0 = vld1q_u32(input.as_ptr() as *const u32);
        let word1 = vld1q_u32(input.as_ptr().add(16) as *const u32);
        let out = output.as_mut_ptr();
        vst1q_u32(out, vandq_u32(word0, mask));
        // low 11 bits from word 0, high 10 from word 1
        let straddle = vorrq_u32(vshrq_n_u32(word0, 21), vshlq_n_u32(word1, 11));
        vst1q_u32(out.add(4), vandq_u32(straddle, mask));
        vst1q_u32(out.add(8), vandq_u32(vshrq_n_u32(word1, 10), mask));
    }

    #[target_feature(enable = "neon")]
    unsafe fn unpack_32bit(input: &[u8], output: &mut [u32]) {
        let vals = vld1q_u32(input.as_ptr() as *const u32);
        vst1q_u32(output.as_mut_ptr(), vals);
    }

    /// SIMD prefix sum for 4 u32 values
    /// Input:  [a, b, c, d]
    /// Output: [a, a+b, a+b+c, a+b+c+d]
    #[inline]
    #[target_feature(enable = "neon")]
    unsafe fn prefix_sum_4(v: uint32x4_t) -> uint32x4_t {
        let shifted1 = vextq_u32(vdupq_n_u32(0), v, 3);
        let sum1 = vaddq_u32(v, shifted1);
        let shifted2 = vextq_u32(vdupq_n_u32(0), sum1, 2);
        vaddq_u32(sum1, shifted2)
    }

    /// In-place inclusive prefix sum over the first `count` values
    #[target_feature(enable = "neon")]
    pub unsafe fn cumulative_sum(values: &mut [u32], count: usize) {
        let mut carry = vdupq_n_u32(0);
        let chunks = count / 4;

        for chunk in 0..chunks {
            let ptr = values.as_mut_ptr().add(chunk * 4);
            let v = vld1q_u32(ptr);
            let result = vaddq_u32(prefix_sum_4(v), carry);
            vst1q_u32(ptr, result);
            // broadcast lane 3 for the next group
            carry = vdupq_n_u32(vgetq_lane_u32(result, 3));
        }

        let base = chunks * 4;
        let mut sum = vgetq_lane_u32(carry, 0);
        for value in values[base..count].iter_mut() {
            sum = sum.wrapping_add(*value);
            *value = sum;
        }
    }

    /// Check if NEON is available (always true on aarch64)
    #[inline]
    pub fn is_available() -> bool {
        true
    }
}

// ============================================================================
// Scalar fallback implementations
// ============================================================================

mod scalar {
    use crate::selector::{INTS_PER_BLOCK, WIDTH_BITS};

    /// Decode one block of the given width class
    pub fn unpack_block(width_id: usize, input: &[u8], output: &mut [u32]) {
        let ints = INTS_PER_BLOCK[width_id];
        match WIDTH_BITS[width_id] {
            0 => output[..256].fill(1),
            8 => unpack_8bit(input, output),
            16 => unpack_16bit(input, output),
            32 => unpack_32bit(input, output),
            w @ (7 | 9 | 12 | 21) => unpack_lanes64(input, output, u32::from(w), ints),
            w => unpack_lanes32(input, output, u32::from(w), ints),
        }
    }

    #[inline]
    fn load_lane(input: &[u8], lane: usize) -> u32 {
        u32::from_le_bytes([
            input[lane * 4],
            input[lane * 4 + 1],
            input[lane * 4 + 2],
            input[lane * 4 + 3],
        ])
    }

    /// One-word widths: integer `i` sits in lane `i & 3` at bit `(i / 4) * w`
    fn unpack_lanes32(input: &[u8], output: &mut [u32], width: u32, ints: usize) {
        let lanes = [
            load_lane(input, 0),
            load_lane(input, 1),
            load_lane(input, 2),
            load_lane(input, 3),
        ];
        let mask = (1u32 << width) - 1;
        for (i, out) in output[..ints].iter_mut().enumerate() {
            *out = (lanes[i & 3] >> ((i / 4) as u32 * width)) & mask;
        }
    }

    /// Two-word widths: lanes are 64 bits, word 0 low halves, word 1 high
    fn unpack_lanes64(input: &[u8], output: &mut [u32], width: u32, ints: usize) {
        let mut lanes = [0u64; 4];
        for (lane, slot) in lanes.iter_mut().enumerate() {
            *slot = u64::from(load_lane(input, lane)) | u64::from(load_lane(input, 4 + lane)) << 32;
        }
        let mask = (1u64 << width) - 1;
        for (i, out) in output[..ints].iter_mut().enumerate() {
            *out = ((lanes[i & 3] >> ((i / 4) as u32 * width)) & mask) as u32;
        }
    }

    fn unpack_8bit(input: &[u8], output: &mut [u32]) {
        for (out, &byte) in output[..16].iter_mut().zip(input) {
            *out = u32::from(byte);
        }
    }

    fn unpack_16bit(input: &[u8], output: &mut [u32]) {
        for (i, out) in output[..8].iter_mut().enumerate() {
            *out = u32::from(u16::from_le_bytes([input[i * 2], input[i * 2 + 1]]));
        }
    }

    fn unpack_32bit(input: &[u8], output: &mut [u32]) {
        for (i, out) in output[..4].iter_mut().enumerate() {
            *out = u32::from_le_bytes([
                input[i * 4],
                input[i * 4 + 1],
                input[i * 4 + 2],
                input[i * 4 + 3],
            ]);
        }
    }

    /// In-place inclusive prefix sum over the first `count` values
    pub fn cumulative_sum(values: &mut [u32], count: usize) {
        let mut sum = 0u32;
        for value in values[..count].iter_mut() {
            sum = sum.wrapping_add(*value);
            *value = sum;
        }
    }
}

// ============================================================================
// Public dispatch functions that select SIMD or scalar at runtime
// ============================================================================

/// Decode one block: read `PAYLOAD_BYTES[width_id]` bytes from the front of
/// `input` and write `INTS_PER_BLOCK[width_id]` integers to the front of
/// `output`. Scalar and SIMD paths produce bit-identical results.
#[inline]
pub fn unpack_block(width_id: usize, input: &[u8], output: &mut [u32]) {
    assert!(width_id < WIDTH_CLASSES);
    assert!(input.len() >= PAYLOAD_BYTES[width_id]);
    assert!(output.len() >= INTS_PER_BLOCK[width_id]);

    #[cfg(target_arch = "aarch64")]
    {
        if neon::is_available() {
            // SAFETY: slice lengths asserted above; NEON present
            unsafe {
                neon::unpack_block(width_id, input, output);
            }
            return;
        }
    }

    #[cfg(target_arch = "x86_64")]
    {
        if sse::is_available() {
            // SAFETY: slice lengths asserted above; SSE4.1 present
            unsafe {
                sse::unpack_block(width_id, input, output);
            }
            return;
        }
    }

    scalar::unpack_block(width_id, input, output);
}

/// In-place inclusive prefix sum over `values[..count]`.
///
/// Used to turn decoded d-gaps back into absolute doc ids.
#[inline]
pub fn cumulative_sum(values: &mut [u32], count: usize) {
    assert!(count <= values.len());

    #[cfg(target_arch = "aarch64")]
    {
        if neon::is_available() {
            // SAFETY: count asserted in range; NEON present
            unsafe {
                neon::cumulative_sum(values, count);
            }
            return;
        }
    }

    #[cfg(target_arch = "x86_64")]
    {
        if sse::is_available() {
            // SAFETY: count asserted in range; SSE4.1 present
            unsafe {
                sse::cumulative_sum(values, count);
            }
            return;
        }
    }

    scalar::cumulative_sum(values, count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// The SIMD paths must match the scalar path byte-for-byte on every width
    #[test]
    fn test_simd_matches_scalar_on_random_payload() {
        let mut rng = StdRng::seed_from_u64(7);
        for width_id in 0..WIDTH_CLASSES {
            for _ in 0..50 {
                let mut input = vec![0u8; PAYLOAD_BYTES[width_id]];
                rng.fill(&mut input[..]);

                let mut via_dispatch = vec![0u32; INTS_PER_BLOCK[width_id]];
                let mut via_scalar = vec![0u32; INTS_PER_BLOCK[width_id]];
                unpack_block(width_id, &input, &mut via_dispatch);
                scalar::unpack_block(width_id, &input, &mut via_scalar);

                assert_eq!(via_dispatch, via_scalar, "width_id {width_id}");
            }
        }
    }

    #[test]
    fn test_width_zero_fills_ones() {
        let mut output = vec![0u32; 256];
        unpack_block(0, &[], &mut output);
        assert!(output.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_width_eight_zero_extends() {
        let input: Vec<u8> = (0..16).map(|i| 255 - i).collect();
        let mut output = vec![0u32; 16];
        unpack_block(8, &input, &mut output);
        let expected: Vec<u32> = input.iter().map(|&b| u32::from(b)).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_width_sixteen_zero_extends() {
        let values: Vec<u16> = vec![0, 1, 255, 256, 0x7FFF, 0x8000, 0xFFFE, 0xFFFF];
        let input: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut output = vec![0u32; 8];
        unpack_block(12, &input, &mut output);
        let expected: Vec<u32> = values.iter().map(|&v| u32::from(v)).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_width_thirty_two_copies() {
        let values = [0u32, u32::MAX, 0xDEAD_BEEF, 1 << 31];
        let input: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut output = vec![0u32; 4];
        unpack_block(14, &input, &mut output);
        assert_eq!(output, values);
    }

    #[test]
    fn test_cumulative_sum_matches_scalar() {
        let mut rng = StdRng::seed_from_u64(11);
        for count in [0usize, 1, 3, 4, 5, 17, 64, 1000] {
            let gaps: Vec<u32> = (0..count).map(|_| rng.random_range(0..1000)).collect();
            let mut via_dispatch = gaps.clone();
            let mut via_scalar = gaps.clone();
            cumulative_sum(&mut via_dispatch, count);
            scalar::cumulative_sum(&mut via_scalar, count);
            assert_eq!(via_dispatch, via_scalar, "count {count}");
        }
    }

    #[test]
    fn test_cumulative_sum_values() {
        let mut values = vec![5u32, 0, 3, 1, 2, 10, 4];
        cumulative_sum(&mut values, 7);
        assert_eq!(values, vec![5, 5, 8, 9, 11, 21, 25]);
    }
}
