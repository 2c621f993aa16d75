//! aarch64 SIMD classification and decode tiers (NEON, and an SVE stub)
//! for the alphabet codec. See `codec::x86` for the equivalent x86_64
//! tiers and the rationale for keeping bit assembly scalar.

use std::arch::aarch64::*;

use super::{
    classify_dna2_scalar, classify_dna4_scalar, decode_2bit_codes_scalar, decode_4bit_codes_scalar,
    DNA2_DECODE_PAIRS, DNA2_TABLE, DNA4_DECODE_PAIRS, DNA4_TABLE,
};
use crate::error::KmerResult;

#[target_feature(enable = "neon")]
unsafe fn classify_table_neon(ascii: &[u8], table: &[(u8, u8)]) -> (Vec<u8>, bool) {
    let len = ascii.len();
    let mut out = vec![0u8; len];
    let mut any_invalid = false;
    let mut i = 0;

    while i + 16 <= len {
        let data = vld1q_u8(ascii[i..].as_ptr());
        let mut codes = vdupq_n_u8(0);
        let mut matched = vdupq_n_u8(0);

        for &(letter, code) in table {
            let eq = vceqq_u8(data, vdupq_n_u8(letter));
            let coded = vandq_u8(eq, vdupq_n_u8(code));
            // codes = (codes & !eq) | coded
            codes = vorrq_u8(vbicq_u8(codes, eq), coded);
            matched = vorrq_u8(matched, eq);
        }

        let invalid = vbicq_u8(vdupq_n_u8(0xFF), matched);
        if vmaxvq_u8(invalid) != 0 {
            any_invalid = true;
        }

        let mut buf = [0u8; 16];
        vst1q_u8(buf.as_mut_ptr(), codes);
        out[i..i + 16].copy_from_slice(&buf);
        i += 16;
    }

    for &byte in &ascii[i..] {
        match table.iter().find(|&&(letter, _)| letter == byte) {
            Some(&(_, code)) => out.push(code),
            None => any_invalid = true,
        }
    }

    (out, any_invalid)
}

pub(crate) unsafe fn classify_dna2_neon(ascii: &[u8]) -> KmerResult<Vec<u8>> {
    let (out, any_invalid) = classify_table_neon(ascii, DNA2_TABLE);
    if any_invalid {
        classify_dna2_scalar(ascii)
    } else {
        Ok(out)
    }
}

pub(crate) unsafe fn classify_dna4_neon(ascii: &[u8]) -> KmerResult<Vec<u8>> {
    let (out, any_invalid) = classify_table_neon(ascii, DNA4_TABLE);
    if any_invalid {
        classify_dna4_scalar(ascii)
    } else {
        Ok(out)
    }
}

// No stable SVE intrinsics in std::arch yet; the "sve" feature just
// changes which tier gets selected at the dispatch threshold, and the
// classifier itself reuses the NEON kernel until one lands.
pub(crate) unsafe fn classify_dna2_sve(ascii: &[u8]) -> KmerResult<Vec<u8>> {
    classify_dna2_neon(ascii)
}

pub(crate) unsafe fn classify_dna4_sve(ascii: &[u8]) -> KmerResult<Vec<u8>> {
    classify_dna4_neon(ascii)
}

// Decode reuses the same table-driven NEON kernel with (code, ascii)
// pairs instead of (ascii, code) pairs, same as the x86 side.
pub(crate) unsafe fn decode_dna2_neon(codes: &[u8]) -> Vec<u8> {
    let (out, any_invalid) = classify_table_neon(codes, DNA2_DECODE_PAIRS);
    if any_invalid {
        decode_2bit_codes_scalar(codes)
    } else {
        out
    }
}

pub(crate) unsafe fn decode_dna4_neon(codes: &[u8]) -> KmerResult<Vec<u8>> {
    let (out, any_invalid) = classify_table_neon(codes, DNA4_DECODE_PAIRS);
    if any_invalid {
        decode_4bit_codes_scalar(codes)
    } else {
        Ok(out)
    }
}

pub(crate) unsafe fn decode_dna2_sve(codes: &[u8]) -> Vec<u8> {
    decode_dna2_neon(codes)
}

pub(crate) unsafe fn decode_dna4_sve(codes: &[u8]) -> KmerResult<Vec<u8>> {
    decode_dna4_neon(codes)
}

#[cfg(test)]
mod tests {
    use super::super::{
        classify_dna2_scalar, classify_dna4_scalar, decode_2bit_codes_scalar,
        decode_4bit_codes_scalar,
    };
    use super::*;

    #[test]
    fn neon_decode_matches_scalar_dna2() {
        if !std::arch::is_aarch64_feature_detected!("neon") {
            return;
        }
        let ascii = b"ACGTacgtACGTACGTACGTACGTACGTACGTACGT".repeat(3);
        let codes = classify_dna2_scalar(&ascii).unwrap();
        let scalar = decode_2bit_codes_scalar(&codes);
        let simd = unsafe { decode_dna2_neon(&codes) };
        assert_eq!(scalar, simd);
    }

    #[test]
    fn neon_decode_matches_scalar_dna4() {
        if !std::arch::is_aarch64_feature_detected!("neon") {
            return;
        }
        let ascii = b"ACGTMRWSYKVHDBNACGTMRWSYKVHDBNACGTMRWSYKVHDBN".to_vec();
        let codes = classify_dna4_scalar(&ascii).unwrap();
        let scalar = decode_4bit_codes_scalar(&codes).unwrap();
        let simd = unsafe { decode_dna4_neon(&codes).unwrap() };
        assert_eq!(scalar, simd);
    }

    #[test]
    fn neon_classify_matches_scalar_dna2() {
        if !std::arch::is_aarch64_feature_detected!("neon") {
            return;
        }
        let ascii = b"ACGTacgtACGTACGTACGTACGTACGTACGTACGT".repeat(3);
        let scalar = classify_dna2_scalar(&ascii).unwrap();
        let simd = unsafe { classify_dna2_neon(&ascii).unwrap() };
        assert_eq!(scalar, simd);
    }

    #[test]
    fn neon_classify_matches_scalar_dna4() {
        if !std::arch::is_aarch64_feature_detected!("neon") {
            return;
        }
        let ascii = b"ACGTMRWSYKVHDBNACGTMRWSYKVHDBNACGTMRWSYKVHDBN".to_vec();
        let scalar = classify_dna4_scalar(&ascii).unwrap();
        let simd = unsafe { classify_dna4_neon(&ascii).unwrap() };
        assert_eq!(scalar, simd);
    }
}
