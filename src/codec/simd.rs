//! Runtime SIMD dispatch for the alphabet codec.
//!
//! CPU capability is detected once at process start and cached; each
//! encode/decode operation picks the highest tier whose minimum-size
//! threshold the input clears. Scalar is the universal fallback and is
//! always present. Every tier must produce byte-identical output for
//! the same input — see the differential tests alongside each tier.

use std::sync::OnceLock;

/// Runtime-detected SIMD capability tiers, highest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdTier {
    Avx512Bw,
    Avx2,
    Sse2,
    Neon,
    Sve,
    Scalar,
}

/// Minimum input length (in bases) before each tier is worth dispatching
/// to. Concrete and per-operation, per the SIMD policy.
pub mod thresholds {
    pub const SSE2_ENCODE: usize = 64;
    pub const AVX2_ENCODE: usize = 512;
    pub const AVX512_ENCODE: usize = 1024;
    pub const NEON_ENCODE: usize = 64;
    pub const SVE_ENCODE: usize = 512;

    pub const SSE2_DECODE: usize = 64;
    pub const AVX2_DECODE: usize = 512;
    pub const AVX512_DECODE: usize = 1024;
    pub const NEON_DECODE: usize = 64;
    pub const SVE_DECODE: usize = 512;
}

#[derive(Debug, Clone, Copy)]
struct CpuFeatures {
    avx512bw: bool,
    avx2: bool,
    sse2: bool,
    neon: bool,
    sve: bool,
}

fn detect_cpu_features() -> CpuFeatures {
    #[cfg(target_arch = "x86_64")]
    {
        CpuFeatures {
            avx512bw: is_x86_feature_detected!("avx512bw"),
            avx2: is_x86_feature_detected!("avx2"),
            sse2: is_x86_feature_detected!("sse2"),
            neon: false,
            sve: false,
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        CpuFeatures {
            avx512bw: false,
            avx2: false,
            sse2: false,
            neon: std::arch::is_aarch64_feature_detected!("neon"),
            sve: cfg!(feature = "sve") && std::arch::is_aarch64_feature_detected!("sve"),
        }
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        CpuFeatures {
            avx512bw: false,
            avx2: false,
            sse2: false,
            neon: false,
            sve: false,
        }
    }
}

static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

fn features() -> CpuFeatures {
    *FEATURES.get_or_init(|| {
        let f = detect_cpu_features();
        log::info!(
            "codec SIMD capability: avx512bw={} avx2={} sse2={} neon={} sve={}",
            f.avx512bw,
            f.avx2,
            f.sse2,
            f.neon,
            f.sve
        );
        f
    })
}

/// Select the dispatch tier for an encode operation of `len` bases.
pub fn select_encode_tier(len: usize) -> SimdTier {
    let f = features();
    if f.avx512bw && len >= thresholds::AVX512_ENCODE {
        SimdTier::Avx512Bw
    } else if f.avx2 && len >= thresholds::AVX2_ENCODE {
        SimdTier::Avx2
    } else if f.sve && len >= thresholds::SVE_ENCODE {
        SimdTier::Sve
    } else if f.neon && len >= thresholds::NEON_ENCODE {
        SimdTier::Neon
    } else if f.sse2 && len >= thresholds::SSE2_ENCODE {
        SimdTier::Sse2
    } else {
        SimdTier::Scalar
    }
}

/// Select the dispatch tier for a decode operation of `len` bases.
pub fn select_decode_tier(len: usize) -> SimdTier {
    let f = features();
    if f.avx512bw && len >= thresholds::AVX512_DECODE {
        SimdTier::Avx512Bw
    } else if f.avx2 && len >= thresholds::AVX2_DECODE {
        SimdTier::Avx2
    } else if f.sve && len >= thresholds::SVE_DECODE {
        SimdTier::Sve
    } else if f.neon && len >= thresholds::NEON_DECODE {
        SimdTier::Neon
    } else if f.sse2 && len >= thresholds::SSE2_DECODE {
        SimdTier::Sse2
    } else {
        SimdTier::Scalar
    }
}
