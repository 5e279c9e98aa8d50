//! Quantisation, DC level shift and guard-bit bookkeeping (spec section 4 overview table,
//! "Quantisation / MCT / level shift"; spec section 3 "Sub-band" step size).
//!
//! Grounded on the teacher's `t1.rs` dequantisation call sites (`t1_dec_sigpass_step`/
//! `opj_t1_decode_cblk`'s final scale-by-step-size loop) and on `original_source`'s
//! `WaveletFwd.h`/`WaveletReverse.h` gain tables for the 5/3 and 9/7 kernels, generalised into
//! one small free-function module rather than the teacher's inlined per-call arithmetic.

use crate::tcd::StepSize;
use crate::wavelet::Kernel;

/// DC level shift applied before encoding / after decoding (spec section 2 "DC-level shift"):
/// unsigned components are shifted by `-(1 << (precision - 1))` on encode and the inverse on
/// decode so that the wavelet always sees signed, near-zero-mean samples.
pub fn level_shift_value(precision: u32, signed: bool) -> i32 {
    if signed {
        0
    } else {
        1i32 << (precision - 1)
    }
}

pub fn level_shift_encode(samples: &mut [i32], precision: u32, signed: bool) {
    let shift = level_shift_value(precision, signed);
    if shift != 0 {
        for v in samples.iter_mut() {
            *v -= shift;
        }
    }
}

pub fn level_shift_decode(samples: &mut [i32], precision: u32, signed: bool) {
    let shift = level_shift_value(precision, signed);
    if shift != 0 {
        for v in samples.iter_mut() {
            *v += shift;
        }
    }
}

/// Wavelet sub-band energy gain exponents used to derive default guard-bit-adjusted step sizes
/// for the reversible kernel (spec section 3's "number of guard bits"); LL/LH/HL/HH gains for
/// the 5/3 kernel, expressed as `2*log2(gain)` fixed at the standard values.
pub fn reversible_band_gain_bits(band: crate::tcd::BandKind) -> u32 {
    match band {
        crate::tcd::BandKind::LL => 0,
        crate::tcd::BandKind::HL | crate::tcd::BandKind::LH => 1,
        crate::tcd::BandKind::HH => 2,
    }
}

/// Computes a default step size for one sub-band: exponent derived from the component
/// precision, sub-band resolution depth and (for reversible coding) the dyadic wavelet gain
/// (spec section 3, mantissa+exponent step size). Reversible coding always uses mantissa 0
/// (step size is implicitly 1 after accounting for the gain shift); irreversible coding uses
/// the scalar-expounded default of ITU-T T.800 Annex E.
pub fn default_step_size(
    kernel: Kernel,
    band: crate::tcd::BandKind,
    resolution_depth: u32,
    base_precision: u32,
) -> StepSize {
    match kernel {
        Kernel::Reversible53 => StepSize {
            mantissa: 0,
            exponent: (base_precision + reversible_band_gain_bits(band)) as u8,
        },
        Kernel::Irreversible97 => {
            // Scalar-derived default: exponent decreases towards finer resolutions, mantissa
            // fixed at the nominal value used by the teacher's encoder defaults.
            let gain = match band {
                crate::tcd::BandKind::LL => 0,
                _ => resolution_depth,
            };
            StepSize {
                mantissa: 0x7FF >> 1,
                exponent: (base_precision + gain) as u8,
            }
        }
    }
}

/// Converts a `StepSize` (mantissa/exponent pair) into the floating-point multiplier applied to
/// dequantised coefficients: `2^(R - exponent) * (1 + mantissa/2048)` where `R` is the component
/// precision (ITU-T T.800 Annex E.1 formula, as implemented by the teacher's T1 dequant step).
pub fn step_size_value(step: StepSize, component_precision: u32) -> f64 {
    let base = 1.0 + (step.mantissa as f64) / 2048.0;
    let exp = component_precision as i32 - step.exponent as i32;
    base * 2f64.powi(exp)
}

/// Quantises one sub-band's coefficient plane in place (encode path): irreversible coding
/// divides by the step size and truncates towards zero; reversible coding performs no scalar
/// quantisation (the wavelet output is used verbatim, spec section 4.3 "reversible" kernel).
pub fn quantize(coeffs: &mut [i32], kernel: Kernel, step: StepSize, component_precision: u32) {
    if let Kernel::Irreversible97 = kernel {
        let value = step_size_value(step, component_precision);
        if value > 0.0 {
            for c in coeffs.iter_mut() {
                let q = (*c as f64) / value;
                *c = q.trunc() as i32;
            }
        }
    }
}

/// Inverse of [`quantize`] (decode path): reversible coding is the identity; irreversible
/// coding multiplies back by the step size.
pub fn dequantize(coeffs: &mut [i32], kernel: Kernel, step: StepSize, component_precision: u32) {
    if let Kernel::Irreversible97 = kernel {
        let value = step_size_value(step, component_precision);
        for c in coeffs.iter_mut() {
            *c = ((*c as f64) * value).round() as i32;
        }
    }
}

/// Applies (or removes) a region-of-interest shift: coefficients within the ROI mask are
/// shifted left by `roi_shift` bits before coding so they land in higher bit-planes and are
/// preferentially included by rate-distortion allocation (spec section 3, "ROI shift").
pub fn apply_roi_shift(coeffs: &mut [i32], roi_shift: u8) {
    if roi_shift > 0 {
        for c in coeffs.iter_mut() {
            *c <<= roi_shift;
        }
    }
}

pub fn remove_roi_shift(coeffs: &mut [i32], roi_shift: u8) {
    if roi_shift > 0 {
        for c in coeffs.iter_mut() {
            *c >>= roi_shift;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcd::BandKind;

    #[test]
    fn level_shift_round_trips() {
        let mut s = vec![0, 128, 255];
        level_shift_encode(&mut s, 8, false);
        assert_eq!(s, vec![-128, 0, 127]);
        level_shift_decode(&mut s, 8, false);
        assert_eq!(s, vec![0, 128, 255]);
    }

    #[test]
    fn signed_component_is_not_shifted() {
        let mut s = vec![-10, 0, 10];
        let orig = s.clone();
        level_shift_encode(&mut s, 8, true);
        assert_eq!(s, orig);
    }

    #[test]
    fn reversible_quantize_is_identity() {
        let mut c = vec![1, -2, 3, 400];
        let orig = c.clone();
        let step = default_step_size(Kernel::Reversible53, BandKind::LL, 0, 8);
        quantize(&mut c, Kernel::Reversible53, step, 8);
        assert_eq!(c, orig);
    }

    #[test]
    fn irreversible_quantize_dequantize_is_approximately_identity() {
        let step = StepSize {
            mantissa: 0,
            exponent: 8,
        };
        let mut c = vec![1000, -500, 0];
        let orig = c.clone();
        quantize(&mut c, Kernel::Irreversible97, step, 8);
        dequantize(&mut c, Kernel::Irreversible97, step, 8);
        for (a, b) in c.iter().zip(orig.iter()) {
            assert!((a - b).abs() <= 1);
        }
    }

    #[test]
    fn roi_shift_round_trips() {
        let mut c = vec![1, 2, 3];
        apply_roi_shift(&mut c, 3);
        assert_eq!(c, vec![8, 16, 24]);
        remove_roi_shift(&mut c, 3);
        assert_eq!(c, vec![1, 2, 3]);
    }
}
