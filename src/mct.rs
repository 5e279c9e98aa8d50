/*
 * The copyright in this software is being made available under the 2-clauses
 * BSD License, included below. This software may be subject to other third
 * party and contributor rights, including patent rights, and no such rights
 * are granted under this license.
 *
 * Copyright (c) 2002-2014, Universite catholique de Louvain (UCL), Belgium
 * Copyright (c) 2002-2014, Professor Benoit Macq
 * Copyright (c) 2001-2003, David Janssens
 * Copyright (c) 2002-2003, Yannick Verschueren
 * Copyright (c) 2003-2007, Francois-Olivier Devaux
 * Copyright (c) 2003-2014, Antonin Descampe
 * Copyright (c) 2005, Herve Drolon, FreeImage Team
 * Copyright (c) 2008, 2011-2012, Centre National d'Etudes Spatiales (CNES), FR
 * Copyright (c) 2012, CS Systemes d'Information, France
 * All rights reserved.
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions
 * are met:
 * 1. Redistributions of source code must retain the above copyright
 *    notice, this list of conditions and the following disclaimer.
 * 2. Redistributions in binary form must reproduce the above copyright
 *    notice, this list of conditions and the following disclaimer in the
 *    documentation and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS `AS IS'
 * AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
 * IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
 * ARE DISCLAIMED.  IN NO EVENT SHALL THE COPYRIGHT OWNER OR CONTRIBUTORS BE
 * LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR
 * CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF
 * SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS
 * INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN
 * CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

//! Multi-component transform (spec section 4.3: "Multi-component transform"): the reversible
//! RCT and irreversible ICT, each applied across exactly three components (the first three of
//! a tile, per spec section 6's `mct` parameter) ahead of the per-component wavelet stage.
//!
//! Ported from the teacher's `mct.rs` (`opj_mct_encode`/`opj_mct_decode`/`*_real` pairs), which
//! operate on raw `*mut OPJ_INT32`/`*mut OPJ_FLOAT32` pointers with unchecked `.add(i)` pointer
//! arithmetic; rewritten here over borrowed slices, with the teacher's norms tables kept as-is
//! (spec section 4.3's rate-control stage consults them to weight a sub-band's distortion
//! contribution by the MCT basis function's norm).

/// Basis-function norms of the reversible (RCT) transform, indexed by component 0/1/2.
pub const NORMS_REVERSIBLE: [f64; 3] = [1.732, 0.8292, 0.8292];

/// Basis-function norms of the irreversible (ICT) transform, indexed by component 0/1/2.
pub const NORMS_IRREVERSIBLE: [f64; 3] = [1.732, 1.805, 1.573];

pub fn norm_reversible(compno: usize) -> f64 {
    NORMS_REVERSIBLE[compno]
}

pub fn norm_irreversible(compno: usize) -> f64 {
    NORMS_IRREVERSIBLE[compno]
}

/// Forward reversible color transform (RCT): `y = (r + 2g + b) >> 2`, `u = b - g`, `v = r - g`.
/// Exact integer inverse of [`decode_reversible`]. All three slices must have equal length.
pub fn encode_reversible(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) {
    debug_assert_eq!(c0.len(), c1.len());
    debug_assert_eq!(c0.len(), c2.len());
    for i in 0..c0.len() {
        let r = c0[i];
        let g = c1[i];
        let b = c2[i];
        c0[i] = (r + 2 * g + b) >> 2;
        c1[i] = b - g;
        c2[i] = r - g;
    }
}

/// Inverse reversible color transform: exact inverse of [`encode_reversible`].
pub fn decode_reversible(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) {
    debug_assert_eq!(c0.len(), c1.len());
    debug_assert_eq!(c0.len(), c2.len());
    for i in 0..c0.len() {
        let y = c0[i];
        let u = c1[i];
        let v = c2[i];
        let g = y - ((u + v) >> 2);
        let r = v + g;
        let b = u + g;
        c0[i] = r;
        c1[i] = g;
        c2[i] = b;
    }
}

/// Forward irreversible color transform (ICT): the ITU-R BT.601 YCbCr matrix, applied in
/// floating point ahead of the 9/7 wavelet.
pub fn encode_irreversible(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    debug_assert_eq!(c0.len(), c1.len());
    debug_assert_eq!(c0.len(), c2.len());
    for i in 0..c0.len() {
        let r = c0[i];
        let g = c1[i];
        let b = c2[i];
        c0[i] = 0.299 * r + 0.587 * g + 0.114 * b;
        c1[i] = -0.16875 * r - 0.331260 * g + 0.5 * b;
        c2[i] = 0.5 * r - 0.41869 * g - 0.08131 * b;
    }
}

/// Inverse irreversible color transform: the approximate floating-point inverse of
/// [`encode_irreversible`] (not bit-exact, matching the teacher's constants).
pub fn decode_irreversible(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
    debug_assert_eq!(c0.len(), c1.len());
    debug_assert_eq!(c0.len(), c2.len());
    for i in 0..c0.len() {
        let y = c0[i];
        let u = c1[i];
        let v = c2[i];
        c0[i] = y + v * 1.402;
        c1[i] = y - u * 0.34413 - v * 0.71414;
        c2[i] = y + u * 1.772;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversible_round_trip() {
        let mut c0 = vec![10, 200, -50, 0];
        let mut c1 = vec![20, 100, -10, 5];
        let mut c2 = vec![30, 50, 60, -5];
        let (r, g, b) = (c0.clone(), c1.clone(), c2.clone());
        encode_reversible(&mut c0, &mut c1, &mut c2);
        decode_reversible(&mut c0, &mut c1, &mut c2);
        assert_eq!(c0, r);
        assert_eq!(c1, g);
        assert_eq!(c2, b);
    }

    #[test]
    fn irreversible_round_trip_is_close() {
        let mut c0 = vec![10.0f32, 200.0, -50.0];
        let mut c1 = vec![20.0f32, 100.0, -10.0];
        let mut c2 = vec![30.0f32, 50.0, 60.0];
        let (r, g, b) = (c0.clone(), c1.clone(), c2.clone());
        encode_irreversible(&mut c0, &mut c1, &mut c2);
        decode_irreversible(&mut c0, &mut c1, &mut c2);
        for (a, b) in c0.iter().zip(r.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
        for (a, b) in c1.iter().zip(g.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
        for (a, b) in c2.iter().zip(b.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn norms_match_teacher_tables() {
        assert_eq!(norm_reversible(0), 1.732);
        assert_eq!(norm_irreversible(2), 1.573);
    }
}
