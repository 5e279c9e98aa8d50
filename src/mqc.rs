//! The MQ arithmetic coder (ITU-T T.800 Annex C): the Part 1 embedded block coder's bit engine
//! (spec section 4.5, "The MQ arithmetic coder (Part 1) maintains (A, C, CT,
//! state-per-context) with ~19 contexts").
//!
//! `mqc.rs` itself was not retrieved into this pack (only `t1.rs`, `tcd.rs`, `tgt.rs`,
//! `sparse_array.rs`, `mct.rs`, `image.rs`, `j2k.rs` survived the filter; `t1.rs` line 6 does
//! `use super::mqc::*;` and calls `mqc.bp`/`mqc.a`/`mqc.c`/`mqc.ct`/`opj_mqc_encode`/
//! `opj_mqc_decode` throughout, which is what grounds the register names and call shape below).
//! The state table itself is the standard Annex C.2 table, common to every conformant Part 1
//! implementation (values reproduced in the ITU-T T.800 text, spec section 4.5).

use crate::error::{Error, Result};

/// One row of the Annex C.2 probability-estimation state machine.
#[derive(Debug, Clone, Copy)]
struct QeState {
    qe: u32,
    nmps: u8,
    nlps: u8,
    switch: u8,
}

const fn s(qe: u32, nmps: u8, nlps: u8, switch: u8) -> QeState {
    QeState { qe, nmps, nlps, switch }
}

/// The 47-entry Qe probability table (ITU-T T.800 Table C.2).
static QE_TABLE: [QeState; 47] = [
    s(0x5601, 1, 1, 1), s(0x3401, 2, 6, 0), s(0x1801, 3, 9, 0), s(0x0AC1, 4, 12, 0),
    s(0x0521, 5, 29, 0), s(0x0221, 38, 33, 0), s(0x5601, 7, 6, 1), s(0x5401, 8, 14, 0),
    s(0x4801, 9, 14, 0), s(0x3801, 10, 14, 0), s(0x3001, 11, 17, 0), s(0x2401, 12, 18, 0),
    s(0x1C01, 13, 20, 0), s(0x1601, 29, 21, 0), s(0x5601, 15, 14, 1), s(0x5401, 16, 14, 0),
    s(0x5101, 17, 15, 0), s(0x4801, 18, 16, 0), s(0x3801, 19, 17, 0), s(0x3401, 20, 18, 0),
    s(0x3001, 21, 19, 0), s(0x2801, 22, 19, 0), s(0x2401, 23, 20, 0), s(0x2201, 24, 21, 0),
    s(0x1C01, 25, 22, 0), s(0x1801, 26, 23, 0), s(0x1601, 27, 24, 0), s(0x1401, 28, 25, 0),
    s(0x1201, 29, 26, 0), s(0x1101, 30, 27, 0), s(0x0AC1, 31, 28, 0), s(0x09C1, 32, 29, 0),
    s(0x08A1, 33, 30, 0), s(0x0521, 34, 31, 0), s(0x0441, 35, 32, 0), s(0x02A1, 36, 33, 0),
    s(0x0221, 37, 34, 0), s(0x0141, 38, 35, 0), s(0x0111, 39, 36, 0), s(0x0085, 40, 37, 0),
    s(0x0049, 41, 38, 0), s(0x0025, 42, 39, 0), s(0x0015, 43, 40, 0), s(0x0009, 44, 41, 0),
    s(0x0005, 45, 42, 0), s(0x0001, 45, 43, 0), s(0x5601, 46, 46, 0),
];

/// Number of contexts the T1 passes address (spec section 4.5: "~19 contexts"); context 0 is
/// the uniform/run-length context, context 18 the segmentation-symbol context.
pub const NUM_CONTEXTS: usize = 19;

pub const CTX_UNIFORM: usize = 0;
pub const CTX_RUNLENGTH: usize = 17;
pub const CTX_ZERO_CODING: usize = 1;
pub const CTX_SEGMENT: usize = 18;

/// Per-context adaptive state: an index into [`QE_TABLE`] plus the current most-probable-symbol
/// sense, mirroring `opj_mqc_state_t` / `ctxs` fields the teacher's `t1.rs` threads through
/// `mqc.ctxs`.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    index: u8,
    mps: u8,
}

impl Context {
    pub fn new(index: u8, mps: u8) -> Self {
        Context { index, mps }
    }
}

/// Default initial context states (ITU-T T.800 Table C.1 init values); context 0 (uniform)
/// starts at state 46 with MPS 0, the rest start at state 0 MPS 0, except the run-length
/// context which starts at state 3.
pub fn default_contexts() -> [Context; NUM_CONTEXTS] {
    let mut ctxs = [Context::new(0, 0); NUM_CONTEXTS];
    ctxs[CTX_UNIFORM] = Context::new(46, 0);
    ctxs[CTX_RUNLENGTH] = Context::new(3, 0);
    ctxs
}

/// The MQ encoder: maintains `(a, c, ct)` plus an output byte buffer (spec section 4.5).
pub struct MqEncoder {
    a: u32,
    c: u32,
    ct: i32,
    out: Vec<u8>,
    last_byte_was_ff: bool,
}

impl MqEncoder {
    pub fn new() -> Self {
        MqEncoder {
            a: 0x8000,
            c: 0,
            ct: 12,
            out: Vec::new(),
            last_byte_was_ff: false,
        }
    }

    /// Extracts the next ready byte from the high bits of `c` and appends it to the output,
    /// propagating any arithmetic carry backward into already-emitted bytes (ITU-T T.800 Annex
    /// C.2.3 BYTEOUT). A 0xFF byte forces the following byte to carry only 7 data bits (its
    /// top bit is structurally zero: after 7 renormalisation shifts the register's bit 26 has
    /// not yet been written to), which is this coder's bit-stuffing convention.
    fn byte_out(&mut self) {
        if !self.last_byte_was_ff && self.c & 0x0800_0000 != 0 {
            let mut i = self.out.len();
            while i > 0 {
                i -= 1;
                if self.out[i] == 0xFF {
                    self.out[i] = 0x00;
                } else {
                    self.out[i] += 1;
                    break;
                }
            }
            self.c &= 0x07FF_FFFF;
        }
        let b = ((self.c >> 19) & 0xFF) as u8;
        self.out.push(b);
        self.c &= 0x7_FFFF;
        self.last_byte_was_ff = b == 0xFF;
        self.ct = if self.last_byte_was_ff { 7 } else { 8 };
    }

    fn renorm_e(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_out();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// Codes one binary decision `d` against `ctx`'s adaptive probability.
    pub fn encode(&mut self, ctxs: &mut [Context; NUM_CONTEXTS], ctx_idx: usize, d: u8) {
        let ctx = &mut ctxs[ctx_idx];
        let st = QE_TABLE[ctx.index as usize];
        self.a -= st.qe;
        if d == ctx.mps {
            if self.a & 0x8000 == 0 {
                if self.a < st.qe {
                    self.a = st.qe;
                } else {
                    self.c += st.qe;
                }
                ctx.index = st.nmps;
                self.renorm_e();
            } else {
                self.c += st.qe;
            }
        } else {
            if self.a < st.qe {
                self.c += st.qe;
            } else {
                self.a = st.qe;
            }
            if st.switch == 1 {
                ctx.mps = 1 - ctx.mps;
            }
            ctx.index = st.nlps;
            self.renorm_e();
        }
    }

    /// Flushes the coder (ITU-T T.800 Annex C.2.9 FLUSH/SETBITS procedure) and returns the
    /// encoded bytes, consuming the encoder.
    pub fn flush(mut self) -> Vec<u8> {
        let tempc = self.c.wrapping_add(self.a);
        self.c |= 0xFFFF;
        if self.c >= tempc {
            self.c = self.c.wrapping_sub(0x8000);
        }
        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();
        self.out
    }

    pub fn bytes_written(&self) -> usize {
        self.out.len()
    }
}

/// The MQ decoder, reading back what [`MqEncoder`] produced (ITU-T T.800 Annex C.3).
pub struct MqDecoder<'a> {
    buf: &'a [u8],
    bp: usize,
    a: u32,
    c: u32,
    ct: i32,
}

impl<'a> MqDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        let mut d = MqDecoder {
            buf,
            bp: 0,
            a: 0,
            c: 0,
            ct: 0,
        };
        d.init();
        d
    }

    fn byte_at(&self, i: usize) -> u8 {
        self.buf.get(i).copied().unwrap_or(0xFF)
    }

    fn init(&mut self) {
        let b0 = self.byte_at(0);
        self.c = (b0 as u32) << 16;
        self.bp = 0;
        self.byte_in();
        self.c <<= 7;
        self.ct -= 7;
        self.a = 0x8000;
    }

    fn byte_in(&mut self) {
        if self.byte_at(self.bp) == 0xFF {
            if self.byte_at(self.bp + 1) > 0x8F {
                self.c += 0xFF00;
                self.ct = 8;
            } else {
                self.bp += 1;
                self.c += (self.byte_at(self.bp) as u32) << 9;
                self.ct = 7;
            }
        } else {
            self.bp += 1;
            self.c += (self.byte_at(self.bp) as u32) << 8;
            self.ct = 8;
        }
    }

    fn renorm_d(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// Decodes one binary decision against `ctx`'s adaptive probability, returning the decoded
    /// bit. This can never fail on well-formed input (the decoder always produces a bit; a
    /// malformed segment is detected by the caller via context-stream corruption heuristics,
    /// spec section 4.5 "Failure").
    pub fn decode(&mut self, ctxs: &mut [Context; NUM_CONTEXTS], ctx_idx: usize) -> Result<u8> {
        let ctx = &mut ctxs[ctx_idx];
        let st = QE_TABLE[ctx.index as usize];
        self.a = self.a.wrapping_sub(st.qe);
        let d;
        if (self.c >> 16) < st.qe {
            if self.a < st.qe {
                self.a = st.qe;
                d = ctx.mps;
                ctx.index = st.nmps;
            } else {
                self.a = st.qe;
                d = 1 - ctx.mps;
                if st.switch == 1 {
                    ctx.mps = 1 - ctx.mps;
                }
                ctx.index = st.nlps;
            }
            self.renorm_d();
        } else {
            self.c -= (st.qe as u32) << 16;
            if self.a & 0x8000 == 0 {
                if self.a < st.qe {
                    d = 1 - ctx.mps;
                    if st.switch == 1 {
                        ctx.mps = 1 - ctx.mps;
                    }
                    ctx.index = st.nlps;
                } else {
                    d = ctx.mps;
                    ctx.index = st.nmps;
                }
                self.renorm_d();
            } else {
                d = ctx.mps;
            }
        }
        if self.bp > self.buf.len() + 2 {
            return Err(Error::truncation("MQ decoder read past the segment end"));
        }
        Ok(d)
    }

    pub fn bytes_consumed(&self) -> usize {
        self.bp + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_fixed_bit_sequence() {
        let bits: Vec<u8> = (0..200).map(|i| ((i * 37) % 5 == 0) as u8).collect();
        let mut enc_ctxs = default_contexts();
        let mut enc = MqEncoder::new();
        for &b in &bits {
            enc.encode(&mut enc_ctxs, CTX_ZERO_CODING, b);
        }
        let bytes = enc.flush();

        let mut dec_ctxs = default_contexts();
        let mut dec = MqDecoder::new(&bytes);
        let mut out = Vec::with_capacity(bits.len());
        for _ in 0..bits.len() {
            out.push(dec.decode(&mut dec_ctxs, CTX_ZERO_CODING).unwrap());
        }
        assert_eq!(out, bits);
    }

    #[test]
    fn round_trip_all_zero_then_all_one() {
        let mut bits = vec![0u8; 64];
        bits.extend(vec![1u8; 64]);
        let mut enc_ctxs = default_contexts();
        let mut enc = MqEncoder::new();
        for &b in &bits {
            enc.encode(&mut enc_ctxs, CTX_ZERO_CODING, b);
        }
        let bytes = enc.flush();
        let mut dec_ctxs = default_contexts();
        let mut dec = MqDecoder::new(&bytes);
        for &expected in &bits {
            assert_eq!(dec.decode(&mut dec_ctxs, CTX_ZERO_CODING).unwrap(), expected);
        }
    }

    #[test]
    fn independent_contexts_do_not_interfere() {
        let mut enc_ctxs = default_contexts();
        let mut enc = MqEncoder::new();
        let a_bits = [0u8, 1, 0, 0, 1, 1, 0, 1];
        let b_bits = [1u8, 1, 1, 0, 0, 1, 0, 0];
        for i in 0..8 {
            enc.encode(&mut enc_ctxs, CTX_ZERO_CODING, a_bits[i]);
            enc.encode(&mut enc_ctxs, CTX_UNIFORM, b_bits[i]);
        }
        let bytes = enc.flush();
        let mut dec_ctxs = default_contexts();
        let mut dec = MqDecoder::new(&bytes);
        for i in 0..8 {
            assert_eq!(dec.decode(&mut dec_ctxs, CTX_ZERO_CODING).unwrap(), a_bits[i]);
            assert_eq!(dec.decode(&mut dec_ctxs, CTX_UNIFORM).unwrap(), b_bits[i]);
        }
    }
}
