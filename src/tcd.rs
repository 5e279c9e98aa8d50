//! Tile-component data model (spec section 3): canvas rectangles, resolutions, sub-bands,
//! precincts and codeblocks, plus the per-tile/per-image coding-parameter records (TCP/CP).
//!
//! The teacher's `tcd.rs` models this graph with raw pointers threaded through
//! `opj_tcd_tilecomp_t` / `opj_tcd_resolution_t` / `opj_tcd_band_t` / `opj_tcd_precinct_t` /
//! `opj_tcd_cblk_enc_t` / `opj_tcd_cblk_dec_t` (a direct transpile of the C original's ownership
//! graph). Spec section 9's design note calls that out as "cyclic ownership in
//! precinct->codeblock->segment graphs" and prescribes arenas indexed by
//! tile -> resolution -> sub-band -> precinct-index -> codeblock-index; this module is that
//! arena, built fresh (not a generalisation of the teacher's pointer graph, which does not
//! translate to safe Rust).

use crate::consts::{cblk_sty::CblkStyle, MctMode, ProgOrder};
use crate::error::{Error, Result};
use crate::geometry::Rect;

/// Index of a precinct within a sub-band's precinct grid (row-major).
pub type PrecinctIdx = u32;
/// Index of a codeblock within a precinct's codeblock grid (row-major).
pub type CodeblockIdx = u32;

/// One compressed coding-pass segment: a contiguous run of bytes terminated by either a coder
/// flush (`TERMALL`/segment boundary) or the end of all passes in this segment.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub data: Vec<u8>,
    /// Number of coding passes folded into this segment.
    pub num_passes: u32,
}

/// Per-pass bookkeeping kept on the encode side only (spec section 4.5 "Encode policies").
#[derive(Debug, Clone, Copy, Default)]
pub struct PassInfo {
    /// Cumulative rate (bytes) in the MQ/HT output once this pass is included.
    pub rate: u32,
    /// Cumulative distortion reduction once this pass is included.
    pub distortion: f64,
    /// ln(distortion/rate) in 8.8 fixed point (spec section 4.5 "Slopes").
    pub slope: i32,
    /// Whether the coder was terminated (byte-aligned) immediately after this pass.
    pub terminated: bool,
}

/// The smallest unit of arithmetic coding: at most 64x64 coefficients (spec section 3,
/// "Codeblock").
#[derive(Debug, Clone)]
pub struct Codeblock {
    pub rect: Rect,
    /// `Mb = guard_bits + p_sub - 1`, the number of bit-planes this codeblock may code.
    pub num_bitplanes: u32,
    /// Number of leading all-zero bit-planes, known once the first inclusion is coded.
    pub num_zero_bitplanes: u32,
    pub segments: Vec<Segment>,
    /// Total coding passes generated so far (encode) or received so far (decode).
    pub num_passes_total: u32,
    /// Running Lblock value for this codeblock's packet length fields (ITU-T T.800 Annex
    /// B.10.7): starts at 3, grows by one each time a packet's segment length needs more bits
    /// than the current value (plus the pass-count term) provides, and never shrinks. Threaded
    /// through every packet this codeblock appears in across the tile's lifetime, encode and
    /// decode sides symmetrically (spec section 4.6).
    pub lblock: u32,
    /// Cumulative passes included as of each layer, monotonically non-decreasing
    /// (`numPassesInPacket[L]` in spec section 4.5/8).
    pub num_passes_per_layer: Vec<u32>,
    /// Encode-only: quantised coefficient plane, row-major over `rect`.
    pub coefficients: Vec<i32>,
    /// Encode-only: per-pass rate/distortion/termination triples.
    pub pass_info: Vec<PassInfo>,
    /// `true` once a coder reported context-stream corruption (spec section 4.5 "Failure"):
    /// the codeblock is treated as decoded-truncated but the tile proceeds.
    pub decode_truncated: bool,
}

impl Codeblock {
    pub fn new(rect: Rect, num_bitplanes: u32) -> Self {
        let area = rect.area().max(0) as usize;
        Codeblock {
            rect,
            num_bitplanes,
            num_zero_bitplanes: 0,
            segments: Vec::new(),
            num_passes_total: 0,
            lblock: 3,
            num_passes_per_layer: Vec::new(),
            coefficients: vec![0i32; area],
            pass_info: Vec::new(),
            decode_truncated: false,
        }
    }

    pub fn max_passes(&self) -> u32 {
        3 * self.num_bitplanes.saturating_sub(1)
    }

    /// Invariant check (spec section 8): compressed-pass segments are contiguous in pass index
    /// and `numpasses <= 3*Mb`.
    pub fn check_invariants(&self) -> Result<()> {
        let total: u32 = self.segments.iter().map(|s| s.num_passes).sum();
        if total != self.num_passes_total {
            return Err(Error::format(
                "codeblock segment pass counts do not sum to num_passes_total",
            ));
        }
        if self.num_passes_total > self.max_passes() {
            return Err(Error::format("codeblock exceeds 3*(Mb-1) coding passes"));
        }
        Ok(())
    }
}

/// A rectangular region of a sub-band grouping codeblocks for packet-level access (spec
/// section 3, "Precinct"). Codeblocks are created lazily.
#[derive(Debug, Clone)]
pub struct Precinct {
    pub rect: Rect,
    /// Codeblock grid dimensions (may be zero if the precinct is empty).
    pub cblk_grid_w: u32,
    pub cblk_grid_h: u32,
    pub cblk_log2_w: u32,
    pub cblk_log2_h: u32,
    cblks: Vec<Option<Codeblock>>,
    /// Inclusion tag-tree: first-layer membership of each codeblock (spec section 4.2).
    pub inclusion_tree: Option<crate::tgt::TagTree>,
    /// Zero-bit-plane tag-tree: leading empty bit-planes per codeblock (spec section 4.2).
    pub zero_bitplane_tree: Option<crate::tgt::TagTree>,
    /// Bitmap of (layer) -> whether this precinct's packet has already been written/read, one
    /// bit per layer, enforcing "at most once per tile across all tile-parts" (spec section 3).
    written_layers: Vec<bool>,
}

impl Precinct {
    pub fn new(rect: Rect, cblk_log2_w: u32, cblk_log2_h: u32, num_layers: usize) -> Self {
        let (cblk_grid_w, cblk_grid_h) = if rect.is_empty() {
            (0, 0)
        } else {
            let bw = 1i64 << cblk_log2_w;
            let bh = 1i64 << cblk_log2_h;
            let gx0 = rect.x0.div_euclid(bw);
            let gx1 = (rect.x1 + bw - 1).div_euclid(bw);
            let gy0 = rect.y0.div_euclid(bh);
            let gy1 = (rect.y1 + bh - 1).div_euclid(bh);
            ((gx1 - gx0).max(0) as u32, (gy1 - gy0).max(0) as u32)
        };
        let count = (cblk_grid_w as usize) * (cblk_grid_h as usize);
        let (inclusion_tree, zero_bitplane_tree) = if count > 0 {
            (
                Some(crate::tgt::TagTree::new(cblk_grid_w, cblk_grid_h)),
                Some(crate::tgt::TagTree::new(cblk_grid_w, cblk_grid_h)),
            )
        } else {
            (None, None)
        };
        Precinct {
            rect,
            cblk_grid_w,
            cblk_grid_h,
            cblk_log2_w,
            cblk_log2_h,
            cblks: (0..count).map(|_| None).collect(),
            inclusion_tree,
            zero_bitplane_tree,
            written_layers: vec![false; num_layers],
        }
    }

    pub fn num_codeblocks(&self) -> usize {
        self.cblks.len()
    }

    /// Creates the codeblock rectangle for grid cell `(gx, gy)`, clipped to the precinct.
    pub fn codeblock_rect(&self, gx: u32, gy: u32) -> Rect {
        let bw = 1i64 << self.cblk_log2_w;
        let bh = 1i64 << self.cblk_log2_h;
        let r = Rect::new(
            gx as i64 * bw,
            gy as i64 * bh,
            (gx as i64 + 1) * bw,
            (gy as i64 + 1) * bh,
        );
        r.intersect(&self.rect)
    }

    /// Lazily creates (if needed) and returns the codeblock at grid cell `(gx, gy)`.
    pub fn codeblock_mut(&mut self, gx: u32, gy: u32, num_bitplanes: u32) -> &mut Codeblock {
        let idx = (gy * self.cblk_grid_w + gx) as usize;
        if self.cblks[idx].is_none() {
            let rect = self.codeblock_rect(gx, gy);
            self.cblks[idx] = Some(Codeblock::new(rect, num_bitplanes));
        }
        self.cblks[idx].as_mut().unwrap()
    }

    pub fn codeblock(&self, gx: u32, gy: u32) -> Option<&Codeblock> {
        let idx = (gy * self.cblk_grid_w + gx) as usize;
        self.cblks.get(idx).and_then(|c| c.as_ref())
    }

    pub fn iter_codeblocks(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let w = self.cblk_grid_w;
        (0..self.cblk_grid_h).flat_map(move |gy| (0..w).map(move |gx| (gx, gy)))
    }

    /// Marks `layer` of this precinct's packet as written/read; returns an error if it was
    /// already marked (spec section 3 invariant: "at most once per tile across all tile-parts").
    pub fn mark_packet(&mut self, layer: usize) -> Result<()> {
        match self.written_layers.get_mut(layer) {
            Some(flag) if !*flag => {
                *flag = true;
                Ok(())
            }
            Some(_) => Err(Error::format(format!(
                "packet (layer {layer}) already written/read for this precinct"
            ))),
            None => Err(Error::format("layer index out of range for this tile")),
        }
    }
}

/// One of LL/HL/LH/HH, the four outputs of one 2-D wavelet step (spec section 3, "Sub-band").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandKind {
    LL,
    HL,
    LH,
    HH,
}

/// Quantisation step size: `value = (1 + mantissa/2048) * 2^(-exponent)` relative to unit
/// dynamic range (spec section 3, QCD/QCC mantissa+exponent encoding, reused from `quant.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSize {
    pub mantissa: u16,
    pub exponent: u8,
}

/// A sub-band: canvas rectangle, quantisation parameters, guard bits, and the precinct grid
/// derived from the owning resolution's precinct partition (spec section 3, "Sub-band").
#[derive(Debug, Clone)]
pub struct Subband {
    pub kind: BandKind,
    pub rect: Rect,
    pub step_size: StepSize,
    pub guard_bits: u8,
    /// Precinct grid dimensions within this sub-band.
    pub precinct_grid_w: u32,
    pub precinct_grid_h: u32,
    precincts: Vec<Option<Precinct>>,
    pub log2_precinct_w: u32,
    pub log2_precinct_h: u32,
    pub log2_cblk_w: u32,
    pub log2_cblk_h: u32,
}

impl Subband {
    pub fn new(
        kind: BandKind,
        rect: Rect,
        step_size: StepSize,
        guard_bits: u8,
        log2_precinct_w: u32,
        log2_precinct_h: u32,
        log2_cblk_w: u32,
        log2_cblk_h: u32,
    ) -> Self {
        let (precinct_grid_w, precinct_grid_h) = if rect.is_empty() {
            (0, 0)
        } else {
            let pw = 1i64 << log2_precinct_w;
            let ph = 1i64 << log2_precinct_h;
            let gx0 = rect.x0.div_euclid(pw);
            let gx1 = (rect.x1 + pw - 1).div_euclid(pw);
            let gy0 = rect.y0.div_euclid(ph);
            let gy1 = (rect.y1 + ph - 1).div_euclid(ph);
            ((gx1 - gx0).max(0) as u32, (gy1 - gy0).max(0) as u32)
        };
        let count = (precinct_grid_w as usize) * (precinct_grid_h as usize);
        Subband {
            kind,
            rect,
            step_size,
            guard_bits,
            precinct_grid_w,
            precinct_grid_h,
            precincts: (0..count).map(|_| None).collect(),
            log2_precinct_w,
            log2_precinct_h,
            log2_cblk_w,
            log2_cblk_h,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }

    fn precinct_rect(&self, gx: u32, gy: u32) -> Rect {
        let pw = 1i64 << self.log2_precinct_w;
        let ph = 1i64 << self.log2_precinct_h;
        let r = Rect::new(
            gx as i64 * pw,
            gy as i64 * ph,
            (gx as i64 + 1) * pw,
            (gy as i64 + 1) * ph,
        );
        r.intersect(&self.rect)
    }

    /// Lazily creates (if needed) and returns the precinct at grid cell `(gx, gy)`.
    pub fn precinct_mut(&mut self, gx: u32, gy: u32, num_layers: usize) -> &mut Precinct {
        let idx = (gy * self.precinct_grid_w + gx) as usize;
        if self.precincts[idx].is_none() {
            let rect = self.precinct_rect(gx, gy);
            // Codeblock log2 dims are bounded by min(10, precinct_exp - 1), sum <= 12 (spec
            // section 3, "Precinct").
            let cblk_log2_w = self.log2_cblk_w.min(self.log2_precinct_w.saturating_sub(1).max(0)).min(10);
            let cblk_log2_h = self.log2_cblk_h.min(self.log2_precinct_h.saturating_sub(1).max(0)).min(10);
            self.precincts[idx] = Some(Precinct::new(rect, cblk_log2_w.max(0), cblk_log2_h.max(0), num_layers));
        }
        self.precincts[idx].as_mut().unwrap()
    }

    pub fn precinct(&self, gx: u32, gy: u32) -> Option<&Precinct> {
        let idx = (gy * self.precinct_grid_w + gx) as usize;
        self.precincts.get(idx).and_then(|p| p.as_ref())
    }

    pub fn num_precincts(&self) -> usize {
        self.precincts.len()
    }
}

/// A dyadic resolution level: 1 sub-band at r=0 (LL only), 3 at r>0 (HL, LH, HH) (spec
/// section 3, "TileComponent").
#[derive(Debug, Clone)]
pub struct Resolution {
    pub index: u32,
    pub rect: Rect,
    pub bands: Vec<Subband>,
}

impl Resolution {
    pub fn is_lowest(&self) -> bool {
        self.index == 0
    }

    pub fn ll(&self) -> Option<&Subband> {
        if self.is_lowest() {
            self.bands.first()
        } else {
            None
        }
    }
}

/// Per-component tile-coding parameters (spec section 3, "TileCodingParams (TCP)" ->
/// per-component part).
#[derive(Debug, Clone)]
pub struct TileComponentCodingParams {
    pub num_resolutions: u32,
    pub log2_cblk_w: u32,
    pub log2_cblk_h: u32,
    pub cblk_style: CblkStyle,
    pub reversible: bool,
    /// Per-resolution precinct exponents (width, height); length == num_resolutions.
    pub precinct_exp: Vec<(u32, u32)>,
    /// Per-sub-band step sizes, ordered LL, then (HL,LH,HH) per resolution from coarsest+1.
    pub step_sizes: Vec<StepSize>,
    pub guard_bits: u8,
    /// ROI shift, 0 when no region of interest is selected (spec section 3, "ROI shift").
    pub roi_shift: u8,
}

impl Default for TileComponentCodingParams {
    fn default() -> Self {
        TileComponentCodingParams {
            num_resolutions: 6,
            log2_cblk_w: 6,
            log2_cblk_h: 6,
            cblk_style: CblkStyle::empty(),
            reversible: true,
            precinct_exp: vec![(15, 15); 6],
            step_sizes: Vec::new(),
            guard_bits: crate::consts::DEFAULT_GUARD_BITS,
            roi_shift: 0,
        }
    }
}

/// One progression-order-change range: layer/resolution/component/precinct bounds (spec
/// section 3, "TCP" progression order list; spec section 4.6, POC markers).
#[derive(Debug, Clone, Copy)]
pub struct ProgressionRange {
    pub layer_start: u32,
    pub layer_end: u32,
    pub res_start: u32,
    pub res_end: u32,
    pub comp_start: u32,
    pub comp_end: u32,
    pub precinct_start: u32,
    pub precinct_end: u32,
    pub order: ProgOrder,
}

/// Per-tile coding parameters, cloned from the default TCP on first SOT for that tile (spec
/// section 3, "Lifecycle").
#[derive(Debug, Clone)]
pub struct TileCodingParams {
    pub progressions: Vec<ProgressionRange>,
    pub num_layers: u32,
    pub mct: MctMode,
    pub comps: Vec<TileComponentCodingParams>,
    /// Target byte budget per layer, if rate-controlled (spec section 4.7); `None` entries mean
    /// "use all available passes" (reversible/lossless single-layer case).
    pub layer_rates: Vec<Option<u32>>,
}

impl TileCodingParams {
    pub fn new(num_comps: usize, order: ProgOrder) -> Self {
        TileCodingParams {
            progressions: vec![ProgressionRange {
                layer_start: 0,
                layer_end: 1,
                res_start: 0,
                res_end: 6,
                comp_start: 0,
                comp_end: num_comps as u32,
                precinct_start: 0,
                precinct_end: u32::MAX,
                order,
            }],
            num_layers: 1,
            mct: MctMode::Off,
            comps: vec![TileComponentCodingParams::default(); num_comps],
            layer_rates: vec![None],
        }
    }
}

/// Image-wide tile grid and default coding parameters (spec section 3, "CodingParams (CP)").
#[derive(Debug, Clone)]
pub struct CodingParams {
    pub tile_grid: Rect,
    pub tile_w: u32,
    pub tile_h: u32,
    pub default_tcp: TileCodingParams,
    /// Per-tile overrides, indexed by tile number; absent entries use `default_tcp`.
    pub tile_tcps: std::collections::HashMap<u32, TileCodingParams>,
    /// `true` once the CAP marker declares Part-15 (HTJ2K) capability.
    pub ht_capable: bool,
}

impl CodingParams {
    pub fn tiles_across(&self, image_rect: &Rect) -> u32 {
        if self.tile_w == 0 {
            return 1;
        }
        let w = (image_rect.x1 - self.tile_grid.x0).max(0);
        ((w + self.tile_w as i64 - 1) / self.tile_w as i64).max(1) as u32
    }

    pub fn tiles_down(&self, image_rect: &Rect) -> u32 {
        if self.tile_h == 0 {
            return 1;
        }
        let h = (image_rect.y1 - self.tile_grid.y0).max(0);
        ((h + self.tile_h as i64 - 1) / self.tile_h as i64).max(1) as u32
    }

    /// The coding parameters in effect for `tile_idx`: a tile override if one was parsed from a
    /// tile-part header, else a clone of the default (spec section 3, "Lifecycle").
    pub fn tcp_for(&self, tile_idx: u32) -> TileCodingParams {
        self.tile_tcps
            .get(&tile_idx)
            .cloned()
            .unwrap_or_else(|| self.default_tcp.clone())
    }

    /// Canvas rectangle of tile `(tx, ty)` clipped to the image.
    pub fn tile_rect(&self, tx: u32, ty: u32, image_rect: &Rect) -> Rect {
        let r = Rect::new(
            self.tile_grid.x0 + tx as i64 * self.tile_w as i64,
            self.tile_grid.y0 + ty as i64 * self.tile_h as i64,
            self.tile_grid.x0 + (tx as i64 + 1) * self.tile_w as i64,
            self.tile_grid.y0 + (ty as i64 + 1) * self.tile_h as i64,
        );
        r.intersect(image_rect)
    }
}

/// One image component's data within one tile: the component-sub-sampled intersection of the
/// image component's canvas rectangle with the tile (spec section 3, "Tile").
#[derive(Debug, Clone)]
pub struct TileComponent {
    pub rect: Rect,
    pub resolutions: Vec<Resolution>,
    pub dx: u32,
    pub dy: u32,
}

impl TileComponent {
    pub fn num_resolutions(&self) -> u32 {
        self.resolutions.len() as u32
    }
}

/// A tile: canvas rectangle plus one `TileComponent` per image component (spec section 3,
/// "Tile").
#[derive(Debug, Clone)]
pub struct Tile {
    pub index: u32,
    pub rect: Rect,
    pub comps: Vec<TileComponent>,
    pub tcp: TileCodingParams,
}

/// Builds the resolution/sub-band/precinct skeleton for one tile-component, without allocating
/// any codeblocks (those are created lazily from the block cache, spec section 3 "Lifecycle").
pub fn build_tile_component(
    tile_comp_rect: Rect,
    dx: u32,
    dy: u32,
    tccp: &TileComponentCodingParams,
) -> Result<TileComponent> {
    let r = tccp.num_resolutions;
    if r == 0 || r > crate::consts::MAX_RESOLUTIONS {
        return Err(Error::unsupported(format!(
            "numresolutions {r} out of range [1,{}]",
            crate::consts::MAX_RESOLUTIONS
        )));
    }
    let mut resolutions = Vec::with_capacity(r as usize);
    for res_idx in 0..r {
        let levels = r - 1 - res_idx;
        let res_rect = tile_comp_rect.ceil_div_pow2(levels);
        let (pexp_x, pexp_y) = tccp
            .precinct_exp
            .get(res_idx as usize)
            .copied()
            .unwrap_or((15, 15));
        let guard = tccp.guard_bits;
        let step = tccp
            .step_sizes
            .get(res_idx as usize)
            .copied()
            .unwrap_or(StepSize {
                mantissa: 0,
                exponent: 0,
            });
        let bands = if res_idx == 0 {
            vec![Subband::new(
                BandKind::LL,
                res_rect,
                step,
                guard,
                pexp_x,
                pexp_y,
                tccp.log2_cblk_w,
                tccp.log2_cblk_h,
            )]
        } else {
            // HL/LH/LH subsample the parent canvas rect by 2 along the relevant axis relative
            // to the coarser resolution's rectangle (spec section 3: "Each resolution has ...
            // 3 [sub-bands] at r>0 (HL, LH, HH)").
            let half = res_rect.ceil_div_pow2(1);
            vec![
                Subband::new(BandKind::HL, half, step, guard, pexp_x, pexp_y, tccp.log2_cblk_w, tccp.log2_cblk_h),
                Subband::new(BandKind::LH, half, step, guard, pexp_x, pexp_y, tccp.log2_cblk_w, tccp.log2_cblk_h),
                Subband::new(BandKind::HH, half, step, guard, pexp_x, pexp_y, tccp.log2_cblk_w, tccp.log2_cblk_h),
            ]
        };
        resolutions.push(Resolution {
            index: res_idx,
            rect: res_rect,
            bands,
        });
    }
    Ok(TileComponent {
        rect: tile_comp_rect,
        resolutions,
        dx,
        dy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tccp(numres: u32) -> TileComponentCodingParams {
        TileComponentCodingParams {
            num_resolutions: numres,
            precinct_exp: vec![(15, 15); numres as usize],
            ..Default::default()
        }
    }

    #[test]
    fn resolution_count_and_band_shape() {
        let tile_rect = Rect::new(0, 0, 256, 256);
        let tc = build_tile_component(tile_rect, 1, 1, &tccp(4)).unwrap();
        assert_eq!(tc.resolutions.len(), 4);
        assert_eq!(tc.resolutions[0].bands.len(), 1);
        for r in &tc.resolutions[1..] {
            assert_eq!(r.bands.len(), 3);
        }
        // Finest resolution rectangle equals the full tile-component rectangle.
        assert_eq!(tc.resolutions[3].rect, tile_rect);
    }

    #[test]
    fn packet_mark_rejects_double_write() {
        let mut p = Precinct::new(Rect::new(0, 0, 64, 64), 6, 6, 2);
        p.mark_packet(0).unwrap();
        assert!(p.mark_packet(0).is_err());
        p.mark_packet(1).unwrap();
    }

    #[test]
    fn codeblock_invariants_hold() {
        let mut cb = Codeblock::new(Rect::new(0, 0, 8, 8), 5);
        cb.segments.push(Segment {
            data: vec![1, 2, 3],
            num_passes: 4,
        });
        cb.num_passes_total = 4;
        cb.check_invariants().unwrap();
        cb.num_passes_total = 999;
        assert!(cb.check_invariants().is_err());
    }

    #[test]
    fn invalid_numresolutions_rejected() {
        let tile_rect = Rect::new(0, 0, 16, 16);
        assert!(build_tile_component(tile_rect, 1, 1, &tccp(0)).is_err());
        assert!(build_tile_component(tile_rect, 1, 1, &tccp(34)).is_err());
    }
}
