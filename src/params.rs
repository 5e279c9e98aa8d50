//! Compression/decompression parameter structs (spec section 6): the configuration surface a
//! host fills in before calling into [`crate::codec`].
//!
//! The teacher exposes this as two big C structs (`opj_cparameters_t`/`opj_dparameters_t`) with
//! every field public and a `_default` initialiser function; this module keeps that same flat,
//! all-public-fields shape (spec section 6 lists the fields directly) but replaces the
//! `..._default()` C functions with `impl Default`, the idiomatic equivalent.

use crate::consts::ProgOrder;
use crate::geometry::Rect;

/// Compression-side configuration (spec section 6).
#[derive(Debug, Clone)]
pub struct CompressParameters {
    pub irreversible: bool,
    pub cblk_style: crate::consts::cblk_sty::CblkStyle,
    pub num_resolutions: u32,
    pub prog_order: ProgOrder,
    pub num_layers: u32,
    /// Target byte budget per layer; `None` means "include every coding pass" (lossless).
    pub layer_rates: Vec<Option<u32>>,
    pub tile_size_on: bool,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_origin_x: i64,
    pub tile_origin_y: i64,
    pub mct: bool,
    pub log2_cblk_w: u32,
    pub log2_cblk_h: u32,
    pub num_worker_threads: usize,
}

impl Default for CompressParameters {
    fn default() -> Self {
        CompressParameters {
            irreversible: false,
            cblk_style: crate::consts::cblk_sty::CblkStyle::empty(),
            num_resolutions: 6,
            prog_order: ProgOrder::Lrcp,
            num_layers: 1,
            layer_rates: vec![None],
            tile_size_on: false,
            tile_width: 0,
            tile_height: 0,
            tile_origin_x: 0,
            tile_origin_y: 0,
            mct: false,
            log2_cblk_w: 6,
            log2_cblk_h: 6,
            num_worker_threads: crate::scheduler::Scheduler::default_worker_count(),
        }
    }
}

/// Decompression-side configuration (spec section 6): resolution reduction, decode window,
/// tile-of-interest selection, layer cap, and tile-cache retention strategy.
#[derive(Debug, Clone)]
pub struct DecompressParameters {
    /// Number of finest resolution levels to discard (spec section 4.3, "Resolution reduction").
    pub reduce_resolutions: u32,
    /// Only decode samples within this window, in image coordinates (spec section 4.9,
    /// "Windowed/partial decode"); `None` decodes the whole image.
    pub decode_window: Option<Rect>,
    /// Decode only this tile index; `None` decodes every tile.
    pub tile_index: Option<u32>,
    /// Stop once this many quality layers have been consumed; `0` means "all available layers".
    pub max_layers: u32,
    pub num_worker_threads: usize,
    /// Retain decoded tile coefficient caches after emission, for repeated windowed access to
    /// the same tile (spec section 4.9); `false` releases each tile's cache once emitted.
    pub retain_tile_cache: bool,
}

impl Default for DecompressParameters {
    fn default() -> Self {
        DecompressParameters {
            reduce_resolutions: 0,
            decode_window: None,
            tile_index: None,
            max_layers: 0,
            num_worker_threads: crate::scheduler::Scheduler::default_worker_count(),
            retain_tile_cache: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_defaults_are_lossless_single_layer() {
        let p = CompressParameters::default();
        assert!(!p.irreversible);
        assert_eq!(p.num_layers, 1);
        assert_eq!(p.layer_rates, vec![None]);
    }

    #[test]
    fn decompress_defaults_decode_everything() {
        let p = DecompressParameters::default();
        assert_eq!(p.reduce_resolutions, 0);
        assert!(p.decode_window.is_none());
        assert!(p.tile_index.is_none());
        assert_eq!(p.max_layers, 0);
    }
}
