//! Sparse canvas / window buffer (spec section 4.4): a two-level block-tiled container over
//! canvas coordinates. Blocks are allocated lazily on first write; an unwritten block reads back
//! as zero when `force_return_true` is set, otherwise the read fails.
//!
//! Grounded on `examples/original_source/src/lib/jp2/tile/SparseCanvas.h` /
//! `src/lib/core/util/SparseBuffer.cpp` (the `SparseCanvas<LBW, LBH>` template and its
//! `blocks: SparseBlock**` grid), rewritten as a safe `Vec<Option<Box<[i32]>>>` grid instead of
//! an array of raw, individually-`new`-allocated block pointers.

use crate::error::{Error, Result};
use crate::geometry::Rect;

/// A sparse canvas over one sub-band's (or resolution's) coefficient plane.
pub struct SparseArray {
    log2_block_w: u32,
    log2_block_h: u32,
    bounds: Rect,
    grid_x0: i64,
    grid_y0: i64,
    grid_w: i64,
    grid_h: i64,
    blocks: Vec<Option<Box<[i32]>>>,
}

fn floordiv_pow2(v: i64, shift: u32) -> i64 {
    if v >= 0 {
        v >> shift
    } else {
        -(((-v) + (1 << shift) - 1) >> shift)
    }
}

fn ceildiv_pow2(v: i64, shift: u32) -> i64 {
    if v >= 0 {
        (v + (1 << shift) - 1) >> shift
    } else {
        -((-v) >> shift)
    }
}

impl SparseArray {
    /// `log2_block_w`/`log2_block_h` must be in `[3, 7]` (spec section 4.4); `bounds` is the
    /// canvas rectangle the sparse array covers (one sub-band or resolution).
    pub fn new(bounds: Rect, log2_block_w: u32, log2_block_h: u32) -> Result<Self> {
        if bounds.is_empty() {
            return Err(Error::format("sparse array bounds must be non-empty"));
        }
        if !(3..=7).contains(&log2_block_w) || !(3..=7).contains(&log2_block_h) {
            return Err(Error::format(
                "sparse array block log2 dimensions must be in [3,7]",
            ));
        }
        let grid_x0 = floordiv_pow2(bounds.x0, log2_block_w);
        let grid_y0 = floordiv_pow2(bounds.y0, log2_block_h);
        let grid_x1 = ceildiv_pow2(bounds.x1, log2_block_w);
        let grid_y1 = ceildiv_pow2(bounds.y1, log2_block_h);
        let grid_w = grid_x1 - grid_x0;
        let grid_h = grid_y1 - grid_y0;
        let count = (grid_w * grid_h).max(0) as usize;
        Ok(SparseArray {
            log2_block_w,
            log2_block_h,
            bounds,
            grid_x0,
            grid_y0,
            grid_w,
            grid_h,
            blocks: (0..count).map(|_| None).collect(),
        })
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn block_w(&self) -> i64 {
        1 << self.log2_block_w
    }

    pub fn block_h(&self) -> i64 {
        1 << self.log2_block_h
    }

    fn block_index(&self, gx: i64, gy: i64) -> Option<usize> {
        let lx = gx - self.grid_x0;
        let ly = gy - self.grid_y0;
        if lx < 0 || ly < 0 || lx >= self.grid_w || ly >= self.grid_h {
            return None;
        }
        Some((ly * self.grid_w + lx) as usize)
    }

    /// Ensures every block touching `window` exists, allocating (zero-filled) on demand (spec
    /// section 4.4 `alloc`).
    pub fn alloc(&mut self, window: Rect, _zero_fill: bool) -> Result<()> {
        let clipped = window.intersect(&self.bounds);
        if clipped.is_empty() {
            return Ok(());
        }
        let gx0 = floordiv_pow2(clipped.x0, self.log2_block_w);
        let gy0 = floordiv_pow2(clipped.y0, self.log2_block_h);
        let gx1 = ceildiv_pow2(clipped.x1, self.log2_block_w);
        let gy1 = ceildiv_pow2(clipped.y1, self.log2_block_h);
        for gy in gy0..gy1 {
            for gx in gx0..gx1 {
                if let Some(idx) = self.block_index(gx, gy) {
                    if self.blocks[idx].is_none() {
                        let area = (self.block_w() * self.block_h()) as usize;
                        self.blocks[idx] = Some(vec![0i32; area].into_boxed_slice());
                    }
                }
            }
        }
        Ok(())
    }

    /// Reads `window` into `dest`, addressed with the given column/row strides (spec section
    /// 4.4 `read`). An unwritten block contributes zeros when `force_return_true` is set;
    /// otherwise the read fails.
    pub fn read(
        &self,
        window: Rect,
        dest: &mut [i32],
        dest_col_stride: i64,
        dest_row_stride: i64,
        force_return_true: bool,
    ) -> Result<()> {
        let clipped = window.intersect(&self.bounds);
        if clipped.is_empty() {
            return Ok(());
        }
        let bw = self.block_w();
        let bh = self.block_h();
        for y in clipped.y0..clipped.y1 {
            let gy = floordiv_pow2(y, self.log2_block_h);
            let local_y = y - gy * bh;
            for x in clipped.x0..clipped.x1 {
                let gx = floordiv_pow2(x, self.log2_block_w);
                let local_x = x - gx * bw;
                let dest_off =
                    ((y - window.y0) * dest_row_stride + (x - window.x0) * dest_col_stride) as usize;
                match self.block_index(gx, gy).and_then(|idx| self.blocks[idx].as_deref()) {
                    Some(block) => {
                        let block_off = (local_y * bw + local_x) as usize;
                        dest[dest_off] = block[block_off];
                    }
                    None => {
                        if force_return_true {
                            dest[dest_off] = 0;
                        } else {
                            return Err(Error::resource("read from unwritten sparse-array block"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes `src` into `window` (spec section 4.4 `write`), allocating blocks on first touch.
    pub fn write(
        &mut self,
        window: Rect,
        src: &[i32],
        src_col_stride: i64,
        src_row_stride: i64,
    ) -> Result<()> {
        self.alloc(window, true)?;
        let clipped = window.intersect(&self.bounds);
        if clipped.is_empty() {
            return Ok(());
        }
        let bw = self.block_w();
        let bh = self.block_h();
        for y in clipped.y0..clipped.y1 {
            let gy = floordiv_pow2(y, self.log2_block_h);
            let local_y = y - gy * bh;
            for x in clipped.x0..clipped.x1 {
                let gx = floordiv_pow2(x, self.log2_block_w);
                let local_x = x - gx * bw;
                let src_off =
                    ((y - window.y0) * src_row_stride + (x - window.x0) * src_col_stride) as usize;
                if let Some(idx) = self.block_index(gx, gy) {
                    if let Some(block) = self.blocks[idx].as_mut() {
                        let block_off = (local_y * bw + local_x) as usize;
                        block[block_off] = src[src_off];
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_matches_on_intersection_zero_elsewhere() {
        let bounds = Rect::new(0, 0, 64, 64);
        let mut arr = SparseArray::new(bounds, 4, 4).unwrap(); // 16x16 blocks

        let write_rect = Rect::new(10, 10, 20, 20);
        let src: Vec<i32> = (0..100).collect();
        arr.write(write_rect, &src, 1, 10).unwrap();

        let read_rect = Rect::new(5, 5, 25, 25);
        let mut dest = vec![-1i32; 20 * 20];
        arr.read(read_rect, &mut dest, 1, 20, true).unwrap();

        for y in 0..20 {
            for x in 0..20 {
                let cx = 5 + x;
                let cy = 5 + y;
                let v = dest[(y * 20 + x) as usize];
                if write_rect.contains_point(cx, cy) {
                    let sx = cx - write_rect.x0;
                    let sy = cy - write_rect.y0;
                    assert_eq!(v, src[(sy * 10 + sx) as usize]);
                } else {
                    assert_eq!(v, 0);
                }
            }
        }
    }

    #[test]
    fn read_unwritten_without_force_fails() {
        let bounds = Rect::new(0, 0, 64, 64);
        let arr = SparseArray::new(bounds, 3, 3).unwrap();
        let mut dest = vec![0i32; 4];
        let res = arr.read(Rect::new(0, 0, 2, 2), &mut dest, 1, 2, false);
        assert!(res.is_err());
    }

    #[test]
    fn rejects_invalid_block_log2() {
        let bounds = Rect::new(0, 0, 16, 16);
        assert!(SparseArray::new(bounds, 2, 4).is_err());
        assert!(SparseArray::new(bounds, 4, 8).is_err());
    }
}
