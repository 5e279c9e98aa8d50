//! Raster image data model (spec section 3: "Image").
//!
//! Mirrors the field set of the teacher's `opj_image` / `opj_image_comptparm` (`image.rs`) but
//! replaces the raw `*mut OPJ_INT32` sample buffer with an owned `Vec<i32>` plus an explicit
//! stride, since nothing here needs to interoperate with a C ABI (the `c_api` surface is
//! dropped, see DESIGN.md).

use crate::consts::{MAX_COMPONENTS, MAX_IMAGE_PRECISION};
use crate::error::{Error, Result};
use crate::geometry::Rect;

/// Per-component sub-sampling, precision and signedness (`Ssiz`/`XRsiz`/`YRsiz` of the SIZ
/// marker, spec section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentParams {
    pub dx: u32,
    pub dy: u32,
    pub precision: u32,
    pub signed: bool,
}

impl ComponentParams {
    pub fn validate(&self) -> Result<()> {
        if self.dx == 0 || self.dy == 0 {
            return Err(Error::format("component sub-sampling factor must be >= 1"));
        }
        if self.precision == 0 || self.precision > MAX_IMAGE_PRECISION {
            return Err(Error::format(format!(
                "component precision {} out of range [1,{}]",
                self.precision, MAX_IMAGE_PRECISION
            )));
        }
        Ok(())
    }

    /// Maximum representable sample value for this component's precision/signedness.
    pub fn max_value(&self) -> i32 {
        if self.signed {
            (1i32 << (self.precision - 1)) - 1
        } else {
            (1i32 << self.precision) - 1
        }
    }

    pub fn min_value(&self) -> i32 {
        if self.signed {
            -(1i32 << (self.precision - 1))
        } else {
            0
        }
    }
}

/// One decoded (or to-be-encoded) image component: a dense, signed 32-bit sample plane with a
/// row stride that may exceed the logical width (spec section 3: "a dense 32-bit-signed sample
/// array of width w, height h, with a row stride >= w").
#[derive(Debug, Clone)]
pub struct ImageComponent {
    pub params: ComponentParams,
    pub x0: u32,
    pub y0: u32,
    pub w: u32,
    pub h: u32,
    stride: u32,
    data: Vec<i32>,
}

impl ImageComponent {
    pub fn new(params: ComponentParams, x0: u32, y0: u32, w: u32, h: u32) -> Self {
        Self::with_stride(params, x0, y0, w, h, w)
    }

    pub fn with_stride(
        params: ComponentParams,
        x0: u32,
        y0: u32,
        w: u32,
        h: u32,
        stride: u32,
    ) -> Self {
        let stride = stride.max(w);
        let data = vec![0i32; (stride as usize) * (h as usize)];
        ImageComponent {
            params,
            x0,
            y0,
            w,
            h,
            stride,
            data,
        }
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn row(&self, y: u32) -> &[i32] {
        let start = (y as usize) * (self.stride as usize);
        &self.data[start..start + self.w as usize]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [i32] {
        let start = (y as usize) * (self.stride as usize);
        let w = self.w as usize;
        &mut self.data[start..start + w]
    }

    pub fn get(&self, x: u32, y: u32) -> i32 {
        self.data[(y as usize) * (self.stride as usize) + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, v: i32) {
        let idx = (y as usize) * (self.stride as usize) + x as usize;
        self.data[idx] = v;
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.data
    }

    pub fn rect(&self) -> Rect {
        Rect::new(
            self.x0 as i64,
            self.y0 as i64,
            self.x0 as i64 + self.w as i64,
            self.y0 as i64 + self.h as i64,
        )
    }

    /// Clamp every sample to the component's representable range, used after lossy
    /// reconstruction (spec section 4.6's decode path feeding back into the raster).
    pub fn clamp_to_precision(&mut self) {
        let lo = self.params.min_value();
        let hi = self.params.max_value();
        for v in self.data.iter_mut() {
            *v = (*v).clamp(lo, hi);
        }
    }
}

/// The full raster image: origin, extent, and an ordered sequence of components (spec section 3).
#[derive(Debug, Clone)]
pub struct Image {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub comps: Vec<ImageComponent>,
}

impl Image {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Result<Self> {
        if x1 < x0 || y1 < y0 {
            return Err(Error::format("image extent precedes origin"));
        }
        Ok(Image {
            x0,
            y0,
            x1,
            y1,
            comps: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x0 as i64, self.y0 as i64, self.x1 as i64, self.y1 as i64)
    }

    pub fn push_component(&mut self, comp: ImageComponent) -> Result<()> {
        if self.comps.len() as u32 >= MAX_COMPONENTS {
            return Err(Error::resource(format!(
                "image already has the maximum of {} components",
                MAX_COMPONENTS
            )));
        }
        self.comps.push(comp);
        Ok(())
    }

    pub fn num_comps(&self) -> usize {
        self.comps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ComponentParams {
        ComponentParams {
            dx: 1,
            dy: 1,
            precision: 8,
            signed: false,
        }
    }

    #[test]
    fn unsigned_8bit_range() {
        let p = params();
        assert_eq!(p.min_value(), 0);
        assert_eq!(p.max_value(), 255);
    }

    #[test]
    fn signed_8bit_range() {
        let mut p = params();
        p.signed = true;
        assert_eq!(p.min_value(), -128);
        assert_eq!(p.max_value(), 127);
    }

    #[test]
    fn component_row_roundtrip() {
        let mut c = ImageComponent::new(params(), 0, 0, 4, 3);
        for y in 0..3 {
            for x in 0..4 {
                c.set(x, y, (x ^ y) as i32);
            }
        }
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(c.get(x, y), (x ^ y) as i32);
            }
        }
    }

    #[test]
    fn clamp_to_precision_clips() {
        let mut c = ImageComponent::new(params(), 0, 0, 2, 1);
        c.set(0, 0, 400);
        c.set(1, 0, -20);
        c.clamp_to_precision();
        assert_eq!(c.get(0, 0), 255);
        assert_eq!(c.get(1, 0), 0);
    }
}
