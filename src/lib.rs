//! A core JPEG 2000 (ITU-T T.800) / HTJ2K (ITU-T T.814) codestream codec: markers, wavelet
//! transforms, Tier-1/Tier-2 engines, rate-distortion allocation and a work-stealing scheduler,
//! wired together by [`codec::Encoder`]/[`codec::Decoder`].
//!
//! Layered bottom-up, each module owning one concern the teacher's `openjp2-rs` folds into its
//! monolithic `tcd`/`j2k`/`t1`/`t2` files:
//!
//! - [`geometry`], [`image`]: canvas rectangles and the raster sample model.
//! - [`consts`]: marker ids, coding-style bitflags, hard limits.
//! - [`bio`], [`mqc`]: bitstream and MQ arithmetic coder primitives.
//! - [`wavelet`], [`quant`], [`mct`]: the per-sample transform chain.
//! - [`tcd`]: the tile/resolution/sub-band/precinct/codeblock arena.
//! - [`tgt`], [`t1`], [`t2`]: tag trees, Tier-1 block coding, Tier-2 packet coding.
//! - [`ht`]: the Part 15 (T.814) high-throughput block coder alternative to [`t1`]'s MQ coder.
//! - [`rate`]: rate-distortion layer allocation.
//! - [`markers`], [`j2k`]: marker body codecs and the codestream state machine.
//! - [`scheduler`], [`sparse_array`], [`strip_cache`]: the concurrent decode/encode ambient stack.
//! - [`stream`]: the byte-sink/source abstraction codec.rs reads and writes through.
//! - [`params`], [`error`]: public configuration and the crate's error taxonomy.

#![allow(dead_code)]

mod bio;
pub mod codec;
pub mod consts;
pub mod error;
pub mod geometry;
mod ht;
pub mod image;
pub mod j2k;
pub mod markers;
mod mct;
mod mqc;
pub mod params;
mod quant;
mod rate;
pub mod scheduler;
mod sparse_array;
pub mod stream;
mod strip_cache;
mod t1;
mod t2;
pub mod tcd;
mod tgt;
mod wavelet;

pub use codec::{Decoder, Encoder};
pub use error::{Error, Result};
pub use image::{ComponentParams, Image, ImageComponent};
pub use params::{CompressParameters, DecompressParameters};
