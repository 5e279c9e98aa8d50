//! Codestream constants: marker identifiers and structural limits.
//!
//! Marker values are taken verbatim from ITU-T T.800 / T.814 (spec section 6); limits (max
//! resolutions, max precinct/codeblock exponents...) are the ones the marker parser enforces in
//! section 4.1.

#![allow(dead_code)]

/// Two-byte big-endian marker identifiers. The high byte is always 0xFF.
pub mod marker {
    pub const SOC: u16 = 0xFF4F;
    pub const SIZ: u16 = 0xFF51;
    pub const CAP: u16 = 0xFF50;
    pub const COD: u16 = 0xFF52;
    pub const COC: u16 = 0xFF53;
    pub const QCD: u16 = 0xFF5C;
    pub const QCC: u16 = 0xFF5D;
    pub const RGN: u16 = 0xFF5E;
    pub const POC: u16 = 0xFF5F;
    pub const PPM: u16 = 0xFF60;
    pub const PPT: u16 = 0xFF61;
    pub const CRG: u16 = 0xFF63;
    pub const COM: u16 = 0xFF64;
    pub const TLM: u16 = 0xFF55;
    pub const PLM: u16 = 0xFF57;
    pub const PLT: u16 = 0xFF58;
    pub const SOT: u16 = 0xFF90;
    pub const SOP: u16 = 0xFF91;
    pub const EPH: u16 = 0xFF92;
    pub const SOD: u16 = 0xFF93;
    pub const EOC: u16 = 0xFFD9;
    pub const MCT: u16 = 0xFF74;
    pub const MCC: u16 = 0xFF75;
    pub const MCO: u16 = 0xFF77;
}

/// Magic bytes identifying a bare J2K codestream (first four bytes = SOC, SIZ high byte/id).
pub const J2K_CODESTREAM_MAGIC: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

/// JP2 file signature box magic (RFC 3745); detection only — JP2 box parsing itself is out of
/// scope for this crate (spec section 1, Out of scope).
pub const JP2_RFC3745_MAGIC: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0c, 0x6a, 0x50, 0x20, 0x20, 0x0d, 0x0a, 0x87, 0x0a,
];

/// Maximum number of wavelet resolution levels (`numresolutions <= 33`); 33 itself is a decoder
/// error (spec section 4.1).
pub const MAX_RESOLUTIONS: u32 = 33;

/// Maximum sample precision in bits (spec section 3: p in [1,38] for derived component
/// arithmetic, though image-level precision is bounded to 16 per spec section 1).
pub const MAX_COMPONENT_PRECISION: u32 = 38;
pub const MAX_IMAGE_PRECISION: u32 = 16;

/// Maximum number of image components (spec section 1).
pub const MAX_COMPONENTS: u32 = 16384;

/// Maximum number of quality layers (`numlayers`, 16-bit field).
pub const MAX_LAYERS: u32 = 65535;

/// Nominal codeblock dimension bound: log2 width/height <= 10, sum <= 12 (spec section 3).
pub const MAX_CBLK_LOG2: u32 = 10;
pub const MAX_CBLK_LOG2_SUM: u32 = 12;
pub const MIN_CBLK_LOG2: u32 = 2;

/// Precinct log2 width/height range (spec section 3).
pub const MAX_PRECINCT_LOG2: u32 = 15;

/// Sparse-canvas block dimension exponent range (spec section 4.4).
pub const MIN_SPARSE_BLOCK_LOG2: u32 = 3;
pub const MAX_SPARSE_BLOCK_LOG2: u32 = 7;

/// Progression orders (spec section 4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProgOrder {
    Lrcp = 0,
    Rlcp = 1,
    Rpcl = 2,
    Pcrl = 3,
    Cprl = 4,
}

impl ProgOrder {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ProgOrder::Lrcp),
            1 => Some(ProgOrder::Rlcp),
            2 => Some(ProgOrder::Rpcl),
            3 => Some(ProgOrder::Pcrl),
            4 => Some(ProgOrder::Cprl),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Codeblock style flag bits (`cblk_sty`, spec section 6).
pub mod cblk_sty {
    bitflags::bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct CblkStyle: u8 {
            /// Selective arithmetic coding bypass ("lazy" coding of cleanup passes).
            const LAZY = 0x01;
            /// Reset context probabilities on each coding pass.
            const RESET = 0x02;
            /// Terminate the arithmetic coder after every coding pass.
            const TERMALL = 0x04;
            /// Vertically causal context formation.
            const VCAUSAL = 0x08;
            /// Predictable termination.
            const PREDICTABLE_TERMINATION = 0x10;
            /// Segmentation symbols at the end of each cleanup pass.
            const SEGSYM = 0x20;
            /// HT (Part 15) mixed coding mode: HT cleanup pass, MQ refinement passes.
            const HT_MIXED = 0x40;
        }
    }
}

/// Multi-component transform selector (spec section 6 `mct` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MctMode {
    Off,
    /// Reversible (RCT) if the wavelet is reversible, irreversible (ICT) otherwise.
    Standard,
    Custom,
}

/// Guard bits added atop the quantised dynamic range (QCD/QCC default, spec section 3).
pub const DEFAULT_GUARD_BITS: u8 = 2;
