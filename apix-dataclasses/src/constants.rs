//! Matrix geometry and calibration defaults
//!
//! The ATLASPix1 family comes in three flavors which differ
//! in matrix size. The protocol field widths are the same
//! for all of them.

/// M1/M1Iso matrix geometry
pub const NCOL_M1 : u32 = 25;
pub const NROW_M1 : u32 = 400;

/// M2 matrix geometry
pub const NCOL_M2 : u32 = 56;
pub const NROW_M2 : u32 = 320;

/// injection fan-out granularity - pixels of the same
/// injection line are `GROUP_WIDTH` columns/`GROUP_HEIGHT`
/// rows apart, so a scan step never stimulates neighbours
pub const GROUP_WIDTH  : u32 = 5;
pub const GROUP_HEIGHT : u32 = 25;

/// width of the coarse (ts1) hit timestamp in bits
pub const TS1_NBITS : u32 = 10;
/// width of the fine (ts2) hit timestamp in bits
pub const TS2_NBITS : u32 = 6;

/// consecutive empty FIFO polls before a bounded
/// calibration read gives up
pub const IDLE_POLL_LIMIT : u32 = 2000;

/// per-step hit ceiling during calibration. More hits than
/// this within a single scan step means a noise runaway and
/// the step has to be aborted
pub const NOISE_CEILING : u32 = 6000;

/// trim search start value (mid range)
pub const TRIM_START : u8 = 4;
/// largest trim value the 3 bit DAC can hold
pub const TRIM_MAX : u8 = 7;
/// hard cap on trim search iterations per pixel
pub const TRIM_ITERATION_CAP : u32 = 8;
/// targeted hit fraction at the reference amplitude
pub const TRIM_TARGET : f64 = 0.5;
/// accepted band around the target
pub const TRIM_MARGIN : f64 = 0.05;

/// per-group hit count above which a pixel is considered hot
/// during a scan step
pub const HOT_PIXEL_COUNT : u32 = 250;
