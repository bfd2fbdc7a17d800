//! Hardware address map of the readout firmware
//!
//! The FPGA exposes four register windows in physical
//! memory. Each register is one 32 bit word, offsets are in
//! bytes relative to the window base. Registers holding
//! several fields are noted with their bit ranges.

/// the register windows are mapped out of physical memory
pub const MEM_DEVICE : &'static str = "/dev/mem";

//========== readout window =============
//
//=======================================

pub const READOUT_BASE     : u64   = 0x43C7_0000;
pub const READOUT_MAP_SIZE : usize = 16 * 4096;

pub const FIFO_DATA   : u32 = 0x0;  // pop one protocol word
pub const FIFO_STATUS : u32 = 0x4;  // [0] word available  [5] serdes locked
pub const FIFO_CONFIG : u32 = 0x8;  // [4] fifo reset strobe
pub const RO_CONFIG   : u32 = 0x10; // [7:0] ckdivend mirror of the readout state machine
pub const TRG_CNT     : u32 = 0x18; // triggers accepted by the readout state machine

//========== pulser window ==============

pub const PULSER_BASE     : u64   = 0x43C1_0000;
pub const PULSER_MAP_SIZE : usize = 4096;

pub const INJ_FLAG             : u32 = 0x0;  // write 1 to fire the armed pulse train
pub const PULSE_COUNT          : u32 = 0x4;
pub const HIGH_CNT             : u32 = 0x8;  // ticks the pulse stays high
pub const LOW_CNT              : u32 = 0xC;  // ticks the pulse stays low
pub const PULSER_OUTPUT_ENABLE : u32 = 0x10;
pub const PULSER_RST           : u32 = 0x14;

/// pulse shape ticks run on the injection clock
pub const INJECTION_CLOCK_HZ : f64 = 160.0e6;

//========== counter window =============

pub const COUNTER_BASE     : u64   = 0x43C0_0000;
pub const COUNTER_MAP_SIZE : usize = 4096;

pub const CNT_VALUE_0  : u32 = 0x0;
pub const CNT_VALUE_1  : u32 = 0x4;
pub const CNT_VALUE_2  : u32 = 0x8;  // triggers accepted (ext)
pub const CNT_VALUE_3  : u32 = 0xC;  // triggers received
pub const CNT_RST      : u32 = 0x10;
pub const GLOBAL_RESET : u32 = 0x14;

//====== control (shift register) window

pub const CONTROL_BASE     : u64   = 0x43C2_0000;
pub const CONTROL_MAP_SIZE : usize = 4096;

pub const RAM_ADDRESS      : u32 = 0x0;
pub const RAM_CONTENT      : u32 = 0x4;
pub const RAM_WRITE_ENABLE : u32 = 0x8;
pub const RAM_REG_LIMIT    : u32 = 0xC;  // index of the last image word
pub const RAM_SHIFT_LIMIT  : u32 = 0x10; // extra bits in the last word
pub const CONFIG_FLAG      : u32 = 0x14; // write 1 to clock the image into the chip
pub const SR_OUTPUT_ENABLE : u32 = 0x1C;
