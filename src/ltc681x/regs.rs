//! Command words, register-group packing and conversion constants for the
//! LTC681x family.
#![allow(dead_code)]

use super::types::AdcMode;

/// Number of cell, wire and GPIO slots provisioned per device. Sized for the
/// largest supported variant; smaller variants leave the tail unused.
pub const CELL_COUNT_MAX: usize = 18;
pub const WIRE_COUNT_MAX: usize = CELL_COUNT_MAX + 1;
pub const GPIO_COUNT: usize = 5;

/// One register group on the wire: 6 payload bytes plus the 2-byte PEC.
pub const FRAME_SIZE: usize = 8;
pub const PAYLOAD_SIZE: usize = FRAME_SIZE - 2;

// Wakeup timing. See LTC6811 datasheet, pg.8, or LTC6813 datasheet, pg.7.
pub const T_WAKE_MAX_US: u32 = 400;
pub const T_READY_MAX_US: u32 = 10;

/// Pacing of the ADC completion poll, see [`Chain`](super::Chain).
pub const ADC_POLL_STEP_US: u32 = 100;

/// Total conversion time of the cell voltage ADC / GPIO ADC measuring all
/// cells / GPIO, in microseconds. Indexed by [`AdcMode`].
///
/// See LTC6811 datasheet, pg.25, or LTC6813 datasheet, pg.23.
pub const ADC_CONVERSION_US: [u32; 4] = [
    12_807,  // For 422 Hz mode
    1_113,   // For 27 kHz mode
    2_335,   // For 7 kHz mode
    202_000, // For 26 Hz mode
];

/// Total conversion time of the status register ADC measuring all values, in
/// microseconds. Indexed by [`AdcMode`].
///
/// See LTC6811 datasheet, pg.29, or LTC6813 datasheet, pg.27.
pub const STATUS_ADC_CONVERSION_US: [u32; 4] = [
    8_537,   // For 422 Hz mode
    748,     // For 27 kHz mode
    1_563,   // For 7 kHz mode
    135_000, // For 26 Hz mode
];

/// Command words.
/// See LTC6811 datasheet, pg.59, or LTC6813 datasheet, pg.60.
pub mod cmd {
    pub const WRCFGA: u16 = 0b000_0000_0001;
    pub const WRCFGB: u16 = 0b000_0010_0100;
    pub const RDCFGA: u16 = 0b000_0000_0010;
    pub const RDCFGB: u16 = 0b000_0010_0110;

    pub const RDCVA: u16 = 0b000_0000_0100;
    pub const RDCVB: u16 = 0b000_0000_0110;
    pub const RDCVC: u16 = 0b000_0000_1000;
    pub const RDCVD: u16 = 0b000_0000_1010;
    /// LTC6813 only.
    pub const RDCVE: u16 = 0b000_0000_1001;
    /// LTC6813 only.
    pub const RDCVF: u16 = 0b000_0000_1011;

    pub const RDAUXA: u16 = 0b000_0000_1100;
    pub const RDAUXB: u16 = 0b000_0000_1110;

    pub const RDSTATA: u16 = 0b000_0001_0000;
    pub const RDSTATB: u16 = 0b000_0001_0010;

    pub const PLADC: u16 = 0b111_0001_0100;
}

/// ADCV: start cell voltage conversion. `dcp` permits discharging to stay
/// enabled during the measurement, `channels` selects a cell pair subset
/// (0b000 measures all cells).
pub fn cmd_adcv(mode: AdcMode, dcp: bool, channels: u8) -> u16 {
    0b010_0110_0000 | ((mode as u16) << 7) | ((dcp as u16) << 4) | channels as u16
}

/// ADOW: start an open-wire conversion with the current sources parked
/// either pulling up or pulling down.
pub fn cmd_adow(mode: AdcMode, pull_up: bool, dcp: bool, channels: u8) -> u16 {
    0b010_0010_1000
        | ((mode as u16) << 7)
        | ((pull_up as u16) << 6)
        | ((dcp as u16) << 4)
        | channels as u16
}

/// ADAX: start a GPIO conversion. `channels` = 0b000 measures all GPIO and
/// the second reference.
pub fn cmd_adax(mode: AdcMode, channels: u8) -> u16 {
    0b100_0110_0000 | ((mode as u16) << 7) | channels as u16
}

/// ADSTAT: start a status group conversion. `channels` = 0b000 measures all
/// status values.
pub fn cmd_adstat(mode: AdcMode, channels: u8) -> u16 {
    0b100_0110_1000 | ((mode as u16) << 7) | channels as u16
}

// Undervoltage / overvoltage comparison thresholds, 16 * 100 uV / LSB.
// See LTC6811 datasheet, pg.60, or LTC6813 datasheet, pg.62.

pub fn vuv(volts: f32) -> u16 {
    ((volts * 625.0) as u16).wrapping_sub(1)
}

pub fn vov(volts: f32) -> u16 {
    (volts * 625.0) as u16
}

/// 100 uV / LSB.
pub const CELL_VOLTAGE_FACTOR: f32 = 0.0001;

pub fn word_to_cell_voltage(word: u16) -> f32 {
    word as f32 * CELL_VOLTAGE_FACTOR
}

// Configuration Register Group A.
// See LTC6811 datasheet, pg.62, or LTC6813 datasheet, pg.63.

/// CFGRA0: GPIO 1-5 pull-down disables, reference powered-up control and ADC
/// clock option.
pub fn cfgra0(gpio: [bool; 5], refon: bool, adcopt: bool) -> u8 {
    ((gpio[4] as u8) << 7)
        | ((gpio[3] as u8) << 6)
        | ((gpio[2] as u8) << 5)
        | ((gpio[1] as u8) << 4)
        | ((gpio[0] as u8) << 3)
        | ((refon as u8) << 2)
        | adcopt as u8
}

pub fn cfgra1(vuv: u16) -> u8 {
    vuv as u8
}

pub fn cfgra2(vuv: u16, vov: u16) -> u8 {
    ((vov << 4) | (vuv >> 8)) as u8
}

pub fn cfgra3(vov: u16) -> u8 {
    (vov >> 4) as u8
}

/// CFGRA4: discharge switches for cells 1-8. `dcc[0]` is cell 1.
pub fn cfgra4(dcc: &[bool]) -> u8 {
    let mut byte = 0;
    for (bit, &on) in dcc[0..8].iter().enumerate() {
        byte |= (on as u8) << bit;
    }
    byte
}

/// CFGRA5: discharge timeout code and discharge switches for cells 9-12.
pub fn cfgra5(dcto: u8, dcc: &[bool]) -> u8 {
    let mut byte = (dcto & 0x0F) << 4;
    for (bit, &on) in dcc[8..12].iter().enumerate() {
        byte |= (on as u8) << bit;
    }
    byte
}

// Configuration Register Group B (LTC6813 only; the LTC6811 ignores it).
// See LTC6813 datasheet, pg.63.

/// CFGRB0: GPIO 6-9 pull-down disables and discharge switches for cells
/// 13-16.
pub fn cfgrb0(gpio: [bool; 4], dcc: &[bool]) -> u8 {
    let mut byte = (gpio[0] as u8)
        | ((gpio[1] as u8) << 1)
        | ((gpio[2] as u8) << 2)
        | ((gpio[3] as u8) << 3);
    for (bit, &on) in dcc[12..16].iter().enumerate() {
        byte |= (on as u8) << (4 + bit);
    }
    byte
}

/// CFGRB1: digital redundancy path selection, discharge timer monitor and
/// discharge switches for cells 17, 18 and 0.
pub fn cfgrb1(fdrf: bool, ps: u8, dtmen: bool, dcc0: bool, dcc: &[bool]) -> u8 {
    ((fdrf as u8) << 6)
        | ((ps & 0b11) << 4)
        | ((dtmen as u8) << 3)
        | ((dcc0 as u8) << 2)
        | ((dcc[17] as u8) << 1)
        | dcc[16] as u8
}

// Reserved bytes of Configuration Register Group B.
pub const CFGRB2: u8 = 0x00;
pub const CFGRB3: u8 = 0x00;
pub const CFGRB4: u8 = 0x00;
pub const CFGRB5: u8 = 0x00;

// Status Register Group A.
// See LTC6811 datasheet, pg.63, or LTC6813 datasheet, pg.66.

/// SC: sum of all cell voltages, 30 * 100 uV / LSB.
pub fn star_sum_of_cells(lo: u8, hi: u8) -> f32 {
    u16::from_le_bytes([lo, hi]) as f32 * 0.002
}

/// ITMP: internal die temperature, 100 uV / 7.5 mV per degree, offset from
/// absolute zero.
pub fn star_die_temperature(lo: u8, hi: u8) -> f32 {
    u16::from_le_bytes([lo, hi]) as f32 * 0.1 / 7.5 - 273.0
}

// Status Register Group B.
// See LTC6811 datasheet, pg.64, or LTC6813 datasheet, pg.66.
//
// Bytes STBR2..STBR4 carry interleaved undervoltage / overvoltage comparator
// flags for four cells each: bit 2n is cell n's UV flag, bit 2n+1 its OV
// flag.

/// Cells covered by the comparator flags of Status Register Group B.
pub const STBR_FLAG_CELLS: usize = 12;

pub fn stbr_undervoltage(reg: u8, slot: usize) -> bool {
    reg & (1 << (slot * 2)) != 0
}

pub fn stbr_overvoltage(reg: u8, slot: usize) -> bool {
    reg & (1 << (slot * 2 + 1)) != 0
}
