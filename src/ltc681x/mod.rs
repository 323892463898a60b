//! Driver for a daisy chain of LTC6811 / LTC6813 battery monitor ICs.
//!
//! This code is derivative of the Analog Devices Linduino codebase:
//! <https://github.com/analogdevicesinc/Linduino/tree/master>.

pub mod device;
pub mod hal;
pub mod pec;
pub mod regs;
pub mod types;

#[cfg(test)]
pub(crate) mod mocks;

pub use device::{Chain, Ltc681x};
pub use hal::HalSpi;
pub use types::*;

/// The SPI bus a daisy chain hangs off.
///
/// The chain drives chip select manually (wakeup pulses and multi-frame
/// bursts keep it asserted across several exchanges), so this is a bus-level
/// interface rather than an `SpiDevice`. [`HalSpi`] adapts any
/// `embedded-hal` `SpiBus` + chip-select pin pair.
pub trait SpiTransport {
    /// Error reported by a failed exchange. Any such failure is fatal for
    /// the whole chain.
    type BusError: core::fmt::Debug;

    /// Powers the peripheral and, where the bus is shared, takes exclusive
    /// ownership of it. Held until [`stop`](SpiTransport::stop).
    fn start(&mut self);

    /// Releases whatever [`start`](SpiTransport::start) acquired.
    fn stop(&mut self);

    /// Asserts chip select.
    fn select(&mut self);

    /// Releases chip select.
    fn deselect(&mut self);

    /// Full-duplex transfer: clocks `tx` out while filling `rx`. Both
    /// slices have the same length.
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::BusError>;
}
