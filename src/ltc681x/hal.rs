//! [`SpiTransport`] implementation over `embedded-hal` traits.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use super::SpiTransport;

/// Adapts an `embedded-hal` SPI bus plus an active-low chip-select pin to
/// the chain transport.
///
/// The chain needs bus-level access (wakeup pulses and register-group bursts
/// keep chip select asserted across several transfers), so this takes an
/// `SpiBus` rather than an `SpiDevice`. Powering the peripheral and sharing
/// the bus are the integrator's concern; `start`/`stop` only bracket the
/// chain's bursts here.
pub struct HalSpi<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> HalSpi<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, mut cs: CS) -> Self {
        let _ = cs.set_high();
        Self { spi, cs }
    }

    /// Gives the bus and pin back.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS> SpiTransport for HalSpi<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    type BusError = SPI::Error;

    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn select(&mut self) {
        let _ = self.cs.set_low();
    }

    fn deselect(&mut self) {
        let _ = self.cs.set_high();
    }

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::BusError> {
        self.spi.transfer(rx, tx)?;
        self.spi.flush()
    }
}
