//! Daisy-chain model and operations.
//!
//! Devices on an LTC681x isoSPI chain have no addresses; they are identified
//! purely by physical position. The chain keeps one record per device in an
//! arena ordered bottom (first on the bus) to top, and the single
//! [`ChainConfig`] is owned by the chain itself rather than duplicated per
//! device.

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use super::pec;
use super::regs::{self, cmd};
use super::types::*;
use super::SpiTransport;
use crate::analog_sensor::AnalogSensor;
use crate::fault::update_fault;

/// Which internal buffer a cell voltage pass writes into. The pull-up and
/// pull-down buffers exist so the open-wire test can reuse the cell sampling
/// path without duplicating the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellVoltageDestination {
    Live,
    PullUp,
    PullDown,
}

/// One device of a daisy chain.
///
/// Buffers are sized for the largest supported variant; on smaller variants
/// the tail entries are never written or read.
pub struct Ltc681x<'a> {
    /// Communication state of this device. Readings are only trustworthy
    /// while the state is [`DeviceState::Ready`].
    pub state: DeviceState,

    /// Sum of all cell voltages, in volts. Updated by
    /// [`Chain::sample_status`].
    pub cell_voltage_sum: f32,
    /// Die temperature, in degrees Celsius. Updated by
    /// [`Chain::sample_status`].
    pub die_temperature: f32,
    /// Last raw sample of the second reference voltage, shared with the GPIO
    /// sensor callbacks.
    pub vref2: u16,

    /// Cell voltages, in volts. Updated by [`Chain::sample_cells`].
    pub cell_voltages: [f32; regs::CELL_COUNT_MAX],
    /// Cell voltages measured under pull-up bias during the open-wire test.
    pub cell_voltages_pullup: [f32; regs::CELL_COUNT_MAX],
    /// Cell voltages measured under pull-down bias during the open-wire
    /// test.
    pub cell_voltages_pulldown: [f32; regs::CELL_COUNT_MAX],
    /// Pull-up minus pull-down voltage per cell, from the open-wire test.
    pub cell_voltages_delta: [f32; regs::CELL_COUNT_MAX],

    /// Requested discharge switch state per cell. Shadowed here; takes
    /// physical effect on the next [`Chain::write_config`].
    pub cells_discharging: [bool; regs::CELL_COUNT_MAX],

    /// Debounced open-wire fault per sense wire (wire 0 is below cell 1).
    pub open_wire_faults: [bool; regs::WIRE_COUNT_MAX],
    /// Debounced undervoltage fault per cell.
    pub undervoltage_faults: [bool; regs::CELL_COUNT_MAX],
    /// Debounced overvoltage fault per cell.
    pub overvoltage_faults: [bool; regs::CELL_COUNT_MAX],

    open_wire_counters: [u16; regs::WIRE_COUNT_MAX],
    undervoltage_counters: [u16; regs::CELL_COUNT_MAX],
    overvoltage_counters: [u16; regs::CELL_COUNT_MAX],

    gpio_sensors: [Option<&'a mut dyn AnalogSensor>; regs::GPIO_COUNT],

    // Scratch frame buffers for one register group exchange.
    pub(crate) tx: [u8; regs::FRAME_SIZE],
    pub(crate) rx: [u8; regs::FRAME_SIZE],
}

impl<'a> Ltc681x<'a> {
    fn new() -> Self {
        Self {
            state: DeviceState::Ready,
            cell_voltage_sum: 0.0,
            die_temperature: 0.0,
            vref2: 0,
            cell_voltages: [0.0; regs::CELL_COUNT_MAX],
            cell_voltages_pullup: [0.0; regs::CELL_COUNT_MAX],
            cell_voltages_pulldown: [0.0; regs::CELL_COUNT_MAX],
            cell_voltages_delta: [0.0; regs::CELL_COUNT_MAX],
            cells_discharging: [false; regs::CELL_COUNT_MAX],
            open_wire_faults: [false; regs::WIRE_COUNT_MAX],
            undervoltage_faults: [false; regs::CELL_COUNT_MAX],
            overvoltage_faults: [false; regs::CELL_COUNT_MAX],
            open_wire_counters: [0; regs::WIRE_COUNT_MAX],
            undervoltage_counters: [0; regs::CELL_COUNT_MAX],
            overvoltage_counters: [0; regs::CELL_COUNT_MAX],
            gpio_sensors: core::array::from_fn(|_| None),
            tx: [0; regs::FRAME_SIZE],
            rx: [0; regs::FRAME_SIZE],
        }
    }
}

/// A daisy chain of up to `N` LTC681x devices on one SPI bus.
///
/// Assemble with [`Chain::new`] (the bottom device) and [`Chain::append`]
/// (each further device, in physical order), then call [`Chain::finalize`]
/// once before first use. Sampling operations must be bracketed between
/// [`Chain::start`] and [`Chain::stop`]; the transport is held for the whole
/// burst.
pub struct Chain<'a, T, D, const N: usize>
where
    T: SpiTransport,
    D: DelayNs,
{
    pub(crate) transport: T,
    pub(crate) delay: D,
    pub(crate) config: ChainConfig,
    pub(crate) devices: Vec<Ltc681x<'a>, N>,
}

impl<'a, T, D, const N: usize> Chain<'a, T, D, N>
where
    T: SpiTransport,
    D: DelayNs,
{
    /// Creates a chain containing only its bottom (first) device.
    ///
    /// This does not touch the bus and therefore cannot detect a missing or
    /// broken device; see [`Chain::finalize`].
    pub fn new(transport: T, delay: D, config: ChainConfig) -> Result<Self, Error<T::BusError>> {
        let mut chain = Self {
            transport,
            delay,
            config,
            devices: Vec::new(),
        };
        chain.append()?;
        Ok(chain)
    }

    /// Initializes and appends a device to the top of the chain.
    pub fn append(&mut self) -> Result<(), Error<T::BusError>> {
        self.devices.push(Ltc681x::new()).map_err(|_| Error::ChainFull)
    }

    /// Finalizes chain assembly: powers the bus, wakes every device and
    /// pushes the initial configuration, reporting whether the configuration
    /// write went through without a bus-level failure.
    ///
    /// A success does not mean every device is functional, only that
    /// communication may be attempted; check per-device state after the
    /// first sampling pass.
    pub fn finalize(&mut self) -> Result<(), Error<T::BusError>> {
        self.start();
        // The chain has very likely slept through assembly.
        self.wakeup_sleep();
        let result = self.write_config();
        self.stop();

        if result.is_ok() {
            info!("LTC681x chain up, {} devices", self.devices.len());
        }
        result
    }

    /// Number of devices in the chain.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// The device at `index`, counting from the bottom of the chain.
    pub fn device(&self, index: usize) -> &Ltc681x<'a> {
        &self.devices[index]
    }

    /// Mutable access to the device at `index`, e.g. to request cell
    /// discharging. Discharge requests take effect on the next
    /// [`Chain::write_config`].
    pub fn device_mut(&mut self, index: usize) -> &mut Ltc681x<'a> {
        &mut self.devices[index]
    }

    /// Iterates the devices bottom to top.
    pub fn devices(&self) -> impl Iterator<Item = &Ltc681x<'a>> {
        self.devices.iter()
    }

    /// Links an analog sensor to a device's GPIO ADC channel. The sensor is
    /// updated on every [`Chain::sample_gpio`] pass.
    pub fn set_gpio_sensor(
        &mut self,
        device: usize,
        gpio: usize,
        sensor: &'a mut dyn AnalogSensor,
    ) {
        self.devices[device].gpio_sensors[gpio] = Some(sensor);
    }

    /// Sets all devices back to the ready state, e.g. after the cause of a
    /// failure has been cleared externally.
    pub fn clear_state(&mut self) {
        for device in self.devices.iter_mut() {
            device.state = DeviceState::Ready;
        }
    }

    /// Whether any device has an isoSPI-level fault present.
    pub fn isospi_fault(&self) -> bool {
        self.devices
            .iter()
            .any(|d| d.state == DeviceState::Failed || d.state == DeviceState::PecError)
    }

    /// Whether any device has a self-test fault present.
    pub fn self_test_fault(&self) -> bool {
        self.devices
            .iter()
            .any(|d| d.state == DeviceState::SelfTestFault)
    }

    /// Acquires and starts the chain's SPI transport.
    pub fn start(&mut self) {
        self.transport.start();
    }

    /// Stops and releases the chain's SPI transport.
    pub fn stop(&mut self) {
        self.transport.stop();
    }

    /// Wakes all devices from the sleep state. The LTC681x core enters the
    /// sleep state after 2 seconds of inactivity.
    ///
    /// Uses "Waking a Daisy Chain - Method 2" (LTC6811 datasheet, pg.52, or
    /// LTC6813 datasheet, pg.54): a device that is not in the ready state
    /// consumes the first wakeup pulse it sees instead of propagating it, so
    /// N pulses guarantee all N devices receive at least one full pulse
    /// regardless of the chain's prior state.
    pub fn wakeup_sleep(&mut self) {
        for _ in 0..self.devices.len() {
            // Hold CS low for the maximum wakeup time, then release long
            // enough for the device to reach the ready state.
            self.transport.select();
            self.delay.delay_us(regs::T_WAKE_MAX_US);
            self.transport.deselect();
            self.delay.delay_us(regs::T_READY_MAX_US);
        }
    }

    /// Wakes all devices from the idle state. The isoSPI port enters the
    /// idle state after 4.3 ms of inactivity.
    ///
    /// Uses "Waking a Daisy Chain - Method 1": a single pulse, then one
    /// ready-settle period per device for it to ripple up the chain. Only
    /// sufficient when no device has fully slept.
    pub fn wakeup_idle(&mut self) {
        self.transport.select();
        self.delay.delay_us(regs::T_READY_MAX_US);
        self.transport.deselect();
        self.delay
            .delay_us(regs::T_READY_MAX_US * self.devices.len() as u32);
    }

    /// Writes the configuration register groups of every device: discharge
    /// switches, discharge timeout and the UV/OV comparison thresholds.
    ///
    /// Discharge requests made through [`Chain::device_mut`] only take
    /// physical effect through this call.
    pub fn write_config(&mut self) -> Result<(), Error<T::BusError>> {
        let dcto = self.config.discharge_timeout as u8;
        let vuv = regs::vuv(self.config.cell_voltage_min);
        let vov = regs::vov(self.config.cell_voltage_max);

        // Configuration register group A.
        for device in self.devices.iter_mut() {
            // GPIO pull-downs off, reference powered outside conversions,
            // ADC option 0.
            device.tx[0] = regs::cfgra0([true; 5], true, false);
            device.tx[1] = regs::cfgra1(vuv);
            device.tx[2] = regs::cfgra2(vuv, vov);
            device.tx[3] = regs::cfgra3(vov);
            device.tx[4] = regs::cfgra4(&device.cells_discharging);
            device.tx[5] = regs::cfgra5(dcto, &device.cells_discharging);
        }
        let result_a = self.write_register_groups(cmd::WRCFGA);

        // Configuration register group B. The LTC6811 has no group B and
        // ignores the write.
        for device in self.devices.iter_mut() {
            device.tx[0] = regs::cfgrb0([true; 4], &device.cells_discharging);
            // Normal digital redundancy, discharge timer monitor off, GPIO 9
            // pull-down off.
            device.tx[1] = regs::cfgrb1(false, 0b00, false, false, &device.cells_discharging);
            device.tx[2] = regs::CFGRB2;
            device.tx[3] = regs::CFGRB3;
            device.tx[4] = regs::CFGRB4;
            device.tx[5] = regs::CFGRB5;
        }
        let result_b = self.write_register_groups(cmd::WRCFGB);

        result_a.and(result_b)
    }

    /// Samples the cell voltages of every device into
    /// [`Ltc681x::cell_voltages`].
    pub fn sample_cells(&mut self) -> Result<(), Error<T::BusError>> {
        self.sample_cells_into(CellVoltageDestination::Live)
    }

    /// Samples the die temperature and sum-of-cells measurements of every
    /// device.
    pub fn sample_status(&mut self) -> Result<(), Error<T::BusError>> {
        // Start the status ADC for all values.
        let command = regs::cmd_adstat(self.config.status_adc_mode, 0b000);
        self.write_command(command, false)?;
        self.poll_adc(regs::STATUS_ADC_CONVERSION_US[self.config.status_adc_mode as usize])?;

        // Decode even if single devices failed their PEC; the rest of the
        // chain may still be healthy.
        self.read_register_groups(cmd::RDSTATA)?;

        for device in self.devices.iter_mut() {
            device.cell_voltage_sum = regs::star_sum_of_cells(device.rx[0], device.rx[1]);
            device.die_temperature = regs::star_die_temperature(device.rx[2], device.rx[3]);
        }

        Ok(())
    }

    /// Samples the GPIO voltages of every device and feeds each attached
    /// [`AnalogSensor`], passing the second reference voltage measured in
    /// the same pass as the supply sample.
    ///
    /// A GPIO pass is chain-wide; on any transport failure every attached
    /// sensor is driven into the failed state.
    pub fn sample_gpio(&mut self) -> Result<(), Error<T::BusError>> {
        // See LTC6811 datasheet section "Auxiliary (GPIO) Measurements
        // (ADAX Command)", pg.26.
        if self.config.variant != Variant::Ltc6811 {
            // The 18-cell auxiliary decode was never ported from the
            // single-IC driver.
            return Err(Error::Unsupported);
        }

        let command = regs::cmd_adax(self.config.gpio_adc_mode, 0b000);
        if let Err(error) = self.write_command(command, false) {
            self.fail_gpio();
            return Err(error);
        }
        if let Err(error) =
            self.poll_adc(regs::ADC_CONVERSION_US[self.config.gpio_adc_mode as usize])
        {
            self.fail_gpio();
            return Err(error);
        }
        if let Err(error) = self.read_register_groups(cmd::RDAUXB) {
            self.fail_gpio();
            return Err(error);
        }

        // Auxiliary register group B: GPIO 4, GPIO 5 and the second
        // reference.
        for device in self.devices.iter_mut() {
            device.vref2 = u16::from_le_bytes([device.rx[4], device.rx[5]]);
            let vref2 = device.vref2;

            for gpio in 3..regs::GPIO_COUNT {
                let sample =
                    u16::from_le_bytes([device.rx[gpio * 2 - 6], device.rx[gpio * 2 - 5]]);
                if let Some(sensor) = device.gpio_sensors[gpio].as_mut() {
                    sensor.update(sample, vref2);
                }
            }
        }

        if let Err(error) = self.read_register_groups(cmd::RDAUXA) {
            self.fail_gpio();
            return Err(error);
        }

        // Auxiliary register group A: GPIO 1 to 3.
        for device in self.devices.iter_mut() {
            let vref2 = device.vref2;
            for gpio in 0..3 {
                let sample = u16::from_le_bytes([device.rx[gpio * 2], device.rx[gpio * 2 + 1]]);
                if let Some(sensor) = device.gpio_sensors[gpio].as_mut() {
                    sensor.update(sample, vref2);
                }
            }
        }

        Ok(())
    }

    /// Reads the per-cell undervoltage / overvoltage comparator flags from
    /// status register group B and updates the debounced fault flags.
    ///
    /// The comparators evaluate against the thresholds programmed by
    /// [`Chain::write_config`] during every cell or status conversion.
    pub fn sample_voltage_faults(&mut self) -> Result<(), Error<T::BusError>> {
        // Status register group B carries flags for twelve cells.
        if self.config.variant != Variant::Ltc6811 {
            return Err(Error::Unsupported);
        }

        self.read_register_groups(cmd::RDSTATB)?;

        let threshold = self.config.fault_count;
        for device in self.devices.iter_mut() {
            for cell in 0..regs::STBR_FLAG_CELLS {
                let reg = device.rx[2 + cell / 4];
                let slot = cell % 4;
                update_fault(
                    &mut device.undervoltage_counters[cell],
                    &mut device.undervoltage_faults[cell],
                    regs::stbr_undervoltage(reg, slot),
                    threshold,
                );
                update_fault(
                    &mut device.overvoltage_counters[cell],
                    &mut device.overvoltage_faults[cell],
                    regs::stbr_overvoltage(reg, slot),
                    threshold,
                );
            }
        }

        Ok(())
    }

    /// Performs the open-wire test on every device: repeated pull-up biased
    /// conversions, a cell sample into the pull-up buffer, the same under
    /// pull-down bias, then the per-wire evaluation feeding the debounced
    /// [`Ltc681x::open_wire_faults`] flags.
    pub fn open_wire_test(&mut self) -> Result<(), Error<T::BusError>> {
        // See LTC6811 datasheet section "Open Wire Check (ADOW Command)",
        // pg.34.
        if self.config.variant != Variant::Ltc6811 {
            // Not ported for 18 cells, like the auxiliary decode.
            return Err(Error::Unsupported);
        }

        let mode = self.config.cell_adc_mode;
        let dcp = self.config.discharge_allowed;
        let conversion_us = regs::ADC_CONVERSION_US[mode as usize];

        // Pull-up passes. Nothing is read in between; only the settled
        // final state matters.
        for _ in 0..self.config.open_wire_test_iterations {
            self.write_command(regs::cmd_adow(mode, true, dcp, 0b000), false)?;
            self.poll_adc(conversion_us)?;
        }
        self.sample_cells_into(CellVoltageDestination::PullUp)?;

        // Pull-down passes.
        for _ in 0..self.config.open_wire_test_iterations {
            self.write_command(regs::cmd_adow(mode, false, dcp, 0b000), false)?;
            self.poll_adc(conversion_us)?;
        }
        self.sample_cells_into(CellVoltageDestination::PullDown)?;

        self.evaluate_open_wires();
        Ok(())
    }

    /// Per-wire evaluation of the pull-up / pull-down buffers. Sense wires
    /// are indexed 0 to cellCount while the datasheet indexes cells from 1.
    pub(crate) fn evaluate_open_wires(&mut self) {
        let cell_count = self.config.variant.cell_count();
        let threshold = self.config.fault_count;

        for device in self.devices.iter_mut() {
            // Wire 0: an open bottom sense line reads 0 V during pull-up
            // (1 mV tolerance for noise).
            let faulted = device.cell_voltages_pullup[0] < 0.001
                && device.cell_voltages_pullup[0] > -0.001;
            update_fault(
                &mut device.open_wire_counters[0],
                &mut device.open_wire_faults[0],
                faulted,
                threshold,
            );

            // Interior wires: open if the pull-up / pull-down delta of the
            // cell above drops below -400 mV.
            for wire in 1..cell_count - 1 {
                device.cell_voltages_delta[wire] =
                    device.cell_voltages_pullup[wire] - device.cell_voltages_pulldown[wire];
                let faulted = device.cell_voltages_delta[wire] < -0.4;
                update_fault(
                    &mut device.open_wire_counters[wire],
                    &mut device.open_wire_faults[wire],
                    faulted,
                    threshold,
                );
            }

            // The datasheet calls out 400 mV for this wire too, but bench
            // testing shows it as 800 mV.
            let last = cell_count - 1;
            device.cell_voltages_delta[last] =
                device.cell_voltages_pullup[last] - device.cell_voltages_pulldown[last];
            let faulted = device.cell_voltages_delta[last] < -0.8;
            update_fault(
                &mut device.open_wire_counters[last],
                &mut device.open_wire_faults[last],
                faulted,
                threshold,
            );

            // Top wire: an open top sense line reads 0 V during pull-down.
            let faulted = device.cell_voltages_pulldown[last] < 0.001
                && device.cell_voltages_pulldown[last] > -0.001;
            update_fault(
                &mut device.open_wire_counters[cell_count],
                &mut device.open_wire_faults[cell_count],
                faulted,
                threshold,
            );
        }
    }

    pub(crate) fn sample_cells_into(
        &mut self,
        destination: CellVoltageDestination,
    ) -> Result<(), Error<T::BusError>> {
        // See LTC6811 datasheet section "Measuring Cell Voltages (ADCV
        // Command)", pg.25.

        // Start the conversion for all cells, conditionally permitting
        // discharge to continue through it.
        let command = regs::cmd_adcv(
            self.config.cell_adc_mode,
            self.config.discharge_allowed,
            0b000,
        );
        self.write_command(command, false)?;
        self.poll_adc(regs::ADC_CONVERSION_US[self.config.cell_adc_mode as usize])?;

        // One register group per bank of three cells.
        let groups = self.config.variant.cell_voltage_groups();
        for (bank, &read_command) in groups.iter().enumerate() {
            // Decode even if single devices failed their PEC; the rest of
            // the chain may still be healthy.
            self.read_register_groups(read_command)?;

            for device in self.devices.iter_mut() {
                for slot in 0..3 {
                    let word =
                        u16::from_le_bytes([device.rx[slot * 2], device.rx[slot * 2 + 1]]);
                    let volts = regs::word_to_cell_voltage(word);
                    let cell = bank * 3 + slot;
                    match destination {
                        CellVoltageDestination::Live => device.cell_voltages[cell] = volts,
                        CellVoltageDestination::PullUp => {
                            device.cell_voltages_pullup[cell] = volts
                        }
                        CellVoltageDestination::PullDown => {
                            device.cell_voltages_pulldown[cell] = volts
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes a command word and its PEC. With `deselect` false the
    /// peripheral stays selected for a following burst; it is always
    /// deselected on failure.
    pub(crate) fn write_command(
        &mut self,
        command: u16,
        deselect: bool,
    ) -> Result<(), Error<T::BusError>> {
        // Transmit frame: | Command HI | Command LO | PEC HI | PEC LO |
        // See LTC6811 datasheet, pg.58, or LTC6813 datasheet, pg.59.
        let mut tx = [(command >> 8) as u8, command as u8, 0, 0];
        let command_pec = pec::calculate(&tx[..2]);
        tx[2] = (command_pec >> 8) as u8;
        tx[3] = command_pec as u8;

        self.transport.select();

        let mut rx = [0u8; 4];
        if let Err(error) = self.transport.exchange(&tx, &mut rx) {
            self.transport.deselect();
            self.fail_chain();
            warn!("LTC681x chain: command 0x{:03x} failed", command);
            return Err(Error::Spi(error));
        }

        if deselect {
            self.transport.deselect();
        }
        Ok(())
    }

    /// Writes one register-group frame per device, taking each device's
    /// payload from its `tx` scratch buffer and appending the PEC.
    ///
    /// The first frame on the wire shifts all the way through to the top of
    /// the chain, so frames are transmitted top device first, descending to
    /// the bottom.
    pub(crate) fn write_register_groups(
        &mut self,
        command: u16,
    ) -> Result<(), Error<T::BusError>> {
        self.write_command(command, false)?;

        for index in (0..self.devices.len()).rev() {
            let device = &mut self.devices[index];
            let frame_pec = pec::calculate(&device.tx[..regs::PAYLOAD_SIZE]);
            device.tx[regs::FRAME_SIZE - 2] = (frame_pec >> 8) as u8;
            device.tx[regs::FRAME_SIZE - 1] = frame_pec as u8;
            let tx = device.tx;

            let mut rx = [0u8; regs::FRAME_SIZE];
            if let Err(error) = self.transport.exchange(&tx, &mut rx) {
                self.transport.deselect();
                self.fail_chain();
                return Err(Error::Spi(error));
            }
        }

        self.transport.deselect();
        Ok(())
    }

    /// Reads one register-group frame per device into the devices' `rx`
    /// scratch buffers, bottom device first.
    ///
    /// A PEC mismatch re-runs the entire read (the devices present fresh
    /// data; they cannot tell a retry happened) up to the configured attempt
    /// count. On the final attempt, offending devices are marked
    /// [`DeviceState::PecError`] while correctly received devices keep their
    /// data. Returns whether every frame of the last read validated.
    pub(crate) fn read_register_groups(
        &mut self,
        command: u16,
    ) -> Result<bool, Error<T::BusError>> {
        for attempt in 0..self.config.read_attempt_count {
            self.write_command(command, false)?;

            for index in 0..self.devices.len() {
                let tx = [0u8; regs::FRAME_SIZE];
                let mut rx = [0u8; regs::FRAME_SIZE];
                if let Err(error) = self.transport.exchange(&tx, &mut rx) {
                    // A bus-level failure; re-attempting will not help.
                    self.transport.deselect();
                    self.fail_chain();
                    return Err(Error::Spi(error));
                }
                self.devices[index].rx = rx;
            }

            self.transport.deselect();

            // Validate every device's trailing PEC.
            let last_attempt = attempt + 1 == self.config.read_attempt_count;
            let mut valid = true;
            for device in self.devices.iter_mut() {
                let frame_pec = u16::from_be_bytes([
                    device.rx[regs::FRAME_SIZE - 2],
                    device.rx[regs::FRAME_SIZE - 1],
                ]);
                if !pec::validate(&device.rx[..regs::PAYLOAD_SIZE], frame_pec) {
                    valid = false;
                    if !last_attempt {
                        break;
                    }
                    device.state = DeviceState::PecError;
                }
            }

            if valid {
                return Ok(true);
            }
            debug!("LTC681x chain: PEC mismatch reading 0x{:03x}", command);
        }

        warn!("LTC681x chain: read 0x{:03x} exhausted its attempts", command);
        Ok(false)
    }

    /// Blocks until a previously scheduled ADC conversion completes. The
    /// peripheral must still be selected from the conversion command.
    ///
    /// The bottom device holds its data line low and releases it when every
    /// conversion in the chain has finished, so dummy bytes are clocked
    /// until a non-zero byte comes back. Missing the deadline is fatal for
    /// the chain: a conversion that cannot be observed completing cannot be
    /// distinguished from a lost one.
    pub(crate) fn poll_adc(&mut self, conversion_us: u32) -> Result<(), Error<T::BusError>> {
        let deadline_us = conversion_us.saturating_add(self.config.poll_tolerance_us);
        let mut elapsed_us: u32 = 0;

        loop {
            let mut rx = [0u8; 1];
            if let Err(error) = self.transport.exchange(&[0xFF], &mut rx) {
                self.transport.deselect();
                self.fail_chain();
                return Err(Error::Spi(error));
            }

            if rx[0] != 0 {
                self.transport.deselect();
                return Ok(());
            }

            if elapsed_us >= deadline_us {
                break;
            }

            // Elapsed time is tracked by the inserted pacing only; the
            // exchanges themselves are short against the step width.
            self.delay.delay_us(regs::ADC_POLL_STEP_US);
            elapsed_us = elapsed_us.saturating_add(regs::ADC_POLL_STEP_US);
        }

        warn!("LTC681x chain: ADC conversion missed its deadline");
        self.fail_chain();
        self.transport.deselect();
        Err(Error::PollTimeout)
    }

    /// Sets every device to the failed state.
    fn fail_chain(&mut self) {
        for device in self.devices.iter_mut() {
            device.state = DeviceState::Failed;
        }
    }

    /// Drives every attached GPIO sensor into the failed state. A shared
    /// ADC pass cannot partially fail per channel.
    fn fail_gpio(&mut self) {
        for device in self.devices.iter_mut() {
            for sensor in device.gpio_sensors.iter_mut() {
                if let Some(sensor) = sensor.as_mut() {
                    sensor.mark_failed();
                }
            }
        }
    }
}
