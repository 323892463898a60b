//! Base interface for an analog sensor: any peripheral that applies a
//! transfer function to an ADC measurement. The ADC does not need to be
//! on-chip; the LTC681x GPIO ADCs report into this interface too.

/// State of an analog sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorState {
    /// The sensor has experienced a hardware failure.
    Failed,
    /// The sensor's configuration is invalid.
    ConfigInvalid,
    /// The sensor has read an invalid sample.
    SampleInvalid,
    /// The sensor is valid.
    Valid,
}

/// An externally owned analog sensor fed by some ADC.
///
/// The driver only ever calls [`update`](AnalogSensor::update) with a fresh
/// sample or [`mark_failed`](AnalogSensor::mark_failed) when the sampling
/// path that feeds the sensor has failed; everything else (transfer function,
/// validity checks) belongs to the implementor.
pub trait AnalogSensor {
    /// Feeds the sensor a new sample. `sample_vdd` is a sample of the analog
    /// supply voltage taken in the same pass, for ratiometric conversion. It
    /// may be constant depending on the ADC implementation.
    fn update(&mut self, sample: u16, sample_vdd: u16);

    /// Puts the sensor into [`SensorState::Failed`].
    fn mark_failed(&mut self);
}
