//! Daisy-chain driver for the LTC6811 / LTC6813 battery monitor ICs.
//!
//! The LTC681x family is addressed by physical position only: devices are
//! series-connected on one SPI bus and every exchange shifts one framed,
//! CRC-protected register block per device through the chain. This crate
//! models that chain, its wakeup sequencing, command and register-group
//! framing, cell/GPIO/status sampling, the open-wire diagnostic, and the
//! per-cell fault debouncing built on top of the raw readings.
//!
//! The driver is transport-generic: it talks to the bus through the
//! [`ltc681x::SpiTransport`] trait, for which [`ltc681x::HalSpi`] provides an
//! [`embedded-hal`](embedded_hal) implementation over any `SpiBus` plus a
//! chip-select `OutputPin`. GPIO measurements are handed to externally owned
//! [`analog_sensor::AnalogSensor`] objects; the driver never owns a sensor,
//! it only updates one or marks it failed.
//!
//! All operations are blocking. A caller brackets one or more operations
//! between [`ltc681x::Chain::start`] and [`ltc681x::Chain::stop`], which hold
//! the bus for the whole burst.

#![cfg_attr(not(test), no_std)]

// This must come first so the log shim macros are visible to the other
// modules.
mod fmt;

pub mod analog_sensor;
pub mod fault;
pub mod ltc681x;
