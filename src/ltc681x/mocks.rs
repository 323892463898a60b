//! Scripted test doubles for the chain transport, delay and sensors.

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;

use super::pec;
use super::SpiTransport;
use crate::analog_sensor::AnalogSensor;

/// Transport calls recorded by [`MockTransport`], in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    Select,
    Deselect,
    Exchange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

/// Scripted SPI transport.
///
/// Responses are served from a queue, one entry per exchange, and zero-filled
/// once the queue runs dry (an idle LTC681x chain shifts out zeros). Every
/// transmitted byte and every transport call is recorded for assertions.
#[derive(Default)]
pub struct MockTransport {
    script: VecDeque<Vec<u8>>,
    /// tx bytes of each exchange, in order.
    pub written: Vec<Vec<u8>>,
    /// Every transport call, in order.
    pub events: Vec<Event>,
    /// When set, the exchange with this 0-based index reports a bus fault.
    pub fail_at: Option<usize>,
    exchanges: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the rx bytes of the next exchange.
    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.script.push_back(bytes.to_vec());
    }

    /// Queues a zero-filled response, e.g. for a command exchange.
    pub fn push_zeros(&mut self, len: usize) {
        self.script.push_back(vec![0; len]);
    }

    /// Queues a conversion command's response plus an immediately ready ADC
    /// completion poll.
    pub fn push_conversion(&mut self) {
        self.push_zeros(4);
        self.push_rx(&[0x01]);
    }

    /// Queues a complete register-group read: the command response followed
    /// by one framed payload per device, bottom first. With `corrupt`, every
    /// frame is damaged after its PEC is computed.
    pub fn push_group_read(&mut self, payloads: &[[u8; 6]], corrupt: bool) {
        self.push_zeros(4);
        for payload in payloads {
            self.push_rx(&frame(payload, corrupt));
        }
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges
    }
}

/// Frames a register-group payload with its PEC, optionally flipping a
/// payload bit afterwards so the PEC no longer matches.
pub fn frame(payload: &[u8; 6], corrupt: bool) -> [u8; 8] {
    let mut frame = [0u8; 8];
    frame[..6].copy_from_slice(payload);
    let frame_pec = pec::calculate(payload);
    frame[6] = (frame_pec >> 8) as u8;
    frame[7] = frame_pec as u8;
    if corrupt {
        frame[0] ^= 0x01;
    }
    frame
}

impl SpiTransport for MockTransport {
    type BusError = BusFault;

    fn start(&mut self) {
        self.events.push(Event::Start);
    }

    fn stop(&mut self) {
        self.events.push(Event::Stop);
    }

    fn select(&mut self) {
        self.events.push(Event::Select);
    }

    fn deselect(&mut self) {
        self.events.push(Event::Deselect);
    }

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), BusFault> {
        self.events.push(Event::Exchange(tx.len()));
        self.written.push(tx.to_vec());

        let index = self.exchanges;
        self.exchanges += 1;
        if self.fail_at == Some(index) {
            return Err(BusFault);
        }

        match self.script.pop_front() {
            Some(bytes) => {
                assert_eq!(bytes.len(), rx.len(), "scripted response length mismatch");
                rx.copy_from_slice(&bytes);
            }
            None => rx.fill(0),
        }
        Ok(())
    }
}

/// Delay that only counts what it was asked to wait.
#[derive(Default)]
pub struct MockDelay {
    pub slept_ns: u64,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += u64::from(ns);
    }
}

/// Sensor recording every update it receives.
#[derive(Default)]
pub struct StubSensor {
    pub samples: Vec<(u16, u16)>,
    pub failed: bool,
}

impl AnalogSensor for StubSensor {
    fn update(&mut self, sample: u16, sample_vdd: u16) {
        self.samples.push((sample, sample_vdd));
    }

    fn mark_failed(&mut self) {
        self.failed = true;
    }
}
