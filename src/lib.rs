//! Sound level measurement from an analog microphone, using the
//! [`embedded-hal`] ADC traits.
//!
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal
//!
//! The measurement is a pipeline of three stages, each owning the one
//! below it:
//!
//! - [`SampleAccumulator`] reads ADC samples and computes their RMS
//!   voltage and level in dBV.
//! - [`SoundLevelStage`] turns the dBV of each interval into a sound
//!   pressure level Li, using the microphone and amplifier
//!   [`Calibration`].
//! - [`EquivalentLevelAggregator`] paces the sampling with a [`Clock`],
//!   and averages the Li of many intervals in the energy domain into an
//!   equivalent continuous sound level Leq.
//!
//! A main loop calls `accumulate` as often as it can and `compute` once
//! per iteration:
//!
//! ```
//! use leq_meter::{
//!     Clock, Config, EquivalentLevelAggregator, SampleAccumulator, SoundLevelStage, Timing,
//! };
//! # use embedded_hal_mock::adc::{Mock, MockChan0, Transaction};
//! # use core::cell::Cell;
//! #
//! # struct Millis(Cell<u32>);
//! # impl Clock for Millis {
//! #     fn now_ms(&self) -> u32 {
//! #         let now = self.0.get() + 1;
//! #         self.0.set(now);
//! #         now
//! #     }
//! # }
//! # let millis = Millis(Cell::new(0));
//! # let pin = MockChan0 {};
//! # let expectations = [513u16, 511, 513, 511].map(|code| Transaction::read(0, code));
//! # let mut adc = Mock::new(&expectations);
//!
//! let accumulator = SampleAccumulator::new(pin, Config::default()).unwrap();
//! let stage = SoundLevelStage::with_defaults(accumulator);
//! let timing = Timing {
//!     sampling_period_ms: 1,
//!     samples_per_interval: 2,
//!     intervals_per_window: 2,
//! };
//! let mut meter = EquivalentLevelAggregator::new(stage, &millis, timing).unwrap();
//!
//! loop {
//!     meter.accumulate(&mut adc).unwrap();
//!     if meter.compute().unwrap() {
//!         let _leq = meter.leq().unwrap();
//!         break;
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - `defmt`: Enables logging using the `defmt` framework.
//! - `log`: Enables logging using the `log` framework.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("Features \"defmt\" and \"log\" are mutually exclusive and cannot be enabled together");

#[macro_use]
mod fmt;

mod clock;
mod error;
pub mod level;
mod leq;
mod li;
pub mod registers;
mod sample;

pub use crate::{
    clock::Clock,
    error::{Error, Parameter},
    leq::{EquivalentLevelAggregator, Timing},
    li::{Calibration, SoundLevelStage},
    registers::{Command, NodeRegisters},
    sample::{Config, ReadError, SampleAccumulator},
};
