//! Register image and commands of a measurement node on a coordinator bus.
//!
//! A coordinator reads the node one register at a time. Multi-byte
//! values are little endian:
//!
//! | Address | Content                                    |
//! |---------|--------------------------------------------|
//! | 0       | sampling period (ms)                       |
//! | 1-2     | sample number since start (`u16`)          |
//! | 3-6     | last Leq (dB, IEEE-754 binary32)           |

use crate::error::Error;

#[cfg(feature = "defmt")]
use defmt::Format;

/// Size of the register image in bytes.
pub const REGISTER_COUNT: usize = 7;

pub const REG_SAMPLING_PERIOD: u8 = 0;
pub const REG_SAMPLE_NUMBER_LSB: u8 = 1;
pub const REG_SAMPLE_NUMBER_MSB: u8 = 2;
pub const REG_LEQ_LSB0: u8 = 3;
pub const REG_LEQ_LSB1: u8 = 4;
pub const REG_LEQ_MSB0: u8 = 5;
pub const REG_LEQ_MSB1: u8 = 6;

pub const CMD_SET_SAMPLING_PERIOD: u8 = 0xA0;
pub const CMD_STOP: u8 = 0xA1;
pub const CMD_GO: u8 = 0xA2;

/// Snapshot of the values a node publishes.
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRegisters {
    pub sampling_period: u8,
    pub sample_number: u16,
    /// `NaN` until the first Leq window closes
    pub leq: f32,
}

impl NodeRegisters {
    pub fn to_bytes(&self) -> [u8; REGISTER_COUNT] {
        let mut bytes = [0u8; REGISTER_COUNT];
        bytes[REG_SAMPLING_PERIOD as usize] = self.sampling_period;
        bytes[REG_SAMPLE_NUMBER_LSB as usize..=REG_SAMPLE_NUMBER_MSB as usize]
            .copy_from_slice(&self.sample_number.to_le_bytes());
        bytes[REG_LEQ_LSB0 as usize..=REG_LEQ_MSB1 as usize]
            .copy_from_slice(&self.leq.to_le_bytes());
        bytes
    }

    /// The byte at register `address`, or `None` past the end of the image.
    pub fn read(&self, address: u8) -> Option<u8> {
        self.to_bytes().get(usize::from(address)).copied()
    }
}

/// A command sent by the coordinator.
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// Change the sampling period (ms)
    SetSamplingPeriod(u8),
    /// Stop sampling
    Stop,
    /// Start sampling
    Go,
}

impl Command {
    /// Decodes a command from the bytes written by the coordinator.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        match bytes {
            [CMD_SET_SAMPLING_PERIOD, period, ..] => Ok(Command::SetSamplingPeriod(*period)),
            [CMD_SET_SAMPLING_PERIOD] => Err(Error::MalformedCommand),
            [CMD_STOP, ..] => Ok(Command::Stop),
            [CMD_GO, ..] => Ok(Command::Go),
            [other, ..] => Err(Error::UnknownCommand(*other)),
            [] => Err(Error::MalformedCommand),
        }
    }
}
