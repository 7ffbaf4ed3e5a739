use core::fmt;

#[cfg(feature = "defmt")]
use defmt::Format;

/// All possible errors in this crate, other than those of the ADC itself.
///
/// ADC errors are returned unchanged as [`nb::Error`] by the
/// `accumulate` methods.
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// `compute` was called with no samples accumulated since the last
    /// `compute`
    InvalidState,
    /// A configuration parameter is outside of its domain
    InvalidConfiguration(Parameter),
    /// A coordinator command byte that is not recognised
    UnknownCommand(u8),
    /// A coordinator command without its argument
    MalformedCommand,
}

/// Configuration parameter rejected by a constructor.
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Parameter {
    /// Full-scale voltage of the ADC
    MaxVoltage,
    /// Full-scale code of the ADC
    MaxCode,
    /// Sampling period in milliseconds
    SamplingPeriod,
    /// Number of samples per Li interval
    SamplesPerInterval,
    /// Number of Li intervals per Leq window
    IntervalsPerWindow,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parameter::MaxVoltage => "max voltage",
            Parameter::MaxCode => "max code",
            Parameter::SamplingPeriod => "sampling period",
            Parameter::SamplesPerInterval => "samples per interval",
            Parameter::IntervalsPerWindow => "intervals per window",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidState => write!(f, "no samples accumulated since last compute"),
            Error::InvalidConfiguration(parameter) => {
                write!(f, "invalid configuration: {parameter} must be positive")
            }
            Error::UnknownCommand(byte) => write!(f, "unknown command 0x{byte:02X}"),
            Error::MalformedCommand => write!(f, "command is missing its argument"),
        }
    }
}
