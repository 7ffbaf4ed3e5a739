use crate::{
    error::{Error, Parameter},
    level,
};
use embedded_hal::adc::{Channel, OneShot};

/// Configuration for a [`SampleAccumulator`].
///
/// - `max_voltage`: The voltage corresponding to `max_code` (V)
/// - `max_code`: The full-scale code of the ADC (eg. `1024` for a 10-bit ADC)
///
/// The signal is assumed to be biased at `max_voltage / 2`.
///
/// # Examples
///
/// ```
/// use leq_meter::Config;
///
/// let config = Config {
///     max_voltage: 5.0, // 5 V reference
///     max_code: 1024,   // 10 bits of precision
/// };
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    pub max_voltage: f64,
    pub max_code: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_voltage: 3.3,
            max_code: 1024,
        }
    }
}

/// Error returned when the ADC read fails or would block.
pub type ReadError<Adc, ADC, Word, Pin> = nb::Error<<Adc as OneShot<ADC, Word, Pin>>::Error>;

/// Accumulates the square of AC-coupled sample voltages and computes
/// their RMS value.
#[derive(Debug)]
pub struct SampleAccumulator<Pin, Word> {
    pin: Pin,
    config: Config,
    dc_offset: f64,
    volts_per_code: f64,
    sum_of_squares: f64,
    samples: u32,
    total_samples: u64,
    last_code: Option<Word>,
    vrms: Option<f64>,
    dbv: Option<f64>,
}

impl<Pin, Word> SampleAccumulator<Pin, Word> {
    /// Returns an accumulator reading from `pin`, using the provided `config`.
    ///
    /// Fails with [`Error::InvalidConfiguration`] unless `max_voltage` is
    /// positive and finite and `max_code` is non-zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use leq_meter::{Config, SampleAccumulator};
    /// # use embedded_hal_mock::adc::MockChan0;
    /// #
    /// # let pin = MockChan0 {};
    ///
    /// let accumulator = SampleAccumulator::new(pin, Config::default()).unwrap();
    /// # let accumulator: SampleAccumulator<MockChan0, u16> = accumulator;
    /// ```
    pub fn new<ADC>(pin: Pin, config: Config) -> Result<Self, Error>
    where
        Pin: Channel<ADC>,
    {
        if !(config.max_voltage.is_finite() && config.max_voltage > 0.0) {
            warn!("sample: rejected max voltage {}", config.max_voltage);
            return Err(Error::InvalidConfiguration(Parameter::MaxVoltage));
        }
        if config.max_code == 0 {
            warn!("sample: rejected max code 0");
            return Err(Error::InvalidConfiguration(Parameter::MaxCode));
        }

        Ok(Self {
            pin,
            config,
            dc_offset: config.max_voltage / 2.0,
            volts_per_code: config.max_voltage / f64::from(config.max_code),
            sum_of_squares: 0.0,
            samples: 0,
            total_samples: 0,
            last_code: None,
            vrms: None,
            dbv: None,
        })
    }

    /// Destroys the accumulator and returns the `Pin`.
    pub fn free(self) -> Pin {
        self.pin
    }

    /// Reads one sample from `adc` and adds its squared AC voltage to
    /// the running sum.
    ///
    /// If the ADC returns an error (including `WouldBlock`), nothing is
    /// accumulated and the error is returned.
    pub fn accumulate<Adc, ADC>(
        &mut self,
        adc: &mut Adc,
    ) -> Result<(), ReadError<Adc, ADC, Word, Pin>>
    where
        Word: Copy + Into<u32>,
        Pin: Channel<ADC>,
        Adc: OneShot<ADC, Word, Pin>,
    {
        let code = adc.read(&mut self.pin)?;
        let raw: u32 = code.into();
        let v = f64::from(raw) * self.volts_per_code - self.dc_offset;

        self.sum_of_squares += v * v;
        self.samples += 1;
        self.last_code = Some(code);
        trace!("sample: {} V, {} in interval", v, self.samples);

        Ok(())
    }

    /// Computes the RMS voltage and dBV of the samples accumulated since
    /// the last call, then starts a new interval.
    ///
    /// Returns [`Error::InvalidState`] without changing anything if no
    /// sample was accumulated. A silent interval yields a dBV of `-inf`.
    pub fn compute(&mut self) -> Result<(), Error> {
        if self.samples == 0 {
            return Err(Error::InvalidState);
        }

        let rms = libm::sqrt(self.sum_of_squares / f64::from(self.samples));
        self.vrms = Some(rms);
        self.dbv = Some(level::dbv(rms));

        self.total_samples += u64::from(self.samples);
        self.samples = 0;
        self.sum_of_squares = 0.0;

        Ok(())
    }

    /// Samples accumulated since the last [`compute`](SampleAccumulator::compute).
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Samples folded into all computes so far.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// RMS voltage of the last computed interval.
    pub fn vrms(&self) -> Option<f64> {
        self.vrms
    }

    /// Level of the last computed interval in dBV.
    pub fn dbv(&self) -> Option<f64> {
        self.dbv
    }

    /// The last raw code read from the ADC.
    pub fn last_code(&self) -> Option<Word>
    where
        Word: Copy,
    {
        self.last_code
    }

    /// The configuration the accumulator was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Voltage at full-scale code (V).
    pub fn max_voltage(&self) -> f64 {
        self.config.max_voltage
    }

    pub fn max_code(&self) -> u32 {
        self.config.max_code
    }
}
