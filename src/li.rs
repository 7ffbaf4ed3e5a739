use crate::{
    error::Error,
    level,
    sample::{ReadError, SampleAccumulator},
};
use embedded_hal::adc::{Channel, OneShot};

/// Microphone and amplifier calibration.
///
/// - `reference_level`: Sound pressure level producing `sensitivity` at
///   the microphone output (dB SPL)
/// - `sensitivity`: Microphone output at `reference_level` (dBV/Pa)
/// - `gain`: Amplifier gain (dB)
///
/// The default describes an electret microphone (−44 dBV/Pa at 94 dB SPL)
/// behind a MAX4466 amplifier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub reference_level: f64,
    pub sensitivity: f64,
    pub gain: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            reference_level: 94.0,
            sensitivity: -44.0,
            gain: 52.0,
        }
    }
}

/// Computes the sound level Li of each interval sampled by a
/// [`SampleAccumulator`].
#[derive(Debug)]
pub struct SoundLevelStage<Pin, Word> {
    accumulator: SampleAccumulator<Pin, Word>,
    calibration: Calibration,
    li: Option<f64>,
}

impl<Pin, Word> SoundLevelStage<Pin, Word> {
    pub fn new(accumulator: SampleAccumulator<Pin, Word>, calibration: Calibration) -> Self {
        Self {
            accumulator,
            calibration,
            li: None,
        }
    }

    /// Uses the default [`Calibration`].
    pub fn with_defaults(accumulator: SampleAccumulator<Pin, Word>) -> Self {
        Self::new(accumulator, Calibration::default())
    }

    /// Destroys the stage and returns the `Pin`.
    pub fn free(self) -> Pin {
        self.accumulator.free()
    }

    /// See [`SampleAccumulator::accumulate`].
    pub fn accumulate<Adc, ADC>(
        &mut self,
        adc: &mut Adc,
    ) -> Result<(), ReadError<Adc, ADC, Word, Pin>>
    where
        Word: Copy + Into<u32>,
        Pin: Channel<ADC>,
        Adc: OneShot<ADC, Word, Pin>,
    {
        self.accumulator.accumulate(adc)
    }

    /// Computes the RMS value of the current interval and returns its
    /// sound level.
    ///
    /// A silent interval yields `-inf`.
    pub fn compute(&mut self) -> Result<f64, Error> {
        self.accumulator.compute()?;

        // compute() succeeded, so dbv is set
        let dbv = self.accumulator.dbv().ok_or(Error::InvalidState)?;
        let li = level::sound_level(dbv, &self.calibration);
        self.li = Some(li);
        debug!("li: {} dB ({} dBV)", li, dbv);

        Ok(li)
    }

    /// Sound level of the last computed interval.
    pub fn li(&self) -> Option<f64> {
        self.li
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn accumulator(&self) -> &SampleAccumulator<Pin, Word> {
        &self.accumulator
    }

    /// Samples accumulated in the current interval.
    pub fn samples(&self) -> u32 {
        self.accumulator.samples()
    }

    pub fn total_samples(&self) -> u64 {
        self.accumulator.total_samples()
    }

    pub fn vrms(&self) -> Option<f64> {
        self.accumulator.vrms()
    }

    pub fn dbv(&self) -> Option<f64> {
        self.accumulator.dbv()
    }
}
