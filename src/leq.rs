use crate::{
    clock::{elapsed_ms, Clock},
    error::{Error, Parameter},
    level,
    li::SoundLevelStage,
    sample::ReadError,
    registers::{Command, NodeRegisters},
};
use embedded_hal::adc::{Channel, OneShot};

/// The three nested windows of an [`EquivalentLevelAggregator`].
///
/// - `sampling_period_ms`: Minimum time between two samples (ms)
/// - `samples_per_interval`: Samples per Li interval
/// - `intervals_per_window`: Li intervals per Leq window
///
/// The default samples every millisecond, computes Li every 2 s and Leq
/// every 5 minutes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timing {
    pub sampling_period_ms: u32,
    pub samples_per_interval: u32,
    pub intervals_per_window: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sampling_period_ms: 1,
            samples_per_interval: 2000,
            intervals_per_window: 150,
        }
    }
}

impl Timing {
    fn validate(&self) -> Result<(), Error> {
        let invalid = if self.sampling_period_ms == 0 {
            Parameter::SamplingPeriod
        } else if self.samples_per_interval == 0 {
            Parameter::SamplesPerInterval
        } else if self.intervals_per_window == 0 {
            Parameter::IntervalsPerWindow
        } else {
            return Ok(());
        };

        warn!("leq: rejected timing, {} must be positive", invalid);
        Err(Error::InvalidConfiguration(invalid))
    }

    fn interval_ms(&self) -> f64 {
        f64::from(self.sampling_period_ms) * f64::from(self.samples_per_interval)
    }
}

/// Computes the equivalent continuous sound level Leq from the Li values
/// of a [`SoundLevelStage`].
///
/// Li values are averaged in the energy domain, each weighted by the
/// duration of its interval. A silent interval contributes no energy; a
/// window that is silent throughout yields a Leq of `-inf`.
#[derive(Debug)]
pub struct EquivalentLevelAggregator<Pin, Word, Clk> {
    stage: SoundLevelStage<Pin, Word>,
    clock: Clk,
    timing: Timing,
    next_sampling_period_ms: Option<u32>,
    last_sample_ms: u32,
    energy: f64,
    window_ms: f64,
    intervals: u32,
    leq: Option<f64>,
    running: bool,
}

impl<Pin, Word, Clk> EquivalentLevelAggregator<Pin, Word, Clk>
where
    Clk: Clock,
{
    /// Returns an aggregator sampling `stage` at the pace of `clock`.
    ///
    /// The first sample is taken one sampling period after construction.
    ///
    /// # Examples
    ///
    /// ```
    /// use leq_meter::{
    ///     Clock, Config, EquivalentLevelAggregator, SampleAccumulator, SoundLevelStage, Timing,
    /// };
    /// # use embedded_hal_mock::adc::{Mock, MockChan0, Transaction};
    /// #
    /// # struct Millis;
    /// # impl Clock for Millis {
    /// #     fn now_ms(&self) -> u32 { 0 }
    /// # }
    /// # let pin = MockChan0 {};
    /// # let expectations: [Transaction<u16>; 0] = [];
    /// # let mut adc = Mock::new(&expectations);
    ///
    /// let accumulator = SampleAccumulator::new(pin, Config::default()).unwrap();
    /// let stage = SoundLevelStage::with_defaults(accumulator);
    /// let mut leq = EquivalentLevelAggregator::new(stage, Millis, Timing::default()).unwrap();
    ///
    /// // In the main loop:
    /// leq.accumulate(&mut adc).unwrap();
    /// if leq.compute().unwrap() {
    ///     let _level = leq.leq();
    /// }
    /// ```
    pub fn new(stage: SoundLevelStage<Pin, Word>, clock: Clk, timing: Timing) -> Result<Self, Error> {
        timing.validate()?;

        let last_sample_ms = clock.now_ms();
        Ok(Self {
            stage,
            clock,
            timing,
            next_sampling_period_ms: None,
            last_sample_ms,
            energy: 0.0,
            window_ms: 0.0,
            intervals: 0,
            leq: None,
            running: true,
        })
    }

    /// Destroys the aggregator and returns the `Pin` and the clock.
    pub fn free(self) -> (Pin, Clk) {
        (self.stage.free(), self.clock)
    }

    /// Takes one sample if a sampling period has elapsed since the last
    /// one, and returns whether it did.
    ///
    /// No sample is taken while sampling is stopped, nor while the
    /// current interval is complete and waiting for
    /// [`compute`](EquivalentLevelAggregator::compute). If the ADC
    /// returns an error, the error is returned and the next call tries
    /// again.
    pub fn accumulate<Adc, ADC>(
        &mut self,
        adc: &mut Adc,
    ) -> Result<bool, ReadError<Adc, ADC, Word, Pin>>
    where
        Word: Copy + Into<u32>,
        Pin: Channel<ADC>,
        Adc: OneShot<ADC, Word, Pin>,
    {
        if !self.running || self.stage.samples() >= self.timing.samples_per_interval {
            return Ok(false);
        }

        let now = self.clock.now_ms();
        if elapsed_ms(now, self.last_sample_ms) < self.timing.sampling_period_ms {
            return Ok(false);
        }

        self.stage.accumulate(adc)?;
        self.last_sample_ms = now;

        Ok(true)
    }

    /// Folds the current interval into the window once it is complete,
    /// and returns `true` when this closes the window with a new Leq.
    ///
    /// At most one interval is folded per call; calls in between are
    /// no-ops.
    pub fn compute(&mut self) -> Result<bool, Error> {
        if self.stage.samples() == self.timing.samples_per_interval {
            let li = self.stage.compute()?;
            let ti = self.timing.interval_ms();

            self.energy += level::interval_energy(li, ti);
            self.window_ms += ti;
            self.intervals += 1;
            trace!(
                "leq: interval {}/{} at {} dB",
                self.intervals,
                self.timing.intervals_per_window,
                li
            );

            if let Some(period) = self.next_sampling_period_ms.take() {
                self.timing.sampling_period_ms = period;
            }
        }

        if self.intervals < self.timing.intervals_per_window {
            return Ok(false);
        }

        let leq = level::equivalent_level(self.energy, self.window_ms);
        self.leq = Some(leq);
        self.energy = 0.0;
        self.window_ms = 0.0;
        self.intervals = 0;
        debug!("leq: {} dB", leq);

        Ok(true)
    }

    /// Applies a coordinator command.
    pub fn apply(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::SetSamplingPeriod(period) => self.set_sampling_period(u32::from(period))?,
            Command::Stop => self.running = false,
            Command::Go => self.running = true,
        }

        Ok(())
    }

    /// Changes the sampling period.
    ///
    /// An interval is always sampled with a single period: if the current
    /// interval already holds samples, the new period takes effect once it
    /// is folded. Each interval is weighted by the period it was sampled
    /// with.
    pub fn set_sampling_period(&mut self, sampling_period_ms: u32) -> Result<(), Error> {
        let timing = Timing {
            sampling_period_ms,
            ..self.timing
        };
        timing.validate()?;

        if self.stage.samples() == 0 {
            self.timing = timing;
            self.next_sampling_period_ms = None;
        } else {
            self.next_sampling_period_ms = Some(sampling_period_ms);
        }

        Ok(())
    }

    /// Values published to a coordinator.
    pub fn registers(&self) -> NodeRegisters {
        NodeRegisters {
            sampling_period: u8::try_from(self.timing.sampling_period_ms).unwrap_or(u8::MAX),
            // wraps like the 16-bit counter of the node
            sample_number: self.stage.total_samples() as u16,
            leq: self.leq.map_or(f32::NAN, |leq| leq as f32),
        }
    }

    /// Leq of the last closed window.
    pub fn leq(&self) -> Option<f64> {
        self.leq
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Sampling period of the current interval.
    pub fn sampling_period_ms(&self) -> u32 {
        self.timing.sampling_period_ms
    }

    /// Sampling period that takes effect at the next interval.
    pub fn next_sampling_period_ms(&self) -> Option<u32> {
        self.next_sampling_period_ms
    }

    pub fn samples_per_interval(&self) -> u32 {
        self.timing.samples_per_interval
    }

    pub fn intervals_per_window(&self) -> u32 {
        self.timing.intervals_per_window
    }

    /// Li intervals folded into the current window.
    pub fn completed_intervals(&self) -> u32 {
        self.intervals
    }

    pub fn stage(&self) -> &SoundLevelStage<Pin, Word> {
        &self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::test_clock::TestClock,
        sample::tests::{accumulator, adc, unit_config, BusyAdc},
    };
    use embedded_hal_mock::{
        adc::{Mock, MockChan0, Transaction},
        common::Generic,
        MockError,
    };
    use std::io::ErrorKind;

    type Aggregator<'a> = EquivalentLevelAggregator<MockChan0, u16, &'a TestClock>;

    fn timing(samples_per_interval: u32, intervals_per_window: u32) -> Timing {
        Timing {
            sampling_period_ms: 10,
            samples_per_interval,
            intervals_per_window,
        }
    }

    fn aggregator(clock: &TestClock, timing: Timing) -> Aggregator<'_> {
        let stage = SoundLevelStage::with_defaults(accumulator(unit_config()));
        EquivalentLevelAggregator::new(stage, clock, timing).unwrap()
    }

    fn sample_interval(
        aggregator: &mut Aggregator<'_>,
        clock: &TestClock,
        adc: &mut Generic<Transaction<u16>>,
    ) {
        for _ in 0..aggregator.samples_per_interval() {
            clock.advance(aggregator.sampling_period_ms());
            assert!(aggregator.accumulate(adc).unwrap());
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "{actual} is not close to {expected}"
        );
    }

    #[test]
    fn rejects_invalid_timing() {
        let clock = TestClock::default();
        for (timing, parameter) in [
            (Timing { sampling_period_ms: 0, ..timing(1, 1) }, Parameter::SamplingPeriod),
            (timing(0, 1), Parameter::SamplesPerInterval),
            (timing(1, 0), Parameter::IntervalsPerWindow),
        ] {
            let stage = SoundLevelStage::with_defaults(accumulator(unit_config()));
            assert_eq!(
                EquivalentLevelAggregator::new(stage, &clock, timing).err(),
                Some(Error::InvalidConfiguration(parameter))
            );
        }
    }

    #[test]
    fn rate_limits_samples() {
        let clock = TestClock::at(1000);
        let mut aggregator = aggregator(&clock, timing(4, 1));
        let mut adc = adc(&[513, 511]);

        assert!(!aggregator.accumulate(&mut adc).unwrap());
        clock.advance(9);
        assert!(!aggregator.accumulate(&mut adc).unwrap());
        clock.advance(1);
        assert!(aggregator.accumulate(&mut adc).unwrap());
        clock.advance(5);
        assert!(!aggregator.accumulate(&mut adc).unwrap());
        clock.advance(5);
        assert!(aggregator.accumulate(&mut adc).unwrap());

        assert_eq!(aggregator.stage().samples(), 2);
        adc.done();
    }

    #[test]
    fn rate_limits_across_clock_wrap() {
        let clock = TestClock::at(u32::MAX - 3);
        let mut aggregator = aggregator(&clock, timing(4, 1));
        let mut adc = adc(&[513]);

        clock.advance(6);
        assert!(!aggregator.accumulate(&mut adc).unwrap());
        clock.advance(4);
        assert!(aggregator.accumulate(&mut adc).unwrap());
        adc.done();
    }

    #[test]
    fn instances_keep_their_own_pace() {
        let clock = TestClock::default();
        let mut first = aggregator(&clock, timing(4, 1));
        clock.advance(5);
        let mut second = aggregator(&clock, timing(4, 1));
        let mut adc = adc(&[513, 511]);

        clock.advance(5);
        assert!(first.accumulate(&mut adc).unwrap());
        assert!(!second.accumulate(&mut adc).unwrap());
        clock.advance(5);
        assert!(second.accumulate(&mut adc).unwrap());
        adc.done();
    }

    #[test]
    fn adc_error_does_not_consume_the_period() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(4, 1));
        let mut adc = Mock::new(&[
            Transaction::read(0, 0).with_error(MockError::Io(ErrorKind::InvalidData)),
            Transaction::read(0, 513),
        ]);

        clock.advance(10);
        assert!(aggregator.accumulate(&mut adc).is_err());
        assert!(aggregator.accumulate(&mut adc).unwrap());
        assert_eq!(aggregator.stage().samples(), 1);
        adc.done();
    }

    #[test]
    fn busy_adc_does_not_consume_the_period() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(4, 1));
        let mut adc = BusyAdc { busy: 1, code: 513 };

        clock.advance(10);
        assert!(matches!(
            aggregator.accumulate(&mut adc),
            Err(nb::Error::WouldBlock)
        ));
        assert_eq!(aggregator.stage().samples(), 0);
        assert_eq!(aggregator.stage().accumulator().last_code(), None);

        assert!(aggregator.accumulate(&mut adc).unwrap());
        assert_eq!(aggregator.stage().samples(), 1);
        assert_eq!(aggregator.stage().accumulator().last_code(), Some(513));
    }

    #[test]
    fn compute_waits_for_a_complete_interval() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(2, 2));
        let mut adc = adc(&[513]);

        assert!(!aggregator.compute().unwrap());
        clock.advance(10);
        aggregator.accumulate(&mut adc).unwrap();

        assert!(!aggregator.compute().unwrap());
        assert_eq!(aggregator.completed_intervals(), 0);
        assert_eq!(aggregator.energy, 0.0);
        assert_eq!(aggregator.stage().samples(), 1);
        assert_eq!(aggregator.stage().li(), None);
        adc.done();
    }

    #[test]
    fn complete_interval_waits_for_compute() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(2, 2));
        let mut adc = adc(&[513, 511, 522]);

        sample_interval(&mut aggregator, &clock, &mut adc);
        clock.advance(50);
        assert!(!aggregator.accumulate(&mut adc).unwrap());
        assert_eq!(aggregator.stage().samples(), 2);

        aggregator.compute().unwrap();
        assert!(aggregator.accumulate(&mut adc).unwrap());
        adc.done();
    }

    #[test]
    fn energy_average_of_two_intervals() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(2, 2));
        // ±1 V -> 86 dB, then ±10 V -> 106 dB
        let mut adc = adc(&[513, 511, 522, 502]);

        sample_interval(&mut aggregator, &clock, &mut adc);
        assert!(!aggregator.compute().unwrap());
        assert_eq!(aggregator.completed_intervals(), 1);
        assert_close(aggregator.stage().li().unwrap(), 86.0);

        let energy = aggregator.energy;
        assert!(!aggregator.compute().unwrap());
        assert!(!aggregator.compute().unwrap());
        assert_eq!(aggregator.energy, energy);
        assert_eq!(aggregator.completed_intervals(), 1);
        assert_eq!(aggregator.leq(), None);

        sample_interval(&mut aggregator, &clock, &mut adc);
        assert!(aggregator.compute().unwrap());

        let expected = 10.0 * ((10f64.powf(8.6) + 10f64.powf(10.6)) / 2.0).log10();
        let leq = aggregator.leq().unwrap();
        assert_close(leq, expected);
        assert!(leq > 86.0 && leq < 106.0);
        assert_eq!(aggregator.completed_intervals(), 0);
        assert_eq!(aggregator.energy, 0.0);

        assert!(!aggregator.compute().unwrap());
        assert_eq!(aggregator.leq(), Some(leq));
        adc.done();
    }

    #[test]
    fn signals_completion_once_per_window() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(1, 3));
        let mut adc = adc(&[513; 9]);

        let mut completed = Vec::new();
        for interval in 1..=9 {
            sample_interval(&mut aggregator, &clock, &mut adc);
            if aggregator.compute().unwrap() {
                completed.push(interval);
            }
        }

        assert_eq!(completed, [3, 6, 9]);
        assert_close(aggregator.leq().unwrap(), 86.0);
        assert_eq!(aggregator.stage().total_samples(), 9);
        adc.done();
    }

    #[test]
    fn silence_yields_negative_infinity() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(2, 1));
        let mut adc = adc(&[512, 512]);

        sample_interval(&mut aggregator, &clock, &mut adc);
        assert!(aggregator.compute().unwrap());

        assert_eq!(aggregator.stage().li(), Some(f64::NEG_INFINITY));
        assert_eq!(aggregator.leq(), Some(f64::NEG_INFINITY));
        adc.done();
    }

    #[test]
    fn stop_and_go() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(4, 1));
        let mut adc = adc(&[513]);

        aggregator.apply(Command::Stop).unwrap();
        assert!(!aggregator.is_running());
        clock.advance(100);
        assert!(!aggregator.accumulate(&mut adc).unwrap());

        aggregator.apply(Command::Go).unwrap();
        assert!(aggregator.accumulate(&mut adc).unwrap());
        adc.done();
    }

    #[test]
    fn set_sampling_period() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(4, 1));

        aggregator.apply(Command::SetSamplingPeriod(25)).unwrap();
        assert_eq!(aggregator.sampling_period_ms(), 25);
        assert_eq!(
            aggregator.apply(Command::SetSamplingPeriod(0)),
            Err(Error::InvalidConfiguration(Parameter::SamplingPeriod))
        );
        assert_eq!(aggregator.sampling_period_ms(), 25);

        let mut adc = adc(&[513]);
        clock.advance(10);
        assert!(!aggregator.accumulate(&mut adc).unwrap());
        clock.advance(15);
        assert!(aggregator.accumulate(&mut adc).unwrap());
        adc.done();
    }

    #[test]
    fn mixed_periods_weigh_by_duration() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(1, 2));
        let mut adc = adc(&[513, 522]);

        sample_interval(&mut aggregator, &clock, &mut adc);
        aggregator.compute().unwrap();
        aggregator.set_sampling_period(30).unwrap();
        sample_interval(&mut aggregator, &clock, &mut adc);
        assert!(aggregator.compute().unwrap());

        let expected = 10.0 * ((10.0 * 10f64.powf(8.6) + 30.0 * 10f64.powf(10.6)) / 40.0).log10();
        assert_close(aggregator.leq().unwrap(), expected);
        adc.done();
    }

    #[test]
    fn period_change_waits_for_the_next_interval() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(2, 2));
        // ±1 V -> 86 dB at 10 ms, then ±10 V -> 106 dB at 30 ms
        let mut adc = adc(&[513, 511, 522, 502]);

        clock.advance(10);
        assert!(aggregator.accumulate(&mut adc).unwrap());
        aggregator.set_sampling_period(30).unwrap();
        assert_eq!(aggregator.sampling_period_ms(), 10);
        assert_eq!(aggregator.next_sampling_period_ms(), Some(30));

        clock.advance(10);
        assert!(aggregator.accumulate(&mut adc).unwrap());
        assert!(!aggregator.compute().unwrap());
        assert_eq!(aggregator.sampling_period_ms(), 30);
        assert_eq!(aggregator.next_sampling_period_ms(), None);

        sample_interval(&mut aggregator, &clock, &mut adc);
        assert!(aggregator.compute().unwrap());

        let expected = 10.0 * ((20.0 * 10f64.powf(8.6) + 60.0 * 10f64.powf(10.6)) / 80.0).log10();
        assert_close(aggregator.leq().unwrap(), expected);
        adc.done();
    }

    #[test]
    fn registers() {
        let clock = TestClock::default();
        let mut aggregator = aggregator(&clock, timing(2, 1));
        assert!(aggregator.registers().leq.is_nan());

        let mut adc = adc(&[513, 511]);
        sample_interval(&mut aggregator, &clock, &mut adc);
        aggregator.compute().unwrap();

        let registers = aggregator.registers();
        assert_eq!(registers.sampling_period, 10);
        assert_eq!(registers.sample_number, 2);
        assert_eq!(registers.leq, 86.0f32);
        adc.done();
    }

    #[test]
    fn free() {
        let clock = TestClock::at(3);
        let aggregator = aggregator(&clock, timing(1, 1));
        let (_pin, clock) = aggregator.free();
        assert_eq!(clock.now_ms(), 3);
    }
}
