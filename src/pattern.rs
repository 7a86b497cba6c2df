//! Input spike patterns for the FPGA spike generator, and the stimulus file format.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::address::{decode_input_address, encode_input_address};
use crate::error::DynapseError;
use crate::{ISI_US_BASE, MAX_DELAY, MAX_STIMULUS_EVENTS};

/// An input event for the spike generator: a virtual source address plus a
/// delay from the previous event, in ISI units.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InputEvent {
    /// The virtual core hosting the source neuron (2 bits).
    pub virtual_core: u8,
    /// The address of the virtual source neuron (8 bits).
    pub neuron_address: u8,
    /// Destination core bitmask, one bit per physical core (4 bits).
    pub core_dest: u8,
    /// Destination chip (2 bits).
    pub chip_dest: u8,
    /// Delay from the previous event, in ISI units.
    pub delay: u32,
}

impl InputEvent {
    /// Create a new input event, checking every address field against its bit width.
    pub fn new(
        virtual_core: u8,
        neuron_address: u8,
        core_dest: u8,
        chip_dest: u8,
        delay: u32,
    ) -> Result<Self, DynapseError> {
        // Packing validates the field widths.
        encode_input_address(virtual_core, neuron_address, core_dest, chip_dest)?;
        Ok(InputEvent {
            virtual_core,
            neuron_address,
            core_dest,
            chip_dest,
            delay,
        })
    }

    /// Recover an event from its packed address and its delay.
    /// The destination chip is not part of the packed low bits and is left at 0.
    pub fn from_address(address: u16, delay: u32) -> Self {
        let (virtual_core, neuron_address, core_dest) = decode_input_address(address);
        InputEvent {
            virtual_core,
            neuron_address,
            core_dest,
            chip_dest: 0,
            delay,
        }
    }

    /// The packed 16-bit address of the event.
    pub fn address(&self) -> u16 {
        encode_input_address(
            self.virtual_core,
            self.neuron_address,
            self.core_dest,
            self.chip_dest,
        )
        .expect("fields validated on construction")
    }
}

/// How the delay of a single event is specified.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Firing {
    /// Firing frequency in Hz; the delay is its reciprocal.
    Freq(f64),
    /// Delay in seconds.
    Period(f64),
}

/// How the delays of a group of events are specified.
#[derive(Debug, PartialEq, Clone)]
pub enum Timing {
    /// Absolute times in seconds; inter-spike delays are derived by differencing.
    Absolute(Vec<f64>),
    /// Per-event firing frequencies in Hz.
    Freqs(Vec<f64>),
    /// Per-event delays in seconds.
    Periods(Vec<f64>),
}

/// A named, time-ordered sequence of input events with its ISI time base.
///
/// The ISI base tunes the resolution of the spike generator: one ISI unit is
/// `isi_base / 90` microseconds, so `isi_base = 90` gives a resolution of 1 us
/// with a maximum representable delay of 65.535 ms x 1000, and `isi_base = 900`
/// a resolution of 10 us. When a dummy (filler) neuron is configured, delays
/// beyond the maximum are split across filler events automatically.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InputPattern {
    pub name: String,
    isi_base: f64,
    isi_ratio: f64,
    events: Vec<InputEvent>,
    dummy_neuron: Option<(u8, u8)>,
}

impl InputPattern {
    /// Create a new, empty pattern with the given ISI base.
    /// The base must lie within [1, 1000].
    pub fn new(name: &str, isi_base: f64) -> Result<Self, DynapseError> {
        if !(1.0..=1000.0).contains(&isi_base) {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in pattern {}: ISI base {} is not within [1, 1000]",
                name, isi_base
            )));
        }
        Ok(InputPattern {
            name: name.to_string(),
            isi_base,
            isi_ratio: isi_base / ISI_US_BASE,
            events: Vec::new(),
            dummy_neuron: None,
        })
    }

    pub fn events(&self) -> &[InputEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn isi_base(&self) -> f64 {
        self.isi_base
    }

    /// Configure a dummy neuron used to pad delays beyond the maximum
    /// representable one. Filler events are routed to no core at all.
    ///
    /// Do not use neuron 0 of core 0, and do not use a neuron that stimulates
    /// physical neurons in the chip.
    pub fn insert_dummy_neuron(&mut self, virtual_core: u8, neuron_address: u8) {
        self.dummy_neuron = Some((virtual_core, neuron_address));
    }

    /// Convert a delay in seconds to ISI units, splitting it across dummy filler
    /// events when it exceeds the maximum representable delay.
    fn push_with_delay(
        &mut self,
        virtual_core: u8,
        neuron_address: u8,
        core_dest: u8,
        chip_dest: u8,
        seconds: f64,
    ) -> Result<(), DynapseError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(DynapseError::OutOfRange(format!(
                "Error in pattern {}: delay of {} s cannot be represented",
                self.name, seconds
            )));
        }
        let mut delay = (seconds * 1e6 / self.isi_ratio).round();
        if let Some((dummy_core, dummy_address)) = self.dummy_neuron {
            while delay > MAX_DELAY as f64 {
                self.events
                    .push(InputEvent::new(dummy_core, dummy_address, 0, 0, MAX_DELAY)?);
                delay -= MAX_DELAY as f64;
            }
        }
        if delay > u32::MAX as f64 {
            return Err(DynapseError::OutOfRange(format!(
                "Error in pattern {}: delay of {} ISI units cannot be represented, consider increasing the ISI base or setting a dummy neuron",
                self.name, delay
            )));
        }
        self.events.push(InputEvent::new(
            virtual_core,
            neuron_address,
            core_dest,
            chip_dest,
            delay as u32,
        )?);
        Ok(())
    }

    /// Append a single event from one virtual source neuron.
    ///
    /// The delay is `1 / frequency` or the period, quantized to ISI units.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rusty_dynapse::pattern::{Firing, InputPattern};
    ///
    /// let mut pattern = InputPattern::new("single", 900.0).unwrap();
    /// // 0.1 s at a resolution of 10 us is 10_000 ISI units.
    /// pattern.single_event(1, 0, 0b1111, Firing::Period(0.1), 0).unwrap();
    /// assert_eq!(pattern.events()[0].delay, 10_000);
    /// ```
    pub fn single_event(
        &mut self,
        virtual_core: u8,
        neuron_address: u8,
        core_dest: u8,
        firing: Firing,
        chip_dest: u8,
    ) -> Result<(), DynapseError> {
        let seconds = match firing {
            Firing::Freq(freq) => {
                if freq <= 0.0 {
                    return Err(DynapseError::InvalidConfiguration(format!(
                        "Error in pattern {}: firing frequency {} is not positive",
                        self.name, freq
                    )));
                }
                1.0 / freq
            }
            Firing::Period(period) => period,
        };
        self.push_with_delay(virtual_core, neuron_address, core_dest, chip_dest, seconds)
    }

    /// Append a group of events, one per entry of the address vectors.
    ///
    /// The vectors must have identical lengths. Absolute times are turned into
    /// inter-spike delays by differencing, the first delay being the first time.
    pub fn multiple_events(
        &mut self,
        virtual_cores: &[u8],
        neuron_addresses: &[u8],
        core_dests: &[u8],
        timing: Timing,
        chip_dest: u8,
    ) -> Result<(), DynapseError> {
        let periods: Vec<f64> = match timing {
            Timing::Absolute(times) => {
                let mut periods = Vec::with_capacity(times.len());
                let mut previous = 0.0;
                for &t in &times {
                    periods.push(t - previous);
                    previous = t;
                }
                periods
            }
            Timing::Freqs(freqs) => {
                for &freq in &freqs {
                    if freq <= 0.0 {
                        return Err(DynapseError::InvalidConfiguration(format!(
                            "Error in pattern {}: firing frequency {} is not positive",
                            self.name, freq
                        )));
                    }
                }
                freqs.iter().map(|freq| 1.0 / freq).collect()
            }
            Timing::Periods(periods) => periods,
        };

        if virtual_cores.len() != neuron_addresses.len()
            || virtual_cores.len() != core_dests.len()
            || virtual_cores.len() != periods.len()
        {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in pattern {}: address and timing vectors have lengths {}/{}/{}/{}",
                self.name,
                virtual_cores.len(),
                neuron_addresses.len(),
                core_dests.len(),
                periods.len()
            )));
        }

        for i in 0..periods.len() {
            self.push_with_delay(
                virtual_cores[i],
                neuron_addresses[i],
                core_dests[i],
                chip_dest,
                periods[i],
            )?;
        }
        Ok(())
    }

    /// Append a constant-frequency burst: one event after `init_delay`, then
    /// `round(fire_freq * duration)` events at `1 / fire_freq` spacing.
    pub fn constant_freq(
        &mut self,
        virtual_core: u8,
        neuron_address: u8,
        core_dest: u8,
        fire_freq: f64,
        init_delay: f64,
        duration: f64,
        chip_dest: u8,
    ) -> Result<(), DynapseError> {
        if fire_freq <= 0.0 || duration <= 0.0 {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in pattern {}: frequency {} and duration {} must be positive",
                self.name, fire_freq, duration
            )));
        }
        self.single_event(
            virtual_core,
            neuron_address,
            core_dest,
            Firing::Period(init_delay),
            chip_dest,
        )?;
        let num_events = (fire_freq * duration).round() as usize;
        for _ in 0..num_events {
            self.single_event(
                virtual_core,
                neuron_address,
                core_dest,
                Firing::Freq(fire_freq),
                chip_dest,
            )?;
        }
        Ok(())
    }

    /// Append a linear frequency sweep from `freq_start` to `freq_stop` in
    /// `freq_steps` steps of `freq_phase_duration` seconds each, preceded by one
    /// event after `init_delay`.
    pub fn linear_freq_modulation(
        &mut self,
        virtual_core: u8,
        neuron_address: u8,
        core_dest: u8,
        freq_start: f64,
        freq_stop: f64,
        freq_steps: usize,
        freq_phase_duration: f64,
        init_delay: f64,
        chip_dest: u8,
    ) -> Result<(), DynapseError> {
        if freq_start <= 0.0 || freq_stop <= 0.0 || freq_phase_duration <= 0.0 {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in pattern {}: frequencies and phase duration must be positive",
                self.name
            )));
        }
        self.single_event(
            virtual_core,
            neuron_address,
            core_dest,
            Firing::Period(init_delay),
            chip_dest,
        )?;
        for freq in linspace(freq_start, freq_stop, freq_steps) {
            let num_events = (freq * freq_phase_duration).round() as usize;
            for _ in 0..num_events {
                self.single_event(
                    virtual_core,
                    neuron_address,
                    core_dest,
                    Firing::Freq(freq),
                    chip_dest,
                )?;
            }
        }
        Ok(())
    }

    /// Encode an analog waveform into Up/Down channel events by threshold crossing.
    ///
    /// Walking the samples `(t, y)`, an event is emitted whenever the signal has
    /// moved by at least `threshold` since the sample of the last event: on the Up
    /// channel for upward excursions, on the Down channel for downward ones. An
    /// optional uniform jitter in `[-jitter_var, jitter_var]` seconds is applied
    /// to every event time (and removed again for events it would push before
    /// zero); jittered events are re-sorted by time. With `init_delay` set, a
    /// first slope-directed event is emitted after that delay and the waveform is
    /// shifted accordingly.
    pub fn threshold_encoder<R: Rng>(
        &mut self,
        virtual_core: u8,
        up_address: u8,
        down_address: u8,
        core_dest: u8,
        threshold: f64,
        t: &[f64],
        y: &[f64],
        jitter_var: f64,
        init_delay: Option<f64>,
        chip_dest: u8,
        rng: &mut R,
    ) -> Result<(), DynapseError> {
        if t.len() != y.len() || t.len() < 2 {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in pattern {}: signal vectors must have the same length of at least 2, got {}/{}",
                self.name,
                t.len(),
                y.len()
            )));
        }
        if threshold <= 0.0 || jitter_var < 0.0 {
            return Err(DynapseError::InvalidConfiguration(format!(
                "Error in pattern {}: threshold must be positive and jitter variance non-negative",
                self.name
            )));
        }

        // Normalized signal times, in seconds.
        let offset = init_delay.unwrap_or(0.0);
        let times: Vec<f64> = t.iter().map(|&ti| ti - t[0] + offset).collect();

        let mut spike_times = Vec::new();
        let mut spike_addresses = Vec::new();

        if let Some(delay) = init_delay {
            spike_times.push(delay);
            spike_addresses.push(if y[1] >= y[0] { up_address } else { down_address });
        }

        let jitter = if jitter_var > 0.0 {
            Some(Uniform::new_inclusive(-jitter_var, jitter_var))
        } else {
            None
        };

        let mut last_spike_index = 0;
        for (index, &value) in y.iter().enumerate() {
            let excursion = value - y[last_spike_index];
            if excursion.abs() < threshold {
                continue;
            }
            let mut time = times[index];
            if let Some(ref dist) = jitter {
                let noise = dist.sample(rng);
                time += noise;
                if time < 0.0 {
                    time -= noise;
                }
            }
            spike_times.push(time);
            spike_addresses.push(if excursion > 0.0 { up_address } else { down_address });
            last_spike_index = index;
        }

        // Jitter may break the time ordering, which would corrupt the delays.
        if jitter.is_some() {
            (spike_times, spike_addresses) = spike_times
                .into_iter()
                .zip(spike_addresses)
                .sorted_by(|a, b| a.0.partial_cmp(&b.0).expect("spike times are finite"))
                .unzip();
        }

        let virtual_cores = vec![virtual_core; spike_times.len()];
        let core_dests = vec![core_dest; spike_times.len()];
        self.multiple_events(
            &virtual_cores,
            &spike_addresses,
            &core_dests,
            Timing::Absolute(spike_times),
            chip_dest,
        )
    }

    /// Append an event directly from its packed address and its delay in ISI units.
    pub fn add_manual_event(&mut self, address: u16, delay: u32) {
        self.events.push(InputEvent::from_address(address, delay));
    }

    /// The duration of the whole pattern, in microseconds.
    pub fn evaluate_duration(&self) -> f64 {
        self.events
            .iter()
            .map(|event| event.delay as f64 * self.isi_ratio)
            .sum()
    }
}

/// `num` evenly spaced values from `start` to `stop`, both included.
fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + i as f64 * step).collect()
        }
    }
}

/// Write a list of patterns to a stimulus text file, one `address,delay` line
/// per event.
///
/// The combined event count must fit the on-device buffer and every delay must
/// be representable; violations are reported naming the offending pattern. A
/// failing pattern leaves the patterns before it already written (at-most-partial
/// write), which is acceptable for a batch tool but should be kept in mind.
pub fn write_stimulus<P: AsRef<Path>>(
    path: P,
    patterns: &[&InputPattern],
) -> Result<(), DynapseError> {
    let file = File::create(&path).map_err(|e| {
        DynapseError::Io(format!(
            "Error while writing file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    let mut writer = BufWriter::new(file);

    let mut total_events = 0usize;
    for pattern in patterns {
        total_events += pattern.len();
        if total_events > MAX_STIMULUS_EVENTS {
            return Err(DynapseError::OutOfRange(format!(
                "Error while writing pattern {}: the stimulus is too big ({} events), it will not fit in SRAM",
                pattern.name, total_events
            )));
        }
        for (position, event) in pattern.events().iter().enumerate() {
            if event.delay > MAX_DELAY {
                return Err(DynapseError::OutOfRange(format!(
                    "Error while writing pattern {}: event at position {} has a delay too big ({}), consider increasing the ISI base",
                    pattern.name, position, event.delay
                )));
            }
        }
        for event in pattern.events() {
            writeln!(writer, "{},{}", event.address(), event.delay)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Import a stimulus file back into a pattern.
pub fn import_stimulus<P: AsRef<Path>>(
    path: P,
    name: &str,
    isi_base: f64,
) -> Result<InputPattern, DynapseError> {
    let file = File::open(&path).map_err(|e| {
        DynapseError::Io(format!(
            "Error while importing pattern {} from file {}: {}",
            name,
            path.as_ref().display(),
            e
        ))
    })?;

    let mut pattern = InputPattern::new(name, isi_base)?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.split_whitespace().next().unwrap_or("");
        if trimmed.is_empty() {
            continue;
        }
        let mut fields = trimmed.split(',');
        let parsed = match (fields.next(), fields.next()) {
            (Some(address), Some(delay)) => address
                .parse::<u16>()
                .ok()
                .zip(delay.parse::<u32>().ok()),
            _ => None,
        };
        match parsed {
            Some((address, delay)) => pattern.add_manual_event(address, delay),
            None => {
                return Err(DynapseError::InvalidConfiguration(format!(
                    "Error while importing pattern {}: cannot parse line '{}'",
                    name, line
                )))
            }
        }
    }
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Read;

    const SEED: u64 = 42;

    #[test]
    fn test_isi_base_bounds() {
        assert!(InputPattern::new("p", 90.0).is_ok());
        assert!(matches!(
            InputPattern::new("p", 0.5),
            Err(DynapseError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            InputPattern::new("p", 2000.0),
            Err(DynapseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_single_event_quantization() {
        // 0.1 s at isi_base 900 (10 us resolution) is 10_000 units.
        let mut pattern = InputPattern::new("p", 900.0).unwrap();
        pattern
            .single_event(0, 0, 0b0001, Firing::Period(0.1), 0)
            .unwrap();
        assert_eq!(pattern.events()[0].delay, 10_000);

        // 50 Hz at isi_base 90 (1 us resolution) is 20_000 units.
        let mut pattern = InputPattern::new("p", 90.0).unwrap();
        pattern
            .single_event(1, 2, 0b0011, Firing::Freq(50.0), 0)
            .unwrap();
        assert_eq!(pattern.events()[0].delay, 20_000);

        assert!(matches!(
            pattern.single_event(0, 0, 0, Firing::Freq(0.0), 0),
            Err(DynapseError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            pattern.single_event(0, 0, 0, Firing::Period(-1.0), 0),
            Err(DynapseError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_dummy_neuron_splits_long_delays() {
        let mut pattern = InputPattern::new("long", 90.0).unwrap();
        pattern.insert_dummy_neuron(0, 255);
        // 0.1 s beyond the maximum delay of 65.535 ms.
        pattern
            .single_event(1, 7, 0b1111, Firing::Period(0.1), 0)
            .unwrap();

        assert_eq!(pattern.len(), 2);
        let filler = &pattern.events()[0];
        assert_eq!(
            (filler.virtual_core, filler.neuron_address, filler.core_dest),
            (0, 255, 0)
        );
        assert_eq!(filler.delay, MAX_DELAY);
        let event = &pattern.events()[1];
        assert_eq!(event.delay, 100_000 - MAX_DELAY);
        // The total timing is preserved.
        assert_eq!(pattern.evaluate_duration(), 100_000.0);
    }

    #[test]
    fn test_multiple_events_from_absolute_times() {
        let mut pattern = InputPattern::new("p", 90.0).unwrap();
        pattern
            .multiple_events(
                &[1, 1, 1],
                &[2, 2, 2],
                &[5, 5, 5],
                Timing::Absolute(vec![20e-3, 40e-3, 60e-3]),
                0,
            )
            .unwrap();
        let delays: Vec<_> = pattern.events().iter().map(|e| e.delay).collect();
        assert_eq!(delays, vec![20_000, 20_000, 20_000]);

        assert!(matches!(
            pattern.multiple_events(&[0], &[0, 1], &[0], Timing::Periods(vec![0.1]), 0),
            Err(DynapseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_multiple_events_equivalent_forms() {
        let addresses = [2u8, 2, 2];
        let cores = [1u8, 1, 1];
        let dests = [5u8, 5, 5];

        let mut by_freq = InputPattern::new("f", 90.0).unwrap();
        by_freq
            .multiple_events(&cores, &addresses, &dests, Timing::Freqs(vec![50.0; 3]), 0)
            .unwrap();

        let mut by_period = InputPattern::new("p", 90.0).unwrap();
        by_period
            .multiple_events(
                &cores,
                &addresses,
                &dests,
                Timing::Periods(vec![20e-3; 3]),
                0,
            )
            .unwrap();

        assert_eq!(by_freq.events(), by_period.events());
    }

    #[test]
    fn test_constant_freq() {
        let mut pattern = InputPattern::new("tonic", 900.0).unwrap();
        pattern
            .constant_freq(3, 22, 0b0111, 50.0, 0.02, 1.0, 0)
            .unwrap();
        // One initial event plus 50 events of 20 ms.
        assert_eq!(pattern.len(), 51);
        assert!(pattern.events().iter().all(|e| e.delay == 2_000));
        assert!((pattern.evaluate_duration() - 1.02e6).abs() < 1e-9);
    }

    #[test]
    fn test_linear_freq_modulation() {
        let mut pattern = InputPattern::new("sweep", 90.0).unwrap();
        pattern
            .linear_freq_modulation(0, 5, 0b1000, 50.0, 100.0, 6, 0.1, 0.5, 0)
            .unwrap();
        // Steps at 50, 60, 70, 80, 90, 100 Hz for 0.1 s each: 5+6+7+8+9+10
        // events plus the initial one.
        assert_eq!(pattern.len(), 1 + 45);
        assert_eq!(pattern.events()[0].delay, 500_000);
        // The first step fires at 50 Hz.
        assert_eq!(pattern.events()[1].delay, 20_000);
        // The last step fires at 100 Hz.
        assert_eq!(pattern.events().last().unwrap().delay, 10_000);
    }

    #[test]
    fn test_threshold_encoder_without_jitter() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut pattern = InputPattern::new("ramp", 90.0).unwrap();

        // A rising then falling triangle sampled every millisecond.
        let t: Vec<f64> = (0..21).map(|i| i as f64 * 1e-3).collect();
        let y: Vec<f64> = (0..21)
            .map(|i| if i <= 10 { i as f64 } else { (20 - i) as f64 })
            .collect();

        pattern
            .threshold_encoder(0, 20, 21, 0b0001, 2.0, &t, &y, 0.0, Some(0.1), 0, &mut rng)
            .unwrap();

        // The initial event goes to the Up channel (rising first samples).
        assert_eq!(pattern.events()[0].neuron_address, 20);
        assert_eq!(pattern.events()[0].delay, 100_000);

        // Upward crossings first, then downward ones.
        let addresses: Vec<_> = pattern
            .events()
            .iter()
            .map(|e| e.neuron_address)
            .collect();
        assert_eq!(addresses, vec![20, 20, 20, 20, 20, 20, 21, 21, 21, 21, 21]);

        // Delays stay non-negative and the events are time-ordered by construction.
        assert!(pattern.events().iter().all(|e| e.delay > 0));
    }

    #[test]
    fn test_threshold_encoder_with_jitter_keeps_order() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut pattern = InputPattern::new("noisy", 90.0).unwrap();
        // Gaps around the sine peaks can exceed the maximum delay, so a dummy
        // neuron pads them.
        pattern.insert_dummy_neuron(0, 255);

        let t: Vec<f64> = (0..1000).map(|i| i as f64 * 1e-3).collect();
        let y: Vec<f64> = t.iter().map(|&ti| (2.0 * std::f64::consts::PI * ti).sin()).collect();

        pattern
            .threshold_encoder(0, 20, 21, 0b0001, 0.05, &t, &y, 1e-4, Some(0.1), 0, &mut rng)
            .unwrap();

        assert!(!pattern.is_empty());
        // Sorting the jittered times keeps every inter-spike delay non-negative,
        // which is what the generator requires.
        assert!(pattern.events().iter().all(|e| e.delay <= MAX_DELAY));
    }

    #[test]
    fn test_stimulus_roundtrip() {
        let mut pattern = InputPattern::new("out", 90.0).unwrap();
        pattern
            .multiple_events(
                &[1, 1],
                &[2, 3],
                &[0b0011, 0b0001],
                Timing::Periods(vec![0.01, 0.02]),
                0,
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stimulus.txt");
        write_stimulus(&path, &[&pattern]).unwrap();

        let imported = import_stimulus(&path, "back", 90.0).unwrap();
        assert_eq!(imported.len(), 2);
        assert_eq!(
            imported.events()[0].address(),
            pattern.events()[0].address()
        );
        assert_eq!(imported.events()[1].delay, 20_000);
    }

    #[test]
    fn test_stimulus_capacity() {
        let dir = tempfile::tempdir().unwrap();

        let mut exact = InputPattern::new("exact", 90.0).unwrap();
        for _ in 0..MAX_STIMULUS_EVENTS {
            exact.add_manual_event(0, 1);
        }
        write_stimulus(dir.path().join("full.txt"), &[&exact]).unwrap();

        let mut overflowing = InputPattern::new("overflowing", 90.0).unwrap();
        overflowing.add_manual_event(0, 1);
        let result = write_stimulus(dir.path().join("too_big.txt"), &[&exact, &overflowing]);
        match result {
            Err(DynapseError::OutOfRange(message)) => assert!(message.contains("overflowing")),
            other => panic!("expected an out of range error, got {:?}", other),
        }
    }

    #[test]
    fn test_stimulus_oversized_delay_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut pattern = InputPattern::new("slow", 90.0).unwrap();
        // Without a dummy neuron the oversized delay survives until write time.
        pattern
            .single_event(0, 0, 0, Firing::Period(0.1), 0)
            .unwrap();
        assert!(pattern.events()[0].delay > MAX_DELAY);

        let result = write_stimulus(dir.path().join("stimulus.txt"), &[&pattern]);
        match result {
            Err(DynapseError::OutOfRange(message)) => {
                assert!(message.contains("slow"));
                assert!(message.contains("position 0"));
            }
            other => panic!("expected an out of range error, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_write_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stimulus.txt");

        let mut good = InputPattern::new("good", 90.0).unwrap();
        good.add_manual_event(147, 10);
        let mut bad = InputPattern::new("bad", 90.0).unwrap();
        bad.add_manual_event(0, MAX_DELAY + 1);

        assert!(write_stimulus(&path, &[&good, &bad]).is_err());

        // The valid pattern before the failure point is already on disk.
        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "147,10\n");
    }

    #[test]
    fn test_import_rejects_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        std::fs::write(&path, "12,34\nnot-an-event\n").unwrap();
        assert!(matches!(
            import_stimulus(&path, "broken", 90.0),
            Err(DynapseError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(50.0, 100.0, 6), vec![50.0, 60.0, 70.0, 80.0, 90.0, 100.0]);
        assert_eq!(linspace(1.0, 2.0, 1), vec![1.0]);
        assert!(linspace(1.0, 2.0, 0).is_empty());
    }
}
