//! End-of-event processing: smearing, classification and spectrum fills.

use crate::accumulator::EventAccumulator;
use crate::calibration::CalibrationConstants;
use crate::noise::Smearer;
use crate::resolution::ResolutionModel;
use crate::spectra::SpectrumBank;
use cdtesim_core::{science_bin, ChannelId, EventRecord, NO_SIGNAL, NUM_MODULES};

/// Turns the energy registers of a closed event into realistic signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventFinalizer {
    resolution: ResolutionModel,
    threshold_kev: f64,
}

impl EventFinalizer {
    /// Builds a finalizer from calibration constants.
    #[must_use]
    pub fn new(constants: &CalibrationConstants) -> Self {
        Self {
            resolution: ResolutionModel::new(constants),
            threshold_kev: constants.threshold_kev,
        }
    }

    /// Detection threshold (keV).
    #[must_use]
    pub fn threshold_kev(&self) -> f64 {
        self.threshold_kev
    }

    /// Finalizes one event.
    ///
    /// Every channel with a positive raw deposit is smeared, counted against
    /// the threshold, classified into an instrument bin and filled into the
    /// all-hits spectra. Only after all channels are done are modules with
    /// exactly one such channel filled into the single-hit spectra.
    pub fn finalize(
        &self,
        accumulator: &EventAccumulator,
        smearer: &mut Smearer,
        bank: &mut SpectrumBank,
    ) -> EventRecord {
        let raw = accumulator.raw();
        let collected = accumulator.collected();
        let mut record = EventRecord::empty(accumulator.kinematics(), 0);
        record.edep.copy_from_slice(raw);
        record.collected.copy_from_slice(collected);

        for channel in ChannelId::all() {
            let c = channel.index();
            if raw[c] <= 0.0 {
                continue;
            }
            let sigma = self.resolution.sigma(collected[c]);
            let smeared = smearer.smear(collected[c], sigma);
            record.charge[c] = smeared.charge_kev;
            record.realistic[c] = smeared.realistic_kev;

            if smeared.realistic_kev > self.threshold_kev {
                record.n_hits[channel.module()] += 1;
                bank.fill_pattern(channel);
            }
            record.sci[c] = i32::try_from(science_bin(smeared.realistic_kev)).unwrap_or(NO_SIGNAL);
            bank.fill_channel(channel, raw[c], smeared.realistic_kev);
        }

        for module in 0..NUM_MODULES {
            let mut hit = ChannelId::in_module(module).filter(|ch| raw[ch.index()] > 0.0);
            if let (Some(channel), None) = (hit.next(), hit.next()) {
                let c = channel.index();
                bank.fill_single_hit(channel, raw[c], record.realistic[c]);
            }
        }

        record.num_tracks = accumulator.track_count();
        record.total_steps = accumulator.step_count();
        record.hits = accumulator.ledger().clone();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionResponse;
    use crate::spectra::FineBinning;
    use approx::assert_relative_eq;
    use cdtesim_core::{IncidentKinematics, StepDeposit, Vec3, NO_SIGNAL_ENERGY};

    fn setup() -> (EventAccumulator, Smearer, SpectrumBank, EventFinalizer) {
        let constants = CalibrationConstants::default();
        let mut acc = EventAccumulator::new(16);
        acc.reset(IncidentKinematics::default());
        (
            acc,
            Smearer::new(Some(11), constants.electronic_noise_kev),
            SpectrumBank::new(FineBinning::default(), &constants).unwrap(),
            EventFinalizer::new(&constants),
        )
    }

    fn deposit(acc: &mut EventAccumulator, channel: i32, energy: f64) {
        let step = StepDeposit::in_pixel(channel, energy, Vec3::default());
        let response = CollectionResponse {
            depth_mm: 0.5,
            efficiency: 1.0,
            near_surface_factor: 1.0,
        };
        acc.deposit(ChannelId::new(channel).unwrap(), &step, &response);
    }

    #[test]
    fn test_single_hit_module() {
        let (mut acc, mut smearer, mut bank, finalizer) = setup();
        deposit(&mut acc, 13, 40.0);
        let record = finalizer.finalize(&acc, &mut smearer, &mut bank);

        let family = bank.family(1).unwrap();
        assert_relative_eq!(family.edep.integral(), 1.0);
        assert_relative_eq!(family.edep_single.integral(), 1.0);
        assert_relative_eq!(family.real_sci_single.integral(), 1.0);
        assert_eq!(record.n_hits[1], 1);
        assert_relative_eq!(record.edep[13], 40.0);
        assert!(record.realistic[13] > 30.0);
        assert_eq!(record.sci[12], NO_SIGNAL);
        assert_relative_eq!(record.realistic[12], NO_SIGNAL_ENERGY);
    }

    #[test]
    fn test_two_channels_in_module_are_not_single_hit() {
        let (mut acc, mut smearer, mut bank, finalizer) = setup();
        deposit(&mut acc, 24, 20.0);
        deposit(&mut acc, 30, 25.0);
        // A lone hit in another module stays single.
        deposit(&mut acc, 100, 15.0);
        finalizer.finalize(&acc, &mut smearer, &mut bank);

        let module2 = bank.family(2).unwrap();
        assert_relative_eq!(module2.edep.integral(), 2.0);
        assert_relative_eq!(module2.edep_single.integral(), 0.0);
        assert_relative_eq!(module2.real_sci_single.integral(), 0.0);

        let module8 = bank.family(8).unwrap();
        assert_relative_eq!(module8.edep_single.integral(), 1.0);
    }

    #[test]
    fn test_sub_threshold_signal() {
        let (mut acc, _, mut bank, finalizer) = setup();
        let mut smearer = Smearer::new(Some(1), 0.0);
        let finalizer = EventFinalizer {
            resolution: ResolutionModel::new(&CalibrationConstants {
                fano_factor: 0.0,
                ..CalibrationConstants::default()
            }),
            ..finalizer
        };
        deposit(&mut acc, 0, 2.5);
        let record = finalizer.finalize(&acc, &mut smearer, &mut bank);
        assert_eq!(record.n_hits[0], 0);
        assert_eq!(record.sci[0], 0);
        assert_relative_eq!(record.realistic[0], 2.5);
        assert_relative_eq!(bank.family(0).unwrap().pattern.integral(), 0.0);
        assert_relative_eq!(bank.family(0).unwrap().real_sci.content(0), 1.0);
        // Single-hit classification uses raw deposits, not the threshold.
        assert_relative_eq!(bank.family(0).unwrap().edep_single.integral(), 1.0);
    }

    #[test]
    fn test_noiseless_binning() {
        let (mut acc, _, mut bank, finalizer) = setup();
        let mut smearer = Smearer::new(Some(1), 0.0);
        let finalizer = EventFinalizer {
            resolution: ResolutionModel::new(&CalibrationConstants {
                fano_factor: 0.0,
                ..CalibrationConstants::default()
            }),
            ..finalizer
        };
        deposit(&mut acc, 5, 17.0);
        let record = finalizer.finalize(&acc, &mut smearer, &mut bank);
        assert_eq!(record.sci[5], 13);
        assert_relative_eq!(record.charge[5], 17.0);
        assert_eq!(record.n_hits[0], 1);
        assert_relative_eq!(bank.family(0).unwrap().pattern.content(5), 1.0);
    }
}
