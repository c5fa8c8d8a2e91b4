//! Per-batch pipeline: materialize, associate, select, fill.
//!
//! A processor is immutable and shared by every worker. Each call to
//! [`MomentumLossProcessor::process`] builds a fresh partial
//! [`RunAccumulator`] from one batch; nothing is shared between batches.

use crate::accumulator::{
    Accumulator, BinningConfig, RunAccumulator, CUT_ECAL_ENERGY, CUT_EXIT_MOMENTUM, CUT_HCAL_ENERGY,
    CUT_MUONS,
};
use crate::association::{DeltaRMatcher, ExitMomentumExtractor, HitSelection, NO_ENERGY, NO_EXIT_MOMENTUM};
use crate::config::AnalysisConfig;
use crate::dataset::MuonSample;
use crate::error::{MulossResult, ValidationError};
use crate::event::Event;
use crate::schema::{EventBatch, EventSchema};

/// Turns event batches into partial run accumulators.
#[derive(Debug, Clone)]
pub struct MomentumLossProcessor {
    schema: EventSchema,
    matcher: DeltaRMatcher,
    selection: HitSelection,
    empty: RunAccumulator,
}

impl MomentumLossProcessor {
    /// Creates a processor.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` / `InvalidAxis` for malformed binning.
    pub fn new(
        schema: EventSchema,
        matcher: DeltaRMatcher,
        selection: HitSelection,
        binning: &BinningConfig,
    ) -> Result<Self, ValidationError> {
        binning.validate()?;
        Ok(Self {
            schema,
            matcher,
            selection,
            empty: RunAccumulator::new(binning)?,
        })
    }

    /// Creates a processor from the analysis configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the association or binning sections are invalid.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ValidationError> {
        Self::new(
            config.schema.clone(),
            config.association.matcher()?,
            config.association.selection,
            &config.binning,
        )
    }

    /// The merge identity for this processor's accumulators.
    #[must_use]
    pub fn identity(&self) -> RunAccumulator {
        self.empty.identity()
    }

    /// Processes one batch into a partial accumulator.
    ///
    /// # Errors
    ///
    /// Any malformed event fails the whole batch with a `ValidationError`.
    pub fn process(&self, batch: &EventBatch) -> MulossResult<RunAccumulator> {
        let mut acc = self.identity();
        acc.all_events.add(&batch.dataset, batch.len() as u64);
        for raw in &batch.events {
            let event = self.schema.materialize(raw)?;
            self.process_event(&event, &mut acc)?;
        }
        log::debug!(
            "processed batch '{}': {} events, {} selected muons",
            batch.dataset,
            batch.len(),
            acc.samples.len()
        );
        Ok(acc)
    }

    #[allow(clippy::float_cmp)]
    fn process_event(&self, event: &Event, acc: &mut RunAccumulator) -> Result<(), ValidationError> {
        let hcal = self.matcher.associated_energy(&event.particles, &event.hadronic);
        let ecal = self.matcher.associated_energy(&event.particles, &event.electromagnetic);
        let outer_hits = self.selection.select(&event.hits);
        let exit = ExitMomentumExtractor::new(self.matcher).extract(&event.particles, &outer_hits);

        for (i, muon) in event.particles.iter().enumerate() {
            acc.cutflow.add(CUT_MUONS, 1);
            acc.muons.fill(&[muon.p, hcal[i], ecal[i]], 1.0)?;

            if exit[i] == NO_EXIT_MOMENTUM {
                continue;
            }
            acc.cutflow.add(CUT_EXIT_MOMENTUM, 1);
            if !has_energy(hcal[i]) {
                continue;
            }
            acc.cutflow.add(CUT_HCAL_ENERGY, 1);
            if !has_energy(ecal[i]) {
                continue;
            }
            acc.cutflow.add(CUT_ECAL_ENERGY, 1);

            let dp = muon.p - exit[i];
            acc.p_loss.fill(&[muon.p, dp], 1.0)?;
            acc.samples.push(&MuonSample {
                p: muon.p,
                dp,
                features: [muon.eta, muon.phi, hcal[i].log10(), ecal[i].log10()],
            });
        }
        Ok(())
    }
}

/// Energy sums feed `log10` features, so only positive sums pass the cuts.
/// Noise can make a sum negative; NaN never passes.
fn has_energy(sum: f64) -> bool {
    sum > NO_ENERGY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::theta_from_eta;
    use crate::schema::RawEvent;
    use approx::assert_relative_eq;

    fn calo(raw: RawEvent, prefix: &str, energy: &[f64], eta: &[f64], phi: &[f64]) -> RawEvent {
        raw.with_floats(format!("{prefix}_calo_hits_energyHad"), energy.to_vec())
            .with_floats(format!("{prefix}_calo_hits_energyEM"), vec![0.0; energy.len()])
            .with_floats(format!("{prefix}_calo_hits_eta"), eta.to_vec())
            .with_floats(format!("{prefix}_calo_hits_phi"), phi.to_vec())
    }

    /// Two muons at eta 0: the first is fully measured, the second has no outer hit.
    fn event() -> RawEvent {
        let raw = RawEvent::new()
            .with_floats("gen_pt", vec![1000.0, 500.0])
            .with_floats("gen_eta", vec![0.0, 0.0])
            .with_floats("gen_phi", vec![0.0, 2.0])
            .with_ints("sim_id", vec![953, 26])
            .with_ints("sim_type", vec![13, 13])
            .with_floats("sim_phi", vec![0.01, 2.0])
            .with_floats("sim_theta", vec![theta_from_eta(0.0); 2])
            .with_floats("sim_p", vec![990.0, 499.0])
            .with_floats("sim_eloss", vec![0.0; 2]);
        let raw = calo(raw, "hcal", &[0.1, 0.2], &[0.0, 0.0], &[0.05, 2.0]);
        let raw = calo(raw, "ecalPreshower", &[], &[], &[]);
        let raw = calo(raw, "ecalBarrel", &[10.0], &[0.0], &[0.0]);
        calo(raw, "ecalEndcap", &[], &[], &[])
    }

    fn processor() -> MomentumLossProcessor {
        MomentumLossProcessor::from_config(&AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn selects_fully_measured_muons() {
        let batch = EventBatch::new("gun", vec![event(), event()]);
        let acc = processor().process(&batch).unwrap();

        assert_eq!(acc.all_events.get("gun"), 2);
        assert_eq!(acc.cutflow.get(CUT_MUONS), 4);
        assert_eq!(acc.cutflow.get(CUT_EXIT_MOMENTUM), 2);
        assert_eq!(acc.cutflow.get(CUT_ECAL_ENERGY), 2);
        assert_relative_eq!(acc.muons.total(), 4.0);
        assert_relative_eq!(acc.p_loss.total(), 2.0);

        assert_eq!(acc.samples.len(), 2);
        let row = acc.samples.rows().next().unwrap();
        assert_relative_eq!(row.p, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(row.dp, 10.0, epsilon = 1e-9);
        assert_relative_eq!(row.features[2], -1.0, epsilon = 1e-12);
        assert_relative_eq!(row.features[3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn negative_energy_sum_fails_the_cut() {
        let raw = event();
        let raw = calo(raw, "hcal", &[-0.1, 0.2], &[0.0, 0.0], &[0.05, 2.0]);
        let acc = processor().process(&EventBatch::new("gun", vec![raw])).unwrap();

        assert_eq!(acc.cutflow.get(CUT_EXIT_MOMENTUM), 1);
        assert_eq!(acc.cutflow.get(CUT_HCAL_ENERGY), 0);
        assert!(acc.samples.is_empty());
        assert_relative_eq!(acc.p_loss.total(), 0.0);
    }

    #[test]
    fn empty_batch_counts_dataset_only() {
        let acc = processor().process(&EventBatch::new("empty", vec![])).unwrap();
        assert_eq!(acc.all_events.get("empty"), 0);
        assert!(acc.samples.is_empty());
        assert_relative_eq!(acc.muons.total(), 0.0);
    }

    #[test]
    fn malformed_event_fails_batch() {
        let broken = RawEvent::new().with_floats("gen_pt", vec![1.0]);
        let batch = EventBatch::new("gun", vec![event(), broken]);
        let err = processor().process(&batch).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn degenerate_particle_fails_batch() {
        let raw = event().with_floats("gen_eta", vec![0.0, 40.0]);
        let err = processor().process(&EventBatch::new("gun", vec![raw])).unwrap_err();
        assert!(err.is_input_fault());
    }
}
