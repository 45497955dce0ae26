//! Feedback controller keeping world object counts inside a healthy band.

use artificer_core::{PopulationBands, PopulationCounts, PopulationDirective};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopulationController {
    bands: PopulationBands,
    last: PopulationDirective,
}

impl PopulationController {
    #[must_use]
    pub fn new(bands: PopulationBands) -> Self {
        Self {
            bands,
            last: PopulationDirective {
                spawn_probability: 1.0,
                debris_to_clean: 0,
            },
        }
    }

    /// Last directive produced by [`Self::evaluate`].
    #[must_use]
    pub const fn last(&self) -> PopulationDirective {
        self.last
    }

    /// Compute the spawn throttle and how many fragments to clean up.
    ///
    /// Cleanup never exceeds the fragment count, so only debris is ever removed.
    pub fn evaluate(&mut self, counts: PopulationCounts) -> PopulationDirective {
        let bands = &self.bands;
        let object_fraction = counts.objects_total as f32 / bands.max_objects.max(1) as f32;
        let target_fraction = counts.targets_alive as f32 / bands.max_targets.max(1) as f32;
        let mut spawn_probability = (1.0 - object_fraction.max(target_fraction)).clamp(0.0, 1.0);
        if counts.targets_alive < bands.min_targets || counts.objects_total < bands.min_objects {
            spawn_probability = 1.0;
        }

        let fragments = counts.fragments_total.min(counts.objects_total);
        let debris_to_clean = if counts.objects_total > bands.max_objects {
            fragments.min(counts.objects_total - bands.max_objects)
        } else if counts.objects_total > 0
            && fragments as f32 / counts.objects_total as f32 > bands.max_fragment_ratio
        {
            // Removing k fragments: (f - k) / (o - k) <= r  =>  k >= (f - r*o) / (1 - r)
            let ratio = bands.max_fragment_ratio;
            let excess = (fragments as f32 - ratio * counts.objects_total as f32) / (1.0 - ratio);
            (excess.ceil().max(0.0) as usize).min(fragments)
        } else {
            0
        };

        self.last = PopulationDirective {
            spawn_probability,
            debris_to_clean,
        };
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(targets_alive: usize, objects_total: usize, fragments_total: usize) -> PopulationCounts {
        PopulationCounts {
            targets_alive,
            objects_total,
            fragments_total,
        }
    }

    #[test]
    fn extinction_guard_opens_spawning() {
        let mut controller = PopulationController::new(PopulationBands::default());
        for objects in [12, 60, 119, 400] {
            let directive = controller.evaluate(counts(2, objects, 0));
            assert_eq!(directive.spawn_probability, 1.0);
        }
    }

    #[test]
    fn throttle_follows_the_fuller_band() {
        let mut controller = PopulationController::new(PopulationBands::default());
        let directive = controller.evaluate(counts(12, 30, 0));
        assert!((directive.spawn_probability - 0.5).abs() < 1e-6);
        let directive = controller.evaluate(counts(6, 120, 0));
        assert_eq!(directive.spawn_probability, 0.0);
        assert_eq!(controller.last(), directive);
    }

    #[test]
    fn overflow_cleans_only_fragments() {
        let mut controller = PopulationController::new(PopulationBands::default());
        let directive = controller.evaluate(counts(10, 150, 12));
        assert!(directive.debris_to_clean > 0);
        assert_eq!(directive.debris_to_clean, 12);
        let directive = controller.evaluate(counts(10, 130, 40));
        assert_eq!(directive.debris_to_clean, 10);
        let directive = controller.evaluate(counts(10, 200, 0));
        assert_eq!(directive.debris_to_clean, 0);
    }

    #[test]
    fn fragment_ratio_is_brought_under_cap() {
        let mut controller = PopulationController::new(PopulationBands::default());
        let directive = controller.evaluate(counts(5, 40, 30));
        let remaining_fragments = 30 - directive.debris_to_clean;
        let remaining_objects = 40 - directive.debris_to_clean;
        assert!(remaining_fragments as f32 / remaining_objects as f32 <= 0.5);
        assert_eq!(directive.debris_to_clean, 20);
        assert!(directive.debris_to_clean <= 30);
    }

    #[test]
    fn cleanup_never_exceeds_fragments() {
        let mut controller = PopulationController::new(PopulationBands::default());
        for objects in (0..300).step_by(7) {
            for fragments in (0..=objects).step_by(5) {
                let directive = controller.evaluate(counts(4, objects, fragments));
                assert!(directive.debris_to_clean <= fragments);
            }
        }
    }
}
