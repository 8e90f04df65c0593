//! Per-age survivor rate statistics.
//!
//! Every region allocated during a cycle is stamped with the next age index,
//! forming an age cohort. At the following collection the surviving word
//! counts per cohort are recorded, and a supplied statistical predictor turns
//! them into per-age survival rate predictions. The accumulated prediction
//! table answers "how many words do we expect to survive out of the youngest
//! N regions", which the collector policy uses to size the next young
//! generation and pace concurrent work.

/// The statistical predictor a [`SurvRateGroup`] feeds its observed rates
/// into. Supplied by the collector policy; typically a decaying sequence per
/// age cohort.
pub trait SurvRatePredictor {
    /// Record an observed survival rate sample for one age cohort and return
    /// the updated prediction for that age.
    fn add_sample(&mut self, age: usize, rate: f64) -> f64;

    /// Predict the survival rate for one age cohort from an observed sample
    /// without recording it. Used for what-if policy evaluation.
    fn predict(&self, age: usize, rate: f64) -> f64;
}

/// Survivor rate statistics for one group of regions (e.g. eden, survivor).
pub struct SurvRateGroup {
    name: &'static str,
    region_size_words: usize,

    /// Regions stamped so far this cycle. Monotonic until `reset`.
    num_added_regions: usize,
    /// True between `start_adding_regions` and `stop_adding_regions`.
    adding_regions: bool,
    /// Accumulated surviving words per age cohort, this cycle.
    surviving_words: Vec<f64>,

    /// Length of the finalized prediction table.
    stats_arrays_length: usize,
    /// Prefix sums of the per-age predictions.
    accum_surv_rate_pred: Vec<f64>,
    /// The prediction for the oldest tracked age, used to extrapolate beyond
    /// the table.
    last_pred: f64,
}

impl SurvRateGroup {
    pub fn new(name: &'static str, region_size_words: usize) -> Self {
        assert!(region_size_words > 0, "zero-sized regions");
        Self {
            name,
            region_size_words,
            num_added_regions: 0,
            adding_regions: false,
            surviving_words: Vec::new(),
            stats_arrays_length: 0,
            accum_surv_rate_pred: Vec::new(),
            last_pred: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Clear all per-cycle state and the finalized prediction table. Called
    /// once at the start of each cycle; callable even if the prior cycle
    /// added no regions.
    pub fn reset(&mut self) {
        self.num_added_regions = 0;
        self.adding_regions = false;
        self.surviving_words.clear();
        self.stats_arrays_length = 0;
        self.accum_surv_rate_pred.clear();
        self.last_pred = 0.0;
    }

    /// Open the region-allocation phase of the cycle.
    pub fn start_adding_regions(&mut self) {
        assert!(!self.adding_regions, "{}: add-region phase already open", self.name);
        self.adding_regions = true;
    }

    /// Close the region-allocation phase.
    pub fn stop_adding_regions(&mut self) {
        assert!(self.adding_regions, "{}: add-region phase not open", self.name);
        self.adding_regions = false;
    }

    /// Stamp the next region with its age index. Strictly increasing from 1
    /// within a cycle; restarts at 1 after `reset`.
    pub fn next_age_index(&mut self) -> usize {
        self.num_added_regions += 1;
        self.surviving_words.push(0.0);
        self.num_added_regions
    }

    pub fn num_added_regions(&self) -> usize {
        self.num_added_regions
    }

    /// Accumulate surviving words for one age cohort. Multiple calls for the
    /// same cohort add up (parallel evacuation workers each contribute their
    /// share). Calling this outside the add-region bracket is a usage error.
    pub fn record_surviving_words(&mut self, age_in_group: usize, surv_words: usize) {
        assert!(
            self.adding_regions,
            "{}: recording surviving words outside the add-region phase",
            self.name
        );
        assert!(
            age_in_group >= 1 && age_in_group <= self.num_added_regions,
            "{}: age {} out of range 1..={}",
            self.name,
            age_in_group,
            self.num_added_regions
        );
        self.surviving_words[age_in_group - 1] += surv_words as f64;
    }

    /// Finalize the per-age predictions once every surviving word for the
    /// cycle has been recorded. With `update_predictors` false the supplied
    /// predictor is only read, not fed; the what-if evaluation then does not
    /// disturb the long-lived prediction sequences.
    pub fn all_surviving_words_recorded<P: SurvRatePredictor>(
        &mut self,
        predictor: &mut P,
        update_predictors: bool,
    ) {
        self.stats_arrays_length = self.surviving_words.len();
        self.accum_surv_rate_pred.clear();
        self.accum_surv_rate_pred.reserve(self.stats_arrays_length);

        let mut accum = 0.0;
        let mut pred = self.last_pred;
        for (age, &words) in self.surviving_words.iter().enumerate() {
            let rate = (words / self.region_size_words as f64).clamp(0.0, 1.0);
            pred = if update_predictors {
                predictor.add_sample(age, rate)
            } else {
                predictor.predict(age, rate)
            }
            .clamp(0.0, 1.0);
            accum += pred;
            self.accum_surv_rate_pred.push(accum);
        }
        self.last_pred = pred;
        trace!(
            "{}: finalized {} age cohorts, last prediction {:.3}",
            self.name,
            self.stats_arrays_length,
            self.last_pred
        );
    }

    /// The accumulated survival rate prediction for the youngest `age + 1`
    /// cohorts. Ages beyond the tracked range extrapolate linearly from the
    /// last per-step prediction; callers accept that the estimate degrades
    /// gracefully for regions older than anything previously observed.
    pub fn accum_surv_rate_pred(&self, age: usize) -> f64 {
        if age < self.stats_arrays_length {
            self.accum_surv_rate_pred[age]
        } else {
            let base = self.accum_surv_rate_pred.last().copied().unwrap_or(0.0);
            base + (age - self.stats_arrays_length) as f64 * self.last_pred
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A predictor that always answers a fixed rate and counts how often it
    /// was fed.
    struct FixedPredictor {
        rate: f64,
        samples: usize,
    }

    impl FixedPredictor {
        fn new(rate: f64) -> Self {
            Self { rate, samples: 0 }
        }
    }

    impl SurvRatePredictor for FixedPredictor {
        fn add_sample(&mut self, _age: usize, _rate: f64) -> f64 {
            self.samples += 1;
            self.rate
        }

        fn predict(&self, _age: usize, _rate: f64) -> f64 {
            self.rate
        }
    }

    fn group_with_ages(n: usize) -> SurvRateGroup {
        let mut group = SurvRateGroup::new("test", 1024);
        group.start_adding_regions();
        for _ in 0..n {
            group.next_age_index();
        }
        group
    }

    #[test]
    fn age_indexes_are_strictly_increasing_from_one() {
        let mut group = SurvRateGroup::new("eden", 1024);
        group.start_adding_regions();
        let indexes: Vec<_> = (0..5).map(|_| group.next_age_index()).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
        group.stop_adding_regions();

        group.reset();
        group.start_adding_regions();
        assert_eq!(group.next_age_index(), 1);
    }

    #[test]
    fn surviving_words_accumulate_per_cohort() {
        let mut group = group_with_ages(2);
        group.record_surviving_words(1, 100);
        group.record_surviving_words(1, 50);
        group.record_surviving_words(2, 512);
        group.stop_adding_regions();

        let mut predictor = FixedPredictor::new(0.5);
        group.all_surviving_words_recorded(&mut predictor, true);
        // Two cohorts were finalized, each fed exactly once.
        assert_eq!(predictor.samples, 2);
    }

    #[test]
    #[should_panic]
    fn recording_outside_the_bracket_is_fatal() {
        let mut group = group_with_ages(1);
        group.stop_adding_regions();
        group.record_surviving_words(1, 1);
    }

    #[test]
    fn what_if_evaluation_does_not_feed_the_predictor() {
        let mut group = group_with_ages(3);
        group.stop_adding_regions();
        let mut predictor = FixedPredictor::new(0.25);
        group.all_surviving_words_recorded(&mut predictor, false);
        assert_eq!(predictor.samples, 0);
        // The derived table is still produced.
        assert!((group.accum_surv_rate_pred(2) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn extrapolates_past_the_tracked_range() {
        let mut group = group_with_ages(5);
        group.stop_adding_regions();
        let mut predictor = FixedPredictor::new(0.1);
        group.all_surviving_words_recorded(&mut predictor, true);

        // table[4] = 0.5, last_pred = 0.1
        let base = group.accum_surv_rate_pred(4);
        assert!((base - 0.5).abs() < 1e-9);
        assert!((group.accum_surv_rate_pred(7) - (base + 2.0 * 0.1)).abs() < 1e-9);
    }

    #[test]
    fn reset_is_idempotent_and_clears_derived_state() {
        let mut group = group_with_ages(4);
        group.stop_adding_regions();
        let mut predictor = FixedPredictor::new(0.1);
        group.all_surviving_words_recorded(&mut predictor, true);

        group.reset();
        group.reset();
        assert_eq!(group.num_added_regions(), 0);
        assert_eq!(group.accum_surv_rate_pred(0), 0.0);
    }
}
