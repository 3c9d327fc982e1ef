//! Validated, immutable simulation model.
//!
//! A [`Model`] is everything one run needs to know about one landscape
//! section: alphabet, sequence length, landscape rules and change timing.
//! It is built once per section by [`ModelBuilder`] and then shared
//! read-only by every run that uses it.

use crate::base::{Allele, Alphabet};
use crate::errors::ConfigError;
use crate::evolution::{
    FitnessSource, Landscape, LandscapeRules, MutationRates, NewFitnessRule, QNormalization,
};
use crate::simulation::configs::{InitialFitness, LandscapeChangeTiming};
use crate::simulation::schedule::Schedule;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Resolved landscape-change timing.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeTiming {
    /// Poisson process; `rate` may be zero (no changes)
    Stochastic { rate: f64 },
    /// A change every `interval` time units, counted along root-to-leaf paths
    FixedInterval { interval: f64 },
    /// Changes at the times listed per branch
    Scheduled(Arc<Schedule>),
}

impl ChangeTiming {
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Self::Stochastic { .. })
    }

    /// The fixed interval length, infinite for other timings.
    pub fn interval(&self) -> f64 {
        match self {
            Self::FixedInterval { interval } => *interval,
            _ => f64::INFINITY,
        }
    }
}

/// Immutable configuration of one landscape section.
#[derive(Debug, Clone)]
pub struct Model {
    alphabet: Alphabet,
    sequence_length: usize,
    rules: LandscapeRules,
    timing: ChangeTiming,
    scale_change_rate: bool,
    root_sequence: Option<Vec<Allele>>,
    record_changes: bool,
    collect_stats: bool,
}

impl Model {
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn rules(&self) -> &LandscapeRules {
        &self.rules
    }

    pub fn timing(&self) -> &ChangeTiming {
        &self.timing
    }

    /// Literal root sequence, if one was supplied.
    pub fn root_sequence(&self) -> Option<&[Allele]> {
        self.root_sequence.as_deref()
    }

    /// Whether landscape changes are recorded for reporting.
    pub fn record_changes(&self) -> bool {
        self.record_changes
    }

    pub fn collect_stats(&self) -> bool {
        self.collect_stats
    }

    /// Rate of stochastic landscape changes under `landscape`.
    ///
    /// Zero for deterministic timings. Optionally scaled by the landscape's
    /// expected substitution rate.
    pub fn change_rate(&self, landscape: &Landscape) -> f64 {
        match self.timing {
            ChangeTiming::Stochastic { rate } if self.scale_change_rate => {
                rate * landscape.expected_rate()
            }
            ChangeTiming::Stochastic { rate } => rate,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  alphabet:            {}", self.alphabet)?;
        writeln!(f, "  sequence length:     {}", self.sequence_length)?;
        writeln!(f, "  initial fitness:     {:?}", self.rules.initial_fitness)?;
        writeln!(f, "  new fitness rule:    {:?}", self.rules.new_fitness_rule)?;
        writeln!(f, "  Q normalization:     {:?}", self.rules.normalization)?;
        writeln!(
            f,
            "  mutation rates:      {}",
            if self.rules.mutation_rates.is_some() { "from file" } else { "uniform" }
        )?;
        match &self.timing {
            ChangeTiming::Stochastic { rate } => writeln!(
                f,
                "  landscape changes:   stochastic, rate {rate}{}",
                if self.scale_change_rate { " x substitution rate" } else { "" }
            )?,
            ChangeTiming::FixedInterval { interval } => {
                writeln!(f, "  landscape changes:   every {interval}")?
            }
            ChangeTiming::Scheduled(schedule) => {
                writeln!(f, "  landscape changes:   {} scheduled", schedule.len())?
            }
        }
        writeln!(f, "  shared landscape:    {}", self.rules.shared)?;
        write!(
            f,
            "  root sequence:       {}",
            if self.root_sequence.is_some() { "given" } else { "drawn from pi" }
        )
    }
}

/// Validating builder for [`Model`].
///
/// # Examples
///
/// ```
/// use selva_sim::base::Alphabet;
/// use selva_sim::simulation::{LandscapeChangeTiming, ModelBuilder};
///
/// let model = ModelBuilder::new()
///     .alphabet(Alphabet::dna())
///     .sequence_length(100)
///     .timing(LandscapeChangeTiming::FixedNumChanges, Some(2.0))
///     .tree_height(1.5)
///     .build()
///     .unwrap();
/// assert_eq!(model.timing().interval(), 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    alphabet: Option<Alphabet>,
    sequence_length: Option<usize>,
    initial_fitness: InitialFitness,
    sigma: Option<f64>,
    gamma_alpha: Option<f64>,
    gamma_beta: Option<f64>,
    fitness_values: Option<Vec<f64>>,
    new_fitness_rule: NewFitnessRule,
    timing: LandscapeChangeTiming,
    change_parameter: Option<f64>,
    schedule: Option<Schedule>,
    shared: bool,
    age_coefficient: Option<f64>,
    normalization: QNormalization,
    mutation_rates: Option<MutationRates>,
    scale_change_rate: bool,
    root_sequence: Option<Vec<Allele>>,
    tree_height: Option<f64>,
    record_changes: bool,
    collect_stats: bool,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// Flat fitness, shuffling, no landscape changes.
    pub fn new() -> Self {
        Self {
            alphabet: None,
            sequence_length: None,
            initial_fitness: InitialFitness::Flat,
            sigma: None,
            gamma_alpha: None,
            gamma_beta: None,
            fitness_values: None,
            new_fitness_rule: NewFitnessRule::Shuffle,
            timing: LandscapeChangeTiming::Stochastic,
            change_parameter: Some(0.0),
            schedule: None,
            shared: false,
            age_coefficient: None,
            normalization: QNormalization::default(),
            mutation_rates: None,
            scale_change_rate: false,
            root_sequence: None,
            tree_height: None,
            record_changes: false,
            collect_stats: false,
        }
    }

    /// Set the allele alphabet (required).
    pub fn alphabet(mut self, alphabet: Alphabet) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    /// Set the number of sites (required).
    pub fn sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = Some(length);
        self
    }

    pub fn initial_fitness(mut self, kind: InitialFitness) -> Self {
        self.initial_fitness = kind;
        self
    }

    /// Log-normal sigma.
    pub fn sigma(mut self, sigma: Option<f64>) -> Self {
        self.sigma = sigma;
        self
    }

    /// Gamma shape and rate.
    pub fn gamma(mut self, alpha: Option<f64>, beta: Option<f64>) -> Self {
        self.gamma_alpha = alpha;
        self.gamma_beta = beta;
        self
    }

    /// Fitness values for `InitialFitness::File`.
    pub fn fitness_values(mut self, values: Vec<f64>) -> Self {
        self.fitness_values = Some(values);
        self
    }

    pub fn new_fitness_rule(mut self, rule: NewFitnessRule) -> Self {
        self.new_fitness_rule = rule;
        self
    }

    /// Set the change timing and its parameter (rate, interval or count).
    pub fn timing(mut self, timing: LandscapeChangeTiming, parameter: Option<f64>) -> Self {
        self.timing = timing;
        self.change_parameter = parameter;
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn age_coefficient(mut self, coefficient: Option<f64>) -> Self {
        self.age_coefficient = coefficient;
        self
    }

    pub fn normalization(mut self, normalization: QNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn mutation_rates(mut self, rates: MutationRates) -> Self {
        self.mutation_rates = Some(rates);
        self
    }

    pub fn scale_change_rate(mut self, scale: bool) -> Self {
        self.scale_change_rate = scale;
        self
    }

    pub fn root_sequence(mut self, sequence: Vec<Allele>) -> Self {
        self.root_sequence = Some(sequence);
        self
    }

    /// Tree height, needed to space `FIXED_NUM_CHANGES`.
    pub fn tree_height(mut self, height: f64) -> Self {
        self.tree_height = Some(height);
        self
    }

    pub fn record_changes(mut self, record: bool) -> Self {
        self.record_changes = record;
        self
    }

    pub fn collect_stats(mut self, collect: bool) -> Self {
        self.collect_stats = collect;
        self
    }

    /// Validate the parameters and build the model.
    ///
    /// # Errors
    /// Missing parameters, out-of-range values and unsupported combinations.
    pub fn build(self) -> Result<Model, ConfigError> {
        let alphabet = self
            .alphabet
            .ok_or_else(|| ConfigError::MissingParameter("alphabet".into()))?;
        let n = alphabet.len();
        let sequence_length = self
            .sequence_length
            .ok_or_else(|| ConfigError::MissingParameter("length".into()))?;
        if sequence_length == 0 {
            return Err(ConfigError::InvalidParameter(
                "length must be at least 1".into(),
            ));
        }

        let initial_fitness = match self.initial_fitness {
            InitialFitness::Flat => FitnessSource::Flat,
            InitialFitness::Lognorm => {
                let sigma = positive("sigma", self.sigma)?;
                FitnessSource::LogNormal { sigma }
            }
            InitialFitness::Gamma => {
                let shape = positive("gamma_alpha", self.gamma_alpha)?;
                let rate = positive("gamma_beta", self.gamma_beta)?;
                FitnessSource::Gamma { shape, rate }
            }
            InitialFitness::File => {
                let values = self
                    .fitness_values
                    .ok_or_else(|| ConfigError::MissingParameter("fitness_file".into()))?;
                if values.len() != n {
                    return Err(ConfigError::InvalidParameter(format!(
                        "fitness file has {} values, the alphabet has {n} symbols",
                        values.len()
                    )));
                }
                FitnessSource::Fixed(values)
            }
        };

        let rule = self.new_fitness_rule;
        if rule == NewFitnessRule::Iid && !initial_fitness.supports_iid() {
            return Err(ConfigError::InvalidCombination(format!(
                "new_fitness_rule IID cannot be used with initial_fitness {}",
                self.initial_fitness
            )));
        }
        let mut age_coefficient = 0.0;
        if rule == NewFitnessRule::CurrentAlleleDependent {
            if sequence_length != 1 {
                return Err(ConfigError::InvalidCombination(
                    "new_fitness_rule CURRENT_ALLELE_DEPENDENT requires length 1".into(),
                ));
            }
            if !matches!(
                self.timing,
                LandscapeChangeTiming::FixedIntervalLength | LandscapeChangeTiming::FixedNumChanges
            ) {
                return Err(ConfigError::InvalidCombination(format!(
                    "new_fitness_rule CURRENT_ALLELE_DEPENDENT cannot be used with landscape_change_timing {}",
                    self.timing
                )));
            }
            age_coefficient = self.age_coefficient.ok_or_else(|| {
                ConfigError::MissingParameter("age_dependence_coefficient".into())
            })?;
        }

        let timing = match self.timing {
            LandscapeChangeTiming::SpecifiedBranchAndTime => {
                let schedule = self.schedule.ok_or_else(|| {
                    ConfigError::MissingParameter("change_branch_and_time_file".into())
                })?;
                if self.shared {
                    return Err(ConfigError::InvalidCombination(
                        "shared_landscape cannot be used with SPECIFIED_BRANCH_AND_TIME".into(),
                    ));
                }
                if rule == NewFitnessRule::UserSet && !schedule.all_have_fitness() {
                    return Err(ConfigError::InvalidCombination(
                        "USER_SET needs a fitness vector on every scheduled change".into(),
                    ));
                }
                if rule != NewFitnessRule::UserSet
                    && schedule.iter().any(|c| c.fitness.is_some())
                {
                    warn!("scheduled fitness vectors are only used with USER_SET, ignoring them");
                }
                ChangeTiming::Scheduled(Arc::new(schedule))
            }
            timing => {
                if rule == NewFitnessRule::UserSet {
                    return Err(ConfigError::InvalidCombination(format!(
                        "new_fitness_rule USER_SET requires SPECIFIED_BRANCH_AND_TIME, not {timing}"
                    )));
                }
                let parameter = self.change_parameter.ok_or_else(|| {
                    ConfigError::MissingParameter("landscape_change_parameter".into())
                })?;
                if !parameter.is_finite() || parameter < 0.0 {
                    return Err(ConfigError::InvalidParameter(format!(
                        "landscape_change_parameter must be a non-negative number, got {parameter}"
                    )));
                }
                match timing {
                    LandscapeChangeTiming::Stochastic => ChangeTiming::Stochastic { rate: parameter },
                    LandscapeChangeTiming::FixedIntervalLength => {
                        if parameter == 0.0 {
                            return Err(ConfigError::InvalidParameter(
                                "FIXED_INTERVAL_LENGTH needs a positive interval".into(),
                            ));
                        }
                        ChangeTiming::FixedInterval { interval: parameter }
                    }
                    _ => {
                        if parameter.fract() != 0.0 {
                            return Err(ConfigError::InvalidParameter(format!(
                                "FIXED_NUM_CHANGES needs a whole number of changes, got {parameter}"
                            )));
                        }
                        let height = self
                            .tree_height
                            .ok_or_else(|| ConfigError::MissingParameter("tree height".into()))?;
                        let interval = if parameter == 0.0 || height == 0.0 {
                            f64::INFINITY
                        } else {
                            height / (parameter + 1.0)
                        };
                        ChangeTiming::FixedInterval { interval }
                    }
                }
            }
        };

        if let Some(rates) = &self.mutation_rates {
            if rates.size() != n {
                return Err(ConfigError::InvalidParameter(format!(
                    "mutation rate matrix is {0}x{0}, the alphabet has {n} symbols",
                    rates.size()
                )));
            }
        }
        if let Some(root) = &self.root_sequence {
            if root.len() != sequence_length {
                return Err(ConfigError::InvalidParameter(format!(
                    "root sequence has {} sites, expected {sequence_length}",
                    root.len()
                )));
            }
            if let Some(bad) = root.iter().find(|&&a| a as usize >= n) {
                return Err(ConfigError::InvalidParameter(format!(
                    "root sequence allele {bad} is outside the alphabet"
                )));
            }
        }

        let rules = LandscapeRules {
            alphabet_size: n,
            initial_fitness,
            new_fitness_rule: rule,
            normalization: self.normalization,
            mutation_rates: self.mutation_rates.map(Arc::new),
            change_interval: timing.interval(),
            age_coefficient,
            shared: self.shared,
        };

        Ok(Model {
            alphabet,
            sequence_length,
            rules,
            timing,
            scale_change_rate: self.scale_change_rate,
            root_sequence: self.root_sequence,
            record_changes: self.record_changes,
            collect_stats: self.collect_stats,
        })
    }
}

fn positive(name: &str, value: Option<f64>) -> Result<f64, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingParameter(name.to_string()))?;
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(value)
}
