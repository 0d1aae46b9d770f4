use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Binomial, Distribution};
use serde::{Deserialize, Serialize};

/// Per-step birth and death probabilities of a single cell.
///
/// In one time step each cell independently divides with probability
/// `birth_rate`, dies with probability `death_rate`, or does nothing.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrowthRate {
    birth_rate: f64,
    death_rate: f64,
}

/// Number of births and deaths realized by a population in one step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthCount {
    pub births: u64,
    pub deaths: u64,
}

impl GrowthCount {
    #[inline(always)]
    pub fn net(self) -> i64 {
        self.births as i64 - self.deaths as i64
    }
}

impl GrowthRate {
    pub fn new(birth_rate: f64, death_rate: f64) -> Result<Self> {
        if !(birth_rate >= 0.0 && death_rate >= 0.0) {
            anyhow::bail!("Growth rates must be non-negative (birth {}, death {}).", birth_rate, death_rate);
        }
        if birth_rate + death_rate > 1.0 {
            anyhow::bail!(
                "Birth and death probabilities must sum to at most 1 (birth {}, death {}).",
                birth_rate,
                death_rate
            );
        }
        Ok(Self { birth_rate, death_rate })
    }

    pub fn birth_rate(&self) -> f64 { self.birth_rate }
    pub fn death_rate(&self) -> f64 { self.death_rate }

    /// Expected population multiplier over one step.
    pub fn growth_factor(&self) -> f64 {
        1.0 + self.birth_rate - self.death_rate
    }

    /// Draws births and deaths with one Bernoulli trial per cell.
    pub fn sample(&self, cell_count: u64, rng: &mut StdRng) -> GrowthCount {
        let threshold = self.birth_rate + self.death_rate;
        let mut count = GrowthCount::default();
        for _ in 0..cell_count {
            let u: f64 = rng.random();
            if u < self.birth_rate {
                count.births += 1;
            } else if u < threshold {
                count.deaths += 1;
            }
        }
        count
    }

    /// Draws births and deaths for the whole population at once.
    ///
    /// Births ~ Binomial(n, b), then deaths among the remaining cells ~
    /// Binomial(n - births, d / (1 - b)): the same joint law as
    /// [`GrowthRate::sample`] at constant cost.
    pub fn compute(&self, cell_count: u64, rng: &mut StdRng) -> Result<GrowthCount> {
        let births = Binomial::new(cell_count, self.birth_rate)?.sample(rng);
        let conditional_death = if self.birth_rate < 1.0 {
            (self.death_rate / (1.0 - self.birth_rate)).min(1.0)
        } else {
            0.0
        };
        let deaths = Binomial::new(cell_count - births, conditional_death)?.sample(rng);
        Ok(GrowthCount { births, deaths })
    }

    /// The same death rate with births switched off.
    pub fn no_birth(&self) -> Self {
        Self { birth_rate: 0.0, death_rate: self.death_rate }
    }

    /// Caps the birth rate at the death rate so the expected size cannot increase.
    pub fn no_growth(&self) -> Self {
        Self { birth_rate: self.birth_rate.min(self.death_rate), death_rate: self.death_rate }
    }

    /// Scales the net growth rate (birth minus death) by `fraction`, keeping the death rate.
    /// Shrinking populations are returned unchanged.
    pub fn rescale_growth_factor(&self, fraction: f64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        if self.birth_rate <= self.death_rate {
            return *self;
        }
        let birth_rate = self.death_rate + fraction * (self.birth_rate - self.death_rate);
        Self { birth_rate, death_rate: self.death_rate }
    }

    /// Multiplies the birth rate by `1 + coefficient`, clamped to stay a valid rate pair.
    pub fn scale_birth(&self, coefficient: f64) -> Self {
        let birth_rate = (self.birth_rate * (1.0 + coefficient)).clamp(0.0, 1.0 - self.death_rate);
        Self { birth_rate, death_rate: self.death_rate }
    }
}
