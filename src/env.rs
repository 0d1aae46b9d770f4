//! Growth and division constraints handed down the component tree.
//!
//! A [`TumorEnv`] is either a base environment or one [`EnvRule`] layered
//! over a parent environment. A rule answers exactly one question differently
//! and delegates every other query to its parent, so rules compose without
//! copying or mutating the chain below them.
//!
//! The base carries the run-wide session rules (empty when unrestricted).
//! Rules layered by a container for its own members are local: they are
//! dropped again by [`TumorEnv::component_env`].

use crate::growth::GrowthRate;
use anyhow::Result;
use tumor_common::{EnvParams, Neighborhood, Restriction};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EnvRule {
    /// Growth rate with births switched off.
    NoBirth,
    /// Growth rate capped so the expected size cannot increase.
    NoGrowth,
    /// Growth rate with the net rate scaled by `fraction`.
    SlowGrowth { fraction: f64 },
    /// Cell division is not allowed.
    NoCellDivision,
    /// Deme division is not allowed.
    NoDemeDivision,
}

impl EnvRule {
    pub fn slow_growth(fraction: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&fraction) {
            anyhow::bail!("Slow-growth fraction must lie in [0, 1], got {}.", fraction);
        }
        Ok(EnvRule::SlowGrowth { fraction })
    }

    /// Rule selected by a configured top-level restriction, if any.
    pub fn from_restriction(restriction: Restriction, slow_growth_fraction: f64) -> Result<Option<Self>> {
        let rule = match restriction {
            Restriction::None => return Ok(None),
            Restriction::NoBirth => EnvRule::NoBirth,
            Restriction::NoGrowth => EnvRule::NoGrowth,
            Restriction::NoCellDivision => EnvRule::NoCellDivision,
            Restriction::NoDemeDivision => EnvRule::NoDemeDivision,
            Restriction::SlowGrowth => EnvRule::slow_growth(slow_growth_fraction)?,
        };
        Ok(Some(rule))
    }

    fn growth_rate(self, rate: GrowthRate) -> GrowthRate {
        match self {
            EnvRule::NoBirth => rate.no_birth(),
            EnvRule::NoGrowth => rate.no_growth(),
            EnvRule::SlowGrowth { fraction } => rate.rescale_growth_factor(fraction),
            EnvRule::NoCellDivision | EnvRule::NoDemeDivision => rate,
        }
    }
}

#[derive(Clone, Debug)]
pub enum TumorEnv<'a> {
    Base { params: &'a EnvParams, session: &'a [EnvRule] },
    Restricted { parent: &'a TumorEnv<'a>, rule: EnvRule },
}

impl<'a> TumorEnv<'a> {
    pub fn unrestricted(params: &'a EnvParams) -> Self {
        TumorEnv::Base { params, session: &[] }
    }

    /// Base environment whose `session` rules apply at every level of the tree.
    pub fn session(params: &'a EnvParams, session: &'a [EnvRule]) -> Self {
        TumorEnv::Base { params, session }
    }

    /// Layers `rule` over this environment.
    pub fn restrict(&'a self, rule: EnvRule) -> TumorEnv<'a> {
        TumorEnv::Restricted { parent: self, rule }
    }

    /// Environment for members one level down the containment hierarchy.
    ///
    /// Local restrictions on a container do not pass to its members; the
    /// container decides which rules, if any, to layer over this for them.
    pub fn component_env(&self) -> TumorEnv<'a> {
        match self {
            TumorEnv::Base { params, session } => TumorEnv::Base { params: *params, session: *session },
            TumorEnv::Restricted { parent, .. } => parent.component_env(),
        }
    }

    /// Effective growth rate of a member whose intrinsic rate is `intrinsic`.
    pub fn growth_rate(&self, intrinsic: GrowthRate) -> GrowthRate {
        match self {
            TumorEnv::Base { session, .. } => session.iter().fold(intrinsic, |rate, rule| rule.growth_rate(rate)),
            TumorEnv::Restricted { parent, rule } => rule.growth_rate(parent.growth_rate(intrinsic)),
        }
    }

    pub fn allow_cell_division(&self) -> bool {
        match self {
            TumorEnv::Base { session, .. } => !session.contains(&EnvRule::NoCellDivision),
            TumorEnv::Restricted { rule: EnvRule::NoCellDivision, .. } => false,
            TumorEnv::Restricted { parent, .. } => parent.allow_cell_division(),
        }
    }

    pub fn allow_deme_division(&self) -> bool {
        match self {
            TumorEnv::Base { session, .. } => !session.contains(&EnvRule::NoDemeDivision),
            TumorEnv::Restricted { rule: EnvRule::NoDemeDivision, .. } => false,
            TumorEnv::Restricted { parent, .. } => parent.allow_deme_division(),
        }
    }

    pub fn params(&self) -> &'a EnvParams {
        match self {
            TumorEnv::Base { params, .. } => *params,
            TumorEnv::Restricted { parent, .. } => parent.params(),
        }
    }

    pub fn exact_enumeration_limit(&self) -> u64 {
        self.params().exact_enumeration_limit
    }

    pub fn neighborhood(&self) -> Neighborhood {
        self.params().neighborhood
    }

    pub fn max_deme_size(&self) -> u64 {
        self.params().max_deme_size
    }

    pub fn retention_probability(&self) -> f64 {
        self.params().retention_probability
    }
}
