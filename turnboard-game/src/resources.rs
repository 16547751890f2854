//! Five-dimension resource vector shared by teams, score deltas, and bonuses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// One axis of the team resource vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Resource,
    Energy,
    Trust,
    Competency,
    Insight,
}

impl Dimension {
    pub const ALL: [Self; 5] = [
        Self::Resource,
        Self::Energy,
        Self::Trust,
        Self::Competency,
        Self::Insight,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Energy => "energy",
            Self::Trust => "trust",
            Self::Competency => "competency",
            Self::Insight => "insight",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer resource vector. Values are intentionally unbounded in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Resource/time budget.
    #[serde(default)]
    pub resource: i32,
    #[serde(default)]
    pub energy: i32,
    #[serde(default)]
    pub trust: i32,
    #[serde(default)]
    pub competency: i32,
    #[serde(default)]
    pub insight: i32,
}

/// Score deltas share the resource vector shape.
pub type ScoreDelta = Resources;

impl Resources {
    pub const ZERO: Self = Self::uniform(0);

    #[must_use]
    pub const fn new(resource: i32, energy: i32, trust: i32, competency: i32, insight: i32) -> Self {
        Self {
            resource,
            energy,
            trust,
            competency,
            insight,
        }
    }

    /// Vector with the same value on every dimension.
    #[must_use]
    pub const fn uniform(value: i32) -> Self {
        Self::new(value, value, value, value, value)
    }

    #[must_use]
    pub const fn get(&self, dimension: Dimension) -> i32 {
        match dimension {
            Dimension::Resource => self.resource,
            Dimension::Energy => self.energy,
            Dimension::Trust => self.trust,
            Dimension::Competency => self.competency,
            Dimension::Insight => self.insight,
        }
    }

    pub const fn get_mut(&mut self, dimension: Dimension) -> &mut i32 {
        match dimension {
            Dimension::Resource => &mut self.resource,
            Dimension::Energy => &mut self.energy,
            Dimension::Trust => &mut self.trust,
            Dimension::Competency => &mut self.competency,
            Dimension::Insight => &mut self.insight,
        }
    }

    /// Apply `f` to every dimension.
    #[must_use]
    pub fn map(self, f: impl Fn(i32) -> i32) -> Self {
        Self::new(
            f(self.resource),
            f(self.energy),
            f(self.trust),
            f(self.competency),
            f(self.insight),
        )
    }

    /// Multiply every dimension, saturating at the `i32` bounds.
    #[must_use]
    pub fn scaled(self, factor: i32) -> Self {
        self.map(|value| value.saturating_mul(factor))
    }

    /// Negate positive values and leave zero and negative values untouched.
    #[must_use]
    pub fn force_non_positive(self) -> Self {
        self.map(|value| if value > 0 { -value } else { value })
    }

    #[must_use]
    pub fn clamped(self, min: i32, max: i32) -> Self {
        self.map(|value| value.clamp(min, max))
    }

    /// Sum across every dimension, used for standings.
    #[must_use]
    pub fn total(&self) -> i64 {
        Dimension::ALL
            .iter()
            .map(|dimension| i64::from(self.get(*dimension)))
            .sum()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Add for Resources {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(
            self.resource.saturating_add(rhs.resource),
            self.energy.saturating_add(rhs.energy),
            self.trust.saturating_add(rhs.trust),
            self.competency.saturating_add(rhs.competency),
            self.insight.saturating_add(rhs.insight),
        )
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resource {:+} energy {:+} trust {:+} competency {:+} insight {:+}",
            self.resource, self.energy, self.trust, self.competency, self.insight
        )
    }
}
