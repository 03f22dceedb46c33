//! IELTS band scores and the four tested skills.
//!
//! Practice results arrive as percentages and are discretized into band
//! scores through a fixed threshold table. A [`BandScore`] can only hold
//! one of the levels the table produces, or `0.0` for "not assessed".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Percentage thresholds, highest first, paired with the band in half steps
const BREAKPOINTS: [(f64, u8); 13] = [
    (90.0, 18),
    (85.0, 17),
    (80.0, 16),
    (75.0, 15),
    (70.0, 14),
    (65.0, 13),
    (60.0, 12),
    (55.0, 11),
    (50.0, 10),
    (45.0, 9),
    (40.0, 8),
    (35.0, 7),
    (30.0, 6),
];

/// Band score stored as a count of half bands
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "f64", into = "f64")]
pub struct BandScore(u8);

impl BandScore {
    /// Not yet assessed
    pub const UNSCORED: BandScore = BandScore(0);
    /// Lowest band the converter produces
    pub const FLOOR: BandScore = BandScore(5);
    pub const MAX: BandScore = BandScore(18);

    /// Every representable level, ascending
    pub fn levels() -> impl Iterator<Item = BandScore> {
        std::iter::once(Self::UNSCORED).chain((Self::FLOOR.0..=Self::MAX.0).map(BandScore))
    }

    pub fn value(self) -> f64 {
        f64::from(self.0) / 2.0
    }

    pub fn is_scored(self) -> bool {
        self != Self::UNSCORED
    }
}

impl TryFrom<f64> for BandScore {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let halves = value * 2.0;
        if halves.fract() != 0.0 || !(0.0..=18.0).contains(&halves) {
            return Err(format!("{value} is not a band score in 0.5 steps"));
        }
        let halves = halves as u8;
        if halves != 0 && halves < Self::FLOOR.0 {
            return Err(format!("{value} is below the lowest band of 2.5"));
        }
        Ok(BandScore(halves))
    }
}

impl From<BandScore> for f64 {
    fn from(band: BandScore) -> Self {
        band.value()
    }
}

impl std::str::FromStr for BandScore {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid band score: {}", s))?;
        BandScore::try_from(value)
    }
}

impl fmt::Display for BandScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

/// Convert a raw practice percentage to a band score.
///
/// Total over all inputs: values above 100 give 9.0, anything below 30
/// (negative and NaN included) gives the 2.5 floor.
pub fn percentage_to_band(pct: f64) -> BandScore {
    BREAKPOINTS
        .iter()
        .find(|(threshold, _)| pct >= *threshold)
        .map(|&(_, halves)| BandScore(halves))
        .unwrap_or(BandScore::FLOOR)
}

/// Mean of the four skills rounded to the nearest half band, ties up
pub fn overall_band(scores: &SkillScores) -> f64 {
    let total: f64 = Skill::ALL.iter().map(|&s| scores.get(s).value()).sum();
    let mean = total / Skill::ALL.len() as f64;
    (mean * 2.0).round() / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Reading,
    Writing,
    Listening,
    Speaking,
}

impl Skill {
    pub const ALL: [Skill; 4] = [
        Skill::Reading,
        Skill::Writing,
        Skill::Listening,
        Skill::Speaking,
    ];

    pub fn style(self) -> SkillStyle {
        match self {
            Skill::Reading => SkillStyle {
                color: ColorTag::Blue,
                icon: IconTag::BookOpen,
            },
            Skill::Writing => SkillStyle {
                color: ColorTag::Green,
                icon: IconTag::PenTool,
            },
            Skill::Listening => SkillStyle {
                color: ColorTag::Purple,
                icon: IconTag::Headphones,
            },
            Skill::Speaking => SkillStyle {
                color: ColorTag::Orange,
                icon: IconTag::Mic,
            },
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reading => write!(f, "reading"),
            Self::Writing => write!(f, "writing"),
            Self::Listening => write!(f, "listening"),
            Self::Speaking => write!(f, "speaking"),
        }
    }
}

impl std::str::FromStr for Skill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reading" => Ok(Self::Reading),
            "writing" => Ok(Self::Writing),
            "listening" => Ok(Self::Listening),
            "speaking" => Ok(Self::Speaking),
            _ => Err(format!("Unknown skill: {}", s)),
        }
    }
}

/// Display style of a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillStyle {
    pub color: ColorTag,
    pub icon: IconTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Blue,
    Green,
    Purple,
    Orange,
    Yellow,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IconTag {
    BookOpen,
    PenTool,
    Headphones,
    Mic,
    Calendar,
    CheckCircle,
    Trophy,
    Target,
}

/// Band score per skill
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillScores {
    pub reading: BandScore,
    pub writing: BandScore,
    pub listening: BandScore,
    pub speaking: BandScore,
}

impl SkillScores {
    pub fn get(&self, skill: Skill) -> BandScore {
        match skill {
            Skill::Reading => self.reading,
            Skill::Writing => self.writing,
            Skill::Listening => self.listening,
            Skill::Speaking => self.speaking,
        }
    }

    pub fn set(&mut self, skill: Skill, band: BandScore) {
        match skill {
            Skill::Reading => self.reading = band,
            Skill::Writing => self.writing = band,
            Skill::Listening => self.listening = band,
            Skill::Speaking => self.speaking = band,
        }
    }
}
