//! Progress data persisted per user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{overall_band, BandScore, ColorTag, IconTag, Skill, SkillScores};

/// A user-scheduled block of practice time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: String,
    /// Day-of-week label, e.g. "Monday"
    pub date: String,
    /// Focus area, e.g. "Writing Task 2"
    pub focus: String,
    /// Duration label, e.g. "1.5 hours"
    pub time: String,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudySession {
    pub date: String,
    pub focus: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub label: String,
    pub result: String,
    pub icon: IconTag,
    pub color: ColorTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<Skill>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub label: String,
    pub result: String,
    pub icon: IconTag,
    pub color: ColorTag,
    pub skill: Option<Skill>,
}

impl NewActivity {
    /// Activity styled after the skill it belongs to
    pub fn for_skill(skill: Skill, label: impl Into<String>, result: impl Into<String>) -> Self {
        let style = skill.style();
        Self {
            label: label.into(),
            result: result.into(),
            icon: style.icon,
            color: style.color,
            skill: Some(skill),
        }
    }

    pub fn general(
        label: impl Into<String>,
        result: impl Into<String>,
        icon: IconTag,
        color: ColorTag,
    ) -> Self {
        Self {
            label: label.into(),
            result: result.into(),
            icon,
            color,
            skill: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl Achievement {
    fn locked(id: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            unlocked_at: None,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }
}

pub const FIRST_SESSION: &str = "first-session";
pub const FIVE_SESSIONS: &str = "five-sessions";
pub const ALL_SKILLS: &str = "all-skills";
pub const TARGET_REACHED: &str = "target-reached";

pub fn default_achievements() -> Vec<Achievement> {
    vec![
        Achievement::locked(FIRST_SESSION, "First Steps", "Complete your first study session"),
        Achievement::locked(FIVE_SESSIONS, "Consistent Learner", "Complete five study sessions"),
        Achievement::locked(ALL_SKILLS, "Well Rounded", "Record a score for all four skills"),
        Achievement::locked(TARGET_REACHED, "Target Reached", "Reach your target band score"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    pub skill_scores: SkillScores,
    /// Aggregate of the four skill scores
    pub current_band: f64,
    pub target_band: BandScore,
    #[serde(default)]
    pub study_sessions: Vec<StudySession>,
    /// Newest first
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default = "default_achievements")]
    pub achievements: Vec<Achievement>,
}

impl ProgressData {
    pub fn new(target_band: BandScore) -> Self {
        Self {
            skill_scores: SkillScores::default(),
            current_band: 0.0,
            target_band,
            study_sessions: Vec::new(),
            activities: Vec::new(),
            achievements: default_achievements(),
        }
    }

    pub fn completed_sessions(&self) -> usize {
        self.study_sessions.iter().filter(|s| s.complete).count()
    }

    pub(crate) fn recompute_band(&mut self) {
        self.current_band = overall_band(&self.skill_scores);
    }

    fn earned(&self, id: &str) -> bool {
        match id {
            FIRST_SESSION => self.completed_sessions() >= 1,
            FIVE_SESSIONS => self.completed_sessions() >= 5,
            ALL_SKILLS => Skill::ALL.iter().all(|&s| self.skill_scores.get(s).is_scored()),
            TARGET_REACHED => {
                self.target_band.is_scored() && self.current_band >= self.target_band.value()
            }
            _ => false,
        }
    }

    /// Unlock every achievement whose condition now holds; returns the new ones
    pub(crate) fn refresh_achievements(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let earned: Vec<String> = self
            .achievements
            .iter()
            .filter(|a| !a.is_unlocked() && self.earned(&a.id))
            .map(|a| a.id.clone())
            .collect();
        for achievement in &mut self.achievements {
            if earned.contains(&achievement.id) {
                achievement.unlocked_at = Some(now);
            }
        }
        earned
    }
}
