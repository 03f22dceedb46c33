//! Per-user study progress: skill scores, study sessions, activity log and
//! achievements.
//!
//! Every mutation builds the next state, writes it to storage and only then
//! replaces the in-memory copy. A failed write leaves the store exactly as it
//! was before the call.

mod models;

pub use models::*;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ProgressConfig;
use crate::error::{Error, Result, ValidationErrorBuilder};
use crate::scoring::{percentage_to_band, BandScore, ColorTag, IconTag, Skill};
use crate::storage::{Storage, StorageKey};

pub struct ProgressStore {
    storage: Storage,
    key: StorageKey,
    activity_limit: usize,
    data: ProgressData,
}

impl ProgressStore {
    /// Load the progress of `user_id`, starting fresh if nothing is stored
    pub fn open(storage: Storage, user_id: &str, config: &ProgressConfig) -> Result<Self> {
        let key = StorageKey::Progress(user_id.to_string());
        let data = match storage.get::<ProgressData>(&key)? {
            Some(data) => data,
            None => {
                debug!(user_id, "No stored progress, starting fresh");
                ProgressData::new(initial_target(config.default_target_band))
            }
        };
        Ok(Self {
            storage,
            key,
            activity_limit: config.activity_limit.max(1),
            data,
        })
    }

    pub fn data(&self) -> &ProgressData {
        &self.data
    }

    pub fn sessions(&self) -> &[StudySession] {
        &self.data.study_sessions
    }

    pub fn activities(&self) -> &[Activity] {
        &self.data.activities
    }

    /// Share of study sessions marked complete, 0.0 when there are none
    pub fn completion_rate(&self) -> f64 {
        let total = self.data.study_sessions.len();
        if total == 0 {
            return 0.0;
        }
        self.data.completed_sessions() as f64 / total as f64
    }

    /// Discard in-memory state and re-read it from storage
    pub fn reload(&mut self) -> Result<()> {
        if let Some(data) = self.storage.get(&self.key)? {
            self.data = data;
        }
        Ok(())
    }

    fn commit(&mut self, next: ProgressData) -> Result<()> {
        if let Err(e) = self.storage.set(&self.key, &next) {
            warn!(key = %self.key, error = %e, "Failed to persist progress");
            return Err(e.into());
        }
        self.data = next;
        Ok(())
    }

    pub fn add_study_session(&mut self, new: NewStudySession) -> Result<StudySession> {
        let mut errors = ValidationErrorBuilder::new();
        errors
            .require("date", &new.date, "Day is required")
            .require("focus", &new.focus, "Focus area is required")
            .require("time", &new.time, "Duration is required");
        errors.finish()?;

        let session = StudySession {
            id: uuid::Uuid::new_v4().to_string(),
            date: new.date.trim().to_string(),
            focus: new.focus.trim().to_string(),
            time: new.time.trim().to_string(),
            complete: false,
        };

        let mut next = self.data.clone();
        next.study_sessions.push(session.clone());
        self.commit(next)?;

        info!(id = %session.id, focus = %session.focus, "Added study session");
        Ok(session)
    }

    /// Mark a session complete. Unknown ids and already complete sessions are a no-op.
    pub fn complete_study_session(&mut self, id: &str) -> Result<()> {
        let Some(index) = self
            .data
            .study_sessions
            .iter()
            .position(|s| s.id == id && !s.complete)
        else {
            return Ok(());
        };

        let mut next = self.data.clone();
        next.study_sessions[index].complete = true;
        let focus = next.study_sessions[index].focus.clone();
        push_activity(
            &mut next,
            NewActivity::general(
                "Completed study session",
                focus,
                IconTag::CheckCircle,
                ColorTag::Green,
            ),
            self.activity_limit,
        );
        let unlocked = unlock_earned(&mut next, self.activity_limit);
        self.commit(next)?;

        info!(id, ?unlocked, "Completed study session");
        Ok(())
    }

    /// Remove a session. Unknown ids are a no-op.
    pub fn delete_study_session(&mut self, id: &str) -> Result<()> {
        if !self.data.study_sessions.iter().any(|s| s.id == id) {
            return Ok(());
        }
        let mut next = self.data.clone();
        next.study_sessions.retain(|s| s.id != id);
        self.commit(next)?;

        info!(id, "Deleted study session");
        Ok(())
    }

    /// Overwrite one skill score and recompute the overall band
    pub fn update_skill_score(&mut self, skill: Skill, band: BandScore) -> Result<()> {
        let mut next = self.data.clone();
        next.skill_scores.set(skill, band);
        next.recompute_band();
        let unlocked = unlock_earned(&mut next, self.activity_limit);
        self.commit(next)?;

        info!(%skill, %band, current_band = self.data.current_band, ?unlocked, "Updated skill score");
        Ok(())
    }

    pub fn add_activity(&mut self, new: NewActivity) -> Result<Activity> {
        let mut next = self.data.clone();
        let activity = push_activity(&mut next, new, self.activity_limit);
        self.commit(next)?;
        Ok(activity)
    }

    /// Convert a practice percentage, store it as the skill score and log it
    pub fn record_practice_result(&mut self, skill: Skill, percentage: f64) -> Result<BandScore> {
        let band = percentage_to_band(percentage);

        let mut next = self.data.clone();
        next.skill_scores.set(skill, band);
        next.recompute_band();
        push_activity(
            &mut next,
            NewActivity::for_skill(
                skill,
                format!("{} practice test", capitalize(&skill.to_string())),
                format!("Band {band} ({percentage:.0}%)"),
            ),
            self.activity_limit,
        );
        unlock_earned(&mut next, self.activity_limit);
        self.commit(next)?;

        info!(%skill, percentage, %band, "Recorded practice result");
        Ok(band)
    }

    pub fn set_target_band(&mut self, band: BandScore) -> Result<()> {
        let mut next = self.data.clone();
        next.target_band = band;
        unlock_earned(&mut next, self.activity_limit);
        self.commit(next)
    }

    /// Unlock an achievement by id; returns false if it was already unlocked
    pub fn unlock_achievement(&mut self, id: &str) -> Result<bool> {
        let Some(index) = self.data.achievements.iter().position(|a| a.id == id) else {
            return Err(Error::not_found(format!("Achievement '{id}'")));
        };
        if self.data.achievements[index].is_unlocked() {
            return Ok(false);
        }

        let mut next = self.data.clone();
        next.achievements[index].unlocked_at = Some(Utc::now());
        let title = next.achievements[index].title.clone();
        push_activity(&mut next, achievement_activity(title), self.activity_limit);
        self.commit(next)?;
        Ok(true)
    }
}

fn push_activity(data: &mut ProgressData, new: NewActivity, limit: usize) -> Activity {
    let activity = Activity {
        id: uuid::Uuid::new_v4().to_string(),
        label: new.label,
        result: new.result,
        icon: new.icon,
        color: new.color,
        skill: new.skill,
        timestamp: Utc::now(),
    };
    data.activities.insert(0, activity.clone());
    data.activities.truncate(limit);
    activity
}

fn achievement_activity(title: String) -> NewActivity {
    NewActivity::general("Achievement unlocked", title, IconTag::Trophy, ColorTag::Yellow)
}

/// Unlock every achievement whose condition now holds and log each one
fn unlock_earned(data: &mut ProgressData, limit: usize) -> Vec<String> {
    let unlocked = data.refresh_achievements(Utc::now());
    for id in &unlocked {
        let title = data
            .achievements
            .iter()
            .find(|a| &a.id == id)
            .map(|a| a.title.clone());
        if let Some(title) = title {
            push_activity(data, achievement_activity(title), limit);
        }
    }
    unlocked
}

fn initial_target(configured: f64) -> BandScore {
    BandScore::try_from(configured).unwrap_or_else(|e| {
        warn!(error = %e, "Invalid default target band, leaving target unset");
        BandScore::UNSCORED
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore, StorageError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn config() -> ProgressConfig {
        ProgressConfig {
            activity_limit: 3,
            default_target_band: 7.0,
        }
    }

    fn open(storage: &Storage) -> ProgressStore {
        ProgressStore::open(storage.clone(), "student-1", &config()).unwrap()
    }

    fn writing_session() -> NewStudySession {
        NewStudySession {
            date: "Monday".to_string(),
            focus: "Writing Task 2".to_string(),
            time: "1.5 hours".to_string(),
        }
    }

    fn band(value: f64) -> BandScore {
        BandScore::try_from(value).unwrap()
    }

    /// Backend whose writes can be switched off
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size: value.len(),
                    limit: 0,
                });
            }
            self.inner.write(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_fresh_store_uses_configured_target() {
        let store = open(&Storage::in_memory());
        assert_eq!(store.data().target_band, band(7.0));
        assert_eq!(store.data().current_band, 0.0);
        assert!(store.sessions().is_empty());
        assert_eq!(store.data().achievements.len(), 4);
    }

    #[test]
    fn test_add_then_complete_session() {
        let mut store = open(&Storage::in_memory());
        let session = store.add_study_session(writing_session()).unwrap();
        assert!(!session.complete);

        store.complete_study_session(&session.id).unwrap();

        assert_eq!(store.sessions().len(), 1);
        let stored = &store.sessions()[0];
        assert!(stored.complete);
        assert_eq!(stored.date, "Monday");
        assert_eq!(stored.focus, "Writing Task 2");
        assert_eq!(stored.time, "1.5 hours");
    }

    #[test]
    fn test_add_then_delete_restores_previous_list() {
        let mut store = open(&Storage::in_memory());
        store.add_study_session(writing_session()).unwrap();
        let before = store.sessions().to_vec();

        let added = store
            .add_study_session(NewStudySession {
                date: "Friday".to_string(),
                focus: "Listening Section 4".to_string(),
                time: "45 minutes".to_string(),
            })
            .unwrap();
        store.delete_study_session(&added.id).unwrap();

        assert_eq!(store.sessions(), before.as_slice());
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut store = open(&Storage::in_memory());
        let session = store.add_study_session(writing_session()).unwrap();

        store.complete_study_session(&session.id).unwrap();
        let once = store.data().clone();
        store.complete_study_session(&session.id).unwrap();

        assert_eq!(store.data(), &once);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut store = open(&Storage::in_memory());
        store.add_study_session(writing_session()).unwrap();
        let before = store.data().clone();

        store.complete_study_session("missing").unwrap();
        store.delete_study_session("missing").unwrap();

        assert_eq!(store.data(), &before);
    }

    #[test]
    fn test_blank_fields_are_rejected() {
        let mut store = open(&Storage::in_memory());
        let err = store
            .add_study_session(NewStudySession {
                date: String::new(),
                focus: "  ".to_string(),
                time: "1 hour".to_string(),
            })
            .unwrap_err();

        match err {
            Error::Validation(errors) => {
                assert_eq!(errors.field("date"), ["Day is required"]);
                assert_eq!(errors.field("focus"), ["Focus area is required"]);
                assert!(errors.field("time").is_empty());
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn test_changes_are_persisted() {
        let storage = Storage::in_memory();
        let session_id = {
            let mut store = open(&storage);
            let session = store.add_study_session(writing_session()).unwrap();
            store.update_skill_score(Skill::Reading, band(6.5)).unwrap();
            session.id
        };

        let reopened = open(&storage);
        assert_eq!(reopened.sessions()[0].id, session_id);
        assert_eq!(reopened.data().skill_scores.reading, band(6.5));
    }

    #[test]
    fn test_update_skill_score_recomputes_overall() {
        let mut store = open(&Storage::in_memory());
        store.update_skill_score(Skill::Reading, band(7.0)).unwrap();
        store.update_skill_score(Skill::Writing, band(6.0)).unwrap();
        store.update_skill_score(Skill::Listening, band(7.5)).unwrap();
        store.update_skill_score(Skill::Speaking, band(6.5)).unwrap();

        assert_eq!(store.data().current_band, 7.0);
        let achievements = &store.data().achievements;
        let unlocked: Vec<&str> = achievements
            .iter()
            .filter(|a| a.is_unlocked())
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(unlocked, [ALL_SKILLS, TARGET_REACHED]);

        let logged: Vec<(&str, &str)> = store
            .activities()
            .iter()
            .map(|a| (a.label.as_str(), a.result.as_str()))
            .collect();
        assert_eq!(
            logged,
            [
                ("Achievement unlocked", "Target Reached"),
                ("Achievement unlocked", "Well Rounded"),
            ]
        );
        assert_eq!(store.activities()[0].icon, IconTag::Trophy);
    }

    #[test]
    fn test_practice_result_converts_and_logs() {
        let mut store = open(&Storage::in_memory());
        let result = store.record_practice_result(Skill::Listening, 78.0).unwrap();

        assert_eq!(result, band(7.5));
        assert_eq!(store.data().skill_scores.listening, band(7.5));
        let latest = &store.activities()[0];
        assert_eq!(latest.label, "Listening practice test");
        assert_eq!(latest.result, "Band 7.5 (78%)");
        assert_eq!(latest.icon, IconTag::Headphones);
        assert_eq!(latest.skill, Some(Skill::Listening));
    }

    #[test]
    fn test_activity_log_keeps_newest_entries() {
        let mut store = open(&Storage::in_memory());
        for i in 0..5 {
            store
                .add_activity(NewActivity::general(
                    format!("Entry {i}"),
                    "",
                    IconTag::Calendar,
                    ColorTag::Gray,
                ))
                .unwrap();
        }

        let labels: Vec<&str> = store.activities().iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, ["Entry 4", "Entry 3", "Entry 2"]);
    }

    #[test]
    fn test_completing_sessions_unlocks_first_steps() {
        let mut store = open(&Storage::in_memory());
        let session = store.add_study_session(writing_session()).unwrap();
        store.complete_study_session(&session.id).unwrap();

        let first = store
            .data()
            .achievements
            .iter()
            .find(|a| a.id == FIRST_SESSION)
            .unwrap();
        assert!(first.is_unlocked());
        assert_eq!(store.completion_rate(), 1.0);
        assert_eq!(store.activities()[0].label, "Achievement unlocked");
        assert_eq!(store.activities()[0].result, "First Steps");
        assert_eq!(store.activities()[1].label, "Completed study session");
    }

    #[test]
    fn test_unlock_achievement() {
        let mut store = open(&Storage::in_memory());
        assert!(store.unlock_achievement(FIVE_SESSIONS).unwrap());
        assert!(!store.unlock_achievement(FIVE_SESSIONS).unwrap());
        assert!(matches!(
            store.unlock_achievement("moon-landing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let backend = Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            failing: AtomicBool::new(false),
        });
        let storage = Storage::new(backend.clone());
        let mut store = open(&storage);
        let session = store.add_study_session(writing_session()).unwrap();
        let before = store.data().clone();

        backend.failing.store(true, Ordering::SeqCst);
        let err = store.complete_study_session(&session.id).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.notification().title, "Could not save your changes");
        assert!(store.add_study_session(writing_session()).is_err());
        assert!(store.update_skill_score(Skill::Writing, band(8.0)).is_err());

        assert_eq!(store.data(), &before);
    }

    #[test]
    fn test_invalid_configured_target_falls_back() {
        let config = ProgressConfig {
            activity_limit: 10,
            default_target_band: 7.3,
        };
        let store = ProgressStore::open(Storage::in_memory(), "u", &config).unwrap();
        assert_eq!(store.data().target_band, BandScore::UNSCORED);
    }

    #[test]
    fn test_corrupt_progress_fails_open_but_other_keys_load() {
        let backend = Arc::new(MemoryStore::default());
        let storage = Storage::new(backend.clone());
        storage.set(&StorageKey::Events, &vec!["kept"]).unwrap();
        backend
            .write(&StorageKey::Progress("student-1".to_string()).as_string(), "{\"skill_scores\":")
            .unwrap();

        let err = ProgressStore::open(storage.clone(), "student-1", &config())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Storage(StorageError::Corrupt { .. })));

        let events: Vec<String> = storage.get_or_default(&StorageKey::Events).unwrap();
        assert_eq!(events, ["kept"]);
        assert!(ProgressStore::open(storage, "student-2", &config()).is_ok());
    }

    #[test]
    fn test_email_user_ids_work_on_file_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = crate::storage::FileStore::open(temp_dir.path(), 1024 * 1024).unwrap();
        let storage = Storage::new(Arc::new(backend));

        let session_id = {
            let mut store =
                ProgressStore::open(storage.clone(), "alice@example.com", &config()).unwrap();
            store.add_study_session(writing_session()).unwrap().id
        };

        let reopened = ProgressStore::open(storage, "alice@example.com", &config()).unwrap();
        assert_eq!(reopened.sessions()[0].id, session_id);
    }
}
