use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::types::{CourseStatus, Grade};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to write seen state: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize seen state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Last recorded status of every course the watcher has come across.
///
/// On disk this is a flat JSON object mapping course codes to the last
/// notified grade, with an empty string for courses still awaiting one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenState {
    courses: BTreeMap<String, CourseStatus>,
}

impl SeenState {
    pub fn status(&self, course_code: &str) -> CourseStatus {
        self.courses
            .get(course_code)
            .copied()
            .unwrap_or(CourseStatus::Unseen)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        let mut state = SeenState::default();

        for (course_code, value) in raw {
            if value.trim().is_empty() {
                state.courses.insert(course_code, CourseStatus::AwaitingGrade);
                continue;
            }
            match value.parse::<Grade>() {
                Ok(grade) => {
                    state.courses.insert(course_code, CourseStatus::Graded(grade));
                }
                Err(e) => log::warn!("Ignoring seen entry for {}: {}", course_code, e),
            }
        }

        Ok(state)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        let raw: BTreeMap<&str, String> = self
            .courses
            .iter()
            .filter_map(|(code, status)| match status {
                CourseStatus::Graded(grade) => Some((code.as_str(), grade.to_string())),
                CourseStatus::AwaitingGrade => Some((code.as_str(), String::new())),
                CourseStatus::Unseen => None,
            })
            .collect();
        serde_json::to_string_pretty(&raw)
    }
}

/// Seen state bound to its backing file. Every mutation is written out
/// before the call returns.
#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    state: SeenState,
}

impl SeenStore {
    /// Loads the store, starting empty when the file is missing or unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let state = match fs::read_to_string(&path) {
            Ok(content) => SeenState::from_json(&content).unwrap_or_else(|e| {
                log::warn!("Seen state {:?} is corrupt, starting empty: {}", path, e);
                SeenState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No seen state at {:?}, starting empty", path);
                SeenState::default()
            }
            Err(e) => {
                log::warn!("Failed to read seen state {:?}, starting empty: {}", path, e);
                SeenState::default()
            }
        };

        log::debug!("Loaded {} seen course(s) from {:?}", state.len(), path);
        Self { path, state }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &SeenState {
        &self.state
    }

    pub fn status(&self, course_code: &str) -> CourseStatus {
        self.state.status(course_code)
    }

    /// Records that a course is listed without a grade. A course that
    /// already has a grade is left as it is.
    pub fn mark_awaiting(&mut self, course_code: &str) -> Result<bool, StateError> {
        if self.state.status(course_code) != CourseStatus::Unseen {
            return Ok(false);
        }
        self.state
            .courses
            .insert(course_code.to_string(), CourseStatus::AwaitingGrade);
        self.persist()?;
        Ok(true)
    }

    pub fn mark_graded(&mut self, course_code: &str, grade: Grade) -> Result<(), StateError> {
        self.state
            .courses
            .insert(course_code.to_string(), CourseStatus::Graded(grade));
        self.persist()
    }

    fn persist(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = self.state.to_json()?;
        let tmp_path = self.path.with_extension("tmp");

        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        log::trace!("Persisted seen state to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = SeenStore::load(dir.path().join("seen.json"));
        assert!(store.state().is_empty());
        assert_eq!(store.status("EN813001"), CourseStatus::Unseen);
    }

    #[test]
    fn test_load_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("seen.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SeenStore::load(&path);
        assert!(store.state().is_empty());
    }

    #[test]
    fn test_load_existing_flat_map() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("seen.json");
        fs::write(
            &path,
            r#"{"EN813001": "A", "EN813202": "", "EN813203": "b+", "EN813204": "X"}"#,
        )
        .unwrap();

        let store = SeenStore::load(&path);
        assert_eq!(store.status("EN813001"), CourseStatus::Graded(Grade::A));
        assert_eq!(store.status("EN813202"), CourseStatus::AwaitingGrade);
        assert_eq!(store.status("EN813203"), CourseStatus::Graded(Grade::BPlus));
        assert_eq!(store.status("EN813204"), CourseStatus::Unseen);
        assert_eq!(store.status("EN999999"), CourseStatus::Unseen);
        assert_eq!(store.state().len(), 3);
    }

    #[test]
    fn test_mutations_are_persisted_immediately() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("state").join("seen.json");

        let mut store = SeenStore::load(&path);
        assert!(store.mark_awaiting("EN813202").unwrap());
        store.mark_graded("EN813001", Grade::F).unwrap();

        let reloaded = SeenStore::load(&path);
        assert_eq!(reloaded.state(), store.state());

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("EN813001").map(String::as_str), Some("F"));
        assert_eq!(raw.get("EN813202").map(String::as_str), Some(""));
        assert!(!dir.path().join("state").join("seen.tmp").exists());
    }

    #[test]
    fn test_mark_awaiting_never_downgrades() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = SeenStore::load(dir.path().join("seen.json"));

        store.mark_graded("EN813001", Grade::A).unwrap();
        assert!(!store.mark_awaiting("EN813001").unwrap());
        assert_eq!(store.status("EN813001"), CourseStatus::Graded(Grade::A));
    }

    #[test]
    fn test_mark_graded_replaces_awaiting() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = SeenStore::load(dir.path().join("seen.json"));

        store.mark_awaiting("EN813202").unwrap();
        store.mark_graded("EN813202", Grade::W).unwrap();

        assert_eq!(store.status("EN813202"), CourseStatus::Graded(Grade::W));
        assert_eq!(store.state().len(), 1);
    }
}
