use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Invalid grade '{0}'. Accepted values: A+, A, B+, B, C+, C, D+, D, F, S, U, W, P, AU")]
pub struct GradeParseError(String);

/// A grade symbol as printed in the portal's result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Grade {
    APlus,
    A,
    BPlus,
    B,
    CPlus,
    C,
    DPlus,
    D,
    F,
    S,
    U,
    W,
    P,
    Au,
}

impl Grade {
    pub fn symbol(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
            Grade::S => "S",
            Grade::U => "U",
            Grade::W => "W",
            Grade::P => "P",
            Grade::Au => "AU",
        }
    }

    pub fn is_failing(&self) -> bool {
        matches!(self, Grade::F)
    }
}

impl FromStr for Grade {
    type Err = GradeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A+" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "B+" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            "C+" => Ok(Grade::CPlus),
            "C" => Ok(Grade::C),
            "D+" => Ok(Grade::DPlus),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            "S" => Ok(Grade::S),
            "U" => Ok(Grade::U),
            "W" => Ok(Grade::W),
            "P" => Ok(Grade::P),
            "AU" => Ok(Grade::Au),
            _ => Err(GradeParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Grade {
    type Error = GradeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Grade> for String {
    fn from(grade: Grade) -> Self {
        grade.symbol().to_string()
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub course_code: String,
    pub grade: Option<Grade>,
}

impl Display for GradeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.grade {
            Some(grade) => write!(f, "{:<12} {}", self.course_code, grade),
            None => write!(f, "{:<12} (not yet graded)", self.course_code),
        }
    }
}

/// Course grades found under one term header, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSnapshot {
    pub term: String,
    pub records: Vec<GradeRecord>,
}

impl TermSnapshot {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            records: Vec::new(),
        }
    }

    /// Records a course grade. A course seen twice keeps its first position.
    pub fn insert(&mut self, course_code: String, grade: Option<Grade>) {
        match self
            .records
            .iter_mut()
            .find(|r| r.course_code == course_code)
        {
            Some(existing) => existing.grade = grade,
            None => self.records.push(GradeRecord { course_code, grade }),
        }
    }

    pub fn get(&self, course_code: &str) -> Option<&GradeRecord> {
        self.records.iter().find(|r| r.course_code == course_code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GradeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.grade.is_none())
            .map(|r| r.course_code.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.records.iter().all(|r| r.grade.is_some())
    }
}

impl Display for TermSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ {} ─ {} course(s)", self.term, self.records.len())?;
        for record in &self.records {
            writeln!(f, "│  {}", record)?;
        }
        write!(f, "└─ {} pending", self.pending().len())
    }
}

/// What the watcher last recorded for a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseStatus {
    Unseen,
    AwaitingGrade,
    Graded(Grade),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_from_str_is_case_insensitive() {
        assert_eq!("b+".parse::<Grade>().unwrap(), Grade::BPlus);
        assert_eq!("Au".parse::<Grade>().unwrap(), Grade::Au);
        assert_eq!("A".parse::<Grade>().unwrap(), Grade::A);
        assert!("E".parse::<Grade>().is_err());
        assert!("3".parse::<Grade>().is_err());
        assert!("S AU".parse::<Grade>().is_err());
    }

    #[test]
    fn test_only_f_is_failing() {
        assert!(Grade::F.is_failing());
        assert!(!Grade::U.is_failing());
        assert!(!Grade::D.is_failing());
    }

    #[test]
    fn test_snapshot_insert_keeps_first_position() {
        let mut snapshot = TermSnapshot::new("1/2568");
        snapshot.insert("EN813001".to_string(), None);
        snapshot.insert("EN813202".to_string(), Some(Grade::B));
        snapshot.insert("EN813001".to_string(), Some(Grade::A));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.records[0].course_code, "EN813001");
        assert_eq!(snapshot.records[0].grade, Some(Grade::A));
        assert!(snapshot.is_complete());
    }

    #[test]
    fn test_snapshot_pending() {
        let mut snapshot = TermSnapshot::new("1/2568");
        snapshot.insert("EN813001".to_string(), Some(Grade::A));
        snapshot.insert("EN813202".to_string(), None);
        snapshot.insert("EN813203".to_string(), None);

        assert_eq!(snapshot.pending(), vec!["EN813202", "EN813203"]);
        assert!(!snapshot.is_complete());
    }

    #[test]
    fn test_grade_serializes_as_symbol() {
        let record = GradeRecord {
            course_code: "EN813001".to_string(),
            grade: Some(Grade::CPlus),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"course_code":"EN813001","grade":"C+"}"#);
    }
}
