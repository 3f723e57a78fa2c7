/*!
Student records and their score maps.

A student ID looks like `26/014/JSS1`: two-digit enrollment year, a
zero-padded per-school sequence number, and the class the student
started in. The pair `(school, id)` is the primary key; the same ID
string may exist under a different school.

Scores are kept as a JSON text column: a map from subject name to a
[`SubjectScores`] object.
*/
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::school::{ExamMode, School};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentId {
    pub year: u8,
    pub seq: u32,
    pub class: String,
}

impl StudentId {
    pub fn new(year: i32, seq: u32, class: &str) -> Result<StudentId, String> {
        let class = normalize_classname(class);
        if class.is_empty() {
            return Err("Starting class must not be blank.".to_owned());
        }
        if seq == 0 || seq > 999_999 {
            return Err(format!("{} is not a usable sequence number.", seq));
        }

        Ok(StudentId {
            year: (year.rem_euclid(100)) as u8,
            seq,
            class,
        })
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:02}/{:03}/{}", self.year, self.seq, self.class)
    }
}

impl std::str::FromStr for StudentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (year, seq, class) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(y), Some(n), Some(c), None) => (y, n, c),
            _ => {
                return Err(format!(
                    "{:?} is not a valid student ID (expected YY/NNN/CLASS).", s
                ));
            },
        };

        if year.len() != 2 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("{:?}: year part must be exactly two digits.", s));
        }
        let year: u8 = year.parse()
            .map_err(|_| format!("{:?}: unparseable year part.", s))?;

        if seq.is_empty() || seq.len() > 6 || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("{:?}: sequence part must be 1-6 digits.", s));
        }
        let seq: u32 = seq.parse()
            .map_err(|_| format!("{:?}: unparseable sequence part.", s))?;

        let class = normalize_classname(class);
        if class.is_empty() {
            return Err(format!("{:?}: class part must not be blank.", s));
        }

        Ok(StudentId { year, seq, class })
    }
}

/// Canonical class key: alphanumerics only, uppercased ("Primary 1" -> "PRIMARY1").
pub fn normalize_classname(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// One subject's stored scores. In separate exam mode the `objective`
/// and `theory` papers are present and `exam` is their sum; in combined
/// mode both are absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectScores {
    pub tests: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theory: Option<f32>,
    pub exam: f32,
}

impl SubjectScores {
    pub fn total(&self) -> f32 {
        self.tests.iter().sum::<f32>() + self.exam
    }

    /**
    Check this entry against the school's configured bounds.

    Out-of-range values are rejected outright; nothing is clamped.
    A value exactly at a configured max is fine.
    */
    pub fn validate(&self, subject: &str, school: &School) -> Result<(), String> {
        if self.tests.len() > school.max_tests as usize {
            return Err(format!(
                "{}: {} test scores entered but the school allows at most {}.",
                subject, self.tests.len(), school.max_tests
            ));
        }
        for (n, t) in self.tests.iter().enumerate() {
            if !t.is_finite() || *t < 0.0 || *t > school.test_max {
                return Err(format!(
                    "{}: test {} score must be between 0 and {}.",
                    subject, n + 1, school.test_max
                ));
            }
        }

        match school.exam.mode {
            ExamMode::Combined => {
                if self.objective.is_some() || self.theory.is_some() {
                    return Err(format!(
                        "{}: objective/theory scores are not accepted in combined exam mode.",
                        subject
                    ));
                }
                if !self.exam.is_finite() || self.exam < 0.0 || self.exam > school.exam.exam_max {
                    return Err(format!(
                        "{}: exam score must be between 0 and {}.",
                        subject, school.exam.exam_max
                    ));
                }
            },
            ExamMode::Separate => {
                let objective = match self.objective {
                    Some(v) => v,
                    None => {
                        return Err(format!(
                            "{}: objective score required in separate exam mode.", subject
                        ));
                    },
                };
                let theory = match self.theory {
                    Some(v) => v,
                    None => {
                        return Err(format!(
                            "{}: theory score required in separate exam mode.", subject
                        ));
                    },
                };

                if !objective.is_finite() || objective < 0.0
                    || objective > school.exam.objective_max
                {
                    return Err(format!(
                        "{}: objective score must be between 0 and {}.",
                        subject, school.exam.objective_max
                    ));
                }
                if !theory.is_finite() || theory < 0.0 || theory > school.exam.theory_max {
                    return Err(format!(
                        "{}: theory score must be between 0 and {}.",
                        subject, school.exam.theory_max
                    ));
                }
                if (self.exam - (objective + theory)).abs() > 0.0001 {
                    return Err(format!(
                        "{}: exam score must equal objective + theory.", subject
                    ));
                }
            },
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Student {
    /// Owning school's id; the tenant scope for every query.
    pub school: String,
    /// Canonical `YY/NNN/CLASS` string.
    pub id: String,
    pub firstname: String,
    pub classname: String,
    pub term: crate::school::Term,
    pub subjects: Vec<String>,
    pub scores: HashMap<String, SubjectScores>,
    pub comment: String,
}

impl Student {
    /// Assigned subjects with no score entry yet. Empty means the
    /// record is complete enough to publish.
    pub fn missing_subjects(&self) -> Vec<&str> {
        self.subjects.iter()
            .filter(|s| !self.scores.contains_key(s.as_str()))
            .map(|s| s.as_str())
            .collect()
    }

    /// Validate a whole score map against the subject list and the
    /// school's bounds. Subjects not assigned to this student are
    /// rejected.
    pub fn validate_scores(
        &self,
        scores: &HashMap<String, SubjectScores>,
        school: &School,
    ) -> Result<(), String> {
        for (subject, entry) in scores.iter() {
            if !self.subjects.iter().any(|s| s == subject) {
                return Err(format!(
                    "{:?} is not one of this student's subjects.", subject
                ));
            }
            entry.validate(subject, school)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::school::{ExamConfig, ExamMode, Term};
    use crate::tests::ensure_logging;

    fn test_school() -> School {
        let mut school = School::new("kings".to_owned(), "Kings College".to_owned());
        school.max_tests = 3;
        school.test_max = 10.0;
        school.exam = ExamConfig::new(ExamMode::Combined, 0.0, 0.0, 70.0).unwrap();
        school
    }

    fn entry(tests: &[f32], exam: f32) -> SubjectScores {
        SubjectScores {
            tests: tests.to_vec(),
            objective: None,
            theory: None,
            exam,
        }
    }

    #[test]
    fn student_id_round_trip() {
        ensure_logging();

        let id = StudentId::new(2026, 14, "JSS1").unwrap();
        assert_eq!(id.to_string(), "26/014/JSS1");

        let parsed: StudentId = "26/014/JSS1".parse().unwrap();
        assert_eq!(parsed, id);

        // Classes get canonicalized.
        let id = StudentId::new(2026, 7, "Primary 1").unwrap();
        assert_eq!(id.to_string(), "26/007/PRIMARY1");
    }

    #[test]
    fn student_id_has_one_spelling() {
        ensure_logging();

        // Short sequences and un-normalized classes parse, but to the
        // same value as the canonical form.
        let a: StudentId = "26/1/jss1".parse().unwrap();
        let b: StudentId = "26/001/JSS1".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "26/001/JSS1");
    }

    #[test]
    fn student_id_rejects_malformed() {
        ensure_logging();

        for bad in [
            "26/014",            // missing class
            "26/014/JSS1/x",     // too many parts
            "2026/014/JSS1",     // four-digit year
            "26/abc/JSS1",       // non-numeric sequence
            "26/1234567/JSS1",   // sequence too long
            "26/014/!!",         // class canonicalizes to nothing
        ] {
            assert!(bad.parse::<StudentId>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn score_bounds_are_inclusive() {
        ensure_logging();
        let school = test_school();

        // Exactly at the max: accepted.
        entry(&[10.0, 9.5, 0.0], 70.0).validate("Maths", &school).unwrap();
        // One test over the max: rejected, not clamped.
        assert!(entry(&[10.5, 0.0, 0.0], 10.0).validate("Maths", &school).is_err());
        // Exam over the max.
        assert!(entry(&[5.0], 70.5).validate("Maths", &school).is_err());
        // Too many tests.
        assert!(entry(&[1.0, 1.0, 1.0, 1.0], 10.0).validate("Maths", &school).is_err());
        // Negative and non-finite values.
        assert!(entry(&[-1.0], 10.0).validate("Maths", &school).is_err());
        assert!(entry(&[f32::NAN], 10.0).validate("Maths", &school).is_err());
    }

    #[test]
    fn separate_mode_requires_both_papers() {
        ensure_logging();

        let mut school = test_school();
        school.exam = ExamConfig::new(ExamMode::Separate, 30.0, 40.0, 0.0).unwrap();

        let good = SubjectScores {
            tests: vec![8.0],
            objective: Some(25.0),
            theory: Some(31.0),
            exam: 56.0,
        };
        good.validate("Maths", &school).unwrap();

        let mut missing_theory = good.clone();
        missing_theory.theory = None;
        assert!(missing_theory.validate("Maths", &school).is_err());

        let mut sum_mismatch = good.clone();
        sum_mismatch.exam = 50.0;
        assert!(sum_mismatch.validate("Maths", &school).is_err());

        let mut objective_over = good.clone();
        objective_over.objective = Some(30.5);
        objective_over.exam = 61.5;
        assert!(objective_over.validate("Maths", &school).is_err());
    }

    #[test]
    fn missing_subjects_reported() {
        ensure_logging();

        let mut scores = HashMap::new();
        scores.insert("Maths".to_owned(), entry(&[5.0], 40.0));

        let stud = Student {
            school: "kings".to_owned(),
            id: "26/001/JSS1".to_owned(),
            firstname: "Ada".to_owned(),
            classname: "JSS1".to_owned(),
            term: Term::First,
            subjects: vec!["Maths".to_owned(), "English".to_owned()],
            scores,
            comment: String::new(),
        };

        assert_eq!(stud.missing_subjects(), vec!["English"]);

        let mut unassigned = HashMap::new();
        unassigned.insert("Chemistry".to_owned(), entry(&[5.0], 40.0));
        assert!(stud.validate_scores(&unassigned, &test_school()).is_err());
    }

    #[test]
    fn subject_scores_json_shape() {
        ensure_logging();

        let e = entry(&[7.0, 8.5], 55.0);
        let text = serde_json::to_string(&e).unwrap();
        // Combined-mode entries must not carry objective/theory keys.
        assert!(!text.contains("objective"));

        let back: SubjectScores = serde_json::from_str(&text).unwrap();
        assert_eq!(back, e);
    }
}
