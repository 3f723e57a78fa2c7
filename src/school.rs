/*!
Per-school (that is, per-tenant) configuration.

Each school sets its own term calendar, test/exam structure, and grade
threshold table. Two toggles gate writes: `operations_enabled` is thrown
by the super admin and locks the whole school; `teacher_operations_enabled`
is thrown by the school admin and locks just the teachers.
*/
use serde::{Deserialize, Serialize};

/// The bounds the super admin may set for a school's test count.
pub const MAX_TESTS_FLOOR: i16 = 1;
pub const MAX_TESTS_CEIL: i16 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    First,
    Second,
    Third,
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Term::First  => "First Term",
            Term::Second => "Second Term",
            Term::Third  => "Third Term",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Term {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "First Term"  => Ok(Term::First),
            "Second Term" => Ok(Term::Second),
            "Third Term"  => Ok(Term::Third),
            _ => Err(format!("{:?} is not a valid Term.", s)),
        }
    }
}

/// How a subject's exam component is assessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamMode {
    /// One exam score out of `exam_max`.
    Combined,
    /// Objective and theory papers scored separately; their sum is the
    /// exam score.
    Separate,
}

impl std::fmt::Display for ExamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            ExamMode::Combined => "combined",
            ExamMode::Separate => "separate",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for ExamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "combined" => Ok(ExamMode::Combined),
            "separate" => Ok(ExamMode::Separate),
            _ => Err(format!("{:?} is not a valid ExamMode.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExamConfig {
    pub mode: ExamMode,
    pub objective_max: f32,
    pub theory_max: f32,
    pub exam_max: f32,
}

impl std::default::Default for ExamConfig {
    fn default() -> Self {
        Self {
            mode: ExamMode::Combined,
            objective_max: 0.0,
            theory_max: 0.0,
            exam_max: 70.0,
        }
    }
}

impl ExamConfig {
    /// In separate mode the exam max is pinned to the sum of the paper
    /// maxes; callers should go through here rather than build the
    /// struct by hand.
    pub fn new(
        mode: ExamMode,
        objective_max: f32,
        theory_max: f32,
        exam_max: f32,
    ) -> Result<Self, String> {
        let exam_max = match mode {
            ExamMode::Combined => exam_max,
            ExamMode::Separate => objective_max + theory_max,
        };

        let cfg = Self { mode, objective_max, theory_max, exam_max };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Bounds on every component. Deserialized configurations land
    /// here too (via `School::validate`), so a hand-built struct can't
    /// smuggle in an unpinned separate-mode exam max.
    pub fn validate(&self) -> Result<(), String> {
        for (label, v) in [
            ("objective max", self.objective_max),
            ("theory max", self.theory_max),
        ] {
            if !v.is_finite() || v < 0.0 || v > 100.0 {
                return Err(format!("{} must be between 0 and 100.", label));
            }
        }

        match self.mode {
            ExamMode::Combined => {
                if !self.exam_max.is_finite()
                    || self.exam_max < 0.0
                    || self.exam_max > 100.0
                {
                    return Err("exam max must be between 0 and 100.".to_owned());
                }
            },
            ExamMode::Separate => {
                let paper_sum = self.objective_max + self.theory_max;
                if !self.exam_max.is_finite()
                    || (self.exam_max - paper_sum).abs() > 0.0001
                {
                    return Err(format!(
                        "In separate mode the exam max must be the sum of the paper maxes ({}).",
                        paper_sum
                    ));
                }
            },
        }

        Ok(())
    }
}

/// Minimum average marks for each letter grade, plus the pass mark.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradeConfig {
    pub a_min: f32,
    pub b_min: f32,
    pub c_min: f32,
    pub d_min: f32,
    pub pass_mark: f32,
}

impl std::default::Default for GradeConfig {
    fn default() -> Self {
        Self {
            a_min: 70.0,
            b_min: 60.0,
            c_min: 50.0,
            d_min: 40.0,
            pass_mark: 50.0,
        }
    }
}

impl GradeConfig {
    pub fn new(
        a_min: f32,
        b_min: f32,
        c_min: f32,
        d_min: f32,
        pass_mark: f32,
    ) -> Result<Self, String> {
        let cfg = Self { a_min, b_min, c_min, d_min, pass_mark };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Thresholds must be ordered D <= C <= B <= A and lie within 0-100.
    pub fn validate(&self) -> Result<(), String> {
        for v in [self.a_min, self.b_min, self.c_min, self.d_min, self.pass_mark] {
            if !v.is_finite() {
                return Err("Grade thresholds must be finite numbers.".to_owned());
            }
        }
        if !(0.0 <= self.d_min
            && self.d_min <= self.c_min
            && self.c_min <= self.b_min
            && self.b_min <= self.a_min
            && self.a_min <= 100.0)
        {
            return Err(
                "Grade thresholds must satisfy 0 <= D <= C <= B <= A <= 100.".to_owned()
            );
        }
        if self.pass_mark < 0.0 || self.pass_mark > 100.0 {
            return Err("Pass mark must be between 0 and 100.".to_owned());
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct School {
    /// Short symbol used as the tenant key, e.g. "kings".
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
    /// Super admin's master switch. Off means the whole school is
    /// read-only for its admin and teachers.
    pub operations_enabled: bool,
    /// School admin's switch over just the teachers.
    pub teacher_operations_enabled: bool,
    pub current_term: Term,
    pub academic_year: String,
    /// How many tests feed a subject's score (1 through 5).
    pub max_tests: i16,
    /// Max value of a single test.
    pub test_max: f32,
    pub exam: ExamConfig,
    pub grades: GradeConfig,
}

impl School {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            logo: None,
            operations_enabled: true,
            teacher_operations_enabled: true,
            current_term: Term::First,
            academic_year: String::new(),
            max_tests: 3,
            test_max: 10.0,
            exam: ExamConfig::default(),
            grades: GradeConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty()
            || !self.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!(
                "{:?} is not a valid school id (letters, digits, _, - only).",
                &self.id
            ));
        }
        if self.name.trim().is_empty() {
            return Err("School name must not be blank.".to_owned());
        }
        if self.max_tests < MAX_TESTS_FLOOR || self.max_tests > MAX_TESTS_CEIL {
            return Err(format!(
                "Max test count must be between {} and {}.",
                MAX_TESTS_FLOOR, MAX_TESTS_CEIL
            ));
        }
        if !self.test_max.is_finite() || self.test_max < 0.0 || self.test_max > 100.0 {
            return Err("Per-test max must be between 0 and 100.".to_owned());
        }
        self.exam.validate()?;
        self.grades.validate()?;

        Ok(())
    }

    /// The highest total a single subject can reach under this school's
    /// configuration.
    pub fn subject_max(&self) -> f32 {
        (self.max_tests as f32) * self.test_max + self.exam.exam_max
    }

    /// Whether a user with the given role may currently write to this
    /// school's data.
    pub fn writable_by(&self, role: crate::user::Role) -> bool {
        use crate::user::Role;

        match role {
            Role::SuperAdmin => true,
            Role::SchoolAdmin => self.operations_enabled,
            Role::Teacher => self.operations_enabled && self.teacher_operations_enabled,
            Role::Student => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;
    use crate::user::Role;

    use float_cmp::approx_eq;

    #[test]
    fn term_tokens() {
        ensure_logging();

        for t in [Term::First, Term::Second, Term::Third] {
            assert_eq!(t, t.to_string().parse::<Term>().unwrap());
        }
        assert!("Fourth Term".parse::<Term>().is_err());
    }

    #[test]
    fn grade_config_ordering() {
        ensure_logging();

        assert!(GradeConfig::new(70.0, 60.0, 50.0, 40.0, 50.0).is_ok());
        // B above A.
        assert!(GradeConfig::new(70.0, 75.0, 50.0, 40.0, 50.0).is_err());
        assert!(GradeConfig::new(101.0, 60.0, 50.0, 40.0, 50.0).is_err());
        assert!(GradeConfig::new(70.0, 60.0, 50.0, -1.0, 50.0).is_err());
    }

    #[test]
    fn exam_config_validation() {
        ensure_logging();

        let mut school = School::new("kings".to_owned(), "Kings College".to_owned());
        school.validate().unwrap();

        // A hand-built (or deserialized) config doesn't get to dodge
        // the separate-mode pin.
        school.exam = ExamConfig {
            mode: ExamMode::Separate,
            objective_max: 30.0,
            theory_max: 40.0,
            exam_max: 500.0,
        };
        assert!(school.validate().is_err());
        school.exam.exam_max = 70.0;
        school.validate().unwrap();

        school.exam = ExamConfig {
            mode: ExamMode::Combined,
            objective_max: 0.0,
            theory_max: 0.0,
            exam_max: -5.0,
        };
        assert!(school.validate().is_err());
        school.exam.exam_max = 101.0;
        assert!(school.validate().is_err());
    }

    #[test]
    fn separate_exam_max_is_paper_sum() {
        ensure_logging();

        let cfg = ExamConfig::new(ExamMode::Separate, 30.0, 40.0, 99.0).unwrap();
        assert!(approx_eq!(f32, cfg.exam_max, 70.0));

        let cfg = ExamConfig::new(ExamMode::Combined, 0.0, 0.0, 60.0).unwrap();
        assert!(approx_eq!(f32, cfg.exam_max, 60.0));
    }

    #[test]
    fn school_validation() {
        ensure_logging();

        let mut school = School::new("kings".to_owned(), "Kings College".to_owned());
        school.validate().unwrap();

        school.max_tests = 6;
        assert!(school.validate().is_err());
        school.max_tests = 0;
        assert!(school.validate().is_err());
        school.max_tests = 5;
        school.validate().unwrap();

        school.id = "kings college".to_owned();
        assert!(school.validate().is_err());
    }

    #[test]
    fn toggles_gate_writes() {
        ensure_logging();

        let mut school = School::new("kings".to_owned(), "Kings College".to_owned());
        assert!(school.writable_by(Role::SchoolAdmin));
        assert!(school.writable_by(Role::Teacher));

        school.teacher_operations_enabled = false;
        assert!(school.writable_by(Role::SchoolAdmin));
        assert!(!school.writable_by(Role::Teacher));

        school.teacher_operations_enabled = true;
        school.operations_enabled = false;
        assert!(!school.writable_by(Role::SchoolAdmin));
        assert!(!school.writable_by(Role::Teacher));
        assert!(school.writable_by(Role::SuperAdmin));
    }
}
