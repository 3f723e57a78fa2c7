/*!
Grade computation and class ranking.

All the arithmetic here is pure; the store hands in `Student` records
and the school's configuration, and gets back derived numbers. Nothing
in this module touches the database.
*/
use serde::Serialize;

use crate::school::{GradeConfig, School};
use crate::student::Student;

/// Two totals closer than this count as tied for ranking.
const SCORE_EPSILON: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            _ => Err(format!("{:?} is not a valid Grade.", s)),
        }
    }
}

pub fn letter(average: f32, cfg: &GradeConfig) -> Grade {
    if average >= cfg.a_min {
        Grade::A
    } else if average >= cfg.b_min {
        Grade::B
    } else if average >= cfg.c_min {
        Grade::C
    } else if average >= cfg.d_min {
        Grade::D
    } else {
        Grade::F
    }
}

pub fn passed(average: f32, cfg: &GradeConfig) -> bool {
    average >= cfg.pass_mark
}

/// A student's derived numbers for one term.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Tally {
    /// Sum of all subject totals.
    pub total: f32,
    /// Mean subject total, over *assigned* subjects; an assigned
    /// subject with no score entry counts as zero.
    pub average: f32,
    /// `total` as a percentage of the attainable maximum.
    pub percent: f32,
    pub grade: Grade,
    pub passed: bool,
}

pub fn tally(stud: &Student, school: &School) -> Tally {
    let n_subjects = stud.subjects.len();

    let total: f32 = stud.subjects.iter()
        .map(|subject| match stud.scores.get(subject) {
            Some(entry) => entry.total(),
            None => 0.0,
        })
        .sum();

    let average = if n_subjects > 0 {
        total / (n_subjects as f32)
    } else {
        0.0
    };

    let attainable = (n_subjects as f32) * school.subject_max();
    let percent = if attainable > 0.0 {
        100.0 * total / attainable
    } else {
        0.0
    };

    Tally {
        total,
        average,
        percent,
        grade: letter(average, &school.grades),
        passed: passed(average, &school.grades),
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Ranked {
    pub student_id: String,
    pub firstname: String,
    pub total: f32,
    pub average: f32,
    pub percent: f32,
    pub grade: Grade,
    pub passed: bool,
    /// 1-based class position; tied totals share a position.
    pub position: usize,
}

fn same_score(a: f32, b: f32) -> bool {
    (a - b).abs() <= SCORE_EPSILON
}

/**
Rank one class's students.

Ordering is total descending with ties broken by student ID ascending,
so repeated runs over the same data always produce the same sequence.
Students whose totals are (approximately) equal share a position
number; the next distinct total resumes at its ordinal index.
*/
pub fn rank_class(students: &[Student], school: &School) -> Vec<Ranked> {
    log::trace!(
        "rank_class( [ {} students ], {:?} ) called.",
        students.len(), &school.id
    );

    let mut ranked: Vec<Ranked> = students.iter()
        .map(|stud| {
            let t = tally(stud, school);
            Ranked {
                student_id: stud.id.clone(),
                firstname: stud.firstname.clone(),
                total: t.total,
                average: t.average,
                percent: t.percent,
                grade: t.grade,
                passed: t.passed,
                position: 0,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total.partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let mut prev_total = f32::INFINITY;
    let mut prev_position = 0_usize;
    for (n, r) in ranked.iter_mut().enumerate() {
        if n > 0 && same_score(r.total, prev_total) {
            r.position = prev_position;
        } else {
            r.position = n + 1;
            prev_position = n + 1;
        }
        prev_total = r.total;
    }

    ranked
}

/// Ordinal rendering for positions: 1 -> "1st", 12 -> "12th".
pub fn ordinal(n: usize) -> String {
    let suffix = if (11..=13).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };

    format!("{}{}", n, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::school::Term;
    use crate::student::SubjectScores;
    use crate::tests::ensure_logging;

    use std::collections::HashMap;

    use float_cmp::approx_eq;

    fn test_school() -> School {
        School::new("kings".to_owned(), "Kings College".to_owned())
    }

    fn stud(id: &str, subject_totals: &[(&str, f32)]) -> Student {
        let mut subjects = Vec::new();
        let mut scores = HashMap::new();
        for (name, total) in subject_totals {
            subjects.push(name.to_string());
            scores.insert(
                name.to_string(),
                SubjectScores {
                    tests: vec![],
                    objective: None,
                    theory: None,
                    exam: *total,
                },
            );
        }

        Student {
            school: "kings".to_owned(),
            id: id.to_owned(),
            firstname: "X".to_owned(),
            classname: "JSS1".to_owned(),
            term: Term::First,
            subjects,
            scores,
            comment: String::new(),
        }
    }

    #[test]
    fn letter_thresholds_are_inclusive() {
        ensure_logging();
        let cfg = GradeConfig::default();

        assert_eq!(letter(70.0, &cfg), Grade::A);
        assert_eq!(letter(69.99, &cfg), Grade::B);
        assert_eq!(letter(60.0, &cfg), Grade::B);
        assert_eq!(letter(50.0, &cfg), Grade::C);
        assert_eq!(letter(40.0, &cfg), Grade::D);
        assert_eq!(letter(39.9, &cfg), Grade::F);
        assert_eq!(letter(0.0, &cfg), Grade::F);

        assert!(passed(50.0, &cfg));
        assert!(!passed(49.9, &cfg));
    }

    #[test]
    fn missing_subject_counts_as_zero() {
        ensure_logging();
        let school = test_school();

        // Two subjects assigned, one scored.
        let mut s = stud("26/001/JSS1", &[("Maths", 80.0)]);
        s.subjects.push("English".to_owned());

        let t = tally(&s, &school);
        assert!(approx_eq!(f32, t.total, 80.0));
        assert!(approx_eq!(f32, t.average, 40.0));
        assert_eq!(t.grade, Grade::D);
        assert!(!t.passed);
    }

    #[test]
    fn tally_of_no_subjects_is_zero() {
        ensure_logging();

        let t = tally(&stud("26/001/JSS1", &[]), &test_school());
        assert!(approx_eq!(f32, t.total, 0.0));
        assert!(approx_eq!(f32, t.average, 0.0));
        assert!(approx_eq!(f32, t.percent, 0.0));
        assert_eq!(t.grade, Grade::F);
    }

    #[test]
    fn ranking_orders_and_breaks_ties_by_id() {
        ensure_logging();
        let school = test_school();

        let students = vec![
            stud("26/003/JSS1", &[("Maths", 50.0)]),
            stud("26/001/JSS1", &[("Maths", 50.0)]),
            stud("26/002/JSS1", &[("Maths", 90.0)]),
            stud("26/004/JSS1", &[("Maths", 10.0)]),
        ];

        let ranked = rank_class(&students, &school);
        let order: Vec<&str> = ranked.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(
            order,
            vec!["26/002/JSS1", "26/001/JSS1", "26/003/JSS1", "26/004/JSS1"]
        );

        // Tied totals share a position; next distinct total resumes at
        // its ordinal index.
        let positions: Vec<usize> = ranked.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 2, 4]);

        // Stable across repeated runs.
        let again = rank_class(&students, &school);
        let order_again: Vec<&str> = again.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(order, order_again);
    }

    #[test]
    fn ordinals() {
        ensure_logging();

        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(102), "102nd");
    }
}
