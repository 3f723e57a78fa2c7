/*!
Account types.

Every person who can log in has a row in the `users` table; teachers
carry some extra data in their own table. Student *records* (names,
subjects, scores) live in [`crate::student`]; the `Student` variant here
is only the login account attached to such a record (its uname is the
student's ID string).
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    SuperAdmin,
    SchoolAdmin,
    Teacher,
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::SuperAdmin  => "super_admin",
            Role::SchoolAdmin => "school_admin",
            Role::Teacher     => "teacher",
            Role::Student     => "student",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin"  => Ok(Role::SuperAdmin),
            "school_admin" => Ok(Role::SchoolAdmin),
            "teacher"      => Ok(Role::Teacher),
            "student"      => Ok(Role::Student),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BaseUser {
    pub uname: String,
    pub role: Role,
    pub salt: String,
    pub email: String,
    /// `None` only for super admins, who belong to no school.
    pub school: Option<String>,
}

impl BaseUser {
    pub fn into_super_admin(self) -> User { User::SuperAdmin(self) }
    pub fn into_school_admin(self) -> User { User::SchoolAdmin(self) }
    pub fn into_teacher(self, name: String, classes: Vec<String>) -> User {
        User::Teacher(Teacher { base: self, name, classes })
    }
    pub fn into_student(self) -> User { User::Student(self) }
}

#[derive(Clone, Debug)]
pub struct Teacher {
    pub base: BaseUser,
    /// Display name, e.g. "Mr Okafor".
    pub name: String,
    /// Classes this teacher is assigned to teach.
    pub classes: Vec<String>,
}

impl Teacher {
    pub fn teaches(&self, classname: &str) -> bool {
        self.classes.iter().any(|c| c == classname)
    }
}

#[derive(Clone, Debug)]
pub enum User {
    SuperAdmin(BaseUser),
    SchoolAdmin(BaseUser),
    Teacher(Teacher),
    Student(BaseUser),
}

impl User {
    pub fn uname(&self) -> &str {
        match self {
            User::SuperAdmin(base) => &base.uname,
            User::SchoolAdmin(base) => &base.uname,
            User::Teacher(t) => &t.base.uname,
            User::Student(base) => &base.uname,
        }
    }

    pub fn salt(&self) -> &str {
        match self {
            User::SuperAdmin(base) => &base.salt,
            User::SchoolAdmin(base) => &base.salt,
            User::Teacher(t) => &t.base.salt,
            User::Student(base) => &base.salt,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            User::SuperAdmin(base) => &base.email,
            User::SchoolAdmin(base) => &base.email,
            User::Teacher(t) => &t.base.email,
            User::Student(base) => &base.email,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            User::SuperAdmin(_) => Role::SuperAdmin,
            User::SchoolAdmin(_) => Role::SchoolAdmin,
            User::Teacher(_) => Role::Teacher,
            User::Student(_) => Role::Student,
        }
    }

    /// The school this user belongs to, if any.
    pub fn school(&self) -> Option<&str> {
        match self {
            User::SuperAdmin(base) => base.school.as_deref(),
            User::SchoolAdmin(base) => base.school.as_deref(),
            User::Teacher(t) => t.base.school.as_deref(),
            User::Student(base) => base.school.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[test]
    fn role_tokens_round_trip() {
        ensure_logging();

        for role in [Role::SuperAdmin, Role::SchoolAdmin, Role::Teacher, Role::Student] {
            let token = role.to_string();
            let parsed: Role = token.parse().unwrap();
            assert_eq!(role, parsed);
        }

        assert!("principal".parse::<Role>().is_err());
        assert!("Teacher".parse::<Role>().is_err());
    }

    #[test]
    fn teacher_class_assignment() {
        ensure_logging();

        let base = BaseUser {
            uname: "okafor".to_owned(),
            role: Role::Teacher,
            salt: "abcd".to_owned(),
            email: "okafor@school.example".to_owned(),
            school: Some("kings".to_owned()),
        };
        let u = base.into_teacher(
            "Mr Okafor".to_owned(),
            vec!["JSS1".to_owned(), "JSS2".to_owned()],
        );

        match u {
            User::Teacher(ref t) => {
                assert!(t.teaches("JSS1"));
                assert!(!t.teaches("SS1"));
            },
            ref x => panic!("expected Teacher, got {:?}", x),
        }
        assert_eq!(u.school(), Some("kings"));
    }
}
