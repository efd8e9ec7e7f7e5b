use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin = 1,
    Manager = 2,
    Employee = 3,
    Student = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Manager),
            3 => Some(Role::Employee),
            4 => Some(Role::Student),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Admins and managers review leave, build schedules and see everyone's records
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    /// Roles a user may pick for themselves at registration
    pub fn is_self_assignable(self) -> bool {
        matches!(self, Role::Employee | Role::Student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn ids_round_trip() {
        for role in Role::iter() {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(9), None);
    }

    #[test]
    fn names_are_lowercase() {
        assert_eq!(Role::Manager.to_string(), "manager");
        assert_eq!(Role::from_str("student").unwrap(), Role::Student);
        assert!(Role::from_str("hr").is_err());
    }

    #[test]
    fn only_employee_and_student_self_register() {
        assert!(Role::Employee.is_self_assignable());
        assert!(Role::Student.is_self_assignable());
        assert!(!Role::Admin.is_self_assignable());
        assert!(!Role::Manager.is_self_assignable());
    }
}
