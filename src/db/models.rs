use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Account role, resolved once at login and carried in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "parent" => Some(Role::Parent),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Child {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
}

impl Child {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Age in whole years as of `today` (floor, not rounded).
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        age_on(self.birth_date, today)
    }
}

/// Age in whole years between `birth_date` and `today`, floored.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Closed,
    Inactive,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Active => "active",
            GroupStatus::Closed => "closed",
            GroupStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<GroupStatus> {
        match value {
            "active" => Some(GroupStatus::Active),
            "closed" => Some(GroupStatus::Closed),
            "inactive" => Some(GroupStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateGroup {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: GroupStatus,
    pub vote_closing_date: Option<NaiveDate>,
}

impl DateGroup {
    /// Scheduling gate: whether this group currently accepts votes.
    ///
    /// The closing date itself is still votable; only days strictly after
    /// it are rejected.
    pub fn can_vote(&self, today: NaiveDate) -> bool {
        if self.status != GroupStatus::Active {
            return false;
        }
        match self.vote_closing_date {
            Some(closing) => today <= closing,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateOption {
    pub id: Uuid,
    pub date_group_id: Uuid,
    pub date: NaiveDate,
}

/// The three daily periods, in their fixed display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Morning,
    Lunch,
    Afternoon,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Morning, Period::Lunch, Period::Afternoon];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Lunch => "lunch",
            Period::Afternoon => "afternoon",
        }
    }

    pub fn parse(value: &str) -> Option<Period> {
        match value {
            "morning" => Some(Period::Morning),
            "lunch" => Some(Period::Lunch),
            "afternoon" => Some(Period::Afternoon),
            _ => None,
        }
    }

    pub fn label_fr(&self) -> &'static str {
        match self {
            Period::Morning => "Matin",
            Period::Lunch => "Repas",
            Period::Afternoon => "Après-midi",
        }
    }

    /// Short column heading used on the sign-in sheet.
    pub fn short_label(&self) -> &'static str {
        match self {
            Period::Morning => "M",
            Period::Lunch => "R",
            Period::Afternoon => "AM",
        }
    }

    pub fn sort_key(&self) -> usize {
        match self {
            Period::Morning => 0,
            Period::Lunch => 1,
            Period::Afternoon => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    pub date_option_id: Uuid,
    pub period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Yes,
    No,
    Maybe,
}

impl Choice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::Yes => "yes",
            Choice::No => "no",
            Choice::Maybe => "maybe",
        }
    }

    pub fn parse(value: &str) -> Option<Choice> {
        match value {
            "yes" => Some(Choice::Yes),
            "no" => Some(Choice::No),
            "maybe" => Some(Choice::Maybe),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn group(status: GroupStatus, closing: Option<NaiveDate>) -> DateGroup {
        DateGroup {
            id: Uuid::new_v4(),
            title: "Semaine de Noël".to_string(),
            description: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            status,
            vote_closing_date: closing,
        }
    }

    #[test]
    fn can_vote_requires_active_status() {
        let today = date(2025, 6, 15);
        let future = Some(date(2025, 12, 1));
        assert!(!group(GroupStatus::Closed, future).can_vote(today));
        assert!(!group(GroupStatus::Inactive, future).can_vote(today));
        assert!(!group(GroupStatus::Closed, None).can_vote(today));
    }

    #[test]
    fn can_vote_closing_date_is_inclusive() {
        let closing = date(2025, 6, 15);
        let g = group(GroupStatus::Active, Some(closing));
        assert!(g.can_vote(date(2025, 6, 14)));
        assert!(g.can_vote(closing));
        assert!(!g.can_vote(date(2025, 6, 16)));
    }

    #[test]
    fn can_vote_without_closing_date() {
        assert!(group(GroupStatus::Active, None).can_vote(date(2030, 1, 1)));
    }

    #[test]
    fn age_floors_before_birthday() {
        let child = Child {
            id: Uuid::new_v4(),
            parent_id: Uuid::new_v4(),
            first_name: "Léa".to_string(),
            last_name: "Martin".to_string(),
            birth_date: date(2020, 9, 10),
        };
        assert_eq!(child.age_on(date(2025, 9, 9)), 4);
        assert_eq!(child.age_on(date(2025, 9, 10)), 5);
        assert_eq!(child.age_on(date(2025, 9, 11)), 5);
        assert_eq!(age_on(date(2020, 2, 29), date(2025, 2, 28)), 4);
        assert_eq!(age_on(date(2020, 2, 29), date(2025, 3, 1)), 5);
    }

    #[test]
    fn periods_keep_fixed_order() {
        let keys: Vec<usize> = Period::ALL.iter().map(|p| p.sort_key()).collect();
        assert_eq!(keys, vec![0, 1, 2]);
        let shorts: Vec<&str> = Period::ALL.iter().map(|p| p.short_label()).collect();
        assert_eq!(shorts, vec!["M", "R", "AM"]);
        assert_eq!(Period::parse("lunch"), Some(Period::Lunch));
        assert_eq!(Period::parse("evening"), None);
    }

    #[test]
    fn choice_round_trips_through_str() {
        for c in [Choice::Yes, Choice::No, Choice::Maybe] {
            assert_eq!(Choice::parse(c.as_str()), Some(c));
        }
        assert_eq!(Choice::parse(""), None);
    }
}
