//! Assignee filtering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TimelineItem;
use crate::model::UserId;

/// Which items a timeline shows by assignee.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeFilter {
    /// Everything.
    #[default]
    All,
    /// Items with neither a single assignee nor any multi-assignee.
    Unassigned,
    /// Items naming this user in either field.
    User(UserId),
}

fn present(id: &UserId) -> bool {
    !id.as_str().trim().is_empty()
}

impl AssigneeFilter {
    #[must_use]
    pub fn matches(&self, assignee: Option<&UserId>, assignees: &[UserId]) -> bool {
        match self {
            AssigneeFilter::All => true,
            AssigneeFilter::Unassigned => {
                assignee.map_or(true, |a| !present(a)) && !assignees.iter().any(present)
            }
            AssigneeFilter::User(user) => {
                assignee == Some(user) || assignees.iter().any(|a| a == user)
            }
        }
    }

    #[must_use]
    pub fn matches_item(&self, item: &TimelineItem) -> bool {
        self.matches(item.assignee.as_ref(), &item.assignees)
    }
}

impl fmt::Display for AssigneeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssigneeFilter::All => f.write_str("all"),
            AssigneeFilter::Unassigned => f.write_str("unassigned"),
            AssigneeFilter::User(user) => write!(f, "{}", user),
        }
    }
}

impl FromStr for AssigneeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("assignee filter cannot be empty".to_string()),
            "all" => Ok(AssigneeFilter::All),
            "unassigned" => Ok(AssigneeFilter::Unassigned),
            user => Ok(AssigneeFilter::User(UserId::new(user))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn test_all_matches_everything() {
        assert!(AssigneeFilter::All.matches(None, &[]));
        assert!(AssigneeFilter::All.matches(Some(&u("alice")), &[u("bob")]));
    }

    #[test]
    fn test_unassigned() {
        let f = AssigneeFilter::Unassigned;
        assert!(f.matches(None, &[]));
        assert!(f.matches(Some(&u("")), &[u("  ")]));
        assert!(!f.matches(Some(&u("alice")), &[]));
        assert!(!f.matches(None, &[u("bob")]));
    }

    #[test]
    fn test_specific_user_in_either_field() {
        let f = AssigneeFilter::User(u("alice"));
        assert!(f.matches(Some(&u("alice")), &[]));
        assert!(f.matches(None, &[u("bob"), u("alice")]));
        assert!(f.matches(Some(&u("bob")), &[u("alice")]));
        assert!(!f.matches(Some(&u("bob")), &[u("carol")]));
        assert!(!f.matches(None, &[]));
    }

    #[test]
    fn test_parse() {
        assert_eq!("all".parse::<AssigneeFilter>().unwrap(), AssigneeFilter::All);
        assert_eq!(
            " unassigned ".parse::<AssigneeFilter>().unwrap(),
            AssigneeFilter::Unassigned
        );
        assert_eq!(
            "alice".parse::<AssigneeFilter>().unwrap(),
            AssigneeFilter::User(u("alice"))
        );
        assert!("".parse::<AssigneeFilter>().is_err());
    }
}
