use serde::Serialize;

use crate::error::{Error, Result};

/// Advisor role, as recorded in the advisor directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Admin,
    TeamLead,
    Junior,
}

impl Role {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "admin" => Ok(Role::Admin),
            "team lead" | "teamlead" => Ok(Role::TeamLead),
            "junior" => Ok(Role::Junior),
            other => Err(Error::InvalidRole(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::TeamLead => "Team Lead",
            Role::Junior => "Junior",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of the advisor directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisor {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    /// The team lead this advisor reports to, if any.
    pub team_lead_id: Option<String>,
}

/// What the report selector asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSelection {
    /// The current user's own numbers.
    Personal,
    /// Everyone the current user can see, summed.
    Team,
    /// One specific advisor the current user can see.
    Advisor(String),
}

/// Advisor ids visible to `current` as a team.
fn team_members(current: &Advisor, directory: &[Advisor]) -> Vec<String> {
    match current.role {
        Role::Admin => {
            let mut ids: Vec<String> = directory.iter().map(|a| a.id.clone()).collect();
            if !ids.contains(&current.id) {
                ids.push(current.id.clone());
            }
            ids
        }
        Role::TeamLead => {
            let mut ids = vec![current.id.clone()];
            ids.extend(
                directory
                    .iter()
                    .filter(|a| a.team_lead_id.as_deref() == Some(current.id.as_str()))
                    .filter(|a| a.id != current.id)
                    .map(|a| a.id.clone()),
            );
            ids
        }
        Role::Junior => vec![current.id.clone()],
    }
}

/// Turn the current user and a selection into the advisor ids a report
/// should fetch.
pub fn resolve_scope(
    current: &Advisor,
    directory: &[Advisor],
    selection: &ScopeSelection,
) -> Result<Vec<String>> {
    match selection {
        ScopeSelection::Personal => Ok(vec![current.id.clone()]),
        ScopeSelection::Team => Ok(team_members(current, directory)),
        ScopeSelection::Advisor(id) => {
            if team_members(current, directory).contains(id) {
                Ok(vec![id.clone()])
            } else {
                Err(Error::Forbidden(format!(
                    "{} cannot view reports for advisor {id}",
                    current.id
                )))
            }
        }
    }
}

/// Whether `editor` may change goals for `target_id`.
pub fn can_edit_goals(editor: &Advisor, target_id: &str, directory: &[Advisor]) -> bool {
    match editor.role {
        Role::Admin => true,
        Role::TeamLead => team_members(editor, directory).iter().any(|id| id == target_id),
        Role::Junior => false,
    }
}
