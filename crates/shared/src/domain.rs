use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map($name)
            }
        }
    };
}

id_newtype!(TicketId);
id_newtype!(IncidentId);
id_newtype!(GroupId);
id_newtype!(LogId);

/// Incident lifecycle states as the backend labels them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    New,
    Assigned,
    InProgress,
    Pending,
    Resolved,
    Closed,
    ClosedSuccessful,
    Cancelled,
}

impl IncidentState {
    pub const ALL: [IncidentState; 8] = [
        IncidentState::New,
        IncidentState::Assigned,
        IncidentState::InProgress,
        IncidentState::Pending,
        IncidentState::Resolved,
        IncidentState::Closed,
        IncidentState::ClosedSuccessful,
        IncidentState::Cancelled,
    ];

    /// Lowercase form used for matching and as the option value.
    pub fn value(self) -> &'static str {
        match self {
            IncidentState::New => "new",
            IncidentState::Assigned => "assigned",
            IncidentState::InProgress => "in progress",
            IncidentState::Pending => "pending",
            IncidentState::Resolved => "resolved",
            IncidentState::Closed => "closed",
            IncidentState::ClosedSuccessful => "closed successful",
            IncidentState::Cancelled => "cancelled",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IncidentState::New => "New",
            IncidentState::Assigned => "Assigned",
            IncidentState::InProgress => "In Progress",
            IncidentState::Pending => "Pending",
            IncidentState::Resolved => "Resolved",
            IncidentState::Closed => "Closed",
            IncidentState::ClosedSuccessful => "Closed Successful",
            IncidentState::Cancelled => "Cancelled",
        }
    }

    /// Matches a display label by trimmed, case-insensitive text.
    pub fn from_label(text: &str) -> Option<Self> {
        let normalized = text.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.value() == normalized)
    }

    /// Closed, closed successful and cancelled incidents can no longer move.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IncidentState::Closed | IncidentState::ClosedSuccessful | IncidentState::Cancelled
        )
    }
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for IncidentState {
    type Err = UnknownIncidentState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownIncidentState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown incident state '{0}'")]
pub struct UnknownIncidentState(pub String);

/// The three independent category cascades on the incident form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Product,
    Operational,
    Resolution,
}

impl CategoryKind {
    pub fn tier_count(self) -> usize {
        match self {
            CategoryKind::Product => 4,
            CategoryKind::Operational | CategoryKind::Resolution => 3,
        }
    }

    /// Value of the `Type` field the backend expects.
    pub fn wire_name(self) -> &'static str {
        match self {
            CategoryKind::Product => "Product",
            CategoryKind::Operational => "operational",
            CategoryKind::Resolution => "resolution",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CategoryKind::Product => "product",
            CategoryKind::Operational => "operational",
            CategoryKind::Resolution => "resolution",
        }
    }
}

impl FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" => Ok(CategoryKind::Product),
            "operational" => Ok(CategoryKind::Operational),
            "resolution" => Ok(CategoryKind::Resolution),
            other => Err(format!("unknown category kind '{other}'")),
        }
    }
}

/// One `{ID, Name}` entry of a backend-supplied option list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    #[serde(rename = "ID", deserialize_with = "crate::protocol::lenient::string")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

impl SelectOption {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
