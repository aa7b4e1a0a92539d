use serde::{Deserialize, Serialize};

use crate::domain::{CategoryKind, GroupId, IncidentId, LogId, SelectOption, TicketId};

/// List view whose rows feed the bulk update selection.
pub const ESCALATION_VIEW_ACTION: &str = "AgentTicketEscalationView";
pub const BULK_UPDATE_ACTION: &str = "AgentEscalationViewBulkUpdate";
pub const UNLINK_TICKETS_ACTION: &str = "AgentEscalationViewUnlinkTickets";
pub const INCIDENT_FORM_ACTION: &str = "AgentIncidentForm";
pub const EBONDING_CONFIG_ACTION: &str = "AdminEBondingConfiguration";

pub const CHALLENGE_TOKEN_FIELD: &str = "ChallengeToken";

/// Parameters for loading one tier of a category cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryQuery {
    pub kind: CategoryKind,
    /// 1-based tier whose options are requested.
    pub tier: usize,
    /// Selected values of tiers `1..tier`, in order.
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionNote {
    pub ticket_id: Option<TicketId>,
    pub incident_id: Option<IncidentId>,
    pub categories: [Option<String>; 3],
    pub body: String,
}

/// Integration endpoints the admin screens can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionTarget {
    Zabbix,
    EBonding,
    ZabbixSsh,
    ProxmoxSsh,
    SyslogSsh,
}

impl ConnectionTarget {
    pub const ALL: [ConnectionTarget; 5] = [
        ConnectionTarget::Zabbix,
        ConnectionTarget::EBonding,
        ConnectionTarget::ZabbixSsh,
        ConnectionTarget::ProxmoxSsh,
        ConnectionTarget::SyslogSsh,
    ];

    pub fn action(self) -> &'static str {
        match self {
            ConnectionTarget::Zabbix => "AdminZabbixConfiguration",
            ConnectionTarget::EBonding => EBONDING_CONFIG_ACTION,
            ConnectionTarget::ZabbixSsh
            | ConnectionTarget::ProxmoxSsh
            | ConnectionTarget::SyslogSsh => "AdminApplicationLogs",
        }
    }

    pub fn subaction(self) -> &'static str {
        match self {
            ConnectionTarget::Zabbix | ConnectionTarget::EBonding => "TestConnection",
            ConnectionTarget::ZabbixSsh => "TestZabbixConnection",
            ConnectionTarget::ProxmoxSsh => "TestProxmoxConnection",
            ConnectionTarget::SyslogSsh => "TestSyslogConnection",
        }
    }

    pub fn default_success_message(self) -> &'static str {
        match self {
            ConnectionTarget::Zabbix | ConnectionTarget::EBonding => "Connection successful!",
            ConnectionTarget::ZabbixSsh => "Zabbix SSH connection successful!",
            ConnectionTarget::ProxmoxSsh => "Proxmox SSH connection successful!",
            ConnectionTarget::SyslogSsh => "Syslog SSH connection successful!",
        }
    }

    pub fn default_failure_message(self) -> &'static str {
        match self {
            ConnectionTarget::Zabbix | ConnectionTarget::EBonding => "Connection failed",
            ConnectionTarget::ZabbixSsh => "Zabbix SSH connection failed",
            ConnectionTarget::ProxmoxSsh => "Proxmox SSH connection failed",
            ConnectionTarget::SyslogSsh => "Syslog SSH connection failed",
        }
    }
}

impl std::str::FromStr for ConnectionTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "zabbix" => Ok(ConnectionTarget::Zabbix),
            "ebonding" => Ok(ConnectionTarget::EBonding),
            "zabbix-ssh" => Ok(ConnectionTarget::ZabbixSsh),
            "proxmox-ssh" => Ok(ConnectionTarget::ProxmoxSsh),
            "syslog-ssh" => Ok(ConnectionTarget::SyslogSsh),
            other => Err(format!("unknown connection target '{other}'")),
        }
    }
}

/// Every call the controllers make against the backend dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    BulkUpdateTicket { ticket_id: TicketId },
    UnlinkTickets { ticket_ids: Vec<TicketId> },
    LoadCategories(CategoryQuery),
    LoadAssignedUsers { group_id: GroupId },
    AutoSave { fields: Vec<(String, String)> },
    SubmitToServiceNow { incident_id: IncidentId },
    AddResolutionNote(ResolutionNote),
    TestConnection(ConnectionTarget),
    /// eBonding API call history; `filter` is a period such as `7d`.
    LoadApiLogs { filter: String },
    GetLogDetails { log_id: LogId },
}

impl BackendRequest {
    pub fn action(&self) -> &'static str {
        match self {
            BackendRequest::BulkUpdateTicket { .. } => BULK_UPDATE_ACTION,
            BackendRequest::UnlinkTickets { .. } => UNLINK_TICKETS_ACTION,
            BackendRequest::LoadCategories(_)
            | BackendRequest::LoadAssignedUsers { .. }
            | BackendRequest::AutoSave { .. }
            | BackendRequest::SubmitToServiceNow { .. }
            | BackendRequest::AddResolutionNote(_) => INCIDENT_FORM_ACTION,
            BackendRequest::TestConnection(target) => target.action(),
            BackendRequest::LoadApiLogs { .. } | BackendRequest::GetLogDetails { .. } => {
                EBONDING_CONFIG_ACTION
            }
        }
    }

    pub fn subaction(&self) -> Option<&'static str> {
        match self {
            BackendRequest::BulkUpdateTicket { .. } | BackendRequest::UnlinkTickets { .. } => None,
            BackendRequest::LoadCategories(_) => Some("LoadCategories"),
            BackendRequest::LoadAssignedUsers { .. } => Some("LoadAssignedUsers"),
            BackendRequest::AutoSave { .. } => Some("AutoSave"),
            BackendRequest::SubmitToServiceNow { .. } => Some("SubmitToServiceNow"),
            BackendRequest::AddResolutionNote(_) => Some("AddResolutionNote"),
            BackendRequest::TestConnection(target) => Some(target.subaction()),
            BackendRequest::LoadApiLogs { .. } => Some("LoadAPILogs"),
            BackendRequest::GetLogDetails { .. } => Some("GetLogDetails"),
        }
    }

    /// Requests that change server state and must carry the challenge token.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            BackendRequest::LoadCategories(_)
                | BackendRequest::LoadAssignedUsers { .. }
                | BackendRequest::LoadApiLogs { .. }
                | BackendRequest::GetLogDetails { .. }
        )
    }

    /// Form-encoded body, `Action` and `Subaction` first.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("Action".to_string(), self.action().to_string())];
        if let Some(subaction) = self.subaction() {
            fields.push(("Subaction".to_string(), subaction.to_string()));
        }

        let mut push = |key: &str, value: String| fields.push((key.to_string(), value));
        match self {
            BackendRequest::BulkUpdateTicket { ticket_id } => {
                push("TicketID", ticket_id.to_string());
            }
            BackendRequest::UnlinkTickets { ticket_ids } => {
                let joined = ticket_ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                push("TicketIDs", joined);
            }
            BackendRequest::LoadCategories(query) => {
                push("Type", query.kind.wire_name().to_string());
                push("Tier", query.tier.to_string());
                for (index, parent) in query.parents.iter().enumerate() {
                    if !parent.is_empty() {
                        push(&format!("Tier{}", index + 1), parent.clone());
                    }
                }
            }
            BackendRequest::LoadAssignedUsers { group_id } => {
                push("GroupID", group_id.to_string());
            }
            BackendRequest::AutoSave { fields: form } => {
                for (key, value) in form {
                    if key == "Action" || key == "Subaction" || key == "AutoSave" {
                        continue;
                    }
                    push(key, value.clone());
                }
                push("AutoSave", "1".to_string());
            }
            BackendRequest::SubmitToServiceNow { incident_id } => {
                push("IncidentID", incident_id.to_string());
            }
            BackendRequest::AddResolutionNote(note) => {
                push(
                    "TicketID",
                    note.ticket_id.map(|id| id.to_string()).unwrap_or_default(),
                );
                push(
                    "IncidentID",
                    note.incident_id.map(|id| id.to_string()).unwrap_or_default(),
                );
                for (index, category) in note.categories.iter().enumerate() {
                    push(
                        &format!("ResolutionCat{}", index + 1),
                        category.clone().unwrap_or_default(),
                    );
                }
                push("ResolutionNotes", note.body.clone());
            }
            BackendRequest::TestConnection(_) => {}
            BackendRequest::LoadApiLogs { filter } => {
                push("Filter", filter.clone());
            }
            BackendRequest::GetLogDetails { log_id } => {
                push("LogID", log_id.to_string());
            }
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUpdateResponse {
    #[serde(default, alias = "Success", deserialize_with = "lenient::flag")]
    pub success: bool,
    #[serde(
        rename = "ticketID",
        default,
        deserialize_with = "lenient::opt_ticket_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub ticket_id: Option<TicketId>,
    #[serde(
        rename = "ticketNumber",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub ticket_number: Option<String>,
    #[serde(
        rename = "ticketTitle",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub ticket_title: Option<String>,
    #[serde(
        default,
        alias = "Message",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkResponse {
    #[serde(default, alias = "Success", deserialize_with = "lenient::flag")]
    pub success: bool,
    #[serde(rename = "unlinkedCount", default, deserialize_with = "lenient::count")]
    pub unlinked_count: u64,
    #[serde(
        default,
        alias = "Message",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesResponse {
    #[serde(rename = "Categories", default)]
    pub categories: Vec<SelectOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersResponse {
    #[serde(rename = "Users", default)]
    pub users: Vec<SelectOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveResponse {
    #[serde(
        rename = "Success",
        default,
        alias = "success",
        deserialize_with = "lenient::flag"
    )]
    pub success: bool,
    #[serde(
        rename = "Message",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
    #[serde(
        rename = "LastModified",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNowResponse {
    #[serde(
        rename = "Success",
        default,
        alias = "success",
        deserialize_with = "lenient::flag"
    )]
    pub success: bool,
    #[serde(
        rename = "MSITicketNumber",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub msi_ticket_number: Option<String>,
    #[serde(
        rename = "Message",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
}

/// Plain success/message envelope used by notes and connection checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(
        rename = "Success",
        default,
        alias = "success",
        deserialize_with = "lenient::flag"
    )]
    pub success: bool,
    #[serde(
        rename = "Message",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
    #[serde(
        rename = "ErrorMessage",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

impl StatusResponse {
    /// `Message`, falling back to `ErrorMessage`; blank strings count as absent.
    pub fn best_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.error_message.as_deref().filter(|m| !m.is_empty()))
    }
}

/// One row of the eBonding API call history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLogEntry {
    #[serde(rename = "ID", default, deserialize_with = "lenient::log_id")]
    pub id: LogId,
    #[serde(rename = "CreateTime", default, deserialize_with = "lenient::opt_string")]
    pub create_time: Option<String>,
    #[serde(rename = "IncidentNumber", default, deserialize_with = "lenient::opt_string")]
    pub incident_number: Option<String>,
    #[serde(rename = "Success", default, deserialize_with = "lenient::flag")]
    pub success: bool,
    #[serde(
        rename = "MSITicketNumber",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub msi_ticket_number: Option<String>,
    #[serde(
        rename = "ErrorMessage",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLogsResponse {
    #[serde(
        rename = "Success",
        default,
        alias = "success",
        deserialize_with = "lenient::flag"
    )]
    pub success: bool,
    #[serde(rename = "Logs", default, deserialize_with = "lenient::list")]
    pub logs: Vec<ApiLogEntry>,
    #[serde(
        rename = "Message",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
}

/// Raw request/response bodies exchanged with ServiceNow for one log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDetailsResponse {
    #[serde(
        rename = "Success",
        default,
        alias = "success",
        deserialize_with = "lenient::flag"
    )]
    pub success: bool,
    #[serde(
        rename = "RequestPayload",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_payload: Option<String>,
    #[serde(
        rename = "ResponsePayload",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_payload: Option<String>,
}

/// Deserializers for backends that mix numbers, strings and nulls freely.
pub mod lenient {
    use serde::{de::DeserializeOwned, Deserialize, Deserializer};
    use serde_json::Value;

    use crate::domain::{LogId, TicketId};

    fn scalar_to_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(scalar_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(scalar_to_string(Value::deserialize(deserializer)?))
    }

    pub fn opt_ticket_id<'de, D>(deserializer: D) -> Result<Option<TicketId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_i64().map(TicketId),
            Value::String(s) => s.trim().parse::<i64>().ok().map(TicketId),
            _ => None,
        })
    }

    pub fn log_id<'de, D>(deserializer: D) -> Result<LogId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_i64().map(LogId).unwrap_or_default(),
            Value::String(s) => s.parse::<LogId>().unwrap_or_default(),
            _ => LogId::default(),
        })
    }

    /// `null` or a missing array reads as empty; entries that do not decode
    /// are skipped.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Accepts `true`, non-zero numbers and `"1"`/`"true"` strings.
    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => matches!(s.trim(), "1" | "true" | "True"),
            _ => false,
        })
    }

    pub fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_u64().unwrap_or_default(),
            Value::String(s) => s.trim().parse::<u64>().unwrap_or_default(),
            _ => 0,
        })
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
