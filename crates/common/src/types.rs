use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport family a job is delivered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Channel {
    Push,
    Email,
    InApp,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Push => write!(f, "push"),
            Channel::Email => write!(f, "email"),
            Channel::InApp => write!(f, "in_app"),
        }
    }
}

/// Kind of audience a broadcast targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    All,
    Role,
    Region,
    User,
    CustomList,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetType::All => write!(f, "all"),
            TargetType::Role => write!(f, "role"),
            TargetType::Region => write!(f, "region"),
            TargetType::User => write!(f, "user"),
            TargetType::CustomList => write!(f, "custom_list"),
        }
    }
}

/// One entry of a hand-supplied recipient list.
///
/// Accepts either a bare address string or an object carrying a display name,
/// so the output of a roster import can be posted back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListEntry {
    Address(String),
    Recipient {
        address: String,
        #[serde(default)]
        display_name: Option<String>,
    },
}

impl ListEntry {
    pub fn address(&self) -> &str {
        match self {
            ListEntry::Address(address) => address,
            ListEntry::Recipient { address, .. } => address,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            ListEntry::Address(_) => None,
            ListEntry::Recipient { display_name, .. } => display_name.as_deref(),
        }
    }
}

/// Declarative description of who a broadcast should reach.
///
/// `target_value` is meaningful only for role, region and user targets;
/// custom lists carry `explicit_list` instead. `role_scope` is the role the
/// console had selected alongside a region target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceSpecification {
    pub target_type: TargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_list: Option<Vec<ListEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_scope: Option<String>,
}

impl AudienceSpecification {
    pub fn all() -> Self {
        Self::targeting(TargetType::All, None)
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self::targeting(TargetType::Role, Some(role.into()))
    }

    pub fn region(region: impl Into<String>) -> Self {
        Self::targeting(TargetType::Region, Some(region.into()))
    }

    pub fn user(key: impl Into<String>) -> Self {
        Self::targeting(TargetType::User, Some(key.into()))
    }

    pub fn custom_list(entries: Vec<ListEntry>) -> Self {
        Self {
            target_type: TargetType::CustomList,
            target_value: None,
            explicit_list: Some(entries),
            role_scope: None,
        }
    }

    /// Scope a region target to the role currently selected next to it.
    pub fn with_role_scope(mut self, role: impl Into<String>) -> Self {
        self.role_scope = Some(role.into());
        self
    }

    fn targeting(target_type: TargetType, target_value: Option<String>) -> Self {
        Self {
            target_type,
            target_value,
            explicit_list: None,
            role_scope: None,
        }
    }
}

/// A member of the organization as known to the directory.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: String,
    pub email: Option<String>,
    pub push_token: Option<String>,
    pub display_name: String,
    pub role: Option<String>,
    pub region: Option<String>,
    pub active: bool,
}

impl Member {
    /// The address this member is reachable at on `channel`, if any.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Push => self.push_token.as_deref(),
            Channel::InApp => Some(self.id.as_str()),
        }
    }
}

/// One addressable destination for a single channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub address: String,
    pub display_name: String,
}

impl Recipient {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            display_name: display_name.into(),
        }
    }
}

/// Message content handed to the transport untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Channel-specific extras (deep links, template variables, ...)
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Payload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }
}

/// Lifecycle of a broadcast job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum JobStatus {
    Draft,
    Queued,
    Sending,
    Completed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Draft => write!(f, "draft"),
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Sending => write!(f, "sending"),
            JobStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Delivery status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum AttemptStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Failed,
    Bounced,
    Cancelled,
}

impl AttemptStatus {
    /// Compact encoding used by the store's atomic status cells.
    pub fn as_u8(self) -> u8 {
        match self {
            AttemptStatus::Queued => 0,
            AttemptStatus::Sending => 1,
            AttemptStatus::Sent => 2,
            AttemptStatus::Delivered => 3,
            AttemptStatus::Failed => 4,
            AttemptStatus::Bounced => 5,
            AttemptStatus::Cancelled => 6,
        }
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(AttemptStatus::Queued),
            1 => Some(AttemptStatus::Sending),
            2 => Some(AttemptStatus::Sent),
            3 => Some(AttemptStatus::Delivered),
            4 => Some(AttemptStatus::Failed),
            5 => Some(AttemptStatus::Bounced),
            6 => Some(AttemptStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether a worker is done with this attempt.
    ///
    /// `Sent` counts as settled: only a delivery receipt may refine it further.
    pub fn is_settled(self) -> bool {
        !matches!(self, AttemptStatus::Queued | AttemptStatus::Sending)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::Queued => write!(f, "queued"),
            AttemptStatus::Sending => write!(f, "sending"),
            AttemptStatus::Sent => write!(f, "sent"),
            AttemptStatus::Delivered => write!(f, "delivered"),
            AttemptStatus::Failed => write!(f, "failed"),
            AttemptStatus::Bounced => write!(f, "bounced"),
            AttemptStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One requested broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub audience: AudienceSpecification,
    pub payload: Payload,
    pub channel: Channel,
    pub status: JobStatus,
}

impl DeliveryJob {
    pub fn draft(
        audience: AudienceSpecification,
        payload: Payload,
        channel: Channel,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            scheduled_at,
            audience,
            payload,
            channel,
            status: JobStatus::Draft,
        }
    }
}

/// Record of one send try to one recipient for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub job_id: Uuid,
    pub recipient: Recipient,
    pub status: AttemptStatus,
    pub attempted_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DeliveryAttempt {
    pub fn queued(job_id: Uuid, recipient: Recipient) -> Self {
        Self {
            job_id,
            recipient,
            status: AttemptStatus::Queued,
            attempted_at: None,
            error: None,
        }
    }
}

/// Live per-job delivery counts. Always derived from attempts, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: u64,
    pub queued: u64,
    pub sending: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub bounced: u64,
    pub cancelled: u64,
}

impl JobStats {
    pub fn record(&mut self, status: AttemptStatus) {
        self.total += 1;
        match status {
            AttemptStatus::Queued => self.queued += 1,
            AttemptStatus::Sending => self.sending += 1,
            AttemptStatus::Sent => self.sent += 1,
            AttemptStatus::Delivered => self.delivered += 1,
            AttemptStatus::Failed => self.failed += 1,
            AttemptStatus::Bounced => self.bounced += 1,
            AttemptStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn merge(&mut self, other: &JobStats) {
        self.total += other.total;
        self.queued += other.queued;
        self.sending += other.sending;
        self.sent += other.sent;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.bounced += other.bounced;
        self.cancelled += other.cancelled;
    }

    /// Job status implied by these counts.
    pub fn job_status(&self) -> JobStatus {
        if self.queued == 0 && self.sending == 0 {
            JobStatus::Completed
        } else if self.queued == self.total {
            JobStatus::Queued
        } else {
            JobStatus::Sending
        }
    }
}

/// Queue-wide totals for the console's activity indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub jobs: u64,
    pub attempts: JobStats,
    /// True while at least one transport call is in flight.
    pub processing: bool,
}

/// Listing row for a job, with its live counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub channel: Channel,
    pub status: JobStatus,
    pub target_type: TargetType,
    pub title: String,
    pub stats: JobStats,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_status_u8_round_trip() {
        for raw in 0..7u8 {
            let status = AttemptStatus::from_u8(raw).unwrap();
            assert_eq!(status.as_u8(), raw);
        }
        assert_eq!(AttemptStatus::from_u8(7), None);
    }

    #[test]
    fn test_job_status_from_stats() {
        let mut stats = JobStats::default();
        stats.record(AttemptStatus::Queued);
        stats.record(AttemptStatus::Queued);
        assert_eq!(stats.job_status(), JobStatus::Queued);

        stats.record(AttemptStatus::Sent);
        assert_eq!(stats.job_status(), JobStatus::Sending);

        let mut done = JobStats::default();
        done.record(AttemptStatus::Failed);
        done.record(AttemptStatus::Cancelled);
        assert_eq!(done.job_status(), JobStatus::Completed);
    }

    #[test]
    fn test_list_entry_accepts_both_shapes() {
        let entries: Vec<ListEntry> = serde_json::from_value(serde_json::json!([
            "a@x.com",
            {"address": "b@x.com", "display_name": "Bee"}
        ]))
        .unwrap();
        assert_eq!(entries[0].address(), "a@x.com");
        assert_eq!(entries[0].display_name(), None);
        assert_eq!(entries[1].address(), "b@x.com");
        assert_eq!(entries[1].display_name(), Some("Bee"));
    }

    #[test]
    fn test_channel_serializes_snake_case() {
        let value = serde_json::to_value(Channel::InApp).unwrap();
        assert_eq!(value, serde_json::json!("in_app"));
        assert_eq!(Channel::InApp.to_string(), "in_app");
    }

    #[test]
    fn test_member_address_for_channel() {
        let member = Member {
            id: "m1".to_string(),
            email: Some("m1@x.com".to_string()),
            push_token: None,
            display_name: "M One".to_string(),
            role: None,
            region: None,
            active: true,
        };
        assert_eq!(member.address_for(Channel::Email), Some("m1@x.com"));
        assert_eq!(member.address_for(Channel::Push), None);
        assert_eq!(member.address_for(Channel::InApp), Some("m1"));
    }
}
