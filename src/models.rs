//! Database row types and the closed vocabularies they draw from.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// The closed role vocabulary. Any role string outside this set is rejected
/// when roles are updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Founder,
    VerifiedCreator,
    Crew,
    Admin,
    Moderator,
    User,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Founder => "founder",
            Self::VerifiedCreator => "verified_creator",
            Self::Crew => "crew",
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "founder" => Ok(Self::Founder),
            "verified_creator" => Ok(Self::VerifiedCreator),
            "crew" => Ok(Self::Crew),
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "user" => Ok(Self::User),
            other => Err(anyhow::anyhow!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles that skip the moderation queue entirely.
pub const PRIVILEGED_ROLES: &[Role] = &[Role::Founder, Role::Admin];

/// Roles allowed to act on the moderation queue.
pub const MODERATOR_ROLES: &[Role] = &[Role::Founder, Role::Admin];

/// Roles allowed to submit each content kind.
pub const SCRIPT_SUBMIT_ROLES: &[Role] = &[
    Role::Founder,
    Role::Admin,
    Role::VerifiedCreator,
    Role::Crew,
];
pub const GIVEAWAY_SUBMIT_ROLES: &[Role] = &[Role::Founder, Role::Admin, Role::Crew];
pub const AD_SUBMIT_ROLES: &[Role] = &[
    Role::Founder,
    Role::Admin,
    Role::Crew,
    Role::VerifiedCreator,
];

/// Moderation lifecycle stamped on every user-submitted content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Running state of a giveaway, independent of its moderation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiveawayState {
    Active,
    Ended,
    Cancelled,
}

impl GiveawayState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Ad lifecycle. Pending and rejected come from moderation; active,
/// inactive and expired are the post-approval states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    Active,
    Inactive,
    Expired,
    Pending,
    Rejected,
}

impl AdStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        }
    }
}

/// Which listing surface an ad appears on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdCategory {
    Scripts,
    Giveaways,
    Both,
}

impl AdCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scripts => "scripts",
            Self::Giveaways => "giveaways",
            Self::Both => "both",
        }
    }
}

impl std::str::FromStr for AdCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scripts" => Ok(Self::Scripts),
            "giveaways" => Ok(Self::Giveaways),
            "both" => Ok(Self::Both),
            other => Err(anyhow::anyhow!("unknown ad category: {other}")),
        }
    }
}

/// A registered user. Identity comes from the external OAuth provider;
/// roles are managed locally by admins.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub roles: Json<Vec<Role>>,
    pub created_at: String,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.0.contains(&role)
    }

    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }

    /// Founder/admin: exempt from the moderation queue and allowed to act on it.
    pub fn is_privileged(&self) -> bool {
        self.has_any(PRIVILEGED_ROLES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Script {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub cover_url: Option<String>,
    pub seller_id: String,
    pub seller_email: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Script {
    /// Mean rating, or `None` before the first review.
    #[expect(clippy::cast_precision_loss, reason = "ratings are tiny integers")]
    pub fn average_rating(&self) -> Option<f64> {
        (self.rating_count > 0).then(|| self.rating_sum as f64 / self.rating_count as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Giveaway {
    pub id: String,
    pub title: String,
    pub description: String,
    pub total_value: f64,
    pub end_date: String,
    pub max_entries: Option<i64>,
    pub state: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub entries_count: i64,
    pub creator_id: String,
    pub creator_email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GiveawayEntry {
    pub id: String,
    pub giveaway_id: String,
    pub user_id: String,
    pub points: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ad {
    pub id: String,
    pub title: String,
    pub link: String,
    pub image_url: Option<String>,
    pub category: String,
    pub status: String,
    pub priority: i64,
    pub rejection_reason: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub owner_id: String,
    pub owner_email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScriptReview {
    pub id: String,
    pub script_id: String,
    pub reviewer_email: String,
    pub reviewer_name: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GiveawayReview {
    pub id: String,
    pub giveaway_id: String,
    pub reviewer_email: String,
    pub reviewer_name: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}
