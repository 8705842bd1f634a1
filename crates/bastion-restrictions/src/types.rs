use bastion_core::RestrictionId;
use serde::{Deserialize, Serialize};

/// What a restriction rule is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Global "service under maintenance" marker.
    Maintenance,
    /// Exempts a single caller address while maintenance is in effect.
    Whitelist,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maintenance => write!(f, "maintenance"),
            Self::Whitelist => write!(f, "whitelist"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maintenance" => Ok(Self::Maintenance),
            "whitelist" => Ok(Self::Whitelist),
            other => Err(format!("unknown restriction category: {other}")),
        }
    }
}

/// Who a restriction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every caller; `value` is always `"all"`.
    All,
    /// One caller address; `value` is the literal IP.
    Ip,
}

impl Scope {
    /// Value column used by rules of this scope when they are not per-address.
    pub const ALL_VALUE: &'static str = "all";
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Ip => write!(f, "ip"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "ip" => Ok(Self::Ip),
            other => Err(format!("unknown restriction scope: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionState {
    Enabled,
    #[default]
    Disabled,
}

impl std::fmt::Display for RestrictionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for RestrictionState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown restriction state: {other}")),
        }
    }
}

/// A persisted restriction rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub id: RestrictionId,
    pub category: Category,
    pub scope: Scope,
    /// `"all"` for [`Scope::All`], otherwise the literal address.
    pub value: String,
    pub state: RestrictionState,
    pub created_at: String,
    pub updated_at: String,
}

impl Restriction {
    pub fn is_enabled(&self) -> bool {
        self.state == RestrictionState::Enabled
    }
}
