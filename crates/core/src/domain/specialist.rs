use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistId {
    Account,
    Billing,
    Order,
    Technical,
}

impl SpecialistId {
    /// Triage listing order. Tie-breaks follow this order.
    pub const ALL: [SpecialistId; 4] = [
        SpecialistId::Technical,
        SpecialistId::Billing,
        SpecialistId::Order,
        SpecialistId::Account,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Billing => "billing",
            Self::Order => "order",
            Self::Technical => "technical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "account" => Some(Self::Account),
            "billing" => Some(Self::Billing),
            "order" => Some(Self::Order),
            "technical" => Some(Self::Technical),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Account => "Account Management Agent",
            Self::Billing => "Billing Support Agent",
            Self::Order => "Order Management Agent",
            Self::Technical => "Technical Support Agent",
        }
    }
}

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who receives the next turn of a session by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "specialist")]
pub enum ActiveAgent {
    #[default]
    Triage,
    Specialist(SpecialistId),
}

impl ActiveAgent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Specialist(id) => id.as_str(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value.trim().eq_ignore_ascii_case("triage") {
            return Some(Self::Triage);
        }
        SpecialistId::parse(value).map(Self::Specialist)
    }

    pub fn specialist(&self) -> Option<SpecialistId> {
        match self {
            Self::Triage => None,
            Self::Specialist(id) => Some(*id),
        }
    }
}

impl fmt::Display for ActiveAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
