//! Domain types shared across the pipeline and the web boundary.
//!
//! Everything here is a read-only snapshot: rows are immutable once
//! fetched and nothing in this workspace writes back to the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fraud score at or above which a transaction is listed in the
/// security-alert block of the narrative context.
pub const HIGH_RISK_FRAUD_SCORE: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Display name for prompts; the narrative always addresses someone.
    pub fn display_first_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("Utilisateur")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletSummary {
    pub id: String,
    pub name: String,
    pub balance: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Transfer => "TRANSFER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPOSIT" => Some(Self::Deposit),
            "WITHDRAWAL" => Some(Self::Withdrawal),
            "TRANSFER" => Some(Self::Transfer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Pending,
    Review,
    Blocked,
}

impl TxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Pending => "PENDING",
            Self::Review => "REVIEW",
            Self::Blocked => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(Self::Success),
            "PENDING" => Some(Self::Pending),
            "REVIEW" => Some(Self::Review),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// One ledger transaction as read from the store. Immutable history.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: String,
    pub kind: TxKind,
    pub status: TxStatus,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub fraud_score: Option<i64>,
    pub is_inter_wallet: bool,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn is_high_risk(&self) -> bool {
        self.fraud_score
            .is_some_and(|score| score >= HIGH_RISK_FRAUD_SCORE)
    }
}

/// Source tag for the unified payment history view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Deposit,
    Cashout,
}

impl PaymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Cashout => "cashout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "cashout" => Some(Self::Cashout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRef {
    pub id: String,
    pub name: String,
}

/// Unified view over deposits (payment intents) and cashouts (payouts).
///
/// `destination` is only ever the masked form — the raw payout
/// destination must not cross this boundary (see [`mask_destination`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub wallet: WalletRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Irreversible display masking: first 4 characters kept, the rest
/// replaced by a fixed placeholder. Applied at read time, never stored.
pub fn mask_destination(raw: &str) -> String {
    let prefix: String = raw.chars().take(4).collect();
    format!("{prefix}****")
}
