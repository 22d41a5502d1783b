//! Data models for the classroom game.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Short login code identifying a player (e.g. "7B-ADA").
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerCode(pub String);

impl PlayerCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Deal ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub Uuid);

impl DealId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DealId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Product ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub Uuid);

impl ProductId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

/// Order ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

/// Deposit ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositId(pub Uuid);

impl DepositId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DepositId {
    fn default() -> Self {
        Self::new()
    }
}

/// A player's strategic choice in a deal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Cooperate,
    Cheat,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Cooperate => write!(f, "cooperate"),
            Choice::Cheat => write!(f, "cheat"),
        }
    }
}

/// Which side of an ordered player pair a deal count refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Player profile as cached from the backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub code: PlayerCode,
    pub name: String,
    pub class_name: String,
    pub color: String,
    pub coins: i64,
    pub last_active: DateTime<Utc>,
    pub online: bool,
    pub total_deals: u32,
}

impl PlayerProfile {
    pub fn new(code: PlayerCode, name: String, class_name: String, color: String, coins: i64) -> Self {
        Self {
            code,
            name,
            class_name,
            color,
            coins,
            last_active: Utc::now(),
            online: false,
            total_deals: 0,
        }
    }
}

/// Deal status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Pending,
    Completed,
    Cancelled,
}

/// A pairwise deal between an initiator and a counterpart
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub initiator: PlayerCode,
    pub counterpart: PlayerCode,
    pub initiator_choice: Choice,
    pub counterpart_choice: Option<Choice>,
    pub status: DealStatus,
    pub initiator_delta: Option<i64>,
    pub counterpart_delta: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Deal {
    pub fn new(initiator: PlayerCode, counterpart: PlayerCode, initiator_choice: Choice) -> Self {
        Self {
            id: DealId::new(),
            initiator,
            counterpart,
            initiator_choice,
            counterpart_choice: None,
            status: DealStatus::Pending,
            initiator_delta: None,
            counterpart_delta: None,
            created_at: Utc::now(),
        }
    }

    /// Terminal deals may not be mutated again
    pub fn is_terminal(&self) -> bool {
        self.status != DealStatus::Pending
    }
}

/// A shop product
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price: i64,
    pub stock: Option<u32>,
}

impl Product {
    pub fn new(title: String, price: i64, stock: Option<u32>) -> Self {
        Self {
            id: ProductId::new(),
            title,
            price,
            stock,
        }
    }
}

/// Order status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A shop order awaiting admin confirmation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub player: PlayerCode,
    pub product_id: ProductId,
    pub product_title: String,
    pub quantity: u32,
    pub total_price: i64,
    pub status: OrderStatus,
    pub admin_note: Option<String>,
    pub confirmed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(player: PlayerCode, product: &Product, quantity: u32) -> Self {
        Self {
            id: OrderId::new(),
            player,
            product_id: product.id,
            product_title: product.title.clone(),
            quantity,
            total_price: product.price * quantity as i64,
            status: OrderStatus::Pending,
            admin_note: None,
            confirmed_by: None,
            created_at: Utc::now(),
        }
    }
}

/// How a deposit's profit is computed on expiry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepositKind {
    /// Deterministic profit: `amount * rate_percent / 100`
    Fixed { rate_percent: i64 },
    /// Single uniform draw: 40% chance of +20%, otherwise -10%
    Risky,
}

/// Deposit status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Active,
    Completed,
}

/// A timed deposit resolved once by a client-side countdown
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub player: PlayerCode,
    pub amount: i64,
    pub kind: DepositKind,
    pub profit: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: DepositStatus,
}

impl Deposit {
    pub fn new(player: PlayerCode, amount: i64, kind: DepositKind, duration: chrono::Duration) -> Self {
        let start = Utc::now();
        Self {
            id: DepositId::new(),
            player,
            amount,
            kind,
            profit: None,
            start_time: start,
            end_time: start + duration,
            status: DepositStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deal_id_generation() {
        let id1 = DealId::new();
        let id2 = DealId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_choice_serialization() {
        assert_eq!(serde_json::to_string(&Choice::Cooperate).unwrap(), "\"cooperate\"");
        assert_eq!(serde_json::to_string(&Choice::Cheat).unwrap(), "\"cheat\"");
    }

    #[test]
    fn test_new_deal_is_pending() {
        let deal = Deal::new("A-1".into(), "B-2".into(), Choice::Cooperate);
        assert_eq!(deal.status, DealStatus::Pending);
        assert!(deal.counterpart_choice.is_none());
        assert!(deal.initiator_delta.is_none());
        assert!(!deal.is_terminal());
    }

    #[test]
    fn test_order_total_price() {
        let product = Product::new("Homework pass".to_string(), 50, Some(10));
        let order = Order::new("A-1".into(), &product, 3);
        assert_eq!(order.total_price, 150);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_deposit_kind_serialization() {
        let fixed = DepositKind::Fixed { rate_percent: 10 };
        let json = serde_json::to_string(&fixed).unwrap();
        assert!(json.contains("fixed"));
        assert!(json.contains("rate_percent"));

        let risky: DepositKind = serde_json::from_str(r#"{"type":"risky"}"#).unwrap();
        assert_eq!(risky, DepositKind::Risky);
    }
}
