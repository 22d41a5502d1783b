//! Backend gateway trait definition.

use crate::model::{
    Choice, Deal, DealId, Deposit, DepositId, DepositKind, Order, OrderId, PlayerCode,
    PlayerProfile, Product, ProductId,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from backend operations.
///
/// Transport failures and application-level rejections both land here; the
/// caller treats either as a terminal failure for the attempt. There is no
/// automatic retry anywhere.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("player not found: {0}")]
    PlayerNotFound(PlayerCode),

    #[error("deal not found: {0}")]
    DealNotFound(DealId),

    #[error("product not found")]
    ProductNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("deposit not found")]
    DepositNotFound,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("deal limit reached for this pair")]
    RateLimitExceeded,

    #[error("counterpart is not available")]
    CounterpartUnavailable,

    #[error("a deal is already in flight")]
    DealAlreadyActive,

    #[error("already resolved")]
    AlreadyResolved,

    #[error("out of stock")]
    OutOfStock,

    #[error("rejected by backend: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Transport(String),
}

impl BackendError {
    /// Map an application-level error string from the remote backend to a
    /// typed variant. Unknown strings stay `Rejected`.
    pub fn from_remote(message: &str) -> Self {
        match message {
            "insufficient_funds" => BackendError::InsufficientFunds,
            "rate_limit_exceeded" => BackendError::RateLimitExceeded,
            "counterpart_unavailable" => BackendError::CounterpartUnavailable,
            "deal_already_active" => BackendError::DealAlreadyActive,
            "already_resolved" => BackendError::AlreadyResolved,
            "out_of_stock" => BackendError::OutOfStock,
            other => BackendError::Rejected(other.to_string()),
        }
    }
}

/// Trait for the hosted backend the game runs against.
///
/// The backend owns every authoritative state transition: balances, deal
/// completion, order confirmation, deposit settlement. Implementations:
/// - `RpcBackend` for the hosted service
/// - `MockBackend` for tests and demo mode
#[async_trait]
pub trait Backend: Send + Sync {
    /// Log in with a short player code.
    async fn login(&self, code: &PlayerCode) -> Result<PlayerProfile, BackendError>;

    /// Re-read a player's authoritative profile.
    async fn fetch_player(&self, code: &PlayerCode) -> Result<PlayerProfile, BackendError>;

    /// All registered players.
    async fn list_players(&self) -> Result<Vec<PlayerProfile>, BackendError>;

    /// Heartbeat: update `last_active` for the given player.
    async fn touch(&self, code: &PlayerCode) -> Result<(), BackendError>;

    /// Create a pending deal recording the initiator's choice.
    async fn create_deal(
        &self,
        initiator: &PlayerCode,
        counterpart: &PlayerCode,
        choice: Choice,
    ) -> Result<Deal, BackendError>;

    /// Re-read a deal record.
    async fn fetch_deal(&self, id: DealId) -> Result<Deal, BackendError>;

    /// Record the counterpart's choice on a pending deal.
    async fn submit_choice(&self, id: DealId, choice: Choice) -> Result<Deal, BackendError>;

    /// Apply the resolved payoff: both deltas, both deal counters, terminal
    /// status. Rejects a second completion with `AlreadyResolved`.
    async fn complete_deal(
        &self,
        id: DealId,
        counterpart_choice: Choice,
        initiator_delta: i64,
        counterpart_delta: i64,
    ) -> Result<Deal, BackendError>;

    /// Cancel a pending deal.
    async fn cancel_deal(&self, id: DealId) -> Result<Deal, BackendError>;

    /// Every non-cancelled deal between the two players, either direction.
    async fn deals_between(
        &self,
        a: &PlayerCode,
        b: &PlayerCode,
    ) -> Result<Vec<Deal>, BackendError>;

    /// Every deal the player took part in, either side.
    async fn list_deals(&self, player: &PlayerCode) -> Result<Vec<Deal>, BackendError>;

    /// Shop catalogue.
    async fn list_products(&self) -> Result<Vec<Product>, BackendError>;

    /// Buy a product: debits the player and creates a pending order.
    async fn purchase(
        &self,
        player: &PlayerCode,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order, BackendError>;

    /// Orders for one player, or all orders when `player` is `None`.
    async fn list_orders(&self, player: Option<&PlayerCode>) -> Result<Vec<Order>, BackendError>;

    /// Admin confirms a pending order.
    async fn confirm_order(
        &self,
        id: OrderId,
        admin: &str,
        note: Option<String>,
    ) -> Result<Order, BackendError>;

    /// Admin cancels a pending order, refunding its price to the player.
    async fn cancel_order(
        &self,
        id: OrderId,
        admin: &str,
        note: Option<String>,
    ) -> Result<Order, BackendError>;

    /// Open a deposit: debits the amount and starts the countdown window.
    async fn open_deposit(
        &self,
        player: &PlayerCode,
        amount: i64,
        kind: DepositKind,
        duration: chrono::Duration,
    ) -> Result<Deposit, BackendError>;

    /// Settle an active deposit with its computed profit, crediting
    /// `amount + profit`. Terminal: rejects a second attempt.
    async fn complete_deposit(&self, id: DepositId, profit: i64) -> Result<Deposit, BackendError>;

    /// Deposits owned by the player.
    async fn list_deposits(&self, player: &PlayerCode) -> Result<Vec<Deposit>, BackendError>;

    /// Top players by coin balance.
    async fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerProfile>, BackendError>;
}
