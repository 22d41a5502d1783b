//! RPC gateway to the hosted backend.
//!
//! Speaks JSON-RPC 2.0 over HTTP. Every call resolves to either a typed
//! success payload or a `BackendError`; a transport failure, a malformed
//! response and an `error` member in the payload are all failures.

use crate::backend::traits::{Backend, BackendError};
use crate::model::{
    Choice, Deal, DealId, Deposit, DepositId, DepositKind, Order, OrderId, PlayerCode,
    PlayerProfile, Product, ProductId,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// JSON-RPC client for the hosted game backend.
pub struct RpcBackend {
    client: Client,
    rpc_url: String,
}

impl RpcBackend {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            rpc_url: rpc_url.into(),
        }
    }

    /// Make a JSON-RPC call and extract the `result` member.
    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, "backend rpc call");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if let Some(error) = result.get("error") {
            let msg = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(BackendError::from_remote(msg));
        }

        result
            .get("result")
            .cloned()
            .ok_or_else(|| BackendError::Transport("no result in response".to_string()))
    }

    /// Call and deserialize the result payload.
    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, BackendError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| BackendError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Backend for RpcBackend {
    async fn login(&self, code: &PlayerCode) -> Result<PlayerProfile, BackendError> {
        self.call_typed("login", json!({ "code": code })).await
    }

    async fn fetch_player(&self, code: &PlayerCode) -> Result<PlayerProfile, BackendError> {
        self.call_typed("get_player", json!({ "code": code })).await
    }

    async fn list_players(&self) -> Result<Vec<PlayerProfile>, BackendError> {
        self.call_typed("list_players", json!({})).await
    }

    async fn touch(&self, code: &PlayerCode) -> Result<(), BackendError> {
        self.call("touch_player", json!({ "code": code })).await?;
        Ok(())
    }

    async fn create_deal(
        &self,
        initiator: &PlayerCode,
        counterpart: &PlayerCode,
        choice: Choice,
    ) -> Result<Deal, BackendError> {
        self.call_typed(
            "create_deal",
            json!({
                "initiator": initiator,
                "counterpart": counterpart,
                "choice": choice,
            }),
        )
        .await
    }

    async fn fetch_deal(&self, id: DealId) -> Result<Deal, BackendError> {
        self.call_typed("get_deal", json!({ "deal_id": id })).await
    }

    async fn submit_choice(&self, id: DealId, choice: Choice) -> Result<Deal, BackendError> {
        self.call_typed("process_deal", json!({ "deal_id": id, "choice": choice }))
            .await
    }

    async fn complete_deal(
        &self,
        id: DealId,
        counterpart_choice: Choice,
        initiator_delta: i64,
        counterpart_delta: i64,
    ) -> Result<Deal, BackendError> {
        self.call_typed(
            "complete_deal",
            json!({
                "deal_id": id,
                "counterpart_choice": counterpart_choice,
                "initiator_delta": initiator_delta,
                "counterpart_delta": counterpart_delta,
            }),
        )
        .await
    }

    async fn cancel_deal(&self, id: DealId) -> Result<Deal, BackendError> {
        self.call_typed("cancel_deal", json!({ "deal_id": id })).await
    }

    async fn deals_between(
        &self,
        a: &PlayerCode,
        b: &PlayerCode,
    ) -> Result<Vec<Deal>, BackendError> {
        self.call_typed("deals_between", json!({ "a": a, "b": b })).await
    }

    async fn list_deals(&self, player: &PlayerCode) -> Result<Vec<Deal>, BackendError> {
        self.call_typed("list_deals", json!({ "player": player })).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        self.call_typed("list_products", json!({})).await
    }

    async fn purchase(
        &self,
        player: &PlayerCode,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order, BackendError> {
        self.call_typed(
            "purchase_product",
            json!({
                "player": player,
                "product_id": product_id,
                "quantity": quantity,
            }),
        )
        .await
    }

    async fn list_orders(&self, player: Option<&PlayerCode>) -> Result<Vec<Order>, BackendError> {
        self.call_typed("list_orders", json!({ "player": player })).await
    }

    async fn confirm_order(
        &self,
        id: OrderId,
        admin: &str,
        note: Option<String>,
    ) -> Result<Order, BackendError> {
        self.call_typed(
            "confirm_order",
            json!({ "order_id": id, "admin": admin, "note": note }),
        )
        .await
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        admin: &str,
        note: Option<String>,
    ) -> Result<Order, BackendError> {
        self.call_typed(
            "cancel_order",
            json!({ "order_id": id, "admin": admin, "note": note }),
        )
        .await
    }

    async fn open_deposit(
        &self,
        player: &PlayerCode,
        amount: i64,
        kind: DepositKind,
        duration: chrono::Duration,
    ) -> Result<Deposit, BackendError> {
        self.call_typed(
            "open_deposit",
            json!({
                "player": player,
                "amount": amount,
                "kind": kind,
                "duration_secs": duration.num_seconds(),
            }),
        )
        .await
    }

    async fn complete_deposit(&self, id: DepositId, profit: i64) -> Result<Deposit, BackendError> {
        self.call_typed(
            "complete_deposit",
            json!({ "deposit_id": id, "profit": profit }),
        )
        .await
    }

    async fn list_deposits(&self, player: &PlayerCode) -> Result<Vec<Deposit>, BackendError> {
        self.call_typed("list_deposits", json!({ "player": player })).await
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerProfile>, BackendError> {
        self.call_typed("get_leaderboard", json!({ "limit": limit })).await
    }
}
