//! Mock backend for tests and demo mode.
//!
//! Implements the authoritative invariants the hosted service owns in
//! production: balance checks, the per-pair deal cap, and at-most-once
//! completion of deals, orders and deposits.

use super::traits::{Backend, BackendError};
use crate::limits::DEAL_CAP;
use crate::model::{
    Choice, Deal, DealId, DealStatus, Deposit, DepositId, DepositKind, DepositStatus, Order,
    OrderId, OrderStatus, PlayerCode, PlayerProfile, Product, ProductId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    players: HashMap<PlayerCode, PlayerProfile>,
    deals: HashMap<DealId, Deal>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    deposits: HashMap<DepositId, Deposit>,
}

impl MockState {
    fn pair_deal_count(&self, a: &PlayerCode, b: &PlayerCode) -> u32 {
        self.deals
            .values()
            .filter(|d| d.status != DealStatus::Cancelled)
            .filter(|d| {
                (&d.initiator == a && &d.counterpart == b)
                    || (&d.initiator == b && &d.counterpart == a)
            })
            .count() as u32
    }
}

/// In-memory backend with the same contract as the hosted service.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player with an initial balance.
    pub fn register_player(
        &self,
        code: impl Into<PlayerCode>,
        name: &str,
        class_name: &str,
        color: &str,
        coins: i64,
    ) -> PlayerProfile {
        let profile = PlayerProfile::new(
            code.into(),
            name.to_string(),
            class_name.to_string(),
            color.to_string(),
            coins,
        );
        let mut inner = self.inner.lock().unwrap();
        inner.players.insert(profile.code.clone(), profile.clone());
        profile
    }

    /// Add a product to the shop catalogue.
    pub fn add_product(&self, title: &str, price: i64, stock: Option<u32>) -> Product {
        let product = Product::new(title.to_string(), price, stock);
        let mut inner = self.inner.lock().unwrap();
        inner.products.insert(product.id, product.clone());
        product
    }

    /// Overwrite a player's `last_active` timestamp (for testing).
    pub fn set_last_active(&self, code: &PlayerCode, ts: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(player) = inner.players.get_mut(code) {
            player.last_active = ts;
        }
    }

    /// Insert a completed deal without going through the cap checks
    /// (for testing the derived counters).
    pub fn seed_completed_deal(&self, initiator: &PlayerCode, counterpart: &PlayerCode) -> Deal {
        let mut deal = Deal::new(initiator.clone(), counterpart.clone(), Choice::Cooperate);
        deal.counterpart_choice = Some(Choice::Cooperate);
        deal.status = DealStatus::Completed;
        deal.initiator_delta = Some(2);
        deal.counterpart_delta = Some(2);
        let mut inner = self.inner.lock().unwrap();
        inner.deals.insert(deal.id, deal.clone());
        deal
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn login(&self, code: &PlayerCode) -> Result<PlayerProfile, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let player = inner
            .players
            .get_mut(code)
            .ok_or_else(|| BackendError::PlayerNotFound(code.clone()))?;
        player.online = true;
        player.last_active = Utc::now();
        Ok(player.clone())
    }

    async fn fetch_player(&self, code: &PlayerCode) -> Result<PlayerProfile, BackendError> {
        let inner = self.inner.lock().unwrap();
        inner
            .players
            .get(code)
            .cloned()
            .ok_or_else(|| BackendError::PlayerNotFound(code.clone()))
    }

    async fn list_players(&self) -> Result<Vec<PlayerProfile>, BackendError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.players.values().cloned().collect())
    }

    async fn touch(&self, code: &PlayerCode) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let player = inner
            .players
            .get_mut(code)
            .ok_or_else(|| BackendError::PlayerNotFound(code.clone()))?;
        player.online = true;
        player.last_active = Utc::now();
        Ok(())
    }

    async fn create_deal(
        &self,
        initiator: &PlayerCode,
        counterpart: &PlayerCode,
        choice: Choice,
    ) -> Result<Deal, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.players.contains_key(initiator) {
            return Err(BackendError::PlayerNotFound(initiator.clone()));
        }
        if !inner.players.contains_key(counterpart) {
            return Err(BackendError::PlayerNotFound(counterpart.clone()));
        }
        if initiator == counterpart {
            return Err(BackendError::Rejected("cannot deal with yourself".to_string()));
        }

        // One in-flight proposal per initiator
        let has_pending = inner
            .deals
            .values()
            .any(|d| d.status == DealStatus::Pending && &d.initiator == initiator);
        if has_pending {
            return Err(BackendError::DealAlreadyActive);
        }

        if inner.players[initiator].coins <= 0 {
            return Err(BackendError::InsufficientFunds);
        }
        if inner.pair_deal_count(initiator, counterpart) >= DEAL_CAP {
            return Err(BackendError::RateLimitExceeded);
        }

        let deal = Deal::new(initiator.clone(), counterpart.clone(), choice);
        inner.deals.insert(deal.id, deal.clone());
        Ok(deal)
    }

    async fn fetch_deal(&self, id: DealId) -> Result<Deal, BackendError> {
        let inner = self.inner.lock().unwrap();
        inner
            .deals
            .get(&id)
            .cloned()
            .ok_or(BackendError::DealNotFound(id))
    }

    async fn submit_choice(&self, id: DealId, choice: Choice) -> Result<Deal, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let deal = inner.deals.get_mut(&id).ok_or(BackendError::DealNotFound(id))?;
        if deal.is_terminal() || deal.counterpart_choice.is_some() {
            return Err(BackendError::AlreadyResolved);
        }
        deal.counterpart_choice = Some(choice);
        Ok(deal.clone())
    }

    async fn complete_deal(
        &self,
        id: DealId,
        counterpart_choice: Choice,
        initiator_delta: i64,
        counterpart_delta: i64,
    ) -> Result<Deal, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        let (initiator, counterpart) = {
            let deal = inner.deals.get_mut(&id).ok_or(BackendError::DealNotFound(id))?;
            match deal.status {
                DealStatus::Completed => return Err(BackendError::AlreadyResolved),
                DealStatus::Cancelled => {
                    return Err(BackendError::Rejected("deal was cancelled".to_string()))
                }
                DealStatus::Pending => {}
            }
            deal.counterpart_choice = Some(counterpart_choice);
            deal.initiator_delta = Some(initiator_delta);
            deal.counterpart_delta = Some(counterpart_delta);
            deal.status = DealStatus::Completed;
            (deal.initiator.clone(), deal.counterpart.clone())
        };

        if let Some(player) = inner.players.get_mut(&initiator) {
            player.coins += initiator_delta;
            player.total_deals += 1;
        }
        if let Some(player) = inner.players.get_mut(&counterpart) {
            player.coins += counterpart_delta;
            player.total_deals += 1;
        }

        Ok(inner.deals[&id].clone())
    }

    async fn cancel_deal(&self, id: DealId) -> Result<Deal, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let deal = inner.deals.get_mut(&id).ok_or(BackendError::DealNotFound(id))?;
        if deal.is_terminal() {
            return Err(BackendError::AlreadyResolved);
        }
        deal.status = DealStatus::Cancelled;
        Ok(deal.clone())
    }

    async fn deals_between(
        &self,
        a: &PlayerCode,
        b: &PlayerCode,
    ) -> Result<Vec<Deal>, BackendError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .deals
            .values()
            .filter(|d| d.status != DealStatus::Cancelled)
            .filter(|d| {
                (&d.initiator == a && &d.counterpart == b)
                    || (&d.initiator == b && &d.counterpart == a)
            })
            .cloned()
            .collect())
    }

    async fn list_deals(&self, player: &PlayerCode) -> Result<Vec<Deal>, BackendError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .deals
            .values()
            .filter(|d| &d.initiator == player || &d.counterpart == player)
            .cloned()
            .collect())
    }

    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.products.values().cloned().collect())
    }

    async fn purchase(
        &self,
        player: &PlayerCode,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order, BackendError> {
        if quantity == 0 {
            return Err(BackendError::Rejected("quantity must be positive".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();

        if !inner.players.contains_key(player) {
            return Err(BackendError::PlayerNotFound(player.clone()));
        }

        let order = {
            let product = inner
                .products
                .get(&product_id)
                .ok_or(BackendError::ProductNotFound)?;
            if let Some(stock) = product.stock {
                if stock < quantity {
                    return Err(BackendError::OutOfStock);
                }
            }
            let order = Order::new(player.clone(), product, quantity);
            if inner.players[player].coins < order.total_price {
                return Err(BackendError::InsufficientFunds);
            }
            order
        };

        if let Some(product) = inner.products.get_mut(&product_id) {
            if let Some(stock) = product.stock.as_mut() {
                *stock -= quantity;
            }
        }
        if let Some(p) = inner.players.get_mut(player) {
            p.coins -= order.total_price;
        }
        inner.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn list_orders(&self, player: Option<&PlayerCode>) -> Result<Vec<Order>, BackendError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .orders
            .values()
            .filter(|o| player.map_or(true, |p| &o.player == p))
            .cloned()
            .collect())
    }

    async fn confirm_order(
        &self,
        id: OrderId,
        admin: &str,
        note: Option<String>,
    ) -> Result<Order, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner.orders.get_mut(&id).ok_or(BackendError::OrderNotFound)?;
        if order.status != OrderStatus::Pending {
            return Err(BackendError::AlreadyResolved);
        }
        order.status = OrderStatus::Confirmed;
        order.confirmed_by = Some(admin.to_string());
        order.admin_note = note;
        Ok(order.clone())
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        admin: &str,
        note: Option<String>,
    ) -> Result<Order, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        let (player, refund) = {
            let order = inner.orders.get_mut(&id).ok_or(BackendError::OrderNotFound)?;
            if order.status != OrderStatus::Pending {
                return Err(BackendError::AlreadyResolved);
            }
            order.status = OrderStatus::Cancelled;
            order.confirmed_by = Some(admin.to_string());
            order.admin_note = note;
            (order.player.clone(), order.total_price)
        };

        if let Some(p) = inner.players.get_mut(&player) {
            p.coins += refund;
        }

        Ok(inner.orders[&id].clone())
    }

    async fn open_deposit(
        &self,
        player: &PlayerCode,
        amount: i64,
        kind: DepositKind,
        duration: chrono::Duration,
    ) -> Result<Deposit, BackendError> {
        if amount <= 0 {
            return Err(BackendError::Rejected("amount must be positive".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        let p = inner
            .players
            .get_mut(player)
            .ok_or_else(|| BackendError::PlayerNotFound(player.clone()))?;
        if p.coins < amount {
            return Err(BackendError::InsufficientFunds);
        }
        p.coins -= amount;

        let deposit = Deposit::new(player.clone(), amount, kind, duration);
        inner.deposits.insert(deposit.id, deposit.clone());
        Ok(deposit)
    }

    async fn complete_deposit(&self, id: DepositId, profit: i64) -> Result<Deposit, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        let (player, credit) = {
            let deposit = inner
                .deposits
                .get_mut(&id)
                .ok_or(BackendError::DepositNotFound)?;
            if deposit.status != DepositStatus::Active {
                return Err(BackendError::AlreadyResolved);
            }
            deposit.status = DepositStatus::Completed;
            deposit.profit = Some(profit);
            (deposit.player.clone(), deposit.amount + profit)
        };

        if let Some(p) = inner.players.get_mut(&player) {
            p.coins += credit;
        }

        Ok(inner.deposits[&id].clone())
    }

    async fn list_deposits(&self, player: &PlayerCode) -> Result<Vec<Deposit>, BackendError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .deposits
            .values()
            .filter(|d| &d.player == player)
            .cloned()
            .collect())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerProfile>, BackendError> {
        let inner = self.inner.lock().unwrap();
        let mut players: Vec<PlayerProfile> = inner.players.values().cloned().collect();
        players.sort_by(|a, b| b.coins.cmp(&a.coins));
        players.truncate(limit);
        Ok(players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classroom() -> MockBackend {
        let backend = MockBackend::new();
        backend.register_player("A-1", "Ada", "7B", "#e74c3c", 100);
        backend.register_player("B-2", "Ben", "7B", "#3498db", 100);
        backend
    }

    #[tokio::test]
    async fn test_deal_lifecycle() {
        let backend = classroom();

        let deal = backend
            .create_deal(&"A-1".into(), &"B-2".into(), Choice::Cooperate)
            .await
            .unwrap();
        assert_eq!(deal.status, DealStatus::Pending);

        backend.submit_choice(deal.id, Choice::Cheat).await.unwrap();
        let done = backend
            .complete_deal(deal.id, Choice::Cheat, -1, 3)
            .await
            .unwrap();

        assert_eq!(done.status, DealStatus::Completed);
        assert_eq!(done.initiator_delta, Some(-1));
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 99);
        assert_eq!(backend.fetch_player(&"B-2".into()).await.unwrap().coins, 103);
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().total_deals, 1);
    }

    #[tokio::test]
    async fn test_double_complete_fails() {
        let backend = classroom();
        let deal = backend
            .create_deal(&"A-1".into(), &"B-2".into(), Choice::Cooperate)
            .await
            .unwrap();

        backend.complete_deal(deal.id, Choice::Cooperate, 2, 2).await.unwrap();
        let second = backend.complete_deal(deal.id, Choice::Cooperate, 2, 2).await;
        assert!(matches!(second, Err(BackendError::AlreadyResolved)));

        // Deltas applied exactly once
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 102);
        assert_eq!(backend.fetch_player(&"B-2".into()).await.unwrap().coins, 102);
    }

    #[tokio::test]
    async fn test_pair_cap_enforced() {
        let backend = classroom();
        for _ in 0..DEAL_CAP {
            backend.seed_completed_deal(&"A-1".into(), &"B-2".into());
        }

        let result = backend
            .create_deal(&"A-1".into(), &"B-2".into(), Choice::Cooperate)
            .await;
        assert!(matches!(result, Err(BackendError::RateLimitExceeded)));
        assert_eq!(
            backend.deals_between(&"A-1".into(), &"B-2".into()).await.unwrap().len(),
            DEAL_CAP as usize
        );
    }

    #[tokio::test]
    async fn test_one_pending_deal_per_initiator() {
        let backend = classroom();
        backend.register_player("C-3", "Cleo", "7B", "#2ecc71", 100);

        backend
            .create_deal(&"A-1".into(), &"B-2".into(), Choice::Cooperate)
            .await
            .unwrap();
        let second = backend
            .create_deal(&"A-1".into(), &"C-3".into(), Choice::Cooperate)
            .await;
        assert!(matches!(second, Err(BackendError::DealAlreadyActive)));
    }

    #[tokio::test]
    async fn test_broke_initiator_rejected() {
        let backend = MockBackend::new();
        backend.register_player("A-1", "Ada", "7B", "#e74c3c", 0);
        backend.register_player("B-2", "Ben", "7B", "#3498db", 100);

        let result = backend
            .create_deal(&"A-1".into(), &"B-2".into(), Choice::Cheat)
            .await;
        assert!(matches!(result, Err(BackendError::InsufficientFunds)));
    }

    #[tokio::test]
    async fn test_cancelled_deals_do_not_count() {
        let backend = classroom();
        let deal = backend
            .create_deal(&"A-1".into(), &"B-2".into(), Choice::Cooperate)
            .await
            .unwrap();
        backend.cancel_deal(deal.id).await.unwrap();

        let deals = backend.deals_between(&"A-1".into(), &"B-2".into()).await.unwrap();
        assert!(deals.is_empty());
    }

    #[tokio::test]
    async fn test_purchase_and_refund_on_cancel() {
        let backend = classroom();
        let product = backend.add_product("Homework pass", 30, Some(5));

        let order = backend.purchase(&"A-1".into(), product.id, 2).await.unwrap();
        assert_eq!(order.total_price, 60);
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 40);

        let cancelled = backend
            .cancel_order(order.id, "teacher", Some("out of passes".to_string()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 100);

        let again = backend.cancel_order(order.id, "teacher", None).await;
        assert!(matches!(again, Err(BackendError::AlreadyResolved)));
    }

    #[tokio::test]
    async fn test_purchase_insufficient_funds() {
        let backend = classroom();
        let product = backend.add_product("Field trip", 500, None);

        let result = backend.purchase(&"A-1".into(), product.id, 1).await;
        assert!(matches!(result, Err(BackendError::InsufficientFunds)));
        assert!(backend.list_orders(Some(&"A-1".into())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_decrements_stock() {
        let backend = classroom();
        let product = backend.add_product("Sticker", 10, Some(2));

        backend.purchase(&"A-1".into(), product.id, 2).await.unwrap();
        let result = backend.purchase(&"B-2".into(), product.id, 1).await;
        assert!(matches!(result, Err(BackendError::OutOfStock)));
    }

    #[tokio::test]
    async fn test_confirm_order_records_admin() {
        let backend = classroom();
        let product = backend.add_product("Homework pass", 30, None);
        let order = backend.purchase(&"A-1".into(), product.id, 1).await.unwrap();

        let confirmed = backend
            .confirm_order(order.id, "teacher", Some("picked up".to_string()))
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
        assert_eq!(confirmed.confirmed_by.as_deref(), Some("teacher"));
        assert_eq!(confirmed.admin_note.as_deref(), Some("picked up"));

        let again = backend.confirm_order(order.id, "teacher", None).await;
        assert!(matches!(again, Err(BackendError::AlreadyResolved)));
    }

    #[tokio::test]
    async fn test_deposit_lifecycle() {
        let backend = classroom();
        let deposit = backend
            .open_deposit(
                &"A-1".into(),
                50,
                DepositKind::Fixed { rate_percent: 10 },
                chrono::Duration::seconds(60),
            )
            .await
            .unwrap();
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 50);

        let done = backend.complete_deposit(deposit.id, 5).await.unwrap();
        assert_eq!(done.status, DepositStatus::Completed);
        assert_eq!(done.profit, Some(5));
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 105);

        let again = backend.complete_deposit(deposit.id, 5).await;
        assert!(matches!(again, Err(BackendError::AlreadyResolved)));
    }

    #[tokio::test]
    async fn test_leaderboard_sorted() {
        let backend = classroom();
        backend.register_player("C-3", "Cleo", "7A", "#2ecc71", 250);

        let top = backend.leaderboard(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].code, "C-3".into());
        assert!(top[0].coins >= top[1].coins);
    }

    #[tokio::test]
    async fn test_login_unknown_code() {
        let backend = MockBackend::new();
        let result = backend.login(&"Z-9".into()).await;
        assert!(matches!(result, Err(BackendError::PlayerNotFound(_))));
    }

    #[tokio::test]
    async fn test_login_marks_online() {
        let backend = classroom();
        let profile = backend.login(&"A-1".into()).await.unwrap();
        assert!(profile.online);
    }
}
