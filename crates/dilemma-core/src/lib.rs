//! Classroom Prisoner's Dilemma client core.
//!
//! This crate provides the client-side game logic for the classroom coin
//! game: the payoff rules, the deal engine with its poll/timeout protocol,
//! per-pair rate limiting, and the gateway to the hosted backend that owns
//! all authoritative state.

pub mod backend;
pub mod deposit;
pub mod engine;
pub mod limits;
pub mod model;
pub mod payoff;
pub mod roster;
pub mod session;

pub use backend::{Backend, BackendError, MockBackend, RpcBackend};
pub use engine::{DealEngine, EngineConfig};
pub use model::{
    Choice, Deal, DealId, DealStatus, Deposit, DepositId, DepositKind, DepositStatus, Direction,
    Order, OrderId, OrderStatus, PlayerCode, PlayerProfile, Product, ProductId,
};
pub use payoff::payoff;
pub use session::{Session, SessionStore};
