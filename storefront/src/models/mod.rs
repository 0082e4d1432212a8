// storefront/src/models/mod.rs

//! Order entity and checkout input types.

pub mod checkout;
pub mod order;

pub use checkout::{CartLine, CheckoutRequest, CustomerInfo};
pub use order::{
  Address, BuyerSnapshot, LineItem, NewOrder, Order, OrderListQuery, OrderPage, OrderStatus, OrderSummary,
  PaymentStatus, TransitionOutcome,
};
