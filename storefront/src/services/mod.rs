// storefront/src/services/mod.rs

//! Order persistence, provider clients and the money/invoicing helpers the
//! pipelines build on.

pub mod invoice_issuer;
pub mod invoice_sweeper;
pub mod invoicing;
pub mod memory_order_store;
pub mod order_store;
pub mod payment_gateway;
pub mod pricing;
pub mod validation;
