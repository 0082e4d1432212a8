// storefront/src/models/checkout.rs

//! Checkout request as submitted by the storefront.

use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
  #[serde(default)]
  pub items: Vec<CartLine>,
  pub customer_info: CustomerInfo,
  #[serde(default)]
  pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub category: Option<String>,
  /// Gross unit price in minor units.
  pub price: i64,
  pub quantity: i64,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
  pub name: String,
  pub surname: String,
  pub email: String,
  pub phone: String,
  pub tc: String,
  pub address: String,
  pub city: String,
  pub zip_code: String,
  #[serde(default)]
  pub card_holder_name: Option<String>,
  pub card_number: String,
  pub expire_month: String,
  pub expire_year: String,
  pub cvc: String,
}

// Card data must never reach the logs.
impl std::fmt::Debug for CustomerInfo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CustomerInfo")
      .field("name", &self.name)
      .field("surname", &self.surname)
      .field("email", &self.email)
      .field("city", &self.city)
      .finish_non_exhaustive()
  }
}
