// storefront/src/services/validation.rs

//! Checkout input checks. All of them run before any external call.

use crate::errors::{AppError, Result};
use crate::models::CheckoutRequest;

pub fn is_valid_national_id(value: &str) -> bool {
  value.len() == 11 && value.bytes().all(|b| b.is_ascii_digit())
}

fn digits_only(value: &str) -> String {
  value.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}

pub fn validate_checkout_request(request: &CheckoutRequest) -> Result<()> {
  if request.items.is_empty() {
    return Err(AppError::Validation("Cart is empty".to_string()));
  }
  for line in &request.items {
    if line.id.trim().is_empty() || line.name.trim().is_empty() {
      return Err(AppError::Validation("Every cart item needs an id and a name".to_string()));
    }
    if line.quantity <= 0 {
      return Err(AppError::Validation(format!("Invalid quantity for item '{}'", line.id)));
    }
    if line.price < 0 {
      return Err(AppError::Validation(format!("Invalid price for item '{}'", line.id)));
    }
  }

  let customer = &request.customer_info;
  let required = [
    ("name", &customer.name),
    ("surname", &customer.surname),
    ("email", &customer.email),
    ("phone", &customer.phone),
    ("address", &customer.address),
    ("city", &customer.city),
  ];
  if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
    return Err(AppError::Validation(format!("Missing customer field '{}'", field)));
  }
  if !customer.email.contains('@') {
    return Err(AppError::Validation("Invalid email address".to_string()));
  }
  if !is_valid_national_id(customer.tc.trim()) {
    return Err(AppError::Validation("National identity number must be 11 digits".to_string()));
  }

  validate_card(request)
}

fn validate_card(request: &CheckoutRequest) -> Result<()> {
  let customer = &request.customer_info;
  let invalid = |msg: &str| Err(AppError::Validation(msg.to_string()));

  if let Some(holder) = &customer.card_holder_name {
    if holder.trim().is_empty() {
      return invalid("Card holder name is required");
    }
  }

  let number = digits_only(&customer.card_number);
  if !(12..=19).contains(&number.len()) || !number.bytes().all(|b| b.is_ascii_digit()) {
    return invalid("Invalid card number");
  }

  match customer.expire_month.trim().parse::<u8>() {
    Ok(month) if (1..=12).contains(&month) => {}
    _ => return invalid("Invalid card expiry month"),
  }

  let year = customer.expire_year.trim();
  if !(year.len() == 2 || year.len() == 4) || !year.bytes().all(|b| b.is_ascii_digit()) {
    return invalid("Invalid card expiry year");
  }

  let cvc = customer.cvc.trim();
  if !(3..=4).contains(&cvc.len()) || !cvc.bytes().all(|b| b.is_ascii_digit()) {
    return invalid("Invalid card security code");
  }
  Ok(())
}

