// storefront/src/web/extractors.rs

use actix_web::{web, FromRequest, HttpRequest};
use tracing::warn;

use crate::errors::AppError;
use crate::state::AppState;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Present only when the request carries the configured admin key.
#[derive(Debug)]
pub struct AdminAccess;

impl FromRequest for AdminAccess {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let expected = req
      .app_data::<web::Data<AppState>>()
      .and_then(|state| state.config.admin_api_key.clone());
    let Some(expected) = expected else {
      warn!("Admin request rejected: ADMIN_API_KEY is not configured.");
      return futures_util::future::ready(Err(AppError::Auth("Admin access is not configured".to_string())));
    };

    let presented = req.headers().get(ADMIN_KEY_HEADER).and_then(|h| h.to_str().ok());
    match presented {
      Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => futures_util::future::ready(Ok(AdminAccess)),
      _ => {
        warn!("Admin request rejected: missing or invalid {} header.", ADMIN_KEY_HEADER);
        futures_util::future::ready(Err(AppError::Auth("Invalid admin key".to_string())))
      }
    }
  }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Client address for the gateway's fraud checks.
pub fn client_ip(req: &HttpRequest) -> String {
  req
    .connection_info()
    .realip_remote_addr()
    .map(|addr| addr.parse::<std::net::SocketAddr>().map(|s| s.ip().to_string()).unwrap_or_else(|_| addr.to_string()))
    .unwrap_or_else(|| "127.0.0.1".to_string())
}
