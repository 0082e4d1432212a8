// storefront/src/web/routes.rs

use actix_web::{web, HttpResponse};

use crate::errors::AppError;
use crate::web::handlers::{admin_handlers, checkout_handlers, order_handlers, payment_handlers};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Malformed bodies and query strings get the same `{success:false, error}` shape as other errors.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(
      web::JsonConfig::default()
        .error_handler(|err, _req| AppError::Validation(format!("Invalid request body: {}", err)).into()),
    )
    .app_data(
      web::QueryConfig::default()
        .error_handler(|err, _req| AppError::Validation(format!("Invalid query string: {}", err)).into()),
    )
    .app_data(
      web::FormConfig::default()
        .error_handler(|err, _req| AppError::Validation(format!("Invalid form body: {}", err)).into()),
    );
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  extractor_configs(cfg);
  cfg
    .route("/health", web::get().to(health_check_handler))
    .route("/checkout", web::post().to(checkout_handlers::start_checkout_handler))
    .service(
      web::scope("/payment")
        .route("/status", web::get().to(payment_handlers::payment_status_handler))
        .route("/callback", web::post().to(payment_handlers::payment_callback_handler)),
    )
    .route("/orders/{order_number}", web::get().to(order_handlers::get_order_handler))
    .service(
      web::scope("/admin/orders")
        .route("", web::get().to(admin_handlers::list_orders_handler))
        .route(
          "/{order_number}/status",
          web::patch().to(admin_handlers::update_order_status_handler),
        )
        .route("/{order_number}/invoice", web::post().to(admin_handlers::retry_invoice_handler)),
    );
}
