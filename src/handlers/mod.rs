pub mod cart;
pub mod membership;
pub mod order;

pub use cart::cart_config;
pub use membership::membership_config;
pub use order::order_config;

use actix_web::HttpResponse;
use serde_json::json;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
