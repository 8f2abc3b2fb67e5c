use crate::models::*;
use crate::services::{CartService, DiscountService};
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn get_user_id_from_request(req: &HttpRequest) -> Option<i64> {
    req.extensions().get::<i64>().copied()
}

#[utoipa::path(
    get,
    path = "/cart",
    tag = "cart",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current cart with derived totals", body = CartResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_cart(service: web::Data<CartService>, req: HttpRequest) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.get_cart(user_id).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/cart/items",
    tag = "cart",
    request_body = AddToCartRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Item added", body = CartResponse),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "Product not found"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn add_to_cart(
    service: web::Data<CartService>,
    req: HttpRequest,
    body: web::Json<AddToCartRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.add_to_cart(user_id, body.into_inner()).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/cart/items",
    tag = "cart",
    request_body = UpdateCartItemRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Quantity updated", body = CartResponse),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "Item not in cart"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn update_cart_item(
    service: web::Data<CartService>,
    req: HttpRequest,
    body: web::Json<UpdateCartItemRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.update_cart_item(user_id, body.into_inner()).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/cart/items/{product_id}",
    tag = "cart",
    params(("product_id" = i64, Path, description = "Product to remove")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Item removed (no-op when absent)", body = CartResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn remove_from_cart(
    service: web::Data<CartService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.remove_from_cart(user_id, path.into_inner()).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/cart",
    tag = "cart",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cart emptied", body = CartResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn clear_cart(service: web::Data<CartService>, req: HttpRequest) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.clear_cart(user_id).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/cart/sync",
    tag = "cart",
    request_body = SyncCartRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Guest cart merged", body = CartResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn sync_cart(
    service: web::Data<CartService>,
    req: HttpRequest,
    body: web::Json<SyncCartRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.sync_cart(user_id, body.into_inner()).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/cart/discount",
    tag = "cart",
    request_body = ApplyDiscountRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Code applied", body = CartResponse),
        (status = 400, description = "Code not eligible"),
        (status = 404, description = "Code or cart not found"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn apply_discount(
    service: web::Data<DiscountService>,
    req: HttpRequest,
    body: web::Json<ApplyDiscountRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.apply_code(user_id, body.code.trim()).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/cart/discount",
    tag = "cart",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Code removed", body = CartResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn remove_discount(
    service: web::Data<DiscountService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.remove_code(user_id).await {
        Ok(cart) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": cart }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn cart_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/cart")
            .route("", web::get().to(get_cart))
            .route("", web::delete().to(clear_cart))
            .route("/items", web::post().to(add_to_cart))
            .route("/items", web::put().to(update_cart_item))
            .route("/items/{product_id}", web::delete().to(remove_from_cart))
            .route("/sync", web::post().to(sync_cart))
            .route("/discount", web::post().to(apply_discount))
            .route("/discount", web::delete().to(remove_discount)),
    );
}
