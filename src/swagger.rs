use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::membership::get_plans,
        handlers::membership::get_plan,
        handlers::membership::subscribe,
        handlers::membership::renew,
        handlers::membership::get_status,
        handlers::membership::cancel,
        handlers::membership::enable_auto_renewal,
        handlers::membership::disable_auto_renewal,
        handlers::cart::get_cart,
        handlers::cart::add_to_cart,
        handlers::cart::update_cart_item,
        handlers::cart::remove_from_cart,
        handlers::cart::clear_cart,
        handlers::cart::sync_cart,
        handlers::cart::apply_discount,
        handlers::cart::remove_discount,
        handlers::order::create_order,
        handlers::order::get_orders,
        handlers::order::get_order,
        handlers::order::cancel_order,
    ),
    components(
        schemas(
            ApiError,
            PlanResponse,
            SubscribeRequest,
            RenewRequest,
            CancelMembershipRequest,
            SubscriptionResponse,
            MembershipStatusResponse,
            MembershipTransactionResponse,
            MembershipStatus,
            PaymentMethod,
            PaymentStatus,
            AddToCartRequest,
            UpdateCartItemRequest,
            SyncCartRequest,
            SyncCartItem,
            ApplyDiscountRequest,
            CartResponse,
            CartItemResponse,
            DiscountType,
            CreateOrderRequest,
            OrderResponse,
            OrderItemResponse,
            OrderSummaryResponse,
            OrderStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "membership", description = "Plans, subscriptions and the membership lifecycle"),
        (name = "cart", description = "Cart, stock checks and discount codes"),
        (name = "order", description = "Order placement and history")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
}
