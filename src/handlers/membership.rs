use crate::models::*;
use crate::services::MembershipService;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn get_user_id_from_request(req: &HttpRequest) -> Option<i64> {
    req.extensions().get::<i64>().copied()
}

#[utoipa::path(
    get,
    path = "/memberships/plans",
    tag = "membership",
    responses(
        (status = 200, description = "Active plans ordered by duration", body = [PlanResponse])
    )
)]
pub async fn get_plans(service: web::Data<MembershipService>) -> Result<HttpResponse> {
    match service.get_active_plans().await {
        Ok(plans) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": plans }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/memberships/plans/{id}",
    tag = "membership",
    params(("id" = i64, Path, description = "Plan id")),
    responses(
        (status = 200, description = "Plan detail", body = PlanResponse),
        (status = 404, description = "Plan not found")
    )
)]
pub async fn get_plan(
    service: web::Data<MembershipService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match service.get_plan(path.into_inner()).await {
        Ok(plan) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": plan }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/memberships/subscribe",
    tag = "membership",
    request_body = SubscribeRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Subscription created", body = SubscriptionResponse),
        (status = 404, description = "Plan or user not found"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn subscribe(
    service: web::Data<MembershipService>,
    req: HttpRequest,
    body: web::Json<SubscribeRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.subscribe(user_id, body.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": response }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/memberships/renew",
    tag = "membership",
    request_body = RenewRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Membership renewed from today", body = SubscriptionResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn renew(
    service: web::Data<MembershipService>,
    req: HttpRequest,
    body: web::Json<RenewRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.renew(user_id, body.plan_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": response }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/memberships/status",
    tag = "membership",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current membership and history", body = MembershipStatusResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_status(
    service: web::Data<MembershipService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.get_status(user_id).await {
        Ok(status) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": status }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/memberships/cancel",
    tag = "membership",
    request_body = CancelMembershipRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Membership cancelled; access lasts until expiry"),
        (status = 404, description = "No active membership"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn cancel(
    service: web::Data<MembershipService>,
    req: HttpRequest,
    body: web::Json<CancelMembershipRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service
        .cancel_membership(user_id, body.into_inner().reason)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Membership cancelled. Access remains until the expiry date."
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/memberships/auto-renewal/enable",
    tag = "membership",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Auto-renewal enabled"),
        (status = 404, description = "No active membership"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn enable_auto_renewal(
    service: web::Data<MembershipService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.enable_auto_renewal(user_id).await {
        Ok(()) => Ok(HttpResponse::Ok()
            .json(json!({ "success": true, "message": "Auto-renewal enabled" }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/memberships/auto-renewal/disable",
    tag = "membership",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Auto-renewal disabled"),
        (status = 404, description = "No active membership"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn disable_auto_renewal(
    service: web::Data<MembershipService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match service.disable_auto_renewal(user_id).await {
        Ok(()) => Ok(HttpResponse::Ok()
            .json(json!({ "success": true, "message": "Auto-renewal disabled" }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn membership_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/memberships")
            .route("/plans", web::get().to(get_plans))
            .route("/plans/{id}", web::get().to(get_plan))
            .route("/subscribe", web::post().to(subscribe))
            .route("/renew", web::post().to(renew))
            .route("/status", web::get().to(get_status))
            .route("/cancel", web::post().to(cancel))
            .route("/auto-renewal/enable", web::post().to(enable_auto_renewal))
            .route("/auto-renewal/disable", web::post().to(disable_auto_renewal)),
    );
}
