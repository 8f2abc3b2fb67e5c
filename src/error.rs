use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Forbidden")]
    Forbidden,

    #[error("Membership plan not found")]
    PlanNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Membership transaction not found")]
    TransactionNotFound,

    #[error("No active membership")]
    NoActiveMembership,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Cart not found")]
    CartNotFound,

    #[error("Item not found in cart")]
    CartItemNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock. Only {available} items available")]
    InsufficientStock { available: i64 },

    #[error("Invalid discount code")]
    CodeNotFound,

    #[error("This discount code is not yet valid")]
    CodeNotYetValid,

    #[error("This discount code has expired")]
    CodeExpired,

    #[error("This discount code has reached its usage limit")]
    UsageLimitReached,

    #[error("Minimum order amount is {minimum} VND")]
    MinimumNotMet { minimum: i64 },

    #[error("Cannot cancel order with status: {0}")]
    InvalidOrderState(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Stable machine-readable code clients branch on.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::MigrateError(_) => "MIGRATION_ERROR",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) | AppError::JwtError(_) => "AUTH_ERROR",
            AppError::Forbidden => "FORBIDDEN",
            AppError::PlanNotFound => "PLAN_NOT_FOUND",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            AppError::NoActiveMembership => "NO_ACTIVE_MEMBERSHIP",
            AppError::ProductNotFound => "PRODUCT_NOT_FOUND",
            AppError::CartNotFound => "CART_NOT_FOUND",
            AppError::CartItemNotFound => "CART_ITEM_NOT_FOUND",
            AppError::OrderNotFound => "ORDER_NOT_FOUND",
            AppError::EmptyCart => "EMPTY_CART",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::CodeNotFound => "DISCOUNT_CODE_NOT_FOUND",
            AppError::CodeNotYetValid => "DISCOUNT_CODE_NOT_YET_VALID",
            AppError::CodeExpired => "DISCOUNT_CODE_EXPIRED",
            AppError::UsageLimitReached => "DISCOUNT_CODE_USAGE_LIMIT",
            AppError::MinimumNotMet { .. } => "MINIMUM_ORDER_NOT_MET",
            AppError::InvalidOrderState(_) => "INVALID_ORDER_STATE",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::ValidationError(_)
            | AppError::EmptyCart
            | AppError::InsufficientStock { .. }
            | AppError::CodeNotYetValid
            | AppError::CodeExpired
            | AppError::UsageLimitReached
            | AppError::MinimumNotMet { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::PlanNotFound
            | AppError::UserNotFound
            | AppError::TransactionNotFound
            | AppError::NoActiveMembership
            | AppError::ProductNotFound
            | AppError::CartNotFound
            | AppError::CartItemNotFound
            | AppError::OrderNotFound
            | AppError::CodeNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidOrderState(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            // Never leak storage details to clients.
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                "Database error".to_string()
            }
            AppError::MigrateError(err) => {
                log::error!("Migration error: {err}");
                "Migration error".to_string()
            }
            AppError::InternalError(msg) | AppError::ConfigError(msg) => {
                log::error!("Internal error: {msg}");
                "Internal server error".to_string()
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                msg.clone()
            }
            AppError::JwtError(err) => {
                log::warn!("JWT error: {err}");
                "Invalid access token".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message
            }
        }))
    }
}
