use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local;
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use gympulse_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::LogMailer,
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::{Clock, JwtService},
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().expect("Failed to load configuration file");

    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(&config.jwt.secret, config.jwt.access_token_expires_in);

    let clock = Clock::system();
    let mailer = Arc::new(LogMailer::new(config.mail.from_address.clone()));
    let notification_service = NotificationService::new(mailer);

    let membership_service =
        MembershipService::new(pool.clone(), clock.clone(), notification_service.clone());
    let cart_service = CartService::new(pool.clone(), clock.clone());
    let discount_service =
        DiscountService::new(pool.clone(), clock.clone(), cart_service.clone());
    let order_service = OrderService::new(pool.clone(), clock.clone(), notification_service);

    // Periodic sweeps: expiry, auto-renewal, reminders, grace period.
    tasks::spawn_all(membership_service.clone());

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(web::Data::new(membership_service.clone()))
            .app_data(web::Data::new(cart_service.clone()))
            .app_data(web::Data::new(discount_service.clone()))
            .app_data(web::Data::new(order_service.clone()))
            .configure(swagger_config)
            .route("/health", web::get().to(handlers::health))
            .service(
                web::scope("/api/v1")
                    .configure(handlers::membership_config)
                    .configure(handlers::cart_config)
                    .configure(handlers::order_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
