use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, web};
use prometheus::TEXT_FORMAT;
use tokio::sync::watch;

use crate::metrics::Metrics;

/// Liveness check, answered with an empty 200
#[get("/")]
async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}

#[get("/metrics")]
async fn metrics_route(metrics: web::Data<Metrics>) -> impl Responder {
    match metrics.encode() {
        Ok(body) => HttpResponse::Ok().content_type(TEXT_FORMAT).body(body),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_route).service(metrics_route);
}

/// Serve `/metrics` on `addr` until `shutdown` turns `true`
pub fn run_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<Server> {
    let data = web::Data::from(metrics);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .workers(1)
        .disable_signals()
        .bind(addr)?
        .run();

    let handle = server.handle();
    tokio::spawn(async move {
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        handle.stop(true).await;
    });

    tracing::info!(%addr, "Serving metrics");
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use actix_web::test;

    #[actix_web::test]
    async fn test_metrics_route() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_decision(&Target::new("devnet-1", "geth"), "root_cause");

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(metrics))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("pulse_notifier_decisions_total"));
        assert!(text.contains("decision=\"root_cause\""));
    }

    #[actix_web::test]
    async fn test_health_route() {
        let app = test::init_service(App::new().configure(routes)).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
