use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::delivery::MessageSink;
use crate::pipeline::{InboundMessage, Pipeline};

pub struct AppState {
    pub pipeline: Pipeline,
    pub sink: Option<Arc<dyn MessageSink>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
    pub detail: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/webhook")
            .route(web::get().to(status))
            .route(web::post().to(receive)),
    );
}

async fn status() -> impl Responder {
    HttpResponse::Ok().json(StatusResponse {
        status: "ok".into(),
        detail: "POST /webhook for messages".into(),
    })
}

/// Handler for POST /webhook. Always 200; failures are part of the reply text.
async fn receive(form: web::Form<WebhookForm>, state: web::Data<AppState>) -> impl Responder {
    let WebhookForm { body, from } = form.into_inner();
    let message = InboundMessage { body, sender: from };
    let reply = state.pipeline.respond(&message).await;

    if let (Some(sink), Some(to)) = (&state.sink, message.sender) {
        let sink = Arc::clone(sink);
        let text = reply.text.clone();
        actix_web::rt::spawn(async move {
            if let Err(err) = sink.send(&to, &text).await {
                error!("Could not deliver reply to {to}: {err}");
            }
        });
    }

    HttpResponse::Ok().json(reply)
}

pub async fn run(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let state = web::Data::new(state);
    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("Starting HTTP server on {bind_addr}");
    info!("Endpoints: GET /webhook, POST /webhook");

    let mut server =
        HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
            .bind(&bind_addr)?;
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }
    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}
