use crate::{
    client::DetectionService,
    config::{Config, RenderConfig, ReportConfig},
    render::RenderStyle,
    routes::api_routes,
    session::AnalysisSession,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

pub struct SharedState<S: DetectionService> {
    pub session: Arc<Mutex<AnalysisSession>>,
    pub detection_service: Arc<S>,
    pub render_style: Arc<RenderStyle>,
    pub render_config: RenderConfig,
    pub report_config: ReportConfig,
    pub metrics: Arc<Metrics>,
}

impl<S: DetectionService> Clone for SharedState<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            detection_service: self.detection_service.clone(),
            render_style: self.render_style.clone(),
            render_config: self.render_config.clone(),
            report_config: self.report_config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: DetectionService> SharedState<S> {
    pub fn new(detection_service: S, config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            session: Arc::new(Mutex::new(AnalysisSession::new(config.intake.clone()))),
            detection_service: Arc::new(detection_service),
            render_style: Arc::new(RenderStyle::from_config(&config.render)?),
            render_config: config.render.clone(),
            report_config: config.report.clone(),
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

pub fn build_router<S: DetectionService>(state: SharedState<S>, body_limit: usize) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<S: DetectionService>(
        detection_service: S,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState::new(detection_service, config)?;
        let router = build_router(app_state, config.intake.get_body_limit());

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
