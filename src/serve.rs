use crate::chart;
use crate::config::ServeConfig;
use crate::report::Report;

#[derive(Clone)]
struct AppState {
    report: std::sync::Arc<Report>,
    top_n: usize,
}

/// Serve a built report on the configured address until interrupted.
pub async fn run(
    config: &ServeConfig,
    report: Report,
    top_n: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(report, top_n);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("serve listening on http://{local_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

fn router(report: Report, top_n: usize) -> axum::Router {
    use axum::{routing::get, Router};
    use tower_http::cors::CorsLayer;

    let state = AppState {
        report: std::sync::Arc::new(report),
        top_n,
    };

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/report", get(api_report))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"ok": true}))
}

async fn api_report(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<Report> {
    axum::Json(state.report.as_ref().clone())
}

async fn index(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::response::Html<String> {
    axum::response::Html(render_page(&state.report, state.top_n))
}

/// HTML page with one SVG bar chart per report table.
pub fn render_page(report: &Report, top_n: usize) -> String {
    let mut html = String::from(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Cross-domain journeys</title></head>\n<body style=\"font-family:sans-serif\">\n",
    );
    html.push_str(&format!(
        "<h1>Cross-domain journeys</h1>\n<p>{} sessions, {} hits</p>\n",
        report.sessions, report.hits
    ));
    for c in chart::report_charts(report, top_n) {
        html.push_str("<figure>\n");
        html.push_str(&chart::render_svg(&c));
        html.push_str("\n</figure>\n");
    }
    html.push_str("</body></html>\n");
    html
}
