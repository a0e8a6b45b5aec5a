//! Demo that pushes a couple of synthetic alerts through the sink
//! fan-out (log only unless webhook/email env vars are set).

use chrono::Utc;
use black_swan_monitor::model::RiskLevel;
use black_swan_monitor::notify::webhook::WebhookAlertSink;
use black_swan_monitor::notify::{AlertEvent, AlertMux, LogAlertSink};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let mut mux = AlertMux::new().with_sink(Box::new(LogAlertSink));
    if let Some(webhook) = WebhookAlertSink::from_env() {
        mux = mux.with_sink(Box::new(webhook));
    }

    let samples = [
        ("Sovereign default sends markets into freefall", 0.94, RiskLevel::Extreme),
        ("Regional bank halts withdrawals", 0.78, RiskLevel::High),
    ];

    for (title, score, risk) in samples {
        let ev = AlertEvent {
            source: "demo".into(),
            title: title.into(),
            url: "https://example.com/demo".into(),
            final_score: score,
            confidence: score,
            risk_level: risk,
            reasoning: "demo reasoning".into(),
            ts: Utc::now(),
        };
        mux.send_all(&ev).await;
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    }

    println!("notify-demo done");
}
