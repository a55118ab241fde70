#![forbid(unsafe_code)]

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;
use tracing::warn;

static START: Lazy<Instant> = Lazy::new(Instant::now);

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static CLAIMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("claims_total", "Total claim requests by outcome"),
        &["outcome"],
    )
    .expect("metric");
    REGISTRY.register(Box::new(c.clone())).expect("register");
    c
});

pub static CLAIM_STAGE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "claim_stage_failures_total",
            "Failed claims by the last stage they reached",
        ),
        &["stage"],
    )
    .expect("metric");
    REGISTRY.register(Box::new(c.clone())).expect("register");
    c
});

pub static ELIGIBILITY_LOOKUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("eligibility_lookups_total", "Total pass balance lookups"),
        &["result"],
    )
    .expect("metric");
    REGISTRY.register(Box::new(c.clone())).expect("register");
    c
});

pub static PROCESS_UPTIME_SECONDS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(Opts::new(
        "process_uptime_seconds",
        "Process uptime in seconds",
    ))
    .expect("metric");
    REGISTRY.register(Box::new(g.clone())).expect("register");
    g
});

pub fn gather_text() -> String {
    let uptime = i64::try_from(START.elapsed().as_secs()).unwrap_or(i64::MAX);
    PROCESS_UPTIME_SECONDS.set(uptime);
    let mf = REGISTRY.gather();
    let mut out = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&mf, &mut out) {
        warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(out).unwrap_or_default()
}
