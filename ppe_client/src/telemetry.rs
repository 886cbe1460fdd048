use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    submission_counter: Counter<u64>,
    submission_duration: Histogram<u64>,
    rejected_files: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("ppe_client");
        global::set_meter_provider(provider);

        let submission_counter = meter
            .u64_counter("detection_submissions_total")
            .with_description("Submissions to the detection service by outcome")
            .build();

        let boundaries = generate_boundaries((100, 500, 1000, 5000, 30000));

        let submission_duration = meter
            .u64_histogram("detection_submission_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Round trip of detection submissions in milliseconds")
            .build();

        let rejected_files = meter
            .u64_counter("rejected_files_total")
            .with_description("Files refused at intake by reason")
            .build();

        Ok(Metrics {
            submission_counter,
            submission_duration,
            rejected_files,
            registry,
        })
    }

    pub fn record_submission(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.submission_counter.add(1, &attributes);
    }

    pub fn record_submission_duration(&self, duration_ms: u64, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.submission_duration.record(duration_ms, &attributes);
    }

    pub fn record_rejected_file(&self, reason: &str) {
        let attributes = vec![KeyValue::new("reason", reason.to_string())];
        self.rejected_files.add(1, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 100;
    let middle_step: usize = 250;
    let end_step: usize = 1000;
    let tail_step: usize = 5000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
