// Observability: metric recording and exporter setup

pub mod metrics;

pub use metrics::init_metrics;
