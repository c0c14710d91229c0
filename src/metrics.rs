use once_cell::sync::Lazy;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Lazy<QueryMetrics> = Lazy::new(QueryMetrics::init);

pub struct QueryMetrics {
    pub queries_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
    pub query_errors_total: Counter<u64>,
    pub cache_hits_total: Counter<u64>,
    pub cache_misses_total: Counter<u64>,
    round_trips: AtomicU64,
}

impl QueryMetrics {
    pub fn init() -> Self {
        let meter = global::meter("lifequery");

        let queries_total = meter.u64_counter("lifequery_queries_total")
            .with_description("Total queries executed against a data source").build();

        let query_duration = meter.f64_histogram("lifequery_query_duration_seconds")
            .with_description("Duration of data source round-trips").build();

        let query_errors_total = meter.u64_counter("lifequery_query_errors_total")
            .with_description("Data source round-trips that failed").build();

        let cache_hits_total = meter.u64_counter("lifequery_cache_hits_total")
            .with_description("Results served from a query's cache").build();

        let cache_misses_total = meter.u64_counter("lifequery_cache_misses_total")
            .with_description("Result accesses that required execution").build();

        Self {
            queries_total,
            query_duration,
            query_errors_total,
            cache_hits_total,
            cache_misses_total,
            round_trips: AtomicU64::new(0),
        }
    }

    /// Called once per database round-trip, by the executor only.
    pub fn record_query(&self, elapsed: std::time::Duration) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    /// Round-trips recorded by this process so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    pub fn record_error(&self) {
        self.query_errors_total.add(1, &[]);
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits_total.add(1, &[]);
        } else {
            self.cache_misses_total.add(1, &[]);
        }
    }
}
