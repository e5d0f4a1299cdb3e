use tracing::trace;

// Lightweight metrics helpers that stay safe in minimal builds.
// These intentionally avoid pulling in metrics macros to keep deps stable.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "satchel.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "satchel.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn fetch_outcome(outcome: &'static str) {
    trace!(
        target = "satchel.metrics",
        outcome = outcome,
        "fetch_outcome"
    );
}
