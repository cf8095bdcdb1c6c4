//! A small tracing layer that prints a one-line human summary of each
//! intercepted exchange to stdout, independent of the structured log
//! stream on stderr. `-q` silences it like everything else; it carries no
//! state of its own beyond the verbosity threshold.

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// The tracing target exchange-summary events are expected to use; other
/// events pass through untouched.
pub const EXCHANGE_TARGET: &str = "interceptor::exchange";

pub struct ExchangeLayer {
    quiet: bool,
}

impl ExchangeLayer {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

#[derive(Default)]
struct ExchangeFields {
    method: String,
    url: String,
    status: String,
}

impl Visit for ExchangeFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "method" => self.method = value.to_string(),
            "url" => self.url = value.to_string(),
            "status" => self.status = value.to_string(),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "method" => self.method = format!("{value:?}"),
            "url" => self.url = format!("{value:?}"),
            "status" => self.status = format!("{value:?}"),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for ExchangeLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.quiet || event.metadata().target() != EXCHANGE_TARGET {
            return;
        }
        let mut fields = ExchangeFields::default();
        event.record(&mut fields);
        println!("{} {} -> {}", fields.method, fields.url, fields.status);
    }
}
