//! Console progress and logging for the tools.
//!
//! The engine reports progress as `tracing` events on the
//! `rastercalc::progress` target. [`Tracker::install`] sets
//! up a subscriber that feeds those events into a spinner
//! and prints everything else, filtered by `RUST_LOG`, to
//! stderr.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as log_fmt, EnvFilter};

use crate::cli::{PassCounter, Progress};
use crate::Result;

const PROGRESS_UPDATE_MILLIS: u64 = 500;
const PROGRESS_TARGET: &str = "rastercalc::progress";

pub struct Tracker {
    progress: Arc<Progress<PassCounter>>,
    handle: Option<JoinHandle<()>>,
}

impl Tracker {
    /// Install the global subscriber and start the spinner.
    /// `passes` is the number of engine passes the tool
    /// runs.
    pub fn install(name: &'static str, passes: usize) -> Result<Self> {
        let progress = Arc::new(Progress::new(PassCounter::new(name, passes)));
        tracing_subscriber::registry()
            .with(
                log_fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(EnvFilter::from_default_env()),
            )
            .with(ProgressLayer(progress.clone()))
            .try_init()?;

        let handle = progress
            .clone()
            .spawn_auto_update_thread(Duration::from_millis(PROGRESS_UPDATE_MILLIS));
        Ok(Tracker {
            progress,
            handle: Some(handle),
        })
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.progress.finish();
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                eprintln!("Warning: progress thread panicked!");
            }
        }
    }
}

/// Fields of an engine progress event.
#[derive(Default)]
struct ProgressFields {
    message: String,
    percent: Option<u64>,
    rows: Option<u64>,
}

impl Visit for ProgressFields {
    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "percent" => self.percent = Some(value),
            "rows" => self.rows = Some(value),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

struct ProgressLayer(Arc<Progress<PassCounter>>);

impl ProgressLayer {
    fn apply(&self, fields: &ProgressFields) {
        let counter = &self.0.value;
        match fields.message.as_str() {
            "started" => counter.start_pass(fields.rows.unwrap_or(0) as usize),
            "complete" => counter.percent.store(100),
            _ => {
                if let Some(percent) = fields.percent {
                    counter.percent.store(percent as usize);
                }
            }
        }
    }
}

impl<S: Subscriber> Layer<S> for ProgressLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != PROGRESS_TARGET {
            return;
        }
        let mut fields = ProgressFields::default();
        event.record(&mut fields);
        self.apply(&fields);
    }
}
