//! Per-instance log files.
//!
//! [`InstanceLogLayer`] is a `tracing-subscriber` layer that copies every
//! event recorded inside a span carrying an `instance` field into
//! `<root>/<instance>/<instance>.log`, one `<timestamp> : <message>` line
//! per event. A file is truncated the first time the layer opens it.
//!
//! The library never installs a subscriber; the binary stacks this layer
//! with `fmt` and an `EnvFilter`.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Name of the span field that routes events to an instance log.
pub const INSTANCE_FIELD: &str = "instance";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Routes events to one log file per instance.
#[derive(Debug)]
pub struct InstanceLogLayer {
    root: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

impl InstanceLogLayer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the log file for `instance`.
    pub fn log_path(root: &Path, instance: &str) -> PathBuf {
        root.join(instance).join(format!("{instance}.log"))
    }

    fn write_line(&self, instance: &str, line: &str) {
        let mut files = match self.files.lock() {
            Ok(files) => files,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !files.contains_key(instance) {
            let path = Self::log_path(&self.root, instance);
            let opened = path
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| File::create(&path));
            match opened {
                Ok(file) => {
                    files.insert(instance.to_string(), file);
                }
                // a log file that cannot be opened must not fail the run
                Err(_) => return,
            }
        }
        if let Some(file) = files.get_mut(instance) {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

/// Instance name stored in span extensions.
struct InstanceName(String);

#[derive(Default)]
struct InstanceVisitor(Option<String>);

impl Visit for InstanceVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == INSTANCE_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == INSTANCE_FIELD {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

/// Renders an event as its message followed by `key=value` fields.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S> Layer<S> for InstanceLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = InstanceVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(name), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().replace(InstanceName(name));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = InstanceVisitor::default();
        values.record(&mut visitor);
        if let (Some(name), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().replace(InstanceName(name));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        let Some(instance) = scope
            .into_iter()
            .find_map(|span| span.extensions().get::<InstanceName>().map(|n| n.0.clone()))
        else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} : {}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            visitor.finish()
        );
        self.write_line(&instance, &line);
    }
}
