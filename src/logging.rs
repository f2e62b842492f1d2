//! Logger registry and the tracing layer that formats through it.
//!
//! Targets (tracing's logger names) are registered on an explicit [`Loggers`]
//! handle together with their own handlers, a propagation flag and a disabled
//! flag. [`NormalizedLayer`] routes every event through that registry: the
//! most specific registered ancestor of the event target decides whether the
//! event is dropped, then each registered ancestor contributes its handlers
//! until one stops propagation, and the root format closes the chain.
//!
//! [`Loggers::normalize`] rewrites every registered handler to the fixed
//! template and stops propagation, so that a target with its own handler no
//! longer prints each line twice.

use std::collections::BTreeMap;
use std::fmt::{self, Write as FmtWrite};
use std::io::Write;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Local};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Layout produced by [`LineFormat::Fixed`].
pub const LOGGER_FORMAT: &str =
    "{asctime} | {level:<5} | {target:<24} | {function:>10}() | {message}";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Function name reported for events outside any span
const NO_FUNCTION: &str = "<module>";

/// Line layouts a handler can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `timestamp | LEVEL | target | function() | message`
    Fixed,
    /// `timestamp LEVEL target message`, used by the engine's SQL echo
    Echo,
    /// `LEVEL:target:message`
    Basic,
}

/// One event, ready to render
#[derive(Debug, Clone)]
pub struct LogLine<'a> {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: &'a str,
    pub function: &'a str,
    pub message: &'a str,
}

impl LineFormat {
    pub fn render(&self, line: &LogLine<'_>) -> String {
        let level = line.level.to_string();
        match self {
            LineFormat::Fixed => format!(
                "{} | {:<5} | {:<24} | {:>10}() | {}",
                line.timestamp.format(TIMESTAMP_FORMAT),
                level,
                line.target,
                line.function,
                line.message
            ),
            LineFormat::Echo => format!(
                "{} {} {} {}",
                line.timestamp.format(TIMESTAMP_FORMAT),
                level,
                line.target,
                line.message
            ),
            LineFormat::Basic => format!("{}:{}:{}", level, line.target, line.message),
        }
    }
}

/// Per-target configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSettings {
    pub handlers: Vec<LineFormat>,
    pub propagate: bool,
    pub disabled: bool,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            propagate: true,
            disabled: false,
        }
    }
}

impl TargetSettings {
    pub fn with_handler(format: LineFormat) -> Self {
        Self {
            handlers: vec![format],
            ..Self::default()
        }
    }

    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }
}

/// Where an event ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Drop,
    Emit(Vec<LineFormat>),
}

#[derive(Debug)]
struct Registry {
    root: LineFormat,
    targets: BTreeMap<String, TargetSettings>,
}

/// Cloneable handle to a logger registry.
///
/// Each handle is constructed by the caller and passed to the components
/// that need it; there is no process-wide instance.
#[derive(Clone)]
pub struct Loggers {
    inner: Arc<RwLock<Registry>>,
}

impl Default for Loggers {
    fn default() -> Self {
        Self::new(LineFormat::Fixed)
    }
}

impl fmt::Debug for Loggers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Loggers")
            .field("root", &registry.root)
            .field("targets", &registry.targets)
            .finish()
    }
}

impl Loggers {
    /// Create a registry whose root handler uses `root`
    pub fn new(root: LineFormat) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Registry {
                root,
                targets: BTreeMap::new(),
            })),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root_format(&self) -> LineFormat {
        self.read().root
    }

    /// Register or replace a target
    pub fn register(&self, name: &str, settings: TargetSettings) {
        self.write().targets.insert(name.to_string(), settings);
    }

    pub fn settings(&self, name: &str) -> Option<TargetSettings> {
        self.read().targets.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().targets.keys().cloned().collect()
    }

    /// Handlers attached directly to `name`
    pub fn list_handlers(&self, name: &str) -> Vec<LineFormat> {
        self.read()
            .targets
            .get(name)
            .map(|s| s.handlers.clone())
            .unwrap_or_default()
    }

    /// Switch every handler of every registered target not in `keep` to the
    /// fixed template and stop its propagation. Returns how many targets changed.
    pub fn normalize(&self, keep: &[&str]) -> usize {
        let mut registry = self.write();
        let mut changed = 0;
        for (name, settings) in registry.targets.iter_mut() {
            if keep.contains(&name.as_str()) {
                continue;
            }
            for handler in settings.handlers.iter_mut() {
                *handler = LineFormat::Fixed;
            }
            settings.propagate = false;
            changed += 1;
        }
        changed
    }

    /// Disable every registered target not in `keep`. Returns how many targets changed.
    pub fn disable_all_except(&self, keep: &[&str]) -> usize {
        let mut registry = self.write();
        let mut changed = 0;
        for (name, settings) in registry.targets.iter_mut() {
            if !keep.contains(&name.as_str()) {
                settings.disabled = true;
                changed += 1;
            }
        }
        changed
    }

    /// Resolve the handlers an event on `target` is written with
    pub fn route(&self, target: &str) -> Route {
        let registry = self.read();
        let mut formats = Vec::new();
        let mut emitter = true;
        for name in ancestors(target) {
            let Some(settings) = registry.targets.get(name) else {
                continue;
            };
            if emitter && settings.disabled {
                return Route::Drop;
            }
            emitter = false;
            formats.extend(settings.handlers.iter().copied());
            if !settings.propagate {
                return if formats.is_empty() {
                    Route::Drop
                } else {
                    Route::Emit(formats)
                };
            }
        }
        formats.push(registry.root);
        Route::Emit(formats)
    }
}

/// `a::b::c`, `a::b`, `a`
fn ancestors(target: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(target), |t| t.rfind("::").map(|idx| &t[..idx]))
}

/// A tracing layer that writes each event through the [`Loggers`] routing.
pub struct NormalizedLayer<W> {
    loggers: Loggers,
    make_writer: W,
}

impl<W> NormalizedLayer<W> {
    pub fn new(loggers: Loggers, make_writer: W) -> Self {
        Self {
            loggers,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for NormalizedLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let formats = match self.loggers.route(metadata.target()) {
            Route::Drop => return,
            Route::Emit(formats) => formats,
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let function = ctx
            .event_span(event)
            .map(|span| span.name())
            .unwrap_or(NO_FUNCTION);

        let line = LogLine {
            timestamp: Local::now(),
            level: *metadata.level(),
            target: metadata.target(),
            function,
            message: &visitor.message,
        };
        let mut writer = self.make_writer.make_writer_for(metadata);
        for format in formats {
            let _ = writeln!(writer, "{}", format.render(&line));
        }
    }
}

/// Visitor for extracting the message from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl MessageVisitor {
    fn separate(&mut self) {
        if !self.message.is_empty() {
            self.message.push(' ');
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.separate();
            let _ = write!(self.message, "{}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.separate();
            let _ = write!(self.message, "{}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_walk_up_module_paths() {
        let chain: Vec<_> = ancestors("a::b::c").collect();
        assert_eq!(chain, vec!["a::b::c", "a::b", "a"]);
    }

    #[test]
    fn unregistered_targets_use_the_root_format() {
        let loggers = Loggers::new(LineFormat::Basic);
        assert_eq!(loggers.route("anything"), Route::Emit(vec![LineFormat::Basic]));
    }

    #[test]
    fn own_handler_plus_propagation_duplicates_lines() {
        let loggers = Loggers::default();
        loggers.register("app::engine", TargetSettings::with_handler(LineFormat::Echo));
        assert_eq!(
            loggers.route("app::engine::pool"),
            Route::Emit(vec![LineFormat::Echo, LineFormat::Fixed])
        );
    }

    #[test]
    fn normalize_skips_kept_targets() {
        let loggers = Loggers::default();
        loggers.register("app::engine", TargetSettings::with_handler(LineFormat::Echo));
        loggers.register("app::walkthrough", TargetSettings::with_handler(LineFormat::Basic));
        assert_eq!(loggers.normalize(&["app::walkthrough"]), 1);

        let engine = loggers.settings("app::engine").unwrap();
        assert_eq!(engine.handlers, vec![LineFormat::Fixed]);
        assert!(!engine.propagate);
        let kept = loggers.settings("app::walkthrough").unwrap();
        assert_eq!(kept.handlers, vec![LineFormat::Basic]);
        assert!(kept.propagate);
    }

    #[test]
    fn non_propagating_target_without_handlers_is_silent() {
        let loggers = Loggers::default();
        loggers.register("quiet", TargetSettings::default());
        loggers.normalize(&[]);
        assert_eq!(loggers.route("quiet"), Route::Drop);
    }

    #[test]
    fn fixed_format_pads_level_target_and_function() {
        let line = LogLine {
            timestamp: Local::now(),
            level: Level::INFO,
            target: "walkthrough",
            function: "core",
            message: "create_all",
        };
        let rendered = LineFormat::Fixed.render(&line);
        let fields: Vec<_> = rendered.split(" | ").collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1], "INFO ");
        assert_eq!(fields[2], format!("{:<24}", "walkthrough"));
        assert_eq!(fields[3], "      core()");
        assert_eq!(fields[4], "create_all");
    }
}
