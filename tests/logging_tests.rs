use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use sqlite_playground::logging::{LineFormat, Loggers, NormalizedLayer, TargetSettings};
use sqlite_playground::models::college_schema;
use sqlite_playground::sqlite::{ReadOperation, SqliteConfig, SqliteEngine, ECHO_TARGET};
use sqlite_playground::Result;
use tracing_subscriber::layer::SubscriberExt;

/// In-memory writer shared between the layer and the test
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

fn run_captured<T>(loggers: &Loggers, capture: &Capture, f: impl FnOnce() -> T) -> T {
    let writer = capture.clone();
    let subscriber = tracing_subscriber::registry()
        .with(NormalizedLayer::new(loggers.clone(), move || writer.clone()));
    tracing::subscriber::with_default(subscriber, f)
}

fn is_fixed(line: &str) -> bool {
    line.split(" | ").count() == 5
}

#[test]
fn test_normalize_sets_fixed_format_and_stops_propagation() {
    let loggers = Loggers::default();
    loggers.register("sqlalchemy::engine", TargetSettings::with_handler(LineFormat::Echo));
    loggers.register("sqlalchemy::pool", TargetSettings::default());
    loggers.register(
        "app::walkthrough",
        TargetSettings {
            handlers: vec![LineFormat::Basic, LineFormat::Echo],
            ..TargetSettings::default()
        },
    );
    loggers.register("app::main", TargetSettings::with_handler(LineFormat::Basic));

    let keep = ["app::main"];
    assert_eq!(loggers.normalize(&keep), 3);

    for name in loggers.names() {
        let settings = loggers.settings(&name).unwrap();
        if keep.contains(&name.as_str()) {
            assert_eq!(settings.handlers, vec![LineFormat::Basic]);
            assert!(settings.propagate);
        } else {
            assert!(settings.handlers.iter().all(|h| *h == LineFormat::Fixed));
            assert!(!settings.propagate);
        }
    }
    assert_eq!(
        loggers.list_handlers("app::walkthrough"),
        vec![LineFormat::Fixed, LineFormat::Fixed]
    );
}

#[test]
fn test_disable_all_except() {
    let loggers = Loggers::default();
    loggers.register("noisy", TargetSettings::with_handler(LineFormat::Echo));
    loggers.register("mine", TargetSettings::default());
    assert_eq!(loggers.disable_all_except(&["mine"]), 1);

    let capture = Capture::default();
    run_captured(&loggers, &capture, || {
        tracing::info!(target: "noisy", "dropped");
        tracing::info!(target: "noisy::child", "dropped too");
        tracing::info!(target: "mine", "kept");
    });
    let lines = capture.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("| kept"));
}

#[test]
fn test_echo_lines_duplicate_until_normalized() {
    test_echo_lines_impl().unwrap();
}

fn test_echo_lines_impl() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let loggers = Loggers::default();
    let capture = Capture::default();

    run_captured(&loggers, &capture, || -> Result<()> {
        let config = SqliteConfig::new(dir.path().join("college.db"), college_schema())
            .with_echo(true);
        let engine = SqliteEngine::open(config, &loggers)?;
        assert_eq!(
            loggers.list_handlers(ECHO_TARGET),
            vec![LineFormat::Echo]
        );

        let create: Vec<_> = capture
            .lines()
            .into_iter()
            .filter(|l| l.contains("CREATE TABLE IF NOT EXISTS \"students\""))
            .collect();
        assert_eq!(create.len(), 2);
        assert_eq!(create.iter().filter(|l| is_fixed(l)).count(), 1);
        assert!(create.iter().any(|l| l.contains("| create_all() |")));

        assert_eq!(loggers.normalize(&[]), 1);
        capture.clear();

        engine.select(&ReadOperation::new("students"))?.fetch_all()?;
        let lines = capture.lines();
        let select: Vec<_> = lines
            .iter()
            .filter(|l| l.contains("SELECT * FROM \"students\""))
            .collect();
        assert_eq!(select.len(), 1);
        assert!(is_fixed(select[0]));
        assert!(select[0].contains("| INFO  | "));
        assert!(select[0].contains("|     select() |"));
        Ok(())
    })
}

#[test]
fn test_quiet_engine_registers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let loggers = Loggers::default();
    let capture = Capture::default();
    run_captured(&loggers, &capture, || {
        let config = SqliteConfig::new(dir.path().join("college.db"), college_schema());
        SqliteEngine::open(config, &loggers).unwrap();
    });
    assert!(loggers.names().is_empty());
    assert!(capture
        .lines()
        .iter()
        .all(|l| !l.contains("CREATE TABLE")));
}
