use std::{
    fs, io,
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex, Once},
};

use tracing::subscriber::DefaultGuard;

/// Registers a global default tracing subscriber when called for the first time. This is intended
/// for use in tests.
pub fn subscribe() {
    static INSTALL_TRACING_SUBSCRIBER: Once = Once::new();
    INSTALL_TRACING_SUBSCRIBER.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).unwrap();
    });
}

/// This is a writer that can be used with a thread-local tracing subscriber to inspect
/// logs for a single test.
#[derive(Clone, Default)]
pub struct LogWriter(pub Arc<Mutex<Vec<u8>>>);

impl LogWriter {
    pub fn contains(&self, needle: &str) -> bool {
        self.logs().contains(needle)
    }

    pub fn logs(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

/// Captures every event on the current thread into the returned writer until the guard drops.
///
/// Use with a current thread runtime, events from other threads are not captured.
pub fn capture_logs() -> (LogWriter, DefaultGuard) {
    let writer = LogWriter::default();
    let make_writer = writer.clone();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || make_writer.clone())
        .finish();
    (writer, tracing::subscriber::set_default(subscriber))
}

/// A fresh, empty directory `target/tests/<module>/<test_name>` for on-disk fixtures.
pub fn fixture_dir(module: &str, test_name: &str) -> PathBuf {
    let dir = PathBuf::from("target/tests")
        .join(module.replace("::", "_"))
        .join(test_name);

    // cleanup anything from previous test
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir
}
