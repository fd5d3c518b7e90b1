use linelog::{fields, ColorChoice, Config, Level, Logger, Output};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn terminal_logger(config: &Config) -> (Logger, SharedBuf) {
    let buf = SharedBuf::default();
    let output = Output::writer(buf.clone()).declare_terminal(true);
    (Logger::new(config, output), buf)
}

// Kept in its own test binary: it sets NO_COLOR for the whole process.
#[test]
fn test_no_color_disables_auto_color_on_terminal() {
    let config = Config::default().with_timestamp(false);

    std::env::remove_var("NO_COLOR");
    let (colored, buf) = terminal_logger(&config);
    colored.log(Level::Info, "ready", &fields!["port", 8080]);
    assert!(buf.text().contains('\x1b'));

    std::env::set_var("NO_COLOR", "1");
    let (plain, buf) = terminal_logger(&config);
    plain.log(Level::Info, "ready", &fields!["port", 8080]);
    assert_eq!(buf.text(), "INF ready port=8080\n");

    let (forced, buf) = terminal_logger(&config.clone().with_color(ColorChoice::Always));
    forced.log(Level::Info, "ready", &[]);
    assert!(buf.text().contains('\x1b'));

    std::env::remove_var("NO_COLOR");
}
