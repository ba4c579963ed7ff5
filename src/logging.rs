//! Console log sink
//!
//! Every line carries a monotonic `[secs.millis]` prefix measured from the
//! moment logging was initialized (which is effectively process start).
//! When running as PID 1 stdout is /dev/console.

use std::io::Write;
use std::time::Instant;

use env_logger::{Builder, Env, Target};

/// Install the global logger. Filters come from `RUST_LOG`, default `info`.
pub fn init() -> Result<(), log::SetLoggerError> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    console_format(&mut builder).try_init()
}

fn console_format(builder: &mut Builder) -> &mut Builder {
    let start = Instant::now();
    builder
        .format(move |buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                timestamp(start.elapsed().as_millis()),
                record.level(),
                record.args()
            )
        })
        .target(Target::Stdout)
}

fn timestamp(elapsed_ms: u128) -> String {
    format!("[{}.{:03}]", elapsed_ms / 1000, elapsed_ms % 1000)
}
