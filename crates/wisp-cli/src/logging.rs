//! Logging setup (SPEC_FULL §2): `tracing` + `tracing-subscriber`,
//! upgraded from the teacher's plain `env_logger::init()` so the VM's
//! per-thread spans (thread id, module id) survive in structured form.
//! Level and destination are driven by `RUST_LOG` plus the `-V`/`-T`/`-e`
//! flags (spec §6.1).

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// `verbose` is `-V`'s repeat count, `trace` is `-T`, `logerr` is `-e`
/// ("send logs to stderr" — stdout otherwise, matching a script's own
/// `print` output staying on stdout even with logging enabled).
pub fn init(verbose: u8, trace: bool, logerr: bool) {
    let default_level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let writer = if logerr { BoxMakeWriter::new(std::io::stderr) } else { BoxMakeWriter::new(std::io::stdout) };

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_target(false).compact().init();
}
