//! wisp-cli/src/main.rs — entry point of the `wisp` binary.
//!
//! Stays minimal so the actual logic in `lib.rs` can be exercised from
//! `cargo test -p wisp-cli`, the same split the teacher's `vitte-cli`
//! uses between `main.rs` and `lib.rs`.

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: failed to install color-eyre: {e}");
    }

    if let Err(err) = wisp_cli::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
