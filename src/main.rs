//! mcpscout CLI binary
//!
//! All logic is in the library; main.rs only maps the outcome to a process exit code.

fn main() {
    // cli::run() prints every message itself, including errors
    if let Err(code) = mcpscout::cli::run() {
        std::process::exit(code.as_i32());
    }
}
