//! Binary entrypoint of the terminal chat client.

use std::process::ExitCode;

use groq_chat::start;

/// Start the client: load settings and history, then read commands from stdin.
fn main() -> ExitCode {
    start::run()
}
