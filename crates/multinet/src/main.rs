//! Binary entrypoint for the `multinet` meta plugin.
//!
//! The runtime passes everything through the environment and stdin, so the
//! binary only hands its process streams to [`multinet::run`].

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let vars = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    multinet::run(vars, &mut stdin, &mut stdout, &mut stderr)
}
