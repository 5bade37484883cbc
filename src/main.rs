use anyhow::{Context, Result};
use std::process::ExitCode;

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<u8> {
    workgate::run().context("workgate failed")
}
