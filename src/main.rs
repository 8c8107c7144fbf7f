use std::process::ExitCode;

use orfifo_tb::config::Config;
use orfifo_tb::scenarios;

fn main() -> ExitCode {
    let cfg = match Config::global() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match scenarios::run_suite(cfg) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
