use std::process::ExitCode;

fn main() -> ExitCode {
    match majordomod::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("majordomod: {error}");
            ExitCode::FAILURE
        }
    }
}
