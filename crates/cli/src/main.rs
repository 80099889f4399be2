use std::process::ExitCode;

fn main() -> ExitCode {
    barkline_cli::run()
}
