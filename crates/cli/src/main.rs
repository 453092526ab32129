use std::process::ExitCode;

fn main() -> ExitCode {
    sejong_cli::run()
}
