use nats_to_syslog::app;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    ExitCode::from(app::main().await)
}
