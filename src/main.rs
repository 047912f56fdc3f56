use dockerpush::cli::{Args, Runner};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();
    dockerpush::logging::init(args.verbose, args.quiet);

    let runner = Runner::new(args);
    match runner.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_cancellation() => {
            runner.output().error(&format!("push aborted: {}", err));
            ExitCode::from(err.exit_status())
        }
        Err(err) => {
            runner.output().error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}
