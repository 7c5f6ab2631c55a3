use clap::Parser;

use ldapmodify::cli::Cli;
use ldapmodify::config::Config;
use ldapmodify::output::{flush_stdout, StdOutputSink};
use ldapmodify::result_model::ResultCode;
use ldapmodify::{engine, error::ToolError};

// The engine dispatches one request at a time over a single connection
// (`spec.md` §5); a current-thread runtime matches that model.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Cli::parse();

    let default_level = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let mut output = StdOutputSink;

    let code = match Config::from_cli(args) {
        Ok(config) => match engine::run(config, &mut output).await {
            Ok(code) => code,
            Err(e) => report_fatal(&e),
        },
        Err(e) => report_fatal(&e),
    };

    let _ = flush_stdout();
    std::process::exit(code.exit_code() as i32);
}

fn report_fatal(e: &ToolError) -> ResultCode {
    eprintln!("{}", e);
    e.result_code()
}
