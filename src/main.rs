use std::process::ExitCode;

use clap::Parser;

use blankvm::boot::VmOptions;
use blankvm::cli::Cli;
use blankvm::session::Session;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let options = VmOptions {
        mode: cli.mode(),
        mem_bytes: cli.mem_bytes,
        entry_point: cli.entry_point,
        external_page_table_base: cli.page_table_base,
    };

    match Session::boot(options, &cli.image).and_then(|mut session| session.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("blankvm: {err}");
            ExitCode::FAILURE
        }
    }
}
