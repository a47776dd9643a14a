//! Lintel CLI application entry point
//!
//! This is the minimal main entry point that delegates to the library.

use clap::Parser;
use lintel_engine::report::EXIT_PLAN_ERROR;

fn main() {
    // Configure miette for error reporting
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(false)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = lintel::Cli::parse();

    match lintel::run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let report = miette::Report::msg(format!("{e:#}"));
            eprintln!("{report:?}");
            std::process::exit(EXIT_PLAN_ERROR);
        }
    }
}
