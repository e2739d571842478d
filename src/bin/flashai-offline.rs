use std::env;

use flashai_offline::cli;

#[tokio::main]
async fn main() -> flashai_offline::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let args = match cli::parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            cli::print_usage();
            std::process::exit(2);
        }
    };

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    cli::run(args).await
}
