use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::filter::LevelFilter;

use infomark_cli::cli::{Cli, LogLevel};
use infomark_cli::{build_client, commands, BridgeError, Terminal};

fn init_logging(level: LogLevel) {
    let filter = match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.effective_log_level());

    let client = build_client()?;

    if let Err(e) = commands::execute(&cli, &client, &mut Terminal).await {
        let unreachable = e
            .chain()
            .filter_map(|cause| cause.downcast_ref::<BridgeError>())
            .any(BridgeError::is_unreachable);

        if unreachable {
            eprintln!(
                "\n{}\n",
                "End point cannot be reached, are you online?".red().bold()
            );
        } else {
            eprintln!("\n{} {:#}\n", "Error:".red().bold(), e);
        }

        let error_msg = format!("{:#}", e);

        if error_msg.contains("dns error") || error_msg.contains("failed to lookup") {
            eprintln!("{}", "💡 Possible causes:".yellow());
            eprintln!("   - Check if the server URL (--url / INFOMARK_URL) is correct");
            eprintln!("   - Check your network connection");
        } else if error_msg.contains("onnection refused") {
            eprintln!("{}", "💡 Possible causes:".yellow());
            eprintln!("   - Server is not running");
            eprintln!("   - Wrong port number");
        } else if error_msg.contains("401") {
            eprintln!("{}", "💡 Authentication failed:".yellow());
            eprintln!("   - Check INFOMARK_EMAIL and INFOMARK_PASSWORD");
        }
        std::process::exit(1);
    }

    Ok(())
}
