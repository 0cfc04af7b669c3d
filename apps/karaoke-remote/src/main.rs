use clap::Parser;
use karaoke_remote_core::terminal::{app, cli::Cli};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    if let Err(err) = app::run(cli).await {
        eprintln!("❌ {err}");
        std::process::exit(err.exit_code());
    }
}
