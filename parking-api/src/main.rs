// parking-api/src/main.rs

use clap::Parser;
use parking_api::built_info;
use rocket::error;
use rocket::info;
use std::env;

#[derive(Parser)]
#[command(name = "parking-api")]
#[command(about = "Parking session API: reservations, payments, checkouts and plate history")]
#[command(version)]
struct Cli {
    /// Show extended version information
    #[arg(long, action = clap::ArgAction::SetTrue)]
    version_info: bool,
}

#[rocket::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version_info {
        println!("parking-api {}", built_info::PKG_VERSION);
        println!("Built: {}", built_info::BUILT_TIME_UTC);
        if let Some(commit) = built_info::GIT_COMMIT_HASH {
            println!("Git commit: {}", commit);
        }
        return;
    }

    // A missing .env is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    match env::current_dir() {
        Ok(path) => info!("Current directory: {}", path.display()),
        Err(e) => error!("Error getting current directory: {}", e),
    };

    info!("Parking API v{} starting", built_info::PKG_VERSION);

    if let Err(e) = parking_api::rocket().launch().await {
        error!("Rocket server failed to launch: {}", e);
        std::process::exit(1);
    }
}
