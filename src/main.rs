mod abd_config;
mod abd_controllers;
mod abd_gui;
mod abd_models;
mod abd_tiles;
mod abd_views;

use abd_config::DashboardConfig;
use clap::Parser;
use log::info;

fn main() -> anyhow::Result<()> {
    // Set up panic hook for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("❌ APPLICATION PANIC");
        eprintln!("{}", "═".repeat(70));
        eprintln!("\nThe dashboard encountered an unexpected error:");
        eprintln!("{}", panic_info);
        eprintln!("\n💡 Troubleshooting:");
        eprintln!("  • Please restart the application");
        eprintln!("  • Check the bus data file if you passed --data-file");
        eprintln!("  • Run with RUST_LOG=debug for more details");
        eprintln!("\n{}", "═".repeat(70));
    }));

    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DashboardConfig::parse();
    info!(
        "Starting Amana dashboard (data: {}, zoom {}, tiles {})",
        config.catalog_source(),
        config.zoom,
        if config.no_tiles { "off" } else { "on" }
    );

    abd_gui::run_gui(config)
        .map_err(|e| anyhow::anyhow!("Failed to start the dashboard window: {}", e))
}
