use crate::config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Display the emoji legend
pub fn display_emoji_legend() {
    println!("\n╔══════════════════════════════════════════════════════════════════╗");
    println!("║                          EMOJI LEGEND                            ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║ LIFECYCLE                                                        ║");
    println!("║ 📨 Requested      📤 Posted        ⚔️ Disputed     🏁 Finalized   ║");
    println!("║                                                                  ║");
    println!("║ FUNDS                                                            ║");
    println!("║ 💰 Credit/Lock    💸 Debit/Release 🔒 Locked       🔓 Unlocked    ║");
    println!("║ 🔁 Re-tagged      🛡️ Prover bond                                  ║");
    println!("║                                                                  ║");
    println!("║ STATUS                                                           ║");
    println!("║ ✅ Success        ❌ Error          ⚙️ Config       🧬 Genesis     ║");
    println!("║ ⏸️ Paused         ▶️ Resumed        📡 API          🛑 Shutdown    ║");
    println!("╚══════════════════════════════════════════════════════════════════╝\n");
}

/// Display the boot banner
pub fn display_boot_banner(version: &str) {
    println!("\n╔══════════════════════════════════════════════════════════════════╗");
    println!("║                                                                  ║");
    println!("║    ██╗   ██╗███████╗██████╗ ██╗████████╗ ██████╗ ██████╗         ║");
    println!("║    ██║   ██║██╔════╝██╔══██╗██║╚══██╔══╝██╔═══██╗██╔══██╗        ║");
    println!("║    ██║   ██║█████╗  ██████╔╝██║   ██║   ██║   ██║██████╔╝        ║");
    println!("║    ╚██╗ ██╔╝██╔══╝  ██╔══██╗██║   ██║   ██║   ██║██╔══██╗        ║");
    println!("║     ╚████╔╝ ███████╗██║  ██║██║   ██║   ╚██████╔╝██║  ██║        ║");
    println!("║      ╚═══╝  ╚══════╝╚═╝  ╚═╝╚═╝   ╚═╝    ╚═════╝ ╚═╝  ╚═╝        ║");
    println!("║                                                                  ║");
    println!("║               Optimistic AI Inference Oracle Node                ║");
    println!("║                         Version {:^9}                        ║", version);
    println!("╚══════════════════════════════════════════════════════════════════╝");
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let log_level = if cli_verbose > 0 {
        match cli_verbose {
            1 => "debug",
            _ => "trace",
        }
    } else {
        &config.level
    };

    let filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("veritor={}", log_level)),
    );

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_line_number(true)
                .with_file(true);

            if let Some(file_path) = &config.file_output {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(file_path)?;
                let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);
                subscriber.with(json_layer).with(file_layer).init();
            } else {
                subscriber.with(json_layer).init();
            }
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_line_number(false)
                .with_file(false);

            if let Some(file_path) = &config.file_output {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(file_path)?;
                let file_layer = fmt::layer().compact().with_writer(file).with_ansi(false);
                subscriber.with(compact_layer).with(file_layer).init();
            } else {
                subscriber.with(compact_layer).init();
            }
        }
        _ => {
            // "pretty" default; show source location only at debug and up
            let show_location = matches!(log_level, "debug" | "trace");

            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_line_number(show_location)
                .with_file(show_location);

            if let Some(file_path) = &config.file_output {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(file_path)?;
                let file_layer = fmt::layer().with_writer(file).with_ansi(false);
                subscriber.with(pretty_layer).with(file_layer).init();
            } else {
                subscriber.with(pretty_layer).init();
            }
        }
    }

    Ok(())
}
