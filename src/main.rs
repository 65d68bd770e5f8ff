// GUI-subsystem binary on Windows: no console window is allocated. CLI mode
// attaches to the launching terminal instead.
#![windows_subsystem = "windows"]

mod app;

use app::SketchboardApp;
use eframe::egui;
use sketchboard::{cli, logger};

fn main() -> Result<(), eframe::Error> {
    // Overwrites the previous session's log.
    logger::init();

    if cli::CliArgs::is_cli_mode() {
        #[cfg(target_os = "windows")]
        {
            unsafe extern "system" {
                fn AttachConsole(dwProcessId: u32) -> i32;
            }
            const ATTACH_PARENT_PROCESS: u32 = 0xFFFF_FFFF;
            // SAFETY: plain Win32 call with a constant argument.
            unsafe {
                AttachConsole(ATTACH_PARENT_PROCESS);
            }
        }

        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS { 0 } else { 1 });
    }

    log::info!("starting GUI");
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("Sketchboard"),
        ..Default::default()
    };

    eframe::run_native(
        "Sketchboard",
        options,
        Box::new(|cc| Box::new(SketchboardApp::new(cc))),
    )
}
