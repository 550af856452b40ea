//! Terminal front-end for the voice session: start on launch, print live
//! captions and finalized turns, stop on Enter.

use std::io::Write;
use std::time::Duration;

use halovoice::config::load_config;
use halovoice::session::SessionController;

fn main() {
    let config = load_config();
    if config.api_key.trim().is_empty() {
        eprintln!(
            "No API key configured. Set GEMINI_API_KEY or add it to {}",
            halovoice::config::get_config_path().display()
        );
        std::process::exit(1);
    }

    let (controller, turns) = SessionController::new(config);
    let signals = controller.signals();

    controller.start();
    println!("[Main] session starting, press Enter to stop");

    // Finalized exchanges, one per completed turn.
    std::thread::spawn(move || {
        for turn in turns {
            println!();
            println!("you:       {}", turn.user.trim());
            println!("assistant: {}", turn.model.trim());
        }
    });

    // Live caption of the user's speech as it grows.
    let caption_signals = signals.clone();
    std::thread::spawn(move || {
        let mut last = String::new();
        loop {
            let live = caption_signals.live_transcript();
            if live != last {
                print!("\r> {}", live);
                let _ = std::io::stdout().flush();
                last = live;
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    });

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    controller.stop();
    println!("[Main] session closed");
}
