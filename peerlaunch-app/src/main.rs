fn main() {
    if let Err(e) = peerlaunch_app::run() {
        eprintln!("Failed to start: {e:#}");
        std::process::exit(1);
    }
}
