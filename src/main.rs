#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    if let Err(error) = dayplan::run() {
        eprintln!("dayplan failed to start: {error}");
        std::process::exit(1);
    }
}
