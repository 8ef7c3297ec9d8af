//! Binary entrypoint for `mfly-server`.

mod app;
mod follower_link;
mod network;

fn main() {
    if let Err(error) = app::run() {
        eprintln!("failed to start mfly-server: {error}");
        std::process::exit(1);
    }
}
