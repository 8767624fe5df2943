// src/bin/hearthd.rs
use hearthd::{init_logging, Server, ServerConfig};

fn main() {
    init_logging();

    let cwd = std::env::current_dir().expect("failed to read current directory");
    let mut config = ServerConfig::default();
    config.doc_root = cwd.join("httpdocs");

    let server = match Server::start(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("failed to start server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run_until_ctrl_c() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
