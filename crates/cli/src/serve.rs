//! `crosslink serve`: JSON-lines TCP server in the foreground.

use std::sync::Arc;

use crosslink_service::{LinkService, Server, Settings};

use crate::exit_codes::EXIT_SERVE_BIND;
use crate::CliError;

pub fn cmd_serve(settings: &Settings, listen: Option<String>) -> Result<(), CliError> {
    let listen = listen.unwrap_or_else(|| settings.server.listen.clone());
    let service = LinkService::open(settings).map_err(CliError::service)?;

    let mut server = Server::new(Arc::new(service));
    let addr = server.start(&listen).map_err(|e| CliError {
        code: EXIT_SERVE_BIND,
        message: format!("cannot listen on {listen}: {e}"),
        hint: Some("pick another address with --listen".to_string()),
    })?;

    // Machine-readable line for scripts that spawn the server.
    println!("READY {addr}");
    server.wait();
    Ok(())
}
