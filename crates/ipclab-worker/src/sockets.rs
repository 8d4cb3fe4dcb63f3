//! TCP echo conversation on loopback.
//!
//! The server accepts exactly one connection and echoes every receive back
//! through [`echo_for`] until the client closes. The client waits a fixed
//! readiness delay, connects, and sends its requests one at a time.
//!
//! Reads are one-shot and bounded by [`RECV_CHUNK`]; a request fragmented by
//! the network is echoed in pieces.

use ipclab_event::{EventEmitter, Outcome};
use ipclab_transport::{SocketConnection, SocketServer, TransportError, RECV_CHUNK};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::config::SocketConfig;
use crate::error::failure_step;

/// Server transformation. Always contains the request verbatim.
pub fn echo_for(request: &str) -> String {
    format!("server echo: {request}")
}

pub fn run_server(config: &SocketConfig, emitter: EventEmitter, cancel: &Cancellation) -> Outcome {
    emitter.status("init", "Server started.");

    let server = match SocketServer::bind(config.addr) {
        Ok(server) => server,
        Err(err) => {
            let step = failure_step(&err);
            return emitter.fail(step, format!("Could not listen: {err}."));
        }
    };
    let wake = server.wake_handle();
    cancel.register(move || wake.fire());
    emitter.log_data(
        "listening",
        "Listening for connections.",
        server.local_addr().to_string(),
        None,
    );

    let accepted = server.accept();
    // Exactly one connection per conversation.
    drop(server);
    let mut conn = match accepted {
        Ok(conn) => conn,
        Err(err) => {
            let step = failure_step(&err);
            return emitter.fail(step, format!("Accept failed: {err}."));
        }
    };
    if cancel.is_requested() {
        conn.close();
        return emitter.fail("cancelled", "Server cancelled by supervisor.");
    }
    register_kill(&conn, cancel);
    emitter.log_data(
        "accepted",
        "Connection accepted.",
        conn.remote_addr().to_string(),
        None,
    );

    let result = serve(&mut conn, config, &emitter, cancel);
    conn.close();
    match result {
        Ok(()) => emitter.complete(
            "connection_closed",
            "Client closed the connection; server shut down.",
        ),
        Err(err) => {
            let step = failure_step(&err);
            emitter.fail(step, format!("Server aborted: {err}."))
        }
    }
}

fn serve(
    conn: &mut SocketConnection,
    config: &SocketConfig,
    emitter: &EventEmitter,
    cancel: &Cancellation,
) -> Result<(), TransportError> {
    conn.set_read_timeout(config.read_timeout)?;
    loop {
        let data = conn.receive(RECV_CHUNK)?;
        if data.is_empty() {
            debug!(state = conn.state().as_str(), "peer closed connection");
            return Ok(());
        }
        if cancel.is_requested() {
            return Err(TransportError::Cancelled);
        }
        let request = String::from_utf8_lossy(&data).into_owned();
        emitter.log_data(
            "received",
            "Received request.",
            request.as_str(),
            Some(data.len() as u64),
        );

        let reply = echo_for(&request);
        conn.send(reply.as_bytes())?;
        emitter.log_data("sent", "Sent echo.", reply.as_str(), Some(reply.len() as u64));
    }
}

pub fn run_client(
    config: &SocketConfig,
    requests: &[String],
    emitter: EventEmitter,
    cancel: &Cancellation,
) -> Outcome {
    emitter.status("init", "Client started.");

    if !cancel.sleep(config.ready_delay) {
        return emitter.fail("cancelled", "Client cancelled before connecting.");
    }

    emitter.log_data(
        "connecting",
        "Connecting to server.",
        config.addr.to_string(),
        None,
    );
    let mut conn = match SocketConnection::connect(config.addr) {
        Ok(conn) => conn,
        Err(err) => {
            let step = failure_step(&err);
            return emitter.fail(step, format!("Could not connect: {err}."));
        }
    };
    register_kill(&conn, cancel);
    emitter.log_data(
        "connected",
        "Connection established.",
        conn.local_addr().to_string(),
        None,
    );

    let result = exchange(&mut conn, config, requests, &emitter, cancel);
    if let Err(err) = conn.shutdown_write() {
        debug!(error = %err, "client write shutdown failed");
    }
    conn.close();
    match result {
        Ok(()) => emitter.complete("finish", "Client finished; connection closed."),
        Err(err) => {
            let step = failure_step(&err);
            emitter.fail(step, format!("Client aborted: {err}."))
        }
    }
}

fn exchange(
    conn: &mut SocketConnection,
    config: &SocketConfig,
    requests: &[String],
    emitter: &EventEmitter,
    cancel: &Cancellation,
) -> Result<(), TransportError> {
    conn.set_read_timeout(config.read_timeout)?;
    for request in requests {
        if cancel.is_requested() {
            return Err(TransportError::Cancelled);
        }
        conn.send(request.as_bytes())?;
        emitter.log_data(
            "sent",
            "Sent request.",
            request.as_str(),
            Some(request.len() as u64),
        );

        let reply = conn.receive(RECV_CHUNK)?;
        if reply.is_empty() {
            return Err(TransportError::PeerClosed);
        }
        emitter.log_data(
            "received",
            "Received echo.",
            String::from_utf8_lossy(&reply),
            Some(reply.len() as u64),
        );
    }
    Ok(())
}

fn register_kill(conn: &SocketConnection, cancel: &Cancellation) {
    match conn.kill_switch() {
        Ok(kill) => cancel.register(move || kill.fire()),
        Err(err) => debug!(error = %err, "could not clone connection for forced shutdown"),
    }
}
