//! TCP listener and per-connection serving loop.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use mfly_common::error::{MflyError, MflyResult};
use mfly_protocol::{FrameReader, WireValue};

use crate::app::{ServerApp, WriterSink};

/// Binds the listener and serves connections until the process exits.
///
/// Each accepted socket gets one OS thread owning its frame loop; accept failures are logged
/// and the loop keeps going.
///
/// # Errors
///
/// Returns `MflyError::Io` when the listen port cannot be bound.
pub(crate) fn run_listener(app: &Arc<ServerApp>) -> MflyResult<()> {
    let port = app.config.port;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .map_err(|error| MflyError::Io(format!("failed to bind port {port}: {error}")))?;
    println!("listening on port {port}");

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let connection_app = Arc::clone(app);
                let spawned = thread::Builder::new()
                    .name(format!("mfly-conn-{peer}"))
                    .spawn(move || serve_connection(&connection_app, stream, peer));
                if let Err(error) = spawned {
                    eprintln!("failed to spawn connection thread for {peer}: {error}");
                }
            }
            Err(error) => eprintln!("failed to accept connection: {error}"),
        }
    }
}

fn serve_connection(app: &Arc<ServerApp>, stream: TcpStream, peer: SocketAddr) {
    let Ok(reader_stream) = stream.try_clone() else {
        eprintln!("failed to split connection {peer}");
        return;
    };
    let replica_writer = stream
        .try_clone()
        .ok()
        .map(|writer| Box::new(writer) as Box<dyn std::io::Write + Send>);

    let mut session = app.new_session(replica_writer);
    let mut reader = FrameReader::new(reader_stream);
    let mut sink = WriterSink::new(stream);

    loop {
        let value = match reader.read_value() {
            Ok(value) => value,
            Err(MflyError::ConnectionClosed) => break,
            Err(error) => {
                eprintln!("closing connection {peer}: {error}");
                break;
            }
        };
        // Anything that is not a request array is ignored, like stray inline replies.
        if !matches!(value, WireValue::Array(_)) {
            eprintln!("ignoring non-request frame from {peer}");
            continue;
        }
        if matches!(&value, WireValue::Array(items) if items.is_empty()) {
            continue;
        }
        if let Err(error) = app.execute_frame(&mut session, &value, &mut sink) {
            eprintln!("closing connection {peer}: {error}");
            break;
        }
    }

    app.disconnect(&mut session);
}
