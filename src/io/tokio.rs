// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the Tokio I/O provider.

// NOTE: In this provider, I/O error handling is generally to exit the
// task. The run_with_respawning function acts as a supervisor that will
// respawn the TCP acceptor and UDP receivers, after a delay if they
// crash quickly, when they exit with an error or a panic.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc};

use super::UDP_BUFFER_SIZE;
use crate::server::axfr::{self, Category};
use crate::server::{QueryOutcome, Server};

/// A Tokio I/O provider.
///
/// This provider uses asynchronous I/O and runs the server by spawning
/// tasks on a Tokio runtime. Each received UDP query is handled in its
/// own task, as is each accepted TCP connection (which may only be used
/// for a zone transfer).
///
/// The `TokioIoProvider` supports graceful shutdown. To initiate a
/// graceful shutdown, use the [`TokioShutdownController`] returned by
/// [`TokioIoProvider::start`].
pub struct TokioIoProvider {
    tcp_listeners: Vec<TcpListener>,
    udp_sockets: Vec<Arc<UdpSocket>>,
}

impl TokioIoProvider {
    /// Creates a new `TokioIoProvider`. This call binds TCP and UDP
    /// sockets in preparation, but does not start the server. This
    /// function requires that the Tokio runtime be active.
    pub async fn bind<T, U>(tcp_addrs: T, udp_addrs: U) -> io::Result<Self>
    where
        T: IntoIterator<Item = SocketAddr>,
        U: IntoIterator<Item = SocketAddr>,
    {
        let mut tcp_listeners = Vec::new();
        for addr in tcp_addrs {
            let listener = TcpListener::bind(addr).await?;
            tcp_listeners.push(listener);
        }

        let mut udp_sockets = Vec::new();
        for addr in udp_addrs {
            let socket = UdpSocket::bind(addr).await?;
            udp_sockets.push(Arc::new(socket));
        }

        Ok(Self {
            tcp_listeners,
            udp_sockets,
        })
    }

    /// Returns the local addresses of the bound TCP listeners.
    pub fn tcp_local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.tcp_listeners.iter().map(TcpListener::local_addr).collect()
    }

    /// Returns the local addresses of the bound UDP sockets.
    pub fn udp_local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.udp_sockets.iter().map(|s| s.local_addr()).collect()
    }

    /// Starts the server on the active Tokio runtime.
    ///
    /// This spawns tasks on the active Tokio runtime and then returns
    /// a [`TokioShutdownController`] that can be used to shut down the
    /// tasks at a later time. (The [`TokioShutdownController`] must be
    /// held as long as the server should be running, since dropping it
    /// will trigger shutdown.)
    pub fn start(self, server: &Arc<Server>) -> TokioShutdownController {
        let (shutdown_controller, shutdown_handle) = make_shutdown_channels();

        for tcp_listener in self.tcp_listeners {
            tokio::spawn(run_with_respawning(
                run_tcp_listener,
                shutdown_handle.clone(),
                server.clone(),
                Arc::new(tcp_listener),
            ));
        }

        for udp_socket in self.udp_sockets {
            tokio::spawn(run_with_respawning(
                run_udp_receiver,
                shutdown_handle.clone(),
                server.clone(),
                udp_socket,
            ));
        }

        shutdown_controller
    }
}

/// How long to wait between respawns of a task. This is to prevent
/// tasks that crash immediately from using up significant CPU time.
const TASK_RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// Runs a Tokio task, respawning it if it returns an I/O error, is
/// cancelled, or panics.
async fn run_with_respawning<F, G, S>(
    f: F,
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    socket: S,
) where
    F: Fn(ShutdownHandle, Arc<Server>, S) -> G,
    G: Future<Output = io::Result<()>> + Send + 'static,
    S: Clone,
{
    loop {
        let last_spawn_time = Instant::now();
        match tokio::spawn(f(shutdown.clone(), server.clone(), socket.clone())).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => log_io_error(e),
            Err(e) if e.is_panic() => error!("Server task panicked; respawning"),
            Err(_) => (),
        }

        // If necessary, wait before respawning, but receive shutdown
        // requests immediately.
        let since_last_spawn = Instant::now().duration_since(last_spawn_time);
        if let Some(duration_to_wait) = TASK_RESPAWN_DELAY.checked_sub(since_last_spawn) {
            tokio::select! {
                _ = shutdown.request_receiver.recv() => return,
                _ = tokio::time::sleep(duration_to_wait) => (),
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TCP (ZONE TRANSFERS)                                               //
////////////////////////////////////////////////////////////////////////

/// The TCP listener/accept loop.
async fn run_tcp_listener(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    listener: Arc<TcpListener>,
) -> io::Result<()> {
    loop {
        let (client, client_addr) = tokio::select! {
            _ = shutdown.request_receiver.recv() => return Ok(()),
            res = listener.accept() => res?,
        };
        let shutdown = shutdown.clone();
        let server = server.clone();
        tokio::spawn(async move {
            let handler = tokio::spawn(handle_tcp_connection(shutdown, server, client, client_addr));
            if let Err(e) = handler.await {
                if e.is_panic() {
                    error!("Zone transfer handler for {client_addr} panicked");
                }
            }
        });
    }
}

/// Serves a zone transfer over a TCP connection and then closes it.
async fn handle_tcp_connection(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    mut stream: TcpStream,
    client_addr: SocketAddr,
) {
    let result = tokio::select! {
        _ = shutdown.request_receiver.recv() => return,
        result = axfr::serve_transfer(&server, &mut stream, client_addr.ip()) => result,
    };

    match result {
        Ok(transfer) => info!(
            "AXFR of {} ({} records{}) served to {}",
            transfer.zone,
            transfer.records,
            match transfer.key_name {
                Some(ref name) => format!(", signed with {name}"),
                None => String::new(),
            },
            client_addr,
        ),
        Err(e) => match e.category() {
            Category::Unauthorized => warn!("AXFR denied for {}", client_addr.ip()),
            Category::Protocol => warn!("AXFR request from {client_addr} rejected: {e}"),
            Category::Signing => error!("AXFR to {client_addr} aborted: {e}"),
            Category::Io => warn!("AXFR to {client_addr} failed: {e}"),
        },
    }

    if let Err(e) = stream.shutdown().await {
        debug!("Failed to shut down connection to {client_addr}: {e}");
    }
}

////////////////////////////////////////////////////////////////////////
// UDP (QUERIES)                                                      //
////////////////////////////////////////////////////////////////////////

/// The UDP receiver loop.
async fn run_udp_receiver(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    socket: Arc<UdpSocket>,
) -> io::Result<()> {
    loop {
        let mut received_buf = vec![0; UDP_BUFFER_SIZE];

        // Receive a DNS message (or a shutdown request).
        let (received_len, src) = tokio::select! {
            _ = shutdown.request_receiver.recv() => return Ok(()),
            res = socket.recv_from(&mut received_buf) => res?,
        };
        received_buf.truncate(received_len);

        // In a new Tokio task, process the DNS message and send the
        // response (if any).
        let shutdown = shutdown.wait_sender.clone();
        let server = server.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            if let Some(response) = answer_query(&server, &received_buf, src) {
                if let Err(e) = socket.send_to(&response, src).await {
                    warn!("Failed to send response to {src}: {e}");
                }
            }

            // This ensures that the shutdown handle is moved into the
            // new task.
            drop(shutdown);
        });
    }
}

/// Runs the server's query handler, catching any panic, and returns
/// the response to send back to `src`.
fn answer_query(server: &Server, received: &[u8], src: SocketAddr) -> Option<Vec<u8>> {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| server.handle_query(received))) {
        Ok(outcome) => outcome,
        Err(_) => {
            error!("Query handler panicked on a message from {src}; dropping it");
            return None;
        }
    };
    match &outcome {
        QueryOutcome::Malformed(e) => info!("Dropped malformed query from {src}: {e}"),
        QueryOutcome::WrongClass(class) => {
            info!("Dropped query of class {class} from {src}")
        }
        QueryOutcome::Failed(e) => error!("Failed to build response for {src}: {e}"),
        QueryOutcome::Answered(_) | QueryOutcome::NotFound(_) => (),
    }
    outcome.into_response()
}

////////////////////////////////////////////////////////////////////////
// GRACEFUL SHUTDOWN                                                  //
////////////////////////////////////////////////////////////////////////

/// Controls the shutdown of a server's Tokio tasks.
///
/// This type is used to shut down the Tokio tasks spawned by
/// [`TokioIoProvider::start`]. Use
/// [`TokioShutdownController::shut_down`] or its blocking variant,
/// [`TokioShutdownController::blocking_shut_down`], to initiate
/// shutdown and wait for its completion. Dropping the controller will
/// also trigger shutdown (but will not wait for it to complete).
#[must_use]
pub struct TokioShutdownController {
    request_sender: broadcast::Sender<()>,
    wait_receiver: mpsc::Receiver<()>,
}

impl TokioShutdownController {
    /// Requests that running server tasks shut down, and then waits for
    /// them to terminate.
    pub async fn shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.recv().await;
    }

    /// The blocking variant of [`TokioShutdownController::shut_down`].
    pub fn blocking_shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.blocking_recv();
    }
}

/// A handle held by tasks to interact with the graceful shutdown
/// mechanism.
///
/// Tasks listen for shutdown by waiting for all senders attached to
/// `request_receiver` to close, and shutdown does not complete until
/// every `wait_sender` is dropped. All server tasks therefore own a
/// `ShutdownHandle` (or at least the `wait_sender` component).
struct ShutdownHandle {
    request_receiver: broadcast::Receiver<()>,
    wait_sender: mpsc::Sender<()>,
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        // The shutdown signal is the senders being dropped, not a
        // value, so values missed by resubscribing don't matter.
        ShutdownHandle {
            request_receiver: self.request_receiver.resubscribe(),
            wait_sender: self.wait_sender.clone(),
        }
    }
}

/// Produces a [`TokioShutdownController`] and an initial
/// [`ShutdownHandle`] connected to it.
fn make_shutdown_channels() -> (TokioShutdownController, ShutdownHandle) {
    let (request_sender, request_receiver) = broadcast::channel(1);
    let (wait_sender, wait_receiver) = mpsc::channel(1);
    let controller = TokioShutdownController {
        request_sender,
        wait_receiver,
    };
    let handle = ShutdownHandle {
        request_receiver,
        wait_sender,
    };
    (controller, handle)
}

fn log_io_error(e: io::Error) {
    error!("I/O error: {e}");
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
