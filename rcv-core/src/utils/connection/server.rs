//! WebSocket Server Module
//!
//! This module defines the HTTP/WebSocket server using the `picoserve`
//! framework. Text frames received on `/ws` are interpreted into
//! `VehicleCommand`s and forwarded to the control loop through
//! `CONTROL_CHANNEL`; `/vin` serves the latest battery reading and `/update`
//! accepts a firmware upload while the tail light signals progress.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::{
    join::join,
    select::{select, Either},
};
use embassy_net::Stack;
use embassy_sync::{
    blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex},
    mutex::Mutex,
    signal::Signal,
};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Read;
use hashbrown::HashMap;
use lazy_static::lazy_static;
use picoserve::{
    extract::FromRequest,
    io::embedded_io_async as embedded_aio,
    request::{RequestBody, RequestParts},
    response::{
        ws::{Message, ReadMessageError, SocketRx, SocketTx, WebSocketCallback, WebSocketUpgrade},
        Json, StatusCode,
    },
    Router,
};

use crate::utils::{
    connection::commands::VehicleCommand,
    controllers::{battery, BatteryStatus, ControlEvent, UpdateOutcome, CONTROL_CHANNEL},
};

/// Cadence of the keep-alive text sent to every connected client.
pub const PING_INTERVAL: Duration = Duration::from_secs(5);
/// Keep-alive payload.
pub const PING_TEXT: &str = "PING";

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

pub struct WebSocket {
    pub client_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub connected_at: u64,
    pub last_seen: u64,
}

/// Bookkeeping for connected control clients, keyed by client id.
pub struct SessionManager;

lazy_static! {
    pub static ref SESSION_STORE: Mutex<CriticalSectionRawMutex, HashMap<u32, SessionState>> =
        Mutex::new(HashMap::new());
}

type CloseReason = Option<(u16, &'static str)>;

impl WebSocket {
    /// Allocate a websocket handler with a fresh client id.
    pub fn next() -> Self {
        WebSocket {
            client_id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    async fn forward(
        &self,
        frame: &str,
    ) {
        SessionManager::update_session(self.client_id, Instant::now().as_millis()).await;
        let cmd = VehicleCommand::parse(frame);
        if cmd == VehicleCommand::Unrecognized {
            tracing::warn!(client_id = self.client_id, frame, "unrecognized command");
        }
        CONTROL_CHANNEL.send(ControlEvent::Command(cmd)).await;
    }

    /// Read frames until the client closes or errors, pinging it every
    /// `PING_INTERVAL`.
    ///
    /// The reader and the pinger run side by side and share `tx`. A frame read
    /// is never dropped half way; the pinger stops once the reader is done.
    async fn serve<Reader, Writer>(
        &self,
        rx: &mut SocketRx<Reader>,
        tx: &mut SocketTx<Writer>,
    ) -> Result<CloseReason, Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let tx = Mutex::<NoopRawMutex, _>::new(tx);
        let done = Signal::<NoopRawMutex, ()>::new();

        let reader = async {
            let served = self.read_frames(rx, &tx).await;
            done.signal(());
            served
        };
        let (served, pinged) = join(reader, ping_until(&tx, &done, PING_INTERVAL)).await;
        pinged?;
        served
    }

    async fn read_frames<Reader, Writer>(
        &self,
        rx: &mut SocketRx<Reader>,
        tx: &Mutex<NoopRawMutex, &mut SocketTx<Writer>>,
    ) -> Result<CloseReason, Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let mut buffer = [0; 512];

        loop {
            match rx.next_message(&mut buffer).await {
                Ok(Message::Pong(_)) => continue,
                Ok(Message::Ping(data)) => tx.lock().await.send_pong(data).await?,
                Ok(Message::Close(reason)) => {
                    tracing::info!(client_id = self.client_id, ?reason, "websocket closed");
                    return Ok(None);
                }
                Ok(Message::Text(frame)) => self.forward(frame).await,
                Ok(Message::Binary(data)) => match core::str::from_utf8(data) {
                    Ok(frame) => self.forward(frame).await,
                    Err(_) => tracing::warn!(client_id = self.client_id, "non-utf8 binary frame dropped"),
                },
                Err(error) => {
                    tracing::error!(client_id = self.client_id, ?error, "websocket error");
                    let code = match error {
                        ReadMessageError::TextIsNotUtf8 => 1007,
                        ReadMessageError::ReservedOpcode(_) => 1003,
                        ReadMessageError::ReadFrameError(_)
                        | ReadMessageError::UnexpectedMessageStart
                        | ReadMessageError::MessageStartsWithContinuation => 1002,
                        ReadMessageError::Io(err) => return Err(err),
                    };
                    return Ok(Some((code, "Websocket Error")));
                }
            }
        }
    }
}

/// Outbound half of a control connection that can carry the keep-alive text.
trait KeepAlive {
    type Error;

    async fn send_keep_alive(&mut self) -> Result<(), Self::Error>;
}

impl<W: embedded_aio::Write> KeepAlive for SocketTx<W> {
    type Error = W::Error;

    async fn send_keep_alive(&mut self) -> Result<(), W::Error> {
        self.send_text(PING_TEXT).await
    }
}

/// Send a keep-alive every `interval` until `done` is signaled.
///
/// Only the timer and the signal are ever cancelled here; a keep-alive that
/// has started is always written in full.
async fn ping_until<T: KeepAlive>(
    tx: &Mutex<NoopRawMutex, &mut T>,
    done: &Signal<NoopRawMutex, ()>,
    interval: Duration,
) -> Result<(), T::Error> {
    loop {
        match select(Timer::after(interval), done.wait()).await {
            Either::First(()) => tx.lock().await.send_keep_alive().await?,
            Either::Second(()) => return Ok(()),
        }
    }
}

/// Handles incoming WebSocket connections.
impl WebSocketCallback for WebSocket {
    async fn run<Reader, Writer>(
        self,
        mut rx: SocketRx<Reader>,
        mut tx: SocketTx<Writer>,
    ) -> Result<(), Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let now = Instant::now().as_millis();
        SessionManager::create_session(self.client_id, now).await;
        tracing::info!(
            client_id = self.client_id,
            clients = SessionManager::session_count().await,
            "control client connected"
        );

        let served = self.serve(&mut rx, &mut tx).await;

        // Any way out of the loop is a disconnect for the control loop.
        if let Some(session) = SessionManager::remove_session(self.client_id).await {
            tracing::info!(
                client_id = self.client_id,
                active_ms = session.last_seen.saturating_sub(session.connected_at),
                "session ended"
            );
        }
        CONTROL_CHANNEL.send(ControlEvent::Disconnected).await;

        tx.close(served?).await
    }
}

impl SessionManager {
    /// Creates a new session with the given client ID and timestamp.
    pub async fn create_session(
        client_id: u32,
        timestamp: u64,
    ) {
        SESSION_STORE.lock().await.insert(
            client_id,
            SessionState {
                connected_at: timestamp,
                last_seen: timestamp,
            },
        );
    }

    /// Updates the last seen timestamp. Returns true if the session exists.
    pub async fn update_session(
        client_id: u32,
        timestamp: u64,
    ) -> bool {
        if let Some(session) = SESSION_STORE.lock().await.get_mut(&client_id) {
            session.last_seen = timestamp;
            true
        } else {
            false
        }
    }

    /// Removes the session, returning its final state.
    pub async fn remove_session(client_id: u32) -> Option<SessionState> {
        SESSION_STORE.lock().await.remove(&client_id)
    }

    pub async fn session_count() -> usize {
        SESSION_STORE.lock().await.len()
    }
}

/// Firmware upload body, drained while the control loop signals progress.
///
/// Writing the image to flash is left to the platform; this extractor only
/// brackets the transfer with `UpdateStarted` / `UpdateFinished`.
pub struct FirmwareUpload {
    pub received: usize,
    pub outcome: UpdateOutcome,
}

impl<'r, S> FromRequest<'r, S> for FirmwareUpload {
    type Rejection = &'static str;

    async fn from_request<R: Read>(
        _state: &'r S,
        _parts: RequestParts<'r>,
        body: RequestBody<'r, R>,
    ) -> Result<Self, Self::Rejection> {
        let expected = body.content_length();
        if expected == 0 {
            return Err("Empty firmware upload");
        }

        tracing::info!(bytes = expected, "firmware upload started");
        CONTROL_CHANNEL.send(ControlEvent::UpdateStarted).await;

        let mut reader = body.reader();
        let mut chunk = [0u8; 512];
        let mut received = 0usize;
        let outcome = loop {
            match reader.read(&mut chunk).await {
                Ok(0) if received == expected => break UpdateOutcome::Success,
                Ok(0) => break UpdateOutcome::Failure,
                Ok(n) => received += n,
                Err(_) => break UpdateOutcome::Failure,
            }
        };

        tracing::info!(received, expected, ?outcome, "firmware upload finished");
        CONTROL_CHANNEL.send(ControlEvent::UpdateFinished(outcome)).await;

        Ok(FirmwareUpload { received, outcome })
    }
}

/// Body of `/vin`: the latest reading, or 503 until one has been published.
pub fn battery_reply(
    status: Option<BatteryStatus>,
) -> Result<Json<BatteryStatus>, (StatusCode, &'static str)> {
    status
        .map(Json)
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "Battery not sampled yet"))
}

/// Creates the HTTP/WebSocket server and serves forever.
pub async fn run(
    id: usize,
    port: u16,
    stack: Stack<'static>,
    config: Option<&'static picoserve::Config<Duration>>,
) -> ! {
    let default_config = picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: None,
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    });

    let config = config.unwrap_or(&default_config);

    let router = Router::new()
        // Control channel on "/ws"
        .route(
            "/ws",
            picoserve::routing::get(|upgrade: WebSocketUpgrade| async move {
                upgrade.on_upgrade(WebSocket::next())
            }),
        )
        // Battery status on "/vin"
        .route(
            "/vin",
            picoserve::routing::get(|| async { battery_reply(battery::latest()) }),
        )
        // Firmware upload on "/update"
        .route(
            "/update",
            picoserve::routing::post(|upload: FirmwareUpload| async move {
                match upload.outcome {
                    UpdateOutcome::Success => "OK",
                    UpdateOutcome::Failure => "FAIL",
                }
            }),
        );

    if let Some(ip_cfg) = stack.config_v4() {
        tracing::info!("Starting server at {}:{}", ip_cfg.address, port);
    } else {
        tracing::warn!("Starting server on port {port}, but no IPv4 address is assigned yet!");
    }

    let (mut rx_buffer, mut tx_buffer, mut http_buffer) = ([0; 1024], [0; 1024], [0; 4096]);

    picoserve::listen_and_serve_with_state(
        id,
        &router,
        config,
        stack,
        port,
        &mut rx_buffer,
        &mut tx_buffer,
        &mut http_buffer,
        &(),
    )
    .await
}
