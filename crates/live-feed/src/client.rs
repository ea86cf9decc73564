//! # Live Feed Client
//!
//! A single task owns the broker session. It drives the connection state
//! machine, applies inbound updates to the store, sends heartbeats, and
//! forwards outbound messages queued through [`LiveFeedHandle`].

use std::collections::VecDeque;
use std::future;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use bytes::Bytes;
use realtime::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use vehicle_state::{ApplyOutcome, DiagnosticLog, VehicleStateStore};

use crate::channel::{Channel, Frame, Session};
use crate::config::FeedConfig;
use crate::decode::{self, VehicleUpdate};
use crate::state::{Action, ConnectionMachine, ConnectionState, Event};

const OUTBOUND_BUFFER: usize = 64;

/// Live feed client, ready to be started.
pub struct LiveFeedClient<C: Channel> {
    channel: C,
    store: VehicleStateStore,
    diagnostics: DiagnosticLog,
    config: FeedConfig,
}

impl<C: Channel> LiveFeedClient<C> {
    #[must_use]
    pub const fn new(
        channel: C, store: VehicleStateStore, diagnostics: DiagnosticLog, config: FeedConfig,
    ) -> Self {
        Self { channel, store, diagnostics, config }
    }

    /// Spawn the connection task. Must be called within a tokio runtime.
    #[must_use]
    pub fn start(self) -> LiveFeedHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let cancel = CancellationToken::new();

        let driver = Driver {
            machine: ConnectionMachine::new(self.config.reconnect.clone()),
            channel: self.channel,
            store: self.store,
            diagnostics: self.diagnostics,
            config: self.config,
            session: None,
            heartbeat: None,
            last_inbound: Instant::now(),
            reconnect_at: None,
            state: state_tx,
            outbound: outbound_rx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run());

        LiveFeedHandle {
            state: state_rx,
            outbound: outbound_tx,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Control handle for a running client. Clones control the same client.
#[derive(Debug, Clone)]
pub struct LiveFeedHandle {
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LiveFeedHandle {
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Receiver notified on every connection state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Queue a message for `destination`.
    ///
    /// Messages queued while disconnected are dropped and logged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Channel`] once the client has stopped.
    pub async fn send(
        &self, destination: impl Into<String>, payload: impl Into<Bytes>,
    ) -> realtime::Result<()> {
        let outbound = Outbound { destination: destination.into(), payload: payload.into() };
        self.outbound
            .send(outbound)
            .await
            .map_err(|e| Error::Channel(format!("live feed is not running: {e}")))
    }

    /// Stop the client and wait for its task to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!("live feed task failed: {e}");
        }
    }
}

#[derive(Debug)]
struct Outbound {
    destination: String,
    payload: Bytes,
}

struct Driver<C: Channel> {
    channel: C,
    store: VehicleStateStore,
    diagnostics: DiagnosticLog,
    config: FeedConfig,
    machine: ConnectionMachine,
    session: Option<C::Session>,
    heartbeat: Option<Interval>,
    last_inbound: Instant,
    reconnect_at: Option<Instant>,
    state: watch::Sender<ConnectionState>,
    outbound: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
}

impl<C: Channel> Driver<C> {
    async fn run(mut self) {
        let mut events = VecDeque::from([Event::Start]);

        loop {
            while let Some(event) = events.pop_front() {
                let reason = event.reason();
                let before = self.machine.state();
                let actions = self.machine.handle(event);

                let after = self.machine.state();
                if before != after {
                    self.state.send_replace(after);
                    self.record_transition(after, reason.as_deref());
                }

                for action in actions {
                    if let Some(next) = self.execute(action).await {
                        events.push_back(next);
                    }
                }
            }

            if self.machine.state() == ConnectionState::Stopped {
                break;
            }
            let event = self.next_event().await;
            events.push_back(event);
        }
    }

    // waits for the next lifecycle event, handling frames and outbound
    // traffic in the meantime
    async fn next_event(&mut self) -> Event {
        let generation = self.machine.generation();

        loop {
            let silence = self
                .session
                .as_ref()
                .and_then(|_| self.config.heartbeat.deadline(self.last_inbound));

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Event::Shutdown,
                frame = next_frame(&mut self.session) => match frame {
                    None => return Event::Closed { generation },
                    Some(Err(e)) => return Event::Failed { generation, reason: format!("{e:#}") },
                    Some(Ok(frame)) => {
                        self.last_inbound = Instant::now();
                        self.handle_frame(frame);
                    }
                },
                () = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    return Event::ReconnectTimer;
                }
                () = sleep_until(silence) => return Event::HeartbeatTimeout { generation },
                () = tick(&mut self.heartbeat) => {
                    if let Err(e) = self.send_heartbeat().await {
                        return Event::Failed { generation, reason: format!("heartbeat failed: {e:#}") };
                    }
                }
                Some(outbound) = self.outbound.recv() => self.forward(outbound).await,
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::Open { generation } => return self.open(generation).await,
            Action::Resubscribe => self.resubscribe().await,
            Action::ScheduleReconnect { delay, attempt } => {
                self.reconnect_at = Some(Instant::now() + delay);
                self.diagnostics.append(format!(
                    "Reconnecting in {} ms (attempt {attempt})",
                    delay.as_millis()
                ));
            }
            Action::CancelReconnect => self.reconnect_at = None,
            Action::Close => self.close().await,
        }
        None
    }

    async fn open(&mut self, generation: u64) -> Option<Event> {
        let deadline = self.config.connect_deadline(Instant::now());
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Some(Event::Shutdown),
            opened = self.channel.open() => opened,
            () = sleep_until(deadline) => Err(anyhow!(
                "handshake timed out after {} ms",
                self.config.connect_timeout.as_millis()
            )),
        };

        match opened {
            Ok(session) => {
                self.session = Some(session);
                self.heartbeat = self.config.heartbeat.ticker();
                self.last_inbound = Instant::now();
                Some(Event::Opened { generation })
            }
            Err(e) => {
                tracing::warn!(
                    monotonic_counter.live_feed_open_failed = 1,
                    generation,
                    "failed to open live feed: {e:#}"
                );
                Some(Event::Failed { generation, reason: format!("{e:#}") })
            }
        }
    }

    async fn resubscribe(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let vehicle_ids = self.store.vehicle_ids();
        let mut subscribed = 0;
        for vehicle_id in &vehicle_ids {
            let topic = self.config.topic_for(vehicle_id);
            match session.subscribe(&topic).await {
                Ok(()) => subscribed += 1,
                Err(e) => {
                    tracing::warn!(%vehicle_id, "failed to subscribe to {topic}: {e:#}");
                    self.diagnostics
                        .append(format!("Subscribe failed for vehicle {vehicle_id}: {e}"));
                }
            }
        }

        tracing::info!(subscribed, total = vehicle_ids.len(), "subscribed to vehicle topics");
        self.diagnostics
            .append(format!("Subscribed to {subscribed} of {} vehicle topics", vehicle_ids.len()));
    }

    async fn close(&mut self) {
        self.heartbeat = None;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.heartbeat().await,
            None => Ok(()),
        }
    }

    async fn forward(&mut self, outbound: Outbound) {
        let Outbound { destination, payload } = outbound;

        let connected = self.machine.state().is_connected();
        let Some(session) = self.session.as_mut().filter(|_| connected) else {
            tracing::warn!(%destination, "not connected, dropping outbound message");
            self.diagnostics.append(format!("Dropped message to {destination}: not connected"));
            return;
        };

        match session.send(&destination, payload).await {
            Ok(()) => self.diagnostics.append(format!("Sent message to {destination}")),
            Err(e) => {
                tracing::warn!(%destination, "failed to send message: {e:#}");
                self.diagnostics.append(format!("Failed to send message to {destination}: {e}"));
            }
        }
    }

    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Heartbeat => tracing::trace!("heartbeat received"),
            Frame::Message { topic, payload } => match decode::decode(&payload) {
                Ok(update) => self.apply(update),
                Err(e) => {
                    tracing::warn!(
                        monotonic_counter.live_feed_frame_dropped = 1,
                        %topic,
                        "dropping frame: {e}"
                    );
                    self.diagnostics.append(format!("Dropped frame on {topic}: {e}"));
                }
            },
        }
    }

    fn apply(&self, update: VehicleUpdate) {
        let VehicleUpdate { vehicle_id, sample } = update;

        match self.store.apply_update(&vehicle_id, &sample) {
            ApplyOutcome::Applied => {
                tracing::debug!(
                    monotonic_counter.live_feed_update_applied = 1,
                    %vehicle_id,
                    "update applied"
                );
                let (latitude, longitude) = sample.coordinates().unwrap_or_default();
                self.diagnostics.append(format!(
                    "Vehicle {vehicle_id} at {latitude:.5}, {longitude:.5}"
                ));
            }
            ApplyOutcome::Dropped(reason) => {
                tracing::debug!(%vehicle_id, %reason, "update dropped");
                self.diagnostics.append(format!("Dropped update for vehicle {vehicle_id}: {reason}"));
            }
        }
    }

    fn record_transition(&self, state: ConnectionState, reason: Option<&str>) {
        let attempts = self.machine.attempts();
        let reason = reason.unwrap_or("unknown");

        let message = match state {
            ConnectionState::Idle => return,
            ConnectionState::Connecting if attempts > 0 => {
                format!("Reconnecting to live feed (attempt {attempts})")
            }
            ConnectionState::Connecting => "Connecting to live feed".to_string(),
            ConnectionState::Connected => "Connected to live feed".to_string(),
            ConnectionState::Disconnected { will_reconnect: true } => {
                format!("Disconnected from live feed: {reason}")
            }
            ConnectionState::Disconnected { will_reconnect: false } => {
                format!("Disconnected from live feed: {reason}; giving up after {attempts} attempts")
            }
            ConnectionState::Stopped => "Live feed stopped".to_string(),
        };

        tracing::info!(%state, "{message}");
        self.diagnostics.append(message);
    }
}

async fn next_frame<S: Session>(session: &mut Option<S>) -> Option<Result<Frame>> {
    match session {
        Some(session) => session.next().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
