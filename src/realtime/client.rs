//! Connection lifecycle manager
//!
//! A [`RealtimeClient`] owns one transport and drives it through
//! Idle → Connecting → Connected → Disconnecting → ShutDown. All state lives
//! on a single task: the event loop selects over transport events,
//! control requests from [`RealtimeHandle`]s and the keepalive and reconnect
//! deadlines, and handles each to completion before taking the next.
//!
//! The individual transition methods are public so the state machine can be
//! stepped deterministically in tests without spawning the loop.

use super::backoff::{ReconnectConfig, ReconnectionDecision};
use super::dispatch::{DispatchOutcome, HandlerRegistry, InboundDispatcher, ParserRegistry};
use super::publish::PublishPipeline;
use super::state::ConnectionState;
use super::timer::Timer;
use super::ClientEvent;
use crate::config::{ConfigError, RealtimeConfig};
use crate::error::{sanitize_error_message, RealtimeError, RealtimeResult};
use crate::protocol::{
    Command, IrisState, IrisSubscribe, SessionNegotiator, SubscriptionSet, TopicRegistry,
    UpdateSubscriptions,
};
use crate::transport::{
    BrokerEndpoint, ConnectParams, EventReceiver, Transport, TransportEvent,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn, Instrument};

const CONTROL_CHANNEL_CAPACITY: usize = 32;
const CLIENT_EVENT_CAPACITY: usize = 64;

/// Connection settings for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub endpoint: BrokerEndpoint,
    pub client_id: String,
    pub connect_timeout: Duration,
    /// Maximum silence before the session is considered dead
    pub keepalive: Duration,
    pub reconnect: ReconnectConfig,
}

impl ClientOptions {
    pub fn new(endpoint: BrokerEndpoint) -> Self {
        Self {
            endpoint,
            client_id: "mqttwsclient".to_string(),
            connect_timeout: Duration::from_secs(5),
            keepalive: Duration::from_secs(900),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: config.endpoint()?,
            client_id: config.broker.client_id.clone(),
            connect_timeout: config.connect_timeout(),
            keepalive: config.keepalive(),
            reconnect: config.reconnect.clone(),
        })
    }
}

/// Requests sent from handles to the event loop
enum Control {
    Start(oneshot::Sender<RealtimeResult<()>>),
    Stop(oneshot::Sender<()>),
    Send(Box<dyn Command>, oneshot::Sender<RealtimeResult<()>>),
}

pub struct RealtimeClient<T: Transport> {
    options: ClientOptions,
    transport: T,
    negotiator: SessionNegotiator,
    subscriptions: SubscriptionSet,
    iris_state: Option<IrisState>,
    publisher: PublishPipeline,
    dispatcher: InboundDispatcher,
    events: broadcast::Sender<ClientEvent>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    keepalive: Timer,
    reconnect: Timer,
    attempts: u32,
    shutting_down: bool,
}

impl<T: Transport> RealtimeClient<T> {
    pub fn new(transport: T, negotiator: SessionNegotiator, options: ClientOptions) -> Self {
        let topics = Arc::new(TopicRegistry::new());
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let subscriptions = SubscriptionSet::plan(negotiator.user_id(), negotiator.flags());

        Self {
            options,
            transport,
            subscriptions,
            iris_state: None,
            publisher: PublishPipeline::new(topics.clone()),
            dispatcher: InboundDispatcher::new(
                topics,
                ParserRegistry::new(),
                HandlerRegistry::new(),
                events.clone(),
            ),
            negotiator,
            events,
            state: ConnectionState::Idle,
            state_tx,
            keepalive: Timer::new("keepalive"),
            reconnect: Timer::new("reconnect"),
            attempts: 0,
            shutting_down: false,
        }
    }

    /// Build a client from a loaded configuration
    pub fn from_config(transport: T, config: &RealtimeConfig) -> RealtimeResult<Self> {
        let negotiator = SessionNegotiator::new(
            config.device_identity()?,
            config.account.user_id,
            config.feature_flags(),
            config.app_info(),
        )?;
        Ok(Self::new(transport, negotiator, ClientOptions::from_config(config)?))
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.dispatcher.set_parsers(parsers);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.dispatcher.set_handlers(handlers);
        self
    }

    /// Resume the message-sync stream from this position on every connect
    pub fn with_iris_state(mut self, state: IrisState) -> Self {
        self.iris_state = Some(state);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn keepalive_deadline(&self) -> Option<tokio::time::Instant> {
        self.keepalive.deadline()
    }

    pub fn reconnect_deadline(&self) -> Option<tokio::time::Instant> {
        self.reconnect.deadline()
    }

    /// Reconnect attempts scheduled since the last successful connect
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Connection state transition");
            self.state = next;
            self.state_tx.send_replace(next);
        }
    }

    fn emit_warning(&self, message: &str) {
        let _ = self
            .events
            .send(ClientEvent::Warning(sanitize_error_message(message)));
    }

    /// Begin connecting. A no-op while connecting or connected; a client
    /// that has been stopped cannot be started again.
    pub async fn start(&mut self) -> RealtimeResult<()> {
        if self.shutting_down || self.state.is_terminal() {
            return Err(RealtimeError::ClientShutDown);
        }
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = ?self.state, "start() ignored, already active");
            return Ok(());
        }

        info!(
            host = %self.options.endpoint.host,
            port = self.options.endpoint.port,
            user_id = self.negotiator.user_id(),
            "Starting realtime client"
        );
        self.attempts = 0;
        self.attempt_connect().await;
        Ok(())
    }

    /// Request shutdown. Idempotent.
    pub async fn stop(&mut self) {
        if self.shutting_down {
            debug!("stop() ignored, shutdown already requested");
            return;
        }
        self.shutting_down = true;
        self.keepalive.cancel();
        self.reconnect.cancel();

        if self.state == ConnectionState::Idle {
            self.set_state(ConnectionState::ShutDown);
            return;
        }

        info!("Stopping realtime client");
        self.set_state(ConnectionState::Disconnecting);
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Transport disconnect failed");
        }
        if !self.transport.is_connected() {
            self.set_state(ConnectionState::ShutDown);
        }
    }

    /// Publish a command through the pipeline; requires an open session
    pub async fn send_command(&mut self, command: &dyn Command) -> RealtimeResult<()> {
        if !self.state.can_publish() || !self.transport.is_connected() {
            return Err(RealtimeError::NotConnected { state: self.state });
        }
        self.publisher.publish(&mut self.transport, command).await
    }

    async fn attempt_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);

        let handshake = match self.negotiator.build(Utc::now()) {
            Ok(handshake) => handshake,
            Err(e) => {
                error!(error = %e, "Failed to build handshake");
                self.schedule_reconnect();
                return;
            }
        };

        let params = ConnectParams {
            endpoint: self.options.endpoint.clone(),
            client_id: self.options.client_id.clone(),
            handshake,
            timeout: self.options.connect_timeout,
        };

        debug!(attempt = self.attempts, "Opening transport session");
        if let Err(e) = self.transport.connect(params).await {
            warn!(error = %e, attempt = self.attempts, "Connect attempt failed");
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect.is_armed() {
            debug!("Reconnect already scheduled");
            return;
        }

        match self
            .options
            .reconnect
            .next_attempt(self.attempts, self.shutting_down)
        {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.attempts = attempt;
                info!(attempt, delay_ms, "Scheduling reconnect");
                self.reconnect.rearm(Duration::from_millis(delay_ms));
            }
            ReconnectionDecision::AbortShutdownRequested => {
                debug!("Reconnect skipped, shutdown requested");
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                error!(attempts = self.attempts, "Reconnect attempts exhausted, shutting down");
                self.shutting_down = true;
                self.keepalive.cancel();
                self.set_state(ConnectionState::ShutDown);
                self.emit_warning(&format!(
                    "Giving up after {} failed reconnect attempts",
                    self.attempts
                ));
            }
        }
    }

    /// Reconnect deadline reached
    pub async fn on_reconnect_due(&mut self) {
        self.reconnect.cancel();
        if self.shutting_down {
            return;
        }
        self.attempt_connect().await;
    }

    /// Keepalive deadline reached without traffic
    pub async fn on_keepalive_expired(&mut self) {
        self.keepalive.cancel();
        if self.shutting_down {
            return;
        }
        warn!(
            keepalive_secs = self.options.keepalive.as_secs(),
            "No traffic within keepalive window, forcing disconnect"
        );
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Forced disconnect failed");
        }
    }

    /// Apply one transport event to the state machine
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => debug!("Transport opened"),
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Closed { reason } => self.on_closed(reason),
            TransportEvent::Message { topic, payload } => {
                self.record_traffic();
                let outcome = self.dispatcher.dispatch(&topic, &payload);
                if let DispatchOutcome::Dropped { topic, reason } = &outcome {
                    trace!(topic = %topic, ?reason, "Envelope dropped");
                }
            }
            TransportEvent::PingCompleted | TransportEvent::PublishCompleted => {
                self.record_traffic();
            }
            TransportEvent::Warning(message) => warn!(message = %message, "Transport warning"),
            TransportEvent::Error(message) => error!(message = %message, "Transport error"),
        }
    }

    fn record_traffic(&mut self) {
        if self.state == ConnectionState::Connected && !self.shutting_down {
            self.keepalive.rearm(self.options.keepalive);
        }
    }

    async fn on_connected(&mut self) {
        if self.shutting_down {
            debug!("Session opened after stop, closing it");
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "Transport disconnect failed");
            }
            return;
        }
        if self.state == ConnectionState::Connected {
            debug!("Duplicate connected event, subscriptions already sent");
            self.keepalive.rearm(self.options.keepalive);
            return;
        }

        info!(attempts = self.attempts, "Connected to broker");
        self.set_state(ConnectionState::Connected);
        self.reconnect.cancel();
        self.attempts = 0;
        self.keepalive.rearm(self.options.keepalive);
        self.subscribe_all().await;
    }

    async fn subscribe_all(&mut self) {
        let mut commands: Vec<Box<dyn Command>> = Vec::new();
        if !self.subscriptions.pubsub.is_empty() {
            commands.push(Box::new(UpdateSubscriptions::pubsub(
                self.subscriptions.pubsub.clone(),
                Vec::new(),
            )));
        }
        if !self.subscriptions.graphql.is_empty() {
            commands.push(Box::new(UpdateSubscriptions::graphql(
                self.subscriptions.graphql.clone(),
                Vec::new(),
            )));
        }
        if self.negotiator.flags().iris_enabled {
            match self.iris_state {
                Some(state) => commands.push(Box::new(IrisSubscribe { state })),
                None => debug!("Iris enabled without a sync position, skipping iris subscribe"),
            }
        }

        for command in commands {
            if let Err(e) = self
                .publisher
                .publish(&mut self.transport, command.as_ref())
                .await
            {
                warn!(topic = %command.topic(), error = %e, "Subscription publish failed");
            }
        }
    }

    fn on_closed(&mut self, reason: Option<String>) {
        self.keepalive.cancel();

        if self.shutting_down {
            if self.state != ConnectionState::ShutDown {
                self.reconnect.cancel();
                self.set_state(ConnectionState::ShutDown);
                info!("Realtime client shut down");
            }
            return;
        }
        if self.state == ConnectionState::Idle {
            return;
        }

        warn!(reason = reason.as_deref().unwrap_or("unknown"), "Connection closed");
        self.set_state(ConnectionState::Connecting);
        self.schedule_reconnect();
    }

    async fn handle_control(&mut self, request: Control) {
        match request {
            Control::Start(reply) => {
                let _ = reply.send(self.start().await);
            }
            Control::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(());
            }
            Control::Send(command, reply) => {
                let _ = reply.send(self.send_command(command.as_ref()).await);
            }
        }
    }

    /// Drive the client until it reaches `ShutDown`
    ///
    /// When every handle is dropped the client stops itself.
    async fn run(mut self, mut events: EventReceiver, mut control: mpsc::Receiver<Control>) {
        let mut control_open = true;

        while !self.state.is_terminal() {
            let keepalive = self.keepalive.deadline();
            let reconnect = self.reconnect.deadline();

            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_transport_event(event).await;
                }
                request = control.recv(), if control_open => match request {
                    Some(request) => self.handle_control(request).await,
                    None => {
                        debug!("All client handles dropped");
                        control_open = false;
                        self.stop().await;
                    }
                },
                _ = Timer::expired(keepalive) => {
                    self.on_keepalive_expired().await;
                }
                _ = Timer::expired(reconnect) => {
                    self.on_reconnect_due().await;
                }
                else => break,
            }
        }

        debug!("Client event loop finished");
    }
}

impl<T: Transport + 'static> RealtimeClient<T> {
    /// Run the event loop on its own task
    pub fn spawn(self, events: EventReceiver) -> (RealtimeHandle, JoinHandle<()>) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let handle = RealtimeHandle {
            control: control_tx,
            state: self.state_tx.subscribe(),
            events: self.events.clone(),
        };
        let span = crate::lifecycle_span!(user_id = self.negotiator.user_id());
        let task = tokio::spawn(self.run(events, control_rx).instrument(span));
        (handle, task)
    }
}

/// Cloneable front end to a spawned [`RealtimeClient`]
#[derive(Clone)]
pub struct RealtimeHandle {
    control: mpsc::Sender<Control>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
}

impl RealtimeHandle {
    pub async fn start(&self) -> RealtimeResult<()> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Start(reply))
            .await
            .map_err(|_| RealtimeError::ClientShutDown)?;
        rx.await.map_err(|_| RealtimeError::ClientShutDown)?
    }

    /// Stop the client; succeeds even if it already shut down
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.control.send(Control::Stop(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn send_command(&self, command: Box<dyn Command>) -> RealtimeResult<()> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Send(command, reply))
            .await
            .map_err(|_| RealtimeError::ClientShutDown)?;
        rx.await.map_err(|_| RealtimeError::ClientShutDown)?
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until the client reaches `target`, returning false if the event
    /// loop ended first
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut state = self.state.clone();
        let reached = state.wait_for(|current| *current == target).await.is_ok();
        reached
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}
