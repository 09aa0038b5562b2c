//! Component wiring
//!
//! Builds the queue store, event bus, session coordinator and sink side, and
//! runs the background tasks until shutdown.

use crate::api::AppContext;
use crate::backend::ExtensionRegistry;
use crate::queue::QueueStore;
use crate::session::SessionCoordinator;
use crate::sink::{
    PlaybackSink, SinkSynchronizer, TransportControls, TransportMonitor, VirtualSink,
};
use cadence_common::config::{SessionConfig, SinkConfig};
use cadence_common::events::{EventBus, TransportState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Running player components
pub struct Player {
    pub session: Arc<SessionCoordinator>,
    pub sink: Arc<VirtualSink>,
    pub transport: watch::Receiver<TransportState>,
    pub shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Player {
    /// Wire all components and spawn the background tasks
    ///
    /// Must be called from within a Tokio runtime. No extension is bound yet;
    /// see [`SessionCoordinator::bind_default`].
    pub fn start(
        registry: ExtensionRegistry,
        session_config: SessionConfig,
        sink: &SinkConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let store = Arc::new(QueueStore::new());
        let bus = Arc::new(EventBus::new(session_config.event_capacity));
        let virtual_sink = Arc::new(VirtualSink::new(sink.default_track_ms));

        let (controls, control_rx) = TransportControls::channel();
        let synchronizer = SinkSynchronizer::new(
            virtual_sink.clone() as Arc<dyn PlaybackSink>,
            store.clone(),
            control_rx,
        );
        let (monitor, transport) =
            TransportMonitor::new(virtual_sink.as_ref(), store.clone(), bus.clone());

        let tasks = vec![
            tokio::spawn(synchronizer.run(shutdown.clone())),
            tokio::spawn(monitor.run(shutdown.clone())),
            virtual_sink
                .clone()
                .spawn_clock(Duration::from_millis(sink.tick_ms), shutdown.clone()),
        ];

        let session = Arc::new(SessionCoordinator::new(
            store,
            registry,
            controls,
            bus,
            session_config,
        ));
        info!("Player components started");

        Self {
            session,
            sink: virtual_sink,
            transport,
            shutdown,
            tasks,
        }
    }

    /// Context for the HTTP layer
    pub fn context(&self) -> AppContext {
        AppContext {
            session: self.session.clone(),
            transport: self.transport.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Cancel the background tasks and wait for them to finish
    pub async fn stop(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Player components stopped");
    }
}
