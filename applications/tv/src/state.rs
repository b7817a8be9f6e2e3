/// Player state wiring the session controller to its collaborators
use crate::catalog::Library;
use crate::config::TvConfig;
use crate::error::Result;
use crate::sim_engine::SimulatedEngine;
use couch_core::{MemoryFavoriteStore, MemoryResumeStore};
use couch_playback::{
    NetworkMonitor, NetworkStatus, Services, SessionController, SessionHandle, SessionRuntime,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct PlayerState {
    pub session: SessionHandle,
    pub network: NetworkMonitor,
    pub library: Arc<Library>,
    pub engine: Arc<SimulatedEngine>,
    pub resume: Arc<MemoryResumeStore>,
    pub favorites: Arc<MemoryFavoriteStore>,
    runtime: JoinHandle<()>,
}

impl PlayerState {
    /// Build collaborators and start the session runtime
    pub fn new(config: &TvConfig, library: Library) -> Result<Self> {
        let library = Arc::new(library);

        let network = NetworkMonitor::new();
        network.start();
        if config.library.offline {
            network.report(NetworkStatus::Offline);
        }

        let resume = Arc::new(MemoryResumeStore::new());
        let favorites = Arc::new(MemoryFavoriteStore::new());
        let services = Services::new(
            resume.clone(),
            favorites.clone(),
            Arc::new(library.catalog()),
            network.clone(),
        );

        let engine = Arc::new(SimulatedEngine::new(
            library.media(),
            Duration::from_millis(config.engine.load_delay_ms),
        ));

        let controller = SessionController::new(config.playback.clone(), services, engine.clone())?;
        let (session, runtime) = SessionRuntime::spawn(controller);

        Ok(Self {
            session,
            network,
            library,
            engine,
            resume,
            favorites,
            runtime,
        })
    }

    /// Close the session and wait for the runtime to stop
    pub async fn shutdown(self) {
        if let Err(e) = self.session.close().await {
            tracing::debug!("Close on shutdown: {}", e);
        }
        drop(self.session);
        if let Err(e) = self.runtime.await {
            tracing::warn!("Session runtime ended abnormally: {}", e);
        }
        self.network.shutdown();
    }
}
