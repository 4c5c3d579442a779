//! Composition root for the server.
//!
//! The only place where concrete synthesizers, scene backends, and the
//! websocket hub are wired into the coordinator, scheduler, and comment
//! handler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use zunda_core::settings::ServerSettings;
use zunda_core::{
    HookRegistry, LoggingSceneBackend, SceneBackend, Settings, SpeechSynthesizer,
    StageEventEmitter,
};
use zunda_runtime::{CommentInterruptHandler, ObsSceneBackend, TimelineScheduler, run_idle_blink};
use zunda_voice::{
    FallbackSynthesizer, SimulatedSynthesizer, SpeechCoordinator, VoicevoxClient, VolumeBridge,
};

use crate::hub::ConnectionHub;
use crate::routes::{create_router, create_spa_router};

/// Rendered speech files older than this are removed at startup.
const AUDIO_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins.
    AllowOrigins(Vec<String>),
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Presentation page assets, served at `/`.
    pub static_dir: Option<PathBuf>,
    pub cors: CorsConfig,
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.http_port,
            static_dir: settings.static_dir.clone(),
            cors: CorsConfig::default(),
        }
    }

    #[must_use]
    pub fn with_static_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors = CorsConfig::AllowOrigins(origins);
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Every service the handlers need.
pub struct StageContext {
    pub settings: Settings,
    pub hub: ConnectionHub,
    pub coordinator: Arc<SpeechCoordinator>,
    pub scheduler: Arc<TimelineScheduler>,
    pub comments: Arc<CommentInterruptHandler>,
    pub scene: Arc<dyn SceneBackend>,
    pub hooks: Arc<HookRegistry>,
    /// Present when speech goes through a VOICEVOX engine.
    pub voicevox: Option<Arc<VoicevoxClient>>,
    /// Cancelled on shutdown; background loops and sockets watch it.
    pub shutdown: CancellationToken,
    started: Instant,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("hub", &self.hub)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl StageContext {
    /// Wire the engine around the given synthesizer and scene backend.
    pub fn assemble(
        settings: Settings,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        scene: Arc<dyn SceneBackend>,
    ) -> Self {
        let hub = ConnectionHub::new(settings.server.client_queue);
        let emitter: Arc<dyn StageEventEmitter> = Arc::new(hub.clone());
        let hooks = Arc::new(HookRegistry::with_builtins(&settings.plugins.enabled));

        let bridge = VolumeBridge::new(Arc::new(settings.playback.mode))
            .with_chunk(settings.chunk_duration());
        let coordinator = Arc::new(
            SpeechCoordinator::new(
                synthesizer,
                bridge,
                Arc::clone(&emitter),
                settings.voice_table(),
            )
            .with_hooks(Arc::clone(&hooks)),
        );
        let scheduler = Arc::new(
            TimelineScheduler::new(
                Arc::clone(&coordinator),
                Arc::clone(&scene),
                Arc::clone(&emitter),
            )
            .with_speech_end_wait(settings.speech_end_wait()),
        );
        let comments = Arc::new(
            CommentInterruptHandler::new(
                Arc::clone(&scheduler),
                Arc::clone(&coordinator),
                Arc::clone(&scene),
                emitter,
            )
            .with_hooks(Arc::clone(&hooks))
            .with_deadline(settings.comment_response_timeout()),
        );

        Self {
            settings,
            hub,
            coordinator,
            scheduler,
            comments,
            scene,
            hooks,
            voicevox: None,
            shutdown: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop everything that is in flight and signal background tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.stop();
        self.coordinator.cancel_active();
    }
}

/// VOICEVOX client and the synthesizer speech goes through: the client
/// itself, or the client backed by the simulated synthesizer when
/// `voicevox.fallback_simulated` is set.
pub fn build_synthesizer(
    settings: &Settings,
) -> Result<(Arc<VoicevoxClient>, Arc<dyn SpeechSynthesizer>)> {
    let voicevox = Arc::new(
        VoicevoxClient::new(&settings.voicevox).context("Failed to create VOICEVOX client")?,
    );
    let primary: Arc<dyn SpeechSynthesizer> = voicevox.clone();
    let synthesizer: Arc<dyn SpeechSynthesizer> = if settings.voicevox.fallback_simulated {
        Arc::new(FallbackSynthesizer::new(
            primary,
            Arc::new(SimulatedSynthesizer::new()),
        ))
    } else {
        primary
    };
    Ok((voicevox, synthesizer))
}

/// OBS when enabled, otherwise a backend that only logs.
pub fn build_scene_backend(settings: &Settings) -> Arc<dyn SceneBackend> {
    if settings.obs.enabled {
        Arc::new(ObsSceneBackend::new(&settings.obs))
    } else {
        Arc::new(LoggingSceneBackend)
    }
}

/// Build the context from settings.
pub fn bootstrap(settings: Settings) -> Result<StageContext> {
    let (voicevox, synthesizer) = build_synthesizer(&settings)?;
    let scene = build_scene_backend(&settings);

    info!(
        target: "zunda.bootstrap",
        voicevox = %settings.voicevox.url,
        obs = settings.obs.enabled,
        playback = ?settings.playback.mode,
        import_dir = %settings.timeline.import_dir.display(),
        "Stage assembled"
    );

    let mut ctx = StageContext::assemble(settings, synthesizer, scene);
    ctx.voicevox = Some(voicevox);
    Ok(ctx)
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn start_server(ctx: Arc<StageContext>, config: ServerConfig) -> Result<()> {
    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    if config.static_dir.is_some() {
        info!("zunda-stage (with presentation page) listening on http://{addr}");
    } else {
        info!("zunda-stage (API only) listening on http://{addr}");
    }

    let signal_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_ctx.shutdown();
        }
    });

    serve(listener, ctx, &config).await
}

/// Serve on an already bound listener until `ctx.shutdown` is cancelled.
pub async fn serve(listener: TcpListener, ctx: Arc<StageContext>, config: &ServerConfig) -> Result<()> {
    spawn_background(&ctx);

    let app = match &config.static_dir {
        Some(dir) => {
            info!("Serving presentation page from: {}", dir.display());
            create_spa_router(Arc::clone(&ctx), dir, &config.cors)
        }
        None => create_router(Arc::clone(&ctx), &config.cors),
    };

    let shutdown = ctx.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    ctx.shutdown();
    info!("Server stopped");
    Ok(())
}

fn spawn_background(ctx: &Arc<StageContext>) {
    let emitter: Arc<dyn StageEventEmitter> = Arc::new(ctx.hub.clone());
    tokio::spawn(run_idle_blink(
        Arc::clone(&ctx.coordinator),
        emitter,
        ctx.settings.blink_interval(),
        ctx.shutdown.child_token(),
    ));

    if let Some(voicevox) = ctx.voicevox.clone() {
        tokio::spawn(async move {
            match voicevox.cleanup_old_files(AUDIO_MAX_AGE).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Removed stale speech files"),
                Err(e) => warn!(error = %e, "Speech file cleanup failed"),
            }
        });
    }
}
