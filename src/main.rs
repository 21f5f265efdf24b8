//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults when the file is missing).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Open the audio output and load the sound library.
//! 5. Request the button lines and spawn the edge watcher thread.
//! 6. Load the Whisper model and build the speech session.
//! 7. Build the stream client, camera, prompt and task runner.
//! 8. Run the interaction loop until SIGINT/SIGTERM or a hardware fault.
//!
//! The process exits non-zero when the edge watcher stopped on a fault.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use voice_lens::{
    audio::{CpalInput, CpalOutput, SoundAsset, SoundLibrary, names, tones},
    camera::{self, FrameSource},
    config::{AppConfig, AppPaths, PromptWatcher, SharedPrompt},
    gpio::{CdevEdgeSource, EdgeWatcher, EventMailbox},
    lifecycle::{Shutdown, listen_for_signals},
    pipeline::{AppContext, Buttons, InteractionMachine, RunnerTiming, TaskRunner},
    remote::{AudioStreamClient, HttpCancelNotifier, StreamSettings},
    stt::{
        SpeechSession, SttEngine, UnavailableEngine, WhisperEngine, WhisperRecognizerFactory,
        model_path,
    },
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Voice Lens starting");

    // 2. Config
    let paths = AppPaths::new();
    let config = AppConfig::load(&paths)
        .with_context(|| format!("failed to load {}", paths.settings_file.display()))?;
    log::info!("settings: {}", paths.settings_file.display());

    // 3. Runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    // 4. Audio output + sounds
    let output = Arc::new(CpalOutput::new());
    let mut library = SoundLibrary::new(output.clone());
    let clips = config.sounds.resolved(&paths);
    let loaded = library.load_all(clips.iter().map(|(n, p)| (n.as_str(), p.as_path())));
    log::info!("loaded {loaded}/{} sounds", clips.len());
    library.insert(SoundAsset::new(names::PING, tones::ping(), tones::TONE_SAMPLE_RATE));
    let sounds = Arc::new(library);

    // 5. Buttons
    let shutdown = Shutdown::new();
    let mailbox = EventMailbox::new();
    let buttons = Buttons {
        describe: config.gpio.button_a,
        chat: config.gpio.button_b,
    };
    let source = CdevEdgeSource::open(
        &config.gpio.chip,
        &buttons.lines(),
        Duration::from_millis(config.gpio.debounce_ms),
    )?;
    let watcher = EdgeWatcher::spawn(
        source,
        mailbox.clone(),
        shutdown.clone(),
        Duration::from_millis(config.gpio.wait_ms),
    )
    .context("failed to spawn edge watcher")?;

    // 6. Speech
    let model = model_path(&paths.models_dir, &config.speech.model);
    let engine: Arc<dyn SttEngine> = match WhisperEngine::load(&model, &config.speech.language) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            log::warn!("speech recognition disabled: {e}");
            Arc::new(UnavailableEngine::new(e.to_string()))
        }
    };
    let speech = Arc::new(SpeechSession::new(
        Arc::new(CpalInput::new()),
        Arc::new(WhisperRecognizerFactory::new(engine, config.speech.endpoint())),
        sounds.clone(),
        config.speech.block_samples,
        config.speech.max_listen(),
    ));

    // 7. Remote, camera, prompt, runner
    let remote = Arc::new(AudioStreamClient::new(
        StreamSettings {
            base_url: config.server.base_url.clone(),
            sample_rate: config.server.sample_rate,
            channels: config.server.channels,
            chunk_bytes: config.server.chunk_bytes,
            connect_timeout: Duration::from_secs(config.server.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.server.read_timeout_secs),
            waiting_delay: Duration::from_millis(config.waiting.initial_delay_ms),
            waiting_interval: Duration::from_millis(config.waiting.interval_ms),
        },
        output,
        sounds.clone(),
    ));
    let frames: Arc<dyn FrameSource> = camera::from_config(&config.camera).into();
    let prompt = SharedPrompt::new(&config.prompt);
    let prompt_watcher =
        PromptWatcher::new(&paths.settings_file, config.prompt.clone(), prompt.clone());

    let runner = TaskRunner::new(
        mailbox.clone(),
        buttons.lines().to_vec(),
        Arc::new(HttpCancelNotifier::new(Duration::from_secs(
            config.server.cancel_timeout_secs,
        ))),
        shutdown.clone(),
        RunnerTiming {
            poll: Duration::from_millis(config.runner.poll_ms),
            grace: Duration::from_millis(config.runner.grace_ms),
            settle: Duration::from_millis(config.runner.settle_ms),
        },
    );
    let machine = InteractionMachine::new(
        AppContext {
            mailbox,
            sounds,
            remote,
            speech,
            camera: frames,
            prompt,
            buttons,
            shutdown: shutdown.clone(),
        },
        runner,
    );

    // 8. Run
    rt.block_on(async {
        tokio::spawn(listen_for_signals(shutdown.clone()));
        tokio::spawn(prompt_watcher.run(shutdown.clone()));
        machine.run().await;
    });

    shutdown.raise();
    let result = watcher.join();
    rt.shutdown_timeout(Duration::from_millis(500));

    result?;
    log::info!("Voice Lens stopped");
    Ok(())
}
