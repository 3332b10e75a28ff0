use std::{
    fs, io,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};

use signlang::{
    AnimationRenderer, AppConfig, CaptureEvent, CaptureRequest, GestureRecorder, SignError,
    SignIndex,
    assets::AssetLayout,
    config::DEFAULT_CONFIG_FILE,
    error::Result,
    gloss::{ConlluAnnotator, FileTranslationLog, TranslationLog, Translator},
    index::{ANONYMOUS_OWNER, ExternalMirror, MappingFileStore, MemoryRecordStore, SignStore},
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    pipeline::{FfmpegSink, RecognizerBackend, available_cameras},
    recorder::delete_recording,
};

#[derive(Parser)]
#[command(name = "signlang")]
#[command(about = "Gloss English sentences and record or replay sign gestures")]
#[command(version)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reorder CoNLL-U annotated sentences into gloss, one line per sentence
    Gloss {
        /// CoNLL-U file, or `-` for stdin
        input: String,

        /// Owner the translations are logged under
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show the glosses logged for an owner, oldest first
    History {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Record a gesture for a word from the camera
    Record {
        word: String,

        /// Replace an existing recording
        #[arg(long)]
        overwrite: bool,

        #[arg(long)]
        owner: Option<String>,
    },

    /// Render the skeleton playback video for a recorded word
    Render { word: String },

    /// List recorded words
    List,

    /// Delete a word's recording
    Delete { word: String },

    /// List available cameras
    Cameras,

    /// Download the hand detection models
    FetchModels,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:?}");
            eprintln!("{}: {err}", err.kind());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load_or_default(&cli.config)
        .map_err(|err| SignError::Validation(format!("{err:#}")))?;

    match cli.command {
        Commands::Gloss { input, owner } => cmd_gloss(&config, &input, owner.as_deref()),
        Commands::History { owner } => cmd_history(&config, owner.as_deref()),
        Commands::Record {
            word,
            overwrite,
            owner,
        } => cmd_record(&config, word, overwrite, owner),
        Commands::Render { word } => cmd_render(&config, &word),
        Commands::List => cmd_list(&config),
        Commands::Delete { word } => cmd_delete(&config, &word),
        Commands::Cameras => cmd_cameras(),
        Commands::FetchModels => cmd_fetch_models(&config),
    }
}

fn cmd_gloss(config: &AppConfig, input: &str, owner: Option<&str>) -> Result<()> {
    let text = if input == "-" {
        io::read_to_string(io::stdin())?
    } else {
        fs::read_to_string(input)?
    };

    let owner = owner.unwrap_or(ANONYMOUS_OWNER);
    let log = FileTranslationLog::new(config.storage.translation_log_path());
    let translator = Translator::new(ConlluAnnotator::new(), log);
    for block in sentence_blocks(&text) {
        let translation = translator.translate(owner, &block)?;
        println!("{}", translation.gloss);
    }
    Ok(())
}

fn cmd_history(config: &AppConfig, owner: Option<&str>) -> Result<()> {
    let log = FileTranslationLog::new(config.storage.translation_log_path());
    for entry in log.history(owner.unwrap_or(ANONYMOUS_OWNER))? {
        println!("{}\t{}", entry.timestamp.to_rfc3339(), entry.gloss);
    }
    Ok(())
}

/// Splits CoNLL-U text at blank lines.
fn sentence_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn open_index(config: &AppConfig) -> Result<Arc<SignIndex>> {
    let primary = MappingFileStore::new(config.storage.mapping_path());
    let mirror = ExternalMirror::new(MemoryRecordStore::new());
    let mirrors: Vec<Box<dyn SignStore>> = vec![Box::new(mirror)];
    Ok(Arc::new(SignIndex::open(Box::new(primary), mirrors)?))
}

fn video_sink(config: &AppConfig) -> FfmpegSink {
    let mut sink = FfmpegSink::new();
    if let Some(path) = &config.video.ffmpeg_path {
        sink = sink.with_ffmpeg_path(path);
    }
    if let Some(args) = &config.video.encoder_args {
        sink = sink.with_encoder_args(args.clone());
    }
    sink
}

#[cfg(feature = "camera-nokhwa")]
fn camera_backend(config: &AppConfig) -> Result<Arc<dyn signlang::pipeline::CaptureBackend>> {
    Ok(Arc::new(signlang::pipeline::NokhwaBackend::new(
        config.capture.camera_index,
    )))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn camera_backend(_config: &AppConfig) -> Result<Arc<dyn signlang::pipeline::CaptureBackend>> {
    Err(SignError::Device(
        "built without a camera backend; enable the camera-nokhwa feature".into(),
    ))
}

fn cmd_record(
    config: &AppConfig,
    word: String,
    overwrite: bool,
    owner: Option<String>,
) -> Result<()> {
    let index = open_index(config)?;
    let camera = camera_backend(config)?;
    let detector = RecognizerBackend::new(&config.models)
        .load()
        .map_err(SignError::device)?;

    let recorder = GestureRecorder::new(
        config.capture.clone(),
        AssetLayout::new(&config.storage.data_dir),
        index,
        camera,
        Box::new(detector),
        Arc::new(video_sink(config)),
    );

    let mut request = CaptureRequest::new(word).overwrite(overwrite);
    request.owner = owner;
    let task = recorder.start(request)?;

    for event in task.events().iter() {
        match event {
            CaptureEvent::State(state) => {
                println!("{state:?}");
                if state.is_terminal() {
                    break;
                }
            }
            CaptureEvent::Frame { index, hands } => {
                log::debug!("frame {index}: {hands} hands");
            }
        }
    }

    let record = task.wait()?;
    println!(
        "{}: video {} landmarks {}",
        record.word,
        record.video.display(),
        record.landmarks.display()
    );
    Ok(())
}

fn cmd_render(config: &AppConfig, word: &str) -> Result<()> {
    let index = open_index(config)?;
    let renderer = AnimationRenderer::new(
        Arc::new(video_sink(config)),
        AssetLayout::new(&config.storage.data_dir),
        config.render.clone(),
    );
    let output = renderer.render_word(word, &index)?;
    println!("{}", output.display());
    Ok(())
}

fn cmd_list(config: &AppConfig) -> Result<()> {
    let index = open_index(config)?;
    for record in index.list()? {
        println!(
            "{}\t{}\t{}",
            record.word,
            record.video.display(),
            record.landmarks.display()
        );
    }
    Ok(())
}

fn cmd_delete(config: &AppConfig, word: &str) -> Result<()> {
    let index = open_index(config)?;
    let layout = AssetLayout::new(&config.storage.data_dir);
    let record = delete_recording(&index, &layout, word)?;
    println!("deleted {}", record.word);
    Ok(())
}

fn cmd_cameras() -> Result<()> {
    let cameras = available_cameras().map_err(SignError::device)?;
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for camera in cameras {
        println!("{}\t{}", camera.index, camera.label);
    }
    Ok(())
}

fn cmd_fetch_models(config: &AppConfig) -> Result<()> {
    for (kind, path) in [
        (ModelKind::HandposeEstimator, &config.models.handpose_estimator),
        (ModelKind::PalmDetector, &config.models.palm_detector),
    ] {
        fetch_model(kind, path)?;
    }
    Ok(())
}

fn fetch_model(kind: ModelKind, path: &Path) -> Result<()> {
    ensure_model_ready(kind, path, |event| {
        if let ModelDownloadEvent::AlreadyPresent { model } = event {
            println!("{} already at {}", model.label(), path.display());
        }
    })
    .map_err(SignError::device)
}
