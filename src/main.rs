use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voxqueue::audio::read_wav_file;
use voxqueue::cli::{Cli, Commands, ConfigAction};
use voxqueue::config::Config;
use voxqueue::language::resolve_language;
use voxqueue::{ChannelSink, RecognitionResult, Recognizer, SinkEvent, WhisperLoader};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Transcribe {
            files,
            model,
            language,
            json,
            sync,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(model) = model {
                config.engine.model_path = model;
            }
            if let Some(language) = language {
                config.engine.language = resolve_language(&language)
                    .with_context(|| format!("Unknown language '{}'", language))?;
            }
            run_transcribe(&config, &files, json, sync)?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the flags.
fn init_logging(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info,voxqueue=debug",
        (false, _) => "info,voxqueue=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file with environment variable overrides.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

fn run_transcribe(config: &Config, files: &[PathBuf], json: bool, sync: bool) -> Result<()> {
    let recognizer = Recognizer::new(Arc::new(WhisperLoader::new()), config)?;
    recognizer
        .load_from_file(&config.engine.model_path, false)
        .with_context(|| {
            format!(
                "Failed to load model {}",
                config.engine.model_path.display()
            )
        })?;
    info!(
        model = recognizer.model_name().as_deref().unwrap_or("unknown"),
        language = %recognizer.language(),
        files = files.len(),
        "Transcribing"
    );

    let failures = if sync {
        transcribe_sync(&recognizer, files, json)
    } else {
        transcribe_queued(&recognizer, files, json)
    };

    if failures > 0 {
        bail!("{} of {} files failed", failures, files.len());
    }
    Ok(())
}

/// Recognize files one at a time through `recognize_blocking`.
fn transcribe_sync(recognizer: &Recognizer, files: &[PathBuf], json: bool) -> usize {
    let mut failures = 0;
    for (index, file) in files.iter().enumerate() {
        let outcome = read_wav_file(file)
            .and_then(|audio| recognizer.recognize_blocking(audio.samples, audio.sample_rate));
        match outcome {
            Ok(mut result) => {
                result.job_id = index as i32;
                print_result(file, &result, json, files.len() > 1);
            }
            Err(e) => {
                eprintln!("{}: {}", file.display(), e);
                failures += 1;
            }
        }
    }
    failures
}

/// Submit every file back-to-back and print results as they arrive.
fn transcribe_queued(recognizer: &Recognizer, files: &[PathBuf], json: bool) -> usize {
    let (sink, events) = ChannelSink::channel();
    let caller: voxqueue::CallerHandle = Arc::new(sink);
    let mut failures = 0;

    for (index, file) in files.iter().enumerate() {
        match read_wav_file(file) {
            Ok(audio) => {
                recognizer.submit_f32(
                    caller.clone(),
                    audio.samples,
                    audio.sample_rate,
                    index as i32,
                    0,
                );
            }
            Err(e) => {
                eprintln!("{}: {}", file.display(), e);
                failures += 1;
            }
        }
    }

    // Each queued job holds a clone of the caller, so the channel closes
    // once the last job is finished
    drop(caller);
    for event in events {
        match event {
            SinkEvent::Result(result) => {
                let file = &files[result.job_id as usize];
                print_result(file, &result, json, files.len() > 1);
            }
            SinkEvent::Dropped { job_id, reason, .. } => {
                eprintln!("{}: {}", files[job_id as usize].display(), reason);
                failures += 1;
            }
            SinkEvent::ModelReady(_) => {}
        }
    }
    failures
}

fn print_result(file: &Path, result: &RecognitionResult, json: bool, show_file: bool) {
    if json {
        let line = serde_json::json!({
            "file": file.display().to_string(),
            "job_id": result.job_id,
            "text": result.text,
            "words": result.words,
        });
        println!("{}", line);
    } else if show_file {
        println!("{}: {}", file.display(), result.text);
    } else {
        println!("{}", result.text);
    }
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Path => {
            println!("{}", config_path.display());
            if !config_path.exists() {
                warn!("Configuration file does not exist, defaults are in effect");
            }
        }
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            if let Err(e) = config.validate() {
                warn!("{}", e);
            }
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
