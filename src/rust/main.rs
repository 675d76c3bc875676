use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use teachable::{
    EmbeddingProvider, EventChannel, ImageFolderCamera, LogObserver, OnnxEmbedding, OnnxEmbeddingConfig,
    PooledEmbedding, Session, SessionConfig, SessionEvent, SyntheticCamera,
};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Training class as LABEL=IMAGE_DIR. Repeat for each class.
    #[arg(short, long = "class", value_parser = parse_class)]
    classes: Vec<(String, PathBuf)>,

    /// ONNX image-embedding model. Colour pooling is used when omitted.
    #[arg(long)]
    onnx: Option<PathBuf>,

    /// Session configuration file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Examples to record per class.
    #[arg(short, long, default_value_t = 20)]
    samples: usize,

    /// Seconds to keep predicting after training.
    #[arg(long, default_value_t = 2)]
    predict_for: u64,

    /// Where to write the exported model.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_class(value: &str) -> Result<(String, PathBuf), String> {
    let (label, dir) = value
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=DIR, got '{}'", value))?;
    if label.trim().is_empty() {
        return Err("class label cannot be empty".into());
    }
    Ok((label.trim().to_string(), PathBuf::from(dir)))
}

/// `$TEACHABLE_HOME/model.json`, else the platform data directory.
fn default_output() -> PathBuf {
    if let Ok(path) = std::env::var("TEACHABLE_HOME") {
        return PathBuf::from(path).join("model.json");
    }
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("teachable").join("model.json");
    }
    std::env::temp_dir().join("teachable").join("model.json")
}

async fn load_embedding(onnx: Option<PathBuf>) -> Result<Arc<dyn EmbeddingProvider>> {
    match onnx {
        Some(path) => {
            info!("Loading embedding model from {:?}...", path);
            let provider = OnnxEmbedding::load_async(path, OnnxEmbeddingConfig::default())
                .await
                .context("Failed to initialize the embedding model")?;
            Ok(Arc::new(provider))
        }
        None => Ok(Arc::new(PooledEmbedding::default())),
    }
}

/// Prints one event, waiting at most `wait` for it.
async fn print_next_event(events: &mut UnboundedReceiver<SessionEvent>, wait: Duration) {
    let Ok(Some(event)) = tokio::time::timeout(wait, events.recv()).await else {
        return;
    };
    match event {
        SessionEvent::ExampleAdded { label, count } => println!("  {}: {} samples", label, count),
        SessionEvent::CapacityReached { label, cap } => {
            println!("  Maximum samples ({}) reached for {}", cap, label)
        }
        SessionEvent::PredictionReady(prediction) => {
            let ranked: Vec<String> = prediction
                .ranked()
                .into_iter()
                .map(|(label, p)| format!("{} {:.0}%", label, p * 100.0))
                .collect();
            println!("Prediction: {}", ranked.join(" | "));
        }
        SessionEvent::CycleFailed(failure) => eprintln!("  skipped frame: {}", failure.message),
        SessionEvent::Error(err) => eprintln!("Error: {}", err),
        SessionEvent::StateChanged { .. } => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => SessionConfig::default(),
    };
    config.max_examples_per_label = config.max_examples_per_label.max(args.samples);
    config.auto_predict = false;

    info!("=== Starting Image Classifier Trainer ===");
    let start_time = Instant::now();
    let embedder = load_embedding(args.onnx.clone()).await?;

    let (channel, mut events) = EventChannel::new();
    let synthetic = SyntheticCamera::new();
    let scene = synthetic.control();
    let session = Session::builder()
        .with_config(config.clone())
        .with_frame_source(synthetic)
        .with_shared_embedding(embedder)
        .with_observer(channel)
        .with_observer(LogObserver)
        .build()?;

    let classes: Vec<(String, Option<PathBuf>)> = if args.classes.is_empty() {
        println!("No --class given, training on a synthetic camera (red vs. blue)");
        vec![("red".to_string(), None), ("blue".to_string(), None)]
    } else {
        args.classes.iter().map(|(l, d)| (l.clone(), Some(d.clone()))).collect()
    };
    if classes.len() < 2 {
        bail!("At least 2 classes are needed to train a classifier");
    }

    for (label, _) in &classes {
        session.add_label(label).await?;
    }

    for (label, dir) in &classes {
        match dir {
            Some(dir) => session.replace_frame_source(ImageFolderCamera::new(dir)).await,
            None if label == "red" => scene.set_scene([220, 30, 30]),
            None => scene.set_scene([30, 30, 220]),
        }
        session.open_camera(config.facing).await?;

        println!("Recording '{}'...", label);
        session.start_recording(label).await?;
        let tick = config.record_interval() * 2;
        while session.state().await.is_recording() {
            let count = session.label_counts().await.get(label).copied().unwrap_or(0);
            if count >= args.samples {
                session.stop().await;
                break;
            }
            print_next_event(&mut events, tick).await;
        }
    }

    let build_time = start_time.elapsed();
    info!("=== Training Complete (took {:.2?}) ===", build_time);
    for (label, count) in session.label_counts().await {
        println!("  {}: {} samples", label, count);
    }

    if args.predict_for > 0 {
        session.start_predicting().await?;
        let deadline = Instant::now() + Duration::from_secs(args.predict_for);
        while Instant::now() < deadline && session.state().await.is_predicting() {
            print_next_event(&mut events, config.predict_interval()).await;
        }
        session.stop().await;
    }

    let output = args.output.unwrap_or_else(default_output);
    session.save_model(&output).await?;
    println!("Model saved to {}", output.display());

    session.close_camera().await;
    info!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}
