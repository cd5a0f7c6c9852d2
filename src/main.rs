use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use readaloud_tts::core::batch::normalize_inputs;
use readaloud_tts::{
    ClientConfig, FingerprintCache, OutputFormat, SpeechSettings, SpeechSynthesizer,
    create_tts_provider, synthesize_many,
};

/// Streaming read-aloud text-to-speech client with a fingerprinted audio cache
#[derive(Parser, Debug)]
#[command(name = "readaloud-tts")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize each text into the cache and print the artifact paths
    Speak {
        /// Texts to synthesize (blank and duplicate entries are skipped)
        #[arg(required = true)]
        texts: Vec<String>,

        #[command(flatten)]
        voice: VoiceArgs,

        /// Maximum number of texts synthesized at once
        #[arg(short = 'j', long = "concurrency")]
        concurrency: Option<usize>,
    },

    /// Print the cached artifact path for a text without synthesizing
    Lookup {
        text: String,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Delete every cached audio artifact
    ClearCache,
}

/// Per-invocation overrides of the configured voice settings
#[derive(Args, Debug, Default)]
struct VoiceArgs {
    /// Voice short name, e.g. en-US-AriaNeural
    #[arg(short = 'v', long = "voice")]
    voice: Option<String>,

    /// Speaking rate in percent (100 is natural)
    #[arg(long = "speed")]
    speed: Option<i32>,

    /// Pitch in percent (100 is natural)
    #[arg(long = "pitch")]
    pitch: Option<i32>,

    /// Volume in percent (0-100)
    #[arg(long = "volume")]
    volume: Option<i32>,

    /// Expressive style, e.g. cheerful
    #[arg(long = "style")]
    style: Option<String>,

    /// Style intensity in percent (1-100)
    #[arg(long = "style-intensity")]
    style_intensity: Option<u32>,

    /// Role-play persona, e.g. OlderAdultMale
    #[arg(long = "role")]
    role: Option<String>,

    /// Output format (mp3, mp3-mono-96k, webm, ogg, pcm)
    #[arg(short = 'f', long = "format")]
    format: Option<String>,
}

impl VoiceArgs {
    fn apply(self, base: &SpeechSettings) -> anyhow::Result<SpeechSettings> {
        let mut settings = base.clone();
        if let Some(voice) = self.voice {
            settings.voice = voice;
        }
        if let Some(speed) = self.speed {
            settings.speed = speed;
        }
        if let Some(pitch) = self.pitch {
            settings.pitch = pitch;
        }
        if let Some(volume) = self.volume {
            settings.volume = volume;
        }
        if self.style.is_some() {
            settings.style = self.style;
        }
        if self.style_intensity.is_some() {
            settings.style_intensity = self.style_intensity;
        }
        if self.role.is_some() {
            settings.role = self.role;
        }
        if let Some(format) = self.format {
            settings.output_format = format.parse::<OutputFormat>()?;
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let synthesizer: Arc<dyn SpeechSynthesizer> =
        Arc::from(create_tts_provider("readaloud", config.readaloud.clone())?);
    let cache = Arc::new(FingerprintCache::new(synthesizer, config.cache_options()));

    match cli.command {
        Commands::Speak {
            texts,
            voice,
            concurrency,
        } => {
            let settings = voice.apply(&config.speech)?;
            let concurrency = concurrency.unwrap_or(config.batch_concurrency);

            let cancel = CancellationToken::new();
            let ctrl_c_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling synthesis");
                    ctrl_c_token.cancel();
                }
            });

            let results = synthesize_many(
                &cache,
                &texts,
                &settings,
                concurrency,
                |done, total| eprintln!("[{done}/{total}] synthesized"),
                &cancel,
            )
            .await?;

            for text in normalize_inputs(&texts) {
                match results.get(&text) {
                    Some(path) => println!("{}\t{}", path.display(), text),
                    None => println!("-\t{text}"),
                }
            }
        }
        Commands::Lookup { text, voice } => {
            let settings = voice.apply(&config.speech)?;
            match cache.lookup(&text, &settings).await? {
                Some(artifact) => println!("{}", artifact.path.display()),
                None => {
                    println!("not cached ({})", cache.fingerprint_for(&text, &settings));
                }
            }
        }
        Commands::ClearCache => {
            let removed = cache.clear().await?;
            println!(
                "Removed {removed} cached artifacts from {}",
                cache.cache_dir().display()
            );
        }
    }

    Ok(())
}
