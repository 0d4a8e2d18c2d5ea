use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_call::channel::WsConnector;
use beacon_call::voice::{
    AudioSink, CpalSink, LineRecognizer, NullSink, PLAYBACK_SAMPLE_RATE, samples_to_wav, tone,
};
use beacon_call::{Config, Notification, NotificationKind, Subsystems, VoiceAgent};

/// Beacon Call - Talk to a remote voice agent
#[derive(Parser)]
#[command(name = "beacon-call", version, about)]
struct Cli {
    /// Agent WebSocket endpoint (ws:// or wss://)
    #[arg(short, long, env = "BEACON_CALL_URL")]
    url: Option<String>,

    /// Agent identifier sent when the call starts
    #[arg(short, long, env = "BEACON_AGENT_ID")]
    agent_id: Option<String>,

    /// End the call after this much silence (milliseconds)
    #[arg(long, env = "BEACON_SILENCE_TIMEOUT_MS")]
    silence_timeout_ms: Option<u64>,

    /// Path to a config file (defaults to the standard location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Don't play agent audio (for machines without an output device)
    #[arg(long, env = "BEACON_DISABLE_AUDIO")]
    disable_audio: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_call=info",
        1 => "info,beacon_call=debug",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestSpeaker => test_speaker().await,
        };
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config.endpoint = url.parse()?;
    }
    if let Some(agent_id) = cli.agent_id {
        config.agent_id = agent_id;
    }
    if let Some(ms) = cli.silence_timeout_ms {
        config.silence_timeout = Duration::from_millis(ms);
    }
    tracing::debug!(?config, "loaded configuration");

    let sink: Arc<dyn AudioSink> = if cli.disable_audio {
        Arc::new(NullSink)
    } else {
        Arc::new(CpalSink::new()?)
    };

    let subsystems = Subsystems {
        connector: Box::new(WsConnector::new()),
        recognizer: Box::new(LineRecognizer::stdin()),
        sink,
    };

    tracing::info!(endpoint = %config.endpoint, agent_id = config.agent_id, "starting call");
    let agent = VoiceAgent::spawn(config, subsystems)?;
    register_printers(&agent);

    let failed = Arc::new(AtomicBool::new(false));
    {
        let failed = Arc::clone(&failed);
        agent.on(NotificationKind::Error, move |_| {
            failed.store(true, Ordering::Release);
        });
    }

    let mut state = agent.watch_state();
    agent.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("hanging up");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                match current.label() {
                    Some(label) => print_status(label),
                    None => {
                        println!("Call ended");
                        break;
                    }
                }
            }
        }
    }

    agent.shutdown().await;

    if failed.load(Ordering::Acquire) {
        anyhow::bail!("call ended with an error");
    }
    Ok(())
}

/// Print transcripts, replies and errors as they arrive
fn register_printers(agent: &VoiceAgent) {
    agent.on(NotificationKind::Transcript, |n| {
        if let Notification::Transcript { text } = n {
            println!("you: {text}");
        }
    });
    agent.on(NotificationKind::Response, |n| {
        if let Notification::Response { text } = n {
            println!("agent: {text}");
        }
    });
    agent.on(NotificationKind::Error, |n| {
        if let Notification::Error { reason } = n {
            eprintln!("error: {reason}");
        }
    });
}

fn print_status(label: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "[{label}]");
    let _ = stdout.flush();
}

/// Test speaker output through the same path agent audio takes
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new()?;

    // Encode as WAV at a different rate so decoding and resampling are exercised
    let sample_rate = 16000;
    let samples = tone(440.0, 2000, sample_rate);
    let payload = samples_to_wav(&samples, sample_rate)?;

    println!(
        "Playing {} samples at {} Hz (resampled to {} Hz)...",
        samples.len(),
        sample_rate,
        PLAYBACK_SAMPLE_RATE
    );

    sink.render(payload).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
