use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api::request::ChatKind;
use api::response::ChatMessage;
use clap::{Parser, Subcommand};
use libcast::Client;
use signal::StopRequest;
use storage::Recordings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use livecast::capture::CommandDevice;
use livecast::chat::ChatChannel;
use livecast::{BroadcastOptions, Broadcaster, Config, StartBroadcast, StopOptions};

const CHAT_POLL: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Go live: capture, record, and upload the recording on stop.
    /// Lines typed on stdin are sent to the live chat.
    Broadcast {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value_t = String::new())]
        description: String,
        /// Post body, defaults to the description
        #[arg(long, default_value_t = String::new())]
        content: String,
    },
    /// Send one message to the chat of a live post
    Chat {
        post_id: String,
        message: String,
        /// Send as an emoji reaction
        #[arg(long)]
        emoji: bool,
    },
    /// Print the chat transcript of a live post
    History { post_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = Config::parse(args.config)?;
    livecast::log::set(&cfg.log.level);

    let client = Client::new(cfg.api.base_url.clone(), cfg.api.auth_context()?)
        .with_timeouts(cfg.api.request_timeout(), cfg.api.upload_timeout());
    if !client.auth().is_authenticated() {
        warn!("no api token configured, requests are anonymous");
    }

    match args.command {
        Command::Broadcast {
            title,
            description,
            content,
        } => {
            broadcast(
                &cfg,
                client,
                StartBroadcast {
                    title,
                    description,
                    content,
                },
            )
            .await
        }
        Command::Chat {
            post_id,
            message,
            emoji,
        } => {
            let kind = if emoji { ChatKind::Emoji } else { ChatKind::Text };
            let sent = ChatChannel::new(client)
                .send_as(&post_id, &message, kind)
                .await?;
            print_message(&sent);
            Ok(())
        }
        Command::History { post_id } => {
            let chat = ChatChannel::new(client);
            chat.load_history(&post_id).await?;
            for message in chat.messages() {
                print_message(&message);
            }
            Ok(())
        }
    }
}

async fn broadcast(cfg: &Config, client: Client, req: StartBroadcast) -> anyhow::Result<()> {
    let recordings = if cfg.recorder.local_copy {
        match Recordings::open(&cfg.recorder.storage).await {
            Ok(recordings) => Some(recordings),
            Err(e) => {
                warn!("local copies disabled, storage unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };
    let device = Arc::new(CommandDevice::new(&cfg.capture));
    let broadcaster = Arc::new(Broadcaster::new(
        client,
        device,
        recordings,
        BroadcastOptions::from(&cfg.recorder),
    ));

    let kind = broadcaster.acquire().await.context("capture")?;
    info!("capture ready ({})", kind);

    let mut stops = signal::stop_requests();
    let session = broadcaster.start(req).await?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    for message in broadcaster.chat().messages() {
        print_message(&message);
    }

    let mut states = broadcaster.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            debug!("broadcast state {:?}", state);
        }
    });

    let chatter = broadcaster.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match chatter.send_chat(&line).await {
                Ok(sent) => print_message(&sent),
                Err(e) => warn!("chat message not sent: {}", e),
            }
        }
    });

    let mut poll = tokio::time::interval(CHAT_POLL);
    let request = loop {
        tokio::select! {
            request = stops.recv() => break request.unwrap_or(StopRequest::Graceful),
            _ = poll.tick() => match broadcaster.sync_chat().await {
                Ok(messages) => messages.iter().for_each(print_message),
                Err(e) => debug!("chat sync failed: {}", e),
            },
        }
    };

    if request == StopRequest::Forced {
        broadcaster.force_stop();
        return Ok(());
    }

    info!("stopping, signal again to force");
    let stopping = broadcaster.clone();
    let mut graceful =
        tokio::spawn(async move { stopping.stop(StopOptions { close_view: true }).await });
    tokio::select! {
        result = &mut graceful => {
            let report = result??;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(StopRequest::Forced) = stops.recv() => {
            warn!("forced stop, recording discarded");
            broadcaster.force_stop();
        }
    }
    Ok(())
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] {}: {}",
        message.timestamp.format("%H:%M:%S"),
        message.author.name,
        message.content
    );
}
