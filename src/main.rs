use clap::Parser;
use log::info;
use meshcall_core::args::Args;
use meshcall_core::config::Config;
use meshcall_core::media::RtpMediaSource;
use meshcall_core::peer::RtcTransportFactory;
use meshcall_core::room::{RoomChannels, RoomCommand, RoomCoordinator, RoomNotification};
use meshcall_core::signaling::SignalingClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn init_logging() {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("MESHCALL_LOG", "info"),
    )
    // The ICE/DTLS stacks log every connectivity probe at info
    .filter_module("webrtc_ice", log::LevelFilter::Warn)
    .filter_module("webrtc_dtls", log::LevelFilter::Warn)
    .filter_module("webrtc_mdns", log::LevelFilter::Warn)
    .init();
}

fn parse_command(line: &str) -> Option<RoomCommand> {
    let line = line.trim();
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    match cmd {
        "create" => Some(RoomCommand::CreateRoom),
        "join" if !rest.is_empty() => Some(RoomCommand::JoinRoom(rest.to_string())),
        "leave" => Some(RoomCommand::LeaveRoom),
        "mute" => Some(RoomCommand::SetAudioEnabled(false)),
        "unmute" => Some(RoomCommand::SetAudioEnabled(true)),
        "camera" => match rest {
            "on" => Some(RoomCommand::SetVideoEnabled(true)),
            "off" => Some(RoomCommand::SetVideoEnabled(false)),
            _ => None,
        },
        "screen" => match rest {
            "start" => Some(RoomCommand::StartScreenShare),
            "stop" => Some(RoomCommand::StopScreenShare),
            _ => None,
        },
        "say" if !rest.is_empty() => Some(RoomCommand::SendChat(rest.to_string())),
        "quit" | "exit" => Some(RoomCommand::Shutdown),
        _ => None,
    }
}

fn print_notification(notification: RoomNotification) {
    match notification {
        RoomNotification::RoomReady { room_id } => println!("* room: {}", room_id),
        RoomNotification::RoomError { message } => println!("* room error: {}", message),
        RoomNotification::PeerConnected { peer } => println!("* {} connected", peer),
        RoomNotification::PeerClosed { peer } => println!("* {} left", peer),
        RoomNotification::PeerMedia(track) => {
            println!("* {} published a {:?} track ({})", track.peer, track.kind, track.id)
        }
        RoomNotification::Chat(entry) => println!("[{}] {}", entry.sender, entry.text),
        RoomNotification::ScreenShareChanged { active } => {
            println!("* screen share {}", if active { "started" } else { "stopped" })
        }
        RoomNotification::CommandFailed { message } => println!("* error: {}", message),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging();

    let mut config = Config::load(&args.config)?;
    args.apply_to_config(&mut config);
    config.validate()?;

    let local_id = if config.signaling.identity.is_empty() {
        format!("user-{}", uuid::Uuid::new_v4())
    } else {
        config.signaling.identity.clone()
    };
    info!("Starting meshcall-core as {}", local_id);

    let mut client = SignalingClient::connect(&config.signaling.url).await?;
    let signal_tx = client.sender();
    let signals = client
        .take_incoming()
        .ok_or("signaling stream already taken")?;

    let (media_tx, media_rx) = mpsc::unbounded_channel();
    let media_source = RtpMediaSource::new(
        config.media.audio_enabled,
        config.media.video_enabled,
        media_tx,
    );
    let factory = RtcTransportFactory::new(&config.webrtc)?;

    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (notif_tx, mut notif_rx) = mpsc::unbounded_channel();

    let mut coordinator = RoomCoordinator::new(
        local_id,
        &config,
        factory,
        media_source,
        signal_tx,
        transport_tx,
        notif_tx,
    );

    if args.create {
        let _ = cmd_tx.send(RoomCommand::CreateRoom);
    } else if let Some(room) = &args.join {
        let _ = cmd_tx.send(RoomCommand::JoinRoom(room.clone()));
    }

    tokio::spawn(async move {
        while let Some(notification) = notif_rx.recv().await {
            print_notification(notification);
        }
    });

    let stdin_cmds = cmd_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(command) => {
                    if stdin_cmds.send(command).is_err() {
                        break;
                    }
                }
                None => println!(
                    "commands: create | join <room> | leave | mute | unmute | \
                     camera on|off | screen start|stop | say <text> | quit"
                ),
            }
        }
    });

    let ctrl_cmds = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = ctrl_cmds.send(RoomCommand::Shutdown);
        }
    });

    coordinator
        .run(RoomChannels {
            signals,
            commands: cmd_rx,
            transports: transport_rx,
            media: media_rx,
        })
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert!(matches!(
            parse_command("join room-42"),
            Some(RoomCommand::JoinRoom(r)) if r == "room-42"
        ));
        assert!(matches!(
            parse_command("say hello there"),
            Some(RoomCommand::SendChat(t)) if t == "hello there"
        ));
        assert!(matches!(
            parse_command("screen start"),
            Some(RoomCommand::StartScreenShare)
        ));
        assert!(matches!(
            parse_command("camera off"),
            Some(RoomCommand::SetVideoEnabled(false))
        ));
        assert!(parse_command("dance").is_none());
        assert!(parse_command("join").is_none());
    }
}
