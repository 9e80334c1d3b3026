use std::error::Error;

use callhub::config::PeerConfig;
use callhub::negotiation::loopback::LoopbackEngine;
use callhub::negotiation::{Coordinator, UiCommand, UiEvent, WsRelayClient};
use clap::Parser;
use tokio::io::{self, AsyncBufReadExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let config = PeerConfig::parse();

    let (transport, relay) = WsRelayClient::connect(&config.relay_url).await?;
    let (coordinator, ui) = Coordinator::new(LoopbackEngine::new(config.name), transport);
    let (commands, commands_rx) = async_channel::unbounded();
    let coordinator_task = tokio::spawn(coordinator.run(commands_rx, relay));

    // UI rendering
    tokio::spawn(async move {
        while let Ok(event) = ui.recv().await {
            match event {
                UiEvent::Affordances(a) => println!(
                    "[start: {}] [call: {}] [hangup: {}]",
                    on_off(a.start),
                    on_off(a.call),
                    on_off(a.hangup)
                ),
                UiEvent::StateChanged(state) => println!("> {}", state),
                UiEvent::LocalStream(stream) => println!("local video: {}", stream.id),
                UiEvent::RemoteStream(stream) => println!("remote video: {}", stream.id),
                UiEvent::Alert(msg) => println!("!! {}", msg),
                UiEvent::SetupTime(elapsed) => println!("setup time: {:?}", elapsed),
            }
        }
    });

    println!("Commands: start, call, hangup, rearm, quit");

    let mut stdin = io::BufReader::new(io::stdin()).lines();
    while let Ok(Some(line)) = stdin.next_line().await {
        let cmd = match line.trim() {
            "start" => UiCommand::Start,
            "call" => UiCommand::Call,
            "hangup" => UiCommand::Hangup,
            "rearm" => UiCommand::Rearm,
            "quit" | "exit" => break,
            "" => continue,
            other => {
                println!("Unknown command: {}", other);
                continue;
            }
        };
        if commands.send(cmd).await.is_err() {
            break;
        }
    }

    drop(commands);
    coordinator_task.abort();
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
