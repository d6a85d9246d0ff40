/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */


//! A chat room served over TCP.
//!
//! ```text
//! cargo run --example chat_room -- serve --listen 127.0.0.1:4100
//! cargo run --example chat_room -- join --server 127.0.0.1:4100 --nick ada --say "hello"
//! ```

use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Parser, Subcommand};
use courier::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "chat_room")]
#[command(about = "Location-transparent chat room over TCP")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a room
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:4100")]
        listen: String,
        /// Well-known name of the room
        #[arg(long, default_value = "lobby")]
        room: String,
    },
    /// Join a room hosted elsewhere and post to it
    Join {
        /// Address of the hosting process
        #[arg(long, default_value = "127.0.0.1:4100")]
        server: String,
        /// Well-known name of the room
        #[arg(long, default_value = "lobby")]
        room: String,
        /// Address this process listens on for responses
        #[arg(long, default_value = "127.0.0.1:0")]
        listen: String,
        /// Display name
        #[arg(long)]
        nick: String,
        /// Messages to post, in order
        #[arg(long)]
        say: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ChatError {
    NotJoined,
    Blank,
}

#[derive(Debug, Default)]
struct ChatRoom {
    nicks: BTreeMap<ActorId, String>,
    log: Vec<String>,
}

#[remote_actor]
impl ChatRoom {
    #[remote]
    async fn join(&mut self, member: ActorId, nick: String) -> String {
        info!(%member, %nick, "Member joined");
        match self.nicks.insert(member, nick.clone()) {
            None => format!("welcome, {nick}"),
            Some(_) => format!("welcome back, {nick}"),
        }
    }

    #[remote]
    async fn say(&mut self, member: ActorId, text: String) -> Result<usize, ChatError> {
        let nick = self.nicks.get(&member).ok_or(ChatError::NotJoined)?;
        if text.trim().is_empty() {
            return Err(ChatError::Blank);
        }
        self.log.push(format!("<{nick}> {text}"));
        Ok(self.log.len())
    }

    #[remote]
    fn transcript(&self) -> Vec<String> {
        self.log.clone()
    }

    #[remote(oneway)]
    fn leave(&mut self, member: ActorId) {
        if let Some(nick) = self.nicks.remove(&member) {
            info!(%nick, "Member left");
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn serve(listen: &str, room: &str) -> Result<()> {
    let transport = Transport::with_network(TcpNetwork::bind(listen).await?);
    let id = transport.allocate_named::<ChatRoom>(room)?;
    transport.register(id.clone(), ChatRoom::default())?;
    info!(room = %id, "Serving; stop with Ctrl-C");

    tokio::signal::ctrl_c().await?;
    transport.shutdown();
    Ok(())
}

async fn join(server: &str, room: &str, listen: &str, nick: String, say: Vec<String>) -> Result<()> {
    let transport = Transport::with_network(TcpNetwork::bind(listen).await?);
    let me = transport.allocate::<ChatRoom>();
    let room = transport.resolve::<ChatRoom>(ActorId::new(ChatRoom::TYPE_NAME, room, server))?;

    println!("{}", room.join(me.clone(), nick).await?);
    for text in say {
        match room.say(me.clone(), text).await {
            Ok(count) => info!(count, "Posted"),
            Err(CallError::Application(reason)) => println!("rejected: {reason:?}"),
            Err(err) => return Err(err.into()),
        }
    }
    for line in room.transcript().await? {
        println!("{line}");
    }
    room.leave(me).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { listen, room } => serve(&listen, &room).await,
        Commands::Join {
            server,
            room,
            listen,
            nick,
            say,
        } => join(&server, &room, &listen, nick, say).await,
    }
}
