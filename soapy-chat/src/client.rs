use std::path::Path;

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    message::{ClientEvent, EntryKind, HistoryEntry, ServerEvent, decode, encode},
};

type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Outgoing = SplitSink<Connection, Message>;
type Incoming = SplitStream<Connection>;

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut outgoing, mut incoming) = establish_connection(&args).await?;
    send_event(
        &mut outgoing,
        &ClientEvent::Join {
            name: args.name.clone(),
        },
    )
    .await?;
    write_stdout(&format!("*** connected as {}", args.name)).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    run_client_loop(&mut incoming, &mut outgoing, &mut stdin, &mut input).await?;
    shutdown_connection(&mut outgoing).await;

    Ok(())
}

async fn establish_connection(args: &ClientArgs) -> Result<(Outgoing, Incoming)> {
    let (connection, _) = connect_async(args.server.as_str())
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    Ok(connection.split())
}

async fn send_event(outgoing: &mut Outgoing, event: &ClientEvent) -> Result<()> {
    outgoing
        .send(Message::Text(encode(event)?))
        .await
        .context("failed to send event to relay")
}

async fn run_client_loop(
    incoming: &mut Incoming,
    outgoing: &mut Outgoing,
    stdin: &mut BufReader<tokio::io::Stdin>,
    input: &mut String,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            frame = incoming.next() => {
                if !handle_server_frame(frame).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read, input, outgoing).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_frame(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> Result<bool> {
    let text = match frame {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(Message::Close(_))) | None => {
            write_stdout("*** server closed the connection").await?;
            return Ok(false);
        }
        Some(Ok(_)) => return Ok(true),
        Some(Err(err)) => return Err(err).context("lost connection to relay"),
    };

    render_server_event(decode(&text)?).await?;
    Ok(true)
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    outgoing: &mut Outgoing,
) -> Result<bool> {
    let bytes_read = bytes_read?;
    if bytes_read == 0 {
        return Ok(false);
    }

    let text = input.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    let event = match text.strip_prefix("/image ") {
        Some(path) => match read_image(Path::new(path.trim())).await {
            Ok(content) => ClientEvent::Image { content },
            Err(err) => {
                write_stderr(&format!("!!! {err:#}")).await?;
                return Ok(true);
            }
        },
        None => ClientEvent::Message {
            content: text.to_string(),
        },
    };

    send_event(outgoing, &event).await?;
    Ok(true)
}

/// Reads a file and wraps it as a base64 data URI, the form browsers can put
/// straight into an `<img src>`.
async fn read_image(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!(
        "data:{};base64,{}",
        mime_for(path),
        STANDARD.encode(bytes)
    ))
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(outgoing: &mut Outgoing) {
    if let Err(error) = outgoing.close().await {
        warn!(?error, "failed to close connection cleanly");
    }
}

async fn render_server_event(event: ServerEvent) -> io::Result<()> {
    match event {
        ServerEvent::History { messages } => {
            for entry in messages {
                write_stdout(&render_entry(&entry)).await?;
            }
            Ok(())
        }
        live => match entry_of(live) {
            Some(entry) => write_stdout(&render_entry(&entry)).await,
            None => Ok(()),
        },
    }
}

fn entry_of(event: ServerEvent) -> Option<HistoryEntry> {
    match event {
        ServerEvent::Message { name, content } => {
            Some(HistoryEntry::new(EntryKind::Message, name, content))
        }
        ServerEvent::Image { name, content } => {
            Some(HistoryEntry::new(EntryKind::Image, name, content))
        }
        ServerEvent::History { .. } => None,
    }
}

fn render_entry(entry: &HistoryEntry) -> String {
    match entry.kind {
        EntryKind::Message => format!("<{}> {}", entry.name, entry.content),
        EntryKind::Image => format!("<{}> [image, {} bytes]", entry.name, entry.content.len()),
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
