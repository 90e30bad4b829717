use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::server::{DEFAULT_MAX_MESSAGE_SIZE, RelayConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat relay and the static page server.
    Serve(ServeArgs),
    /// Connect to a relay from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// WebSocket address for chat clients. Use port 0 for an ephemeral port.
    #[arg(long, env = "SOAPY_LISTEN", default_value = "0.0.0.0:8765")]
    pub listen: SocketAddr,

    /// Address of the plain HTTP server for the browser page.
    #[arg(long, env = "SOAPY_HTTP_LISTEN", default_value = "0.0.0.0:8000")]
    pub http_listen: SocketAddr,

    /// Directory served over HTTP.
    #[arg(long, env = "SOAPY_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Inbound messages larger than this many bytes drop the connection.
    #[arg(long, env = "SOAPY_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    /// Seconds a single outbound write may take before the recipient is dropped.
    #[arg(long, env = "SOAPY_SEND_TIMEOUT_SECS", default_value_t = 30)]
    pub send_timeout_secs: u64,

    /// Skip the static page server.
    #[arg(long)]
    pub no_http: bool,
}

impl ServeArgs {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_message_size: self.max_message_size,
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Display name announced after connecting.
    #[arg(long)]
    pub name: String,

    /// WebSocket URL of the relay.
    #[arg(long, env = "SOAPY_SERVER", default_value = "ws://127.0.0.1:8765")]
    pub server: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["soapy-chat", "serve"]).expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        assert_eq!(args.listen.port(), 8765);
        assert_eq!(args.http_listen.port(), 8000);
        assert!(!args.no_http);

        let config = args.relay_config();
        assert_eq!(config.max_message_size, 10_000_000);
        assert_eq!(config.send_timeout, Duration::from_secs(30));
    }

    #[test]
    fn client_requires_a_name() {
        assert!(Cli::try_parse_from(["soapy-chat", "client"]).is_err());

        let cli = Cli::try_parse_from(["soapy-chat", "client", "--name", "Bo"]).expect("parse");
        let Command::Client(args) = cli.command else {
            panic!("expected client");
        };
        assert_eq!(args.name, "Bo");
        assert_eq!(args.server, "ws://127.0.0.1:8765");
    }
}
