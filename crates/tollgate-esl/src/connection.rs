//! Inbound ESL connection to one FreeSWITCH server

use crate::constants;
use crate::event::EslEvent;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tollgate_core::config::FreeSwitchServer;
use tollgate_core::{AppError, AppResult};
use tracing::{debug, info};

/// An authenticated socket ready for `api` commands
pub struct EslConnection {
    reader: BufReader<TcpStream>,
    server_id: String,
}

impl EslConnection {
    /// Connect and authenticate
    pub async fn connect(server: &FreeSwitchServer) -> AppResult<Self> {
        let server_id = server.label();
        debug!("Connecting to FreeSWITCH ESL: {}", server_id);

        let stream = TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(|e| io_error(&server_id, e))?;
        let mut conn = Self {
            reader: BufReader::new(stream),
            server_id,
        };

        let greeting = conn.read_message().await?;
        if !greeting.is_auth_request() {
            return Err(AppError::EslConnection(format!(
                "{}: invalid greeting",
                conn.server_id
            )));
        }

        conn.write_command(&format!("{} {}", constants::AUTH_COMMAND, server.password))
            .await?;
        let reply = conn.read_reply().await?;
        if !reply.is_ok() {
            return Err(AppError::EslConnection(format!(
                "{}: authentication failed",
                conn.server_id
            )));
        }

        info!("Authenticated to FreeSWITCH: {}", conn.server_id);
        Ok(conn)
    }

    /// Run a synchronous `api` command and return its response
    pub async fn api(&mut self, command: &str) -> AppResult<EslEvent> {
        debug!(server = %self.server_id, "api {}", command);
        self.write_command(&format!("{} {}", constants::API_COMMAND, command))
            .await?;
        self.read_reply().await
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Politely close the socket; errors are irrelevant at this point
    pub async fn close(mut self) {
        let _ = self.write_command(constants::EXIT_COMMAND).await;
    }

    async fn write_command(&mut self, command: &str) -> AppResult<()> {
        let stream = self.reader.get_mut();
        stream
            .write_all(format!("{}\n\n", command).as_bytes())
            .await
            .map_err(|e| io_error(&self.server_id, e))?;
        stream
            .flush()
            .await
            .map_err(|e| io_error(&self.server_id, e))?;
        Ok(())
    }

    /// Read until a reply arrives, skipping any events in between
    async fn read_reply(&mut self) -> AppResult<EslEvent> {
        loop {
            let message = self.read_message().await?;
            if message.is_event() {
                debug!("Skipping event while waiting for command response");
                continue;
            }
            return Ok(message);
        }
    }

    async fn read_message(&mut self) -> AppResult<EslEvent> {
        let mut headers = String::new();

        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| io_error(&self.server_id, e))?;
            if read == 0 {
                return Err(AppError::EslConnection(format!(
                    "{}: connection closed",
                    self.server_id
                )));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if headers.is_empty() {
                    continue;
                }
                break;
            }
            headers.push_str(line);
            headers.push('\n');
        }

        let mut message = EslEvent::parse(&headers);
        if let Some(len) = message.content_length() {
            let mut body = vec![0u8; len];
            self.reader
                .read_exact(&mut body)
                .await
                .map_err(|e| io_error(&self.server_id, e))?;
            message.set_body(String::from_utf8_lossy(&body).into_owned());
        }

        Ok(message)
    }
}

fn io_error(server_id: &str, err: std::io::Error) -> AppError {
    AppError::EslConnection(format!("{}: {}", server_id, err))
}
