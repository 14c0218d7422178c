//! Newline-delimited JSON-RPC: one request per input line, one response
//! per output line. Notifications and blank lines produce no output.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::mcp::handler::handle_mcp_request;
use crate::mcp::protocol::{error_codes, Request, Response};
use crate::AppState;

/// Answer one raw input line.
pub async fn handle_line(line: &str, state: &AppState) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle_mcp_request(request, state.clone()).await,
        Err(e) => {
            warn!(error = %e, "unparseable request line");
            Some(Response::error(
                Value::Null,
                error_codes::PARSE_ERROR,
                format!("Parse error: {}", e),
            ))
        }
    }
}

/// Serve requests from `input` until it is exhausted.
pub async fn serve<R, W>(input: R, mut output: W, state: AppState) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(response) = handle_line(&line, &state).await else {
            continue;
        };
        let mut frame = serde_json::to_vec(&response)?;
        debug!(bytes = frame.len(), "writing response");
        frame.push(b'\n');
        output.write_all(&frame).await?;
        output.flush().await?;
    }
    info!("input closed, stdio transport stopping");
    Ok(())
}
