//! Line-delimited JSON transport over stdio (spec.md §6). Each line is a
//! `{"tool": "...", "params": {...}}` request; each response is a single
//! JSON object written back on its own line.

use crate::transport::tools::{self, AppState};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

#[derive(Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    params: Value,
}

pub async fn run(state: AppState) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolCall>(&line) {
            Ok(call) => tools::dispatch(&state, &call.tool, call.params).await,
            Err(e) => {
                warn!(error = %e, "malformed stdio request line");
                json!({"success": false, "error": format!("malformed request: {e}"), "code": "Validation"})
            }
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
    Ok(())
}
