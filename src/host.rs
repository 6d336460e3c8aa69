//! Line-delimited JSON bridge between the host task system and the
//! activities.
//!
//! Each input line is `{"id": ..., "activity": "...", "input": {...}}`. Each
//! call runs as its own task, so a pending `validate` does not block other
//! calls; responses are written as they complete, one JSON object per line:
//! `{"id": ..., "ok": ...}` or `{"id": ..., "error": "..."}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::activities::TelegramActivities;

/// One activity call from the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostCall {
    /// Opaque correlation id echoed in the response.
    #[serde(default)]
    pub id: Option<Value>,
    /// Activity name.
    pub activity: String,
    /// Activity input.
    #[serde(default)]
    pub input: Value,
}

/// Response to one [`HostCall`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostResponse {
    /// Correlation id from the call, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Activity result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResponse {
    fn success(id: Option<Value>, value: Value) -> Self {
        Self {
            id,
            ok: Some(value),
            error: None,
        }
    }

    fn failure(id: Option<Value>, message: String) -> Self {
        Self {
            id,
            ok: None,
            error: Some(message),
        }
    }
}

async fn answer(activities: Arc<TelegramActivities>, call: HostCall) -> HostResponse {
    match activities.invoke(&call.activity, call.input).await {
        Ok(value) => HostResponse::success(call.id, value),
        Err(e) => {
            warn!(activity = %call.activity, error = %e, "activity failed");
            HostResponse::failure(call.id, e.to_string())
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &HostResponse,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Serve activity calls from `reader` until it closes and every call has
/// answered.
///
/// # Errors
///
/// Returns an error if reading input or writing a response fails.
pub async fn serve<R, W>(
    activities: Arc<TelegramActivities>,
    reader: R,
    mut writer: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut calls = JoinSet::new();
    let mut open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str::<HostCall>(&line) {
                    Ok(call) => {
                        calls.spawn(answer(Arc::clone(&activities), call));
                    }
                    Err(e) => {
                        let response = HostResponse::failure(None, format!("malformed call: {e}"));
                        write_response(&mut writer, &response).await?;
                    }
                },
                None => {
                    info!(pending = calls.len(), "host input closed");
                    open = false;
                }
            },
            Some(joined) = calls.join_next(), if !calls.is_empty() => {
                let response = match joined {
                    Ok(r) => r,
                    Err(e) => HostResponse::failure(None, format!("activity task failed: {e}")),
                };
                write_response(&mut writer, &response).await?;
            }
            else => break,
        }
    }

    Ok(())
}
