//! # Tool Server
//!
//! Line-delimited JSON-RPC 2.0 over stdin/stdout, speaking the tool subset of
//! the Model Context Protocol:
//!
//! | Method                      | Reply                               |
//! |-----------------------------|-------------------------------------|
//! | `initialize`                | protocol version, capabilities      |
//! | `notifications/initialized` | none                                |
//! | `ping`                      | `{}`                                |
//! | `tools/list`                | every [`ToolDescriptor`]            |
//! | `tools/call`                | one text content item               |
//!
//! stdout carries only protocol messages; logs go to stderr.
//!
//! [`ToolDescriptor`]: crate::tools::ToolDescriptor

use crate::tools::{self, ToolCallError, ToolSurface};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, Write};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "maestro";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// Sent to the agent on `initialize`.
pub const INSTRUCTIONS: &str = "You control the user's local music player. \
Whenever the user asks for a music action (play, pause, resume, stop, skip, volume, seek), \
call the matching tool right away instead of describing what you would do. \
Do not ask for confirmation. Examples: \"play some Queen\" -> play_artist(artist=\"Queen\"); \
\"pause\" -> pause(); \"too loud\" -> volume_down(). \
When unsure what is going on, call get_player_status first.";

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Serve requests from `input` until EOF, writing one reply per line to
/// `output`.
///
/// # Errors
///
/// Returns an error only if reading `input` or writing `output` fails.
pub fn serve<R: BufRead, W: Write>(tools: &mut ToolSurface, input: R, mut output: W) -> Result<()> {
    info!("Tool server ready");

    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(reply) = handle_line(tools, &line) {
            writeln!(output, "{reply}").context("Failed to write response")?;
            output.flush().context("Failed to flush response")?;
        }
    }

    info!("Input closed, tool server shutting down");
    Ok(())
}

/// Handle one raw message. Notifications produce no reply.
pub fn handle_line(tools: &mut ToolSurface, line: &str) -> Option<Value> {
    let raw: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("Unparsable request: {e}");
            return Some(error_reply(Value::Null, PARSE_ERROR, format!("Parse error: {e}")));
        }
    };

    let request: Request = match serde_json::from_value(raw.clone()) {
        Ok(request) => request,
        Err(e) => {
            let id = raw.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_reply(id, INVALID_REQUEST, format!("Invalid request: {e}")));
        }
    };

    debug!("<- {}", request.method);
    let Some(id) = request.id else {
        // Notifications never get a reply, known or not.
        debug!("Notification {}", request.method);
        return None;
    };

    let reply = match dispatch(tools, &request.method, request.params) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => error_reply(id, code, message),
    };
    Some(reply)
}

fn dispatch(tools: &mut ToolSurface, method: &str, params: Value) -> Result<Value, (i64, String)> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            "instructions": INSTRUCTIONS,
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tools::descriptors() })),
        "tools/call" => {
            let params: CallParams = serde_json::from_value(params)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {e}")))?;
            call_tool(tools, &params.name, &params.arguments)
        }
        other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
    }
}

fn call_tool(tools: &mut ToolSurface, name: &str, arguments: &Value) -> Result<Value, (i64, String)> {
    match tools.call(name, arguments) {
        Ok(output) => Ok(json!({
            "content": [{ "type": "text", "text": output.into_text() }],
            "isError": false,
        })),
        Err(e) => {
            if let Some(call_error) = e.downcast_ref::<ToolCallError>() {
                return Err((INVALID_PARAMS, call_error.to_string()));
            }
            warn!("Tool {name} failed: {e:#}");
            Ok(json!({
                "content": [{ "type": "text", "text": format!("{name} failed: {e}") }],
                "isError": true,
            }))
        }
    }
}

fn error_reply(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MusicStore;
    use crate::db::tests::new_track;
    use crate::player::tests::fake_player;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn tools() -> ToolSurface {
        let mut store = MusicStore::open_in_memory().unwrap();
        store
            .add_track(&new_track("/m/1.mp3", "Song", "Band", Some(1977), "Punk"))
            .unwrap();
        let (player, _) = fake_player();
        ToolSurface::new(store, player, PathBuf::from("/nonexistent"))
    }

    fn request(tools: &mut ToolSurface, message: Value) -> Option<Value> {
        handle_line(tools, &message.to_string())
    }

    #[test]
    fn test_initialize() {
        let mut tools = tools();
        let reply = request(&mut tools, json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} })).unwrap();
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(reply["result"]["serverInfo"]["name"], "maestro");
        assert!(reply["result"]["instructions"].as_str().unwrap().contains("call the matching tool"));
    }

    #[test]
    fn test_notifications_get_no_reply() {
        let mut tools = tools();
        assert!(request(&mut tools, json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })).is_none());
    }

    #[test]
    fn test_tools_list() {
        let mut tools = tools();
        let reply = request(&mut tools, json!({ "jsonrpc": "2.0", "id": "a", "method": "tools/list" })).unwrap();
        let listed = reply["result"]["tools"].as_array().unwrap();
        assert_eq!(listed.len(), tools::descriptors().len());
        assert!(listed.iter().any(|t| t["name"] == "play_artist" && t["inputSchema"]["required"][0] == "artist"));
    }

    #[test]
    fn test_tools_call_returns_text_content() {
        let mut tools = tools();
        let reply = request(
            &mut tools,
            json!({
                "jsonrpc": "2.0", "id": 7, "method": "tools/call",
                "params": { "name": "set_volume", "arguments": { "volume": 0.4 } }
            }),
        )
        .unwrap();
        assert_eq!(reply["result"]["isError"], false);
        assert_eq!(reply["result"]["content"][0]["text"], "Volume: 40%");
    }

    #[test]
    fn test_error_codes() {
        let mut tools = tools();
        let reply = handle_line(&mut tools, "{not json").unwrap();
        assert_eq!(reply["error"]["code"], PARSE_ERROR);

        let reply = request(&mut tools, json!({ "jsonrpc": "2.0", "id": 2, "method": "dance" })).unwrap();
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);

        let reply = request(
            &mut tools,
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": { "name": "nope" } }),
        )
        .unwrap();
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);

        let reply = request(
            &mut tools,
            json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": { "name": "set_volume", "arguments": { "volume": "loud" } } }),
        )
        .unwrap();
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_serve_until_eof() {
        let mut tools = tools();
        let input = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string(),
            String::new(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": { "name": "play_artist", "arguments": { "artist": "band" } } }).to_string(),
        ]
        .join("\n");

        let mut output = Vec::new();
        serve(&mut tools, Cursor::new(input), &mut output).unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"], json!({}));
        assert!(replies[1]["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Playing 1 tracks by band"));
    }
}
