use std::io::Write;
use std::path::{Path, PathBuf};

use concierge_core::SessionContext;
use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{err:#}");
    std::process::exit(1);
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("concierge")
}

/// Where `concierge turn` keeps the session context between invocations.
pub fn session_path() -> PathBuf {
    config_dir().join("session.json")
}

/// A missing or unreadable session file starts a fresh conversation.
pub fn load_session(path: &Path) -> SessionContext {
    let Ok(data) = std::fs::read_to_string(path) else {
        return SessionContext::default();
    };
    match serde_json::from_str(&data) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
            SessionContext::default()
        }
    }
}

pub fn save_session(path: &Path, ctx: &SessionContext) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(ctx)?;

    // Sessions hold ticket ids; keep them private to the user (0o600)
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data.as_bytes())?;

    Ok(())
}

pub fn clear_session(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Execute an API request, print the response, exit with structured code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    body: Option<serde_json::Value>,
    raw: bool,
) -> i32 {
    let url = match reqwest::Url::parse(&format!("{api_url}{path}")) {
        Ok(u) => u,
        Err(e) => {
            let err = json!({
                "error": "cli_error",
                "message": format!("Invalid URL: {api_url}{path}: {e}")
            });
            eprintln!("{err:#}");
            return 4;
        }
    };

    let mut req = client().request(method, url);
    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check CONCIERGE_API_URL."
            });
            eprintln!("{err:#}");
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = exit_code_for(status);

    let resp_body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    let formatted = if raw {
        resp_body.to_string()
    } else {
        format!("{resp_body:#}")
    };

    if exit_code == 0 {
        println!("{formatted}");
    } else {
        eprintln!("{formatted}");
    }

    exit_code
}

/// POST a JSON body and return the status with the parsed response (no printing).
pub async fn post_json(
    api_url: &str,
    path: &str,
    body: &serde_json::Value,
) -> Result<(u16, serde_json::Value), String> {
    let url = reqwest::Url::parse(&format!("{api_url}{path}"))
        .map_err(|e| format!("Invalid URL: {e}"))?;

    let resp = client()
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| format!("{e}"))?;
    let status = resp.status().as_u16();
    let body: serde_json::Value = resp
        .json()
        .await
        .unwrap_or(json!({"error": "non-json response"}));

    Ok((status, body))
}

pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

// Unix-specific imports for file permissions
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

// No-op on non-unix (won't compile for Windows without this)
#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::Turn;

    fn temp_session(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("concierge-cli-{}-{name}", std::process::id()))
            .join("session.json")
    }

    #[test]
    fn session_survives_save_and_load() {
        let path = temp_session("roundtrip");
        let ctx = SessionContext {
            ticket_id: Some("550e8400-e29b-41d4-a716-446655440002".to_string()),
            turns: vec![Turn::customer("hi")],
            ..SessionContext::default()
        };
        save_session(&path, &ctx).unwrap();
        assert_eq!(load_session(&path), ctx);
        clear_session(&path).unwrap();
        assert_eq!(load_session(&path), SessionContext::default());
        // Clearing twice is fine
        clear_session(&path).unwrap();
    }

    #[test]
    fn corrupt_session_starts_fresh() {
        let path = temp_session("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_session(&path), SessionContext::default());
        clear_session(&path).unwrap();
    }

    #[test]
    fn status_classes_map_to_exit_codes() {
        assert_eq!(exit_code_for(200), 0);
        assert_eq!(exit_code_for(429), 1);
        assert_eq!(exit_code_for(502), 2);
    }
}
