use async_trait::async_trait;
use tracing::debug;

use super::{Arguments, ParamType, ParameterSchema, Tool, ToolContext, ToolOutput};
use crate::error::{AgentError, Result};

/// Fetches a URL and returns its body as readable text.  HTML is converted
/// to markdown.
#[derive(Debug, Clone)]
pub struct FetchUrlTool {
    default_max_chars: usize,
}

impl FetchUrlTool {
    pub fn new(default_max_chars: usize) -> Self {
        Self { default_max_chars }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &'static str {
        "fetch_url"
    }

    fn description(&self) -> &'static str {
        "Fetch a URL and return its content as readable text/markdown. Useful for reading web pages."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("url", ParamType::String, "http or https URL to fetch")
            .optional(
                "max_chars",
                ParamType::Integer,
                "Maximum characters to return (default 50000)",
            )
    }

    /// Bad input comes back as error output; network failures and non-2xx
    /// responses are `ToolExecution` errors.
    async fn execute(&self, args: &Arguments, ctx: &ToolContext) -> Result<ToolOutput> {
        let url = args.str("url").unwrap_or_default();
        let max_chars = args
            .u64("max_chars")
            .map(|n| n as usize)
            .unwrap_or(self.default_max_chars);

        if url.is_empty() {
            return Ok(ToolOutput::error("url is required"));
        }

        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Ok(ToolOutput::error(format!(
                    "unsupported URL scheme: {}",
                    parsed.scheme()
                )));
            }
            Err(e) => return Ok(ToolOutput::error(format!("invalid URL: {e}"))),
        }

        debug!(url, max_chars, "fetching URL");

        let resp = ctx
            .http_client
            .get(url)
            .header("User-Agent", "Mozilla/5.0 (compatible; file-agent/0.1)")
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("fetch failed: {e}")))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AgentError::ToolExecution(format!(
                "fetch returned {status}: {}",
                truncate_chars(&body, 500)
            )));
        }

        let text = if content_type.contains("text/html") {
            htmd::convert(&body).unwrap_or(body)
        } else {
            body
        };

        Ok(ToolOutput::ok(truncate_chars(&text, max_chars)))
    }
}

/// Truncate to at most `max_chars` characters, noting the cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...\n[truncated at {max_chars} chars]", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests::test_ctx;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::routing::get;

    /// Serve a few fixed pages on an ephemeral local port.
    async fn serve_pages() -> String {
        let app = Router::new()
            .route(
                "/page",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                        "<html><body><h1>Notes</h1><p>Buy <strong>milk</strong></p></body></html>",
                    )
                }),
            )
            .route(
                "/plain",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/plain")],
                        "abcdefghijklmnopqrstuvwxyz",
                    )
                }),
            )
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "no such page") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        let cut = truncate_chars("ñañaña", 3);
        assert!(cut.starts_with("ñañ..."));
        assert!(cut.contains("[truncated at 3 chars]"));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let args = Arguments::from_value(serde_json::json!({"url": "file:///etc/passwd"}));
        let result = FetchUrlTool::new(100).execute(&args, &ctx).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("unsupported URL scheme: file"));
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let args = Arguments::from_value(serde_json::json!({"url": "not a url"}));
        let result = FetchUrlTool::new(100).execute(&args, &ctx).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("invalid URL"));
    }

    #[tokio::test]
    async fn empty_url_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let args = Arguments::from_value(serde_json::json!({"url": ""}));
        let result = FetchUrlTool::new(100).execute(&args, &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "url is required");
    }

    #[tokio::test]
    async fn html_is_converted_to_markdown() {
        let base = serve_pages().await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let args = Arguments::from_value(serde_json::json!({"url": format!("{base}/page")}));

        let result = FetchUrlTool::new(50_000).execute(&args, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("# Notes"), "{}", result.output);
        assert!(result.output.contains("**milk**"), "{}", result.output);
        assert!(!result.output.contains("<p>"));
    }

    #[tokio::test]
    async fn plain_text_is_truncated_to_max_chars() {
        let base = serve_pages().await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let url = format!("{base}/plain");

        let args = Arguments::from_value(serde_json::json!({"url": url, "max_chars": 5}));
        let result = FetchUrlTool::new(50_000).execute(&args, &ctx).await.unwrap();
        assert_eq!(result.output, "abcde...\n[truncated at 5 chars]");

        // Falls back to the configured limit.
        let args = Arguments::from_value(serde_json::json!({"url": url}));
        let result = FetchUrlTool::new(3).execute(&args, &ctx).await.unwrap();
        assert!(result.output.starts_with("abc..."));

        let result = FetchUrlTool::new(100).execute(&args, &ctx).await.unwrap();
        assert_eq!(result.output, "abcdefghijklmnopqrstuvwxyz");
    }

    #[tokio::test]
    async fn error_status_is_tool_execution_error() {
        let base = serve_pages().await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let args = Arguments::from_value(serde_json::json!({"url": format!("{base}/missing")}));

        let err = FetchUrlTool::new(100).execute(&args, &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(ref m) if m.contains("404")));
        assert!(err.to_string().contains("no such page"));
    }

    #[tokio::test]
    async fn failed_fetch_reaches_model_as_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let mut config = crate::config::Config::default();
        config.tools.fetch_url.enabled = true;
        let registry = crate::tools::build_registry(&config).unwrap();

        // Nothing listens on port 1.
        let call = crate::tools::ToolCallRequest {
            call_id: "c1".into(),
            name: "fetch_url".into(),
            arguments: r#"{"url":"http://127.0.0.1:1/"}"#.into(),
            item_id: None,
        };
        let result = registry.dispatch(&call, &ctx).await;
        assert!(!result.success);
        assert!(result.output.starts_with("tool execution error: fetch failed"));
    }
}
