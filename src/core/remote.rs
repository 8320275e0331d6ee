// KwTheme - core/remote.rs
//
// Remote classification against a chat-style inference endpoint.
//
// Two request flavors are supported:
//   - OpenAI-compatible chat completions: reply at choices[0].message.content
//   - DashScope text generation: reply at output.text, falling back to
//     output.choices[0].message.content and then choices[0].message.content
//
// Every failure is returned as a `RemoteError`; the fallback chain turns it
// into local classification for that keyword only. The API key is never
// logged.

use crate::core::classify::Classifier;
use crate::core::model::{KeywordRecord, Theme};
use crate::util::constants;
use crate::util::error::RemoteError;
use crate::util::logging::endpoint_preview;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request/response shape of the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// OpenAI-compatible `/chat/completions` (DeepSeek and most gateways).
    #[default]
    #[serde(alias = "openai-compatible", alias = "deepseek")]
    OpenAi,
    /// Alibaba DashScope text generation (Tongyi/Qwen).
    #[serde(alias = "tongyi", alias = "qwen")]
    DashScope,
}

impl ApiFlavor {
    /// Parse a flavor name as written in config or environment.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" | "openai-compatible" | "deepseek" => Some(Self::OpenAi),
            "dashscope" | "tongyi" | "qwen" => Some(Self::DashScope),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DashScope => "dashscope",
        }
    }
}

/// Resolved, validated settings for one remote classifier.
#[derive(Clone, PartialEq)]
pub struct RemoteSettings {
    /// Full request URL.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub flavor: ApiFlavor,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Retries after a transient failure. 0 = single attempt.
    pub retry_attempts: u32,
    /// Base delay before the first retry; doubled for each further retry.
    pub retry_delay_ms: u64,
}

// Hand-written so the API key never reaches a log line.
impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("endpoint", &endpoint_preview(&self.endpoint))
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("flavor", &self.flavor)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Body for OpenAI-compatible chat completions.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

/// Body for DashScope text generation.
#[derive(Serialize)]
struct DashScopeRequest<'a> {
    model: &'a str,
    input: DashScopeInput<'a>,
    parameters: DashScopeParameters,
}

#[derive(Serialize)]
struct DashScopeInput<'a> {
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct DashScopeParameters {
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct DashScopeResponse {
    #[serde(default)]
    output: Option<DashScopeOutput>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct DashScopeOutput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

fn first_content(choices: Vec<ChatChoice>) -> Option<String> {
    choices.into_iter().next().and_then(|c| c.message.content)
}

// =============================================================================
// Prompt
// =============================================================================

/// System prompt carrying the closed theme enumeration.
pub fn system_prompt() -> String {
    let labels: Vec<&str> = Theme::ALL.iter().map(|t| t.label()).collect();
    format!(
        "You classify search keywords by topic. Reply with exactly one theme \
         label from this list and nothing else: {}. Use \"other\" when no \
         theme fits.",
        labels.join(", ")
    )
}

/// User prompt for one keyword. Volume is included only when known.
pub fn user_prompt(record: &KeywordRecord) -> String {
    match record.volume {
        Some(volume) => format!("Keyword: {}\nMonthly search volume: {volume}", record.text),
        None => format!("Keyword: {}", record.text),
    }
}

// =============================================================================
// Label parsing
// =============================================================================

/// Shape of a JSON-formatted reply.
#[derive(Deserialize)]
struct LabelObject {
    #[serde(alias = "label", alias = "category")]
    theme: String,
}

/// Turn the model's reply into a theme.
///
/// Accepts a bare label, a quoted label, a `Theme:` prefix, a trailing
/// period, or a JSON object `{"theme": "..."}` (optionally in a code fence).
pub fn parse_label(reply: &str) -> Result<Theme, RemoteError> {
    let mut text = reply.trim();

    if text.starts_with("```") {
        text = text
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
    }

    let owned;
    if text.starts_with('{') {
        let obj: LabelObject = serde_json::from_str(text)
            .map_err(|e| RemoteError::Malformed(format!("JSON reply without theme: {e}")))?;
        owned = obj.theme;
        text = owned.trim();
    }

    const PREFIX: &str = "theme:";
    if text
        .get(..PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(PREFIX))
    {
        text = text[PREFIX.len()..].trim();
    }

    let is_quote = |c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’' | '「' | '」');
    let label = text
        .trim_end_matches(['.', '。'])
        .trim_matches(is_quote)
        .trim_end_matches(['.', '。'])
        .trim();

    if label.is_empty() {
        return Err(RemoteError::Malformed("empty label".to_string()));
    }
    Theme::from_label(label).ok_or_else(|| RemoteError::UnknownLabel(label.to_string()))
}

// =============================================================================
// Client
// =============================================================================

/// Blocking HTTP classifier. Safe to share across worker threads.
pub struct RemoteClassifier {
    settings: RemoteSettings,
    client: reqwest::blocking::Client,
    system_prompt: String,
}

impl RemoteClassifier {
    /// Build the HTTP client. Fails only on an unusable endpoint URL or TLS
    /// backend initialisation failure.
    pub fn new(settings: RemoteSettings) -> Result<Self, RemoteError> {
        let url = reqwest::Url::parse(&settings.endpoint).map_err(|e| {
            RemoteError::ClientBuild(format!(
                "invalid endpoint '{}': {e}",
                endpoint_preview(&settings.endpoint)
            ))
        })?;

        let timeout = Duration::from_secs(settings.timeout_secs);
        let connect_timeout =
            Duration::from_secs(constants::CONNECT_TIMEOUT_SECS.min(settings.timeout_secs));

        let mut builder = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout);

        // Local inference servers must not be routed through a system proxy.
        if is_loopback(&url) {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| RemoteError::ClientBuild(e.to_string()))?;

        tracing::info!(
            endpoint = %endpoint_preview(&settings.endpoint),
            model = %settings.model,
            flavor = settings.flavor.label(),
            timeout_secs = settings.timeout_secs,
            retries = settings.retry_attempts,
            "Remote classifier ready"
        );

        Ok(Self {
            settings,
            client,
            system_prompt: system_prompt(),
        })
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// One request/response round trip, no retry.
    fn request_once(&self, record: &KeywordRecord) -> Result<Theme, RemoteError> {
        let user = user_prompt(record);
        let messages = [
            ChatMessage {
                role: "system",
                content: &self.system_prompt,
            },
            ChatMessage {
                role: "user",
                content: &user,
            },
        ];

        let request = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key);
        let request = match self.settings.flavor {
            ApiFlavor::OpenAi => request.json(&ChatRequest {
                model: &self.settings.model,
                messages,
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
            }),
            ApiFlavor::DashScope => request.json(&DashScopeRequest {
                model: &self.settings.model,
                input: DashScopeInput { messages },
                parameters: DashScopeParameters {
                    max_tokens: self.settings.max_tokens,
                    temperature: self.settings.temperature,
                },
            }),
        };

        let response = request.send().map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let body = response.text().map_err(|e| self.map_transport(e))?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: preview_body(&body),
            });
        }

        let reply = self.extract_reply(&body)?;
        parse_label(&reply)
    }

    /// Pull the reply text out of a 2xx body.
    fn extract_reply(&self, body: &str) -> Result<String, RemoteError> {
        let malformed = |e: serde_json::Error| {
            RemoteError::Malformed(format!("{e}; body: {}", preview_body(body)))
        };
        let reply = match self.settings.flavor {
            ApiFlavor::OpenAi => {
                let parsed: ChatResponse = serde_json::from_str(body).map_err(malformed)?;
                first_content(parsed.choices)
            }
            ApiFlavor::DashScope => {
                let parsed: DashScopeResponse = serde_json::from_str(body).map_err(malformed)?;
                parsed
                    .output
                    .and_then(|o| o.text.or_else(|| first_content(o.choices)))
                    .or_else(|| first_content(parsed.choices))
            }
        };
        reply.ok_or_else(|| RemoteError::Malformed("response carries no reply text".to_string()))
    }

    fn map_transport(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                secs: self.settings.timeout_secs,
            }
        } else if e.is_connect() {
            RemoteError::Unreachable {
                endpoint: endpoint_preview(&self.settings.endpoint),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            RemoteError::Malformed(e.to_string())
        } else {
            RemoteError::Http(e.to_string())
        }
    }

    /// Delay before retry number `retry` (0-based), doubling each time.
    fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.min(16);
        let ms = self
            .settings
            .retry_delay_ms
            .saturating_mul(factor)
            .min(constants::MAX_RETRY_DELAY_MS);
        Duration::from_millis(ms)
    }
}

impl Classifier for RemoteClassifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn classify(&self, record: &KeywordRecord) -> Result<Theme, RemoteError> {
        let mut retry = 0;
        loop {
            match self.request_once(record) {
                Ok(theme) => return Ok(theme),
                Err(e) if e.is_transient() && retry < self.settings.retry_attempts => {
                    let delay = self.retry_delay(retry);
                    tracing::debug!(
                        keyword = %record.text,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient remote failure; retrying"
                    );
                    std::thread::sleep(delay);
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_loopback(url: &reqwest::Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// Cap a response body for error messages.
fn preview_body(body: &str) -> String {
    if body.len() <= constants::MAX_ERROR_BODY_PREVIEW {
        return body.to_string();
    }
    let mut end = constants::MAX_ERROR_BODY_PREVIEW;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Serve one canned HTTP response per entry, in order, then stop.
    /// Returns the base URL and a handle yielding the raw requests seen.
    fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                seen.push(read_request(&mut stream));
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
            seen
        });
        (format!("http://{addr}/v1/chat/completions"), handle)
    }

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn settings(endpoint: &str, flavor: ApiFlavor) -> RemoteSettings {
        RemoteSettings {
            endpoint: endpoint.to_string(),
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
            flavor,
            max_tokens: 50,
            temperature: 0.3,
            timeout_secs: 5,
            retry_attempts: 0,
            retry_delay_ms: 10,
        }
    }

    fn chat_body(content: &str) -> String {
        serde_json::json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
            .to_string()
    }

    fn record() -> KeywordRecord {
        KeywordRecord::new("best CRM tool", Some(200.0), "test.csv").unwrap()
    }

    #[test]
    fn test_parse_label_variants() {
        assert_eq!(parse_label("tool/software").unwrap(), Theme::ToolSoftware);
        assert_eq!(parse_label("  \"Tool/Software\"  ").unwrap(), Theme::ToolSoftware);
        assert_eq!(parse_label("'pricing'.").unwrap(), Theme::Pricing);
        assert_eq!(parse_label("Theme: case-study").unwrap(), Theme::CaseStudy);
        assert_eq!(
            parse_label(r#"{"theme": "template/resource"}"#).unwrap(),
            Theme::TemplateResource
        );
        assert_eq!(
            parse_label("```json\n{\"label\": \"trend\"}\n```").unwrap(),
            Theme::Trend
        );
    }

    #[test]
    fn test_parse_label_failures() {
        assert!(matches!(parse_label("   "), Err(RemoteError::Malformed(_))));
        assert!(matches!(parse_label("{\"x\": 1}"), Err(RemoteError::Malformed(_))));
        assert!(matches!(
            parse_label("sports"),
            Err(RemoteError::UnknownLabel(l)) if l == "sports"
        ));
    }

    #[test]
    fn test_prompts_carry_enumeration_and_volume() {
        let system = system_prompt();
        for theme in Theme::ALL {
            assert!(system.contains(theme.label()));
        }
        assert!(user_prompt(&record()).contains("200"));
        let no_volume = KeywordRecord::new("crm", None, "t").unwrap();
        assert_eq!(user_prompt(&no_volume), "Keyword: crm");
    }

    #[test]
    fn test_flavor_parse() {
        assert_eq!(ApiFlavor::parse("OpenAI"), Some(ApiFlavor::OpenAi));
        assert_eq!(ApiFlavor::parse("tongyi"), Some(ApiFlavor::DashScope));
        assert_eq!(ApiFlavor::parse("bedrock"), None);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let s = settings("http://127.0.0.1:9/x", ApiFlavor::OpenAi);
        let shown = format!("{s:?}");
        assert!(!shown.contains("sk-test"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_invalid_endpoint_fails_construction() {
        let result = RemoteClassifier::new(settings("not a url", ApiFlavor::OpenAi));
        assert!(matches!(result, Err(RemoteError::ClientBuild(_))));
    }

    #[test]
    fn test_openai_flavor_round_trip() {
        let (url, server) = serve(vec![(200, chat_body("\"tool/software\""))]);
        let remote = RemoteClassifier::new(settings(&url, ApiFlavor::OpenAi)).unwrap();
        assert_eq!(remote.classify(&record()).unwrap(), Theme::ToolSoftware);

        let requests = server.join().unwrap();
        let req = &requests[0];
        assert!(req.starts_with("POST /v1/chat/completions"));
        assert!(req.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(req.contains("\"model\":\"test-model\""));
        assert!(req.contains("\"max_tokens\":50"));
        assert!(req.contains("best CRM tool"));
    }

    #[test]
    fn test_dashscope_flavor_reads_output_text() {
        let body = serde_json::json!({"output": {"text": "pricing"}}).to_string();
        let (url, server) = serve(vec![(200, body)]);
        let remote = RemoteClassifier::new(settings(&url, ApiFlavor::DashScope)).unwrap();
        assert_eq!(remote.classify(&record()).unwrap(), Theme::Pricing);

        let req = &server.join().unwrap()[0];
        assert!(req.contains("\"input\":{\"messages\""));
        assert!(req.contains("\"parameters\":{"));
    }

    #[test]
    fn test_dashscope_falls_back_to_choices() {
        let (url, server) = serve(vec![(200, chat_body("trend"))]);
        let remote = RemoteClassifier::new(settings(&url, ApiFlavor::DashScope)).unwrap();
        assert_eq!(remote.classify(&record()).unwrap(), Theme::Trend);
        server.join().unwrap();
    }

    #[test]
    fn test_non_2xx_is_status_error() {
        let (url, server) = serve(vec![(401, "{\"error\":\"bad key\"}".to_string())]);
        let remote = RemoteClassifier::new(settings(&url, ApiFlavor::OpenAi)).unwrap();
        match remote.classify(&record()) {
            Err(RemoteError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_malformed_and_unknown_bodies() {
        let (url, server) = serve(vec![
            (200, "not json".to_string()),
            (200, "{\"choices\": []}".to_string()),
            (200, chat_body("sports")),
        ]);
        let remote = RemoteClassifier::new(settings(&url, ApiFlavor::OpenAi)).unwrap();
        assert!(matches!(remote.classify(&record()), Err(RemoteError::Malformed(_))));
        assert!(matches!(remote.classify(&record()), Err(RemoteError::Malformed(_))));
        assert!(matches!(remote.classify(&record()), Err(RemoteError::UnknownLabel(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let (url, server) = serve(vec![
            (503, "busy".to_string()),
            (200, chat_body("comparison/review")),
        ]);
        let mut s = settings(&url, ApiFlavor::OpenAi);
        s.retry_attempts = 1;
        let remote = RemoteClassifier::new(s).unwrap();
        assert_eq!(remote.classify(&record()).unwrap(), Theme::ComparisonReview);
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_unreachable_endpoint() {
        // Bind then drop to obtain a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{port}/v1/chat/completions");
        let remote = RemoteClassifier::new(settings(&url, ApiFlavor::OpenAi)).unwrap();
        assert!(matches!(
            remote.classify(&record()),
            Err(RemoteError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_slow_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let _ = read_request(&mut stream);
            std::thread::sleep(Duration::from_millis(2_500));
        });

        let mut s = settings(&format!("http://{addr}/x"), ApiFlavor::OpenAi);
        s.timeout_secs = 1;
        let remote = RemoteClassifier::new(s).unwrap();
        assert!(matches!(
            remote.classify(&record()),
            Err(RemoteError::Timeout { secs: 1 })
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let mut s = settings("http://127.0.0.1:9/x", ApiFlavor::OpenAi);
        s.retry_delay_ms = 1_000;
        let remote = RemoteClassifier::new(s).unwrap();
        assert_eq!(remote.retry_delay(0), Duration::from_millis(1_000));
        assert_eq!(remote.retry_delay(2), Duration::from_millis(4_000));
        assert_eq!(
            remote.retry_delay(10),
            Duration::from_millis(constants::MAX_RETRY_DELAY_MS)
        );
    }

    #[test]
    fn test_preview_body_caps_length() {
        let long = "é".repeat(constants::MAX_ERROR_BODY_PREVIEW);
        let preview = preview_body(&long);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= constants::MAX_ERROR_BODY_PREVIEW + 3);
    }
}
