//! HTTP TTS Client - 调用外部 TTS HTTP 服务
//!
//! 实现 TtsEnginePort trait，通过 HTTP 调用外部 TTS 服务
//!
//! 外部 TTS API:
//! POST {base_url}/api/tts/infer
//!   Request: {"text": "...", "voice": "af_sarah", "speed": 1.0}  (JSON)
//!   Response: audio/wav binary, metadata in headers
//!
//! POST {base_url}/api/tts/stream?voice=af_sarah&speed=1.0
//!   Request: 分块上传的文本分词（text/plain）
//!   Response: NDJSON，每行一条消息
//!     {"sample_rate": 24000}
//!     {"text": "...", "audio": "<base64 PCM16 LE>"}
//!     {"end": true}
//!     {"error": "..."}

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::stream::{self, StreamExt};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use crate::application::ports::{
    AudioPayload, ChunkStream, StreamChunk, StreamRequest, SynthesisRequest, SynthesizedAudio,
    TtsEnginePort, TtsError,
};
use crate::domain::EngineKind;

/// TTS 推理请求体 (JSON)
#[derive(Debug, Serialize)]
struct TtsHttpRequest<'a> {
    text: &'a str,
    voice: &'a str,
    speed: f64,
}

/// 流式响应中的单行消息
#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    end: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP TTS 客户端配置
#[derive(Debug, Clone)]
pub struct HttpTtsClientConfig {
    /// TTS 服务基础 URL
    pub base_url: String,
    /// 整段合成请求超时，以及流式请求等待响应头的超时（秒）
    pub timeout_secs: u64,
    /// 重试次数（仅整段合成）
    pub max_retries: u32,
    /// 流式响应未声明采样率时使用的默认值
    pub default_sample_rate: u32,
    /// 流式响应两行之间的最长等待（秒）
    pub stream_idle_secs: u64,
}

impl Default for HttpTtsClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            max_retries: 0,
            default_sample_rate: 24_000,
            stream_idle_secs: 30,
        }
    }
}

impl HttpTtsClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_stream_idle_timeout(mut self, secs: u64) -> Self {
        self.stream_idle_secs = secs;
        self
    }
}

/// HTTP TTS 客户端
///
/// 通过 HTTP 调用外部 TTS 服务
pub struct HttpTtsClient {
    client: Client,
    config: HttpTtsClientConfig,
}

impl HttpTtsClient {
    /// 创建新的 HTTP TTS 客户端
    pub fn new(config: HttpTtsClientConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(30)))
            .build()
            .map_err(|e| TtsError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// 获取推理 URL
    fn infer_url(&self) -> String {
        format!("{}/api/tts/infer", self.config.base_url)
    }

    /// 获取流式推理 URL
    fn stream_url(&self) -> String {
        format!("{}/api/tts/stream", self.config.base_url)
    }

    /// 获取健康检查 URL
    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }

    fn map_send_error(e: reqwest::Error) -> TtsError {
        if e.is_timeout() {
            TtsError::Timeout
        } else if e.is_connect() {
            TtsError::NetworkError(format!("Cannot connect to TTS service: {}", e))
        } else {
            TtsError::NetworkError(e.to_string())
        }
    }

    async fn infer_once(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, TtsError> {
        let http_request = TtsHttpRequest {
            text: &request.text,
            voice: request.voice.as_str(),
            speed: request.speed.value(),
        };

        let response = self
            .client
            .post(self.infer_url())
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&http_request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND && error_text.contains("voice") {
                return Err(TtsError::VoiceNotFound(request.voice.to_string()));
            }
            return Err(TtsError::ServiceError(format!("HTTP {}: {}", status, error_text)));
        }

        // 从 headers 提取元数据
        let duration_ms = response
            .headers()
            .get("X-TTS-Duration-Ms")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| TtsError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();

        tracing::info!(
            duration_ms = ?duration_ms,
            audio_size = audio_data.len(),
            "TTS inference completed"
        );

        Ok(SynthesizedAudio {
            audio: AudioPayload::Wav(audio_data),
            duration_ms,
        })
    }
}

/// 解析一行流式消息
///
/// 返回 `Ok(None)` 表示该行不产生输出块（采样率声明或空行）
fn parse_stream_line(
    line: &str,
    sample_rate: &mut u32,
) -> Result<Option<StreamChunk>, TtsError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let message: StreamMessage = serde_json::from_str(line)
        .map_err(|e| TtsError::InvalidResponse(format!("Malformed stream message: {}", e)))?;

    if let Some(error) = message.error {
        return Err(TtsError::ServiceError(error));
    }
    if let Some(rate) = message.sample_rate {
        *sample_rate = rate;
    }
    if let Some(audio) = message.audio {
        let data = base64::engine::general_purpose::STANDARD
            .decode(audio.as_bytes())
            .map_err(|e| TtsError::InvalidResponse(format!("Invalid base64 audio: {}", e)))?;
        return Ok(Some(StreamChunk {
            text: message.text.unwrap_or_default(),
            audio: AudioPayload::Pcm16 {
                data,
                sample_rate: *sample_rate,
            },
        }));
    }
    Ok(None)
}

fn is_end_line(line: &str) -> bool {
    serde_json::from_str::<StreamMessage>(line.trim())
        .map(|m| m.end.unwrap_or(false))
        .unwrap_or(false)
}

#[async_trait]
impl TtsEnginePort for HttpTtsClient {
    fn kind(&self) -> EngineKind {
        EngineKind::Remote
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, TtsError> {
        tracing::debug!(
            url = %self.infer_url(),
            text_len = request.text.len(),
            voice = %request.voice,
            speed = request.speed.value(),
            "Sending TTS infer request"
        );

        let mut attempt = 0;
        loop {
            match self.infer_once(&request).await {
                Ok(audio) => return Ok(audio),
                Err(e @ (TtsError::NetworkError(_) | TtsError::Timeout))
                    if attempt < self.config.max_retries =>
                {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "TTS infer failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn synthesize_stream(&self, request: StreamRequest) -> Result<ChunkStream, TtsError> {
        let StreamRequest { voice, speed, input } = request;

        tracing::debug!(
            url = %self.stream_url(),
            voice = %voice,
            speed = speed.value(),
            "Opening TTS stream"
        );

        // 输入分词作为分块请求体上传
        let body_stream = stream::unfold(input, |mut rx| async move {
            rx.recv().await.map(|token| (Ok::<_, std::io::Error>(token), rx))
        });

        // 请求体是流，不能用 reqwest 的整体超时，只限制等待响应头的时间
        let send = self
            .client
            .post(self.stream_url())
            .query(&[("voice", voice.as_str().to_string()), ("speed", speed.to_string())])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::wrap_stream(body_stream))
            .send();
        let response = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), send)
            .await
            .map_err(|_| TtsError::Timeout)?
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TtsError::ServiceError(format!("HTTP {}: {}", status, error_text)));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)))
            .boxed();
        let lines = StreamReader::new(bytes).lines();

        let idle = Duration::from_secs(self.config.stream_idle_secs.max(1));
        let state = (lines, self.config.default_sample_rate, false);
        let chunks = stream::unfold(state, move |(mut lines, mut sample_rate, done)| async move {
            if done {
                return None;
            }
            loop {
                let Ok(next) = tokio::time::timeout(idle, lines.next_line()).await else {
                    tracing::warn!(idle_secs = idle.as_secs(), "TTS stream stalled");
                    return Some((Err(TtsError::Timeout), (lines, sample_rate, true)));
                };
                match next {
                    Ok(Some(line)) => {
                        if is_end_line(&line) {
                            return None;
                        }
                        match parse_stream_line(&line, &mut sample_rate) {
                            Ok(Some(chunk)) => return Some((Ok(chunk), (lines, sample_rate, false))),
                            Ok(None) => continue,
                            Err(e) => return Some((Err(e), (lines, sample_rate, true))),
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        return Some((
                            Err(TtsError::NetworkError(format!("Stream read error: {}", e))),
                            (lines, sample_rate, true),
                        ))
                    }
                }
            }
        });

        Ok(chunks.boxed())
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::tts::local_tts_server;

    #[test]
    fn test_config_default() {
        let config = HttpTtsClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.default_sample_rate, 24_000);
        assert_eq!(config.stream_idle_secs, 30);
    }

    #[test]
    fn test_config_builder() {
        let config = HttpTtsClientConfig::new("http://example.com:9000")
            .with_timeout(60)
            .with_retries(2);
        assert_eq!(config.base_url, "http://example.com:9000");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_parse_sample_rate_then_audio() {
        let mut sample_rate = 24_000;
        assert!(parse_stream_line(r#"{"sample_rate": 22050}"#, &mut sample_rate)
            .unwrap()
            .is_none());
        assert_eq!(sample_rate, 22_050);

        let audio = base64::engine::general_purpose::STANDARD.encode([0u8, 0, 255, 127]);
        let line = format!(r#"{{"text": "Hello", "audio": "{}"}}"#, audio);
        let chunk = parse_stream_line(&line, &mut sample_rate).unwrap().unwrap();
        assert_eq!(chunk.text, "Hello");
        assert_eq!(
            chunk.audio,
            AudioPayload::Pcm16 {
                data: vec![0, 0, 255, 127],
                sample_rate: 22_050
            }
        );
    }

    #[test]
    fn test_parse_error_and_end_lines() {
        let mut sample_rate = 24_000;
        let err = parse_stream_line(r#"{"error": "model crashed"}"#, &mut sample_rate);
        assert!(matches!(err, Err(TtsError::ServiceError(msg)) if msg == "model crashed"));

        assert!(is_end_line(r#"{"end": true}"#));
        assert!(!is_end_line(r#"{"sample_rate": 1}"#));
        assert!(parse_stream_line("   ", &mut sample_rate).unwrap().is_none());
        assert!(parse_stream_line("not json", &mut sample_rate).is_err());
    }

    async fn open_stream(
        client: &HttpTtsClient,
        tokens: &[&str],
    ) -> Result<ChunkStream, TtsError> {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        for token in tokens {
            tx.send(token.to_string()).await.unwrap();
        }
        drop(tx);
        client
            .synthesize_stream(StreamRequest {
                voice: crate::domain::Voice::default(),
                speed: crate::domain::Speed::NORMAL,
                input: rx,
            })
            .await
    }

    #[tokio::test]
    async fn test_stream_against_server_that_reads_full_body() {
        let (base_url, server) = local_tts_server::spawn().await;
        let client = HttpTtsClient::new(HttpTtsClientConfig::new(base_url).with_timeout(5)).unwrap();

        let chunks: Vec<_> = open_stream(&client, &["Hello ", "there."])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        let chunk = chunks.into_iter().next().unwrap().unwrap();
        assert_eq!(chunk.text, "Hello there.");
        match chunk.audio {
            AudioPayload::Pcm16 { data, sample_rate } => {
                assert_eq!(sample_rate, local_tts_server::SAMPLE_RATE);
                assert_eq!(data.len(), 12 * local_tts_server::FRAMES_PER_CHAR * 2);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let (base_url, server) = local_tts_server::spawn().await;
        let client = HttpTtsClient::new(
            HttpTtsClientConfig::new(format!("{}/stall", base_url))
                .with_timeout(5)
                .with_stream_idle_timeout(1),
        )
        .unwrap();

        let mut chunks = open_stream(&client, &["Never answered."]).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), chunks.next())
            .await
            .expect("idle timeout should end the stream");
        assert!(matches!(first, Some(Err(TtsError::Timeout))));
        assert!(chunks.next().await.is_none());
        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_service_reports_network_error() {
        let client = HttpTtsClient::new(HttpTtsClientConfig::new("http://127.0.0.1:9").with_timeout(2))
            .unwrap();
        assert!(!client.health_check().await);
    }
}
