//! Integration tests for the OpenAI client.
//! The local-server tests always run; the live test needs OPENAI_API_KEY.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use termgpt::{ChatRequest, CompletionClient, Message, OpenAi, ResponseMode};

    /// Serves exactly one HTTP response and returns the raw request it saw.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(request).unwrap()
        });
        (base_url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut response = format!("HTTP/1.1 {status}\r\n");
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str(&format!(
            "content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ));
        response
    }

    fn client(base_url: String) -> OpenAi {
        OpenAi::with_options(
            Some("sk-local".to_string()),
            Some(base_url),
            Some(Duration::from_secs(10)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn blocking_completion_against_local_server() {
        let body = r#"{"id":"c1","model":"gpt-4","choices":[{"index":0,"message":{"role":"assistant","content":"Hi there"},"finish_reason":"stop"}]}"#;
        let (base_url, server) = serve_once(http_response(
            "200 OK",
            &[("content-type", "application/json")],
            body,
        ))
        .await;

        let messages = vec![Message::system("Be brief."), Message::user("Hello")];
        let request = ChatRequest::new("gpt-4", &messages);
        let text = client(base_url).complete(&request).await.unwrap();
        assert_eq!(text, "Hi there");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions HTTP/1.1"));
        assert!(raw.to_lowercase().contains("authorization: bearer sk-local"));
        assert!(raw.contains(r#""stream":false"#));
        assert!(raw.contains(r#"{"role":"system","content":"Be brief."}"#));
    }

    #[tokio::test]
    async fn streaming_completion_against_local_server() {
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (base_url, server) = serve_once(http_response(
            "200 OK",
            &[("content-type", "text/event-stream")],
            body,
        ))
        .await;

        let messages = vec![Message::user("Say hello")];
        let request = ChatRequest::new("gpt-4", &messages);
        let fragments: Vec<String> = client(base_url)
            .stream(&request)
            .await
            .unwrap()
            .map(|fragment| fragment.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);

        let raw = server.await.unwrap();
        assert!(raw.contains(r#""stream":true"#));
    }

    #[tokio::test]
    async fn rate_limit_status_is_reported() {
        let body = r#"{"error":{"message":"Rate limit reached for gpt-4","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#;
        let (base_url, server) = serve_once(http_response(
            "429 Too Many Requests",
            &[("content-type", "application/json"), ("retry-after", "20")],
            body,
        ))
        .await;

        let messages = vec![Message::user("Hello")];
        let request = ChatRequest::new("gpt-4", &messages);
        let err = client(base_url)
            .send(&request, ResponseMode::Streaming)
            .await
            .unwrap_err();
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("Rate limit reached"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_status_is_reported() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let (base_url, server) = serve_once(http_response(
            "401 Unauthorized",
            &[("content-type", "application/json")],
            body,
        ))
        .await;

        let messages = vec![Message::user("Hello")];
        let request = ChatRequest::new("gpt-4", &messages);
        let err = client(base_url).complete(&request).await.unwrap_err();
        assert!(err.is_authentication());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connection_refused_is_a_connection_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let messages = vec![Message::user("Hello")];
        let request = ChatRequest::new("gpt-4", &messages);
        let err = client(format!("http://{addr}/v1"))
            .complete(&request)
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn live_streaming_request() {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if api_key.is_none() {
            eprintln!("Skipping test: OPENAI_API_KEY not set");
            return;
        }

        let client = OpenAi::new(api_key).expect("Failed to create client");
        let messages = vec![Message::user("Say 'test passed'")];
        let request = ChatRequest::new("gpt-4", &messages);
        let reply = client.send(&request, ResponseMode::Streaming).await;
        assert!(reply.is_ok(), "Stream request should succeed");
    }
}
