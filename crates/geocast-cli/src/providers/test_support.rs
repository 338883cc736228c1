use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) struct MockResponse {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    body: String,
}

impl MockResponse {
    pub(crate) fn json(status: u16, reason: &'static str, body: &str) -> Self {
        Self {
            status,
            reason,
            content_type: "application/geo+json",
            body: body.to_string(),
        }
    }

    pub(crate) fn text(status: u16, reason: &'static str, body: &str) -> Self {
        Self {
            status,
            reason,
            content_type: "text/html",
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Single-threaded HTTP/1.1 server that answers one scripted response per
/// connection, in order, and records what it was asked.
pub(crate) struct MockServer {
    pub base_url: String,
    handle: thread::JoinHandle<Vec<RecordedRequest>>,
}

impl MockServer {
    pub(crate) fn spawn(responses: Vec<MockResponse>) -> Self {
        Self::spawn_with(|_| responses)
    }

    /// Builds the script once the base URL is known, for payloads that link
    /// back to the server.
    pub(crate) fn spawn_with<F>(script: F) -> Self
    where
        F: FnOnce(&str) -> Vec<MockResponse>,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.set_nonblocking(true).expect("nonblocking");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        let responses = script(&base_url);

        let handle = thread::spawn(move || {
            let mut recorded = Vec::new();

            for response in responses {
                let start = Instant::now();
                let mut stream = loop {
                    match listener.accept() {
                        Ok((stream, _)) => break stream,
                        Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                            if start.elapsed() > Duration::from_secs(3) {
                                panic!("mock server timed out waiting for request");
                            }
                            thread::sleep(Duration::from_millis(10));
                        }
                        Err(error) => panic!("mock server accept failed: {error}"),
                    }
                };
                stream.set_nonblocking(false).expect("blocking stream");

                let cloned = stream.try_clone().expect("clone stream");
                let mut reader = BufReader::new(cloned);
                let mut request_lines = Vec::new();

                loop {
                    let mut line = String::new();
                    let bytes = reader.read_line(&mut line).expect("read line");
                    if bytes == 0 || line == "\r\n" {
                        break;
                    }
                    request_lines.push(line.trim_end_matches(['\r', '\n']).to_string());
                }

                let path = request_lines
                    .first()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or_default()
                    .to_string();
                let headers = request_lines
                    .iter()
                    .skip(1)
                    .filter_map(|line| line.split_once(':'))
                    .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                    .collect();
                recorded.push(RecordedRequest { path, headers });

                let response_head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    response.status,
                    response.reason,
                    response.content_type,
                    response.body.len()
                );

                stream
                    .write_all(response_head.as_bytes())
                    .and_then(|_| stream.write_all(response.body.as_bytes()))
                    .expect("write response");
            }

            recorded
        });

        Self { base_url, handle }
    }

    pub(crate) fn join(self) -> Vec<RecordedRequest> {
        self.handle.join().expect("mock server thread")
    }
}
