//! Firmware image download adapter.
//!
//! Implements [`ImageSource`](crate::app::ports::ImageSource).
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::http::client::EspHttpConnection`.
//!   One plain-HTTP GET per update, `Connection: close`. Body reads stop
//!   at the declared `Content-Length`.
//! - **all other targets**: a simulator serving queued responses through a
//!   [`SimImageServer`] handle, used by host tests.

use std::time::Duration;

/// Request and read timeout for one image download.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// URL of the image at `host`. The port is only spelled out when it is
/// not the HTTP default.
pub fn image_url(host: &str, port: u16, path: &str) -> String {
    if port == 80 {
        format!("http://{host}{path}")
    } else {
        format!("http://{host}:{port}{path}")
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use embedded_svc::http::Method;
    use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
    use log::{debug, warn};

    use super::{HTTP_TIMEOUT, image_url};
    use crate::app::ports::{ImageSource, ResponseHead};
    use crate::ota::OtaError;

    pub struct HttpImageSource {
        conn: Option<EspHttpConnection>,
        /// Body bytes still expected, when the length is known.
        remaining: Option<u32>,
    }

    impl Default for HttpImageSource {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HttpImageSource {
        pub fn new() -> Self {
            Self {
                conn: None,
                remaining: None,
            }
        }
    }

    impl ImageSource for HttpImageSource {
        fn open(&mut self, host: &str, port: u16, path: &str) -> Result<ResponseHead, OtaError> {
            self.close();
            let url = image_url(host, port, path);

            let conf = HttpClientConfiguration {
                timeout: Some(HTTP_TIMEOUT),
                ..Default::default()
            };
            let mut conn = EspHttpConnection::new(&conf).map_err(|e| {
                warn!("FOTA: HTTP client create failed: {:?}", e);
                OtaError::Transport
            })?;
            conn.initiate_request(Method::Get, &url, &[("Connection", "close")])
                .map_err(|e| {
                    warn!("FOTA: GET {} failed: {:?}", url, e);
                    OtaError::Transport
                })?;
            conn.initiate_response().map_err(|e| {
                warn!("FOTA: no response from {}: {:?}", url, e);
                OtaError::Transport
            })?;

            let status = conn.status();
            let content_length = match conn
                .header("content-length")
                .or_else(|| conn.header("Content-Length"))
            {
                Some(value) => Some(
                    value
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| OtaError::MalformedResponse)?,
                ),
                None => None,
            };
            debug!("FOTA: {} answered {} ({:?} bytes)", url, status, content_length);

            self.remaining = content_length;
            self.conn = Some(conn);
            Ok(ResponseHead {
                status,
                content_length,
            })
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, OtaError> {
            let limit = match self.remaining {
                Some(0) => return Ok(0),
                Some(rem) => buf.len().min(rem as usize),
                None => buf.len(),
            };
            let conn = self.conn.as_mut().ok_or(OtaError::Transport)?;
            let n = conn.read(&mut buf[..limit]).map_err(|e| {
                warn!("FOTA: body read failed: {:?}", e);
                OtaError::Transport
            })?;
            if let Some(rem) = self.remaining.as_mut() {
                *rem -= n as u32;
            }
            Ok(n)
        }

        fn close(&mut self) {
            self.conn = None;
            self.remaining = None;
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::HttpImageSource;

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim::{HttpImageSource, SimImageServer, SimResponse};

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use super::image_url;
    use crate::app::ports::{ImageSource, ResponseHead};
    use crate::ota::OtaError;

    /// One canned answer of the simulated server.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SimResponse {
        pub status: u16,
        pub content_length: Option<u32>,
        pub body: Vec<u8>,
        /// Fail the body read once this many bytes were handed out.
        pub fail_after: Option<usize>,
    }

    impl SimResponse {
        /// `200 OK` with an exact `Content-Length`.
        pub fn ok(image: &[u8]) -> Self {
            Self {
                status: 200,
                content_length: Some(image.len() as u32),
                body: image.to_vec(),
                fail_after: None,
            }
        }

        pub fn status(status: u16) -> Self {
            Self {
                status,
                content_length: Some(0),
                body: Vec::new(),
                fail_after: None,
            }
        }
    }

    #[derive(Debug, Default)]
    struct SimState {
        responses: VecDeque<SimResponse>,
        requests: Vec<String>,
    }

    /// Test-side handle on the simulated image server. An empty response
    /// queue behaves like an unreachable host.
    #[derive(Debug, Clone, Default)]
    pub struct SimImageServer(Arc<Mutex<SimState>>);

    impl SimImageServer {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, SimState> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn serve(&self, image: &[u8]) {
            self.serve_response(SimResponse::ok(image));
        }

        pub fn serve_response(&self, response: SimResponse) {
            self.state().responses.push_back(response);
        }

        /// URLs requested so far, oldest first.
        pub fn requests(&self) -> Vec<String> {
            self.state().requests.clone()
        }
    }

    struct Download {
        body: Vec<u8>,
        pos: usize,
        fail_after: Option<usize>,
    }

    pub struct HttpImageSource {
        server: SimImageServer,
        download: Option<Download>,
        remaining: Option<u32>,
    }

    impl HttpImageSource {
        pub fn simulated(server: SimImageServer) -> Self {
            Self {
                server,
                download: None,
                remaining: None,
            }
        }
    }

    impl ImageSource for HttpImageSource {
        fn open(&mut self, host: &str, port: u16, path: &str) -> Result<ResponseHead, OtaError> {
            self.close();
            let response = self
                .server
                .state()
                .responses
                .pop_front()
                .ok_or(OtaError::Transport)?;
            self.server.state().requests.push(image_url(host, port, path));

            self.remaining = response.content_length;
            self.download = Some(Download {
                body: response.body,
                pos: 0,
                fail_after: response.fail_after,
            });
            Ok(ResponseHead {
                status: response.status,
                content_length: response.content_length,
            })
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, OtaError> {
            let limit = match self.remaining {
                Some(0) => return Ok(0),
                Some(rem) => buf.len().min(rem as usize),
                None => buf.len(),
            };
            let download = self.download.as_mut().ok_or(OtaError::Transport)?;
            if download.fail_after.is_some_and(|at| download.pos >= at) {
                return Err(OtaError::Transport);
            }
            let mut end = (download.pos + limit).min(download.body.len());
            if let Some(at) = download.fail_after {
                end = end.min(at.max(download.pos));
            }
            let n = end - download.pos;
            buf[..n].copy_from_slice(&download.body[download.pos..end]);
            download.pos = end;
            if let Some(rem) = self.remaining.as_mut() {
                *rem -= n as u32;
            }
            Ok(n)
        }

        fn close(&mut self) {
            self.download = None;
            self.remaining = None;
        }
    }
}
