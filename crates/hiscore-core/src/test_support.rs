
#[cfg(test)]
pub use recording::RecordingTransport;

#[cfg(test)]
mod recording {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::transport::{SignedRequest, Transport, TransportError, TransportResponse};

    type Scripted = Result<TransportResponse, TransportError>;

    /// Captures signed requests and replays scripted responses (204 once exhausted).
    #[derive(Default)]
    pub struct RecordingTransport {
        responses: Mutex<VecDeque<Scripted>>,
        sent: Mutex<Vec<SignedRequest>>,
    }

    impl RecordingTransport {
        pub fn with_responses(responses: Vec<Scripted>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<SignedRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: SignedRequest) -> Result<TransportResponse, TransportError> {
            self.sent.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(TransportResponse {
                        status: 204,
                        headers: Vec::new(),
                        body: String::new(),
                    })
                })
        }
    }
}
