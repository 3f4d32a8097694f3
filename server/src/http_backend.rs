//! Synthesis backend that forwards requests to a remote HTTP service.
//!
//! The service receives `POST { "text", "profiles" }` and answers with the
//! compressed audio as the response body.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use tts_core::{
    display_text, BackendFactory, SynthesisBackend, SynthesisCallback, TtsError, TtsResult,
};

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    profiles: &'a Value,
}

pub struct HttpSynthesisBackend {
    client: reqwest::Client,
    url: String,
    runtime: Handle,
    profiles: Mutex<Value>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl HttpSynthesisBackend {
    pub fn new(client: reqwest::Client, url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            client,
            url: url.into(),
            runtime,
            profiles: Mutex::new(Value::Array(Vec::new())),
            in_flight: Mutex::new(None),
        }
    }

    fn abort_in_flight(&self) {
        if let Some(task) = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

impl SynthesisBackend for HttpSynthesisBackend {
    fn configure(&self, profiles_json: &str) -> TtsResult<()> {
        let profiles: Value = serde_json::from_str(profiles_json)?;
        if !profiles.is_array() {
            return Err(TtsError::Settings("voice profiles must be a JSON array".into()));
        }
        *self.profiles.lock().unwrap_or_else(PoisonError::into_inner) = profiles;
        Ok(())
    }

    fn synthesize(&self, text: &str, on_result: SynthesisCallback) -> TtsResult<()> {
        let request = {
            let profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
            self.client
                .post(&self.url)
                .json(&SynthesisBody {
                    text,
                    profiles: &profiles,
                })
                .build()
                .map_err(|e| TtsError::Backend(e.to_string()))?
        };

        let client = self.client.clone();
        let short = display_text(text);
        let task = self.runtime.spawn(async move {
            let audio = match client
                .execute(request)
                .await
                .and_then(|response| response.error_for_status())
            {
                Ok(response) => match response.bytes().await {
                    Ok(body) => Some(body.to_vec()),
                    Err(e) => {
                        warn!(error = %e, text = %short, "Failed to read synthesis response");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, text = %short, "Synthesis request failed");
                    None
                }
            };
            debug!(bytes = audio.as_ref().map_or(0, Vec::len), text = %short, "Synthesis response");
            on_result(audio);
        });

        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = Some(task.abort_handle());
        Ok(())
    }

    fn cancel(&self) {
        self.abort_in_flight();
    }

    fn release(&self) {
        self.abort_in_flight();
    }
}

/// Creates [`HttpSynthesisBackend`]s on the runtime that asks for them.
#[derive(Clone)]
pub struct HttpBackendFactory {
    client: reqwest::Client,
    url: String,
}

impl HttpBackendFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl BackendFactory for HttpBackendFactory {
    fn create(&self) -> TtsResult<Arc<dyn SynthesisBackend>> {
        let runtime = Handle::try_current().map_err(|e| TtsError::Backend(e.to_string()))?;
        Ok(Arc::new(HttpSynthesisBackend::new(
            self.client.clone(),
            self.url.clone(),
            runtime,
        )))
    }
}
