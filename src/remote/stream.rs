//! Streaming client for the inference server.
//!
//! One call to [`RemoteAudio::stream`] is one request/reply cycle:
//!
//! 1. `GET {base}/` with a multipart body (`file` = image, `text` = prompt).
//! 2. While the response headers are outstanding, a helper thread replays
//!    the "waiting" clip after an initial delay.
//! 3. The body is raw little-endian `i16` mono PCM.  It is read in small
//!    fixed windows, decoded and written to the speaker as it arrives.
//!
//! The request itself runs on its own thread so a cancel while the headers
//! are outstanding returns at once; the abandoned thread ends when the
//! server hangs up or the read timeout expires.
//!
//! The cancel flag is checked once per window; on cancel the loop stops,
//! the output device is closed and the response is dropped.  Telling the
//! server to stop is the task runner's job (see [`RemoteAudio::cancel_url`]).
//! A network failure plays the "no internet" clip exactly once.

use std::io::Read;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use reqwest::blocking::multipart::{Form, Part};

use crate::audio::output::AudioOutput;
use crate::audio::pcm::{downmix, PcmDecoder};
use crate::audio::sounds::{names, SoundLibrary};
use crate::error::Fault;
use crate::pipeline::CancelFlag;

use super::error::StreamError;

/// How often a pending request checks the cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// File name and MIME type for an encoded frame, from its magic bytes.
fn image_kind(image: &[u8]) -> (&'static str, &'static str) {
    if image.starts_with(&[0x89, b'P', b'N', b'G']) {
        ("image.png", "image/png")
    } else if image.starts_with(&[0xff, 0xd8]) {
        ("image.jpg", "image/jpeg")
    } else {
        ("image", "application/octet-stream")
    }
}

/// Tunables for [`AudioStreamClient`].
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub base_url: String,
    /// Rate of the PCM the server streams.
    pub sample_rate: u32,
    /// Interleaved channels in the stream; played downmixed to mono.
    pub channels: u16,
    /// Bytes read per window.
    pub chunk_bytes: usize,
    pub connect_timeout: Duration,
    /// Bound on waiting for the response and for each body read.
    pub read_timeout: Duration,
    pub waiting_delay: Duration,
    pub waiting_interval: Duration,
}

/// What happened during one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub bytes: usize,
    /// Time from sending the request to the first audio byte.
    pub first_chunk: Option<Duration>,
    pub cancelled: bool,
}

/// A server that answers an image + prompt with spoken audio.
pub trait RemoteAudio: Send + Sync {
    /// Stream and play the reply, blocking until it ends or `cancel` is set.
    fn stream(&self, image: &[u8], prompt: &str, cancel: &CancelFlag)
        -> Result<StreamReport, Fault>;

    /// Endpoint that aborts the server-side job.
    fn cancel_url(&self) -> String;
}

pub struct AudioStreamClient {
    settings: StreamSettings,
    output: Arc<dyn AudioOutput>,
    sounds: Arc<SoundLibrary>,
}

impl AudioStreamClient {
    pub fn new(
        settings: StreamSettings,
        output: Arc<dyn AudioOutput>,
        sounds: Arc<SoundLibrary>,
    ) -> Self {
        Self {
            settings,
            output,
            sounds,
        }
    }

    fn base(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    /// Built per call: a blocking client must not be created or dropped on
    /// an async runtime thread.
    fn client(&self) -> reqwest::blocking::Client {
        reqwest::blocking::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.read_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new())
    }

    fn form(image: &[u8], prompt: &str) -> Result<Form, StreamError> {
        let (file_name, mime) = image_kind(image);
        let file = Part::bytes(image.to_vec())
            .file_name(file_name)
            .mime_str(mime)?;
        Ok(Form::new().part("file", file).text("text", prompt.to_string()))
    }

    fn start_waiting(&self, stop: CancelFlag) -> Option<JoinHandle<()>> {
        let sounds = Arc::clone(&self.sounds);
        let delay = self.settings.waiting_delay;
        let interval = self.settings.waiting_interval;

        let spawned = std::thread::Builder::new()
            .name("waiting-sound".into())
            .spawn(move || {
                if stop.sleep(delay) {
                    return;
                }
                loop {
                    if let Err(e) = sounds.play_cancellable(names::WAITING, &stop) {
                        log::warn!("waiting sound failed: {e}");
                        return;
                    }
                    if stop.sleep(interval) {
                        return;
                    }
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("failed to spawn waiting sound: {e}");
                None
            }
        }
    }

    /// Send the request on a helper thread and wait for the headers.
    ///
    /// `None` means `cancel` was set first.
    fn send(
        &self,
        form: Form,
        cancel: &CancelFlag,
    ) -> Option<Result<reqwest::blocking::Response, StreamError>> {
        let client = self.client();
        let url = format!("{}/", self.base());
        let (tx, rx) = mpsc::channel();

        let spawned = std::thread::Builder::new()
            .name("stream-request".into())
            .spawn(move || {
                let result = client
                    .get(url)
                    .multipart(form)
                    .send()
                    .map_err(StreamError::from)
                    .and_then(|r| {
                        let status = r.status();
                        if status.is_success() {
                            Ok(r)
                        } else {
                            Err(StreamError::Status(status.as_u16()))
                        }
                    });
                // The receiver is gone if the stream was cancelled.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return Some(Err(StreamError::Request(e.to_string())));
        }

        loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => return Some(result),
                Err(RecvTimeoutError::Timeout) if cancel.is_cancelled() => return None,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Some(Err(StreamError::Request("request thread exited".into())));
                }
            }
        }
    }

    fn fail(&self, error: StreamError, cancel: &CancelFlag) -> Fault {
        if !cancel.is_cancelled() {
            log::warn!("stream failed: {error}");
            if let Err(e) = self.sounds.play_blocking(names::NO_INTERNET) {
                log::warn!("failed to play network notice: {e}");
            }
        }
        error.into()
    }

    fn play_body(
        &self,
        mut response: reqwest::blocking::Response,
        sent_at: Instant,
        cancel: &CancelFlag,
    ) -> Result<StreamReport, Fault> {
        let mut report = StreamReport::default();
        let mut sink = self.output.open(self.settings.sample_rate)?;
        let mut decoder = PcmDecoder::new();
        let channels = usize::from(self.settings.channels.max(1));
        // Samples of a frame split across two windows.
        let mut partial: Vec<f32> = Vec::new();
        let mut window = vec![0u8; self.settings.chunk_bytes.max(2)];

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let n = match response.read(&mut window) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    drop(sink);
                    return Err(self.fail(StreamError::Body(e.to_string()), cancel));
                }
            };

            if report.first_chunk.is_none() {
                let latency = sent_at.elapsed();
                log::info!("first audio after {} ms", latency.as_millis());
                report.first_chunk = Some(latency);
            }
            report.bytes += n;
            let samples = decoder.push(&window[..n]);
            if channels == 1 {
                sink.write(&samples)?;
            } else {
                partial.extend_from_slice(&samples);
                let whole = partial.len() - partial.len() % channels;
                let frames: Vec<f32> = partial.drain(..whole).collect();
                sink.write(&downmix(&frames, self.settings.channels))?;
            }
        }

        if !report.cancelled {
            sink.drain(cancel)?;
            report.cancelled = cancel.is_cancelled();
        }
        log::debug!(
            "stream finished: {} bytes, cancelled={}",
            report.bytes,
            report.cancelled
        );
        Ok(report)
    }
}

impl RemoteAudio for AudioStreamClient {
    fn stream(
        &self,
        image: &[u8],
        prompt: &str,
        cancel: &CancelFlag,
    ) -> Result<StreamReport, Fault> {
        let form = Self::form(image, prompt)?;

        let waiting = cancel.child();
        let waiter = self.start_waiting(waiting.clone());

        let sent_at = Instant::now();
        let result = self.send(form, cancel);

        waiting.cancel();
        if let Some(handle) = waiter {
            if handle.join().is_err() {
                log::warn!("waiting sound thread panicked");
            }
        }

        let response = match result {
            None => {
                log::debug!("stream cancelled before the reply started");
                return Ok(StreamReport {
                    cancelled: true,
                    ..StreamReport::default()
                });
            }
            Some(Ok(r)) => r,
            Some(Err(e)) => return Err(self.fail(e, cancel)),
        };
        if cancel.is_cancelled() {
            return Ok(StreamReport {
                cancelled: true,
                ..StreamReport::default()
            });
        }

        self.play_body(response, sent_at, cancel)
    }

    fn cancel_url(&self) -> String {
        format!("{}/cancel", self.base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::testing::RecordingOutput;
    use crate::audio::sounds::SoundAsset;
    use crate::remote::testing::{refused_url, HttpStub, Reply};

    const STREAM_RATE: u32 = 24_000;
    const WAITING_RATE: u32 = 8_000;
    const NO_NET_RATE: u32 = 11_025;

    fn settings(base_url: String) -> StreamSettings {
        StreamSettings {
            base_url,
            sample_rate: STREAM_RATE,
            channels: 1,
            chunk_bytes: 56,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(5),
            waiting_delay: Duration::from_millis(30),
            waiting_interval: Duration::from_millis(30),
        }
    }

    fn client(base_url: String, out: &RecordingOutput) -> AudioStreamClient {
        let mut lib = SoundLibrary::new(Arc::new(out.clone()));
        lib.insert(SoundAsset::new(names::WAITING, vec![0.0; 80], WAITING_RATE));
        lib.insert(SoundAsset::new(names::NO_INTERNET, vec![0.0; 100], NO_NET_RATE));
        AudioStreamClient::new(settings(base_url), Arc::new(out.clone()), Arc::new(lib))
    }

    fn pcm(samples: usize) -> Vec<u8> {
        (0..samples)
            .flat_map(|i| ((i as i16).wrapping_mul(7)).to_le_bytes())
            .collect()
    }

    #[test]
    fn plays_whole_reply_and_sends_multipart_get() {
        let stub = HttpStub::respond(pcm(1001), Duration::ZERO);
        let out = RecordingOutput::new();
        let c = client(stub.base_url(), &out);

        let report = c
            .stream(b"\xff\xd8jpeg", "Describe the content.", &CancelFlag::new())
            .unwrap();

        assert_eq!(report.bytes, 2002);
        assert!(!report.cancelled);
        assert!(report.first_chunk.is_some());

        let stream = out
            .playbacks()
            .into_iter()
            .find(|p| p.sample_rate == STREAM_RATE)
            .unwrap();
        assert_eq!(stream.samples, 1001);
        assert!(stream.drained);
        assert_eq!(out.open_count(), 0);

        let request = stub.request();
        assert!(request.starts_with("GET / "), "{request}");
        assert!(request.contains("name=\"file\""));
        assert!(request.contains("name=\"text\""));
        assert!(request.contains("Describe the content."));
    }

    #[test]
    fn waiting_sound_loops_until_reply_starts() {
        let stub = HttpStub::respond(pcm(100), Duration::from_millis(300));
        let out = RecordingOutput::new();
        let c = client(stub.base_url(), &out);

        c.stream(b"img", "hi", &CancelFlag::new()).unwrap();

        let rates = out.rates();
        let waits = rates.iter().filter(|&&r| r == WAITING_RATE).count();
        assert!(waits >= 2, "{rates:?}");
        assert_eq!(rates.last(), Some(&STREAM_RATE));
        assert_eq!(out.max_open.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn unreachable_server_plays_notice_once() {
        let out = RecordingOutput::new();
        let c = client(refused_url(), &out);

        let err = c.stream(b"img", "hi", &CancelFlag::new()).unwrap_err();

        assert!(matches!(err, Fault::Network(_)));
        assert_eq!(out.rates(), vec![NO_NET_RATE]);
    }

    #[test]
    fn error_status_is_network_failure() {
        let stub = HttpStub::start(Reply::Status(503));
        let out = RecordingOutput::new();
        let c = client(stub.base_url(), &out);

        let err = c.stream(b"img", "hi", &CancelFlag::new()).unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(out.rates(), vec![NO_NET_RATE]);
    }

    #[test]
    fn truncated_stream_closes_device_then_notifies_once() {
        let stub = HttpStub::start(Reply::Truncated {
            advertised: 10_000,
            bytes: pcm(200),
        });
        let out = RecordingOutput::new();
        let c = client(stub.base_url(), &out);

        let err = c.stream(b"img", "hi", &CancelFlag::new()).unwrap_err();

        assert!(matches!(err, Fault::Network(_)));
        assert_eq!(out.rates(), vec![STREAM_RATE, NO_NET_RATE]);
        assert!(!out.playbacks()[0].drained);
        assert_eq!(out.open_count(), 0);
    }

    #[test]
    fn cancel_mid_stream_stops_without_notice() {
        let stub = HttpStub::start(Reply::Trickle {
            chunk: pcm(28),
            interval: Duration::from_millis(5),
        });
        let out = RecordingOutput::new();
        let c = client(stub.base_url(), &out);

        let cancel = CancelFlag::new();
        let remote = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            remote.cancel();
        });

        let started = Instant::now();
        let report = c.stream(b"img", "hi", &cancel).unwrap();

        assert!(report.cancelled);
        assert!(report.bytes > 0);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(out.open_count(), 0);
        assert!(!out.rates().contains(&NO_NET_RATE));
    }

    #[test]
    fn cancel_while_waiting_for_headers_returns_promptly() {
        let stub = HttpStub::respond(pcm(100), Duration::from_secs(3));
        let out = RecordingOutput::paced(Duration::from_millis(1));
        let c = client(stub.base_url(), &out);

        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            trigger.cancel();
        });

        let started = Instant::now();
        let report = c.stream(b"img", "hi", &cancel).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.bytes, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        let rates = out.rates();
        assert!(rates.contains(&WAITING_RATE), "{rates:?}");
        assert!(!rates.contains(&NO_NET_RATE));
        assert!(!rates.contains(&STREAM_RATE));
        assert_eq!(out.open_count(), 0);
    }

    #[test]
    fn image_part_type_follows_magic_bytes() {
        assert_eq!(image_kind(b"\x89PNG\r\n"), ("image.png", "image/png"));
        assert_eq!(image_kind(b"\xff\xd8\xff\xe0"), ("image.jpg", "image/jpeg"));
        assert_eq!(image_kind(b""), ("image", "application/octet-stream"));

        let stub = HttpStub::respond(pcm(10), Duration::ZERO);
        let out = RecordingOutput::new();
        let c = client(stub.base_url(), &out);
        c.stream(b"\x89PNG\r\n\x1a\n", "hi", &CancelFlag::new()).unwrap();

        let request = stub.request();
        assert!(request.contains("filename=\"image.png\""), "{request}");
        assert!(request.contains("image/png"));
    }

    #[test]
    fn stereo_stream_is_downmixed_across_windows() {
        let stub = HttpStub::respond(pcm(1001), Duration::ZERO);
        let out = RecordingOutput::new();
        let mut lib = SoundLibrary::new(Arc::new(out.clone()));
        lib.insert(SoundAsset::new(names::WAITING, vec![0.0; 80], WAITING_RATE));
        let c = AudioStreamClient::new(
            StreamSettings {
                channels: 2,
                chunk_bytes: 54,
                ..settings(stub.base_url())
            },
            Arc::new(out.clone()),
            Arc::new(lib),
        );

        c.stream(b"img", "hi", &CancelFlag::new()).unwrap();

        let stream = out
            .playbacks()
            .into_iter()
            .find(|p| p.sample_rate == STREAM_RATE)
            .unwrap();
        // The trailing half frame is dropped.
        assert_eq!(stream.samples, 500);
    }

    #[test]
    fn cancel_url_is_under_base() {
        let out = RecordingOutput::new();
        let c = client("http://10.0.0.2:8000/".into(), &out);
        assert_eq!(c.cancel_url(), "http://10.0.0.2:8000/cancel");
    }
}
