//! Native messaging host: a blocking read-dispatch-write loop over a framed
//! stdin/stdout channel.
//!
//! One request in flight at a time, one response per request, in order. The
//! loop ends on a clean peer close (end of stream) or a fatal protocol error;
//! dispatch-level failures never end it.

pub mod dispatch;
pub mod protocol;
pub mod viewer;

pub use dispatch::{DispatchError, Dispatcher, HOST_VERSION};
pub use protocol::{FramedChannel, Message, ProtocolError, MAX_FRAME_SIZE};
pub use viewer::{LaunchError, Launched, ViewerLauncher};

use std::io::{Read, Write};
use std::time::Instant;

pub struct NativeHost<R, W> {
    channel: FramedChannel<R, W>,
    dispatcher: Dispatcher,
}

impl<R: Read, W: Write> NativeHost<R, W> {
    pub fn new(channel: FramedChannel<R, W>, dispatcher: Dispatcher) -> Self {
        NativeHost {
            channel,
            dispatcher,
        }
    }

    /// Run until the peer closes the stream (Ok) or the channel turns fatal
    /// (Err). Interrupt signals terminate the process wholesale; there is no
    /// cooperative cancellation of an in-flight action.
    pub fn run(mut self) -> Result<(), ProtocolError> {
        let started = Instant::now();
        let mut handled: u64 = 0;
        log::info!("[PHASE: host] [STEP: loop] entered");

        loop {
            let request = match self.channel.read_frame() {
                Ok(Some(request)) => request,
                Ok(None) => {
                    log::info!(
                        "[PHASE: host] [STEP: loop] stream closed by peer, exit ok (handled={} duration_ms={})",
                        handled,
                        started.elapsed().as_millis()
                    );
                    return Ok(());
                }
                Err(err) => {
                    log::error!(
                        "[PHASE: host] [STEP: loop] fatal channel error after {} frames: {}",
                        handled,
                        err
                    );
                    return Err(err);
                }
            };

            let action = request.action().unwrap_or("(none)").to_string();
            log::info!("[PHASE: host] [STEP: dispatch] action={}", action);

            let response = self.dispatcher.dispatch(&request);
            let ok = response.get_bool("success").unwrap_or(false);
            log::info!(
                "[PHASE: host] [STEP: dispatch] action={} success={}",
                action,
                ok
            );

            // A failed reply write means the peer is gone mid-response.
            self.channel.write_frame(&response)?;
            handled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::os_detection::Platform;
    use serde_json::json;
    use std::io::Cursor;

    fn scripted_wire(requests: &[serde_json::Value]) -> Vec<u8> {
        let mut wire = Vec::new();
        for value in requests {
            let message = Message::from_value(value.clone());
            wire.extend_from_slice(&protocol::encode_frame(&message).unwrap());
        }
        wire
    }

    fn read_responses(mut wire: &[u8]) -> Vec<Message> {
        let mut out = Vec::new();
        let mut channel = FramedChannel::new(&mut wire, Vec::new());
        while let Ok(Some(message)) = channel.read_frame() {
            out.push(message);
        }
        out
    }

    fn host_over<'a>(
        wire: Vec<u8>,
        output: &'a mut Vec<u8>,
        install_dir: &std::path::Path,
    ) -> NativeHost<Cursor<Vec<u8>>, &'a mut Vec<u8>> {
        let dispatcher = Dispatcher::new(
            ViewerLauncher::with_candidates(Platform::Linux, Vec::new()),
            install_dir.to_path_buf(),
        );
        NativeHost::new(FramedChannel::new(Cursor::new(wire), output), dispatcher)
    }

    #[test]
    fn loop_answers_each_request_in_order_then_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let wire = scripted_wire(&[
            json!({"action": "ping"}),
            json!({"action": "unknown_x"}),
            json!({"action": "check_vnc"}),
        ]);
        let mut output = Vec::new();

        let result = host_over(wire, &mut output, dir.path()).run();
        assert!(result.is_ok(), "clean stream close must be Ok");

        let responses = read_responses(&output);
        assert_eq!(responses.len(), 3, "one response per request");
        assert_eq!(responses[0].get_str("message"), Some("pong"));
        assert_eq!(
            responses[1].get_str("error"),
            Some("Unknown action: unknown_x")
        );
        assert_eq!(
            responses[2].get_bool("success"),
            Some(false),
            "no viewer installed in the fixture"
        );
    }

    #[test]
    fn malformed_frame_ends_loop_after_flushing_prior_responses() {
        let dir = tempfile::tempdir().unwrap();
        let mut wire = scripted_wire(&[json!({"action": "ping"})]);
        let garbage = b"definitely not json";
        wire.extend_from_slice(&(garbage.len() as u32).to_le_bytes());
        wire.extend_from_slice(garbage);
        let mut output = Vec::new();

        let result = host_over(wire, &mut output, dir.path()).run();

        assert!(
            matches!(result, Err(ProtocolError::Decode(_))),
            "bad JSON must be fatal, got {:?}",
            result
        );
        let responses = read_responses(&output);
        assert_eq!(
            responses.len(),
            1,
            "the good request before the bad frame still got its reply"
        );
        assert_eq!(responses[0].get_str("message"), Some("pong"));
    }

    #[test]
    fn empty_stream_is_a_clean_exit_with_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = Vec::new();

        let result = host_over(Vec::new(), &mut output, dir.path()).run();

        assert!(result.is_ok());
        assert!(output.is_empty(), "no requests, no responses");
    }
}
