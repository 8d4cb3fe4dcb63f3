//! Ping-pong conversation over a duplex pipe.
//!
//! The initiator sends each request and blocks for its reply, then sends
//! [`SENTINEL`]. The responder answers every request with [`reply_for`] and
//! leaves its loop as soon as the sentinel arrives.

use ipclab_event::{EventEmitter, Outcome};
use ipclab_transport::{PipeEndpoint, TransportError};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::failure_step;

/// Payload that ends the conversation.
pub const SENTINEL: &str = "FIM";

/// Requests sent when the caller supplies none.
pub const DEFAULT_REQUESTS: [&str; 3] = ["PING 1", "PING 2", "PING 3"];

/// Deterministic responder transformation. Always contains the request verbatim.
pub fn reply_for(request: &str) -> String {
    format!("ACK: {request}")
}

/// Initiator side: send every request, wait for each reply, then send the sentinel.
///
/// A request equal to the sentinel ends the request list early.
pub fn run_initiator(
    mut endpoint: PipeEndpoint,
    requests: &[String],
    emitter: EventEmitter,
    cancel: &Cancellation,
) -> Outcome {
    emitter.status("init", "Starting pipe conversation.");
    let result = converse(&mut endpoint, requests, &emitter, cancel);
    endpoint.close();
    match result {
        Ok(()) => emitter.complete("finish", "Pipe conversation finished."),
        Err(err) => {
            let step = failure_step(&err);
            emitter.fail(step, format!("Pipe conversation aborted: {err}."))
        }
    }
}

fn converse(
    endpoint: &mut PipeEndpoint,
    requests: &[String],
    emitter: &EventEmitter,
    cancel: &Cancellation,
) -> Result<(), TransportError> {
    for request in requests.iter().take_while(|r| r.as_str() != SENTINEL) {
        if cancel.is_requested() {
            return Err(TransportError::Cancelled);
        }
        endpoint.send(request.as_bytes())?;
        emitter.log_data(
            "sent",
            "Sent request to the responder.",
            request.as_str(),
            Some(request.len() as u64),
        );

        let reply = endpoint.receive()?;
        emitter.log_data(
            "received",
            "Received reply from the responder.",
            String::from_utf8_lossy(&reply),
            Some(reply.len() as u64),
        );
    }

    endpoint.send(SENTINEL.as_bytes())?;
    emitter.log_data(
        "sentinel_sent",
        "Sent termination sentinel.",
        SENTINEL,
        Some(SENTINEL.len() as u64),
    );
    Ok(())
}

/// Responder side: answer requests until the sentinel arrives.
///
/// The peer closing without the sentinel is reported as a terminal error,
/// not a crash.
pub fn run_responder(
    mut endpoint: PipeEndpoint,
    emitter: EventEmitter,
    cancel: &Cancellation,
) -> Outcome {
    emitter.status("init", "Waiting for requests from the initiator.");
    loop {
        if cancel.is_requested() {
            endpoint.close();
            return emitter.fail("cancelled", "Responder cancelled by supervisor.");
        }

        let request = match endpoint.receive() {
            Ok(request) => request,
            Err(err) => {
                endpoint.close();
                let step = failure_step(&err);
                return emitter.fail(step, format!("Receive failed: {err}. Closing endpoint."));
            }
        };

        if request.as_ref() == SENTINEL.as_bytes() {
            debug!("sentinel received");
            endpoint.close();
            return emitter.complete("finish", "Received FIM; endpoint closed.");
        }

        let text = String::from_utf8_lossy(&request).into_owned();
        emitter.log_data(
            "received",
            "Received request.",
            text.as_str(),
            Some(request.len() as u64),
        );

        let reply = reply_for(&text);
        if let Err(err) = endpoint.send(reply.as_bytes()) {
            endpoint.close();
            let step = failure_step(&err);
            return emitter.fail(step, format!("Send failed: {err}. Closing endpoint."));
        }
        emitter.log_data("sent", "Sent reply.", reply.as_str(), Some(reply.len() as u64));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use ipclab_event::{EventKind, EventSink, RecordingSink, WorkerIdentity};
    use ipclab_transport::PipeChannel;

    use super::*;

    fn emitter(label: &str, sink: &Arc<RecordingSink>) -> EventEmitter {
        EventEmitter::new(
            WorkerIdentity::new(label),
            Arc::clone(sink) as Arc<dyn EventSink>,
        )
    }

    fn requests(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ping_scenario_event_accounting() {
        let sink = Arc::new(RecordingSink::new());
        let cancel = Cancellation::new();
        let (parent_end, child_end) = PipeChannel::create().unwrap();

        let child = {
            let emitter = emitter("CHILD", &sink);
            let cancel = cancel.clone();
            thread::spawn(move || run_responder(child_end, emitter, &cancel))
        };
        let parent_outcome = run_initiator(
            parent_end,
            &requests(&["PING 1", "PING 2", "PING 3", "FIM"]),
            emitter("PARENT", &sink),
            &cancel,
        );
        let child_outcome = child.join().unwrap();

        assert!(parent_outcome.is_success());
        assert!(child_outcome.is_success());
        assert_eq!(
            sink.steps_of("CHILD"),
            vec!["init", "received", "sent", "received", "sent", "received", "sent", "finish"]
        );
        assert_eq!(
            sink.steps_of("PARENT"),
            vec![
                "init",
                "sent",
                "received",
                "sent",
                "received",
                "sent",
                "received",
                "sentinel_sent",
                "finish"
            ]
        );
    }

    #[test]
    fn replies_contain_request_verbatim_and_arrive_in_order() {
        let sink = Arc::new(RecordingSink::new());
        let cancel = Cancellation::new();
        let (parent_end, child_end) = PipeChannel::create().unwrap();

        let child = {
            let emitter = emitter("CHILD", &sink);
            let cancel = cancel.clone();
            thread::spawn(move || run_responder(child_end, emitter, &cancel))
        };
        let sent = requests(&["hello", "olá, mundo", "third"]);
        run_initiator(parent_end, &sent, emitter("PARENT", &sink), &cancel);
        child.join().unwrap();

        let replies: Vec<String> = sink
            .from_label("PARENT")
            .into_iter()
            .filter(|e| e.step() == "received")
            .filter_map(|e| e.data().map(str::to_string))
            .collect();
        assert_eq!(replies.len(), sent.len());
        for (request, reply) in sent.iter().zip(&replies) {
            assert_eq!(reply, &reply_for(request));
            assert!(reply.contains(request.as_str()));
        }
    }

    #[test]
    fn sentinel_stops_responder_without_further_send() {
        let sink = Arc::new(RecordingSink::new());
        let (mut parent_end, child_end) = PipeChannel::create().unwrap();

        parent_end.send(SENTINEL.as_bytes()).unwrap();
        let outcome = run_responder(child_end, emitter("CHILD", &sink), &Cancellation::new());

        assert!(outcome.is_success());
        assert_eq!(sink.steps_of("CHILD"), vec!["init", "finish"]);
        // Responder closed its end without replying.
        assert!(matches!(
            parent_end.receive(),
            Err(TransportError::PeerClosed)
        ));
    }

    #[test]
    fn peer_close_without_sentinel_is_reported_not_crashed() {
        let sink = Arc::new(RecordingSink::new());
        let (mut parent_end, child_end) = PipeChannel::create().unwrap();

        parent_end.send(b"PING 1").unwrap();
        let child = {
            let emitter = emitter("CHILD", &sink);
            thread::spawn(move || run_responder(child_end, emitter, &Cancellation::new()))
        };
        assert_eq!(parent_end.receive().unwrap().as_ref(), b"ACK: PING 1");
        drop(parent_end);

        let outcome = child.join().unwrap();
        assert!(matches!(outcome, Outcome::Failed { ref step, .. } if step == "peer_closed"));
        let events = sink.from_label("CHILD");
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert_eq!(last.step(), "peer_closed");
        assert_eq!(
            events.iter().filter(|e| e.kind != EventKind::Log).count(),
            2,
            "one init status and one terminal event"
        );
    }

    #[test]
    fn initiator_reports_responder_disappearing() {
        let sink = Arc::new(RecordingSink::new());
        let (parent_end, child_end) = PipeChannel::create().unwrap();
        drop(child_end);

        let outcome = run_initiator(
            parent_end,
            &requests(&["PING 1"]),
            emitter("PARENT", &sink),
            &Cancellation::new(),
        );
        assert!(!outcome.is_success());
        assert_eq!(sink.events().last().unwrap().kind, EventKind::Error);
    }

    #[test]
    fn cancelled_initiator_stops_before_sending() {
        let sink = Arc::new(RecordingSink::new());
        let (parent_end, _child_end) = PipeChannel::create().unwrap();
        let cancel = Cancellation::new();
        cancel.request();

        let outcome = run_initiator(
            parent_end,
            &requests(&["PING 1"]),
            emitter("PARENT", &sink),
            &cancel,
        );
        assert!(matches!(outcome, Outcome::Failed { ref step, .. } if step == "cancelled"));
        assert_eq!(sink.steps_of("PARENT"), vec!["init", "cancelled"]);
    }
}
