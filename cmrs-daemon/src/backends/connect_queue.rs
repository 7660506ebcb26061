//! FIFO queue of service connect requests.
//!
//! Needed because the agent may not be registered with ConnMan when a
//! connect request arrives; requests are processed in order once it is.
//! At most one entry is actively connecting at any time and it is always
//! the head of the queue.
//!
//! The queue never performs I/O itself: operations that require a connect
//! to be issued return the service path and the adapter does the call.

use std::collections::VecDeque;

use log::warn;
use zvariant::OwnedObjectPath;

use cmrs_core::{ConnectResult, RequestedCredentials};

use crate::backend::{ConnectFinished, CredentialsReply, CredentialsRequest, RequestCredentials};

struct Entry {
    service: OwnedObjectPath,
    connecting: bool,
    finished: ConnectFinished,
    request_credentials: Option<RequestCredentials>,
}

#[derive(Default)]
pub struct ConnectQueue {
    entries: VecDeque<Entry>,
}

impl ConnectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request. If `connect_if_queue_empty` and the queue was
    /// empty, the entry is marked connecting and its service is returned
    /// so the caller can issue the connect.
    pub fn enqueue(
        &mut self,
        service: OwnedObjectPath,
        finished: ConnectFinished,
        request_credentials: Option<RequestCredentials>,
        connect_if_queue_empty: bool,
    ) -> Option<OwnedObjectPath> {
        let connect = connect_if_queue_empty && self.entries.is_empty();

        self.entries.push_back(Entry {
            service,
            connecting: false,
            finished,
            request_credentials,
        });

        if connect {
            self.mark_head_connecting()
        } else {
            None
        }
    }

    /// Drop every entry for `service`, failing each one.
    pub fn remove_service(&mut self, service: &OwnedObjectPath) {
        let mut kept = VecDeque::with_capacity(self.entries.len());
        let mut failed = Vec::new();

        for entry in self.entries.drain(..) {
            if entry.service == *service {
                failed.push(entry.finished);
            } else {
                kept.push_back(entry);
            }
        }

        self.entries = kept;

        for finished in failed {
            let _ = finished.send(ConnectResult::Failed);
        }
    }

    /// Fail every entry and empty the queue.
    pub fn fail_all_and_clear(&mut self) {
        for entry in std::mem::take(&mut self.entries) {
            let _ = entry.finished.send(ConnectResult::Failed);
        }
    }

    /// Start the head entry if it is not already connecting. Returns the
    /// service to issue the connect on.
    pub fn connect_if_not_empty(&mut self) -> Option<OwnedObjectPath> {
        match self.entries.front() {
            Some(entry) if !entry.connecting => self.mark_head_connecting(),
            _ => None,
        }
    }

    /// The provider finished connecting `service`. The head entry is
    /// completed and the next one, if any, is returned to be started.
    ///
    /// A completion that does not match the head means the caller and the
    /// queue have diverged; it is logged and ignored.
    pub fn connect_finished(
        &mut self,
        service: &OwnedObjectPath,
        success: bool,
    ) -> Option<OwnedObjectPath> {
        match self.entries.front() {
            None => {
                warn!("Service finished connecting but connect queue is empty");
                return None;
            }
            Some(head) if head.service != *service => {
                warn!("Service finished connecting but not first in queue");
                return None;
            }
            Some(_) => {}
        }

        if let Some(entry) = self.entries.pop_front() {
            let _ = entry.finished.send(if success {
                ConnectResult::Success
            } else {
                ConnectResult::Failed
            });
        }

        self.connect_if_not_empty()
    }

    /// Route a credentials prompt for `service` to the head entry.
    ///
    /// Replies with absent credentials if the queue is empty, the head is
    /// for another service or the head has no credentials channel.
    pub fn request_credentials(
        &self,
        service: &OwnedObjectPath,
        requested: RequestedCredentials,
        reply: CredentialsReply,
    ) {
        let head = match self.entries.front() {
            None => {
                warn!("Received unexpected credentials request, queue empty");
                let _ = reply.send(None);
                return;
            }
            Some(head) if head.service != *service => {
                warn!("Received unexpected credentials request for service not first in queue");
                let _ = reply.send(None);
                return;
            }
            Some(head) => head,
        };

        match &head.request_credentials {
            Some(request_credentials) => {
                if let Err(send_error) =
                    request_credentials.send(CredentialsRequest { requested, reply })
                {
                    let _ = send_error.0.reply.send(None);
                }
            }
            None => {
                let _ = reply.send(None);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mark_head_connecting(&mut self) -> Option<OwnedObjectPath> {
        let entry = self.entries.front_mut()?;
        entry.connecting = true;
        Some(entry.service.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmrs_core::Credentials;
    use tokio::sync::{mpsc, oneshot};
    use zvariant::ObjectPath;

    fn path(s: &str) -> OwnedObjectPath {
        ObjectPath::try_from(s).unwrap().into()
    }

    fn finished() -> (ConnectFinished, oneshot::Receiver<ConnectResult>) {
        oneshot::channel()
    }

    #[test]
    fn first_entry_connects_immediately_when_allowed() {
        let mut queue = ConnectQueue::new();
        let (tx, _rx) = finished();

        let to_start = queue.enqueue(path("/svc/a"), tx, None, true);
        assert_eq!(to_start, Some(path("/svc/a")));

        // Already connecting, nothing more to start.
        assert_eq!(queue.connect_if_not_empty(), None);
    }

    #[test]
    fn entries_complete_in_fifo_order() {
        let mut queue = ConnectQueue::new();
        let (tx_a, mut rx_a) = finished();
        let (tx_b, mut rx_b) = finished();

        // Agent not registered yet: nothing starts.
        assert_eq!(queue.enqueue(path("/svc/a"), tx_a, None, false), None);
        assert_eq!(queue.enqueue(path("/svc/b"), tx_b, None, false), None);

        // Agent registration succeeded: A starts first.
        assert_eq!(queue.connect_if_not_empty(), Some(path("/svc/a")));
        assert!(rx_a.try_recv().is_err());

        // A finishes, B starts.
        assert_eq!(
            queue.connect_finished(&path("/svc/a"), true),
            Some(path("/svc/b"))
        );
        assert!(matches!(rx_a.try_recv(), Ok(ConnectResult::Success)));

        assert_eq!(queue.connect_finished(&path("/svc/b"), false), None);
        assert!(matches!(rx_b.try_recv(), Ok(ConnectResult::Failed)));
        assert!(queue.is_empty());
    }

    #[test]
    fn completion_for_wrong_service_is_ignored() {
        let mut queue = ConnectQueue::new();
        let (tx, mut rx) = finished();
        queue.enqueue(path("/svc/a"), tx, None, true);

        assert_eq!(queue.connect_finished(&path("/svc/other"), true), None);
        assert!(rx.try_recv().is_err());
        assert!(!queue.is_empty());
    }

    #[test]
    fn remove_service_fails_every_matching_entry() {
        let mut queue = ConnectQueue::new();
        let (tx_a1, mut rx_a1) = finished();
        let (tx_b, mut rx_b) = finished();
        let (tx_a2, mut rx_a2) = finished();

        queue.enqueue(path("/svc/a"), tx_a1, None, false);
        queue.enqueue(path("/svc/b"), tx_b, None, false);
        queue.enqueue(path("/svc/a"), tx_a2, None, false);

        queue.remove_service(&path("/svc/a"));

        assert!(matches!(rx_a1.try_recv(), Ok(ConnectResult::Failed)));
        assert!(matches!(rx_a2.try_recv(), Ok(ConnectResult::Failed)));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn fail_all_and_clear_fails_in_order() {
        let mut queue = ConnectQueue::new();
        let (tx_a, mut rx_a) = finished();
        let (tx_b, mut rx_b) = finished();
        queue.enqueue(path("/svc/a"), tx_a, None, true);
        queue.enqueue(path("/svc/b"), tx_b, None, false);

        queue.fail_all_and_clear();

        assert!(matches!(rx_a.try_recv(), Ok(ConnectResult::Failed)));
        assert!(matches!(rx_b.try_recv(), Ok(ConnectResult::Failed)));
        assert!(queue.is_empty());
    }

    #[test]
    fn credentials_request_reaches_the_head_entry() {
        let mut queue = ConnectQueue::new();
        let (tx, _keep) = finished();
        let (request_tx, mut request_rx) = mpsc::unbounded_channel();
        queue.enqueue(path("/svc/a"), tx, Some(request_tx), true);

        let (reply_tx, _reply_rx) = oneshot::channel();
        queue.request_credentials(
            &path("/svc/a"),
            RequestedCredentials {
                description_type: RequestedCredentials::TYPE_WIRELESS_NETWORK.to_owned(),
                description_id: "Cafe".to_owned(),
                credentials: Credentials::default(),
            },
            reply_tx,
        );

        let request = request_rx.try_recv().unwrap();
        assert_eq!(request.requested.description_id, "Cafe");
    }

    #[test]
    fn credentials_request_without_channel_replies_absent() {
        let mut queue = ConnectQueue::new();
        let (tx, _keep) = finished();
        queue.enqueue(path("/svc/a"), tx, None, true);

        let (reply_tx, mut reply_rx) = oneshot::channel();
        queue.request_credentials(
            &path("/svc/a"),
            RequestedCredentials {
                description_type: RequestedCredentials::TYPE_NETWORK.to_owned(),
                description_id: String::new(),
                credentials: Credentials::default(),
            },
            reply_tx,
        );

        assert!(matches!(reply_rx.try_recv(), Ok(None)));
    }

    #[test]
    fn credentials_request_for_non_head_service_replies_absent() {
        let mut queue = ConnectQueue::new();
        let (tx, _keep) = finished();
        let (request_tx, mut request_rx) = mpsc::unbounded_channel();
        queue.enqueue(path("/svc/a"), tx, Some(request_tx), true);

        let (reply_tx, mut reply_rx) = oneshot::channel();
        queue.request_credentials(
            &path("/svc/other"),
            RequestedCredentials {
                description_type: RequestedCredentials::TYPE_NETWORK.to_owned(),
                description_id: String::new(),
                credentials: Credentials::default(),
            },
            reply_tx,
        );

        assert!(matches!(reply_rx.try_recv(), Ok(None)));
        assert!(request_rx.try_recv().is_err());
    }
}
