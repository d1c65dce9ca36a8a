//! Failure classification driving retry decisions.
//!
//! Connector errors split into transient (reconnect and resume) and fatal
//! (stop the pipeline and surface the error). Publish errors split into
//! transient (eligible for backoff retries) and permanent (routed straight
//! to the dead letter queue). Unknown kinds classify conservatively so a
//! misclassified error is never retried forever.

use crate::error::{CdcError, ErrorKind};

/// Classification of a source connector failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectClass {
    /// A recoverable failure: the worker reopens the connector with backoff
    /// and resumes from the last acknowledged sequence.
    Transient,
    /// An unrecoverable failure: the pipeline transitions to failed.
    Fatal,
}

/// Classification of a broker publish failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PublishClass {
    /// The publish may succeed if retried after a backoff delay.
    Transient,
    /// Retrying cannot succeed; the event goes to the dead letter queue.
    Permanent,
}

/// Classifies a connector error.
pub fn classify_connect_error(error: &CdcError) -> ConnectClass {
    match error.kind() {
        // Keep this list narrow: only connectivity failures expected to
        // recover without operator intervention.
        ErrorKind::SourceConnectionFailed | ErrorKind::SourceIoError | ErrorKind::IoError => {
            ConnectClass::Transient
        }
        _ => ConnectClass::Fatal,
    }
}

/// Classifies a publish error.
pub fn classify_publish_error(error: &CdcError) -> PublishClass {
    match error.kind() {
        ErrorKind::BrokerUnreachable | ErrorKind::BrokerBackpressure | ErrorKind::IoError => {
            PublishClass::Transient
        }
        _ => PublishClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc_error;

    #[test]
    fn connection_failures_are_transient() {
        let err = cdc_error!(ErrorKind::SourceConnectionFailed, "connection refused");
        assert_eq!(classify_connect_error(&err), ConnectClass::Transient);
    }

    #[test]
    fn authentication_failures_are_fatal() {
        let err = cdc_error!(ErrorKind::SourceAuthenticationError, "bad credentials");
        assert_eq!(classify_connect_error(&err), ConnectClass::Fatal);
    }

    #[test]
    fn backpressure_is_retriable() {
        let err = cdc_error!(ErrorKind::BrokerBackpressure, "broker overloaded");
        assert_eq!(classify_publish_error(&err), PublishClass::Transient);
    }

    #[test]
    fn rejected_messages_are_permanent() {
        let err = cdc_error!(ErrorKind::MessageRejected, "message too large");
        assert_eq!(classify_publish_error(&err), PublishClass::Permanent);
    }

    #[test]
    fn unknown_kinds_classify_conservatively() {
        let err = cdc_error!(ErrorKind::Unknown, "unexpected");
        assert_eq!(classify_connect_error(&err), ConnectClass::Fatal);
        assert_eq!(classify_publish_error(&err), PublishClass::Permanent);
    }
}
