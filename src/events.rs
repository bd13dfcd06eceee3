//! Observer model for the events a client operation produces. Replaces
//! the teacher's `lazy_static! TRANSFER_PROGRESS` global map and ad-hoc
//! `log::trace!` calls with explicit subscribers invoked synchronously
//! inline with the operation that produces the event (spec.md §9).

use crate::types::{Request, Response, TransferProgress};
use rustls::pki_types::CertificateDer;
use std::sync::Arc;

/// Events a `FtpClient` emits during normal operation.
pub enum FtpEvent<'a> {
    RequestSent(&'a Request),
    ResponseReceived(&'a Response),
    TransferProgress(&'a TransferProgress),
    TransferComplete {
        total_bytes: u64,
        bytes_per_second: f64,
        elapsed_ms: u64,
    },
    ConnectionClosed,
}

/// Subscriber interface. All methods have a default no-op body so callers
/// only implement what they care about.
pub trait FtpObserver: Send + Sync {
    fn on_event(&self, _event: &FtpEvent<'_>) {}
}

/// An observer that does nothing; the default when none is registered.
pub struct NullObserver;

impl FtpObserver for NullObserver {
    fn on_event(&self, _event: &FtpEvent<'_>) {}
}

/// Broadcasts one event to every registered observer.
#[derive(Clone)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn FtpObserver>>,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl ObserverRegistry {
    pub fn register(&mut self, observer: Arc<dyn FtpObserver>) {
        self.observers.push(observer);
    }

    pub fn emit(&self, event: FtpEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

/// `ValidateServerCertificate` is exposed separately from `FtpObserver`
/// because it returns a value (accept/reject) rather than being a
/// fire-and-forget notification; see `tls::CertificateValidator`.
pub fn describe_cert_for_log(cert: &CertificateDer<'static>) -> String {
    format!("{} byte DER certificate", cert.as_ref().len())
}
