use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::config::LoaderConfiguration;
use crate::function::Function;
use crate::invocation::InvocationOutcome;
use crate::metric::{JobSchedReply, JobSchedRequest};
use crate::specification::RuntimeSpecification;

/// Everything an invoker gets to know about one invocation attempt.
pub struct InvocationRequest<'a> {
    /// Function to invoke, already chosen by the invocation policy.
    pub function: &'a Arc<Function>,
    /// Functions grouped with `function` (GPU variants, serverful copies or the whole trace).
    pub siblings: &'a [Arc<Function>],
    pub prompt_functions: &'a [Arc<Function>],
    pub runtime_specification: &'a RuntimeSpecification,
    pub configuration: &'a LoaderConfiguration,
    pub invocation_id: &'a str,
    pub admission: Option<&'a AdmissionLink>,
}

/// Invoker performs a single invocation on the target platform.
///
/// Implementations must not fail: errors of the platform are reported through
/// [`InvocationOutcome::success`] and the records.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, request: InvocationRequest<'_>) -> InvocationOutcome;

    fn name(&self) -> String {
        "STUB INVOKER NAME".to_string()
    }
}

/// A request waiting for its placement decision.
pub struct AdmissionTicket {
    pub request: JobSchedRequest,
    pub reply: oneshot::Sender<JobSchedReply>,
}

/// Connection to an external admission scheduler, shared by all invocations of an experiment.
#[derive(Clone)]
pub struct AdmissionLink {
    requests: mpsc::Sender<AdmissionTicket>,
}

impl AdmissionLink {
    /// Creates a link together with the receiving end the admission scheduler serves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AdmissionTicket>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { requests: tx }, rx)
    }

    /// Sends the request and waits for the decision, `None` if the scheduler went away.
    pub async fn exchange(&self, request: JobSchedRequest) -> Option<JobSchedReply> {
        let (tx, rx) = oneshot::channel();
        self.requests.send(AdmissionTicket { request, reply: tx }).await.ok()?;
        rx.await.ok()
    }
}
