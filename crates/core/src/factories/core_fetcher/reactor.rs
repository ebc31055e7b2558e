use super::request::{HandleId, RequestSlot};
use bytes::{Bytes, BytesMut};
use certnet_api::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type CmdSend = tokio::sync::mpsc::UnboundedSender<Cmd>;
pub(crate) type CmdRecv = tokio::sync::mpsc::UnboundedReceiver<Cmd>;

/// Margin added to the transport timeout hint. The deadline timer here
/// is authoritative; the hint only bounds worker cleanup in the http
/// layer and must never fire first.
const TIMEOUT_HINT_GRACE: Duration = Duration::from_secs(5);

/// Distinguishes successive jobs for the same fetch key, so an event
/// from a job that already completed cannot touch the key's next job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JobId(u64);

/// The commands processed by the network thread, in FIFO order.
///
/// StartFetch, CancelHandle, StateSummary and Teardown are posted by
/// caller threads. The Job* events are posted by the per-job helper
/// tasks running on the network thread itself.
pub(crate) enum Cmd {
    StartFetch {
        key: FetchKey,
        timeout: Duration,
        handle_id: HandleId,
        slot: Arc<RequestSlot>,
    },
    CancelHandle {
        key: FetchKey,
        handle_id: HandleId,
    },
    JobData {
        key: FetchKey,
        job_id: JobId,
        chunk: Bytes,
    },
    JobDone {
        key: FetchKey,
        job_id: JobId,
        result: FetchResult<()>,
    },
    JobTimedOut {
        key: FetchKey,
        job_id: JobId,
    },
    StateSummary {
        reply: tokio::sync::oneshot::Sender<FetcherStateSummary>,
    },
    Teardown,
}

/// The network thread entry point.
pub(crate) fn reactor_thread(
    http_client: DynHttpClient,
    cmd_send: CmdSend,
    cmd_recv: CmdRecv,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(?err, "could not build network thread runtime");
            abort_pending(cmd_recv);
            return;
        }
    };

    rt.block_on(reactor_task(http_client, cmd_send, cmd_recv));
}

/// Without a runtime no fetch can ever complete. Resolve every incoming
/// fetch as aborted so no caller blocks forever.
fn abort_pending(mut cmd_recv: CmdRecv) {
    while let Some(cmd) = cmd_recv.blocking_recv() {
        match cmd {
            Cmd::StartFetch { slot, .. } => {
                slot.complete(Err(FetchError::aborted()))
            }
            Cmd::Teardown => break,
            _ => (),
        }
    }
}

async fn reactor_task(
    http_client: DynHttpClient,
    cmd_send: CmdSend,
    mut cmd_recv: CmdRecv,
) {
    let mut registry = Registry::new(http_client, cmd_send);

    while let Some(cmd) = cmd_recv.recv().await {
        match cmd {
            Cmd::StartFetch {
                key,
                timeout,
                handle_id,
                slot,
            } => registry.start_fetch(key, timeout, handle_id, slot),
            Cmd::CancelHandle { key, handle_id } => {
                registry.cancel_handle(&key, handle_id)
            }
            Cmd::JobData { key, job_id, chunk } => {
                registry.job_data(key, job_id, chunk)
            }
            Cmd::JobDone {
                key,
                job_id,
                result,
            } => registry.job_done(key, job_id, result),
            Cmd::JobTimedOut { key, job_id } => {
                registry.job_timed_out(key, job_id)
            }
            Cmd::StateSummary { reply } => {
                let _ = reply.send(registry.summary());
            }
            Cmd::Teardown => break,
        }
    }

    registry.teardown();
}

/// Reactor-side state backing one underlying HTTP request, serving one
/// or more request handles.
struct Job {
    id: JobId,

    /// Attached handles in attach order; completion fan-out iterates in
    /// this order.
    handles: Vec<(HandleId, Arc<RequestSlot>)>,

    /// The accumulating decoded response body.
    buffer: BytesMut,

    /// Hard cap on `buffer`.
    max_response_bytes: usize,

    drive: tokio::task::AbortHandle,
    timer: tokio::task::AbortHandle,
}

impl Job {
    /// Cancel the underlying HTTP request and the deadline timer.
    fn stop(&self) {
        self.drive.abort();
        self.timer.abort();
    }
}

/// All in-flight fetch state. Exclusively owned by the command loop;
/// the single-threaded loop is what stands in for locking.
struct Registry {
    http_client: DynHttpClient,
    cmd_send: CmdSend,
    jobs: HashMap<FetchKey, Job>,
    next_job_id: u64,
}

impl Registry {
    fn new(http_client: DynHttpClient, cmd_send: CmdSend) -> Self {
        Self {
            http_client,
            cmd_send,
            jobs: HashMap::new(),
            next_job_id: 0,
        }
    }

    fn start_fetch(
        &mut self,
        key: FetchKey,
        timeout: Duration,
        handle_id: HandleId,
        slot: Arc<RequestSlot>,
    ) {
        if !key.url.is_http() {
            // No job and no HTTP request for a disallowed scheme, but
            // the rejection still flows through the result channel.
            slot.complete(Err(FetchError::disallowed_scheme(
                key.url.as_str(),
            )));
            return;
        }

        match self.jobs.entry(key.clone()) {
            Entry::Occupied(mut e) => {
                e.get_mut().handles.push((handle_id, slot));
            }
            Entry::Vacant(v) => {
                let id = JobId(self.next_job_id);
                self.next_job_id += 1;

                tracing::debug!(url = %key.url, ?id, "starting fetch job");

                let drive = tokio::task::spawn(drive_task(
                    self.http_client.clone(),
                    key.clone(),
                    id,
                    timeout,
                    self.cmd_send.clone(),
                ))
                .abort_handle();
                let timer = tokio::task::spawn(timer_task(
                    key.clone(),
                    id,
                    timeout,
                    self.cmd_send.clone(),
                ))
                .abort_handle();

                v.insert(Job {
                    id,
                    handles: vec![(handle_id, slot)],
                    buffer: BytesMut::new(),
                    max_response_bytes: key.max_response_bytes,
                    drive,
                    timer,
                });
            }
        }
    }

    fn cancel_handle(&mut self, key: &FetchKey, handle_id: HandleId) {
        // A cancel that raced job completion finds its id attached to
        // nothing and is a no-op; the handle's memory is the caller's
        // business and must not be touched from here.
        let Some(job) = self.jobs.get_mut(key) else {
            return;
        };
        let Some(pos) =
            job.handles.iter().position(|(id, _)| *id == handle_id)
        else {
            return;
        };

        let (_, slot) = job.handles.remove(pos);
        slot.abandon();

        if job.handles.is_empty() {
            // The last caller is gone; cancel the underlying request and
            // discard the job.
            tracing::debug!(url = %key.url, id = ?job.id, "fetch job cancelled");
            let job = self.jobs.remove(key).expect("job just looked up");
            job.stop();
        }
    }

    /// Look up a job, discarding events tagged with a stale job id.
    fn live_job(&mut self, key: &FetchKey, job_id: JobId) -> Option<&mut Job> {
        match self.jobs.get_mut(key) {
            Some(job) if job.id == job_id => Some(job),
            _ => None,
        }
    }

    fn job_data(&mut self, key: FetchKey, job_id: JobId, chunk: Bytes) {
        let Some(job) = self.live_job(&key, job_id) else {
            return;
        };

        if job.buffer.len() + chunk.len() > job.max_response_bytes {
            let max_response_bytes = job.max_response_bytes;
            self.complete(&key, Err(FetchError::file_too_big(
                max_response_bytes,
            )));
            return;
        }

        job.buffer.extend_from_slice(&chunk);
    }

    fn job_done(
        &mut self,
        key: FetchKey,
        job_id: JobId,
        result: FetchResult<()>,
    ) {
        if self.live_job(&key, job_id).is_none() {
            return;
        }
        self.complete(&key, result);
    }

    fn job_timed_out(&mut self, key: FetchKey, job_id: JobId) {
        // A deadline that fired after completion finds no live job here.
        if self.live_job(&key, job_id).is_none() {
            return;
        }
        self.complete(&key, Err(FetchError::timed_out()));
    }

    /// Completion fan-out. The job leaves the registry before any handle
    /// is signalled, so a re-entrant fetch from a woken caller starts a
    /// fresh job rather than attaching to this completing one.
    fn complete(&mut self, key: &FetchKey, result: FetchResult<()>) {
        let Some(mut job) = self.jobs.remove(key) else {
            return;
        };
        job.stop();

        // One frozen buffer; each handle receives an independent
        // reference-counted view of it. Failures deliver no body.
        let body = std::mem::take(&mut job.buffer).freeze();
        let result = result.map(|_| body);

        tracing::debug!(
            url = %key.url,
            id = ?job.id,
            ok = result.is_ok(),
            "fetch job complete"
        );

        for (_, slot) in job.handles.iter() {
            slot.complete(result.clone());
        }
    }

    fn summary(&self) -> FetcherStateSummary {
        FetcherStateSummary {
            jobs: self
                .jobs
                .iter()
                .map(|(key, job)| (key.clone(), job.handles.len()))
                .collect(),
        }
    }

    /// Cancel every job, resolving every attached handle as aborted.
    fn teardown(&mut self) {
        for (key, job) in self.jobs.drain() {
            tracing::debug!(url = %key.url, id = ?job.id, "fetch job aborted");
            job.stop();
            for (_, slot) in job.handles.iter() {
                slot.complete(Err(FetchError::aborted()));
            }
        }
    }
}

/// Drives one underlying HTTP request and feeds the outcome back to the
/// command loop. Owns no job state; everything it posts is tagged with
/// the job id so the loop can discard events from a job that is already
/// gone.
async fn drive_task(
    http_client: DynHttpClient,
    key: FetchKey,
    job_id: JobId,
    timeout: Duration,
    cmd_send: CmdSend,
) {
    let request = HttpRequest {
        url: key.url.clone(),
        verb: HttpVerb::Get,
        body: None,
        timeout_hint: Some(timeout + TIMEOUT_HINT_GRACE),
    };

    let mut response = match http_client.start(request).await {
        Ok(response) => response,
        Err(err) => {
            let _ = cmd_send.send(Cmd::JobDone {
                key,
                job_id,
                result: Err(err.classify_or(FetchErrorKind::HttpFailed)),
            });
            return;
        }
    };

    if response.status() != 200 {
        // The body of a non-200 response is discarded with the response.
        let status = response.status();
        let _ = cmd_send.send(Cmd::JobDone {
            key,
            job_id,
            result: Err(FetchError::http_failed(format!(
                "http status {status}"
            ))),
        });
        return;
    }

    loop {
        match response.read_chunk().await {
            Ok(Some(chunk)) => {
                if cmd_send
                    .send(Cmd::JobData {
                        key: key.clone(),
                        job_id,
                        chunk,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => {
                let _ = cmd_send.send(Cmd::JobDone {
                    key,
                    job_id,
                    result: Ok(()),
                });
                return;
            }
            Err(err) => {
                let _ = cmd_send.send(Cmd::JobDone {
                    key,
                    job_id,
                    result: Err(
                        err.classify_or(FetchErrorKind::HttpFailed),
                    ),
                });
                return;
            }
        }
    }
}

/// The job deadline. Completion aborts this task; a fire that slips
/// through anyway is discarded by the job id check in the loop.
async fn timer_task(
    key: FetchKey,
    job_id: JobId,
    timeout: Duration,
    cmd_send: CmdSend,
) {
    tokio::time::sleep(timeout).await;
    let _ = cmd_send.send(Cmd::JobTimedOut { key, job_id });
}
