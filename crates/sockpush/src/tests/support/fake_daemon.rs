//! Fake daemon listening on a Unix socket in a temporary directory.
//!
//! Every accepted client is served on its own thread: each request line is
//! recorded and passed to the configured [`Responder`], whose reply lines are
//! written back newline-terminated. Tests can also push unsolicited lines to
//! every client or sever all client streams to force a reconnect.

use std::io::{self, BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Maps one request line to the lines written back.
pub(in crate::tests) type Responder = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

#[derive(Default)]
struct Shared {
    requests: Mutex<Vec<String>>,
    clients: Mutex<Vec<UnixStream>>,
    accepted: AtomicUsize,
    shutdown: AtomicBool,
}

impl Shared {
    fn clients(&self) -> MutexGuard<'_, Vec<UnixStream>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(in crate::tests) struct FakeDaemon {
    dir: TempDir,
    path: PathBuf,
    shared: Arc<Shared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeDaemon {
    /// Binds a daemon that answers no requests.
    pub fn silent() -> Result<Self> {
        Self::spawn(Arc::new(|_: &str| Vec::<String>::new()))
    }

    pub fn spawn(responder: Responder) -> Result<Self> {
        let dir = tempfile::tempdir().context("create socket directory")?;
        let path = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&path).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let shared = Arc::new(Shared::default());
        let accept_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || accept_loop(&listener, &accept_shared, &responder));
        Ok(Self {
            dir,
            path,
            shared,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Writes `line` to every connected client.
    pub fn broadcast(&self, line: &str) -> Result<()> {
        let mut clients = self.shared.clients();
        for client in clients.iter_mut() {
            writeln!(client, "{line}").context("write unsolicited line")?;
        }
        Ok(())
    }

    /// Shuts down every client stream, as if the daemon dropped them.
    pub fn sever(&self) {
        for client in self.shared.clients().drain(..) {
            let _ignored = client.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.sever();
        if let Some(handle) = self.handle.take() {
            let _ignored = handle.join();
        }
    }
}

fn accept_loop(listener: &UnixListener, shared: &Arc<Shared>, responder: &Responder) {
    while !shared.shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let Ok(tracked) = stream.try_clone() else {
                    continue;
                };
                shared.clients().push(tracked);
                shared.accepted.fetch_add(1, Ordering::SeqCst);
                let client_shared = Arc::clone(shared);
                let client_responder = Arc::clone(responder);
                thread::spawn(move || {
                    let _ignored = serve_client(stream, &client_shared, &client_responder);
                });
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => return,
        }
    }
}

fn serve_client(stream: UnixStream, shared: &Shared, responder: &Responder) -> Result<()> {
    let mut writer = stream.try_clone().context("clone client stream")?;
    for line in BufReader::new(stream).lines() {
        let line = line.context("read request")?;
        shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());
        for reply in responder(&line) {
            writeln!(writer, "{reply}").context("write reply")?;
        }
    }
    Ok(())
}
